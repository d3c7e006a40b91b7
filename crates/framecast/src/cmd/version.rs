use framecast_frame::{DEFAULT_MAX_FRAME_SIZE, DEFAULT_MIN_FRAME_SIZE};
use framecast_receiver::{DEFAULT_POLL_INTERVAL, DEFAULT_PORT};

use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    if !args.extended {
        println!("framecast {}", env!("CARGO_PKG_VERSION"));
        return Ok(SUCCESS);
    }

    println!("name: framecast");
    println!("version: {}", env!("CARGO_PKG_VERSION"));
    println!(
        "build_target: {}",
        option_env!("FRAMECAST_BUILD_TARGET").unwrap_or("unknown")
    );
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("git_hash: {}", option_env!("GIT_HASH").unwrap_or("unknown"));
    println!("default_port: {DEFAULT_PORT}");
    println!("poll_interval_ms: {}", DEFAULT_POLL_INTERVAL.as_millis());
    println!("min_frame_size: {DEFAULT_MIN_FRAME_SIZE}");
    println!("max_frame_size: {DEFAULT_MAX_FRAME_SIZE}");
    println!("features: receiver={}, cli=true", cfg!(feature = "receiver"));

    Ok(SUCCESS)
}
