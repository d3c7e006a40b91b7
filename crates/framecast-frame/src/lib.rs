//! Frame reassembly for fragmented byte streams.
//!
//! A stream socket delivers bytes in whatever chunks the network produces.
//! [`FrameAssembler`] accumulates them and cuts complete frames out using a
//! pluggable [`FrameBoundary`]:
//! - [`EndMarker`] sniffs the content for a trailing two-byte marker (the JPEG
//!   end-of-image marker by default) once a minimum size is reached
//! - [`LengthPrefixed`] reads a 4-byte big-endian length before each payload
//!
//! The sending side uses the same boundary through [`FrameWriter`].

pub mod assembler;
pub mod boundary;
pub mod error;
pub mod frame;
pub mod writer;

pub use assembler::{AssemblerConfig, FrameAssembler, DEFAULT_MAX_FRAME_SIZE};
pub use boundary::{
    Boundary, EndMarker, FrameBoundary, LengthPrefixed, DEFAULT_MIN_FRAME_SIZE, JPEG_END_MARKER,
    LENGTH_PREFIX_SIZE,
};
pub use error::{FrameError, Result};
pub use frame::{Frame, FrameFormat};
pub use writer::FrameWriter;
