//! HTTP/2 wire-level building blocks (RFC 7540).
//!
//! This module holds the stateless framing layer — [`frame`] — and the
//! per-stream record shape — [`stream`] — that the stateful engine in
//! [`crate::processor::http2`] drives. Splitting it this way keeps the
//! frame codec testable on its own, without needing a live connection to
//! exercise it.

pub mod frame;
pub mod stream;

pub use frame::{ErrorCode, FrameHeader, FrameType};
pub use stream::{Stream, StreamPhase};
