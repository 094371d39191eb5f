//! Protocol processors: the per-connection state machines that turn bytes
//! into messages and back.

pub mod binary;
pub mod channel_internal;
pub mod detector;
pub mod http1;
pub mod http2;
pub mod hybrid_client;
pub mod websocket;

use crate::connection::{ProcessorCtx, RecvAction};
use crate::error::Result;
use crate::timer::TimerKind;

/// A pluggable protocol state machine owned by a [`crate::connection::Connection`].
///
/// Implementors never block and never reach back into the reactor directly;
/// everything they need (timers, the protocol tag) comes through
/// [`ProcessorCtx`] for the duration of one call.
pub trait Processor: std::fmt::Debug {
    /// Consumes a prefix of `bytes`, returning how much it used and,
    /// optionally, a replacement processor to hot-swap itself for.
    fn on_recv(&mut self, ctx: &mut ProcessorCtx<'_>, bytes: &[u8]) -> Result<RecvAction>;

    /// Pulls the next buffer this processor wants sent, or `None` if it has
    /// nothing pending right now. Called repeatedly by `pump_send` so a
    /// processor can pace its own output (HTTP/2 fairness, flow control).
    fn produce_send(&mut self, ctx: &mut ProcessorCtx<'_>) -> Option<Vec<u8>>;

    /// Runs a fired timer's callback. Default: ignore.
    fn on_timeout(&mut self, _ctx: &mut ProcessorCtx<'_>, _kind: TimerKind) -> Result<()> {
        Ok(())
    }

    /// Whether this processor wants its bytes left in the kernel buffer
    /// (peek mode) rather than consumed. Only the detector needs this.
    fn want_peek(&self) -> bool {
        false
    }

    /// Whether this processor currently wants to be read from at all.
    /// Used by a handler mid-async-response to park reads (not required by
    /// any built-in processor today, but kept as an escape hatch).
    fn want_recv(&self) -> bool {
        true
    }

    /// A short, stable name used in logs and the protocol tag.
    fn name(&self) -> &'static str;
}
