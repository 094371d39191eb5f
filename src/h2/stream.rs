//! Per-stream HTTP/2 request/response state: method/path/authority/
//! headers/body plus the outbound body+offset and the send/recv windows,
//! dependency, and weight needed for flow control and priority
//! bookkeeping.

use std::collections::HashMap;

/// Where a stream sits in the HTTP/2 state machine (Idle is implicit: a
/// stream only exists in the table from `Open` onward).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    /// A HEADERS frame has opened the stream; request headers are complete
    /// or still being assembled via CONTINUATION.
    Open,
    /// The client has sent END_STREAM; the request is complete and
    /// awaiting (or receiving) a response.
    HalfClosedRemote,
    /// The response's END_STREAM has been sent; the stream is done and
    /// will be removed from the table on the next pass.
    Closed,
}

/// One HTTP/2 stream's accumulated request/response state.
#[derive(Debug, Clone)]
pub struct Stream {
    pub phase: StreamPhase,
    pub method: Option<String>,
    pub path: Option<String>,
    pub authority: Option<String>,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    /// Priority dependency, set by a PRIORITY frame or a HEADERS priority
    /// prefix. Stored but not used for scheduling beyond that.
    pub dependency: u32,
    /// Weight in `1..=256`, stored already adjusted from the wire's
    /// `weight - 1` encoding.
    pub weight: u16,
    /// Remaining credit this endpoint may spend sending DATA on this
    /// stream.
    pub send_window: i64,
    /// Remaining credit this endpoint has granted the peer for DATA it
    /// sends on this stream.
    pub recv_window: i64,
    /// Response body queued to go out, and how much of it has been sent.
    pub out_body: Vec<u8>,
    pub out_off: usize,
    /// Bytes of request body received since the last WINDOW_UPDATE credit
    /// was returned for this stream, credited back in batches once this
    /// crosses a configurable threshold.
    pub uncredited: u32,
}

impl Stream {
    /// A freshly opened stream, seeded with the peer's current
    /// `SETTINGS_INITIAL_WINDOW_SIZE` and this server's own receive window.
    pub fn new(peer_initial_window_size: u32, recv_window: i64) -> Self {
        Self {
            phase: StreamPhase::Open,
            method: None,
            path: None,
            authority: None,
            headers: HashMap::new(),
            body: Vec::new(),
            dependency: 0,
            weight: 16,
            send_window: peer_initial_window_size as i64,
            recv_window,
            out_body: Vec::new(),
            out_off: 0,
            uncredited: 0,
        }
    }

    /// Whether this stream still has response bytes left to send.
    pub fn has_pending_output(&self) -> bool {
        self.out_off < self.out_body.len()
    }
}
