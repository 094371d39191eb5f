//! Application-facing handler interfaces.
//!
//! Two levels are offered. *Level 1* is the plain synchronous callback
//! surface: a handler fills in a response in place and the runtime sends
//! it, no different from wiring a closure directly over a connection.
//! *Level 2* hands the handler a context object instead, so code that
//! needs the async-response facility can ask for it without every Level 1
//! implementor paying for the extra surface.
//!
//! Every built-in processor (`http1`, `websocket`, `binary`) is written
//! against [`Handler`] directly; [`HttpContext`], [`WsContext`], and
//! [`BinaryContext`] are thin views a processor builds once per callback
//! and that a [`Handler`] may ignore entirely if it only needs Level 1.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::connection::ConnId;
use crate::error::ErrorKind;
use crate::parser::h1::request::Request;
use crate::parser::h1::response::Response;
use crate::parser::ws::Frame as WsFrame;
use std::net::SocketAddr;

/// A stable, opaque handle to an in-flight async HTTP response. Carries
/// enough to route a completion message back to the right stream on the
/// right connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AsyncResponseId {
    /// Owning connection.
    pub conn: ConnId,
    /// HTTP/1.1: always 0 (one in-flight request at a time). HTTP/2: the
    /// stream id the response belongs to.
    pub stream_id: u32,
    /// Disambiguates successive requests on the same HTTP/1.1 connection.
    pub request_seq: u64,
}

static NEXT_REQUEST_SEQ: AtomicU64 = AtomicU64::new(1);

/// Allocates a fresh `request_seq`, unique for the process's lifetime.
pub fn next_request_seq() -> u64 {
    NEXT_REQUEST_SEQ.fetch_add(1, Ordering::Relaxed)
}

/// A binary-stream request: one complete length-prefixed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryRequest {
    /// The message payload, with the 4-byte length prefix already stripped.
    pub payload: Vec<u8>,
}

/// A binary-stream response a handler builds in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BinaryResponse {
    /// The payload to send back, length-prefixed by the processor.
    pub payload: Vec<u8>,
}

/// What a handler needs to know about the connection it is being called
/// for, without being able to reach back into reactor internals: a
/// borrowed view valid only for the duration of the call.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionInfo {
    /// This connection's stable id.
    pub id: ConnId,
    /// The remote peer's address.
    pub peer_addr: SocketAddr,
}

/// Opaque tag for a user-scheduled timeout, passed back to `handle_timeout`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserTimeoutTag(pub u32);

/// Level 1 application handler: a flat set of synchronous callbacks.
///
/// Every method has a default no-op body so a handler only needs to
/// override what it actually uses.
pub trait Handler: Send + Sync {
    /// An HTTP/1.1 or HTTP/2 request finished arriving; fill in `resp`.
    /// The default produces an empty `204 No Content`.
    fn on_http(&self, _info: &ConnectionInfo, req: &Request, resp: &mut Response) {
        let _ = req;
        resp.status = crate::parser::Status::NoContent;
    }

    /// A WebSocket frame arrived. Returning `Some` sends that frame back;
    /// `None` sends nothing.
    fn on_ws(&self, _info: &ConnectionInfo, _frame: &WsFrame) -> Option<WsFrame> {
        None
    }

    /// A binary-stream message arrived; fill in `resp`.
    fn on_binary(&self, _info: &ConnectionInfo, _req: &BinaryRequest, _resp: &mut BinaryResponse) {}

    /// The protocol detector committed to a processor for this connection.
    fn on_connect(&self, _info: &ConnectionInfo) {}

    /// The connection was torn down, for any reason.
    fn on_disconnect(&self, _info: &ConnectionInfo) {}

    /// A cross-thread application message addressed to this connection,
    /// delivered via [`crate::processor::channel_internal`].
    fn handle_msg(&self, _info: &ConnectionInfo, _msg: &[u8]) {}

    /// A user-scheduled timer fired.
    fn handle_timeout(&self, _info: &ConnectionInfo, _tag: UserTimeoutTag) {}

    /// A fatal, non-close condition occurred.
    fn on_error(&self, _info: &ConnectionInfo, _kind: ErrorKind, _message: &str) {}
}

/// A no-op handler, useful as a default or in tests exercising only the
/// reactor/pipeline plumbing.
#[derive(Debug, Default)]
pub struct NullHandler;

impl Handler for NullHandler {}

/// Shared storage backing [`HttpContext::async_response`]/`complete_async_response`.
/// A processor polls this (or is woken by the channel message that sets
/// it) to learn a deferred response has become ready.
#[derive(Debug, Default)]
pub struct AsyncSlot {
    inner: Mutex<Option<Response>>,
}

impl AsyncSlot {
    /// An empty slot, not yet completed.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Publishes the final response. Idempotent-ish: a second call
    /// overwrites the first, which should never happen in practice since
    /// each slot is completed exactly once.
    pub fn complete(&self, response: Response) {
        *self.inner.lock().expect("async slot mutex poisoned") = Some(response);
    }

    /// Takes the response if one has been published.
    pub fn take(&self) -> Option<Response> {
        self.inner.lock().expect("async slot mutex poisoned").take()
    }
}

/// Level 2 view handed to HTTP handlers that need the async-response
/// facility. Wraps a [`Response`] the handler can fill in directly, or
/// defer via [`Self::async_response`].
pub struct HttpContext<'a> {
    info: ConnectionInfo,
    request: &'a Request,
    response: &'a mut Response,
    async_slot: Option<Arc<AsyncSlot>>,
}

impl<'a> HttpContext<'a> {
    /// Builds a context around a request/response pair for one callback.
    pub fn new(info: ConnectionInfo, request: &'a Request, response: &'a mut Response) -> Self {
        Self {
            info,
            request,
            response,
            async_slot: None,
        }
    }

    /// This connection's identity and peer address.
    pub fn connection_info(&self) -> ConnectionInfo {
        self.info
    }

    /// The request being answered.
    pub fn request(&self) -> &Request {
        self.request
    }

    /// Mutable access to the in-progress response.
    pub fn response(&mut self) -> &mut Response {
        self.response
    }

    /// Defers the response: the processor will not send anything when this
    /// callback returns. Returns a slot the caller completes later, from
    /// any thread, by sending a completion message back to this
    /// connection's owning worker thread.
    pub fn async_response(&mut self) -> Arc<AsyncSlot> {
        let slot = AsyncSlot::new();
        self.async_slot = Some(Arc::clone(&slot));
        slot
    }

    /// Whether this callback deferred its response.
    pub fn is_async(&self) -> bool {
        self.async_slot.is_some()
    }
}

/// Level 2 view handed to WebSocket handlers.
pub struct WsContext<'a> {
    info: ConnectionInfo,
    frame: &'a WsFrame,
    reply: Option<WsFrame>,
}

impl<'a> WsContext<'a> {
    /// Builds a context around one inbound frame.
    pub fn new(info: ConnectionInfo, frame: &'a WsFrame) -> Self {
        Self {
            info,
            frame,
            reply: None,
        }
    }

    /// This connection's identity and peer address.
    pub fn connection_info(&self) -> ConnectionInfo {
        self.info
    }

    /// The frame that triggered this callback.
    pub fn frame(&self) -> &WsFrame {
        self.frame
    }

    /// Queues a text frame in reply.
    pub fn send_text(&mut self, text: impl Into<String>) {
        self.reply = Some(WsFrame {
            fin: true,
            opcode: crate::parser::ws::OpCode::Text,
            payload: text.into().into_bytes(),
        });
    }

    /// Queues a binary frame in reply.
    pub fn send_binary(&mut self, payload: impl Into<Vec<u8>>) {
        self.reply = Some(WsFrame {
            fin: true,
            opcode: crate::parser::ws::OpCode::Binary,
            payload: payload.into(),
        });
    }

    /// Takes the queued reply, if any, for the processor to send.
    pub fn take_reply(self) -> Option<WsFrame> {
        self.reply
    }
}

/// Level 2 view handed to binary-stream handlers.
pub struct BinaryContext<'a> {
    info: ConnectionInfo,
    request: &'a BinaryRequest,
    response: &'a mut BinaryResponse,
}

impl<'a> BinaryContext<'a> {
    /// Builds a context around a request/response pair for one callback.
    pub fn new(info: ConnectionInfo, request: &'a BinaryRequest, response: &'a mut BinaryResponse) -> Self {
        Self {
            info,
            request,
            response,
        }
    }

    /// This connection's identity and peer address.
    pub fn connection_info(&self) -> ConnectionInfo {
        self.info
    }

    /// The message that triggered this callback.
    pub fn request(&self) -> &BinaryRequest {
        self.request
    }

    /// Mutable access to the in-progress response.
    pub fn response(&mut self) -> &mut BinaryResponse {
        self.response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{Method, Version};

    fn info() -> ConnectionInfo {
        ConnectionInfo {
            id: ConnId { thread: 0, local: 1 },
            peer_addr: "127.0.0.1:1".parse().unwrap(),
        }
    }

    #[test]
    fn default_handler_responds_no_content() {
        let handler = NullHandler;
        let req = Request {
            method: Method::Get,
            target: "/".into(),
            version: Version::H1_1,
            headers: Vec::new(),
            body: Vec::new(),
        };
        let mut resp = Response::new_with_status(Version::H1_1, crate::parser::Status::r#Ok);
        handler.on_http(&info(), &req, &mut resp);
        assert_eq!(resp.status.code(), 204);
    }

    #[test]
    fn async_slot_round_trips_a_completed_response() {
        let slot = AsyncSlot::new();
        assert!(slot.take().is_none());
        slot.complete(Response::new_with_status(Version::H1_1, crate::parser::Status::r#Ok));
        let resp = slot.take().unwrap();
        assert_eq!(resp.status.code(), 200);
        assert!(slot.take().is_none());
    }

    #[test]
    fn http_context_tracks_async_deferral() {
        let req = Request {
            method: Method::Get,
            target: "/".into(),
            version: Version::H1_1,
            headers: Vec::new(),
            body: Vec::new(),
        };
        let mut resp = Response::new_with_status(Version::H1_1, crate::parser::Status::r#Ok);
        let mut ctx = HttpContext::new(info(), &req, &mut resp);
        assert!(!ctx.is_async());
        let _slot = ctx.async_response();
        assert!(ctx.is_async());
    }
}
