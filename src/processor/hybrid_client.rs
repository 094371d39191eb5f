//! Hybrid HTTPS client processor: waits for the TLS handshake, then
//! branches on the negotiated ALPN protocol and runs either a small
//! HTTP/2 client state machine or a single HTTP/1.1 request/response cycle
//! over the same codec.
//!
//! Unlike every other processor in this crate, a [`HybridClient`] is driven
//! by application code rather than a [`crate::handler::Handler`]: the
//! caller gets a [`ClientHandle`] back from [`HybridClient::new`] and blocks
//! on [`ClientHandle::wait_done`] from a thread of its own, mirroring
//! `examples/http2_out_client.cpp`'s `proc->wait_done(timeout_ms)` called
//! from a waiter thread after `conn->connect()`.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::config::Http2Config;
use crate::connection::{ProcessorCtx, RecvAction};
use crate::error::{CoreError, Result};
use crate::h2::frame::{self, flags, ErrorCode, FrameHeader, FrameType};
use crate::hpack;
use crate::parser::h1::response::ResponseHead;
use crate::parser::{Header, Method};
use crate::processor::http1::try_decode_chunked;
use crate::processor::Processor;
use crate::timer::{TimerId, TimerKind};

/// A request to send once the handshake (if any) completes.
#[derive(Debug, Clone)]
pub struct ClientRequest {
    /// Request method.
    pub method: Method,
    /// `Host`/`:authority` value.
    pub authority: String,
    /// Request target, origin-form (path plus optional query).
    pub path: String,
    /// Extra header fields, in addition to the ones this processor adds
    /// itself (`Host`/`:authority`, `Connection: close` on HTTP/1.1).
    pub headers: Vec<Header>,
    /// Request body, if any.
    pub body: Vec<u8>,
}

impl ClientRequest {
    /// A request with no extra headers or body.
    pub fn new(method: Method, authority: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method,
            authority: authority.into(),
            path: path.into(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// Appends a header field.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(Header {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    /// Sets the request body.
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }
}

/// The outcome of a hybrid client request, reported once to
/// [`ClientHandle::wait_done`].
#[derive(Debug, Clone)]
pub enum ClientResult {
    /// A complete response was received.
    Done {
        /// Response status code.
        status: u16,
        /// Fully buffered response body.
        body: Vec<u8>,
    },
    /// The connection failed, or the total timeout elapsed, before a
    /// complete response arrived.
    Failed,
}

#[derive(Debug, Default)]
struct Completion {
    result: Mutex<Option<ClientResult>>,
    condvar: Condvar,
}

impl Completion {
    /// Records the outcome and wakes any waiter. Idempotent: only the first
    /// call wins, matching "the connection fails after the response already
    /// completed" not overwriting a good result.
    fn finish(&self, result: ClientResult) {
        let mut guard = self.result.lock().unwrap();
        if guard.is_none() {
            *guard = Some(result);
            self.condvar.notify_all();
        }
    }
}

/// The caller's side of a [`HybridClient`], returned alongside it by
/// [`HybridClient::new`]. Lives independently of the processor, which is
/// owned by the connection and runs on a worker thread.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    completion: Arc<Completion>,
}

impl ClientHandle {
    /// Blocks the calling thread until the request completes or `timeout_ms`
    /// elapses, whichever comes first. Returns `None` on timeout; the
    /// processor may still complete later, but nothing observes it.
    pub fn wait_done(&self, timeout_ms: u64) -> Option<ClientResult> {
        let guard = self.completion.result.lock().unwrap();
        if guard.is_some() {
            return guard.clone();
        }
        let (guard, _timeout) = self
            .completion
            .condvar
            .wait_timeout_while(guard, Duration::from_millis(timeout_ms), |r| r.is_none())
            .unwrap();
        guard.clone()
    }
}

enum Mode {
    /// Waiting for `ctx.handshake_done()` before the ALPN branch can run.
    Waiting,
    Http1(Http1ClientInner),
    H2(H2ClientInner),
}

/// The client-side processor: waits for handshake completion, then becomes
/// either an HTTP/1.1 or an HTTP/2 client for the lifetime of the
/// connection. Exactly one request/response cycle runs per connection.
pub struct HybridClient {
    request: Option<ClientRequest>,
    http2_config: Http2Config,
    mode: Mode,
    completion: Arc<Completion>,
}

impl std::fmt::Debug for HybridClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HybridClient").field("mode", &self.name()).finish()
    }
}

impl HybridClient {
    /// Builds a processor for `request`, returning it alongside a
    /// [`ClientHandle`] the caller uses to wait for the outcome. `request`
    /// is sent once the handshake completes and the ALPN branch is chosen.
    pub fn new(request: ClientRequest, http2_config: Http2Config) -> (Self, ClientHandle) {
        let completion = Arc::new(Completion::default());
        let handle = ClientHandle {
            completion: completion.clone(),
        };
        let client = Self {
            request: Some(request),
            http2_config,
            mode: Mode::Waiting,
            completion,
        };
        (client, handle)
    }

    fn start(&mut self, ctx: &mut ProcessorCtx<'_>) {
        let request = self.request.take().expect("start runs exactly once, after construction");
        let is_h2 = ctx.alpn() == Some(b"h2");
        ctx.set_protocol_tag(if is_h2 { "h2" } else { "http/1.1" });
        ctx.lock_protocol_tag();

        if is_h2 {
            let mut inner = H2ClientInner::new(self.http2_config.clone(), request, self.completion.clone());
            inner.start(ctx);
            self.mode = Mode::H2(inner);
        } else {
            self.mode = Mode::Http1(Http1ClientInner::new(&request, self.completion.clone()));
        }
    }
}

impl Processor for HybridClient {
    fn on_recv(&mut self, ctx: &mut ProcessorCtx<'_>, bytes: &[u8]) -> Result<RecvAction> {
        if !ctx.handshake_done() {
            return Ok(RecvAction::Consumed(0));
        }
        if matches!(self.mode, Mode::Waiting) {
            self.start(ctx);
        }
        match &mut self.mode {
            Mode::Waiting => unreachable!("start() always leaves Http1 or H2"),
            Mode::Http1(inner) => inner.on_recv(ctx, bytes),
            Mode::H2(inner) => inner.on_recv(ctx, bytes),
        }
    }

    fn produce_send(&mut self, ctx: &mut ProcessorCtx<'_>) -> Option<Vec<u8>> {
        match &mut self.mode {
            Mode::Waiting => None,
            Mode::Http1(inner) => inner.produce_send(),
            Mode::H2(inner) => inner.produce_send(ctx),
        }
    }

    fn on_timeout(&mut self, ctx: &mut ProcessorCtx<'_>, kind: TimerKind) -> Result<()> {
        if let Mode::H2(inner) = &mut self.mode {
            inner.on_timeout(ctx, kind);
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        match &self.mode {
            Mode::Waiting => "hybrid-client",
            Mode::Http1(_) => "http/1.1-client",
            Mode::H2(_) => "h2-client",
        }
    }
}

/// How the body of the in-progress response is framed, mirroring
/// `http1::Http1Processor`'s server-side `BodyFraming`.
#[derive(Debug, Clone, Copy)]
enum BodyFraming {
    ContentLength(u64),
    Chunked,
}

enum H1Phase {
    Head,
    Body { status: u16, framing: BodyFraming, body: Vec<u8> },
    Done,
}

struct Http1ClientInner {
    out_queue: VecDeque<Vec<u8>>,
    phase: H1Phase,
    completion: Arc<Completion>,
}

impl Http1ClientInner {
    fn new(request: &ClientRequest, completion: Arc<Completion>) -> Self {
        let mut out_queue = VecDeque::new();
        out_queue.push_back(Self::build_request(request));
        Self {
            out_queue,
            phase: H1Phase::Head,
            completion,
        }
    }

    fn build_request(request: &ClientRequest) -> Vec<u8> {
        let mut out = Vec::with_capacity(128 + request.body.len());
        out.extend_from_slice(request.method.as_str().as_bytes());
        out.push(b' ');
        out.extend_from_slice(request.path.as_bytes());
        out.extend_from_slice(b" HTTP/1.1\r\n");
        out.extend_from_slice(b"Host: ");
        out.extend_from_slice(request.authority.as_bytes());
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(b"Connection: close\r\n");
        out.extend_from_slice(b"User-Agent: polynet\r\n");

        let has_content_length = request.headers.iter().any(|h| h.name.eq_ignore_ascii_case("content-length"));
        if !request.body.is_empty() && !has_content_length {
            out.extend_from_slice(b"Content-Length: ");
            out.extend_from_slice(request.body.len().to_string().as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        for h in &request.headers {
            out.extend_from_slice(h.name.as_bytes());
            out.extend_from_slice(b": ");
            out.extend_from_slice(h.value.as_bytes());
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(&request.body);
        out
    }

    fn finish_response(&mut self, ctx: &mut ProcessorCtx<'_>, status: u16, body: Vec<u8>) {
        self.completion.finish(ClientResult::Done { status, body });
        self.phase = H1Phase::Done;
        ctx.request_close();
    }

    fn on_recv(&mut self, ctx: &mut ProcessorCtx<'_>, bytes: &[u8]) -> Result<RecvAction> {
        match &self.phase {
            H1Phase::Head => match ResponseHead::parse(bytes) {
                Ok(None) => Ok(RecvAction::Consumed(0)),
                Err(_) => {
                    self.completion.finish(ClientResult::Failed);
                    Err(CoreError::Protocol {
                        message: "malformed HTTP/1.1 response head".into(),
                        stream: None,
                    })
                }
                Ok(Some((head, consumed))) => {
                    let status = head.status.code();
                    if head.is_chunked() {
                        self.phase = H1Phase::Body {
                            status,
                            framing: BodyFraming::Chunked,
                            body: Vec::new(),
                        };
                    } else {
                        let len = head.content_length().unwrap_or(0);
                        if len == 0 {
                            self.finish_response(ctx, status, Vec::new());
                        } else {
                            self.phase = H1Phase::Body {
                                status,
                                framing: BodyFraming::ContentLength(len),
                                body: Vec::new(),
                            };
                        }
                    }
                    Ok(RecvAction::Consumed(consumed))
                }
            },
            H1Phase::Body {
                framing: BodyFraming::ContentLength(need),
                ..
            } => {
                let need = *need as usize;
                let H1Phase::Body { status, body, .. } = std::mem::replace(&mut self.phase, H1Phase::Done) else {
                    unreachable!("matched Body above");
                };
                let mut body = body;
                let still_needed = need - body.len();
                let take = bytes.len().min(still_needed);
                body.extend_from_slice(&bytes[..take]);

                if body.len() == need {
                    self.finish_response(ctx, status, body);
                } else {
                    self.phase = H1Phase::Body {
                        status,
                        framing: BodyFraming::ContentLength(need as u64),
                        body,
                    };
                }
                Ok(RecvAction::Consumed(take))
            }
            H1Phase::Body {
                framing: BodyFraming::Chunked,
                ..
            } => match try_decode_chunked(bytes) {
                Ok(None) => Ok(RecvAction::Consumed(0)),
                Err(()) => {
                    self.completion.finish(ClientResult::Failed);
                    Err(CoreError::Protocol {
                        message: "malformed chunked response body".into(),
                        stream: None,
                    })
                }
                Ok(Some((body, consumed))) => {
                    let H1Phase::Body { status, .. } = std::mem::replace(&mut self.phase, H1Phase::Done) else {
                        unreachable!("matched Body above");
                    };
                    self.finish_response(ctx, status, body);
                    Ok(RecvAction::Consumed(consumed))
                }
            },
            H1Phase::Done => Ok(RecvAction::Consumed(0)),
        }
    }

    fn produce_send(&mut self) -> Option<Vec<u8>> {
        self.out_queue.pop_front()
    }
}

const STREAM_ID: u32 = 1;
const CONN_INITIAL_WINDOW: i64 = 65_535;

/// A trimmed, client-role adaptation of `http2::Http2Processor`'s engine:
/// one fixed stream (id 1), no HPACK dynamic-table growth, and no fairness
/// pump since there is only ever one stream to service.
struct H2ClientInner {
    config: Http2Config,
    request: ClientRequest,
    decoder: hpack::Decoder,
    encoder: hpack::Encoder,
    assembling: Option<Vec<u8>>,
    conn_send_window: i64,
    conn_recv_uncredited: u32,
    peer_initial_window_size: u32,
    peer_max_frame_size: u32,
    stream_send_window: i64,
    stream_recv_uncredited: u32,
    out_body: Vec<u8>,
    out_off: usize,
    body: Vec<u8>,
    pending_status: Option<u16>,
    response_done: bool,
    out_queue: VecDeque<Vec<u8>>,
    completion: Arc<Completion>,
    ping_timer: Option<TimerId>,
    total_timer: Option<TimerId>,
}

impl H2ClientInner {
    fn new(config: Http2Config, request: ClientRequest, completion: Arc<Completion>) -> Self {
        let out_body = request.body.clone();
        Self {
            config,
            request,
            decoder: hpack::Decoder::new(4096),
            encoder: hpack::Encoder::new(0),
            assembling: None,
            conn_send_window: CONN_INITIAL_WINDOW,
            conn_recv_uncredited: 0,
            peer_initial_window_size: 65_535,
            peer_max_frame_size: 16_384,
            stream_send_window: 65_535,
            stream_recv_uncredited: 0,
            out_body,
            out_off: 0,
            body: Vec::new(),
            pending_status: None,
            response_done: false,
            out_queue: VecDeque::new(),
            completion,
            ping_timer: None,
            total_timer: None,
        }
    }

    /// Sends the preface, initial SETTINGS, and the request HEADERS (plus
    /// any request body already buffered), and schedules the ping/total
    /// timers.
    fn start(&mut self, ctx: &mut ProcessorCtx<'_>) {
        self.out_queue.push_back(frame::PREFACE.to_vec());
        self.out_queue.push_back(frame::make_initial_settings());

        let scheme = "https".to_string();
        let method = self.request.method.as_str().to_string();
        let path = self.request.path.clone();
        let authority = self.request.authority.clone();
        let extra: Vec<(String, String)> = self
            .request
            .headers
            .iter()
            .map(|h| (h.name.to_ascii_lowercase(), h.value.clone()))
            .collect();

        let mut pairs: Vec<(&str, &str)> = vec![
            (":method", method.as_str()),
            (":path", path.as_str()),
            (":authority", authority.as_str()),
            (":scheme", scheme.as_str()),
        ];
        for (n, v) in &extra {
            pairs.push((n.as_str(), v.as_str()));
        }
        let block = self.encoder.encode_block(&pairs, hpack::Indexing::Without);

        let end_stream = self.out_body.is_empty();
        self.out_queue.push_back(frame::make_headers(STREAM_ID, &block, end_stream));
        if !end_stream {
            self.try_send_data();
        }

        let now = Instant::now();
        self.ping_timer = Some(ctx.schedule_timer(TimerKind::H2Ping, now + self.config.ping_interval));
        self.total_timer = Some(ctx.schedule_timer(TimerKind::H2TotalTimeout, now + self.config.total_timeout));
    }

    fn conn_error(&mut self, message: &'static str, code: ErrorCode) -> CoreError {
        self.out_queue.push_back(frame::make_goaway(STREAM_ID, code, b""));
        self.completion.finish(ClientResult::Failed);
        CoreError::Protocol {
            message: message.into(),
            stream: None,
        }
    }

    fn apply_settings(&mut self, payload: &[u8]) -> Result<()> {
        if payload.len() % 6 != 0 {
            return Err(self.conn_error("SETTINGS payload length not a multiple of 6", ErrorCode::FrameSizeError));
        }
        for chunk in payload.chunks_exact(6) {
            let id = u16::from_be_bytes([chunk[0], chunk[1]]);
            let val = u32::from_be_bytes([chunk[2], chunk[3], chunk[4], chunk[5]]);
            match id {
                frame::setting_id::INITIAL_WINDOW_SIZE => {
                    let delta = val as i64 - self.peer_initial_window_size as i64;
                    self.peer_initial_window_size = val;
                    self.stream_send_window += delta;
                }
                frame::setting_id::MAX_FRAME_SIZE => {
                    self.peer_max_frame_size = val.clamp(*frame::MAX_FRAME_SIZE_RANGE.start(), *frame::MAX_FRAME_SIZE_RANGE.end());
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Emits DATA frames for the request body while the connection and
    /// stream windows allow it, mirroring `Http2Processor::try_send_data`
    /// but for exactly one, always-present stream.
    fn try_send_data(&mut self) {
        loop {
            if self.out_off >= self.out_body.len() || self.conn_send_window <= 0 || self.stream_send_window <= 0 {
                break;
            }
            let max_frame = self.peer_max_frame_size as i64;
            let remaining = (self.out_body.len() - self.out_off) as i64;
            let allowance = self.conn_send_window.min(self.stream_send_window).min(max_frame);
            if allowance <= 0 {
                break;
            }
            let chunk = allowance.min(remaining) as usize;
            let end = self.out_off + chunk;
            let payload = self.out_body[self.out_off..end].to_vec();
            self.out_off = end;
            self.conn_send_window -= chunk as i64;
            self.stream_send_window -= chunk as i64;
            let end_stream = self.out_off >= self.out_body.len();
            self.out_queue.push_back(frame::make_data(STREAM_ID, &payload, end_stream));
            if end_stream {
                break;
            }
        }
    }

    fn finish(&mut self, ctx: &mut ProcessorCtx<'_>, status: u16, body: Vec<u8>) {
        if let Some(id) = self.ping_timer.take() {
            ctx.cancel_timer(id);
        }
        if let Some(id) = self.total_timer.take() {
            ctx.cancel_timer(id);
        }
        self.response_done = true;
        self.completion.finish(ClientResult::Done { status, body });
    }

    fn handle_headers_block(&mut self, ctx: &mut ProcessorCtx<'_>, block: &[u8], end_stream: bool) -> Result<()> {
        let headers = self
            .decoder
            .decode_block(block)
            .map_err(|_| self.conn_error("invalid HPACK header block", ErrorCode::CompressionError))?;

        let status = headers
            .iter()
            .find(|h| h.name == ":status")
            .and_then(|h| h.value.parse::<u16>().ok())
            .unwrap_or(200);

        if end_stream {
            self.finish(ctx, status, Vec::new());
        } else {
            self.pending_status = Some(status);
        }
        Ok(())
    }

    fn on_data_frame(&mut self, ctx: &mut ProcessorCtx<'_>, flags_byte: u8, payload: &[u8]) -> Result<()> {
        let mut data = payload;
        if flags_byte & flags::PADDED != 0 {
            let pad_len = *data
                .first()
                .ok_or_else(|| CoreError::Protocol { message: "PADDED DATA too short".into(), stream: None })? as usize;
            data = &data[1..];
            if pad_len > data.len() {
                return Err(self.conn_error("DATA pad length exceeds payload", ErrorCode::ProtocolError));
            }
            data = &data[..data.len() - pad_len];
        }
        let end_stream = flags_byte & flags::END_STREAM != 0;
        let n = data.len() as u32;

        self.body.extend_from_slice(data);
        self.stream_recv_uncredited += n;
        self.conn_recv_uncredited += n;

        if self.conn_recv_uncredited >= self.config.window_update_threshold {
            self.out_queue.push_back(frame::make_window_update(0, self.conn_recv_uncredited));
            self.conn_recv_uncredited = 0;
        }
        if self.stream_recv_uncredited >= self.config.window_update_threshold {
            let credit = self.stream_recv_uncredited;
            self.stream_recv_uncredited = 0;
            self.out_queue.push_back(frame::make_window_update(STREAM_ID, credit));
        }

        if end_stream {
            let status = self.pending_status.take().unwrap_or(200);
            let body = std::mem::take(&mut self.body);
            self.finish(ctx, status, body);
        }
        Ok(())
    }

    fn parse_one_frame(&mut self, bytes: &[u8], ctx: &mut ProcessorCtx<'_>) -> Result<Option<usize>> {
        let Some((hdr, payload, total)) = FrameHeader::parse(bytes) else {
            return Ok(None);
        };

        match hdr.frame_type {
            FrameType::Settings => {
                if hdr.flags & flags::ACK == 0 {
                    self.apply_settings(payload)?;
                    self.try_send_data();
                    self.out_queue.push_back(frame::make_settings_ack());
                }
            }
            FrameType::Ping => {
                if hdr.flags & flags::ACK == 0 && payload.len() == 8 {
                    let mut echoed = [0u8; 8];
                    echoed.copy_from_slice(payload);
                    self.out_queue.push_back(frame::make_ping(true, echoed));
                }
            }
            FrameType::WindowUpdate => {
                if payload.len() != 4 {
                    return Err(self.conn_error("WINDOW_UPDATE length must be 4", ErrorCode::FrameSizeError));
                }
                let inc = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]) & 0x7fff_ffff;
                if inc == 0 {
                    return Err(self.conn_error("WINDOW_UPDATE increment of 0", ErrorCode::ProtocolError));
                }
                if hdr.stream_id == 0 {
                    self.conn_send_window += inc as i64;
                } else {
                    self.stream_send_window += inc as i64;
                }
                self.try_send_data();
            }
            FrameType::RstStream => {
                self.completion.finish(ClientResult::Failed);
                self.response_done = true;
            }
            FrameType::Headers | FrameType::Continuation => {
                let mut body = payload;
                if hdr.frame_type == FrameType::Headers {
                    if hdr.flags & flags::PADDED != 0 {
                        let pad_len = *body
                            .first()
                            .ok_or_else(|| CoreError::Protocol { message: "PADDED HEADERS too short".into(), stream: None })?
                            as usize;
                        body = &body[1..];
                        if pad_len > body.len() {
                            return Err(self.conn_error("HEADERS pad length exceeds payload", ErrorCode::ProtocolError));
                        }
                        body = &body[..body.len() - pad_len];
                    }
                    self.assembling = Some(body.to_vec());
                } else {
                    let asm = self.assembling.get_or_insert_with(Vec::new);
                    asm.extend_from_slice(body);
                }

                if hdr.flags & flags::END_HEADERS != 0 {
                    let block = self.assembling.take().expect("END_HEADERS implies assembling state");
                    let end_stream = hdr.flags & flags::END_STREAM != 0;
                    self.handle_headers_block(ctx, &block, end_stream)?;
                }
            }
            FrameType::Data => {
                self.on_data_frame(ctx, hdr.flags, payload)?;
            }
            FrameType::GoAway => {
                if !self.response_done {
                    self.completion.finish(ClientResult::Failed);
                }
            }
            FrameType::Priority | FrameType::PushPromise | FrameType::Unknown(_) => {}
        }

        Ok(Some(total))
    }

    fn on_recv(&mut self, ctx: &mut ProcessorCtx<'_>, bytes: &[u8]) -> Result<RecvAction> {
        let mut offset = 0;
        loop {
            match self.parse_one_frame(&bytes[offset..], ctx)? {
                Some(consumed) => offset += consumed,
                None => break,
            }
        }
        Ok(RecvAction::Consumed(offset))
    }

    fn produce_send(&mut self, _ctx: &mut ProcessorCtx<'_>) -> Option<Vec<u8>> {
        self.out_queue.pop_front()
    }

    fn on_timeout(&mut self, ctx: &mut ProcessorCtx<'_>, kind: TimerKind) {
        if self.response_done {
            return;
        }
        match kind {
            TimerKind::H2Ping => {
                self.out_queue.push_back(frame::make_ping(false, [0u8; 8]));
                self.ping_timer = Some(ctx.schedule_timer(TimerKind::H2Ping, Instant::now() + self.config.ping_interval));
            }
            TimerKind::H2TotalTimeout => {
                self.completion.finish(ClientResult::Failed);
                self.response_done = true;
                ctx.request_close();
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnId;
    use crate::parser::h1::response::{encode_chunk, final_chunk};
    use crate::timer::TimerWheel;

    fn ctx<'a>(
        timers: &'a mut TimerWheel,
        tag: &'a mut Option<String>,
        locked: &'a mut bool,
        close: &'a mut bool,
        alpn: Option<&'a [u8]>,
        handshake_done: bool,
    ) -> ProcessorCtx<'a> {
        ProcessorCtx {
            conn_id: ConnId { thread: 0, local: 0 },
            peer_addr: "127.0.0.1:1".parse().unwrap(),
            timers,
            protocol_tag: tag,
            tag_locked: locked,
            close_requested: close,
            alpn,
            handshake_done,
        }
    }

    #[test]
    fn waits_for_handshake_before_sending_anything() {
        let (mut p, handle) = HybridClient::new(ClientRequest::new(Method::Get, "x", "/"), Http2Config::default());
        let mut timers = TimerWheel::new();
        let (mut tag, mut locked, mut close) = (None, false, false);
        let mut c = ctx(&mut timers, &mut tag, &mut locked, &mut close, Some(b"h2"), false);
        let action = p.on_recv(&mut c, b"").unwrap();
        assert!(matches!(action, RecvAction::Consumed(0)));
        assert!(p.produce_send(&mut c).is_none());
        assert!(handle.wait_done(0).is_none());
    }

    #[test]
    fn http1_branch_round_trips_a_get_request() {
        let request = ClientRequest::new(Method::Get, "example.invalid", "/hello");
        let (mut p, handle) = HybridClient::new(request, Http2Config::default());
        let mut timers = TimerWheel::new();
        let (mut tag, mut locked, mut close) = (None, false, false);
        let mut c = ctx(&mut timers, &mut tag, &mut locked, &mut close, None, true);

        p.on_recv(&mut c, b"").unwrap();
        let sent = p.produce_send(&mut c).unwrap();
        let sent = String::from_utf8(sent).unwrap();
        assert!(sent.starts_with("GET /hello HTTP/1.1\r\n"));
        assert!(sent.contains("Host: example.invalid\r\n"));

        let response = b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nOK";
        p.on_recv(&mut c, response).unwrap();

        match handle.wait_done(1000).unwrap() {
            ClientResult::Done { status, body } => {
                assert_eq!(status, 200);
                assert_eq!(body, b"OK");
            }
            ClientResult::Failed => panic!("expected Done"),
        }
        assert!(close);
    }

    #[test]
    fn http1_branch_decodes_a_chunked_response() {
        let request = ClientRequest::new(Method::Get, "x", "/");
        let (mut p, handle) = HybridClient::new(request, Http2Config::default());
        let mut timers = TimerWheel::new();
        let (mut tag, mut locked, mut close) = (None, false, false);
        let mut c = ctx(&mut timers, &mut tag, &mut locked, &mut close, None, true);

        p.on_recv(&mut c, b"").unwrap();
        p.produce_send(&mut c);

        let mut response = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n".to_vec();
        response.extend(encode_chunk(b"OK"));
        response.extend(final_chunk());
        p.on_recv(&mut c, &response).unwrap();

        match handle.wait_done(1000).unwrap() {
            ClientResult::Done { status, body } => {
                assert_eq!(status, 200);
                assert_eq!(body, b"OK");
            }
            ClientResult::Failed => panic!("expected Done"),
        }
    }

    #[test]
    fn h2_branch_matches_the_worked_tls_example() {
        let request = ClientRequest::new(Method::Get, "x", "/");
        let (mut p, handle) = HybridClient::new(request, Http2Config::default());
        let mut timers = TimerWheel::new();
        let (mut tag, mut locked, mut close) = (None, false, false);
        let mut c = ctx(&mut timers, &mut tag, &mut locked, &mut close, Some(b"h2"), true);

        p.on_recv(&mut c, b"").unwrap();
        let mut sent = Vec::new();
        while let Some(buf) = p.produce_send(&mut c) {
            sent.push(buf);
        }
        assert_eq!(&sent[0], frame::PREFACE);
        assert_eq!(FrameHeader::parse(&sent[1]).unwrap().0.frame_type, FrameType::Settings);
        let (hdr, _, _) = FrameHeader::parse(&sent[2]).unwrap();
        assert_eq!(hdr.frame_type, FrameType::Headers);
        assert_eq!(hdr.flags, flags::END_HEADERS | flags::END_STREAM);

        let mut enc = hpack::Encoder::new(0);
        let headers_block = enc.encode_block(
            &[(":status", "200"), ("content-type", "text/plain"), ("content-length", "2")],
            hpack::Indexing::Without,
        );
        let mut server_bytes = frame::make_initial_settings();
        server_bytes.extend(frame::make_settings_ack());
        server_bytes.extend(frame::make_headers(STREAM_ID, &headers_block, false));
        server_bytes.extend(frame::make_data(STREAM_ID, b"OK", true));

        p.on_recv(&mut c, &server_bytes).unwrap();

        match handle.wait_done(1000).unwrap() {
            ClientResult::Done { status, body } => {
                assert_eq!(status, 200);
                assert_eq!(body, b"OK");
            }
            ClientResult::Failed => panic!("expected Done"),
        }
    }

    #[test]
    fn h2_total_timeout_fails_the_pending_request() {
        let request = ClientRequest::new(Method::Get, "x", "/");
        let (mut p, handle) = HybridClient::new(request, Http2Config::default());
        let mut timers = TimerWheel::new();
        let (mut tag, mut locked, mut close) = (None, false, false);
        let mut c = ctx(&mut timers, &mut tag, &mut locked, &mut close, Some(b"h2"), true);

        p.on_recv(&mut c, b"").unwrap();
        p.on_timeout(&mut c, TimerKind::H2TotalTimeout).unwrap();

        assert!(matches!(handle.wait_done(0), Some(ClientResult::Failed)));
        assert!(close);
    }
}
