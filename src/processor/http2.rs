//! HTTP/2 server state machine: frame parsing, HPACK decode/encode,
//! per-stream flow control, and fair round-robin response pumping.
//!
//! Connection-level errors return `Err(CoreError::Protocol { stream:
//! None, .. })`; queued response bytes accumulate on `out_queue` for
//! [`Processor::produce_send`] to drain.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::config::Http2Config;
use crate::connection::{ConnId, ProcessorCtx, RecvAction};
use crate::error::{CoreError, Result};
use crate::h2::frame::{self, flags, ErrorCode, FrameHeader, FrameType};
use crate::h2::stream::{Stream, StreamPhase};
use crate::handler::{ConnectionInfo, Handler};
use std::net::SocketAddr;
use crate::hpack;
use crate::parser::h1::request::Request;
use crate::parser::h1::response::Response;
use crate::parser::{Method, Status, Version};
use crate::processor::Processor;
use crate::timer::TimerKind;

const CONN_INITIAL_WINDOW: i64 = 65_535;
const MAX_FRAMES_PER_PUMP: usize = 8;

const FORBIDDEN_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-connection",
    "transfer-encoding",
    "upgrade",
];

/// A HEADERS block being assembled across CONTINUATION frames. All
/// subsequent CONTINUATION frames on the same stream must appear
/// contiguously.
struct Assembling {
    stream_id: u32,
    block: Vec<u8>,
    end_stream: bool,
}

/// The live HTTP/2 connection state machine.
pub struct Http2Processor {
    handler: Arc<dyn Handler>,
    config: Http2Config,
    preface_ok: bool,
    sent_settings: bool,
    streams: HashMap<u32, Stream>,
    decoder: hpack::Decoder,
    encoder: hpack::Encoder,
    assembling: Option<Assembling>,
    conn_send_window: i64,
    conn_recv_uncredited: u32,
    peer_initial_window_size: u32,
    peer_max_frame_size: u32,
    send_rr: usize,
    goaway_sent: bool,
    out_queue: VecDeque<Vec<u8>>,
}

impl std::fmt::Debug for Http2Processor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Http2Processor")
            .field("streams", &self.streams.len())
            .field("preface_ok", &self.preface_ok)
            .finish()
    }
}

impl Http2Processor {
    /// A fresh HTTP/2 server processor, installed by the detector on a
    /// preface match. The client-side HTTP/2 path (after ALPN negotiates
    /// `h2`) is handled by a distinct processor; this one is always
    /// server-side.
    pub fn new(handler: Arc<dyn Handler>, config: Http2Config) -> Self {
        Self {
            handler,
            config,
            preface_ok: false,
            sent_settings: false,
            streams: HashMap::new(),
            decoder: hpack::Decoder::new(4096),
            encoder: hpack::Encoder::new(0),
            assembling: None,
            conn_send_window: CONN_INITIAL_WINDOW,
            conn_recv_uncredited: 0,
            peer_initial_window_size: 65_535,
            peer_max_frame_size: 16_384,
            send_rr: 0,
            goaway_sent: false,
            out_queue: VecDeque::new(),
        }
    }

    fn conn_error(&mut self, message: &'static str, code: ErrorCode) -> CoreError {
        if !self.goaway_sent {
            self.goaway_sent = true;
            self.out_queue.push_back(frame::make_goaway(self.max_seen_stream(), code, b""));
        }
        CoreError::Protocol {
            message: message.into(),
            stream: None,
        }
    }

    fn max_seen_stream(&self) -> u32 {
        self.streams.keys().copied().max().unwrap_or(0)
    }

    fn reset_stream(&mut self, stream_id: u32, code: ErrorCode) {
        self.streams.remove(&stream_id);
        self.out_queue.push_back(frame::make_rst_stream(stream_id, code));
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
                    let old = self.peer_initial_window_size as i64;
                    self.peer_initial_window_size = val;
                    let delta = val as i64 - old;
                    for stream in self.streams.values_mut() {
                        stream.send_window += delta;
                    }
                }
                frame::setting_id::MAX_FRAME_SIZE => {
                    self.peer_max_frame_size = val.clamp(*frame::MAX_FRAME_SIZE_RANGE.start(), *frame::MAX_FRAME_SIZE_RANGE.end());
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn handle_headers_block(&mut self, stream_id: u32, block: &[u8], end_stream: bool, conn_id: ConnId, peer_addr: SocketAddr) -> Result<()> {
        let headers = self
            .decoder
            .decode_block(block)
            .map_err(|_| self.conn_error("invalid HPACK header block", ErrorCode::CompressionError))?;

        let stream = self
            .streams
            .entry(stream_id)
            .or_insert_with(|| Stream::new(self.peer_initial_window_size, CONN_INITIAL_WINDOW));

        let mut seen_regular = false;
        for h in &headers {
            let is_pseudo = h.name.starts_with(':');
            if is_pseudo && seen_regular {
                self.reset_stream(stream_id, ErrorCode::ProtocolError);
                return Ok(());
            }
            if !is_pseudo {
                seen_regular = true;
            }
            match h.name.as_str() {
                ":method" if stream.method.is_some() => {
                    self.reset_stream(stream_id, ErrorCode::ProtocolError);
                    return Ok(());
                }
                ":method" => stream.method = Some(h.value.clone()),
                ":path" if stream.path.is_some() => {
                    self.reset_stream(stream_id, ErrorCode::ProtocolError);
                    return Ok(());
                }
                ":path" => stream.path = Some(h.value.clone()),
                ":authority" => stream.authority = Some(h.value.clone()),
                _ if is_pseudo => {}
                _ => {
                    stream.headers.insert(h.name.clone(), h.value.clone());
                }
            }
        }

        for name in stream.headers.keys() {
            if name.chars().any(|c| c.is_ascii_uppercase()) || FORBIDDEN_HEADERS.contains(&name.as_str()) {
                self.reset_stream(stream_id, ErrorCode::ProtocolError);
                return Ok(());
            }
        }

        let is_connect = stream.method.as_deref().is_some_and(|m| m.eq_ignore_ascii_case("connect"));
        if is_connect {
            if stream.path.is_some() || stream.authority.is_none() {
                self.reset_stream(stream_id, ErrorCode::ProtocolError);
                return Ok(());
            }
        } else if stream.path.is_none() {
            self.reset_stream(stream_id, ErrorCode::ProtocolError);
            return Ok(());
        }

        if end_stream {
            self.finish_stream(stream_id, conn_id, peer_addr);
        }
        Ok(())
    }

    fn finish_stream(&mut self, stream_id: u32, conn_id: ConnId, peer_addr: std::net::SocketAddr) {
        let Some(stream) = self.streams.get_mut(&stream_id) else {
            return;
        };
        stream.phase = StreamPhase::HalfClosedRemote;

        let method = stream
            .method
            .as_deref()
            .and_then(|m| Method::from_bytes(m.as_bytes()))
            .unwrap_or(Method::Get);
        let target = stream.path.clone().unwrap_or_else(|| "/".to_string());
        let mut req_headers: Vec<crate::parser::Header> = stream
            .headers
            .iter()
            .map(|(k, v)| crate::parser::Header {
                name: k.clone(),
                value: v.clone(),
            })
            .collect();
        if let Some(authority) = &stream.authority {
            req_headers.push(crate::parser::Header {
                name: "host".to_string(),
                value: authority.clone(),
            });
        }
        let req = Request {
            method,
            target,
            version: Version::H2,
            headers: req_headers,
            body: stream.body.clone(),
        };

        let info = ConnectionInfo { id: conn_id, peer_addr };
        let mut resp = Response::new_with_status(Version::H2, Status::r#Ok);
        self.handler.on_http(&info, &req, &mut resp);

        self.send_response(stream_id, &resp);
    }

    fn send_response(&mut self, stream_id: u32, resp: &Response) {
        let status_str = resp.status.code().to_string();
        let content_length = resp.body.len().to_string();
        let has_content_type = resp.headers.iter().any(|h| h.name.eq_ignore_ascii_case("content-type"));

        let mut pairs: Vec<(String, String)> = vec![(":status".to_string(), status_str)];
        if has_content_type {
            if let Some(h) = resp.headers.iter().find(|h| h.name.eq_ignore_ascii_case("content-type")) {
                pairs.push(("content-type".to_string(), h.value.clone()));
            }
        } else {
            pairs.push(("content-type".to_string(), "text/plain".to_string()));
        }
        pairs.push(("content-length".to_string(), content_length));
        for h in &resp.headers {
            let lname = h.name.to_ascii_lowercase();
            if lname == "content-type" || lname == "content-length" {
                continue;
            }
            pairs.push((lname, h.value.clone()));
        }

        let refs: Vec<(&str, &str)> = pairs.iter().map(|(n, v)| (n.as_str(), v.as_str())).collect();
        let block = self.encoder.encode_block(&refs, hpack::Indexing::Without);

        let body_empty = resp.body.is_empty();
        self.out_queue.push_back(frame::make_headers(stream_id, &block, body_empty));

        if let Some(stream) = self.streams.get_mut(&stream_id) {
            if body_empty {
                stream.phase = StreamPhase::Closed;
            } else {
                stream.out_body = resp.body.clone();
                stream.out_off = 0;
                // DATA framing is left to the next `pump_all_streams` pass
                // rather than emitted here, so that several streams
                // finishing within the same `on_recv` batch interleave
                // fairly instead of the first one draining its whole body
                // before the next stream's HEADERS are even parsed.
            }
        }
    }

    /// Emits up to [`MAX_FRAMES_PER_PUMP`] DATA frames for one stream,
    /// honoring connection and stream windows plus the peer's max frame
    /// size.
    fn try_send_data(&mut self, stream_id: u32) {
        let max_frame = self.peer_max_frame_size as i64;
        let mut frames_sent = 0;
        loop {
            if frames_sent >= MAX_FRAMES_PER_PUMP || self.conn_send_window <= 0 {
                break;
            }
            let Some(stream) = self.streams.get_mut(&stream_id) else {
                break;
            };
            if !stream.has_pending_output() || stream.send_window <= 0 {
                break;
            }
            let remaining = (stream.out_body.len() - stream.out_off) as i64;
            let allowance = self.conn_send_window.min(stream.send_window).min(max_frame);
            if allowance <= 0 {
                break;
            }
            let chunk = allowance.min(remaining) as usize;
            let end = stream.out_off + chunk;
            let payload = stream.out_body[stream.out_off..end].to_vec();
            stream.out_off = end;
            stream.send_window -= chunk as i64;
            self.conn_send_window -= chunk as i64;
            let end_stream = !stream.has_pending_output();
            if end_stream {
                stream.phase = StreamPhase::Closed;
            }
            self.out_queue.push_back(frame::make_data(stream_id, &payload, end_stream));
            frames_sent += 1;
        }
        self.streams.retain(|_, s| !matches!(s.phase, StreamPhase::Closed) || s.has_pending_output());
    }

    /// Services every stream with pending output once, starting from a
    /// rotating point, so K equal-length streams interleave fairly.
    fn pump_all_streams(&mut self) {
        let mut ids: Vec<u32> = self.streams.keys().copied().collect();
        if ids.is_empty() {
            return;
        }
        ids.sort_unstable();
        let start = self.send_rr % ids.len();
        self.send_rr = self.send_rr.wrapping_add(1);
        for i in 0..ids.len() {
            let sid = ids[(start + i) % ids.len()];
            self.try_send_data(sid);
        }
    }

    fn on_data_frame(&mut self, stream_id: u32, flags: u8, payload: &[u8], conn_id: ConnId, peer_addr: SocketAddr) -> Result<()> {
        let mut data = payload;
        if flags & frame::flags::PADDED != 0 {
            let pad_len = *data.first().ok_or_else(|| self.conn_error("PADDED DATA too short", ErrorCode::FrameSizeError))? as usize;
            data = &data[1..];
            if pad_len > data.len() {
                return Err(self.conn_error("DATA pad length exceeds payload", ErrorCode::ProtocolError));
            }
            data = &data[..data.len() - pad_len];
        }
        let end_stream = flags & crate::h2::frame::flags::END_STREAM != 0;
        let n = data.len() as u32;

        if let Some(stream) = self.streams.get_mut(&stream_id) {
            stream.body.extend_from_slice(data);
            stream.uncredited += n;
        }
        self.conn_recv_uncredited += n;

        if self.conn_recv_uncredited >= self.config.window_update_threshold {
            self.out_queue.push_back(frame::make_window_update(0, self.conn_recv_uncredited));
            self.conn_recv_uncredited = 0;
        }
        if let Some(stream) = self.streams.get_mut(&stream_id) {
            if stream.uncredited >= self.config.window_update_threshold {
                let credit = stream.uncredited;
                stream.uncredited = 0;
                self.out_queue.push_back(frame::make_window_update(stream_id, credit));
            }
        }

        if end_stream {
            self.finish_stream(stream_id, conn_id, peer_addr);
        }
        Ok(())
    }

    fn parse_one_frame(&mut self, bytes: &[u8], ctx: &mut ProcessorCtx<'_>) -> Result<Option<usize>> {
        let Some((hdr, payload, total)) = FrameHeader::parse(bytes) else {
            return Ok(None);
        };

        if let Some(asm) = &self.assembling {
            let continues = hdr.frame_type == FrameType::Continuation && hdr.stream_id == asm.stream_id;
            if !continues {
                return Err(self.conn_error(
                    "frame interleaved with an in-progress CONTINUATION sequence",
                    ErrorCode::ProtocolError,
                ));
            }
        }

        match hdr.frame_type {
            FrameType::Settings => {
                if hdr.flags & flags::ACK == 0 {
                    self.apply_settings(payload)?;
                    self.pump_all_streams();
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
            FrameType::Priority => {
                if hdr.stream_id == 0 || payload.len() < 5 {
                    return Err(self.conn_error("PRIORITY frame malformed", ErrorCode::FrameSizeError));
                }
                let dep = u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]) & 0x7fff_ffff;
                let weight = payload[4] as u16 + 1;
                let stream = self
                    .streams
                    .entry(hdr.stream_id)
                    .or_insert_with(|| Stream::new(self.peer_initial_window_size, CONN_INITIAL_WINDOW));
                stream.dependency = dep;
                stream.weight = weight;
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
                    self.pump_all_streams();
                } else if self.streams.contains_key(&hdr.stream_id) {
                    self.streams.get_mut(&hdr.stream_id).unwrap().send_window += inc as i64;
                    self.try_send_data(hdr.stream_id);
                } else {
                    return Err(self.conn_error("WINDOW_UPDATE for closed-idle stream", ErrorCode::ProtocolError));
                }
            }
            FrameType::RstStream => {
                self.streams.remove(&hdr.stream_id);
            }
            FrameType::Headers | FrameType::Continuation => {
                if hdr.stream_id == 0 {
                    return Err(self.conn_error("HEADERS on stream 0", ErrorCode::ProtocolError));
                }
                let mut body = payload;
                if hdr.frame_type == FrameType::Headers {
                    if hdr.flags & flags::PADDED != 0 {
                        let pad_len = *body.first().ok_or_else(|| {
                            CoreError::Protocol { message: "PADDED HEADERS too short".into(), stream: None }
                        })? as usize;
                        body = &body[1..];
                        if pad_len > body.len() {
                            return Err(self.conn_error("HEADERS pad length exceeds payload", ErrorCode::ProtocolError));
                        }
                        body = &body[..body.len() - pad_len];
                    }
                    if hdr.flags & flags::PRIORITY != 0 {
                        if body.len() < 5 {
                            return Err(self.conn_error("HEADERS PRIORITY prefix too short", ErrorCode::FrameSizeError));
                        }
                        let dep = u32::from_be_bytes([body[0], body[1], body[2], body[3]]) & 0x7fff_ffff;
                        let weight = body[4] as u16 + 1;
                        let stream = self
                            .streams
                            .entry(hdr.stream_id)
                            .or_insert_with(|| Stream::new(self.peer_initial_window_size, CONN_INITIAL_WINDOW));
                        stream.dependency = dep;
                        stream.weight = weight;
                        body = &body[5..];
                    }
                    self.assembling = Some(Assembling {
                        stream_id: hdr.stream_id,
                        block: body.to_vec(),
                        end_stream: hdr.flags & flags::END_STREAM != 0,
                    });
                } else {
                    let asm = self.assembling.as_mut().expect("checked above");
                    asm.block.extend_from_slice(body);
                }

                if hdr.flags & flags::END_HEADERS != 0 {
                    let asm = self.assembling.take().expect("END_HEADERS implies assembling state");
                    self.handle_headers_block(asm.stream_id, &asm.block, asm.end_stream, ctx.conn_id, ctx.peer_addr)?;
                }
            }
            FrameType::Data => {
                if hdr.stream_id == 0 {
                    return Err(self.conn_error("DATA on stream 0", ErrorCode::ProtocolError));
                }
                self.on_data_frame(hdr.stream_id, hdr.flags, payload, ctx.conn_id, ctx.peer_addr)?;
            }
            FrameType::GoAway => {
                // Peer is winding down; stop accepting new work but let
                // in-flight streams finish.
                self.goaway_sent = true;
            }
            FrameType::PushPromise => {
                return Err(self.conn_error("client sent PUSH_PROMISE", ErrorCode::ProtocolError));
            }
            FrameType::Unknown(_) => {}
        }

        Ok(Some(total))
    }
}

impl Processor for Http2Processor {
    fn on_recv(&mut self, ctx: &mut ProcessorCtx<'_>, bytes: &[u8]) -> Result<RecvAction> {
        if !self.sent_settings {
            self.sent_settings = true;
            self.out_queue.push_back(frame::make_initial_settings());
        }

        let mut offset = 0;

        if !self.preface_ok {
            if bytes.len() < frame::PREFACE.len() {
                return Ok(RecvAction::Consumed(0));
            }
            if &bytes[..frame::PREFACE.len()] != frame::PREFACE {
                self.goaway_sent = true;
                self.out_queue.push_back(frame::make_goaway(0, ErrorCode::ProtocolError, b""));
                return Err(CoreError::Protocol {
                    message: "bad HTTP/2 connection preface".into(),
                    stream: None,
                });
            }
            self.preface_ok = true;
            offset += frame::PREFACE.len();
        }

        loop {
            match self.parse_one_frame(&bytes[offset..], ctx)? {
                Some(consumed) => offset += consumed,
                None => break,
            }
        }

        // Every stream whose request completed during this batch has
        // queued its HEADERS already; DATA framing for all of them is
        // serviced here, together, through the round-robin pass, so
        // streams that finished earlier in the batch don't drain ahead of
        // ones that finished later in the same call.
        self.pump_all_streams();

        ctx.set_protocol_tag("h2");
        Ok(RecvAction::Consumed(offset))
    }

    fn produce_send(&mut self, _ctx: &mut ProcessorCtx<'_>) -> Option<Vec<u8>> {
        self.out_queue.pop_front()
    }

    fn on_timeout(&mut self, _ctx: &mut ProcessorCtx<'_>, _kind: TimerKind) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "http/2"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::NullHandler;
    use crate::timer::TimerWheel;

    fn ctx<'a>(
        timers: &'a mut TimerWheel,
        tag: &'a mut Option<String>,
        locked: &'a mut bool,
        close: &'a mut bool,
    ) -> ProcessorCtx<'a> {
        ProcessorCtx {
            conn_id: ConnId { thread: 0, local: 0 },
            peer_addr: "127.0.0.1:1".parse().unwrap(),
            timers,
            protocol_tag: tag,
            tag_locked: locked,
            close_requested: close,
            alpn: None,
            handshake_done: true,
        }
    }

    fn small_request_bytes() -> Vec<u8> {
        let mut enc = hpack::Encoder::new(0);
        let block = enc.encode_block(
            &[
                (":method", "GET"),
                (":path", "/"),
                (":authority", "x"),
                (":scheme", "https"),
            ],
            hpack::Indexing::Without,
        );
        let mut out = frame::PREFACE.to_vec();
        out.extend(frame::make_headers(1, &block, true));
        out
    }

    #[test]
    fn get_request_produces_headers_and_data_response() {
        let mut p = Http2Processor::new(Arc::new(NullHandler), Http2Config::default());
        let mut timers = TimerWheel::new();
        let mut tag = None;
        let mut locked = false;
        let mut close = false;
        let input = small_request_bytes();
        let mut c = ctx(&mut timers, &mut tag, &mut locked, &mut close);
        let action = p.on_recv(&mut c, &input).unwrap();
        match action {
            RecvAction::Consumed(n) => assert_eq!(n, input.len()),
            other => panic!("unexpected {other:?}"),
        }

        let mut sent = Vec::new();
        while let Some(buf) = p.produce_send(&mut c) {
            sent.push(buf);
        }
        // settings, headers, data (NullHandler responds 204 no content -> empty body, no DATA)
        assert!(sent.iter().any(|f| FrameHeader::parse(f).unwrap().0.frame_type == FrameType::Headers));
    }

    #[test]
    fn bad_preface_is_rejected() {
        let mut p = Http2Processor::new(Arc::new(NullHandler), Http2Config::default());
        let mut timers = TimerWheel::new();
        let mut tag = None;
        let mut locked = false;
        let mut close = false;
        let mut c = ctx(&mut timers, &mut tag, &mut locked, &mut close);
        let err = p.on_recv(&mut c, b"not the preface here..........").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Protocol);
    }

    /// Responds to every request with a fixed-length body of `'A'`s,
    /// regardless of method or path.
    struct FixedBodyHandler {
        len: usize,
    }

    impl Handler for FixedBodyHandler {
        fn on_http(&self, _info: &ConnectionInfo, _req: &Request, resp: &mut Response) {
            resp.status = Status::r#Ok;
            resp.body = vec![b'A'; self.len];
        }
    }

    #[test]
    fn two_streams_finishing_in_one_batch_are_serviced_round_robin() {
        // Both streams' HEADERS complete within the same `on_recv` call,
        // and a small INITIAL_WINDOW_SIZE caps each to a single 10-byte
        // chunk this round. If DATA were emitted inline from
        // `finish_stream` instead of through `pump_all_streams`, stream 1's
        // chunk would queue before stream 3's HEADERS had even been
        // parsed.
        let mut p = Http2Processor::new(Arc::new(FixedBodyHandler { len: 40 }), Http2Config::default());
        let mut timers = TimerWheel::new();
        let mut tag = None;
        let mut locked = false;
        let mut close = false;
        let mut c = ctx(&mut timers, &mut tag, &mut locked, &mut close);

        let mut settings_payload = Vec::new();
        settings_payload.extend_from_slice(&frame::setting_id::INITIAL_WINDOW_SIZE.to_be_bytes());
        settings_payload.extend_from_slice(&10u32.to_be_bytes());
        let settings = frame::make_frame(FrameType::Settings, 0, 0, &settings_payload);

        let mut enc = hpack::Encoder::new(0);
        let block1 = enc.encode_block(
            &[(":method", "GET"), (":path", "/a"), (":authority", "x"), (":scheme", "https")],
            hpack::Indexing::Without,
        );
        let block3 = enc.encode_block(
            &[(":method", "GET"), (":path", "/b"), (":authority", "x"), (":scheme", "https")],
            hpack::Indexing::Without,
        );

        let mut input = frame::PREFACE.to_vec();
        input.extend(settings);
        input.extend(frame::make_headers(1, &block1, true));
        input.extend(frame::make_headers(3, &block3, true));

        p.on_recv(&mut c, &input).unwrap();

        let mut seen = Vec::new();
        while let Some(buf) = p.produce_send(&mut c) {
            let (hdr, payload, _) = FrameHeader::parse(&buf).unwrap();
            seen.push((hdr.frame_type, hdr.stream_id, payload.len()));
        }

        let first_data = seen
            .iter()
            .position(|(t, _, _)| *t == FrameType::Data)
            .expect("a DATA frame was emitted");
        assert!(
            seen[..first_data].iter().filter(|(t, _, _)| *t == FrameType::Headers).count() == 2,
            "both streams' HEADERS must queue before either stream's DATA: {seen:?}"
        );

        let data_frames: Vec<_> = seen.iter().filter(|(t, _, _)| *t == FrameType::Data).collect();
        assert_eq!(
            data_frames.len(),
            2,
            "each stream's 10-byte window only admits one chunk this round: {seen:?}"
        );
        assert_eq!(data_frames[0].1, 1);
        assert_eq!(data_frames[1].1, 3);
        assert_eq!(data_frames[0].2, 10, "stream 1 must not drain its whole body before stream 3's turn");
        assert_eq!(data_frames[1].2, 10);
    }

    #[test]
    fn window_update_on_unknown_stream_is_a_connection_error() {
        let mut p = Http2Processor::new(Arc::new(NullHandler), Http2Config::default());
        let mut timers = TimerWheel::new();
        let mut tag = None;
        let mut locked = false;
        let mut close = false;
        let mut c = ctx(&mut timers, &mut tag, &mut locked, &mut close);
        let mut input = frame::PREFACE.to_vec();
        input.extend(frame::make_window_update(7, 100));
        assert!(p.on_recv(&mut c, &input).is_err());
    }
}
