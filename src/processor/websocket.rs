//! WebSocket processor: completes the HTTP/1.1 Upgrade handshake (RFC 6455
//! §1.3), then exchanges framed text/binary/ping/pong/close messages.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::connection::{ProcessorCtx, RecvAction};
use crate::error::{CoreError, Result};
use crate::handler::{ConnectionInfo, Handler};
use crate::parser::h1::request::Request;
use crate::parser::ws::{self, Frame, FrameError, OpCode};
use crate::processor::Processor;
use crate::timer::TimerKind;

/// Upper bound on a single frame's payload, generous enough for ordinary
/// chat/control traffic without letting one frame exhaust the recv buffer.
const MAX_FRAME_PAYLOAD: usize = 16 * 1024 * 1024;

#[derive(Debug)]
enum Phase {
    AwaitingHandshake,
    Open,
    Closed,
}

/// Server-side WebSocket connection. Installed by the detector once it sees
/// an HTTP/1.x `Upgrade: websocket` request line; this processor re-parses
/// that same request to extract `Sec-WebSocket-Key` and completes the
/// handshake itself.
pub struct WebSocketProcessor {
    handler: Arc<dyn Handler>,
    phase: Phase,
    out_queue: VecDeque<Vec<u8>>,
}

impl std::fmt::Debug for WebSocketProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketProcessor").field("phase", &self.phase).finish()
    }
}

impl WebSocketProcessor {
    /// A processor still waiting for the upgrade request's headers.
    pub fn new_handshake(handler: Arc<dyn Handler>) -> Self {
        Self {
            handler,
            phase: Phase::AwaitingHandshake,
            out_queue: VecDeque::new(),
        }
    }

    fn try_handshake(&mut self, ctx: &mut ProcessorCtx<'_>, bytes: &[u8]) -> Result<RecvAction> {
        match Request::parse(bytes) {
            Ok(None) => Ok(RecvAction::Consumed(0)),
            Err(_) => Err(CoreError::Protocol {
                message: "malformed websocket upgrade request".into(),
                stream: None,
            }),
            Ok(Some((req, consumed))) => {
                let is_upgrade = req
                    .header("upgrade")
                    .is_some_and(|v| v.eq_ignore_ascii_case("websocket"));
                let key = req.header("sec-websocket-key").map(str::to_string);
                let (Some(key), true) = (key, is_upgrade) else {
                    return Err(CoreError::Protocol {
                        message: "request did not request a websocket upgrade".into(),
                        stream: None,
                    });
                };

                ctx.set_protocol_tag("websocket");
                let accept = ws::accept_key(&key);
                let response = format!(
                    "HTTP/1.1 101 Switching Protocols\r\n\
                     Upgrade: websocket\r\n\
                     Connection: Upgrade\r\n\
                     Sec-WebSocket-Accept: {accept}\r\n\r\n"
                );
                self.out_queue.push_back(response.into_bytes());

                let info = ConnectionInfo {
                    id: ctx.conn_id,
                    peer_addr: ctx.peer_addr,
                };
                self.handler.on_connect(&info);

                self.phase = Phase::Open;
                Ok(RecvAction::Consumed(consumed))
            }
        }
    }

    fn handle_frame(&mut self, ctx: &mut ProcessorCtx<'_>, frame: Frame) {
        let info = ConnectionInfo {
            id: ctx.conn_id,
            peer_addr: ctx.peer_addr,
        };
        match frame.opcode {
            OpCode::Ping => {
                self.out_queue
                    .push_back(ws::encode_frame(OpCode::Pong, true, &frame.payload));
            }
            OpCode::Pong => {}
            OpCode::Close => {
                self.out_queue
                    .push_back(ws::encode_frame(OpCode::Close, true, &frame.payload));
                self.phase = Phase::Closed;
                ctx.request_close();
            }
            OpCode::Text | OpCode::Binary | OpCode::Continue => {
                if let Some(reply) = self.handler.on_ws(&info, &frame) {
                    self.out_queue
                        .push_back(ws::encode_frame(reply.opcode, reply.fin, &reply.payload));
                }
            }
        }
    }
}

impl Processor for WebSocketProcessor {
    fn on_recv(&mut self, ctx: &mut ProcessorCtx<'_>, bytes: &[u8]) -> Result<RecvAction> {
        match self.phase {
            Phase::AwaitingHandshake => self.try_handshake(ctx, bytes),
            Phase::Closed => Ok(RecvAction::Consumed(bytes.len())),
            Phase::Open => match ws::decode_frame(bytes, true, MAX_FRAME_PAYLOAD) {
                Ok(None) => Ok(RecvAction::Consumed(0)),
                Err(e) => Err(CoreError::Protocol {
                    message: match e {
                        FrameError::ReservedBitsSet => "reserved bits set".into(),
                        FrameError::UnknownOpcode => "unknown opcode".into(),
                        FrameError::InvalidControlFrame => "invalid control frame".into(),
                        FrameError::MaskRequirementViolated => "client frame was not masked".into(),
                        FrameError::TooLarge => "frame payload too large".into(),
                    },
                    stream: None,
                }),
                Ok(Some((frame, consumed))) => {
                    self.handle_frame(ctx, frame);
                    Ok(RecvAction::Consumed(consumed))
                }
            },
        }
    }

    fn produce_send(&mut self, _ctx: &mut ProcessorCtx<'_>) -> Option<Vec<u8>> {
        self.out_queue.pop_front()
    }

    fn on_timeout(&mut self, _ctx: &mut ProcessorCtx<'_>, _kind: TimerKind) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "websocket"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnId;
    use crate::handler::NullHandler;
    use crate::timer::TimerWheel;

    fn ctx<'a>(timers: &'a mut TimerWheel, tag: &'a mut Option<String>, locked: &'a mut bool, close: &'a mut bool) -> ProcessorCtx<'a> {
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

    #[test]
    fn handshake_produces_the_rfc_worked_example_accept_value() {
        let mut p = WebSocketProcessor::new_handshake(Arc::new(NullHandler));
        let mut timers = TimerWheel::new();
        let (mut tag, mut locked, mut close) = (None, false, false);
        let mut c = ctx(&mut timers, &mut tag, &mut locked, &mut close);
        let req = b"GET /chat HTTP/1.1\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n";
        p.on_recv(&mut c, req).unwrap();
        let resp = p.produce_send(&mut c).unwrap();
        let resp = String::from_utf8(resp).unwrap();
        assert!(resp.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
        assert!(resp.contains("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n"));
    }

    #[test]
    fn ping_after_handshake_is_answered_with_pong() {
        let mut p = WebSocketProcessor::new_handshake(Arc::new(NullHandler));
        let mut timers = TimerWheel::new();
        let (mut tag, mut locked, mut close) = (None, false, false);
        let mut c = ctx(&mut timers, &mut tag, &mut locked, &mut close);
        let req = b"GET /chat HTTP/1.1\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n";
        p.on_recv(&mut c, req).unwrap();
        p.produce_send(&mut c);

        let mut ping = vec![0x89u8, 0x80];
        ping.extend_from_slice(&[0, 0, 0, 0]);
        p.on_recv(&mut c, &ping).unwrap();
        let reply = p.produce_send(&mut c).unwrap();
        assert_eq!(reply[0] & 0x0f, 0xA);
    }

    #[test]
    fn close_frame_requests_connection_close() {
        let mut p = WebSocketProcessor::new_handshake(Arc::new(NullHandler));
        let mut timers = TimerWheel::new();
        let (mut tag, mut locked, mut close) = (None, false, false);
        let mut c = ctx(&mut timers, &mut tag, &mut locked, &mut close);
        let req = b"GET /chat HTTP/1.1\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n";
        p.on_recv(&mut c, req).unwrap();
        p.produce_send(&mut c);

        let mut close_frame = vec![0x88u8, 0x80];
        close_frame.extend_from_slice(&[0, 0, 0, 0]);
        p.on_recv(&mut c, &close_frame).unwrap();
        assert!(close);
    }
}
