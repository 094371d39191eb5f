//! HTTP/1.1 server processor: request-line + header parsing, content-length
//! and chunked body framing, and persistent-connection reuse.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::connection::{ProcessorCtx, RecvAction};
use crate::error::{CoreError, Result};
use crate::handler::{ConnectionInfo, Handler};
use crate::parser::h1::request::Request;
use crate::parser::h1::response::Response;
use crate::parser::Status;
use crate::processor::Processor;
use crate::timer::TimerKind;

/// How the body of an in-progress request is framed (RFC 9112 §6).
#[derive(Debug, Clone, Copy)]
enum BodyFraming {
    ContentLength(u64),
    Chunked,
}

#[derive(Debug)]
enum Phase {
    /// Waiting for a complete request line + header block.
    Head,
    /// Head parsed; accumulating the body.
    Body {
        req: Request,
        framing: BodyFraming,
        body: Vec<u8>,
    },
}

/// Attempts to fully decode a chunked body from the front of `buf`
/// (RFC 9112 §7.1). Returns `Ok(None)` if the terminating zero-length chunk
/// plus trailer section has not arrived yet. Shared with the hybrid HTTPS
/// client processor's HTTP/1.1 response path, which decodes the same wire
/// framing in the other direction.
pub(crate) fn try_decode_chunked(buf: &[u8]) -> std::result::Result<Option<(Vec<u8>, usize)>, ()> {
    let mut body = Vec::new();
    let mut pos = 0usize;

    loop {
        let line_end = buf[pos..].windows(2).position(|w| w == b"\r\n").map(|i| pos + i);
        let Some(line_end) = line_end else {
            return Ok(None);
        };
        let size_line = &buf[pos..line_end];
        let size_str = size_line.split(|&b| b == b';').next().unwrap_or(size_line);
        let size_str = std::str::from_utf8(size_str).map_err(|_| ())?;
        let size = u64::from_str_radix(size_str.trim(), 16).map_err(|_| ())?;
        pos = line_end + 2;

        if size == 0 {
            if buf[pos..].starts_with(b"\r\n") {
                return Ok(Some((body, pos + 2)));
            }
            let trailer_end = buf[pos..]
                .windows(4)
                .position(|w| w == b"\r\n\r\n")
                .map(|i| pos + i + 4);
            return match trailer_end {
                Some(end) => Ok(Some((body, end))),
                None => Ok(None),
            };
        }

        let size = size as usize;
        if buf.len() < pos + size + 2 {
            return Ok(None);
        }
        body.extend_from_slice(&buf[pos..pos + size]);
        pos += size;
        if &buf[pos..pos + 2] != b"\r\n" {
            return Err(());
        }
        pos += 2;
    }
}

/// Plain HTTP/1.1 request/response cycle, one connection at a time, reused
/// across requests while the client asks to keep the connection alive.
pub struct Http1Processor {
    handler: Arc<dyn Handler>,
    phase: Phase,
    out_queue: VecDeque<Vec<u8>>,
}

impl std::fmt::Debug for Http1Processor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Http1Processor").field("phase", &self.phase).finish()
    }
}

impl Http1Processor {
    /// A fresh processor, installed by the detector on an HTTP/1.x method
    /// match.
    pub fn new(handler: Arc<dyn Handler>) -> Self {
        Self {
            handler,
            phase: Phase::Head,
            out_queue: VecDeque::new(),
        }
    }

    fn finish_request(&mut self, ctx: &mut ProcessorCtx<'_>, mut req: Request, body: Vec<u8>) {
        let info = ConnectionInfo {
            id: ctx.conn_id,
            peer_addr: ctx.peer_addr,
        };
        let keep_alive = req.keep_alive();
        req.body = body;
        let mut resp = Response::new_with_status(req.version, Status::NoContent);
        self.handler.on_http(&info, &req, &mut resp);

        let mut resp = resp;
        if !keep_alive {
            resp = resp.header("Connection", "close");
        }
        self.out_queue.push_back(resp.write_full());

        if !keep_alive {
            ctx.request_close();
        }
        self.phase = Phase::Head;
    }
}

impl Processor for Http1Processor {
    fn on_recv(&mut self, ctx: &mut ProcessorCtx<'_>, bytes: &[u8]) -> Result<RecvAction> {
        match &self.phase {
            Phase::Head => match Request::parse(bytes) {
                Ok(None) => Ok(RecvAction::Consumed(0)),
                Err(_) => Err(CoreError::Protocol {
                    message: "malformed HTTP/1.1 request head".into(),
                    stream: None,
                }),
                Ok(Some((req, consumed))) => {
                    ctx.set_protocol_tag("http/1.1");
                    if req.is_chunked() {
                        self.phase = Phase::Body {
                            req,
                            framing: BodyFraming::Chunked,
                            body: Vec::new(),
                        };
                    } else {
                        let len = req.content_length().unwrap_or(0);
                        if len == 0 {
                            self.finish_request(ctx, req, Vec::new());
                        } else {
                            self.phase = Phase::Body {
                                req,
                                framing: BodyFraming::ContentLength(len),
                                body: Vec::new(),
                            };
                        }
                    }
                    Ok(RecvAction::Consumed(consumed))
                }
            },
            Phase::Body {
                framing: BodyFraming::ContentLength(need),
                ..
            } => {
                let need = *need as usize;
                let Phase::Body { req, body, .. } = std::mem::replace(&mut self.phase, Phase::Head) else {
                    unreachable!("matched Body above");
                };
                let mut body = body;
                let still_needed = need - body.len();
                let take = bytes.len().min(still_needed);
                body.extend_from_slice(&bytes[..take]);

                if body.len() == need {
                    self.finish_request(ctx, req, body);
                } else {
                    self.phase = Phase::Body {
                        req,
                        framing: BodyFraming::ContentLength(need as u64),
                        body,
                    };
                }
                Ok(RecvAction::Consumed(take))
            }
            Phase::Body {
                framing: BodyFraming::Chunked,
                ..
            } => match try_decode_chunked(bytes) {
                Ok(None) => Ok(RecvAction::Consumed(0)),
                Err(()) => Err(CoreError::Protocol {
                    message: "malformed chunked body".into(),
                    stream: None,
                }),
                Ok(Some((body, consumed))) => {
                    let Phase::Body { req, .. } = std::mem::replace(&mut self.phase, Phase::Head) else {
                        unreachable!("matched Body above");
                    };
                    self.finish_request(ctx, req, body);
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
        "http/1.1"
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
    fn get_request_produces_a_response_with_no_body() {
        let mut p = Http1Processor::new(Arc::new(NullHandler));
        let mut timers = TimerWheel::new();
        let (mut tag, mut locked, mut close) = (None, false, false);
        let mut c = ctx(&mut timers, &mut tag, &mut locked, &mut close);
        let input = b"GET / HTTP/1.1\r\nHost: x\r\n\r\n";
        let action = p.on_recv(&mut c, input).unwrap();
        assert!(matches!(action, RecvAction::Consumed(n) if n == input.len()));
        let resp = p.produce_send(&mut c).unwrap();
        let resp = String::from_utf8(resp).unwrap();
        assert!(resp.starts_with("HTTP/1.1 204 No Content\r\n"));
    }

    #[test]
    fn connection_close_is_honored_and_requests_close() {
        let mut p = Http1Processor::new(Arc::new(NullHandler));
        let mut timers = TimerWheel::new();
        let (mut tag, mut locked, mut close) = (None, false, false);
        let mut c = ctx(&mut timers, &mut tag, &mut locked, &mut close);
        let input = b"GET / HTTP/1.1\r\nConnection: close\r\n\r\n";
        p.on_recv(&mut c, input).unwrap();
        assert!(close);
    }

    #[test]
    fn content_length_body_is_accumulated_before_dispatch() {
        let mut p = Http1Processor::new(Arc::new(NullHandler));
        let mut timers = TimerWheel::new();
        let (mut tag, mut locked, mut close) = (None, false, false);
        let mut c = ctx(&mut timers, &mut tag, &mut locked, &mut close);
        let head = b"POST /x HTTP/1.1\r\nContent-Length: 5\r\n\r\n";
        let action = p.on_recv(&mut c, head).unwrap();
        assert!(matches!(action, RecvAction::Consumed(n) if n == head.len()));
        assert!(p.produce_send(&mut c).is_none());

        let action = p.on_recv(&mut c, b"hello").unwrap();
        assert!(matches!(action, RecvAction::Consumed(5)));
        assert!(p.produce_send(&mut c).is_some());
    }

    #[test]
    fn chunked_body_is_decoded_once_complete() {
        let mut p = Http1Processor::new(Arc::new(NullHandler));
        let mut timers = TimerWheel::new();
        let (mut tag, mut locked, mut close) = (None, false, false);
        let mut c = ctx(&mut timers, &mut tag, &mut locked, &mut close);
        let head = b"POST /x HTTP/1.1\r\nTransfer-Encoding: chunked\r\n\r\n";
        p.on_recv(&mut c, head).unwrap();

        let chunked = b"5\r\nhello\r\n0\r\n\r\n";
        let action = p.on_recv(&mut c, chunked).unwrap();
        assert!(matches!(action, RecvAction::Consumed(n) if n == chunked.len()));
        assert!(p.produce_send(&mut c).is_some());
    }
}
