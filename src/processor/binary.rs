//! Length-prefixed binary-stream processor: a four-byte magic (consumed by
//! the detector's probe but re-delivered here since `Swap` never discards
//! bytes) followed by a stream of `u32` big-endian length + payload
//! messages.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::connection::{ProcessorCtx, RecvAction};
use crate::error::{CoreError, Result};
use crate::handler::{BinaryRequest, BinaryResponse, ConnectionInfo, Handler};
use crate::processor::Processor;
use crate::timer::TimerKind;

const LENGTH_PREFIX_SIZE: usize = 4;
const MAGIC_SIZE: usize = 4;

/// Upper bound on a single message's payload, generous for typical
/// request/response sizes without letting a forged length exhaust memory.
const MAX_MESSAGE_SIZE: u32 = 64 * 1024 * 1024;

#[derive(Debug)]
pub struct BinaryProcessor {
    handler: Arc<dyn Handler>,
    magic_consumed: bool,
    out_queue: VecDeque<Vec<u8>>,
}

impl BinaryProcessor {
    /// A fresh processor, installed by the detector on a binary-magic
    /// match. The magic bytes themselves still need to be stripped from
    /// the stream on the first call.
    pub fn new(handler: Arc<dyn Handler>) -> Self {
        Self {
            handler,
            magic_consumed: false,
            out_queue: VecDeque::new(),
        }
    }
}

impl Processor for BinaryProcessor {
    fn on_recv(&mut self, ctx: &mut ProcessorCtx<'_>, bytes: &[u8]) -> Result<RecvAction> {
        if !self.magic_consumed {
            if bytes.len() < MAGIC_SIZE {
                return Ok(RecvAction::Consumed(0));
            }
            self.magic_consumed = true;
            ctx.set_protocol_tag("binary");
            return Ok(RecvAction::Consumed(MAGIC_SIZE));
        }

        if bytes.len() < LENGTH_PREFIX_SIZE {
            return Ok(RecvAction::Consumed(0));
        }
        let len = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        if len > MAX_MESSAGE_SIZE {
            return Err(CoreError::Resource("binary message exceeded the configured size limit"));
        }
        let len = len as usize;
        if bytes.len() < LENGTH_PREFIX_SIZE + len {
            return Ok(RecvAction::Consumed(0));
        }

        let payload = bytes[LENGTH_PREFIX_SIZE..LENGTH_PREFIX_SIZE + len].to_vec();
        let info = ConnectionInfo {
            id: ctx.conn_id,
            peer_addr: ctx.peer_addr,
        };
        let req = BinaryRequest { payload };
        let mut resp = BinaryResponse::default();
        self.handler.on_binary(&info, &req, &mut resp);

        let mut out = Vec::with_capacity(LENGTH_PREFIX_SIZE + resp.payload.len());
        out.extend_from_slice(&(resp.payload.len() as u32).to_be_bytes());
        out.extend_from_slice(&resp.payload);
        self.out_queue.push_back(out);

        Ok(RecvAction::Consumed(LENGTH_PREFIX_SIZE + len))
    }

    fn produce_send(&mut self, _ctx: &mut ProcessorCtx<'_>) -> Option<Vec<u8>> {
        self.out_queue.pop_front()
    }

    fn on_timeout(&mut self, _ctx: &mut ProcessorCtx<'_>, _kind: TimerKind) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "binary"
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

    struct EchoHandler;
    impl Handler for EchoHandler {
        fn on_binary(&self, _info: &ConnectionInfo, req: &BinaryRequest, resp: &mut BinaryResponse) {
            resp.payload = req.payload.clone();
        }
    }

    #[test]
    fn strips_magic_then_echoes_a_length_prefixed_message() {
        let mut p = BinaryProcessor::new(Arc::new(EchoHandler));
        let mut timers = TimerWheel::new();
        let (mut tag, mut locked, mut close) = (None, false, false);
        let mut c = ctx(&mut timers, &mut tag, &mut locked, &mut close);

        let magic = [0xCA, 0xFE, 0xBA, 0xBE];
        let action = p.on_recv(&mut c, &magic).unwrap();
        assert!(matches!(action, RecvAction::Consumed(4)));

        let mut msg = 5u32.to_be_bytes().to_vec();
        msg.extend_from_slice(b"hello");
        let action = p.on_recv(&mut c, &msg).unwrap();
        assert!(matches!(action, RecvAction::Consumed(n) if n == msg.len()));

        let reply = p.produce_send(&mut c).unwrap();
        assert_eq!(&reply[4..], b"hello");
    }

    #[test]
    fn waits_for_the_full_payload_before_dispatching() {
        let mut p = BinaryProcessor::new(Arc::new(EchoHandler));
        p.magic_consumed = true;
        let mut timers = TimerWheel::new();
        let (mut tag, mut locked, mut close) = (None, false, false);
        let mut c = ctx(&mut timers, &mut tag, &mut locked, &mut close);

        let mut msg = 5u32.to_be_bytes().to_vec();
        msg.extend_from_slice(b"hel");
        let action = p.on_recv(&mut c, &msg).unwrap();
        assert!(matches!(action, RecvAction::Consumed(0)));
        assert!(p.produce_send(&mut c).is_none());
    }

    #[test]
    fn oversized_length_prefix_is_rejected() {
        let mut p = BinaryProcessor::new(Arc::new(NullHandler));
        p.magic_consumed = true;
        let mut timers = TimerWheel::new();
        let (mut tag, mut locked, mut close) = (None, false, false);
        let mut c = ctx(&mut timers, &mut tag, &mut locked, &mut close);

        let msg = (MAX_MESSAGE_SIZE + 1).to_be_bytes();
        assert!(p.on_recv(&mut c, &msg).is_err());
    }
}
