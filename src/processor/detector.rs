//! Protocol detector: the default initial processor installed on a freshly
//! accepted connection. Sniffs the first bytes off the wire and swaps
//! itself for the processor that actually speaks the protocol it finds.
//!
//! There is no separate sniff buffer here: `Connection::recv_buf` already
//! retains whatever a processor leaves unconsumed between calls, so
//! returning `Consumed(0)` is enough to see the cumulative prefix again next
//! time more bytes arrive. The cap on that prefix is still enforced, just
//! against `bytes.len()` directly rather than a second copy.

use std::sync::Arc;
use std::time::Instant;

use crate::config::{DetectConfig, Http2Config};
use crate::connection::{ProcessorCtx, RecvAction};
use crate::error::{CoreError, Result};
use crate::handler::{ConnectionInfo, Handler};
use crate::processor::Processor;
use crate::timer::{TimerId, TimerKind};

const H2_PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";
const H1_METHODS: &[&[u8]] = &[
    b"GET ",
    b"POST ",
    b"HEAD ",
    b"PUT ",
    b"DELETE ",
    b"OPTIONS ",
    b"PATCH ",
];

/// Dependencies the detector needs in order to construct whichever
/// processor a probe match hands control to. Cloned cheaply (an `Arc` and
/// two small config structs) each time the detector constructs a
/// replacement.
#[derive(Clone)]
pub struct DetectDeps {
    /// Application callbacks, shared across every connection.
    pub handler: Arc<dyn Handler>,
    /// HTTP/2 tuning, handed to the HTTP/2 processor on a preface match.
    pub http2: Http2Config,
    /// Detector tuning (deadline, sniff cap, binary magic).
    pub detect: DetectConfig,
}

/// Sniffs the first bytes of a connection and hands off to the matching
/// protocol processor.
pub struct Detector {
    deps: DetectDeps,
    over_tls: bool,
    timer_id: Option<TimerId>,
}

impl std::fmt::Debug for Detector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Detector")
            .field("over_tls", &self.over_tls)
            .field("max_bytes", &self.deps.detect.max_bytes)
            .finish()
    }
}

impl Detector {
    /// The detector installed on a freshly accepted plaintext connection.
    /// `timer_id` is the detect-timeout timer the caller has already
    /// armed (at accept time, not on first `on_recv`, so a connection that
    /// never sends a byte still times out per spec.md §4.4).
    pub fn new(deps: DetectDeps, timer_id: TimerId) -> Self {
        Self {
            deps,
            over_tls: false,
            timer_id: Some(timer_id),
        }
    }

    fn new_over_tls(deps: DetectDeps, timer_id: TimerId) -> Self {
        Self {
            deps,
            over_tls: true,
            timer_id: Some(timer_id),
        }
    }

    /// Cancels this detector's own detect-timeout timer, once a probe has
    /// matched and the connection is about to swap away to a processor
    /// that isn't subject to the detection deadline anymore.
    fn cancel_timer(&mut self, ctx: &mut ProcessorCtx<'_>) {
        if let Some(id) = self.timer_id.take() {
            ctx.cancel_timer(id);
        }
    }

    /// Tells the handler this connection has committed to an application
    /// protocol, once, the moment a probe matches.
    fn announce_connect(&self, ctx: &ProcessorCtx<'_>) {
        self.deps.handler.on_connect(&ConnectionInfo {
            id: ctx.conn_id,
            peer_addr: ctx.peer_addr,
        });
    }
}

fn contains_ci(haystack: &[u8], needle: &[u8]) -> bool {
    !needle.is_empty()
        && haystack.len() >= needle.len()
        && haystack.windows(needle.len()).any(|w| w.eq_ignore_ascii_case(needle))
}

fn has_head_terminator(bytes: &[u8]) -> bool {
    bytes.windows(4).any(|w| w == b"\r\n\r\n") || bytes.windows(2).any(|w| w == b"\n\n")
}

fn probe_tls(bytes: &[u8]) -> bool {
    bytes.len() >= 3 && bytes[0] == 0x16 && bytes[1] == 0x03 && (0x01..=0x04).contains(&bytes[2])
}

fn probe_websocket(bytes: &[u8]) -> bool {
    bytes.starts_with(b"GET ") && contains_ci(bytes, b"upgrade: websocket")
}

fn probe_h2_preface(bytes: &[u8]) -> bool {
    bytes.starts_with(H2_PREFACE)
}

fn probe_h1_methods(bytes: &[u8]) -> bool {
    has_head_terminator(bytes) && H1_METHODS.iter().any(|m| bytes.starts_with(m))
}

fn probe_binary(bytes: &[u8], magic: Option<[u8; 4]>) -> bool {
    magic.is_some_and(|m| bytes.starts_with(&m))
}

impl Processor for Detector {
    fn on_recv(&mut self, ctx: &mut ProcessorCtx<'_>, bytes: &[u8]) -> Result<RecvAction> {
        // The detect-timeout timer is armed once, up front, by whoever
        // constructs this detector (accept time for the plaintext
        // detector, the moment the TLS probe wins for the over-TLS one) —
        // not lazily here, since a connection that never sends a byte
        // would otherwise never call `on_recv` and so never get a timer.

        if bytes.len() > self.deps.detect.max_bytes {
            return Err(CoreError::Resource("protocol detector sniff buffer overflow"));
        }

        if !self.over_tls && probe_tls(bytes) {
            ctx.set_protocol_tag("tls");
            if let Some(id) = self.timer_id.take() {
                ctx.cancel_timer(id);
            }
            let deadline = Instant::now() + self.deps.detect.timeout;
            let timer_id = ctx.schedule_timer(TimerKind::DetectTimeout, deadline);
            let next = Box::new(Detector::new_over_tls(self.deps.clone(), timer_id));
            return Ok(RecvAction::UpgradeTls { consumed: 0, next });
        }

        if probe_websocket(bytes) {
            ctx.set_protocol_tag("websocket");
            self.cancel_timer(ctx);
            self.announce_connect(ctx);
            let next = Box::new(crate::processor::websocket::WebSocketProcessor::new_handshake(
                self.deps.handler.clone(),
            ));
            return Ok(RecvAction::Swap { consumed: 0, next });
        }

        if probe_h2_preface(bytes) {
            ctx.set_protocol_tag("h2");
            self.cancel_timer(ctx);
            self.announce_connect(ctx);
            let next = Box::new(crate::processor::http2::Http2Processor::new(
                self.deps.handler.clone(),
                self.deps.http2.clone(),
            ));
            return Ok(RecvAction::Swap { consumed: 0, next });
        }

        if probe_h1_methods(bytes) {
            ctx.set_protocol_tag("http/1.1");
            self.cancel_timer(ctx);
            self.announce_connect(ctx);
            let next = Box::new(crate::processor::http1::Http1Processor::new(self.deps.handler.clone()));
            return Ok(RecvAction::Swap { consumed: 0, next });
        }

        if probe_binary(bytes, self.deps.detect.binary_magic) {
            ctx.set_protocol_tag("binary");
            self.cancel_timer(ctx);
            self.announce_connect(ctx);
            let next = Box::new(crate::processor::binary::BinaryProcessor::new(self.deps.handler.clone()));
            return Ok(RecvAction::Swap { consumed: 0, next });
        }

        // No probe matched yet; keep accumulating until one does, the
        // buffer overflows, or the deadline fires.
        Ok(RecvAction::Consumed(0))
    }

    fn produce_send(&mut self, _ctx: &mut ProcessorCtx<'_>) -> Option<Vec<u8>> {
        None
    }

    fn on_timeout(&mut self, _ctx: &mut ProcessorCtx<'_>, kind: TimerKind) -> Result<()> {
        if kind == TimerKind::DetectTimeout {
            return Err(CoreError::Resource("protocol detection timed out"));
        }
        Ok(())
    }

    fn want_peek(&self) -> bool {
        !self.over_tls
    }

    fn name(&self) -> &'static str {
        "detector"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DetectConfig, Http2Config};
    use crate::connection::ConnId;
    use crate::handler::NullHandler;
    use crate::timer::TimerWheel;
    use std::time::Duration;

    #[test]
    fn detect_timeout_is_armed_at_construction_not_on_first_recv() {
        // A connection that never sends a byte never calls `on_recv`, so
        // the timer has to be armed by whoever constructs the detector
        // (the container, at accept time), not lazily inside `on_recv`.
        let mut timers = TimerWheel::new();
        let conn_id = ConnId { thread: 0, local: 0 };
        let deps = DetectDeps {
            handler: Arc::new(NullHandler),
            http2: Http2Config::default(),
            detect: DetectConfig {
                timeout: Duration::from_millis(10),
                ..DetectConfig::default()
            },
        };
        let deadline = Instant::now() + deps.detect.timeout;
        let timer_id = timers.schedule(conn_id, TimerKind::DetectTimeout, deadline);
        let _detector = Detector::new(deps, timer_id);

        let fired = timers.drain_expired(deadline + Duration::from_millis(1));
        assert_eq!(fired.len(), 1);
        assert_eq!(fired[0].kind, TimerKind::DetectTimeout);
        assert_eq!(fired[0].conn, conn_id);
    }

    #[test]
    fn tls_probe_matches_handshake_record_header() {
        assert!(probe_tls(&[0x16, 0x03, 0x01, 0x00, 0x00]));
        assert!(probe_tls(&[0x16, 0x03, 0x04]));
        assert!(!probe_tls(&[0x15, 0x03, 0x01]));
        assert!(!probe_tls(&[0x16, 0x03]));
    }

    #[test]
    fn websocket_probe_requires_get_and_upgrade_header() {
        let req = b"GET /chat HTTP/1.1\r\nHost: x\r\nUpgrade: websocket\r\n\r\n";
        assert!(probe_websocket(req));
        let plain = b"GET /chat HTTP/1.1\r\nHost: x\r\n\r\n";
        assert!(!probe_websocket(plain));
    }

    #[test]
    fn h1_probe_waits_for_full_head_before_matching() {
        assert!(!probe_h1_methods(b"GET /chat HTTP/1.1\r\n"));
        assert!(probe_h1_methods(b"GET /chat HTTP/1.1\r\nHost: x\r\n\r\n"));
    }

    #[test]
    fn websocket_wins_over_plain_http_probe_on_same_prefix() {
        let req = b"GET /chat HTTP/1.1\r\nUpgrade: websocket\r\n\r\n";
        assert!(probe_websocket(req));
        // By the time the head terminator is present (which is what gates
        // the HTTP/1.x probe), the WebSocket probe has already had a
        // chance to see the same bytes and match first.
        assert!(probe_h1_methods(req));
    }

    #[test]
    fn h2_preface_requires_the_full_constant() {
        assert!(!probe_h2_preface(b"PRI * HTTP/2.0\r\n"));
        assert!(probe_h2_preface(H2_PREFACE));
    }

    #[test]
    fn binary_probe_matches_configured_magic_only() {
        assert!(probe_binary(b"\xCA\xFE\xBA\xBErest", Some([0xCA, 0xFE, 0xBA, 0xBE])));
        assert!(!probe_binary(b"\xCA\xFE\xBA\xBE", None));
        assert!(!probe_binary(b"\x00\x00\x00\x00", Some([0xCA, 0xFE, 0xBA, 0xBE])));
    }
}
