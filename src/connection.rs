//! Per-connection state and event handling.
//!
//! A [`Connection`] owns exactly one fd (via its codec), one processor, one
//! inbound buffer, a queue of outbound buffers, and bookkeeping shared with
//! its owning [`crate::container::Container`] only through the timer wheel
//! passed into each call. It never reaches back into the container or
//! reactor itself.

use std::collections::VecDeque;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use mio::{Interest, Token};
use rustls::ServerConfig;

use crate::buffer::Buffer;
use crate::codec::{AnyCodec, Codec};
use crate::error::{CoreError, Result};
use crate::net::TcpStream;
use crate::timer::{TimerId, TimerKind, TimerWheel};

/// Stable per-worker connection identifier: `(thread_index, local_id)`.
/// Both halves are assigned by the worker that owns the connection and
/// are never reused while that connection is alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnId {
    /// Index of the owning worker thread.
    pub thread: u32,
    /// Monotonically assigned id, unique within `thread`'s lifetime.
    pub local: u32,
}

/// Context handed to a [`crate::processor::Processor`] for the duration of
/// a single callback. Gives the processor just enough of the connection to
/// do its job, as a weak back-reference rather than a raw pointer that
/// could outlive its target.
pub struct ProcessorCtx<'a> {
    /// This connection's id.
    pub conn_id: ConnId,
    /// The remote peer's address.
    pub peer_addr: SocketAddr,
    pub(crate) timers: &'a mut TimerWheel,
    pub(crate) protocol_tag: &'a mut Option<String>,
    pub(crate) tag_locked: &'a mut bool,
    pub(crate) close_requested: &'a mut bool,
    pub(crate) alpn: Option<&'a [u8]>,
    pub(crate) handshake_done: bool,
}

impl<'a> ProcessorCtx<'a> {
    /// Schedules a timer owned by this connection.
    pub fn schedule_timer(&mut self, kind: TimerKind, fire_at: Instant) -> TimerId {
        self.timers.schedule(self.conn_id, kind, fire_at)
    }

    /// Cancels a previously scheduled timer.
    pub fn cancel_timer(&mut self, id: TimerId) {
        self.timers.cancel(id);
    }

    /// Publishes the protocol this connection turned out to speak, unless
    /// it has already been locked by an earlier call.
    pub fn set_protocol_tag(&mut self, tag: impl Into<String>) {
        if !*self.tag_locked {
            *self.protocol_tag = Some(tag.into());
        }
    }

    /// Freezes the protocol tag so later processors cannot overwrite it.
    pub fn lock_protocol_tag(&mut self) {
        *self.tag_locked = true;
    }

    /// The currently published protocol tag, if any.
    pub fn protocol_tag(&self) -> Option<&str> {
        self.protocol_tag.as_deref()
    }

    /// The protocol the TLS handshake negotiated via ALPN, if the codec is
    /// a TLS variant and the handshake has completed. Present so the hybrid
    /// HTTPS client processor can branch to an H2 or HTTP/1.1 request
    /// without the codec itself knowing about client processors.
    pub fn alpn(&self) -> Option<&[u8]> {
        self.alpn
    }

    /// Whether the codec has finished any TLS handshake it needed to run.
    /// Always `true` for plaintext connections.
    pub fn handshake_done(&self) -> bool {
        self.handshake_done
    }

    /// Requests a graceful close: the connection finishes flushing whatever
    /// is already queued, then tears down without a `close_reason`. Here
    /// the delay is implicit in the send queue draining rather than a
    /// separate timer, since there is nothing left for the processor to do
    /// once it has requested a close.
    pub fn request_close(&mut self) {
        *self.close_requested = true;
    }

    /// Requests a close after `delay` rather than as soon as the send queue
    /// drains. Useful for a handler that wants to give a client a moment
    /// after its last response before the socket goes away, e.g. to let a
    /// final WebSocket close frame reach it.
    pub fn request_close_after(&mut self, delay: Duration) -> TimerId {
        self.schedule_timer(TimerKind::DelayClose, Instant::now() + delay)
    }
}

/// What a processor did with the bytes it was handed.
pub enum RecvAction {
    /// Consumed `0..=len` bytes; the rest stays buffered for next time.
    Consumed(usize),
    /// Consumed `consumed` bytes and is handing control to a replacement
    /// processor, which should see the remaining unread bytes as though
    /// they had just arrived.
    Swap {
        /// Bytes the outgoing processor consumed before deciding to swap.
        consumed: usize,
        /// The processor taking over.
        next: Box<dyn crate::processor::Processor>,
    },
    /// Like `Swap`, but also requests the connection install a server-side
    /// TLS codec over its raw stream first (the detector's TLS probe).
    UpgradeTls {
        /// Bytes the detector consumed (always 0 in practice; the TLS
        /// record header is left for the new codec to reparse).
        consumed: usize,
        /// The processor to run once the handshake completes (an
        /// over-TLS detector).
        next: Box<dyn crate::processor::Processor>,
    },
}

impl fmt::Debug for RecvAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecvAction::Consumed(n) => f.debug_tuple("Consumed").field(n).finish(),
            RecvAction::Swap { consumed, next } => f
                .debug_struct("Swap")
                .field("consumed", consumed)
                .field("next", &next.name())
                .finish(),
            RecvAction::UpgradeTls { consumed, next } => f
                .debug_struct("UpgradeTls")
                .field("consumed", consumed)
                .field("next", &next.name())
                .finish(),
        }
    }
}

const STACK_READ: usize = 32 * 1024;
const PUMP_SEND_ITERATIONS: usize = 16;

/// A live connection: one fd, one codec, one active processor.
pub struct Connection<C> {
    id: ConnId,
    token: Token,
    codec: C,
    processor: Box<dyn crate::processor::Processor>,
    recv_buf: Buffer,
    recv_cap: usize,
    /// Bytes not yet flushed from the front of the outbound queue.
    pending_tail: Option<Vec<u8>>,
    outbound_done: bool,
    peer_addr: SocketAddr,
    last_activity: Instant,
    protocol_tag: Option<String>,
    tag_locked: bool,
    closed: bool,
    close_reason: Option<CoreError>,
    close_requested: bool,
    /// Server TLS material, used only to service a detector
    /// [`RecvAction::UpgradeTls`]; `None` means this listener never offers
    /// TLS, so a TLS probe match becomes a configuration-shaped failure
    /// rather than a silent downgrade.
    tls_server_config: Option<Arc<ServerConfig>>,
}

impl<C> fmt::Debug for Connection<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer_addr", &self.peer_addr)
            .field("protocol_tag", &self.protocol_tag)
            .field("closed", &self.closed)
            .finish()
    }
}

impl<C: Codec> Connection<C> {
    /// Builds a new connection record around `codec`, starting with
    /// `processor` as its active protocol state (usually the detector).
    pub fn new(
        id: ConnId,
        token: Token,
        codec: C,
        processor: Box<dyn crate::processor::Processor>,
        peer_addr: SocketAddr,
        recv_cap: usize,
        tls_server_config: Option<Arc<ServerConfig>>,
    ) -> Self {
        Self {
            id,
            token,
            codec,
            processor,
            recv_buf: Buffer::new(8 * 1024),
            recv_cap,
            pending_tail: None,
            outbound_done: true,
            peer_addr,
            last_activity: Instant::now(),
            protocol_tag: None,
            tag_locked: false,
            closed: false,
            close_reason: None,
            close_requested: false,
            tls_server_config,
        }
    }

    /// This connection's stable id.
    pub fn id(&self) -> ConnId {
        self.id
    }

    /// The mio token this connection is registered under.
    pub fn token(&self) -> Token {
        self.token
    }

    /// Whether the connection has been marked for destruction.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// The error that caused this connection to close, if it was not an
    /// orderly peer close.
    pub fn close_reason(&self) -> Option<&CoreError> {
        self.close_reason.as_ref()
    }

    /// The remote peer's address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// The published protocol tag, if the active processor has set one.
    pub fn protocol_tag(&self) -> Option<&str> {
        self.protocol_tag.as_deref()
    }

    /// Timestamp of the last readable/writable progress on this connection.
    pub fn last_activity(&self) -> Instant {
        self.last_activity
    }

    fn ctx<'a>(&'a mut self, timers: &'a mut TimerWheel) -> ProcessorCtx<'a> {
        let alpn = self.codec.alpn_protocol();
        let handshake_done = self.codec.handshake_done();
        ProcessorCtx {
            conn_id: self.id,
            peer_addr: self.peer_addr,
            timers,
            protocol_tag: &mut self.protocol_tag,
            tag_locked: &mut self.tag_locked,
            close_requested: &mut self.close_requested,
            alpn,
            handshake_done,
        }
    }

    fn fail(&mut self, err: CoreError) {
        self.closed = true;
        self.close_reason = Some(err);
    }

    /// Dispatches a readiness event: error/hup is fatal, readable triggers
    /// [`Self::pull_recv`], writable triggers [`Self::pump_send`].
    pub fn on_event(
        &mut self,
        readable: bool,
        writable: bool,
        errored: bool,
        timers: &mut TimerWheel,
    ) -> Result<()> {
        if errored {
            self.fail(CoreError::PeerClosed);
            return Ok(());
        }
        if writable {
            self.codec.on_writable_event()?;
            self.pump_send(timers)?;
        }
        if readable && !self.closed {
            self.pull_recv(timers)?;
        }
        Ok(())
    }

    /// Pulls bytes from the codec into the inbound buffer and feeds them to
    /// the active processor, handling hot-swap between processors.
    pub fn pull_recv(&mut self, timers: &mut TimerWheel) -> Result<()> {
        let peek = self.processor.want_peek();
        let mut scratch = Vec::with_capacity(STACK_READ);
        let outcome = self.codec.recv(&mut scratch, peek)?;

        if outcome.peer_closed {
            self.closed = true;
            return Ok(());
        }
        if !scratch.is_empty() {
            if peek {
                // A peek always returns everything still unread from the
                // socket, so each call supersedes the last one rather than
                // appending to it; extending here would duplicate the
                // prefix on every readiness event the kernel reports while
                // the bytes remain unconsumed.
                if scratch.len() > self.recv_cap {
                    self.fail(CoreError::Resource("recv buffer overflow"));
                    return Ok(());
                }
                self.recv_buf.clear();
                self.recv_buf.extend(&scratch);
            } else if self.recv_buf.remaining() + scratch.len() > self.recv_cap {
                self.fail(CoreError::Resource("recv buffer overflow"));
                return Ok(());
            } else {
                self.recv_buf.extend(&scratch);
            }
        }
        if outcome.would_block && scratch.is_empty() {
            return Ok(());
        }

        loop {
            let bytes = self.recv_buf.as_slice();
            if bytes.is_empty() {
                break;
            }
            let mut ctx = self.ctx(timers);
            match self.processor.on_recv(&mut ctx, bytes)? {
                RecvAction::Consumed(n) => {
                    self.recv_buf.mark_read(n);
                    if n == 0 {
                        break;
                    }
                }
                RecvAction::Swap { consumed, next } => {
                    self.recv_buf.mark_read(consumed);
                    self.processor = next;
                    continue;
                }
                RecvAction::UpgradeTls { consumed, next } => {
                    self.recv_buf.mark_read(consumed);
                    let Some(tls_config) = self.tls_server_config.clone() else {
                        self.fail(CoreError::Config(
                            "TLS probe matched but no server TLS material is configured".into(),
                        ));
                        break;
                    };
                    self.codec.install_server_tls(tls_config)?;
                    self.processor = next;
                    continue;
                }
            }
        }

        self.last_activity = Instant::now();
        self.outbound_done = false;
        Ok(())
    }

    /// Pulls buffers from the processor and flushes them to the codec,
    /// honoring short writes and would-block.
    pub fn pump_send(&mut self, timers: &mut TimerWheel) -> Result<()> {
        for _ in 0..PUMP_SEND_ITERATIONS {
            let buf = match self.pending_tail.take() {
                Some(tail) => tail,
                None => {
                    let mut ctx = self.ctx(timers);
                    match self.processor.produce_send(&mut ctx) {
                        Some(b) if !b.is_empty() => b,
                        _ => {
                            self.outbound_done = true;
                            break;
                        }
                    }
                }
            };

            let outcome = self.codec.send(&buf)?;
            if outcome.n_bytes < buf.len() {
                self.pending_tail = Some(buf[outcome.n_bytes..].to_vec());
            }
            if outcome.would_block {
                self.pending_tail.get_or_insert(buf);
                break;
            }
        }
        if self.close_requested && self.pending_tail.is_none() && self.outbound_done {
            self.closed = true;
        }
        Ok(())
    }

    /// Runs a fired timer's callback against the active processor.
    pub fn on_timeout(&mut self, kind: TimerKind, timers: &mut TimerWheel) -> Result<()> {
        let mut ctx = self.ctx(timers);
        self.processor.on_timeout(&mut ctx, kind)
    }

    /// Handles a fired `TimerKind::DelayClose`: marks the connection closing
    /// and re-runs the send pump immediately, so a connection with nothing
    /// left to flush closes right away instead of waiting for its next
    /// writable event.
    pub fn apply_delayed_close(&mut self, timers: &mut TimerWheel) -> Result<()> {
        self.close_requested = true;
        self.pump_send(timers)
    }

    /// Direct access to the codec, for the reactor to (re)register its
    /// interest against the underlying stream. Not exposed to processors.
    pub(crate) fn codec_mut(&mut self) -> &mut C {
        &mut self.codec
    }

    /// The interest the reactor should register for this connection: always
    /// readable unless the processor declines, plus writable whenever the
    /// codec or the outbound path has something pending.
    pub fn interest(&self) -> Interest {
        let mut interest = if self.processor.want_recv() {
            Interest::READABLE
        } else {
            Interest::WRITABLE
        };
        if self.pending_tail.is_some() || !self.outbound_done {
            interest |= Interest::WRITABLE;
        }
        if let Some(hint) = self.codec.poll_events_hint() {
            interest |= hint;
        }
        interest
    }
}

/// An outbound byte queue shared between a connection's processor and its
/// pump-send loop. Kept here (rather than on `Connection`) so processors
/// that produce several buffers per callback (e.g. HTTP/2 fanning out
/// frames across streams) can queue without re-entering `produce_send`.
#[derive(Debug, Default)]
pub struct SendQueue {
    queue: VecDeque<Vec<u8>>,
}

impl SendQueue {
    /// An empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a buffer to the back of the queue.
    pub fn push(&mut self, buf: Vec<u8>) {
        if !buf.is_empty() {
            self.queue.push_back(buf);
        }
    }

    /// Pops the front buffer, if any.
    pub fn pop(&mut self) -> Option<Vec<u8>> {
        self.queue.pop_front()
    }

    /// Whether the queue currently holds nothing.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
