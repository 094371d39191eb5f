//! Per-worker connection registry: owns every connection accepted onto
//! this thread for its entire lifetime, keyed by a stable slab index that
//! doubles as both the connection's `ConnId.local` and its `mio::Token`.
//! The slab is held directly on the worker thread rather than shared
//! behind an `Arc<Mutex<_>>`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use mio::{Interest, Token};
use rustls::ServerConfig;
use slab::Slab;

use crate::codec::plaintext::PlaintextCodec;
use crate::codec::AnyCodec;
use crate::connection::{ConnId, Connection};
use crate::error::Result;
use crate::handler::{ConnectionInfo, Handler};
use crate::net::TcpStream;
use crate::processor::channel_internal::InternalMsg;
use crate::processor::detector::{DetectDeps, Detector};
use crate::reactor::Reactor;
use crate::timer::{TimerKind, TimerWheel};

/// Registry of every connection owned by one worker thread, plus the timer
/// wheel and detector dependencies shared by all of them.
pub struct Container<S> {
    thread: u32,
    connections: Slab<Connection<AnyCodec<S>>>,
    timers: TimerWheel,
    handler: Arc<dyn Handler>,
    detect_deps: DetectDeps,
    recv_cap: usize,
    tls_server_config: Option<Arc<ServerConfig>>,
}

impl<S> Container<S>
where
    S: TcpStream + std::io::Read + std::io::Write + mio::event::Source,
{
    pub fn new(
        thread: u32,
        handler: Arc<dyn Handler>,
        detect_deps: DetectDeps,
        recv_cap: usize,
        tls_server_config: Option<Arc<ServerConfig>>,
    ) -> Self {
        Self {
            thread,
            connections: Slab::new(),
            timers: TimerWheel::new(),
            handler,
            detect_deps,
            recv_cap,
            tls_server_config,
        }
    }

    fn info(conn: &Connection<AnyCodec<S>>) -> ConnectionInfo {
        ConnectionInfo {
            id: conn.id(),
            peer_addr: conn.peer_addr(),
        }
    }

    /// Installs a freshly accepted stream: allocates its `ConnId`/`Token`
    /// from the slab's next vacant key, wires the plaintext codec and a
    /// detector as its initial processor, and registers it with `reactor`
    /// for readability.
    pub fn push_connection(&mut self, reactor: &Reactor, stream: S, peer_addr: SocketAddr) -> Result<ConnId> {
        let entry = self.connections.vacant_entry();
        let key = entry.key();
        let token = Token(key);
        let conn_id = ConnId {
            thread: self.thread,
            local: key as u32,
        };

        // Armed here, at accept time, rather than lazily on the detector's
        // first `on_recv`: a connection that never sends a byte still
        // needs to be torn down once the deadline passes (spec.md §4.4,
        // §8 scenario f), and a silent client would otherwise never
        // trigger that first `on_recv` call at all.
        let deadline = Instant::now() + self.detect_deps.detect.timeout;
        let timer_id = self.timers.schedule(conn_id, TimerKind::DetectTimeout, deadline);

        let codec = AnyCodec::Plain(PlaintextCodec::new(stream));
        let processor = Box::new(Detector::new(self.detect_deps.clone(), timer_id));
        let connection = Connection::new(conn_id, token, codec, processor, peer_addr, self.recv_cap, self.tls_server_config.clone());
        let conn = entry.insert(connection);
        reactor.add(conn.codec_mut().source_mut(), token, Interest::READABLE)?;
        Ok(conn_id)
    }

    /// Dispatches one readiness event to the connection at `token`, reaping
    /// it if that event left it closed. A `token` with no connection
    /// (already reaped, or a stray wakeup) is silently ignored.
    pub fn dispatch_event(&mut self, reactor: &Reactor, token: Token, readable: bool, writable: bool, errored: bool) {
        let result = match self.connections.get_mut(token.0) {
            Some(conn) => conn.on_event(readable, writable, errored, &mut self.timers),
            None => return,
        };
        match result {
            Ok(()) => {
                if self.connections.get(token.0).is_some_and(Connection::is_closed) {
                    self.reap(reactor, token);
                }
            }
            Err(err) => {
                log::debug!("connection at {token:?} failed: {err}");
                self.fail_and_reap(reactor, token, &err.to_string());
            }
        }
    }

    /// Re-applies interest for `token`'s connection against the reactor,
    /// since readable/writable events often change what a connection wants
    /// next (queued outbound bytes, a processor that no longer wants reads).
    /// A no-op if the connection was already reaped this cycle.
    pub fn resync_interest(&mut self, reactor: &Reactor, token: Token) {
        let Some(conn) = self.connections.get_mut(token.0) else {
            return;
        };
        let interest = conn.interest();
        if let Err(err) = reactor.modify(conn.codec_mut().source_mut(), token, interest) {
            log::debug!("failed to update interest for {:?}: {err}", conn.id());
        }
    }

    /// Fires every timer due by `now`. `TimerKind::DelayClose` is handled
    /// directly against the connection rather than routed through its
    /// processor; everything else goes to the active processor's
    /// `on_timeout`.
    pub fn run_timers(&mut self, reactor: &Reactor, now: Instant) {
        let fired = self.timers.drain_expired(now);
        for timer in fired {
            let token = Token(timer.conn.local as usize);
            let result = match self.connections.get_mut(token.0) {
                Some(conn) if conn.id() == timer.conn => {
                    if timer.kind == TimerKind::DelayClose {
                        conn.apply_delayed_close(&mut self.timers)
                    } else {
                        conn.on_timeout(timer.kind, &mut self.timers)
                    }
                }
                _ => continue,
            };
            match result {
                Ok(()) => {
                    if self.connections.get(token.0).is_some_and(Connection::is_closed) {
                        self.reap(reactor, token);
                    }
                }
                Err(err) => {
                    log::debug!("connection at {token:?} timer failed: {err}");
                    self.fail_and_reap(reactor, token, &err.to_string());
                }
            }
        }
    }

    /// Delivers one internal message to its target connection's handler.
    /// Messages addressed to a connection that no longer exists are
    /// dropped.
    pub fn deliver(&mut self, msg: InternalMsg) {
        let token = Token(msg.conn_id().local as usize);
        let Some(conn) = self.connections.get(token.0) else {
            return;
        };
        if conn.id() != msg.conn_id() {
            return;
        }
        if let InternalMsg::Deliver { payload, .. } = msg {
            let info = Self::info(conn);
            self.handler.handle_msg(&info, &payload);
        }
        // `AsyncComplete` carries no payload to hand the handler directly;
        // the owning processor observes the completed `AsyncSlot` itself
        // the next time `produce_send` runs.
    }

    /// Runs the standard destruction path: cancel the connection's timers,
    /// deregister it from the reactor, notify the handler via
    /// `on_disconnect`, then erase it from the slab.
    fn reap(&mut self, reactor: &Reactor, token: Token) {
        if !self.connections.contains(token.0) {
            return;
        }
        let mut conn = self.connections.remove(token.0);
        self.timers.cancel_all_for(conn.id());
        if let Err(err) = reactor.remove(conn.codec_mut().source_mut()) {
            log::debug!("failed to deregister connection {:?}: {err}", conn.id());
        }
        self.handler.on_disconnect(&Self::info(&conn));
    }

    fn fail_and_reap(&mut self, reactor: &Reactor, token: Token, message: &str) {
        if let Some(conn) = self.connections.get(token.0) {
            self.handler
                .on_error(&Self::info(conn), crate::error::ErrorKind::Protocol, message);
        }
        self.reap(reactor, token);
    }

    /// Whether this worker currently owns any connections, used by a
    /// shutdown sequence that wants to wait for in-flight work to drain.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
