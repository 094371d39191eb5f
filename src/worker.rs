//! Reactor thread: the per-worker epoll loop. Exactly one of these owns a
//! given connection for its entire lifetime;
//! nothing outside this thread ever touches that connection's `Connection`
//! or codec directly, only through messages on its inbox.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use mio::{Token, Waker};
use rustls::ServerConfig;

use crate::channel::{self, Receiver, Sender};
use crate::container::Container;
use crate::handler::Handler;
use crate::net::TcpStream;
use crate::processor::channel_internal::InternalMsg;
use crate::processor::detector::DetectDeps;
use crate::reactor::Reactor;

/// Token reserved for this worker's wakeup `Waker`; never collides with a
/// connection token since slab keys start at 0 and grow from there.
const WAKE_TOKEN: Token = Token(usize::MAX);

/// Per-thread store a [`crate::server::Factory`] can use to stash state a
/// worker's connections need without a process-wide global.
#[derive(Default)]
pub struct WorkerContext {
    data: HashMap<TypeId, Box<dyn Any + Send>>,
}

impl WorkerContext {
    /// Stores one value of type `T`, replacing any previous value of the
    /// same type.
    pub fn set_data<T: Any + Send>(&mut self, value: T) {
        self.data.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Borrows the stored value of type `T`, if one was set.
    pub fn get_data<T: Any + Send>(&self) -> Option<&T> {
        self.data.get(&TypeId::of::<T>()).and_then(|b| b.downcast_ref())
    }
}

/// A message delivered to a worker's inbox: either a freshly accepted
/// connection to install, or an application-level message for a connection
/// it already owns.
pub enum WorkerMsg<S> {
    /// Handoff from the listen thread.
    Accept { stream: S, peer_addr: SocketAddr },
    /// A cross-thread application message to dispatch to a connection
    /// this worker already owns.
    Internal(InternalMsg),
}

/// One reactor thread: one epoll loop, one [`Container`], one inbox.
pub struct Worker<S> {
    index: u32,
    reactor: Reactor,
    container: Container<S>,
    inbox: Receiver<WorkerMsg<S>>,
    context: WorkerContext,
    running: Arc<AtomicBool>,
}

impl<S> Worker<S>
where
    S: TcpStream + std::io::Read + std::io::Write + mio::event::Source,
{
    /// Builds a worker and the sender used to hand it accepted connections
    /// or internal messages.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        index: u32,
        epoll_size: usize,
        epoll_wait_ms: u64,
        recv_cap: usize,
        handler: Arc<dyn Handler>,
        detect_deps: DetectDeps,
        tls_server_config: Option<Arc<ServerConfig>>,
    ) -> std::io::Result<(Self, Sender<WorkerMsg<S>>)> {
        let reactor = Reactor::init(epoll_size, epoll_wait_ms)?;
        let waker = Waker::new(reactor.registry(), WAKE_TOKEN)?;
        let (tx, rx) = channel::channel(waker);
        let worker = Self {
            index,
            reactor,
            container: Container::new(index, handler, detect_deps, recv_cap, tls_server_config),
            inbox: rx,
            context: WorkerContext::default(),
            running: Arc::new(AtomicBool::new(true)),
        };
        Ok((worker, tx))
    }

    /// A handle the server facade uses to signal this worker to stop
    /// ("`stop` signals them to exit after the current loop
    /// iteration").
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Mutable access to this worker's per-thread user data, for a
    /// [`crate::server::Factory`] to seed before the loop starts.
    pub fn context_mut(&mut self) -> &mut WorkerContext {
        &mut self.context
    }

    /// Runs the epoll wait -> dispatch -> timers -> messages loop until
    /// `stop_handle` is cleared.
    pub fn run(&mut self) {
        while self.running.load(Ordering::Acquire) {
            let ready: Vec<(Token, bool, bool, bool)> = match self.reactor.wait(None) {
                Ok(events) => events
                    .iter()
                    .filter(|e| e.token() != WAKE_TOKEN)
                    .map(|e| {
                        (
                            e.token(),
                            e.is_readable(),
                            e.is_writable(),
                            e.is_error() || e.is_read_closed() || e.is_write_closed(),
                        )
                    })
                    .collect(),
                Err(err) => {
                    log::error!("worker {} epoll wait failed: {err}", self.index);
                    return;
                }
            };

            for (token, readable, writable, errored) in ready {
                self.container.dispatch_event(&self.reactor, token, readable, writable, errored);
                self.container.resync_interest(&self.reactor, token);
            }

            self.container.run_timers(&self.reactor, Instant::now());
            self.drain_inbox();
        }
        log::debug!("worker {} exiting", self.index);
    }

    fn drain_inbox(&mut self) {
        let messages: Vec<_> = self.inbox.drain().collect();
        for msg in messages {
            match msg {
                WorkerMsg::Accept { stream, peer_addr } => {
                    if let Err(err) = self.container.push_connection(&self.reactor, stream, peer_addr) {
                        log::warn!("worker {} failed to install accepted connection: {err}", self.index);
                    }
                }
                WorkerMsg::Internal(internal) => self.container.deliver(internal),
            }
        }
    }
}
