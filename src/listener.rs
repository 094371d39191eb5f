//! Listen thread: accept-only, edge-triggered, fanning accepted connections
//! out to workers by round robin. Never touches a connection once it has
//! handed it off; loops `accept()` to `WouldBlock`, but the stream crosses
//! a channel to whichever worker owns it instead of being
//! inserted into the same thread's slab.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use mio::{Interest, Token};

use crate::channel::Sender;
use crate::net::{TcpListener, TcpStream};
use crate::reactor::Reactor;
use crate::worker::WorkerMsg;

const LISTEN_TOKEN: Token = Token(usize::MAX);
/// Issues a non-blocking accept up to this many times per readiness event
/// before yielding back to the poll loop.
const MAX_ACCEPTS_PER_EVENT: usize = 128;

/// Accept-only thread. Owns the bound listening socket and a round-robin
/// list of worker senders.
pub struct ListenThread<T, S> {
    listener: T,
    reactor: Reactor,
    workers: Vec<Sender<WorkerMsg<S>>>,
    next_worker: usize,
    running: Arc<AtomicBool>,
    _marker: PhantomData<S>,
}

impl<T, S> ListenThread<T, S>
where
    T: TcpListener<S> + mio::event::Source,
    S: TcpStream + std::io::Read + std::io::Write + mio::event::Source,
{
    /// Binds `reactor` to `listener` and takes ownership of the worker
    /// senders accepted connections round-robin across.
    pub fn new(mut listener: T, epoll_size: usize, epoll_wait_ms: u64, workers: Vec<Sender<WorkerMsg<S>>>) -> std::io::Result<Self> {
        assert!(!workers.is_empty(), "a listener needs at least one worker to hand connections to");
        let reactor = Reactor::init(epoll_size, epoll_wait_ms)?;
        reactor.add(&mut listener, LISTEN_TOKEN, Interest::READABLE)?;
        Ok(Self {
            listener,
            reactor,
            workers,
            next_worker: 0,
            running: Arc::new(AtomicBool::new(true)),
            _marker: PhantomData,
        })
    }

    /// A handle the server facade uses to stop this thread.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    fn accept_batch(&mut self) {
        for _ in 0..MAX_ACCEPTS_PER_EVENT {
            let (stream, peer_addr) = match self.listener.accept() {
                Ok(pair) => pair,
                Err(ref err) if err.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(err) => {
                    log::warn!("accept failed: {err}");
                    break;
                }
            };
            let idx = self.next_worker;
            self.next_worker = (self.next_worker + 1) % self.workers.len();
            if let Err(err) = self.workers[idx].send(WorkerMsg::Accept { stream, peer_addr }) {
                log::warn!("failed to hand an accepted connection to worker {idx}: {err}");
            }
        }
    }

    /// Runs the accept loop until `stop_handle` is cleared.
    pub fn run(&mut self) {
        while self.running.load(Ordering::Acquire) {
            let saw_listener = match self.reactor.wait(None) {
                Ok(events) => events.iter().any(|e| e.token() == LISTEN_TOKEN),
                Err(err) => {
                    log::error!("listener epoll wait failed: {err}");
                    return;
                }
            };
            if saw_listener {
                self.accept_batch();
            }
        }
        log::debug!("listener exiting");
    }
}
