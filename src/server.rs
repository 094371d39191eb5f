//! Server facade: constructs `worker_threads` net threads plus one listen
//! thread, wires a user-supplied [`Factory`], and exposes
//! `start`/`stop`/`join`. No hot reconfiguration: everything here is fixed
//! for the server's lifetime once `start` returns.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use mio::net::{TcpListener as MioTcpListener, TcpStream as MioTcpStream};

use crate::config::Config;
use crate::error::{CoreError, Result};
use crate::handler::Handler;
use crate::listener::ListenThread;
use crate::processor::detector::DetectDeps;
use crate::tls::build_server_config;
use crate::worker::{Worker, WorkerContext};

/// Installs per-thread state and supplies the application [`Handler`] for
/// every connection a server accepts.
pub trait Factory: Send + Sync {
    /// Builds the handler every accepted connection's detector eventually
    /// dispatches to. Called once; shared across every worker.
    fn handler(&self) -> Arc<dyn Handler>;

    /// Seeds per-thread state for a freshly started worker. Default:
    /// nothing to seed.
    fn init_worker(&self, _index: u32, _context: &mut WorkerContext) {}
}

/// A [`Factory`] for servers with no per-thread state beyond the handler
/// itself.
pub struct HandlerFactory(pub Arc<dyn Handler>);

impl Factory for HandlerFactory {
    fn handler(&self) -> Arc<dyn Handler> {
        Arc::clone(&self.0)
    }
}

struct RunningWorker {
    handle: JoinHandle<()>,
    stop: Arc<AtomicBool>,
}

/// A started server: `worker_threads` reactor threads plus one listen
/// thread.
pub struct Server {
    listen_handle: JoinHandle<()>,
    listen_stop: Arc<AtomicBool>,
    workers: Vec<RunningWorker>,
}

impl Server {
    /// Signals every thread to exit after its current loop iteration. Does
    /// not wait for them; call [`Self::join`] after.
    pub fn stop(&self) {
        self.listen_stop.store(false, Ordering::Release);
        for worker in &self.workers {
            worker.stop.store(false, Ordering::Release);
        }
    }

    /// Blocks until every thread this server started has exited.
    pub fn join(self) {
        if self.listen_handle.join().is_err() {
            log::error!("listener thread panicked");
        }
        for worker in self.workers {
            if worker.handle.join().is_err() {
                log::error!("worker thread panicked");
            }
        }
    }
}

/// Builds and starts a [`Server`] bound to a given address.
pub struct ServerBuilder {
    config: Config,
    factory: Arc<dyn Factory>,
}

impl ServerBuilder {
    /// A builder over an already-validated [`Config`] and the [`Factory`]
    /// that supplies the handler and any per-thread state.
    pub fn new(config: Config, factory: Arc<dyn Factory>) -> Self {
        Self { config, factory }
    }

    /// Binds `addr`, starts `config.worker_threads` worker threads plus one
    /// listen thread, and begins serving immediately. There is no further
    /// configuration surface once this returns a running [`Server`].
    pub fn start(self, addr: SocketAddr) -> Result<Server> {
        // rustls 0.23 resolves its crypto backend through a process-wide
        // default; installing it here (idempotently) means callers never
        // have to know this crate links `ring`.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let handler = self.factory.handler();
        let detect_deps = DetectDeps {
            handler: Arc::clone(&handler),
            http2: self.config.http2.clone(),
            detect: self.config.detect.clone(),
        };
        let tls_server_config = match &self.config.tls_server {
            Some(tls) => Some(Arc::new(build_server_config(tls)?)),
            None => None,
        };

        let mut senders = Vec::with_capacity(self.config.worker_threads);
        let mut workers = Vec::with_capacity(self.config.worker_threads);

        for index in 0..self.config.worker_threads as u32 {
            let (mut worker, sender) = Worker::<MioTcpStream>::new(
                index,
                self.config.epoll_size,
                self.config.epoll_wait_ms,
                self.config.recv_buffer_cap,
                Arc::clone(&handler),
                detect_deps.clone(),
                tls_server_config.clone(),
            )
            .map_err(CoreError::Io)?;

            self.factory.init_worker(index, worker.context_mut());
            let stop = worker.stop_handle();
            let handle = std::thread::Builder::new()
                .name(format!("polynet-worker-{index}"))
                .spawn(move || worker.run())
                .map_err(CoreError::Io)?;
            workers.push(RunningWorker { handle, stop });
            senders.push(sender);
        }

        let listener = MioTcpListener::bind(addr).map_err(CoreError::Io)?;
        let mut listen_thread = ListenThread::new(listener, self.config.epoll_size, self.config.epoll_wait_ms, senders).map_err(CoreError::Io)?;
        let listen_stop = listen_thread.stop_handle();
        let listen_handle = std::thread::Builder::new()
            .name("polynet-listener".into())
            .spawn(move || listen_thread.run())
            .map_err(CoreError::Io)?;

        Ok(Server {
            listen_handle,
            listen_stop,
            workers,
        })
    }
}
