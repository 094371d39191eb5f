//! Thin wrapper over `mio::Poll`: `init`/`add`/`modify`/`remove`/`wait`,
//! with `add` idempotent against a fd that is already registered.

use std::io;
use std::time::Duration;

use mio::event::Source;
use mio::{Events, Interest, Poll, Registry, Token};

const EPOLL_SIZE_MIN: usize = 256;
const EPOLL_SIZE_MAX: usize = 65_536;
const EPOLL_WAIT_MS_MAX: u64 = 1_000;

/// One thread's epoll instance. Never shared across threads; each reactor
/// thread (worker or listener) owns exactly one.
pub struct Reactor {
    poll: Poll,
    events: Events,
    wait_ms: u64,
}

impl Reactor {
    /// Creates the underlying `epoll` fd and an event buffer sized to
    /// `size`, clamped to `[256, 65536]` per the configuration contract.
    /// `wait_ms` is the default bound passed to every `wait()` call unless
    /// overridden with an explicit budget; clamped to `[0, 1000]`.
    ///
    /// An OS error here is fatal to the owning thread: there is no
    /// connection yet to blame it on, so the caller should propagate it up
    /// rather than trying to recover.
    pub fn init(size: usize, wait_ms: u64) -> io::Result<Self> {
        let size = size.clamp(EPOLL_SIZE_MIN, EPOLL_SIZE_MAX);
        let wait_ms = wait_ms.min(EPOLL_WAIT_MS_MAX);
        Ok(Self {
            poll: Poll::new()?,
            events: Events::with_capacity(size),
            wait_ms,
        })
    }

    /// The registry other owners (a `Waker`, a second listener) register
    /// directly against.
    pub fn registry(&self) -> &Registry {
        self.poll.registry()
    }

    /// Registers `source` under `token` for `interest`. Idempotent: if the
    /// fd is already registered (`ErrorKind::AlreadyExists` on Linux),
    /// falls back to `modify` rather than erroring — calling `add` again
    /// on an already-registered fd behaves the same as `modify`.
    pub fn add(&self, source: &mut (impl Source + ?Sized), token: Token, interest: Interest) -> io::Result<()> {
        match self.poll.registry().register(source, token, interest) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => self.modify(source, token, interest),
            Err(e) => Err(e),
        }
    }

    /// Updates the interest set for an already-registered fd.
    pub fn modify(&self, source: &mut (impl Source + ?Sized), token: Token, interest: Interest) -> io::Result<()> {
        self.poll.registry().reregister(source, token, interest)
    }

    /// Deregisters a fd. Idempotent: a fd that was never registered, or
    /// already removed, yields `Ok(())` rather than surfacing the
    /// underlying `ENOENT`-shaped error, since by the time a connection is
    /// torn down double-removal is routine (destruction path racing a
    /// stale event).
    pub fn remove(&self, source: &mut (impl Source + ?Sized)) -> io::Result<()> {
        match self.poll.registry().deregister(source) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Blocks for ready events up to `budget` (or the configured default
    /// `wait_ms` if `None`), returning the resulting event set. `budget`
    /// lets a caller shrink the wait for one call, e.g. to zero when it
    /// already knows it has queued work to process regardless of I/O
    /// readiness.
    pub fn wait(&mut self, budget: Option<Duration>) -> io::Result<&Events> {
        let timeout = budget.unwrap_or_else(|| Duration::from_millis(self.wait_ms));
        self.poll.poll(&mut self.events, Some(timeout))?;
        Ok(&self.events)
    }
}
