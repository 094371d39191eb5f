//! Plain TCP codec: a thin pass-through with peek support for the detector.

use std::io::{ErrorKind, Read, Write};

use mio::Interest;

use crate::error::{CoreError, Result};
use crate::net::TcpStream;

use super::{Codec, RecvOutcome, SendOutcome};

const STACK_BUF: usize = 32 * 1024;

/// Direct `recv`/`send` over a raw stream, with an optional peek mode so
/// the protocol detector can sniff bytes without consuming them from the
/// kernel.
pub struct PlaintextCodec<S> {
    stream: S,
}

impl<S> PlaintextCodec<S>
where
    S: TcpStream + Read + Write,
{
    /// Wraps `stream` with no codec-level state.
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    /// Returns the wrapped stream back to the caller, e.g. to hand it to a
    /// TLS codec after the detector selects TLS.
    pub fn into_inner(self) -> S {
        self.stream
    }

    /// Borrows the wrapped stream.
    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }
}

impl<S> Codec for PlaintextCodec<S>
where
    S: TcpStream + Read + Write,
{
    fn recv(&mut self, buf: &mut Vec<u8>, peek: bool) -> Result<RecvOutcome> {
        let mut scratch = [0u8; STACK_BUF];
        let result = if peek {
            self.stream.peek(&mut scratch)
        } else {
            self.stream.read(&mut scratch)
        };

        match result {
            Ok(0) => Ok(RecvOutcome {
                n_bytes: 0,
                would_block: false,
                peer_closed: true,
            }),
            Ok(n) => {
                buf.extend_from_slice(&scratch[..n]);
                Ok(RecvOutcome {
                    n_bytes: n,
                    would_block: false,
                    peer_closed: false,
                })
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(RecvOutcome {
                n_bytes: 0,
                would_block: true,
                peer_closed: false,
            }),
            Err(e) if e.kind() == ErrorKind::Interrupted => self.recv(buf, peek),
            Err(e) => Err(CoreError::Io(e)),
        }
    }

    fn send(&mut self, buf: &[u8]) -> Result<SendOutcome> {
        match self.stream.write(buf) {
            Ok(n) => Ok(SendOutcome {
                n_bytes: n,
                would_block: false,
            }),
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(SendOutcome {
                n_bytes: 0,
                would_block: true,
            }),
            Err(e) if e.kind() == ErrorKind::Interrupted => self.send(buf),
            Err(e) => Err(CoreError::Io(e)),
        }
    }

    fn poll_events_hint(&self) -> Option<Interest> {
        None
    }

    fn on_writable_event(&mut self) -> Result<()> {
        Ok(())
    }
}
