//! Byte-level I/O abstraction between a connection's raw stream and its
//! processor.
//!
//! A [`Codec`] hides whether a connection is plaintext or TLS-wrapped
//! behind one small interface: `recv`/`send` that never block, a hint for
//! when the codec itself wants readiness beyond what the processor has
//! asked for (mid-handshake), and a writable-event hook so the codec can
//! drive handshake steps opportunistically.

pub mod plaintext;
pub mod tls_client;
pub mod tls_server;

use std::sync::Arc;

use mio::Interest;
use rustls::ServerConfig;

pub use plaintext::PlaintextCodec;
pub use tls_client::TlsClientCodec;
pub use tls_server::TlsServerCodec;

use crate::error::{CoreError, Result};
use crate::net::TcpStream;

/// Outcome of a single `recv` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecvOutcome {
    /// Bytes appended to the caller's buffer.
    pub n_bytes: usize,
    /// The underlying stream would have blocked; not an error.
    pub would_block: bool,
    /// The peer performed an orderly shutdown.
    pub peer_closed: bool,
}

/// Outcome of a single `send` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SendOutcome {
    /// Bytes consumed from the caller's buffer.
    pub n_bytes: usize,
    /// The underlying stream would have blocked; not an error.
    pub would_block: bool,
}

/// A byte-level codec sitting between a raw stream and a connection's
/// processor. Implementors never block; `WouldBlock` is reported through
/// the outcome structs rather than as an `Err`.
pub trait Codec {
    /// Reads as many bytes as are immediately available into `buf`,
    /// appending to whatever is already there. `peek` requests that bytes
    /// stay in the kernel receive buffer rather than being consumed
    /// (plaintext only; ignored by TLS variants, which have already left
    /// the wire framing behind).
    fn recv(&mut self, buf: &mut Vec<u8>, peek: bool) -> Result<RecvOutcome>;

    /// Writes as much of `buf` as is immediately accepted.
    fn send(&mut self, buf: &[u8]) -> Result<SendOutcome>;

    /// Extra interest the codec wants independent of the processor/send
    /// queue, e.g. to keep driving a TLS handshake. `None` when the codec
    /// has nothing of its own to contribute.
    fn poll_events_hint(&self) -> Option<Interest>;

    /// Called when the underlying stream becomes writable, letting the
    /// codec advance a handshake before the connection's normal send path
    /// runs.
    fn on_writable_event(&mut self) -> Result<()>;

    /// The negotiated ALPN protocol, once a TLS handshake has completed.
    /// `None` for the plaintext codec and before negotiation finishes.
    fn alpn_protocol(&self) -> Option<&[u8]> {
        None
    }

    /// Whether this codec has nothing left to negotiate before application
    /// bytes can flow: always `true` for plaintext, `false` for a TLS
    /// variant until its handshake completes. Lets a processor distinguish
    /// "handshake still running" from "handshake done, peer chose no ALPN
    /// protocol".
    fn handshake_done(&self) -> bool {
        true
    }

    /// Replaces this codec's wire transport with server-side TLS over the
    /// same underlying stream, used by the protocol detector's TLS probe.
    /// Only [`AnyCodec`] in its `Plain` state can actually do this; every
    /// other codec rejects it, since by the time a connection
    /// is already TLS-wrapped (or is an outbound client codec) there is no
    /// sensible "upgrade" left to perform.
    fn install_server_tls(&mut self, _config: Arc<ServerConfig>) -> Result<()> {
        Err(CoreError::Protocol {
            message: "codec does not support a TLS upgrade".into(),
            stream: None,
        })
    }
}

/// The set of codecs a single connection can be wearing over its lifetime.
///
/// A connection starts plaintext; the protocol detector may request an
/// upgrade to TLS after sniffing a TLS record header. This enum is what
/// makes that upgrade possible without connections being generic over
/// which codec they currently hold.
pub enum AnyCodec<S> {
    /// No TLS: raw bytes straight off the wire.
    Plain(PlaintextCodec<S>),
    /// Server-side TLS, installed after the detector sees a TLS record.
    TlsServer(TlsServerCodec<S>),
    /// Transient placeholder occupied only for the duration of
    /// [`AnyCodec::upgrade_to_tls`]'s `mem::replace`; never observed by any
    /// other method.
    Transitioning,
}

impl<S> AnyCodec<S>
where
    S: TcpStream + std::io::Read + std::io::Write,
{
    /// Takes the raw stream back out, e.g. to hand it to a new TLS codec.
    /// Only valid while still in the `Plain` state.
    pub fn into_plain_stream(self) -> Option<S> {
        match self {
            AnyCodec::Plain(p) => Some(p.into_inner()),
            _ => None,
        }
    }

    /// Replaces a `Plain` codec with a freshly handshaking `TlsServer` one
    /// over the same stream. A no-op if TLS is already installed.
    pub fn upgrade_to_tls(&mut self, config: Arc<ServerConfig>) -> Result<()> {
        let prior = std::mem::replace(self, AnyCodec::Transitioning);
        let stream = match prior {
            AnyCodec::Plain(p) => p.into_inner(),
            other => {
                *self = other;
                return Ok(());
            }
        };
        *self = AnyCodec::TlsServer(TlsServerCodec::new(stream, config)?);
        Ok(())
    }
}

impl<S> AnyCodec<S>
where
    S: TcpStream + std::io::Read + std::io::Write + mio::event::Source,
{
    /// The underlying stream as a `mio` event source, for the reactor to
    /// register, reregister, or deregister. Never called while `self` is
    /// `Transitioning`; that state exists only inside `upgrade_to_tls`.
    pub fn source_mut(&mut self) -> &mut dyn mio::event::Source {
        match self {
            AnyCodec::Plain(c) => c.stream_mut(),
            AnyCodec::TlsServer(c) => c.stream_mut(),
            AnyCodec::Transitioning => unreachable!("transient codec state observed"),
        }
    }
}

impl<S> Codec for AnyCodec<S>
where
    S: TcpStream + std::io::Read + std::io::Write,
{
    fn recv(&mut self, buf: &mut Vec<u8>, peek: bool) -> Result<RecvOutcome> {
        match self {
            AnyCodec::Plain(c) => c.recv(buf, peek),
            AnyCodec::TlsServer(c) => c.recv(buf, peek),
            AnyCodec::Transitioning => unreachable!("transient codec state observed"),
        }
    }

    fn send(&mut self, buf: &[u8]) -> Result<SendOutcome> {
        match self {
            AnyCodec::Plain(c) => c.send(buf),
            AnyCodec::TlsServer(c) => c.send(buf),
            AnyCodec::Transitioning => unreachable!("transient codec state observed"),
        }
    }

    fn poll_events_hint(&self) -> Option<Interest> {
        match self {
            AnyCodec::Plain(c) => c.poll_events_hint(),
            AnyCodec::TlsServer(c) => c.poll_events_hint(),
            AnyCodec::Transitioning => None,
        }
    }

    fn on_writable_event(&mut self) -> Result<()> {
        match self {
            AnyCodec::Plain(c) => c.on_writable_event(),
            AnyCodec::TlsServer(c) => c.on_writable_event(),
            AnyCodec::Transitioning => Ok(()),
        }
    }

    fn alpn_protocol(&self) -> Option<&[u8]> {
        match self {
            AnyCodec::Plain(c) => c.alpn_protocol(),
            AnyCodec::TlsServer(c) => c.alpn_protocol(),
            AnyCodec::Transitioning => None,
        }
    }

    fn handshake_done(&self) -> bool {
        match self {
            AnyCodec::Plain(c) => c.handshake_done(),
            AnyCodec::TlsServer(c) => c.handshake_done(),
            AnyCodec::Transitioning => false,
        }
    }

    fn install_server_tls(&mut self, config: Arc<ServerConfig>) -> Result<()> {
        self.upgrade_to_tls(config)
    }
}
