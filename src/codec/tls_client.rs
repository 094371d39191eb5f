//! Client-side TLS codec, used by the hybrid HTTPS client processor. Same
//! shape as the server variant; exposes the negotiated ALPN so the caller
//! can pick between HTTP/1.1 and HTTP/2 framing.

use std::io::{ErrorKind, Write};
use std::sync::Arc;

use mio::Interest;
use rustls::{ClientConfig, ClientConnection, ServerName};

use crate::error::{CoreError, Result};
use crate::net::TcpStream;

use super::{Codec, RecvOutcome, SendOutcome};

/// TLS client codec wrapping an outbound connection.
pub struct TlsClientCodec<S> {
    stream: S,
    tls: Box<ClientConnection>,
    handshaking: bool,
}

impl<S> TlsClientCodec<S>
where
    S: TcpStream + std::io::Read + Write,
{
    /// Builds a fresh client-side TLS session over `stream` for `server_name`.
    pub fn new(stream: S, config: Arc<ClientConfig>, server_name: ServerName) -> Result<Self> {
        let tls = ClientConnection::new(config, server_name).map_err(CoreError::Tls)?;
        Ok(Self {
            stream,
            tls: Box::new(tls),
            handshaking: true,
        })
    }

    fn read_tls(&mut self) -> Result<usize> {
        let mut total = 0;
        loop {
            match self.tls.read_tls(&mut self.stream) {
                Ok(0) => return Ok(total),
                Ok(n) => total += n,
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    return if total == 0 {
                        Err(CoreError::Io(e))
                    } else {
                        Ok(total)
                    }
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(CoreError::Io(e)),
            }
        }
    }
}

impl<S> Codec for TlsClientCodec<S>
where
    S: TcpStream + std::io::Read + Write,
{
    fn recv(&mut self, buf: &mut Vec<u8>, _peek: bool) -> Result<RecvOutcome> {
        let read = match self.read_tls() {
            Ok(n) => n,
            Err(CoreError::Io(e)) if e.kind() == ErrorKind::WouldBlock => {
                return Ok(RecvOutcome {
                    n_bytes: 0,
                    would_block: true,
                    peer_closed: false,
                })
            }
            Err(e) => return Err(e),
        };

        if read == 0 {
            return Ok(RecvOutcome {
                n_bytes: 0,
                would_block: false,
                peer_closed: true,
            });
        }

        let state = self.tls.process_new_packets().map_err(CoreError::Tls)?;
        self.handshaking = !self.tls.is_handshaking();

        let plaintext_len = state.plaintext_bytes_to_read();
        if plaintext_len > 0 {
            let before = buf.len();
            buf.resize(before + plaintext_len, 0);
            self.tls.reader().read_exact(&mut buf[before..])?;
        }

        Ok(RecvOutcome {
            n_bytes: plaintext_len,
            would_block: false,
            peer_closed: false,
        })
    }

    fn send(&mut self, buf: &[u8]) -> Result<SendOutcome> {
        if !buf.is_empty() {
            self.tls.writer().write_all(buf)?;
        }
        loop {
            match self.tls.write_tls(&mut self.stream) {
                Ok(0) => {
                    return Ok(SendOutcome {
                        n_bytes: buf.len(),
                        would_block: false,
                    })
                }
                Ok(_) => continue,
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    return Ok(SendOutcome {
                        n_bytes: buf.len(),
                        would_block: false,
                    })
                }
                Err(e) => return Err(CoreError::Io(e)),
            }
        }
    }

    fn poll_events_hint(&self) -> Option<Interest> {
        if !self.handshaking {
            return None;
        }
        match (self.tls.wants_read(), self.tls.wants_write()) {
            (true, true) => Some(Interest::READABLE | Interest::WRITABLE),
            (false, true) => Some(Interest::WRITABLE),
            (true, false) => Some(Interest::READABLE),
            (false, false) => None,
        }
    }

    fn on_writable_event(&mut self) -> Result<()> {
        if self.tls.wants_write() {
            self.tls.write_tls(&mut self.stream).map_err(CoreError::Io)?;
        }
        Ok(())
    }

    fn alpn_protocol(&self) -> Option<&[u8]> {
        self.tls.alpn_protocol()
    }

    fn handshake_done(&self) -> bool {
        !self.handshaking
    }
}
