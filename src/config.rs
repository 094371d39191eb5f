//! In-memory server configuration.
//!
//! Reading these values from a file or argv is the CLI/config loader's
//! job and is out of scope here; it would simply construct a [`Config`]
//! via [`ConfigBuilder`] and hand it to [`crate::server::Server`].

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{CoreError, Result};

const EPOLL_SIZE_RANGE: std::ops::RangeInclusive<usize> = 256..=65536;
const EPOLL_WAIT_MS_RANGE: std::ops::RangeInclusive<u64> = 0..=1000;

/// TLS material and behavior for the server side of a listener.
#[derive(Debug, Clone, Default)]
pub struct TlsServerConfig {
    /// Path to the PEM certificate chain.
    pub cert_path: Option<PathBuf>,
    /// Path to the PEM private key.
    pub key_path: Option<PathBuf>,
    /// Accepted protocol versions, e.g. `["TLSv1.2", "TLSv1.3"]`.
    pub protocols: Vec<String>,
    /// Cipher suite names, in preference order. Empty means rustls defaults.
    pub ciphers: Vec<String>,
    /// Whether to require and verify a client certificate.
    pub verify_client: bool,
    /// Path to a CA bundle used to verify client certificates.
    pub ca_path: Option<PathBuf>,
    /// ALPN protocols offered, in preference order. Defaults to `h2,http/1.1`.
    pub alpn: Vec<String>,
}

impl TlsServerConfig {
    /// Returns the configured ALPN list, defaulting to `h2` then
    /// `http/1.1`.
    pub fn alpn_or_default(&self) -> Vec<Vec<u8>> {
        if self.alpn.is_empty() {
            vec![b"h2".to_vec(), b"http/1.1".to_vec()]
        } else {
            self.alpn.iter().map(|p| p.clone().into_bytes()).collect()
        }
    }
}

/// TLS material and behavior for outbound (client) connections, used by
/// the hybrid HTTPS client processor.
#[derive(Debug, Clone, Default)]
pub struct TlsClientConfig {
    /// Optional client certificate for mutual TLS.
    pub cert_path: Option<PathBuf>,
    /// Optional client private key for mutual TLS.
    pub key_path: Option<PathBuf>,
    /// Accepted protocol versions.
    pub protocols: Vec<String>,
    /// Cipher suite preference list.
    pub ciphers: Vec<String>,
    /// Whether to verify the server's certificate.
    pub verify_server: bool,
    /// CA bundle used to verify the server certificate.
    pub ca_path: Option<PathBuf>,
    /// Whether to cache sessions for resumption.
    pub session_cache: bool,
    /// Whether to request session tickets.
    pub session_tickets: bool,
    /// ALPN protocols offered, in preference order.
    pub alpn: Vec<String>,
}

/// HTTP/2-specific tuning.
#[derive(Debug, Clone)]
pub struct Http2Config {
    /// Minimum bytes of consumed DATA before a WINDOW_UPDATE is emitted.
    pub window_update_threshold: u32,
    /// Interval between client-initiated PING frames.
    pub ping_interval: Duration,
    /// Deadline for an entire client response.
    pub total_timeout: Duration,
}

impl Default for Http2Config {
    fn default() -> Self {
        Self {
            window_update_threshold: 32 * 1024,
            ping_interval: Duration::from_secs(30),
            total_timeout: Duration::from_secs(60),
        }
    }
}

/// Protocol detector tuning.
#[derive(Debug, Clone)]
pub struct DetectConfig {
    /// Deadline for detection to complete before the connection is torn down.
    pub timeout: Duration,
    /// Maximum number of bytes the sniff buffer will accumulate.
    pub max_bytes: usize,
    /// Four-byte magic used by the binary-protocol probe, if configured.
    pub binary_magic: Option<[u8; 4]>,
}

impl Default for DetectConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            max_bytes: 4096,
            binary_magic: None,
        }
    }
}

/// Top-level server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum ready events per `epoll_wait` call.
    pub epoll_size: usize,
    /// Upper bound, in milliseconds, on a single `epoll_wait` call.
    pub epoll_wait_ms: u64,
    /// Listen backlog passed to `listen(2)`.
    pub so_maxconn: u32,
    /// Whether to pin worker N to core N-1.
    pub thread_affinity: bool,
    /// Number of worker threads (in addition to the listener thread).
    pub worker_threads: usize,
    /// Cap, in bytes, on a connection's inbound buffer.
    pub recv_buffer_cap: usize,
    /// Per-thread reusable outbound buffer pool size.
    pub string_pool_capacity: usize,
    /// Server-side TLS material, if TLS is enabled for this listener.
    pub tls_server: Option<Arc<TlsServerConfig>>,
    /// Client-side TLS material, used by outbound connections.
    pub tls_client: Option<Arc<TlsClientConfig>>,
    /// HTTP/2 tuning.
    pub http2: Http2Config,
    /// Protocol detector tuning.
    pub detect: DetectConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            epoll_size: 1024,
            epoll_wait_ms: 1,
            so_maxconn: 1024,
            thread_affinity: false,
            worker_threads: 1,
            recv_buffer_cap: 2 * 1024 * 1024,
            string_pool_capacity: 64,
            tls_server: None,
            tls_client: None,
            http2: Http2Config::default(),
            detect: DetectConfig::default(),
        }
    }
}

impl Config {
    /// Starts a builder seeded with defaults.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Validates and clamps fields that need bounding. Called once at
    /// `Server::build` time; a clamp is not an error, only genuinely
    /// invalid values (e.g. zero worker threads) are.
    fn normalize(mut self) -> Result<Self> {
        self.epoll_size = self.epoll_size.clamp(*EPOLL_SIZE_RANGE.start(), *EPOLL_SIZE_RANGE.end());
        self.epoll_wait_ms = self
            .epoll_wait_ms
            .clamp(*EPOLL_WAIT_MS_RANGE.start(), *EPOLL_WAIT_MS_RANGE.end());

        if self.worker_threads == 0 {
            return Err(CoreError::Config(
                "worker_threads must be at least 1".into(),
            ));
        }

        if let Some(tls) = &self.tls_server {
            if tls.cert_path.is_none() || tls.key_path.is_none() {
                return Err(CoreError::Config(
                    "tls_server requires both cert_path and key_path".into(),
                ));
            }
        }

        Ok(self)
    }
}

/// Builder for [`Config`].
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    inner: Option<Config>,
}

macro_rules! setter {
    ($name:ident, $ty:ty) => {
        /// Sets the corresponding field on the configuration under construction.
        pub fn $name(mut self, value: $ty) -> Self {
            self.inner_mut().$name = value;
            self
        }
    };
}

impl ConfigBuilder {
    fn inner_mut(&mut self) -> &mut Config {
        self.inner.get_or_insert_with(Config::default)
    }

    setter!(epoll_size, usize);
    setter!(epoll_wait_ms, u64);
    setter!(so_maxconn, u32);
    setter!(thread_affinity, bool);
    setter!(worker_threads, usize);
    setter!(recv_buffer_cap, usize);
    setter!(string_pool_capacity, usize);
    setter!(http2, Http2Config);
    setter!(detect, DetectConfig);

    /// Enables server-side TLS with the given material.
    pub fn tls_server(mut self, tls: TlsServerConfig) -> Self {
        self.inner_mut().tls_server = Some(Arc::new(tls));
        self
    }

    /// Enables outbound TLS with the given material.
    pub fn tls_client(mut self, tls: TlsClientConfig) -> Self {
        self.inner_mut().tls_client = Some(Arc::new(tls));
        self
    }

    /// Validates and finalizes the configuration.
    pub fn build(self) -> Result<Config> {
        self.inner.unwrap_or_default().normalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn epoll_knobs_are_clamped_to_valid_range() {
        let cfg = Config::builder()
            .epoll_size(100)
            .epoll_wait_ms(5000)
            .build()
            .unwrap();
        assert_eq!(cfg.epoll_size, 256);
        assert_eq!(cfg.epoll_wait_ms, 1000);
    }

    #[test]
    fn zero_worker_threads_is_rejected() {
        let err = Config::builder().worker_threads(0).build().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Config);
    }

    #[test]
    fn tls_server_without_key_is_rejected() {
        let err = Config::builder()
            .tls_server(TlsServerConfig::default())
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Config);
    }

    #[test]
    fn default_alpn_prefers_h2() {
        let tls = TlsServerConfig::default();
        assert_eq!(tls.alpn_or_default(), vec![b"h2".to_vec(), b"http/1.1".to_vec()]);
    }
}
