//! Crate-wide error types.
//!
//! Transient I/O is not an error at all (callers check
//! [`std::io::ErrorKind::WouldBlock`] directly), while everything that
//! reaches [`CoreError`] ends a connection or, for [`CoreError::Config`],
//! the process.

use std::fmt;

/// Which of the six kinds from the error handling design a failure belongs to.
///
/// `Transient` is never constructed as a [`CoreError`] — it exists so
/// [`ErrorKind`] can be handed to `on_error(kind, message)` uniformly even
/// though would-block never reaches that callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Would-block; not surfaced as a `CoreError` in practice.
    Transient,
    /// Orderly peer shutdown.
    PeerClose,
    /// Framing or header violation.
    Protocol,
    /// Resource bound exceeded (buffer cap, detector timeout/overflow).
    Resource,
    /// User handler signaled a fatal condition.
    Handler,
    /// Invalid configuration, fatal to process startup.
    Config,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ErrorKind::Transient => "transient",
            ErrorKind::PeerClose => "peer-close",
            ErrorKind::Protocol => "protocol",
            ErrorKind::Resource => "resource",
            ErrorKind::Handler => "handler",
            ErrorKind::Config => "config",
        })
    }
}

/// Top-level error type returned by fallible crate operations.
///
/// Connection-scoped errors never cross a thread boundary; a `CoreError`
/// produced on one worker is handled by that worker's
/// [`crate::container::Container`] and is not propagated to others.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The peer closed its half of the connection in an orderly way.
    #[error("peer closed connection")]
    PeerClosed,

    /// A wire-format or header violation. `code` is an HTTP/2 error code
    /// when `stream` is `Some`; connection-level otherwise.
    #[error("protocol violation: {message}")]
    Protocol {
        /// Human-readable detail.
        message: String,
        /// Stream the violation is scoped to, if any.
        stream: Option<u32>,
    },

    /// A resource bound was exceeded: recv buffer cap, detector sniff
    /// buffer, or detector deadline.
    #[error("resource limit exceeded: {0}")]
    Resource(&'static str),

    /// User-supplied handler code signaled a fatal condition.
    #[error("handler error: {0}")]
    Handler(String),

    /// Invalid configuration, discovered at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// Wraps the underlying OS error for I/O operations that are not
    /// would-block.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// TLS handshake or record-layer failure.
    #[error("tls error: {0}")]
    Tls(#[from] rustls::Error),
}

impl CoreError {
    /// Classifies this error into one of [`ErrorKind`]'s variants.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::PeerClosed => ErrorKind::PeerClose,
            CoreError::Protocol { .. } => ErrorKind::Protocol,
            CoreError::Resource(_) => ErrorKind::Resource,
            CoreError::Handler(_) => ErrorKind::Handler,
            CoreError::Config(_) => ErrorKind::Config,
            CoreError::Io(_) | CoreError::Tls(_) => ErrorKind::Protocol,
        }
    }

    /// True when this error should tear the connection down rather than
    /// merely being logged and ignored. Only `Config` (process startup) is
    /// excluded, since it never reaches a live connection.
    pub fn is_fatal_to_connection(&self) -> bool {
        !matches!(self, CoreError::Config(_))
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_error_reports_protocol_kind() {
        let err = CoreError::Protocol {
            message: "bad frame".into(),
            stream: Some(3),
        };
        assert_eq!(err.kind(), ErrorKind::Protocol);
        assert!(err.is_fatal_to_connection());
    }

    #[test]
    fn config_error_is_not_fatal_to_connection() {
        let err = CoreError::Config("bad cert path".into());
        assert_eq!(err.kind(), ErrorKind::Config);
        assert!(!err.is_fatal_to_connection());
    }
}
