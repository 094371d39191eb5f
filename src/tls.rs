//! Builds `rustls` configurations from the path-based material in
//! [`crate::config`]: reads certificate/key PEM files off disk and wires
//! them into a `ServerConfig`/`ClientConfig`, the usual pairing of
//! `rustls-pemfile` with `rustls`.

use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{ClientConfig, RootCertStore, ServerConfig};

use crate::config::{TlsClientConfig, TlsServerConfig};
use crate::error::{CoreError, Result};

fn load_certs(path: &std::path::Path) -> Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path).map_err(CoreError::Io)?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(CoreError::Io)
}

fn load_key(path: &std::path::Path) -> Result<PrivateKeyDer<'static>> {
    let file = File::open(path).map_err(CoreError::Io)?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::private_key(&mut reader)
        .map_err(CoreError::Io)?
        .ok_or_else(|| CoreError::Config("key file contains no private key".into()))
}

/// Builds a server-side `rustls::ServerConfig` from `cfg`, wiring the
/// configured ALPN list (defaulting to `h2` then `http/1.1`).
/// `Config::normalize` already guarantees `cert_path`/`key_path` are set by
/// the time this runs.
pub fn build_server_config(cfg: &TlsServerConfig) -> Result<ServerConfig> {
    let cert_path = cfg
        .cert_path
        .as_ref()
        .ok_or_else(|| CoreError::Config("tls_server.cert_path is required".into()))?;
    let key_path = cfg
        .key_path
        .as_ref()
        .ok_or_else(|| CoreError::Config("tls_server.key_path is required".into()))?;

    let certs = load_certs(cert_path)?;
    let key = load_key(key_path)?;

    let builder = ServerConfig::builder();
    let mut server_config = if cfg.verify_client {
        let ca_path = cfg
            .ca_path
            .as_ref()
            .ok_or_else(|| CoreError::Config("verify_client requires ca_path".into()))?;
        let mut roots = RootCertStore::empty();
        for cert in load_certs(ca_path)? {
            roots.add(cert).map_err(CoreError::Tls)?;
        }
        let verifier = WebPkiClientVerifier::builder(Arc::new(roots))
            .build()
            .map_err(|e| CoreError::Config(format!("client verifier setup failed: {e}")))?;
        builder.with_client_cert_verifier(verifier).with_single_cert(certs, key)
    } else {
        builder.with_no_client_auth().with_single_cert(certs, key)
    }
    .map_err(CoreError::Tls)?;

    server_config.alpn_protocols = cfg.alpn_or_default();
    Ok(server_config)
}

/// Builds a client-side `rustls::ClientConfig` for the hybrid HTTPS client
/// processor. No bundled system trust store is wired in (that would pull
/// in a dependency the rest of the crate has no other use for);
/// `cfg.ca_path` must name the CA bundle to trust.
pub fn build_client_config(cfg: &TlsClientConfig) -> Result<ClientConfig> {
    let ca_path = cfg
        .ca_path
        .as_ref()
        .ok_or_else(|| CoreError::Config("tls_client.ca_path is required".into()))?;
    let mut roots = RootCertStore::empty();
    for cert in load_certs(ca_path)? {
        roots.add(cert).map_err(CoreError::Tls)?;
    }

    let builder = ClientConfig::builder().with_root_certificates(roots);
    let mut client_config = match (&cfg.cert_path, &cfg.key_path) {
        (Some(cert_path), Some(key_path)) => {
            let certs = load_certs(cert_path)?;
            let key = load_key(key_path)?;
            builder.with_client_auth_cert(certs, key).map_err(CoreError::Tls)?
        }
        _ => builder.with_no_client_auth(),
    };

    if !cfg.alpn.is_empty() {
        client_config.alpn_protocols = cfg.alpn.iter().map(|p| p.clone().into_bytes()).collect();
    }
    if !cfg.session_cache {
        client_config.resumption = rustls::client::Resumption::disabled();
    }
    Ok(client_config)
}
