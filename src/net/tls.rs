//! TLS configuration and certificate loading.

use std::path::{Path, PathBuf};

use axum_server::tls_rustls::RustlsConfig;
use thiserror::Error;

use crate::config::schema::TlsConfig;

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("TLS file not found: {}", path.display())]
    Missing { path: PathBuf },

    #[error("failed to read TLS file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TLS material in {}: {reason}", path.display())]
    Invalid { path: PathBuf, reason: String },
}

/// Load key, certificate and optional CA bundle into a rustls config.
///
/// The CA bundle is appended to the served certificate chain.
pub async fn load_tls_config(tls: &TlsConfig) -> Result<RustlsConfig, TlsError> {
    let key = read_pem(&tls.key).await?;
    let mut chain = read_pem(&tls.cert).await?;

    if rustls_pemfile::private_key(&mut key.as_slice())
        .ok()
        .flatten()
        .is_none()
    {
        return Err(invalid(&tls.key, "no private key found"));
    }
    ensure_certs(&tls.cert, &chain)?;

    if let Some(ca) = &tls.ca {
        let ca_pem = read_pem(ca).await?;
        ensure_certs(ca, &ca_pem)?;
        if !chain.ends_with(b"\n") {
            chain.push(b'\n');
        }
        chain.extend_from_slice(&ca_pem);
    }

    RustlsConfig::from_pem(chain, key)
        .await
        .map_err(|e| invalid(&tls.cert, &e.to_string()))
}

async fn read_pem(path: &Path) -> Result<Vec<u8>, TlsError> {
    // Basic validation
    if !path.exists() {
        return Err(TlsError::Missing {
            path: path.to_path_buf(),
        });
    }
    tokio::fs::read(path).await.map_err(|source| TlsError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn ensure_certs(path: &Path, pem: &[u8]) -> Result<(), TlsError> {
    let certs = rustls_pemfile::certs(&mut &pem[..])
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| invalid(path, &e.to_string()))?;
    if certs.is_empty() {
        return Err(invalid(path, "no certificates found"));
    }
    Ok(())
}

fn invalid(path: &Path, reason: &str) -> TlsError {
    TlsError::Invalid {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_key_is_reported_with_path() {
        let tmp = tempfile::tempdir().unwrap();
        let tls = TlsConfig {
            key: tmp.path().join("nope.key"),
            cert: tmp.path().join("nope.crt"),
            ca: None,
        };
        let err = load_tls_config(&tls).await.unwrap_err();
        match err {
            TlsError::Missing { path } => assert_eq!(path, tmp.path().join("nope.key")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn garbage_material_is_invalid() {
        let tmp = tempfile::tempdir().unwrap();
        let key = tmp.path().join("server.key");
        let cert = tmp.path().join("server.crt");
        std::fs::write(&key, "not a key").unwrap();
        std::fs::write(&cert, "not a cert").unwrap();

        let err = load_tls_config(&TlsConfig { key, cert, ca: None })
            .await
            .unwrap_err();
        assert!(matches!(err, TlsError::Invalid { .. }));
    }
}
