//! TLS to the target server, layered over a proxy tunnel

use std::sync::Arc;

use rustls::pki_types::ServerName;
use rustls::crypto::CryptoProvider;
use rustls::ClientConfig;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

use crate::error::{LensError, Result};

/// Build a connector trusting the Mozilla root store
pub fn connector() -> Result<TlsConnector> {
    let mut root_store = rustls::RootCertStore::empty();
    root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    // reqwest pulls in a second provider; pick one explicitly.
    let provider = CryptoProvider::get_default()
        .cloned()
        .unwrap_or_else(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()));

    let mut config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| LensError::Internal(format!("Invalid TLS configuration: {}", e)))?
        .with_root_certificates(root_store)
        .with_no_client_auth();
    // The fetcher speaks HTTP/1.1 only.
    config.alpn_protocols = vec![b"http/1.1".to_vec()];

    Ok(TlsConnector::from(Arc::new(config)))
}

/// Run the TLS handshake with `host` over an already tunnelled stream
pub async fn handshake<S>(connector: &TlsConnector, host: &str, stream: S) -> Result<TlsStream<S>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let server_name = ServerName::try_from(host.to_string())
        .map_err(|_| LensError::InvalidInput(format!("Invalid TLS server name: {}", host)))?;

    connector
        .connect(server_name, stream)
        .await
        .map_err(|e| LensError::Upstream(format!("TLS handshake with {} failed: {}", host, e)))
}
