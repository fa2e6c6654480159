//! TLS material loading for the remoting transport.
//!
//! Server- and client-side configurations are independent; supplying both
//! yields mutual TLS. Certificates and keys are PEM files on disk, loaded
//! once when the endpoint starts.

// Layer 1: Standard library imports
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

// Layer 2: Third-party crate imports
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::server::WebPkiClientVerifier;
use tokio_rustls::rustls::{ClientConfig, RootCertStore, ServerConfig};
use tokio_rustls::{TlsAcceptor, TlsConnector};

// Layer 3: Internal module imports
use super::error::RemoteError;

/// TLS termination for inbound connections.
#[derive(Debug, Clone)]
pub struct ServerTlsConfig {
    cert_chain: PathBuf,
    private_key: PathBuf,
    /// When set, clients must present certificates signed by this CA.
    client_ca: Option<PathBuf>,
}

impl ServerTlsConfig {
    pub fn new(cert_chain: impl Into<PathBuf>, private_key: impl Into<PathBuf>) -> Self {
        Self {
            cert_chain: cert_chain.into(),
            private_key: private_key.into(),
            client_ca: None,
        }
    }

    /// Require client certificates (the server half of mutual TLS).
    pub fn with_client_ca(mut self, ca: impl Into<PathBuf>) -> Self {
        self.client_ca = Some(ca.into());
        self
    }
}

/// TLS authentication for outbound connections.
#[derive(Debug, Clone)]
pub struct ClientTlsConfig {
    ca: PathBuf,
    /// Client certificate and key (the client half of mutual TLS).
    identity: Option<(PathBuf, PathBuf)>,
    /// Server-name override when peers are addressed by IP.
    domain: Option<String>,
}

impl ClientTlsConfig {
    pub fn new(ca: impl Into<PathBuf>) -> Self {
        Self {
            ca: ca.into(),
            identity: None,
            domain: None,
        }
    }

    pub fn with_identity(
        mut self,
        cert_chain: impl Into<PathBuf>,
        private_key: impl Into<PathBuf>,
    ) -> Self {
        self.identity = Some((cert_chain.into(), private_key.into()));
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub(crate) fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, RemoteError> {
    let file = File::open(path)
        .map_err(|e| RemoteError::TlsConfig(format!("{}: {e}", path.display())))?;
    rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| RemoteError::TlsConfig(format!("{}: {e}", path.display())))
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>, RemoteError> {
    let file = File::open(path)
        .map_err(|e| RemoteError::TlsConfig(format!("{}: {e}", path.display())))?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|e| RemoteError::TlsConfig(format!("{}: {e}", path.display())))?
        .ok_or_else(|| RemoteError::TlsConfig(format!("{}: no private key found", path.display())))
}

fn load_roots(path: &Path) -> Result<RootCertStore, RemoteError> {
    let mut roots = RootCertStore::empty();
    for cert in load_certs(path)? {
        roots
            .add(cert)
            .map_err(|e| RemoteError::TlsConfig(format!("{}: {e}", path.display())))?;
    }
    Ok(roots)
}

pub(crate) fn build_acceptor(config: &ServerTlsConfig) -> Result<TlsAcceptor, RemoteError> {
    let certs = load_certs(&config.cert_chain)?;
    let key = load_key(&config.private_key)?;

    let server_config = match &config.client_ca {
        Some(ca) => {
            let roots = load_roots(ca)?;
            let verifier = WebPkiClientVerifier::builder(Arc::new(roots))
                .build()
                .map_err(|e| RemoteError::TlsConfig(e.to_string()))?;
            ServerConfig::builder()
                .with_client_cert_verifier(verifier)
                .with_single_cert(certs, key)
        }
        None => ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key),
    }
    .map_err(|e| RemoteError::TlsConfig(e.to_string()))?;

    Ok(TlsAcceptor::from(Arc::new(server_config)))
}

pub(crate) fn build_connector(config: &ClientTlsConfig) -> Result<TlsConnector, RemoteError> {
    let roots = load_roots(&config.ca)?;
    let builder = ClientConfig::builder().with_root_certificates(roots);

    let client_config = match &config.identity {
        Some((cert_path, key_path)) => {
            let certs = load_certs(cert_path)?;
            let key = load_key(key_path)?;
            builder
                .with_client_auth_cert(certs, key)
                .map_err(|e| RemoteError::TlsConfig(e.to_string()))?
        }
        None => builder.with_no_client_auth(),
    };

    Ok(TlsConnector::from(Arc::new(client_config)))
}
