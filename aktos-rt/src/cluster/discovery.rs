//! The discovery plug-in boundary.

// Layer 1: Standard library imports
use std::fmt::{self, Display};
use std::sync::atomic::{AtomicBool, Ordering};

// Layer 2: Third-party crate imports
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// Layer 3: Internal module imports
// (none)

/// A peer's network endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Discovery provider failures.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("discovery provider not initialized")]
    NotInitialized,

    #[error("discovery provider already initialized")]
    AlreadyInitialized,

    #[error("invalid discovery configuration: {0}")]
    InvalidConfig(String),

    #[error("peer lookup failed: {0}")]
    Lookup(String),
}

/// A source of peer endpoints. Implementations wrap whatever the deployment
/// environment offers: a static seed list, a pod-listing API, DNS.
#[async_trait]
pub trait DiscoveryProvider: Send + Sync + 'static {
    /// Validate configuration and prepare the provider. Called once when
    /// the cluster engine starts.
    async fn initialize(&self) -> Result<(), DiscoveryError>;

    /// Tear the provider down. Called when the node leaves.
    async fn deregister(&self) -> Result<(), DiscoveryError>;

    /// Current set of peer endpoints, self possibly included.
    async fn discover_peers(&self) -> Result<Vec<Endpoint>, DiscoveryError>;
}

/// Fixed seed-list provider; the reference implementation and the one tests
/// use.
pub struct StaticDiscovery {
    peers: Vec<Endpoint>,
    initialized: AtomicBool,
}

impl StaticDiscovery {
    pub fn new(peers: Vec<Endpoint>) -> Self {
        Self {
            peers,
            initialized: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl DiscoveryProvider for StaticDiscovery {
    async fn initialize(&self) -> Result<(), DiscoveryError> {
        if self.initialized.swap(true, Ordering::AcqRel) {
            return Err(DiscoveryError::AlreadyInitialized);
        }
        Ok(())
    }

    async fn deregister(&self) -> Result<(), DiscoveryError> {
        if !self.initialized.swap(false, Ordering::AcqRel) {
            return Err(DiscoveryError::NotInitialized);
        }
        Ok(())
    }

    async fn discover_peers(&self) -> Result<Vec<Endpoint>, DiscoveryError> {
        if !self.initialized.load(Ordering::Acquire) {
            return Err(DiscoveryError::NotInitialized);
        }
        Ok(self.peers.clone())
    }
}
