//! System configuration with sensible defaults.

// Layer 1: Standard library
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

// Layer 2: Third-party
// (none)

// Layer 3: Internal
use crate::cluster::{ClusterConfig, DiscoveryProvider};
use crate::remote::RemoteConfig;
use crate::snapshot::SnapshotStore;
use crate::supervisor::SupervisorStrategy;

/// Default number of `pre_start` attempts before a spawn is aborted.
pub const DEFAULT_ACTOR_INIT_MAX_RETRIES: u32 = 5;

/// Default cap on a graceful drain (per cell and for system stop).
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration of one actor system instance.
///
/// Everything is explicit; there are no ambient environment variables.
/// Multiple configured systems can coexist in one process, which is how the
/// remoting and cluster test suites run.
///
/// # Example
/// ```rust
/// use aktos_rt::remote::RemoteConfig;
/// use aktos_rt::system::SystemConfig;
///
/// let config = SystemConfig::new("orders")
///     .with_actor_init_max_retries(1)
///     .with_remote(RemoteConfig::new("127.0.0.1", 5051));
///
/// assert!(config.validate().is_ok());
/// ```
#[derive(Clone)]
pub struct SystemConfig {
    name: String,
    actor_init_max_retries: u32,
    shutdown_timeout: Duration,
    remote: Option<RemoteConfig>,
    cluster: Option<ClusterConfig>,
    discovery: Option<Arc<dyn DiscoveryProvider>>,
    supervisor: SupervisorStrategy,
    snapshots: Option<Arc<dyn SnapshotStore>>,
}

impl SystemConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            actor_init_max_retries: DEFAULT_ACTOR_INIT_MAX_RETRIES,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            remote: None,
            cluster: None,
            discovery: None,
            supervisor: SupervisorStrategy::default(),
            snapshots: None,
        }
    }

    pub fn with_actor_init_max_retries(mut self, retries: u32) -> Self {
        self.actor_init_max_retries = retries;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Enable the remoting endpoint.
    pub fn with_remote(mut self, remote: RemoteConfig) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Enable cluster membership (requires remoting and a discovery
    /// provider).
    pub fn with_cluster(mut self, cluster: ClusterConfig) -> Self {
        self.cluster = Some(cluster);
        self
    }

    pub fn with_discovery(mut self, discovery: Arc<dyn DiscoveryProvider>) -> Self {
        self.discovery = Some(discovery);
        self
    }

    /// System-wide default supervisor, applied to spawns that do not carry
    /// their own.
    pub fn with_supervisor(mut self, supervisor: SupervisorStrategy) -> Self {
        self.supervisor = supervisor;
        self
    }

    /// Store for passivation snapshots.
    pub fn with_snapshots(mut self, store: Arc<dyn SnapshotStore>) -> Self {
        self.snapshots = Some(store);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn actor_init_max_retries(&self) -> u32 {
        self.actor_init_max_retries
    }

    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    pub fn remote(&self) -> Option<&RemoteConfig> {
        self.remote.as_ref()
    }

    pub fn cluster(&self) -> Option<&ClusterConfig> {
        self.cluster.as_ref()
    }

    pub fn discovery(&self) -> Option<Arc<dyn DiscoveryProvider>> {
        self.discovery.clone()
    }

    pub fn supervisor(&self) -> &SupervisorStrategy {
        &self.supervisor
    }

    pub fn snapshots(&self) -> Option<Arc<dyn SnapshotStore>> {
        self.snapshots.clone()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("system name must not be empty".into());
        }
        if !self
            .name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err("system name must be alphanumeric with '-' or '_'".into());
        }
        if self.actor_init_max_retries == 0 {
            return Err("actor_init_max_retries must be > 0".into());
        }
        if self.shutdown_timeout.is_zero() {
            return Err("shutdown_timeout must be > 0".into());
        }
        if let Some(remote) = &self.remote {
            remote.validate()?;
        }
        if let Some(cluster) = &self.cluster {
            cluster.validate()?;
            if self.remote.is_none() {
                return Err("cluster mode requires a remote configuration".into());
            }
            if self.discovery.is_none() {
                return Err("cluster mode requires a discovery provider".into());
            }
        }
        Ok(())
    }
}

impl fmt::Debug for SystemConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SystemConfig")
            .field("name", &self.name)
            .field("actor_init_max_retries", &self.actor_init_max_retries)
            .field("shutdown_timeout", &self.shutdown_timeout)
            .field("remote", &self.remote)
            .field("cluster", &self.cluster)
            .field("discovery", &self.discovery.is_some())
            .field("snapshots", &self.snapshots.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::StaticDiscovery;

    #[test]
    fn test_defaults_validate() {
        assert!(SystemConfig::new("test-system").validate().is_ok());
    }

    #[test]
    fn test_name_rules() {
        assert!(SystemConfig::new("").validate().is_err());
        assert!(SystemConfig::new("has space").validate().is_err());
        assert!(SystemConfig::new("ok_name-1").validate().is_ok());
    }

    #[test]
    fn test_cluster_requires_remote_and_discovery() {
        let config = SystemConfig::new("sys").with_cluster(ClusterConfig::default());
        assert!(config.validate().is_err());

        let config = SystemConfig::new("sys")
            .with_remote(RemoteConfig::new("127.0.0.1", 0))
            .with_cluster(ClusterConfig::default());
        assert!(config.validate().is_err());

        let config = SystemConfig::new("sys")
            .with_remote(RemoteConfig::new("127.0.0.1", 0))
            .with_cluster(ClusterConfig::default())
            .with_discovery(Arc::new(StaticDiscovery::new(vec![])));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_retries_rejected() {
        let config = SystemConfig::new("sys").with_actor_init_max_retries(0);
        assert!(config.validate().is_err());
    }
}
