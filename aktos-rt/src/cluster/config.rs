//! Cluster engine configuration.

// Layer 1: Standard library imports
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

// Layer 2: Third-party crate imports
// (none)

// Layer 3: Internal module imports
use super::hash::{Murmur3Hasher, RingHasher};
use crate::remote::{ClientTlsConfig, ServerTlsConfig};

/// Default number of virtual buckets on the ring.
pub const DEFAULT_PARTITIONS_COUNT: u32 = 271;

/// Default replication factor.
pub const DEFAULT_REPLICA_COUNT: u32 = 1;

pub const DEFAULT_WRITE_QUORUM: u32 = 1;
pub const DEFAULT_READ_QUORUM: u32 = 1;
pub const DEFAULT_MINIMUM_PEERS_QUORUM: u32 = 1;
pub const DEFAULT_BOOTSTRAP_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_CACHE_SYNC_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// Soft cap on directory entries held by one node.
pub const DEFAULT_TABLE_SIZE: usize = 1 << 20;

/// Configuration of the cluster engine.
///
/// # Example
/// ```rust
/// use aktos_rt::cluster::ClusterConfig;
///
/// let config = ClusterConfig::new()
///     .with_partitions_count(271)
///     .with_replica_count(2)
///     .with_write_quorum(2)
///     .with_read_quorum(1);
///
/// assert!(config.validate().is_ok());
/// ```
#[derive(Clone)]
pub struct ClusterConfig {
    partitions_count: u32,
    replica_count: u32,
    write_quorum: u32,
    read_quorum: u32,
    minimum_peers_quorum: u32,
    bootstrap_timeout: Duration,
    cache_sync_interval: Duration,
    table_size: usize,
    write_timeout: Duration,
    read_timeout: Duration,
    shutdown_timeout: Duration,
    hasher: Arc<dyn RingHasher>,
    server_tls: Option<ServerTlsConfig>,
    client_tls: Option<ClientTlsConfig>,
}

impl ClusterConfig {
    pub fn new() -> Self {
        Self {
            partitions_count: DEFAULT_PARTITIONS_COUNT,
            replica_count: DEFAULT_REPLICA_COUNT,
            write_quorum: DEFAULT_WRITE_QUORUM,
            read_quorum: DEFAULT_READ_QUORUM,
            minimum_peers_quorum: DEFAULT_MINIMUM_PEERS_QUORUM,
            bootstrap_timeout: DEFAULT_BOOTSTRAP_TIMEOUT,
            cache_sync_interval: DEFAULT_CACHE_SYNC_INTERVAL,
            table_size: DEFAULT_TABLE_SIZE,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            hasher: Arc::new(Murmur3Hasher::default()),
            server_tls: None,
            client_tls: None,
        }
    }

    pub fn with_partitions_count(mut self, partitions: u32) -> Self {
        self.partitions_count = partitions;
        self
    }

    pub fn with_replica_count(mut self, replicas: u32) -> Self {
        self.replica_count = replicas;
        self
    }

    pub fn with_write_quorum(mut self, quorum: u32) -> Self {
        self.write_quorum = quorum;
        self
    }

    pub fn with_read_quorum(mut self, quorum: u32) -> Self {
        self.read_quorum = quorum;
        self
    }

    pub fn with_minimum_peers_quorum(mut self, quorum: u32) -> Self {
        self.minimum_peers_quorum = quorum;
        self
    }

    pub fn with_bootstrap_timeout(mut self, timeout: Duration) -> Self {
        self.bootstrap_timeout = timeout;
        self
    }

    pub fn with_cache_sync_interval(mut self, interval: Duration) -> Self {
        self.cache_sync_interval = interval;
        self
    }

    pub fn with_table_size(mut self, entries: usize) -> Self {
        self.table_size = entries;
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn with_hasher(mut self, hasher: Arc<dyn RingHasher>) -> Self {
        self.hasher = hasher;
        self
    }

    pub fn with_tls(mut self, server: ServerTlsConfig, client: ClientTlsConfig) -> Self {
        self.server_tls = Some(server);
        self.client_tls = Some(client);
        self
    }

    pub fn partitions_count(&self) -> u32 {
        self.partitions_count
    }

    pub fn replica_count(&self) -> u32 {
        self.replica_count
    }

    pub fn write_quorum(&self) -> u32 {
        self.write_quorum
    }

    pub fn read_quorum(&self) -> u32 {
        self.read_quorum
    }

    pub fn minimum_peers_quorum(&self) -> u32 {
        self.minimum_peers_quorum
    }

    pub fn bootstrap_timeout(&self) -> Duration {
        self.bootstrap_timeout
    }

    pub fn cache_sync_interval(&self) -> Duration {
        self.cache_sync_interval
    }

    pub fn table_size(&self) -> usize {
        self.table_size
    }

    pub fn write_timeout(&self) -> Duration {
        self.write_timeout
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    pub fn hasher(&self) -> Arc<dyn RingHasher> {
        Arc::clone(&self.hasher)
    }

    pub fn server_tls(&self) -> Option<&ServerTlsConfig> {
        self.server_tls.as_ref()
    }

    pub fn client_tls(&self) -> Option<&ClientTlsConfig> {
        self.client_tls.as_ref()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.partitions_count == 0 {
            return Err("partitions_count must be > 0".into());
        }
        if self.replica_count == 0 {
            return Err("replica_count must be > 0".into());
        }
        if self.write_quorum == 0 || self.write_quorum > self.replica_count {
            return Err("write_quorum must be in 1..=replica_count".into());
        }
        if self.read_quorum == 0 || self.read_quorum > self.replica_count {
            return Err("read_quorum must be in 1..=replica_count".into());
        }
        if self.minimum_peers_quorum == 0 {
            return Err("minimum_peers_quorum must be > 0".into());
        }
        if self.bootstrap_timeout.is_zero() {
            return Err("bootstrap_timeout must be > 0".into());
        }
        Ok(())
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ClusterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterConfig")
            .field("partitions_count", &self.partitions_count)
            .field("replica_count", &self.replica_count)
            .field("write_quorum", &self.write_quorum)
            .field("read_quorum", &self.read_quorum)
            .field("minimum_peers_quorum", &self.minimum_peers_quorum)
            .field("bootstrap_timeout", &self.bootstrap_timeout)
            .field("cache_sync_interval", &self.cache_sync_interval)
            .field("table_size", &self.table_size)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(ClusterConfig::default().validate().is_ok());
    }

    #[test]
    fn test_quorum_bounds() {
        let config = ClusterConfig::new().with_replica_count(2).with_write_quorum(3);
        assert!(config.validate().is_err());

        let config = ClusterConfig::new().with_replica_count(3).with_write_quorum(2);
        assert!(config.validate().is_ok());

        let config = ClusterConfig::new().with_read_quorum(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_builder_round_trip() {
        let config = ClusterConfig::new()
            .with_partitions_count(31)
            .with_replica_count(3)
            .with_write_quorum(2)
            .with_read_quorum(2)
            .with_minimum_peers_quorum(2)
            .with_bootstrap_timeout(Duration::from_secs(3))
            .with_cache_sync_interval(Duration::from_secs(9))
            .with_table_size(4096);

        assert_eq!(config.partitions_count(), 31);
        assert_eq!(config.replica_count(), 3);
        assert_eq!(config.write_quorum(), 2);
        assert_eq!(config.read_quorum(), 2);
        assert_eq!(config.minimum_peers_quorum(), 2);
        assert_eq!(config.bootstrap_timeout(), Duration::from_secs(3));
        assert_eq!(config.cache_sync_interval(), Duration::from_secs(9));
        assert_eq!(config.table_size(), 4096);
    }
}
