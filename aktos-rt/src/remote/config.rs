//! Remoting configuration.

// Layer 1: Standard library imports
use std::time::Duration;

// Layer 2: Third-party crate imports
// (none)

// Layer 3: Internal module imports
use super::tls::{ClientTlsConfig, ServerTlsConfig};

/// Default cap on a single wire frame (16 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Default idle window after which a server closes a silent connection.
pub const DEFAULT_READ_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Default bound on a single frame write.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration of the node's remoting endpoint.
///
/// # Example
/// ```rust
/// use aktos_rt::remote::RemoteConfig;
/// use std::time::Duration;
///
/// let config = RemoteConfig::new("127.0.0.1", 5051)
///     .with_max_frame_size(4 * 1024 * 1024)
///     .with_write_timeout(Duration::from_secs(5));
///
/// assert_eq!(config.port(), 5051);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    host: String,
    port: u16,
    max_frame_size: usize,
    read_idle_timeout: Duration,
    write_timeout: Duration,
    server_tls: Option<ServerTlsConfig>,
    client_tls: Option<ClientTlsConfig>,
}

impl RemoteConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            read_idle_timeout: DEFAULT_READ_IDLE_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            server_tls: None,
            client_tls: None,
        }
    }

    pub fn with_max_frame_size(mut self, bytes: usize) -> Self {
        self.max_frame_size = bytes;
        self
    }

    pub fn with_read_idle_timeout(mut self, timeout: Duration) -> Self {
        self.read_idle_timeout = timeout;
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Terminate inbound connections with TLS.
    pub fn with_server_tls(mut self, tls: ServerTlsConfig) -> Self {
        self.server_tls = Some(tls);
        self
    }

    /// Authenticate outbound connections with TLS.
    pub fn with_client_tls(mut self, tls: ClientTlsConfig) -> Self {
        self.client_tls = Some(tls);
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    pub fn read_idle_timeout(&self) -> Duration {
        self.read_idle_timeout
    }

    pub fn write_timeout(&self) -> Duration {
        self.write_timeout
    }

    pub fn server_tls(&self) -> Option<&ServerTlsConfig> {
        self.server_tls.as_ref()
    }

    pub fn client_tls(&self) -> Option<&ClientTlsConfig> {
        self.client_tls.as_ref()
    }

    /// Mutual TLS is in force when both sides are configured.
    pub fn is_mutual_tls(&self) -> bool {
        self.server_tls.is_some() && self.client_tls.is_some()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.host.is_empty() {
            return Err("remote host must not be empty".into());
        }
        if self.max_frame_size == 0 {
            return Err("max_frame_size must be > 0".into());
        }
        if self.read_idle_timeout.is_zero() {
            return Err("read_idle_timeout must be > 0".into());
        }
        if self.write_timeout.is_zero() {
            return Err("write_timeout must be > 0".into());
        }
        Ok(())
    }
}
