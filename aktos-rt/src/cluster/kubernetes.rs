//! Kubernetes-shaped discovery.
//!
//! Peers are pods selected by label; the pod-listing API itself stays
//! behind the [`PodLister`] seam, so this module carries only the
//! configuration contract and the selection logic.

// Layer 1: Standard library imports
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

// Layer 2: Third-party crate imports
use async_trait::async_trait;

// Layer 3: Internal module imports
use super::discovery::{DiscoveryError, DiscoveryProvider, Endpoint};

/// Kubernetes discovery configuration. Pods are matched by `pod_labels`
/// only; the port names map the pod spec's named ports onto the runtime's
/// logical channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KubernetesConfig {
    pub namespace: String,
    pub discovery_port_name: String,
    pub remoting_port_name: String,
    pub peers_port_name: String,
    pub pod_labels: BTreeMap<String, String>,
}

impl KubernetesConfig {
    /// Fail-fast validation: the first empty field wins.
    pub fn validate(&self) -> Result<(), DiscoveryError> {
        for (field, value) in [
            ("namespace", &self.namespace),
            ("discovery_port_name", &self.discovery_port_name),
            ("peers_port_name", &self.peers_port_name),
            ("remoting_port_name", &self.remoting_port_name),
        ] {
            if value.is_empty() {
                return Err(DiscoveryError::InvalidConfig(format!(
                    "{field} must not be empty"
                )));
            }
        }
        Ok(())
    }
}

/// A pod as the lister reports it: its address plus named ports and labels.
#[derive(Debug, Clone)]
pub struct PodSpec {
    pub host: String,
    pub labels: BTreeMap<String, String>,
    pub ports_by_name: BTreeMap<String, u16>,
}

/// The external pod-listing API boundary.
#[async_trait]
pub trait PodLister: Send + Sync + 'static {
    async fn list_pods(&self, namespace: &str) -> Result<Vec<PodSpec>, DiscoveryError>;
}

/// Discovery provider backed by a pod lister.
pub struct KubernetesDiscovery<L: PodLister> {
    config: KubernetesConfig,
    lister: L,
    initialized: AtomicBool,
}

impl<L: PodLister> KubernetesDiscovery<L> {
    pub fn new(config: KubernetesConfig, lister: L) -> Self {
        Self {
            config,
            lister,
            initialized: AtomicBool::new(false),
        }
    }

    fn selected(&self, pod: &PodSpec) -> bool {
        self.config
            .pod_labels
            .iter()
            .all(|(key, value)| pod.labels.get(key) == Some(value))
    }
}

#[async_trait]
impl<L: PodLister> DiscoveryProvider for KubernetesDiscovery<L> {
    async fn initialize(&self) -> Result<(), DiscoveryError> {
        self.config.validate()?;
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
        let pods = self.lister.list_pods(&self.config.namespace).await?;
        let mut peers = Vec::new();
        for pod in pods.iter().filter(|pod| self.selected(pod)) {
            let Some(port) = pod.ports_by_name.get(&self.config.peers_port_name) else {
                continue; // pod not yet exposing the peers port
            };
            peers.push(Endpoint::new(pod.host.clone(), *port));
        }
        Ok(peers)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn config() -> KubernetesConfig {
        KubernetesConfig {
            namespace: "default".into(),
            discovery_port_name: "gossip".into(),
            remoting_port_name: "remoting".into(),
            peers_port_name: "peers".into(),
            pod_labels: BTreeMap::from([("app".to_owned(), "aktos".to_owned())]),
        }
    }

    fn pod(host: &str, app: &str) -> PodSpec {
        PodSpec {
            host: host.into(),
            labels: BTreeMap::from([("app".to_owned(), app.to_owned())]),
            ports_by_name: BTreeMap::from([
                ("gossip".to_owned(), 5050),
                ("remoting".to_owned(), 5051),
                ("peers".to_owned(), 5052),
            ]),
        }
    }

    struct FixedLister {
        pods: Vec<PodSpec>,
    }

    #[async_trait]
    impl PodLister for FixedLister {
        async fn list_pods(&self, _namespace: &str) -> Result<Vec<PodSpec>, DiscoveryError> {
            Ok(self.pods.clone())
        }
    }

    #[test]
    fn test_validation_fail_fast_order() {
        let mut cfg = config();
        cfg.namespace = String::new();
        cfg.peers_port_name = String::new();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("namespace"));
    }

    #[tokio::test]
    async fn test_label_selection() {
        let provider = KubernetesDiscovery::new(
            config(),
            FixedLister {
                pods: vec![pod("10.0.0.1", "aktos"), pod("10.0.0.2", "other")],
            },
        );
        provider.initialize().await.unwrap();

        let peers = provider.discover_peers().await.unwrap();
        assert_eq!(peers, vec![Endpoint::new("10.0.0.1", 5052)]);
    }

    #[tokio::test]
    async fn test_pod_without_peers_port_is_skipped() {
        let mut incomplete = pod("10.0.0.3", "aktos");
        incomplete.ports_by_name.remove("peers");
        let provider = KubernetesDiscovery::new(config(), FixedLister { pods: vec![incomplete] });
        provider.initialize().await.unwrap();

        assert!(provider.discover_peers().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_config_blocks_initialize() {
        let mut cfg = config();
        cfg.remoting_port_name = String::new();
        let provider = KubernetesDiscovery::new(cfg, FixedLister { pods: vec![] });
        assert!(matches!(
            provider.initialize().await,
            Err(DiscoveryError::InvalidConfig(_))
        ));
    }
}
