//! Logical actor addresses with location transparency.
//!
//! An [`Address`] identifies an actor by system, optional network location,
//! and a '/'-separated lineage path. Two addresses are equal only when every
//! field matches; an address without host/port refers to an actor on the
//! local node.

// Layer 1: Standard library imports
use std::fmt::{self, Display};

// Layer 2: Third-party crate imports
use serde::{Deserialize, Serialize};

// Layer 3: Internal module imports
// (none)

/// Reserved name prefix for synthetic ask-reply addresses.
const ASK_PREFIX: &str = "$ask-";

/// Logical address of an actor.
///
/// # Example
/// ```rust
/// use aktos_rt::address::Address;
///
/// let root = Address::local("orders", "dispatcher");
/// let child = root.child("worker-1");
///
/// assert!(root.is_local());
/// assert_eq!(child.path(), "/dispatcher/worker-1");
/// assert_eq!(child.name(), "worker-1");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    system: String,
    host: Option<String>,
    port: Option<u16>,
    name: String,
    path: String,
}

impl Address {
    /// Create a top-level local address.
    pub fn local(system: impl Into<String>, name: impl Into<String>) -> Self {
        let name = name.into();
        let path = format!("/{name}");
        Self {
            system: system.into(),
            host: None,
            port: None,
            name,
            path,
        }
    }

    /// Create a top-level address pinned to a remote node.
    pub fn remote(
        system: impl Into<String>,
        host: impl Into<String>,
        port: u16,
        name: impl Into<String>,
    ) -> Self {
        let name = name.into();
        let path = format!("/{name}");
        Self {
            system: system.into(),
            host: Some(host.into()),
            port: Some(port),
            name,
            path,
        }
    }

    /// Derive the address of a direct child.
    pub fn child(&self, name: impl Into<String>) -> Self {
        let name = name.into();
        let path = format!("{}/{name}", self.path);
        Self {
            system: self.system.clone(),
            host: self.host.clone(),
            port: self.port,
            name,
            path,
        }
    }

    /// Synthetic reply address used by the ask coordinator. The correlation
    /// id is embedded in the name so the reply path needs no extra state.
    pub(crate) fn ask_reply(system: impl Into<String>, correlation_id: u64) -> Self {
        Self {
            system: system.into(),
            host: None,
            port: None,
            name: format!("{ASK_PREFIX}{correlation_id}"),
            path: format!("/$ask/{correlation_id}"),
        }
    }

    /// Pin this address to a network location.
    pub(crate) fn at(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = Some(host.into());
        self.port = Some(port);
        self
    }

    /// Actor system name.
    pub fn system(&self) -> &str {
        &self.system
    }

    /// Leaf name of the actor.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Full lineage path, '/'-separated.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Host the actor lives on, when pinned to a node.
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// Remoting port of the node the actor lives on.
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// An address without a network location is local by definition.
    pub fn is_local(&self) -> bool {
        self.host.is_none() && self.port.is_none()
    }

    /// Whether this is a synthetic ask-reply address.
    pub(crate) fn is_ask(&self) -> bool {
        self.name.starts_with(ASK_PREFIX)
    }

    /// Correlation id carried by a synthetic ask-reply address.
    pub(crate) fn ask_correlation(&self) -> Option<u64> {
        self.name.strip_prefix(ASK_PREFIX)?.parse().ok()
    }

    /// `(host, port)` pair when the address is pinned to a node.
    pub fn location(&self) -> Option<(&str, u16)> {
        match (self.host.as_deref(), self.port) {
            (Some(host), Some(port)) => Some((host, port)),
            _ => None,
        }
    }
}

impl Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.location() {
            Some((host, port)) => write!(f, "aktos://{}@{host}:{port}{}", self.system, self.path),
            None => write!(f, "aktos://{}{}", self.system, self.path),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_local_address() {
        let addr = Address::local("sys", "echo");
        assert!(addr.is_local());
        assert_eq!(addr.name(), "echo");
        assert_eq!(addr.path(), "/echo");
        assert_eq!(addr.location(), None);
    }

    #[test]
    fn test_remote_address_location() {
        let addr = Address::remote("sys", "10.0.0.1", 5051, "echo");
        assert!(!addr.is_local());
        assert_eq!(addr.location(), Some(("10.0.0.1", 5051)));
    }

    #[test]
    fn test_child_lineage() {
        let root = Address::local("sys", "parent");
        let child = root.child("a");
        let grandchild = child.child("b");

        assert_eq!(grandchild.path(), "/parent/a/b");
        assert_eq!(grandchild.name(), "b");
        assert_eq!(grandchild.system(), "sys");
    }

    #[test]
    fn test_equality_over_all_fields() {
        let a = Address::local("sys", "echo");
        let b = Address::local("sys", "echo");
        let c = Address::remote("sys", "h", 1, "echo");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, Address::local("other", "echo"));
    }

    #[test]
    fn test_ask_reply_round_trip() {
        let addr = Address::ask_reply("sys", 42);
        assert!(addr.is_ask());
        assert_eq!(addr.ask_correlation(), Some(42));

        let plain = Address::local("sys", "echo");
        assert!(!plain.is_ask());
        assert_eq!(plain.ask_correlation(), None);
    }

    #[test]
    fn test_display() {
        let local = Address::local("sys", "echo");
        assert_eq!(local.to_string(), "aktos://sys/echo");

        let remote = Address::remote("sys", "127.0.0.1", 5051, "echo");
        assert_eq!(remote.to_string(), "aktos://sys@127.0.0.1:5051/echo");
    }

    #[test]
    fn test_serde_round_trip() {
        let addr = Address::remote("sys", "127.0.0.1", 5051, "echo").child("w");
        let json = serde_json::to_string(&addr).unwrap();
        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(addr, back);
    }
}
