//! Cluster error taxonomy.

// Layer 1: Standard library imports
use std::time::Duration;

// Layer 2: Third-party crate imports
use thiserror::Error;

// Layer 3: Internal module imports
use super::discovery::DiscoveryError;
use super::engine::MembershipState;
use crate::message::CodecError;
use crate::remote::RemoteError;

/// Failures of cluster membership and the replicated directory.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Too few replicas acknowledged within the deadline. Bootstrap failures
    /// carry this cause as well: `Joined` requires the minimum peer quorum.
    #[error("quorum unmet: required {required}, acknowledged {acked}")]
    QuorumUnmet { required: u32, acked: u32 },

    /// The partition currently has no live owner.
    #[error("partition {0} has no live owner")]
    PartitionUnavailable(u32),

    /// A write raced a newer version of the same entry.
    #[error("stale view of '{name}': version {version} is behind {newer}")]
    StaleView {
        name: String,
        version: u64,
        newer: u64,
    },

    /// The engine is not in a state that can serve the operation.
    #[error("cluster engine is {0:?}")]
    NotRunning(MembershipState),

    /// Peer bootstrap did not complete within `bootstrap_timeout`.
    #[error("bootstrap did not reach quorum within {0:?}")]
    BootstrapTimeout(Duration),

    /// Discovery provider failure.
    #[error(transparent)]
    Discovery(#[from] DiscoveryError),

    /// Underlying transport failure.
    #[error(transparent)]
    Transport(#[from] RemoteError),

    /// Payload codec failure on the replication path.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Invalid cluster configuration.
    #[error("invalid cluster configuration: {0}")]
    Config(String),
}
