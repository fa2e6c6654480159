//! The consistent-hash partition ring.

// Layer 1: Standard library imports
use std::collections::BTreeMap;
use std::sync::Arc;

// Layer 2: Third-party crate imports
// (none)

// Layer 3: Internal module imports
use super::hash::RingHasher;

/// Virtual points per node; smooths ownership across small clusters.
const VNODES_PER_NODE: u32 = 64;

/// Maps partitions to owning nodes.
///
/// A key hashes to `hash(key) mod partitions` (its partition); each
/// partition hashes to a point on the ring, and its preference list is the
/// first `n` distinct nodes walking clockwise from that point.
pub(crate) struct PartitionRing {
    partitions: u32,
    hasher: Arc<dyn RingHasher>,
    points: BTreeMap<u64, String>,
    nodes: Vec<String>,
}

impl PartitionRing {
    pub(crate) fn new(partitions: u32, hasher: Arc<dyn RingHasher>) -> Self {
        Self {
            partitions,
            hasher,
            points: BTreeMap::new(),
            nodes: Vec::new(),
        }
    }

    /// Rebuild the ring for a new membership view.
    pub(crate) fn set_nodes(&mut self, nodes: &[String]) {
        self.points.clear();
        self.nodes = nodes.to_vec();
        for node in nodes {
            for vnode in 0..VNODES_PER_NODE {
                let point = self.hasher.hash(format!("{node}#{vnode}").as_bytes());
                self.points.insert(point, node.clone());
            }
        }
    }

    pub(crate) fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Partition a key belongs to.
    pub(crate) fn partition_for(&self, key: &str) -> u32 {
        (self.hasher.hash(key.as_bytes()) % u64::from(self.partitions)) as u32
    }

    /// Owner plus successors for a partition: up to `n` distinct nodes,
    /// clockwise from the partition's point.
    pub(crate) fn owners(&self, partition: u32, n: usize) -> Vec<String> {
        if self.points.is_empty() || n == 0 {
            return Vec::new();
        }
        let point = self.hasher.hash(format!("partition-{partition}").as_bytes());
        let mut owners: Vec<String> = Vec::with_capacity(n);

        for (_, node) in self.points.range(point..).chain(self.points.range(..point)) {
            if !owners.contains(node) {
                owners.push(node.clone());
                if owners.len() == n {
                    break;
                }
            }
        }
        owners
    }

    /// Preference list for a key.
    pub(crate) fn owners_for_key(&self, key: &str, n: usize) -> Vec<String> {
        self.owners(self.partition_for(key), n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::hash::Murmur3Hasher;

    fn ring(nodes: &[&str]) -> PartitionRing {
        let mut ring = PartitionRing::new(271, Arc::new(Murmur3Hasher::default()));
        ring.set_nodes(&nodes.iter().map(|n| (*n).to_owned()).collect::<Vec<_>>());
        ring
    }

    #[test]
    fn test_empty_ring() {
        let ring = PartitionRing::new(271, Arc::new(Murmur3Hasher::default()));
        assert!(ring.is_empty());
        assert!(ring.owners(0, 2).is_empty());
    }

    #[test]
    fn test_partition_is_stable() {
        let ring = ring(&["a:1", "b:1", "c:1"]);
        let p1 = ring.partition_for("echo");
        let p2 = ring.partition_for("echo");
        assert_eq!(p1, p2);
        assert!(p1 < 271);
    }

    #[test]
    fn test_owners_are_distinct() {
        let ring = ring(&["a:1", "b:1", "c:1"]);
        for partition in 0..50 {
            let owners = ring.owners(partition, 3);
            assert_eq!(owners.len(), 3);
            let mut unique = owners.clone();
            unique.sort();
            unique.dedup();
            assert_eq!(unique.len(), 3);
        }
    }

    #[test]
    fn test_owner_count_capped_by_membership() {
        let ring = ring(&["a:1"]);
        assert_eq!(ring.owners(13, 3), vec!["a:1".to_owned()]);
    }

    #[test]
    fn test_ownership_mostly_stable_under_join() {
        let before = ring(&["a:1", "b:1"]);
        let after = ring(&["a:1", "b:1", "c:1"]);

        let moved = (0..271)
            .filter(|p| {
                let old = before.owners(*p, 1);
                let new = after.owners(*p, 1);
                old != new && new != vec!["c:1".to_owned()]
            })
            .count();
        // A join may claim partitions, but ownership must never shuffle
        // between the surviving nodes.
        assert_eq!(moved, 0);
    }

    #[test]
    fn test_owners_for_key_matches_partition() {
        let ring = ring(&["a:1", "b:1", "c:1"]);
        let partition = ring.partition_for("echo");
        assert_eq!(ring.owners_for_key("echo", 2), ring.owners(partition, 2));
    }
}
