//! Consistent-hash ring mapping partition keys onto worker labels.

use std::collections::BTreeMap;

use xxhash_rust::xxh3::xxh3_64;

use crate::types::PartitionLabel;

/// Default number of virtual points each label occupies on the ring.
pub const DEFAULT_REPLICAS: usize = 64;

/// A fixed ring of labels. Keys are assigned to the first virtual point at or
/// after their hash, wrapping around at the top of the hash space.
#[derive(Debug, Clone)]
pub struct HashRing {
    points: BTreeMap<u64, PartitionLabel>,
    labels: Vec<PartitionLabel>,
}

impl HashRing {
    pub fn new(labels: Vec<PartitionLabel>) -> Self {
        Self::with_replicas(labels, DEFAULT_REPLICAS)
    }

    pub fn with_replicas(labels: Vec<PartitionLabel>, replicas: usize) -> Self {
        let replicas = replicas.max(1);
        let mut points = BTreeMap::new();
        for label in &labels {
            for replica in 0..replicas {
                let point = xxh3_64(format!("{label}#{replica}").as_bytes());
                // On a hash collision the smaller label keeps the point so the
                // layout does not depend on insertion order.
                points
                    .entry(point)
                    .and_modify(|owner: &mut PartitionLabel| {
                        if *label < *owner {
                            *owner = label.clone();
                        }
                    })
                    .or_insert_with(|| label.clone());
            }
        }
        Self { points, labels }
    }

    /// Resolve the label owning `key`. `None` only if the ring has no labels.
    pub fn resolve(&self, key: &str) -> Option<&PartitionLabel> {
        let hash = xxh3_64(key.as_bytes());
        self.points
            .range(hash..)
            .next()
            .or_else(|| self.points.iter().next())
            .map(|(_, label)| label)
    }

    pub fn labels(&self) -> &[PartitionLabel] {
        &self.labels
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}
