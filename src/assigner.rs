use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::cluster::broker::BrokerId;
use crate::cluster::partition::{PartitionId, PartitionReplicas};
use crate::error::{MilenaError, Result};

/// Computes replica placement for new topics.
///
/// Each partition starts assigning from a different position in a shuffled
/// broker list, which spreads partitions round-robin while keeping the replicas
/// of one partition on distinct brokers. Every time a full pass over the broker
/// list begins, the list is rotated by a random offset so the wrap-around
/// pattern does not repeat identically cycle after cycle.
///
/// Randomness is injected so tests can fix a seed and assert exact placements.
pub struct ReplicaAssigner {
    rng: StdRng,
}

impl ReplicaAssigner {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    pub fn with_rng(rng: StdRng) -> Self {
        ReplicaAssigner { rng }
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    /// Assigns `replication_factor` distinct brokers to each of `n_partitions`
    /// partitions. The result is ordered by partition id and reproducible for a
    /// fixed seed and broker list.
    pub fn assign(
        &mut self,
        broker_ids: &[BrokerId],
        n_partitions: u32,
        replication_factor: u32,
    ) -> Result<Vec<PartitionReplicas>> {
        if broker_ids.len() < replication_factor as usize
            || (broker_ids.is_empty() && n_partitions > 0)
        {
            return Err(MilenaError::InsufficientBrokers {
                brokers: broker_ids.len(),
                replication_factor,
            });
        }
        // Partition ids are i32, so the count has to fit one.
        let n_partitions = i32::try_from(n_partitions).map_err(|_| MilenaError::Internal {
            error_msg: format!("partition count {} exceeds i32::MAX", n_partitions),
        })?;

        let mut brokers = broker_ids.to_vec();
        brokers.shuffle(&mut self.rng);

        let mut assignments = Vec::with_capacity(n_partitions as usize);
        for partition_id in 0..n_partitions {
            let replicas = replica_set(partition_id, replication_factor, &brokers);
            assignments.push(PartitionReplicas::new(PartitionId(partition_id), replicas));
            self.maybe_rotate(partition_id, &mut brokers);
        }
        Ok(assignments)
    }

    fn maybe_rotate(&mut self, partition_id: i32, brokers: &mut [BrokerId]) {
        if partition_id as usize % brokers.len() == 0 {
            let offset = self.rng.gen_range(0..brokers.len());
            brokers.rotate_left(offset);
        }
    }
}

impl Default for ReplicaAssigner {
    fn default() -> Self {
        Self::new()
    }
}

fn replica_set(partition_id: i32, replication_factor: u32, brokers: &[BrokerId]) -> Vec<BrokerId> {
    let start = partition_id as usize % brokers.len();
    (0..replication_factor as usize)
        .map(|i| brokers[(start + i) % brokers.len()])
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};

    use super::*;

    fn ids(ids: &[i32]) -> Vec<BrokerId> {
        ids.iter().copied().map(BrokerId).collect()
    }

    #[test]
    fn every_partition_gets_distinct_replicas() {
        let mut assigner = ReplicaAssigner::with_seed(42);
        let brokers = ids(&[0, 1, 2, 3, 4]);
        let assignments = assigner.assign(&brokers, 12, 3).unwrap();

        assert_eq!(assignments.len(), 12);
        for (i, partition) in assignments.iter().enumerate() {
            assert_eq!(partition.partition_id, PartitionId(i as i32));
            assert_eq!(partition.replica_broker_ids.len(), 3);
            let distinct: HashSet<_> = partition.replica_broker_ids.iter().collect();
            assert_eq!(distinct.len(), 3);
            for id in &partition.replica_broker_ids {
                assert!(brokers.contains(id));
            }
        }
    }

    #[test]
    fn fails_when_replication_factor_exceeds_brokers() {
        let mut assigner = ReplicaAssigner::with_seed(0);
        let err = assigner.assign(&ids(&[0, 1]), 4, 3).unwrap_err();
        match err {
            MilenaError::InsufficientBrokers {
                brokers,
                replication_factor,
            } => {
                assert_eq!(brokers, 2);
                assert_eq!(replication_factor, 3);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn rejects_partition_counts_beyond_i32() {
        let mut assigner = ReplicaAssigner::with_seed(0);
        let err = assigner
            .assign(&ids(&[0, 1, 2]), i32::MAX as u32 + 1, 2)
            .unwrap_err();
        assert!(matches!(err, MilenaError::Internal { .. }));
    }

    #[test]
    fn zero_partitions_yields_empty_assignment() {
        let mut assigner = ReplicaAssigner::with_seed(0);
        assert!(assigner.assign(&ids(&[0, 1, 2]), 0, 2).unwrap().is_empty());
    }

    #[test]
    fn fixed_seed_reproduces_the_same_placement() {
        let brokers = ids(&[1, 2, 3, 4]);
        let first = ReplicaAssigner::with_seed(7).assign(&brokers, 8, 2).unwrap();
        let second = ReplicaAssigner::with_seed(7).assign(&brokers, 8, 2).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn load_is_spread_evenly_over_many_partitions() {
        let mut assigner = ReplicaAssigner::with_seed(13);
        let brokers = ids(&[0, 1, 2, 3, 4]);
        let assignments = assigner.assign(&brokers, 1000, 3).unwrap();

        let mut counts: HashMap<BrokerId, usize> = HashMap::new();
        let mut leader_counts: HashMap<BrokerId, usize> = HashMap::new();
        for partition in &assignments {
            for id in &partition.replica_broker_ids {
                *counts.entry(*id).or_default() += 1;
            }
            *leader_counts
                .entry(partition.preferred_leader().unwrap())
                .or_default() += 1;
        }

        // 1000 partitions * 3 replicas over 5 brokers: 600 appearances each on
        // average, 200 leaderships. Rotation noise stays well inside 10%.
        for id in &brokers {
            let count = counts.get(id).copied().unwrap_or_default() as i64;
            assert!((count - 600).abs() <= 60, "broker {} count {}", id, count);
            let leads = leader_counts.get(id).copied().unwrap_or_default() as i64;
            assert!((leads - 200).abs() <= 40, "broker {} leads {}", id, leads);
        }
    }
}
