use crate::assigner::ReplicaAssigner;
use crate::cluster::partition::PartitionReplicas;
use crate::cluster::ClusterClient;
use crate::error::Result;

/// Administrative entry point for topic creation. Stateless between calls:
/// each call resolves the live broker set, computes a placement, and persists
/// it as the topic's durable record. The persistent create is what triggers the
/// topic-change notification observed by the controller.
pub struct AdminClient {
    cluster: ClusterClient,
    assigner: ReplicaAssigner,
}

impl AdminClient {
    pub fn new(cluster: ClusterClient) -> Self {
        Self::with_assigner(cluster, ReplicaAssigner::new())
    }

    pub fn with_assigner(cluster: ClusterClient, assigner: ReplicaAssigner) -> Self {
        AdminClient { cluster, assigner }
    }

    #[tracing::instrument(skip(self))]
    pub fn create_topic(
        &mut self,
        name: &str,
        n_partitions: u32,
        replication_factor: u32,
    ) -> Result<()> {
        let broker_ids: Vec<_> = self.cluster.get_all_broker_ids()?.into_iter().collect();
        let assignment = self
            .assigner
            .assign(&broker_ids, n_partitions, replication_factor)?;
        self.cluster.set_partition_replicas(name, &assignment)?;
        tracing::info!(topic = name, n_partitions, replication_factor, "created topic");
        Ok(())
    }

    pub fn list_topics(&self) -> Result<Vec<String>> {
        self.cluster.list_topics()
    }

    pub fn partition_assignments(&self, topic: &str) -> Result<Vec<PartitionReplicas>> {
        self.cluster.get_partition_assignments(topic)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::cluster::broker::{Broker, BrokerId};
    use crate::cluster::ClusterPaths;
    use crate::coordination::memory::MemoryCoordinator;
    use crate::error::MilenaError;

    fn cluster_with_brokers(n: i32) -> ClusterClient {
        let coordinator = MemoryCoordinator::new();
        let session = coordinator.connect();
        let cluster = ClusterClient::new(Arc::new(session), ClusterPaths::default());
        for id in 0..n {
            cluster
                .register_broker(&Broker::new(BrokerId(id), "localhost", 9092 + id as u16))
                .unwrap();
        }
        cluster
    }

    #[test]
    fn created_topic_is_readable_back() {
        let cluster = cluster_with_brokers(3);
        let mut admin = AdminClient::with_assigner(cluster.clone(), ReplicaAssigner::with_seed(1));
        admin.create_topic("events", 2, 3).unwrap();

        let assignment = cluster.get_partition_assignments("events").unwrap();
        assert_eq!(assignment.len(), 2);
        for partition in &assignment {
            assert_eq!(partition.replica_broker_ids.len(), 3);
        }
        assert_eq!(admin.list_topics().unwrap(), vec!["events"]);
    }

    #[test]
    fn duplicate_topic_is_rejected() {
        let cluster = cluster_with_brokers(3);
        let mut admin = AdminClient::with_assigner(cluster, ReplicaAssigner::with_seed(1));
        admin.create_topic("events", 2, 2).unwrap();
        let err = admin.create_topic("events", 2, 2).unwrap_err();
        assert!(matches!(err, MilenaError::TopicExists { .. }));
    }

    #[test]
    fn create_topic_requires_enough_brokers() {
        let cluster = cluster_with_brokers(2);
        let mut admin = AdminClient::with_assigner(cluster, ReplicaAssigner::with_seed(1));
        let err = admin.create_topic("events", 4, 3).unwrap_err();
        assert!(matches!(err, MilenaError::InsufficientBrokers { .. }));
    }
}
