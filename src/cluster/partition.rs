use std::collections::HashMap;

use derive_more::Display;

use crate::cluster::broker::BrokerId;

#[derive(Copy, Clone, Serialize, Deserialize, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
pub struct PartitionId(pub i32);

/// The replica placement for a single partition. The first broker id is the
/// preferred leader. Persisted durably as part of the topic record, so it is not
/// tied to any process session.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct PartitionReplicas {
    #[serde(rename = "partitionId")]
    pub partition_id: PartitionId,
    #[serde(rename = "replicaBrokerIds")]
    pub replica_broker_ids: Vec<BrokerId>,
}

impl PartitionReplicas {
    pub fn new(partition_id: PartitionId, replica_broker_ids: Vec<BrokerId>) -> Self {
        PartitionReplicas {
            partition_id,
            replica_broker_ids,
        }
    }

    pub fn preferred_leader(&self) -> Option<BrokerId> {
        self.replica_broker_ids.first().copied()
    }
}

/// Topic name to per-partition replica placement, partition ids dense from 0.
pub type TopicAssignments = HashMap<String, Vec<PartitionReplicas>>;
