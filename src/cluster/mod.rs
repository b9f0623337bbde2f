use std::collections::BTreeSet;
use std::sync::Arc;

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};

use crate::cluster::broker::{Broker, BrokerId};
use crate::cluster::partition::{PartitionReplicas, TopicAssignments};
use crate::coordination::{MetaStore, WatchEvent};
use crate::error::{MilenaError, Result};

pub mod broker;
pub mod partition;

/// Namespace layout inside the substrate. Carried as configuration rather than
/// module constants so several independent clusters can share one process.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterPaths {
    pub brokers: String,
    pub topics: String,
    pub controller: String,
}

impl Default for ClusterPaths {
    fn default() -> Self {
        Self {
            brokers: "/brokers/ids".to_string(),
            topics: "/brokers/topics".to_string(),
            controller: "/controller".to_string(),
        }
    }
}

/// Substrate notification translated into cluster vocabulary. Payload-free on
/// purpose: consumers re-read the substrate rather than trusting the event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterEvent {
    BrokerMembershipChanged,
    TopicsChanged,
    ControllerChanged,
    ControllerDeleted,
    SessionEstablished,
}

/// Typed view of the substrate's path layout: broker records, topic records,
/// and the single controller record.
#[derive(Clone)]
pub struct ClusterClient {
    store: Arc<dyn MetaStore>,
    paths: ClusterPaths,
}

impl ClusterClient {
    pub fn new(store: Arc<dyn MetaStore>, paths: ClusterPaths) -> Self {
        ClusterClient { store, paths }
    }

    fn broker_path(&self, id: BrokerId) -> String {
        format!("{}/{}", self.paths.brokers, id)
    }

    fn topic_path(&self, name: &str) -> String {
        format!("{}/{}", self.paths.topics, name)
    }

    pub fn register_broker(&self, broker: &Broker) -> Result<()> {
        let payload = serde_json::to_vec(broker)?;
        self.store
            .create_ephemeral(&self.broker_path(broker.id), payload)?;
        tracing::info!(%broker.id, host = %broker.host, port = broker.port, "registered broker");
        Ok(())
    }

    pub fn deregister_broker(&self, id: BrokerId) -> Result<()> {
        match self.store.delete(&self.broker_path(id)) {
            Ok(()) | Err(MilenaError::NoNode { .. }) => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Full read of the live broker set. A broker record that vanishes between
    /// listing and reading was a racing deregistration and is skipped; the next
    /// membership notification re-derives the truth.
    pub fn get_all_brokers(&self) -> Result<BTreeSet<Broker>> {
        let mut brokers = BTreeSet::new();
        for child in self.store.list_children(&self.paths.brokers)? {
            let path = format!("{}/{}", self.paths.brokers, child);
            match self.store.read(&path) {
                Ok(data) => {
                    brokers.insert(serde_json::from_slice(&data)?);
                }
                Err(MilenaError::NoNode { .. }) => continue,
                Err(err) => return Err(err),
            }
        }
        Ok(brokers)
    }

    pub fn get_all_broker_ids(&self) -> Result<BTreeSet<BrokerId>> {
        Ok(self
            .get_all_brokers()?
            .into_iter()
            .map(|broker| broker.id)
            .collect())
    }

    pub fn get_broker(&self, id: BrokerId) -> Result<Broker> {
        let data = self.store.read(&self.broker_path(id))?;
        Ok(serde_json::from_slice(&data)?)
    }

    /// Attempts the atomic ephemeral create of the controller record. Losing
    /// the race fails with [`MilenaError::ControllerExists`] carrying the
    /// incumbent's id read back from the record.
    pub fn create_controller(&self, id: BrokerId) -> Result<()> {
        loop {
            match self
                .store
                .create_ephemeral(&self.paths.controller, id.to_string().into_bytes())
            {
                Ok(()) => return Ok(()),
                Err(MilenaError::NodeExists { .. }) => {
                    match self.controller_id()? {
                        Some(controller_id) => {
                            return Err(MilenaError::ControllerExists { controller_id })
                        }
                        // The incumbent vanished between our create and read;
                        // race again.
                        None => continue,
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }

    pub fn controller_id(&self) -> Result<Option<BrokerId>> {
        match self.store.read(&self.paths.controller) {
            Ok(data) => {
                let raw = String::from_utf8(data).map_err(|err| MilenaError::Internal {
                    error_msg: err.to_string(),
                })?;
                let id = raw.parse::<i32>().map_err(|err| MilenaError::Internal {
                    error_msg: format!("bad controller record {:?}: {}", raw, err),
                })?;
                Ok(Some(BrokerId(id)))
            }
            Err(MilenaError::NoNode { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    pub fn delete_controller(&self) -> Result<()> {
        match self.store.delete(&self.paths.controller) {
            Ok(()) | Err(MilenaError::NoNode { .. }) => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Durably persists a topic's replica assignment. An occupied topic path
    /// means the topic already exists and is never overwritten.
    pub fn set_partition_replicas(
        &self,
        topic: &str,
        assignment: &[PartitionReplicas],
    ) -> Result<()> {
        let payload = serde_json::to_vec(assignment)?;
        match self.store.create_persistent(&self.topic_path(topic), payload) {
            Ok(()) => Ok(()),
            Err(MilenaError::NodeExists { .. }) => Err(MilenaError::TopicExists {
                topic: topic.to_string(),
            }),
            Err(err) => Err(err),
        }
    }

    pub fn get_partition_assignments(&self, topic: &str) -> Result<Vec<PartitionReplicas>> {
        let data = self.store.read(&self.topic_path(topic))?;
        Ok(serde_json::from_slice(&data)?)
    }

    pub fn list_topics(&self) -> Result<Vec<String>> {
        self.store.list_children(&self.paths.topics)
    }

    pub fn get_all_topics(&self) -> Result<TopicAssignments> {
        let mut topics = TopicAssignments::new();
        for name in self.store.list_children(&self.paths.topics)? {
            match self.get_partition_assignments(&name) {
                Ok(assignment) => {
                    topics.insert(name, assignment);
                }
                Err(MilenaError::NoNode { .. }) => continue,
                Err(err) => return Err(err),
            }
        }
        Ok(topics)
    }

    pub fn subscribe_broker_changes(&self, tx: UnboundedSender<ClusterEvent>) {
        forward(self.store.watch_children(&self.paths.brokers), tx, |ev| {
            matches!(ev, WatchEvent::ChildrenChanged { .. })
                .then_some(ClusterEvent::BrokerMembershipChanged)
        });
    }

    pub fn subscribe_topic_changes(&self, tx: UnboundedSender<ClusterEvent>) {
        forward(self.store.watch_children(&self.paths.topics), tx, |ev| {
            matches!(ev, WatchEvent::ChildrenChanged { .. }).then_some(ClusterEvent::TopicsChanged)
        });
    }

    pub fn subscribe_controller_changes(&self, tx: UnboundedSender<ClusterEvent>) {
        forward(self.store.watch_data(&self.paths.controller), tx, |ev| {
            match ev {
                WatchEvent::DataChanged { .. } => Some(ClusterEvent::ControllerChanged),
                WatchEvent::DataDeleted { .. } => Some(ClusterEvent::ControllerDeleted),
                _ => None,
            }
        });
    }

    pub fn subscribe_session_events(&self, tx: UnboundedSender<ClusterEvent>) {
        forward(self.store.watch_session(), tx, |ev| {
            matches!(ev, WatchEvent::SessionEstablished)
                .then_some(ClusterEvent::SessionEstablished)
        });
    }
}

/// Drains one watch subscription into the consumer's event channel. The task
/// ends when either side hangs up; the substrate subscription itself stays
/// registered for any other subscriber.
fn forward(
    mut rx: UnboundedReceiver<WatchEvent>,
    tx: UnboundedSender<ClusterEvent>,
    map: impl Fn(WatchEvent) -> Option<ClusterEvent> + Send + 'static,
) {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if let Some(event) = map(event) {
                if tx.send(event).is_err() {
                    break;
                }
            }
        }
    });
}
