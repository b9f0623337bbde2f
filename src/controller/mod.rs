//! The cluster controller: election state machine, membership reconciliation,
//! and the controller-held topic metadata cache.
//!
//! Every substrate notification funnels through one mpsc channel drained by
//! [`Controller::run`], and all mutable state sits behind a single mutex, so
//! reconciliations never interleave partial writes even though the substrate
//! delivers different subscription types concurrently.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::cluster::broker::{Broker, BrokerId};
use crate::cluster::partition::TopicAssignments;
use crate::cluster::{ClusterClient, ClusterEvent};
use crate::error::{MilenaError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Role {
    #[default]
    Uninitialized,
    Candidate,
    Controller,
    Follower,
}

/// Brokers that joined or left the cluster since the previous reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipDiff {
    pub joined: Vec<Broker>,
    pub left: Vec<Broker>,
}

#[derive(Debug, Default)]
struct ControllerState {
    role: Role,
    current_leader: Option<BrokerId>,
    live_brokers: BTreeSet<Broker>,
    topics: TopicAssignments,
    /// Membership and topic watches are registered once, on the first win.
    subscribed: bool,
}

pub struct Controller {
    cluster: ClusterClient,
    broker_id: BrokerId,
    state: Mutex<ControllerState>,
    events_tx: UnboundedSender<ClusterEvent>,
}

impl Controller {
    pub fn new(
        cluster: ClusterClient,
        broker_id: BrokerId,
    ) -> (Arc<Self>, UnboundedReceiver<ClusterEvent>) {
        let (events_tx, events_rx) = unbounded_channel();
        let controller = Arc::new(Controller {
            cluster,
            broker_id,
            state: Mutex::new(ControllerState::default()),
            events_tx,
        });
        (controller, events_rx)
    }

    /// Joins the election. Subscribes to controller-record changes first so a
    /// controller loss between electing and watching cannot go unseen.
    pub fn startup(&self) -> Result<()> {
        tracing::info!(broker_id = %self.broker_id, "starting controller election");
        self.cluster
            .subscribe_controller_changes(self.events_tx.clone());
        self.elect()
    }

    /// One round of the election state machine. Winning the atomic create makes
    /// this broker the controller; losing records the incumbent and waits for
    /// the next controller-record notification to race again.
    pub fn elect(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.role = Role::Candidate;
        match self.cluster.create_controller(self.broker_id) {
            Ok(()) => {
                state.role = Role::Controller;
                state.current_leader = Some(self.broker_id);
                tracing::info!(broker_id = %self.broker_id, "won controller election");
                self.on_become_controller(&mut state)
            }
            Err(MilenaError::ControllerExists { controller_id }) => {
                state.role = Role::Follower;
                state.current_leader = Some(controller_id);
                tracing::info!(broker_id = %self.broker_id, %controller_id, "following existing controller");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn on_become_controller(&self, state: &mut ControllerState) -> Result<()> {
        if !state.subscribed {
            self.cluster.subscribe_broker_changes(self.events_tx.clone());
            self.cluster.subscribe_topic_changes(self.events_tx.clone());
            state.subscribed = true;
        }
        // Snapshot after subscribing; a change inside the window shows up as a
        // redundant notification instead of a lost one.
        state.live_brokers = self.cluster.get_all_brokers()?;
        state.topics = self.cluster.get_all_topics()?;
        tracing::info!(
            brokers = state.live_brokers.len(),
            topics = state.topics.len(),
            "controller state initialized"
        );
        Ok(())
    }

    /// Drains notifications until shutdown. A failing handler is logged and the
    /// loop keeps going; the next notification retries from a fresh read.
    pub async fn run(
        self: Arc<Self>,
        mut events_rx: UnboundedReceiver<ClusterEvent>,
        shutdown: (
            tokio::sync::broadcast::Sender<()>,
            tokio::sync::broadcast::Receiver<()>,
        ),
    ) -> Result<()> {
        let mut shutdown_rx = shutdown.1;
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,

                event = events_rx.recv() => match event {
                    Some(event) => {
                        if let Err(err) = self.handle_event(event.clone()) {
                            tracing::error!(?event, %err, "error handling cluster event");
                        }
                    }
                    None => break,
                }
            }
        }
        self.shutdown()
    }

    fn handle_event(&self, event: ClusterEvent) -> Result<()> {
        match event {
            ClusterEvent::BrokerMembershipChanged => {
                self.reconcile_membership()?;
            }
            ClusterEvent::TopicsChanged => {
                self.refresh_topics()?;
            }
            ClusterEvent::ControllerChanged | ClusterEvent::ControllerDeleted => {
                self.handle_controller_change()?;
            }
            ClusterEvent::SessionEstablished => {
                // Re-registration is the registry's concern, not ours.
            }
        }
        Ok(())
    }

    /// Re-derives the live broker set from a full read and replaces the cache
    /// wholesale. The diff is reported for observability and returned so tests
    /// can assert reconciliation idempotence.
    #[tracing::instrument(skip(self), fields(broker_id = %self.broker_id))]
    pub(crate) fn reconcile_membership(&self) -> Result<MembershipDiff> {
        let mut state = self.state.lock().unwrap();
        if state.role != Role::Controller {
            return Ok(MembershipDiff::default());
        }

        let fresh = self.cluster.get_all_brokers()?;
        let diff = MembershipDiff {
            joined: fresh.difference(&state.live_brokers).cloned().collect(),
            left: state.live_brokers.difference(&fresh).cloned().collect(),
        };
        for broker in &diff.joined {
            tracing::info!(%broker.id, host = %broker.host, port = broker.port, "broker joined");
        }
        for broker in &diff.left {
            tracing::info!(%broker.id, "broker left");
        }
        state.live_brokers = fresh;
        Ok(diff)
    }

    /// Full replacement of the topic cache from a fresh read, mirroring the
    /// membership semantics so removed topics disappear from the cached view.
    #[tracing::instrument(skip(self), fields(broker_id = %self.broker_id))]
    pub(crate) fn refresh_topics(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.role != Role::Controller {
            return Ok(());
        }
        state.topics = self.cluster.get_all_topics()?;
        tracing::debug!(topics = state.topics.len(), "topic metadata refreshed");
        Ok(())
    }

    fn handle_controller_change(&self) -> Result<()> {
        {
            let state = self.state.lock().unwrap();
            // Our own winning create echoes back as a data change; not a loss.
            if state.role == Role::Controller
                && self.cluster.controller_id()? == Some(self.broker_id)
            {
                return Ok(());
            }
        }
        tracing::info!(broker_id = %self.broker_id, "controller record changed, re-electing");
        self.elect()
    }

    /// Cooperative shutdown: release the controller record if we hold it.
    /// Abrupt death is equivalent, just slower -- the ephemeral expires.
    pub fn shutdown(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.role == Role::Controller {
            self.cluster.delete_controller()?;
        }
        state.role = Role::Uninitialized;
        state.current_leader = None;
        tracing::info!(broker_id = %self.broker_id, "controller shut down");
        Ok(())
    }

    pub fn broker_id(&self) -> BrokerId {
        self.broker_id
    }

    pub fn role(&self) -> Role {
        self.state.lock().unwrap().role
    }

    pub fn is_controller(&self) -> bool {
        self.role() == Role::Controller
    }

    /// The broker id this node currently recognizes as controller, `None`
    /// before any election result has been observed.
    pub fn current_leader_id(&self) -> Option<BrokerId> {
        self.state.lock().unwrap().current_leader
    }

    /// Snapshot of the cached live broker set. Meaningful on the controller;
    /// empty or stale on a follower.
    pub fn live_brokers(&self) -> BTreeSet<Broker> {
        self.state.lock().unwrap().live_brokers.clone()
    }

    /// Snapshot of the cached topic metadata. Meaningful on the controller;
    /// empty or stale on a follower.
    pub fn topics(&self) -> TopicAssignments {
        self.state.lock().unwrap().topics.clone()
    }
}
