use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

use crate::cluster::broker::Broker;
use crate::cluster::{ClusterClient, ClusterEvent};
use crate::error::Result;

/// Keeps this broker's ephemeral record alive across substrate sessions.
///
/// Registration is deliberately separate from the controller: losing a session
/// costs the broker its record (and possibly the controller role), and getting
/// the record back must not depend on any election outcome.
pub struct SelfRegistration {
    cluster: ClusterClient,
    broker: Broker,
    events_rx: UnboundedReceiver<ClusterEvent>,
}

impl SelfRegistration {
    /// Subscribes to session lifecycle events immediately so an expiry between
    /// construction and [`run`](Self::run) is queued rather than lost.
    pub fn new(cluster: ClusterClient, broker: Broker) -> Self {
        let (events_tx, events_rx) = unbounded_channel();
        cluster.subscribe_session_events(events_tx);
        SelfRegistration {
            cluster,
            broker,
            events_rx,
        }
    }

    pub fn register(&self) -> Result<()> {
        self.cluster.register_broker(&self.broker)
    }

    /// Watches the session lifecycle and re-registers on every new session.
    pub async fn run(
        mut self,
        shutdown: (
            tokio::sync::broadcast::Sender<()>,
            tokio::sync::broadcast::Receiver<()>,
        ),
    ) -> Result<()> {
        let mut shutdown_rx = shutdown.1;
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,

                event = self.events_rx.recv() => match event {
                    Some(ClusterEvent::SessionEstablished) => {
                        match self.register() {
                            Ok(()) => {
                                tracing::info!(broker_id = %self.broker.id, "re-registered after new session")
                            }
                            Err(err) => {
                                tracing::error!(broker_id = %self.broker.id, %err, "re-registration failed")
                            }
                        }
                    }
                    Some(_) => {}
                    None => break,
                }
            }
        }
        // Cooperative exit: release the record instead of waiting for the
        // ephemeral to expire.
        self.cluster.deregister_broker(self.broker.id)
    }
}
