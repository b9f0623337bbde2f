//! In-process coordination substrate. One `MemoryCoordinator` is the cluster's
//! shared state; each broker holds its own [`Session`]. Sessions own their
//! ephemeral nodes and can be expired to simulate a crashed process, which is
//! what the failover tests lean on.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::coordination::{MetaStore, WatchEvent};
use crate::error::{MilenaError, Result};

#[derive(Debug)]
struct Node {
    data: Vec<u8>,
    ephemeral_owner: Option<u64>,
}

#[derive(Debug, Default)]
struct Registry {
    nodes: BTreeMap<String, Node>,
    child_watchers: HashMap<String, Vec<UnboundedSender<WatchEvent>>>,
    data_watchers: HashMap<String, Vec<UnboundedSender<WatchEvent>>>,
}

impl Registry {
    fn children_of(&self, path: &str) -> Vec<String> {
        let prefix = format!("{}/", path.trim_end_matches('/'));
        self.nodes
            .range(prefix.clone()..)
            .take_while(|(p, _)| p.starts_with(&prefix))
            .filter(|(p, _)| !p[prefix.len()..].contains('/'))
            .map(|(p, _)| p[prefix.len()..].to_string())
            .collect()
    }

    fn notify_children(&mut self, parent: &str) {
        let children = self.children_of(parent);
        if let Some(watchers) = self.child_watchers.get_mut(parent) {
            watchers.retain(|tx| {
                tx.send(WatchEvent::ChildrenChanged {
                    path: parent.to_string(),
                    children: children.clone(),
                })
                .is_ok()
            });
        }
    }

    fn notify_data(&mut self, path: &str, event: WatchEvent) {
        if let Some(watchers) = self.data_watchers.get_mut(path) {
            watchers.retain(|tx| tx.send(event.clone()).is_ok());
        }
    }

    fn create(&mut self, path: &str, data: Vec<u8>, ephemeral_owner: Option<u64>) -> Result<()> {
        if self.nodes.contains_key(path) {
            return Err(MilenaError::NodeExists {
                path: path.to_string(),
            });
        }
        // Intermediate paths materialize as empty persistent nodes, the way a
        // zkclient wrapper creates parents on NoNode.
        if let Some(parent) = parent_of(path) {
            if !parent.is_empty() && !self.nodes.contains_key(&parent) {
                self.create(&parent, Vec::new(), None)?;
            }
        }
        self.nodes.insert(
            path.to_string(),
            Node {
                data,
                ephemeral_owner,
            },
        );
        self.notify_data(path, WatchEvent::DataChanged {
            path: path.to_string(),
        });
        if let Some(parent) = parent_of(path) {
            self.notify_children(&parent);
        }
        Ok(())
    }

    fn delete(&mut self, path: &str) -> Result<()> {
        if self.nodes.remove(path).is_none() {
            return Err(MilenaError::NoNode {
                path: path.to_string(),
            });
        }
        self.notify_data(path, WatchEvent::DataDeleted {
            path: path.to_string(),
        });
        if let Some(parent) = parent_of(path) {
            self.notify_children(&parent);
        }
        Ok(())
    }

    fn expire(&mut self, session_id: u64) {
        let owned: Vec<String> = self
            .nodes
            .iter()
            .filter(|(_, node)| node.ephemeral_owner == Some(session_id))
            .map(|(path, _)| path.clone())
            .collect();
        for path in owned {
            // Present a moment ago, cannot fail.
            let _ = self.delete(&path);
        }
    }
}

fn parent_of(path: &str) -> Option<String> {
    path.rfind('/').map(|idx| path[..idx].to_string())
}

/// The cluster-wide substrate state shared by every session in the process.
#[derive(Clone, Default)]
pub struct MemoryCoordinator {
    registry: Arc<Mutex<Registry>>,
    next_session: Arc<AtomicU64>,
}

impl MemoryCoordinator {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn connect(&self) -> Session {
        let id = self.next_session.fetch_add(1, Ordering::SeqCst);
        Session {
            registry: Arc::clone(&self.registry),
            next_session: Arc::clone(&self.next_session),
            session_id: Arc::new(AtomicU64::new(id)),
            session_watchers: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

/// One broker's connection. Cloning shares the session.
#[derive(Clone)]
pub struct Session {
    registry: Arc<Mutex<Registry>>,
    next_session: Arc<AtomicU64>,
    session_id: Arc<AtomicU64>,
    session_watchers: Arc<Mutex<Vec<UnboundedSender<WatchEvent>>>>,
}

impl Session {
    pub fn session_id(&self) -> u64 {
        self.session_id.load(Ordering::SeqCst)
    }

    /// Simulates session loss followed by automatic reconnection: every
    /// ephemeral owned by the old session is dropped (with the usual watch
    /// notifications), then a fresh session id is established and session
    /// watchers are told to re-register.
    pub fn expire(&self) {
        let old = self.session_id.load(Ordering::SeqCst);
        let new = self.next_session.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(old, new, "session expired");
        self.registry.lock().unwrap().expire(old);
        self.session_id.store(new, Ordering::SeqCst);
        self.session_watchers
            .lock()
            .unwrap()
            .retain(|tx| tx.send(WatchEvent::SessionEstablished).is_ok());
    }
}

impl MetaStore for Session {
    fn create_ephemeral(&self, path: &str, data: Vec<u8>) -> Result<()> {
        let owner = self.session_id.load(Ordering::SeqCst);
        self.registry.lock().unwrap().create(path, data, Some(owner))
    }

    fn create_persistent(&self, path: &str, data: Vec<u8>) -> Result<()> {
        self.registry.lock().unwrap().create(path, data, None)
    }

    fn read(&self, path: &str) -> Result<Vec<u8>> {
        self.registry
            .lock()
            .unwrap()
            .nodes
            .get(path)
            .map(|node| node.data.clone())
            .ok_or_else(|| MilenaError::NoNode {
                path: path.to_string(),
            })
    }

    fn list_children(&self, path: &str) -> Result<Vec<String>> {
        Ok(self.registry.lock().unwrap().children_of(path))
    }

    fn delete(&self, path: &str) -> Result<()> {
        self.registry.lock().unwrap().delete(path)
    }

    fn watch_children(&self, path: &str) -> UnboundedReceiver<WatchEvent> {
        let (tx, rx) = unbounded_channel();
        self.registry
            .lock()
            .unwrap()
            .child_watchers
            .entry(path.to_string())
            .or_default()
            .push(tx);
        rx
    }

    fn watch_data(&self, path: &str) -> UnboundedReceiver<WatchEvent> {
        let (tx, rx) = unbounded_channel();
        self.registry
            .lock()
            .unwrap()
            .data_watchers
            .entry(path.to_string())
            .or_default()
            .push(tx);
        rx
    }

    fn watch_session(&self) -> UnboundedReceiver<WatchEvent> {
        let (tx, rx) = unbounded_channel();
        self.session_watchers.lock().unwrap().push(tx);
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_is_atomic() {
        let coordinator = MemoryCoordinator::new();
        let a = coordinator.connect();
        let b = coordinator.connect();
        a.create_ephemeral("/controller", b"1".to_vec()).unwrap();
        let err = b.create_ephemeral("/controller", b"2".to_vec()).unwrap_err();
        assert!(matches!(err, MilenaError::NodeExists { .. }));
        assert_eq!(a.read("/controller").unwrap(), b"1".to_vec());
    }

    #[test]
    fn ephemerals_die_with_their_session() {
        let coordinator = MemoryCoordinator::new();
        let session = coordinator.connect();
        session
            .create_ephemeral("/brokers/ids/1", b"{}".to_vec())
            .unwrap();
        session
            .create_persistent("/brokers/topics/t", b"[]".to_vec())
            .unwrap();
        session.expire();
        assert!(matches!(
            session.read("/brokers/ids/1"),
            Err(MilenaError::NoNode { .. })
        ));
        assert_eq!(session.read("/brokers/topics/t").unwrap(), b"[]".to_vec());
    }

    #[test]
    fn child_watch_fires_on_create_and_delete() {
        let coordinator = MemoryCoordinator::new();
        let session = coordinator.connect();
        session.create_persistent("/brokers/ids", Vec::new()).unwrap();
        let mut rx = session.watch_children("/brokers/ids");
        session
            .create_ephemeral("/brokers/ids/3", b"{}".to_vec())
            .unwrap();
        match rx.try_recv().unwrap() {
            WatchEvent::ChildrenChanged { children, .. } => assert_eq!(children, vec!["3"]),
            other => panic!("unexpected event {:?}", other),
        }
        session.delete("/brokers/ids/3").unwrap();
        match rx.try_recv().unwrap() {
            WatchEvent::ChildrenChanged { children, .. } => assert!(children.is_empty()),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn data_watch_reports_deletion() {
        let coordinator = MemoryCoordinator::new();
        let session = coordinator.connect();
        let mut rx = session.watch_data("/controller");
        session.create_ephemeral("/controller", b"7".to_vec()).unwrap();
        assert!(matches!(
            rx.try_recv().unwrap(),
            WatchEvent::DataChanged { .. }
        ));
        session.expire();
        assert!(matches!(
            rx.try_recv().unwrap(),
            WatchEvent::DataDeleted { .. }
        ));
    }

    #[test]
    fn expiry_establishes_a_new_session() {
        let coordinator = MemoryCoordinator::new();
        let session = coordinator.connect();
        let mut rx = session.watch_session();
        let old = session.session_id();
        session.expire();
        assert_ne!(old, session.session_id());
        assert!(matches!(
            rx.try_recv().unwrap(),
            WatchEvent::SessionEstablished
        ));
    }
}
