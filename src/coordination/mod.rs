//! Boundary to the coordination substrate. Milena only assumes a small
//! ZooKeeper-like contract: atomic create of ephemeral and persistent nodes,
//! point reads, child listing, and at-least-once (possibly coalesced) change
//! notifications. Everything above this module is substrate-agnostic.

use tokio::sync::mpsc::UnboundedReceiver;

use crate::error::Result;

pub mod memory;

/// A change notification delivered on a watch subscription. Payloads are hints
/// only; consumers must re-read the substrate for truth.
#[derive(Debug, Clone)]
pub enum WatchEvent {
    ChildrenChanged { path: String, children: Vec<String> },
    DataChanged { path: String },
    DataDeleted { path: String },
    /// The connection's session was reset and a new one established. Ephemeral
    /// records owned by the old session are gone and must be re-created.
    SessionEstablished,
}

/// One connection session to the coordination substrate.
///
/// All operations are blocking from the caller's perspective. Watch
/// subscriptions outlive individual notifications: a dropped or lagging
/// receiver never cancels delivery to other subscribers.
pub trait MetaStore: Send + Sync {
    /// Atomically creates a node whose lifetime is bound to this session.
    /// Exactly one concurrent caller succeeds for a given path.
    fn create_ephemeral(&self, path: &str, data: Vec<u8>) -> Result<()>;

    /// Creates a durable node that survives session loss.
    fn create_persistent(&self, path: &str, data: Vec<u8>) -> Result<()>;

    fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// Direct children of `path`. An absent path reads as no children.
    fn list_children(&self, path: &str) -> Result<Vec<String>>;

    fn delete(&self, path: &str) -> Result<()>;

    /// Notifies on every change to the child set of `path`.
    fn watch_children(&self, path: &str) -> UnboundedReceiver<WatchEvent>;

    /// Notifies on data change and, separately, deletion of `path`.
    fn watch_data(&self, path: &str) -> UnboundedReceiver<WatchEvent>;

    /// Notifies when a new session replaces an expired one.
    fn watch_session(&self) -> UnboundedReceiver<WatchEvent>;
}
