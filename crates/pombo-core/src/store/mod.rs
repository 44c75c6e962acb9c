//! Coordination store abstraction.
//!
//! The cluster machinery (lease registry, membership manager, account
//! service) talks to its coordination store through this trait. The etcd
//! backend is the production implementation; the in-memory backend drives
//! standalone tests.

pub mod etcd;
pub mod memory;

use std::time::Duration;

use pombo_common::PomboError;
use tokio::sync::mpsc;

pub use etcd::EtcdStore;
pub use memory::MemoryStore;

/// Lease identifier handed out by [`CoordinationStore::grant`].
pub type LeaseId = i64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WatchEventType {
    Put,
    Delete,
}

/// A single change observed on a watched prefix.
#[derive(Clone, Debug)]
pub struct WatchEvent {
    pub event_type: WatchEventType,
    pub key: String,
    pub value: String,
}

#[async_trait::async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Write `key = value`, optionally bound to a lease. Keys bound to a
    /// lease are deleted by the store when the lease expires or is revoked.
    async fn put(&self, key: &str, value: &str, lease: Option<LeaseId>)
    -> Result<(), PomboError>;

    /// Read a single key.
    async fn get(&self, key: &str) -> Result<Option<String>, PomboError>;

    /// Read every `(key, value)` pair under a prefix.
    async fn get_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>, PomboError>;

    /// Atomically write `key = value` only if the key does not exist yet.
    /// Returns `true` when the write happened, `false` when the key was
    /// already present.
    async fn create_if_absent(&self, key: &str, value: &str) -> Result<bool, PomboError>;

    /// Watch a prefix for changes. The returned channel yields PUT/DELETE
    /// events until the watch is torn down (receiver dropped) or the store
    /// connection is lost (channel closes).
    async fn watch(&self, prefix: &str) -> Result<mpsc::Receiver<WatchEvent>, PomboError>;

    /// Grant a lease with the given time-to-live in seconds.
    async fn grant(&self, ttl: i64) -> Result<LeaseId, PomboError>;

    /// Start renewing a lease. Each received unit is one acknowledged
    /// renewal; the channel closing means the store considers the lease
    /// gone and every key bound to it has been deleted.
    async fn keep_alive(
        &self,
        lease: LeaseId,
        interval: Duration,
    ) -> Result<mpsc::Receiver<()>, PomboError>;

    /// Explicitly revoke a lease, deleting its bound keys.
    async fn revoke(&self, lease: LeaseId) -> Result<(), PomboError>;
}
