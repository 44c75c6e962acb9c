//! Cluster membership view.
//!
//! Eventually-consistent cache of live peer addresses: a bootstrap prefix
//! read followed by a long-lived watch. The watch task is the only writer;
//! readers copy out of the map and never block it. A dead peer stays
//! visible until its lease expires and the DELETE event arrives.

use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use metrics::gauge;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use pombo_common::PomboError;

use super::SERVER_KEY_PREFIX;
use crate::store::{CoordinationStore, WatchEventType};

const EVENT_QUEUE_SIZE: usize = 64;

/// A live peer discovered through the coordination store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Member {
    pub address: String,
    pub discovered_at: i64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemberChangeType {
    MemberJoin,
    MemberLeave,
}

impl std::fmt::Display for MemberChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MemberChangeType::MemberJoin => write!(f, "MEMBER_JOIN"),
            MemberChangeType::MemberLeave => write!(f, "MEMBER_LEAVE"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct MemberChangeEvent {
    pub change_type: MemberChangeType,
    pub address: String,
    pub timestamp: i64,
}

/// Maintains the membership cache and publishes join/leave events.
pub struct ServerMemberManager {
    store: Arc<dyn CoordinationStore>,
    local_address: String,
    members: DashMap<String, Member>,
    event_tx: broadcast::Sender<MemberChangeEvent>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ServerMemberManager {
    pub fn new(store: Arc<dyn CoordinationStore>, local_address: String) -> Arc<Self> {
        let (event_tx, _) = broadcast::channel(EVENT_QUEUE_SIZE);
        Arc::new(Self {
            store,
            local_address,
            members: DashMap::new(),
            event_tx,
            task: Mutex::new(None),
        })
    }

    /// Initial prefix read. Returns the bootstrap address list; fatal at
    /// startup if the store cannot be read.
    pub async fn bootstrap(&self) -> Result<Vec<String>, PomboError> {
        let entries = self.store.get_prefix(SERVER_KEY_PREFIX).await?;

        self.members.clear();
        let now = chrono::Utc::now().timestamp_millis();
        let mut addresses = Vec::with_capacity(entries.len());
        for (key, address) in entries {
            addresses.push(address.clone());
            self.members.insert(
                key,
                Member {
                    address,
                    discovered_at: now,
                },
            );
        }

        gauge!("pombo_cluster_members").set(self.members.len() as f64);
        info!(members = addresses.len(), "membership bootstrapped");
        Ok(addresses)
    }

    /// Start the continuous watch. Runs until [`stop`](Self::stop).
    pub async fn start(self: &Arc<Self>) -> Result<(), PomboError> {
        let mut events = self.store.watch(SERVER_KEY_PREFIX).await?;
        let manager = self.clone();

        let handle = tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event.event_type {
                    WatchEventType::Put => manager.upsert(event.key, event.value),
                    WatchEventType::Delete => manager.remove(&event.key),
                }
            }
            // Only expected at process shutdown; mid-life this means the
            // membership view is frozen until the store reconnects
            warn!("membership watch stream ended");
        });

        *self.task.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
        Ok(())
    }

    pub fn stop(&self) {
        if let Some(handle) = self.task.lock().unwrap_or_else(|e| e.into_inner()).take() {
            handle.abort();
        }
    }

    fn upsert(&self, key: String, address: String) {
        let member = Member {
            address: address.clone(),
            discovered_at: chrono::Utc::now().timestamp_millis(),
        };
        let previous = self.members.insert(key, member);
        gauge!("pombo_cluster_members").set(self.members.len() as f64);

        if previous.is_none() {
            info!(address = %address, "cluster member joined");
            let _ = self.event_tx.send(MemberChangeEvent {
                change_type: MemberChangeType::MemberJoin,
                address,
                timestamp: chrono::Utc::now().timestamp_millis(),
            });
        }
    }

    fn remove(&self, key: &str) {
        if let Some((_, member)) = self.members.remove(key) {
            gauge!("pombo_cluster_members").set(self.members.len() as f64);
            info!(address = %member.address, "cluster member left");
            let _ = self.event_tx.send(MemberChangeEvent {
                change_type: MemberChangeType::MemberLeave,
                address: member.address,
                timestamp: chrono::Utc::now().timestamp_millis(),
            });
        }
    }

    /// Copy of all known peer addresses, sorted for deterministic fan-out.
    pub fn all_addresses(&self) -> Vec<String> {
        let mut addresses: Vec<String> = self
            .members
            .iter()
            .map(|e| e.value().address.clone())
            .collect();
        addresses.sort();
        addresses.dedup();
        addresses
    }

    pub fn contains_address(&self, address: &str) -> bool {
        self.members.iter().any(|e| e.value().address == address)
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn local_address(&self) -> &str {
        &self.local_address
    }

    pub fn is_self(&self, address: &str) -> bool {
        address == self.local_address
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MemberChangeEvent> {
        self.event_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::store::{CoordinationStore, MemoryStore};
    use crate::test_support::wait_until;

    async fn seeded_store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store
            .put(
                &format!("{}10.0.0.1:9190", SERVER_KEY_PREFIX),
                "10.0.0.1:9190",
                None,
            )
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_bootstrap_returns_initial_members() {
        let store = seeded_store().await;
        let manager = ServerMemberManager::new(store, "10.0.0.1:9190".to_string());

        let addresses = manager.bootstrap().await.unwrap();
        assert_eq!(addresses, vec!["10.0.0.1:9190".to_string()]);
        assert!(manager.contains_address("10.0.0.1:9190"));
        assert!(manager.is_self("10.0.0.1:9190"));
    }

    #[tokio::test]
    async fn test_watch_converges_on_join_and_leave() {
        let store = seeded_store().await;
        let manager = ServerMemberManager::new(store.clone(), "10.0.0.1:9190".to_string());
        manager.bootstrap().await.unwrap();
        manager.start().await.unwrap();
        let mut events = manager.subscribe();

        // A peer joins under a lease...
        let lease = store.grant(5).await.unwrap();
        store
            .put(
                &format!("{}10.0.0.2:9190", SERVER_KEY_PREFIX),
                "10.0.0.2:9190",
                Some(lease),
            )
            .await
            .unwrap();

        assert!(
            wait_until(
                || manager.contains_address("10.0.0.2:9190"),
                Duration::from_secs(1)
            )
            .await
        );
        let join = events.recv().await.unwrap();
        assert_eq!(join.change_type, MemberChangeType::MemberJoin);
        assert_eq!(join.address, "10.0.0.2:9190");

        // ...then its lease expires; the delete event must converge the
        // cache so later broadcasts exclude it
        store.expire_lease(lease);

        assert!(
            wait_until(
                || !manager.contains_address("10.0.0.2:9190"),
                Duration::from_secs(1)
            )
            .await
        );
        let leave = events.recv().await.unwrap();
        assert_eq!(leave.change_type, MemberChangeType::MemberLeave);
        assert_eq!(
            manager.all_addresses(),
            vec!["10.0.0.1:9190".to_string()]
        );

        manager.stop();
    }

    #[tokio::test]
    async fn test_renewal_put_does_not_duplicate_member() {
        let store = seeded_store().await;
        let manager = ServerMemberManager::new(store.clone(), "10.0.0.1:9190".to_string());
        manager.bootstrap().await.unwrap();
        manager.start().await.unwrap();

        // Re-put of an existing key (e.g. after re-registration)
        store
            .put(
                &format!("{}10.0.0.1:9190", SERVER_KEY_PREFIX),
                "10.0.0.1:9190",
                None,
            )
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(manager.member_count(), 1);
        manager.stop();
    }
}
