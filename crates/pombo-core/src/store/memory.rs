//! In-memory coordination store.
//!
//! Single-process stand-in for etcd with the same observable semantics:
//! lease-bound keys disappear when their lease is revoked or expired, and
//! watchers see the resulting DELETE events. Used by standalone tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use pombo_common::PomboError;
use tokio::sync::{broadcast, mpsc};

use super::{CoordinationStore, LeaseId, WatchEvent, WatchEventType};

const WATCH_BUFFER: usize = 64;

#[derive(Clone)]
struct Entry {
    value: String,
    lease: Option<LeaseId>,
}

pub struct MemoryStore {
    data: Mutex<HashMap<String, Entry>>,
    leases: Arc<Mutex<HashMap<LeaseId, ()>>>,
    lease_seq: AtomicI64,
    watch_tx: broadcast::Sender<WatchEvent>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (watch_tx, _) = broadcast::channel(WATCH_BUFFER);
        Self {
            data: Mutex::new(HashMap::new()),
            leases: Arc::new(Mutex::new(HashMap::new())),
            lease_seq: AtomicI64::new(1),
            watch_tx,
        }
    }

    fn lock_data(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        self.data.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lease_exists(&self, lease: LeaseId) -> bool {
        self.leases
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(&lease)
    }

    fn emit(&self, event: WatchEvent) {
        // No receivers is fine; watches are optional
        let _ = self.watch_tx.send(event);
    }

    fn drop_lease(&self, lease: LeaseId) {
        self.leases
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&lease);

        let expired: Vec<(String, Entry)> = {
            let mut data = self.lock_data();
            let keys: Vec<String> = data
                .iter()
                .filter(|(_, entry)| entry.lease == Some(lease))
                .map(|(k, _)| k.clone())
                .collect();
            keys.into_iter()
                .filter_map(|k| data.remove(&k).map(|entry| (k, entry)))
                .collect()
        };

        for (key, entry) in expired {
            self.emit(WatchEvent {
                event_type: WatchEventType::Delete,
                key,
                value: entry.value,
            });
        }
    }

    /// Simulate the store deciding a lease expired (missed renewals).
    /// Bound keys are deleted and watchers observe the DELETE events; the
    /// lease's renewal channel closes on its next tick.
    pub fn expire_lease(&self, lease: LeaseId) {
        self.drop_lease(lease);
    }
}

#[async_trait::async_trait]
impl CoordinationStore for MemoryStore {
    async fn put(
        &self,
        key: &str,
        value: &str,
        lease: Option<LeaseId>,
    ) -> Result<(), PomboError> {
        if let Some(id) = lease
            && !self.lease_exists(id)
        {
            return Err(PomboError::StoreError(format!("lease {} not found", id)));
        }

        self.lock_data().insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                lease,
            },
        );
        self.emit(WatchEvent {
            event_type: WatchEventType::Put,
            key: key.to_string(),
            value: value.to_string(),
        });
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, PomboError> {
        Ok(self.lock_data().get(key).map(|e| e.value.clone()))
    }

    async fn get_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>, PomboError> {
        let mut entries: Vec<(String, String)> = self
            .lock_data()
            .iter()
            .filter(|(k, _)| k.starts_with(prefix))
            .map(|(k, e)| (k.clone(), e.value.clone()))
            .collect();
        entries.sort();
        Ok(entries)
    }

    async fn create_if_absent(&self, key: &str, value: &str) -> Result<bool, PomboError> {
        {
            let mut data = self.lock_data();
            if data.contains_key(key) {
                return Ok(false);
            }
            data.insert(
                key.to_string(),
                Entry {
                    value: value.to_string(),
                    lease: None,
                },
            );
        }
        self.emit(WatchEvent {
            event_type: WatchEventType::Put,
            key: key.to_string(),
            value: value.to_string(),
        });
        Ok(true)
    }

    async fn watch(&self, prefix: &str) -> Result<mpsc::Receiver<WatchEvent>, PomboError> {
        let mut source = self.watch_tx.subscribe();
        let prefix = prefix.to_string();
        let (tx, rx) = mpsc::channel(WATCH_BUFFER);

        tokio::spawn(async move {
            loop {
                match source.recv().await {
                    Ok(event) => {
                        if !event.key.starts_with(&prefix) {
                            continue;
                        }
                        if tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok(rx)
    }

    async fn grant(&self, _ttl: i64) -> Result<LeaseId, PomboError> {
        let id = self.lease_seq.fetch_add(1, Ordering::SeqCst);
        self.leases
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, ());
        Ok(id)
    }

    async fn keep_alive(
        &self,
        lease: LeaseId,
        interval: Duration,
    ) -> Result<mpsc::Receiver<()>, PomboError> {
        if !self.lease_exists(lease) {
            return Err(PomboError::StoreError(format!("lease {} not found", lease)));
        }

        let (tx, rx) = mpsc::channel(8);
        let leases = self.leases.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let alive = leases
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .contains_key(&lease);
                if !alive {
                    break;
                }
                if tx.send(()).await.is_err() {
                    break;
                }
            }
        });

        Ok(rx)
    }

    async fn revoke(&self, lease: LeaseId) -> Result<(), PomboError> {
        self.drop_lease(lease);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_prefix() {
        let store = MemoryStore::new();
        store.put("/s/a", "10.0.0.1:9190", None).await.unwrap();
        store.put("/s/b", "10.0.0.2:9190", None).await.unwrap();
        store.put("/other", "x", None).await.unwrap();

        let entries = store.get_prefix("/s/").await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].1, "10.0.0.1:9190");
        assert_eq!(store.get("/other").await.unwrap().as_deref(), Some("x"));
    }

    #[tokio::test]
    async fn test_create_if_absent_is_atomic_check() {
        let store = MemoryStore::new();
        assert!(store.create_if_absent("/acct/sys1", "v1").await.unwrap());
        assert!(!store.create_if_absent("/acct/sys1", "v2").await.unwrap());
        // The losing write must not clobber the first value
        assert_eq!(
            store.get("/acct/sys1").await.unwrap().as_deref(),
            Some("v1")
        );
    }

    #[tokio::test]
    async fn test_watch_sees_put_and_delete() {
        let store = MemoryStore::new();
        let mut rx = store.watch("/s/").await.unwrap();

        let lease = store.grant(5).await.unwrap();
        store.put("/s/a", "addr", Some(lease)).await.unwrap();
        store.put("/unrelated", "x", None).await.unwrap();
        store.revoke(lease).await.unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.event_type, WatchEventType::Put);
        assert_eq!(first.key, "/s/a");

        // The unrelated key is filtered out; next event is the lease delete
        let second = rx.recv().await.unwrap();
        assert_eq!(second.event_type, WatchEventType::Delete);
        assert_eq!(second.key, "/s/a");
    }

    #[tokio::test]
    async fn test_keep_alive_closes_on_expiry() {
        let store = MemoryStore::new();
        let lease = store.grant(5).await.unwrap();
        let mut rx = store
            .keep_alive(lease, Duration::from_millis(10))
            .await
            .unwrap();

        // Renewals flow while the lease is alive
        assert!(rx.recv().await.is_some());

        store.expire_lease(lease);
        // Drain until the channel closes
        while rx.recv().await.is_some() {}
    }

    #[tokio::test]
    async fn test_put_with_unknown_lease_fails() {
        let store = MemoryStore::new();
        assert!(store.put("/s/a", "addr", Some(42)).await.is_err());
    }
}
