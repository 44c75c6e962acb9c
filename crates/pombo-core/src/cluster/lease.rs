//! Lease-backed self-registration.
//!
//! The process writes its internal RPC address under [`SERVER_KEY_PREFIX`],
//! bound to a lease it keeps renewing in the background. If the store stops
//! acknowledging renewals the lease is gone and the key has been deleted on
//! the store side, removing this node from every peer's membership view;
//! the registry then re-acquires a lease with capped backoff so a transient
//! partition does not permanently exile the node.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use pombo_common::PomboError;

use super::SERVER_KEY_PREFIX;
use crate::store::{CoordinationStore, LeaseId};

/// Delay between keepalive cancellation and explicit revoke, giving an
/// in-flight renewal time to settle.
const REVOKE_SETTLE: Duration = Duration::from_millis(500);

#[derive(Clone, Debug)]
pub struct LeaseBackoff {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for LeaseBackoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(30),
        }
    }
}

pub struct LeaseRegistry {
    store: Arc<dyn CoordinationStore>,
    address: String,
    ttl: i64,
    backoff: LeaseBackoff,
    lease_id: Arc<AtomicI64>,
    lost_tx: broadcast::Sender<()>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl LeaseRegistry {
    pub fn new(store: Arc<dyn CoordinationStore>, address: String, ttl: i64) -> Self {
        Self::with_backoff(store, address, ttl, LeaseBackoff::default())
    }

    pub fn with_backoff(
        store: Arc<dyn CoordinationStore>,
        address: String,
        ttl: i64,
        backoff: LeaseBackoff,
    ) -> Self {
        let (lost_tx, _) = broadcast::channel(4);
        Self {
            store,
            address,
            ttl,
            backoff,
            lease_id: Arc::new(AtomicI64::new(0)),
            lost_tx,
            task: Mutex::new(None),
        }
    }

    fn renewal_interval(ttl: i64) -> Duration {
        Duration::from_secs((ttl as u64 / 3).max(1))
    }

    async fn acquire(
        store: &Arc<dyn CoordinationStore>,
        address: &str,
        ttl: i64,
    ) -> Result<(LeaseId, mpsc::Receiver<()>), PomboError> {
        let lease = store.grant(ttl).await?;
        let key = format!("{}{}", SERVER_KEY_PREFIX, address);
        store.put(&key, address, Some(lease)).await?;
        let renewals = store.keep_alive(lease, Self::renewal_interval(ttl)).await?;
        Ok((lease, renewals))
    }

    /// Register this node and start the background keepalive task.
    /// Failure here is fatal at startup: a cluster node that cannot reach
    /// its store must not serve.
    pub async fn register(&self) -> Result<(), PomboError> {
        let (lease, renewals) = Self::acquire(&self.store, &self.address, self.ttl).await?;
        self.lease_id.store(lease, Ordering::SeqCst);
        info!(address = %self.address, lease, "registered in coordination store");

        let store = self.store.clone();
        let address = self.address.clone();
        let ttl = self.ttl;
        let backoff = self.backoff.clone();
        let lease_id = self.lease_id.clone();
        let lost_tx = self.lost_tx.clone();

        let handle = tokio::spawn(async move {
            let mut renewals = renewals;
            loop {
                match renewals.recv().await {
                    Some(()) => continue,
                    None => {
                        warn!(
                            address = %address,
                            "lease keepalive stream closed, registration lost"
                        );
                        let _ = lost_tx.send(());

                        let mut delay = backoff.initial;
                        loop {
                            tokio::time::sleep(delay).await;
                            match Self::acquire(&store, &address, ttl).await {
                                Ok((lease, stream)) => {
                                    lease_id.store(lease, Ordering::SeqCst);
                                    info!(
                                        address = %address,
                                        lease,
                                        "re-registered in coordination store"
                                    );
                                    renewals = stream;
                                    break;
                                }
                                Err(e) => {
                                    error!(
                                        address = %address,
                                        error = %e,
                                        retry_in = ?delay,
                                        "re-registration failed"
                                    );
                                    delay = (delay * 2).min(backoff.max);
                                }
                            }
                        }
                    }
                }
            }
        });

        *self.task.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
        Ok(())
    }

    /// Notified whenever a held lease is declared lost by the store.
    pub fn on_lease_lost(&self) -> broadcast::Receiver<()> {
        self.lost_tx.subscribe()
    }

    pub fn lease_id(&self) -> LeaseId {
        self.lease_id.load(Ordering::SeqCst)
    }

    /// Graceful shutdown: stop renewing, let in-flight renewal settle,
    /// then revoke so peers observe the departure immediately instead of
    /// waiting out the TTL.
    pub async fn revoke(&self) {
        if let Some(handle) = self.task.lock().unwrap_or_else(|e| e.into_inner()).take() {
            handle.abort();
        }
        tokio::time::sleep(REVOKE_SETTLE).await;

        let lease = self.lease_id.swap(0, Ordering::SeqCst);
        if lease != 0
            && let Err(e) = self.store.revoke(lease).await
        {
            warn!(lease, error = %e, "lease revoke failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::test_support::wait_until;

    fn fast_backoff() -> LeaseBackoff {
        LeaseBackoff {
            initial: Duration::from_millis(10),
            max: Duration::from_millis(50),
        }
    }

    #[tokio::test]
    async fn test_register_binds_address_to_lease() {
        let store = Arc::new(MemoryStore::new());
        let registry = LeaseRegistry::with_backoff(
            store.clone(),
            "10.0.0.1:9190".to_string(),
            5,
            fast_backoff(),
        );

        registry.register().await.unwrap();

        let key = format!("{}10.0.0.1:9190", SERVER_KEY_PREFIX);
        assert_eq!(
            store.get(&key).await.unwrap().as_deref(),
            Some("10.0.0.1:9190")
        );
        assert_ne!(registry.lease_id(), 0);
    }

    #[tokio::test]
    async fn test_lease_loss_triggers_re_registration() {
        let store = Arc::new(MemoryStore::new());
        let registry = LeaseRegistry::with_backoff(
            store.clone(),
            "10.0.0.1:9190".to_string(),
            5,
            fast_backoff(),
        );
        registry.register().await.unwrap();
        let mut lost = registry.on_lease_lost();
        let first_lease = registry.lease_id();

        store.expire_lease(first_lease);

        // The key comes back under a fresh lease
        let key = format!("{}10.0.0.1:9190", SERVER_KEY_PREFIX);
        assert!(
            wait_until(
                || registry.lease_id() != 0 && registry.lease_id() != first_lease,
                Duration::from_secs(2)
            )
            .await
        );
        assert!(lost.try_recv().is_ok());
        assert_eq!(
            store.get(&key).await.unwrap().as_deref(),
            Some("10.0.0.1:9190")
        );
    }

    #[tokio::test]
    async fn test_revoke_removes_registration() {
        let store = Arc::new(MemoryStore::new());
        let registry = LeaseRegistry::with_backoff(
            store.clone(),
            "10.0.0.1:9190".to_string(),
            5,
            fast_backoff(),
        );
        registry.register().await.unwrap();

        registry.revoke().await;

        let key = format!("{}10.0.0.1:9190", SERVER_KEY_PREFIX);
        assert!(store.get(&key).await.unwrap().is_none());
        assert_eq!(registry.lease_id(), 0);
    }
}
