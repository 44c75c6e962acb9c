//! etcd-backed coordination store.
//!
//! Thin adapter between [`CoordinationStore`] and the `etcd-client` crate.
//! Watch and keepalive streams are pumped into plain channels so the rest
//! of the core never sees etcd types.

use std::time::Duration;

use etcd_client::{
    Client, Compare, CompareOp, ConnectOptions, EventType, GetOptions, PutOptions, Txn, TxnOp,
    WatchOptions,
};
use pombo_common::PomboError;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{CoordinationStore, LeaseId, WatchEvent, WatchEventType};

const CHANNEL_BUFFER: usize = 64;

fn store_err(e: etcd_client::Error) -> PomboError {
    PomboError::StoreError(e.to_string())
}

pub struct EtcdStore {
    client: Client,
}

impl EtcdStore {
    /// Connect to the etcd cluster. Fatal at startup if unreachable.
    pub async fn connect(
        endpoints: Vec<String>,
        connect_timeout: Duration,
    ) -> Result<Self, PomboError> {
        let options = ConnectOptions::new().with_connect_timeout(connect_timeout);
        let client = Client::connect(endpoints, Some(options))
            .await
            .map_err(store_err)?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl CoordinationStore for EtcdStore {
    async fn put(
        &self,
        key: &str,
        value: &str,
        lease: Option<LeaseId>,
    ) -> Result<(), PomboError> {
        let options = lease.map(|id| PutOptions::new().with_lease(id));
        let mut kv = self.client.kv_client();
        kv.put(key, value, options).await.map_err(store_err)?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, PomboError> {
        let mut kv = self.client.kv_client();
        let resp = kv.get(key, None).await.map_err(store_err)?;
        match resp.kvs().first() {
            Some(entry) => Ok(Some(
                entry.value_str().map_err(store_err)?.to_string(),
            )),
            None => Ok(None),
        }
    }

    async fn get_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>, PomboError> {
        let mut kv = self.client.kv_client();
        let resp = kv
            .get(prefix, Some(GetOptions::new().with_prefix()))
            .await
            .map_err(store_err)?;

        let mut entries = Vec::with_capacity(resp.kvs().len());
        for entry in resp.kvs() {
            entries.push((
                entry.key_str().map_err(store_err)?.to_string(),
                entry.value_str().map_err(store_err)?.to_string(),
            ));
        }
        Ok(entries)
    }

    async fn create_if_absent(&self, key: &str, value: &str) -> Result<bool, PomboError> {
        // Version 0 means "key does not exist"; the conditional put makes
        // concurrent registrations race-free on the store side.
        let txn = Txn::new()
            .when(vec![Compare::version(key, CompareOp::Equal, 0)])
            .and_then(vec![TxnOp::put(key, value, None)]);

        let mut kv = self.client.kv_client();
        let resp = kv.txn(txn).await.map_err(store_err)?;
        Ok(resp.succeeded())
    }

    async fn watch(&self, prefix: &str) -> Result<mpsc::Receiver<WatchEvent>, PomboError> {
        let mut watch_client = self.client.watch_client();
        let (watcher, mut stream) = watch_client
            .watch(prefix, Some(WatchOptions::new().with_prefix()))
            .await
            .map_err(store_err)?;

        let (tx, rx) = mpsc::channel(CHANNEL_BUFFER);
        let prefix = prefix.to_string();

        tokio::spawn(async move {
            // Dropping the watcher cancels the server-side watch, so it
            // lives exactly as long as this pump task.
            let _watcher = watcher;
            loop {
                match stream.message().await {
                    Ok(Some(resp)) => {
                        for event in resp.events() {
                            let Some(entry) = event.kv() else { continue };
                            let (Ok(key), Ok(value)) = (entry.key_str(), entry.value_str())
                            else {
                                continue;
                            };
                            let event_type = match event.event_type() {
                                EventType::Put => WatchEventType::Put,
                                EventType::Delete => WatchEventType::Delete,
                            };
                            let forwarded = tx
                                .send(WatchEvent {
                                    event_type,
                                    key: key.to_string(),
                                    value: value.to_string(),
                                })
                                .await;
                            if forwarded.is_err() {
                                return;
                            }
                        }
                    }
                    Ok(None) => {
                        debug!(prefix = %prefix, "watch stream ended");
                        return;
                    }
                    Err(e) => {
                        warn!(prefix = %prefix, error = %e, "watch stream failed");
                        return;
                    }
                }
            }
        });

        Ok(rx)
    }

    async fn grant(&self, ttl: i64) -> Result<LeaseId, PomboError> {
        let mut lease = self.client.lease_client();
        let resp = lease.grant(ttl, None).await.map_err(store_err)?;
        Ok(resp.id())
    }

    async fn keep_alive(
        &self,
        lease: LeaseId,
        interval: Duration,
    ) -> Result<mpsc::Receiver<()>, PomboError> {
        let mut lease_client = self.client.lease_client();
        let (mut keeper, mut stream) = lease_client.keep_alive(lease).await.map_err(store_err)?;

        let (tx, rx) = mpsc::channel(8);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if keeper.keep_alive().await.is_err() {
                    return;
                }
                match stream.message().await {
                    // TTL 0 in a renewal ack means the store already
                    // considers the lease expired
                    Ok(Some(resp)) if resp.ttl() > 0 => {
                        if tx.send(()).await.is_err() {
                            return;
                        }
                    }
                    _ => return,
                }
            }
        });

        Ok(rx)
    }

    async fn revoke(&self, lease: LeaseId) -> Result<(), PomboError> {
        let mut lease_client = self.client.lease_client();
        lease_client.revoke(lease).await.map_err(store_err)?;
        Ok(())
    }
}
