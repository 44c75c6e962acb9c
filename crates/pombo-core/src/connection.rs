//! Connection registry.
//!
//! Single authority for local connection and group state. Every eviction
//! trigger (explicit close, failed write, failed heartbeat probe) funnels
//! through one channel consumed by one task, so teardown happens exactly
//! once per connection no matter how many sources report it dead.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use dashmap::DashMap;
use metrics::{counter, gauge};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use pombo_common::group_key;

use crate::delivery::{DeliveryHandle, OutboundMessage};
use crate::socket::ClientSocket;

const DISCONNECT_QUEUE_SIZE: usize = 256;

/// Connection lifecycle. `Closing` is entered at most once, from whichever
/// failure source arrives first; later signals are ignored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ConnectionState::Connecting,
            1 => ConnectionState::Open,
            2 => ConnectionState::Closing,
            _ => ConnectionState::Closed,
        }
    }
}

/// Per-member metadata inside a group.
#[derive(Clone, Debug, Default)]
pub struct GroupMember {
    pub user_id: String,
    pub extend: String,
}

/// One live client connection, exclusively owned by this process.
pub struct ClientConnection {
    client_id: String,
    system_id: String,
    connect_time: i64,
    state: AtomicU8,
    socket: Arc<dyn ClientSocket>,
    /// Group keys this connection joined, kept so teardown releases group
    /// memberships without scanning the whole group map.
    groups: Mutex<HashSet<String>>,
}

impl ClientConnection {
    pub fn new(client_id: String, system_id: String, socket: Arc<dyn ClientSocket>) -> Self {
        Self {
            client_id,
            system_id,
            connect_time: chrono::Utc::now().timestamp_millis(),
            state: AtomicU8::new(ConnectionState::Connecting as u8),
            socket,
            groups: Mutex::new(HashSet::new()),
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn system_id(&self) -> &str {
        &self.system_id
    }

    pub fn connect_time(&self) -> i64 {
        self.connect_time
    }

    pub fn socket(&self) -> &Arc<dyn ClientSocket> {
        &self.socket
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    fn mark_open(&self) -> bool {
        self.state
            .compare_exchange(
                ConnectionState::Connecting as u8,
                ConnectionState::Open as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    /// Transition into `Closing`. Returns false if the connection is
    /// already closing or closed, making eviction idempotent.
    fn begin_close(&self) -> bool {
        for from in [ConnectionState::Open, ConnectionState::Connecting] {
            if self
                .state
                .compare_exchange(
                    from as u8,
                    ConnectionState::Closing as u8,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                )
                .is_ok()
            {
                return true;
            }
        }
        false
    }

    fn mark_closed(&self) {
        self.state
            .store(ConnectionState::Closed as u8, Ordering::SeqCst);
    }

    fn join_group(&self, key: String) {
        self.groups
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key);
    }

    fn leave_group(&self, key: &str) {
        self.groups
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
    }

    fn take_groups(&self) -> Vec<String> {
        self.groups
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain()
            .collect()
    }
}

impl std::fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConnection")
            .field("client_id", &self.client_id)
            .field("system_id", &self.system_id)
            .field("state", &self.state())
            .finish()
    }
}

/// Registry of local connections and the local slice of every group.
pub struct ConnectionManager {
    clients: DashMap<String, Arc<ClientConnection>>,
    groups: DashMap<String, HashMap<String, GroupMember>>,
    disconnect_tx: mpsc::Sender<Arc<ClientConnection>>,
    disconnect_rx: Mutex<Option<mpsc::Receiver<Arc<ClientConnection>>>>,
    delivery: OnceLock<DeliveryHandle>,
}

impl ConnectionManager {
    pub fn new() -> Arc<Self> {
        let (disconnect_tx, disconnect_rx) = mpsc::channel(DISCONNECT_QUEUE_SIZE);
        Arc::new(Self {
            clients: DashMap::new(),
            groups: DashMap::new(),
            disconnect_tx,
            disconnect_rx: Mutex::new(Some(disconnect_rx)),
            delivery: OnceLock::new(),
        })
    }

    /// Wire the delivery queue. Must happen once, before traffic.
    pub fn set_delivery(&self, handle: DeliveryHandle) {
        let _ = self.delivery.set(handle);
    }

    /// Spawn the eviction consumer.
    pub fn start(self: &Arc<Self>) {
        let rx = self
            .disconnect_rx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        let Some(mut rx) = rx else {
            return;
        };

        let manager = self.clone();
        tokio::spawn(async move {
            while let Some(conn) = rx.recv().await {
                manager.evict(&conn).await;
            }
        });
    }

    /// Register a freshly accepted connection.
    pub fn add(&self, conn: Arc<ClientConnection>) {
        if !conn.mark_open() {
            warn!(client_id = %conn.client_id(), "refusing to add non-connecting connection");
            return;
        }
        self.clients.insert(conn.client_id().to_string(), conn);
        gauge!("pombo_connections").set(self.clients.len() as f64);
    }

    pub fn get_by_client_id(&self, client_id: &str) -> Option<Arc<ClientConnection>> {
        self.clients.get(client_id).map(|e| e.value().clone())
    }

    pub fn count(&self) -> usize {
        self.clients.len()
    }

    /// Snapshot of all connections. Callers iterate the copy so no map
    /// lock is held across probe or write I/O.
    pub fn all_clients(&self) -> Vec<Arc<ClientConnection>> {
        self.clients.iter().map(|e| e.value().clone()).collect()
    }

    /// Idempotent upsert of a connection into a local group.
    pub fn add_to_local_group(
        &self,
        system_id: &str,
        group_name: &str,
        conn: &Arc<ClientConnection>,
        user_id: &str,
        extend: &str,
    ) {
        if !conn.is_open() {
            debug!(client_id = %conn.client_id(), "skip group bind for non-open connection");
            return;
        }

        let key = group_key(system_id, group_name);
        self.groups.entry(key.clone()).or_default().insert(
            conn.client_id().to_string(),
            GroupMember {
                user_id: user_id.to_string(),
                extend: extend.to_string(),
            },
        );
        conn.join_group(key);
    }

    pub fn remove_from_local_group(&self, system_id: &str, group_name: &str, client_id: &str) {
        let key = group_key(system_id, group_name);
        if let Some(mut members) = self.groups.get_mut(&key) {
            members.remove(client_id);
        }
        self.groups.remove_if(&key, |_, members| members.is_empty());

        if let Some(conn) = self.get_by_client_id(client_id) {
            conn.leave_group(&key);
        }
    }

    /// Client ids of the local slice of a group.
    pub fn local_group_clients(&self, system_id: &str, group_name: &str) -> Vec<String> {
        let key = group_key(system_id, group_name);
        self.groups
            .get(&key)
            .map(|members| members.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Enqueue one message per local member of a group.
    pub fn send_to_local_group(
        &self,
        system_id: &str,
        group_name: &str,
        message_id: &str,
        send_user_id: &str,
        code: i32,
        msg: &str,
        data: Option<&str>,
    ) {
        for client_id in self.local_group_clients(system_id, group_name) {
            self.enqueue_message(OutboundMessage {
                message_id: message_id.to_string(),
                client_id,
                send_user_id: send_user_id.to_string(),
                code,
                msg: msg.to_string(),
                data: data.map(|d| d.to_string()),
            });
        }
    }

    /// Enqueue one message per local connection belonging to a system.
    pub fn send_to_local_system(
        &self,
        system_id: &str,
        message_id: &str,
        send_user_id: &str,
        code: i32,
        msg: &str,
        data: Option<&str>,
    ) {
        let targets: Vec<String> = self
            .clients
            .iter()
            .filter(|e| e.value().system_id() == system_id)
            .map(|e| e.key().clone())
            .collect();

        for client_id in targets {
            self.enqueue_message(OutboundMessage {
                message_id: message_id.to_string(),
                client_id,
                send_user_id: send_user_id.to_string(),
                code,
                msg: msg.to_string(),
                data: data.map(|d| d.to_string()),
            });
        }
    }

    /// Push a message onto the shared delivery queue.
    pub fn enqueue_message(&self, message: OutboundMessage) {
        match self.delivery.get() {
            Some(handle) => handle.enqueue(message),
            None => warn!("delivery queue not wired; message dropped"),
        }
    }

    /// Report a connection dead. All three failure sources (protocol
    /// close, failed write, failed heartbeat) call this and nothing else.
    pub async fn disconnect(&self, conn: Arc<ClientConnection>) {
        if self.disconnect_tx.send(conn).await.is_err() {
            warn!("disconnect channel closed; eviction consumer gone");
        }
    }

    async fn evict(&self, conn: &Arc<ClientConnection>) {
        if !conn.begin_close() {
            return;
        }

        self.clients.remove(conn.client_id());
        for key in conn.take_groups() {
            if let Some(mut members) = self.groups.get_mut(&key) {
                members.remove(conn.client_id());
            }
            self.groups.remove_if(&key, |_, members| members.is_empty());
        }

        conn.socket().close().await;
        conn.mark_closed();

        counter!("pombo_evictions_total").increment(1);
        gauge!("pombo_connections").set(self.clients.len() as f64);
        info!(
            client_id = %conn.client_id(),
            system_id = %conn.system_id(),
            online = self.clients.len(),
            "connection evicted"
        );
    }
}
