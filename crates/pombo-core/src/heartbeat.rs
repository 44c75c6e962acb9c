//! Heartbeat monitor.
//!
//! Reclaims resources for silently-dead peers: crashed clients and dropped
//! networks never send a close frame, so every local connection is probed
//! on a fixed interval and unresponsive ones are evicted.

use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use metrics::counter;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::connection::ConnectionManager;

#[derive(Clone, Debug)]
pub struct HeartbeatConfig {
    /// Interval between probe rounds
    pub interval: Duration,
    /// Deadline for a single probe write
    pub probe_timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(25),
            probe_timeout: Duration::from_secs(1),
        }
    }
}

pub struct HeartbeatMonitor {
    manager: Arc<ConnectionManager>,
    config: HeartbeatConfig,
    running: Arc<RwLock<bool>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl HeartbeatMonitor {
    pub fn new(manager: Arc<ConnectionManager>, config: HeartbeatConfig) -> Self {
        Self {
            manager,
            config,
            running: Arc::new(RwLock::new(false)),
            task: Mutex::new(None),
        }
    }

    pub async fn start(&self) {
        let mut running = self.running.write().await;
        if *running {
            return;
        }
        *running = true;
        drop(running);

        info!(interval = ?self.config.interval, "starting heartbeat monitor");

        let manager = self.manager.clone();
        let running = self.running.clone();
        let config = self.config.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(config.interval);
            // The first tick fires immediately; skip it so a fresh process
            // does not probe connections that are still mid-handshake
            ticker.tick().await;

            loop {
                ticker.tick().await;
                if !*running.read().await {
                    break;
                }

                // Snapshot first; no registry lock is held while probing
                for conn in manager.all_clients() {
                    if !conn.is_open() {
                        continue;
                    }
                    if let Err(e) = conn.socket().ping(config.probe_timeout).await {
                        counter!("pombo_heartbeat_failures_total").increment(1);
                        warn!(
                            client_id = %conn.client_id(),
                            online = manager.count(),
                            error = %e,
                            "heartbeat probe failed"
                        );
                        manager.disconnect(conn).await;
                    }
                }
            }
        });

        *self.task.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
    }

    pub async fn stop(&self) {
        let mut running = self.running.write().await;
        if !*running {
            return;
        }
        *running = false;
        drop(running);

        if let Some(handle) = self.task.lock().unwrap_or_else(|e| e.into_inner()).take() {
            handle.abort();
        }
        info!("heartbeat monitor stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::connection::{ClientConnection, ConnectionState};
    use crate::test_support::{MockSocket, wait_until};

    fn fast_config() -> HeartbeatConfig {
        HeartbeatConfig {
            interval: Duration::from_millis(20),
            probe_timeout: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn test_failing_probe_evicts_connection() {
        let manager = ConnectionManager::new();
        manager.start();

        let socket = Arc::new(MockSocket::default());
        socket.fail_ping.store(true, Ordering::SeqCst);
        let conn = Arc::new(ClientConnection::new(
            "c1".to_string(),
            "sys1".to_string(),
            socket,
        ));
        manager.add(conn.clone());
        manager.add_to_local_group("sys1", "g1", &conn, "u1", "");

        let monitor = HeartbeatMonitor::new(manager.clone(), fast_config());
        monitor.start().await;

        assert!(
            wait_until(
                || conn.state() == ConnectionState::Closed,
                Duration::from_secs(2)
            )
            .await
        );
        assert!(manager.get_by_client_id("c1").is_none());
        assert!(manager.local_group_clients("sys1", "g1").is_empty());

        monitor.stop().await;
    }

    #[tokio::test]
    async fn test_healthy_connection_survives_probes() {
        let manager = ConnectionManager::new();
        manager.start();

        let socket = Arc::new(MockSocket::default());
        let conn = Arc::new(ClientConnection::new(
            "c1".to_string(),
            "sys1".to_string(),
            socket.clone(),
        ));
        manager.add(conn.clone());

        let monitor = HeartbeatMonitor::new(manager.clone(), fast_config());
        monitor.start().await;

        assert!(
            wait_until(
                || socket.pings.load(Ordering::SeqCst) >= 3,
                Duration::from_secs(2)
            )
            .await
        );
        assert!(conn.is_open());
        assert_eq!(manager.count(), 1);

        monitor.stop().await;
    }
}
