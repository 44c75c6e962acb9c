//! Core cluster, routing, and connection management for Pombo.

pub mod account;
pub mod cluster;
pub mod connection;
pub mod delivery;
pub mod heartbeat;
pub mod model;
pub mod resolver;
pub mod router;
pub mod socket;
pub mod store;

pub use account::AccountService;
pub use connection::{ClientConnection, ConnectionManager, ConnectionState, GroupMember};
pub use delivery::{DeliveryHandle, DeliveryPipeline, OutboundMessage};
pub use heartbeat::{HeartbeatConfig, HeartbeatMonitor};
pub use model::Configuration;
pub use resolver::{ClientIdCodec, OwnerResolver};
pub use router::{Router, RouterCluster};

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use pombo_common::PomboError;

    use crate::socket::ClientSocket;

    /// Recording socket used by unit tests in place of a WebSocket sink.
    #[derive(Default)]
    pub struct MockSocket {
        pub sent: Mutex<Vec<String>>,
        pub fail_send: AtomicBool,
        pub fail_ping: AtomicBool,
        pub pings: AtomicUsize,
        pub closed: AtomicBool,
    }

    impl MockSocket {
        pub fn sent_frames(&self) -> Vec<String> {
            self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
        }
    }

    #[async_trait::async_trait]
    impl ClientSocket for MockSocket {
        async fn send_text(&self, text: String) -> Result<(), PomboError> {
            if self.fail_send.load(Ordering::SeqCst) {
                return Err(PomboError::ConnectionClosed);
            }
            self.sent
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(text);
            Ok(())
        }

        async fn ping(&self, _deadline: Duration) -> Result<(), PomboError> {
            self.pings.fetch_add(1, Ordering::SeqCst);
            if self.fail_ping.load(Ordering::SeqCst) {
                return Err(PomboError::ConnectionClosed);
            }
            Ok(())
        }

        async fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }
    }

    /// Poll until `check` returns true or the timeout elapses.
    pub async fn wait_until<F: Fn() -> bool>(check: F, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if check() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        check()
    }
}
