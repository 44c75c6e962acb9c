//! Delivery pipeline.
//!
//! One bounded queue shared by every local delivery, drained by exactly one
//! consumer task. Serializing writes through a single consumer keeps
//! per-connection ordering and avoids concurrent writes to arbitrary
//! sockets from the many producer paths.

use std::sync::{Arc, Mutex};

use metrics::counter;
use pombo_api::MessageFrame;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::connection::ConnectionManager;

/// A message accepted for local delivery.
#[derive(Clone, Debug)]
pub struct OutboundMessage {
    pub message_id: String,
    pub client_id: String,
    pub send_user_id: String,
    pub code: i32,
    pub msg: String,
    pub data: Option<String>,
}

/// Producer side of the delivery queue. Cheap to clone.
#[derive(Clone)]
pub struct DeliveryHandle {
    tx: mpsc::Sender<OutboundMessage>,
}

impl DeliveryHandle {
    /// Enqueue without blocking. A full queue sheds the message: the send
    /// path stays available and memory stays bounded.
    pub fn enqueue(&self, message: OutboundMessage) {
        match self.tx.try_send(message) {
            Ok(()) => {
                counter!("pombo_messages_enqueued_total").increment(1);
            }
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                counter!("pombo_messages_dropped_total").increment(1);
                warn!(
                    client_id = %dropped.client_id,
                    message_id = %dropped.message_id,
                    "delivery queue full, message dropped"
                );
            }
            Err(mpsc::error::TrySendError::Closed(dropped)) => {
                warn!(
                    client_id = %dropped.client_id,
                    "delivery consumer stopped, message dropped"
                );
            }
        }
    }
}

pub struct DeliveryPipeline {
    manager: Arc<ConnectionManager>,
    tx: mpsc::Sender<OutboundMessage>,
    rx: Mutex<Option<mpsc::Receiver<OutboundMessage>>>,
}

impl DeliveryPipeline {
    pub fn new(manager: Arc<ConnectionManager>, capacity: usize) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(capacity);
        Arc::new(Self {
            manager,
            tx,
            rx: Mutex::new(Some(rx)),
        })
    }

    pub fn handle(&self) -> DeliveryHandle {
        DeliveryHandle {
            tx: self.tx.clone(),
        }
    }

    /// Spawn the single consumer task.
    pub fn start(self: &Arc<Self>) {
        let rx = self.rx.lock().unwrap_or_else(|e| e.into_inner()).take();
        let Some(mut rx) = rx else {
            return;
        };

        let pipeline = self.clone();
        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                pipeline.deliver(message).await;
            }
        });
    }

    async fn deliver(&self, message: OutboundMessage) {
        // Best-effort: a target that disconnected since enqueue is skipped
        let Some(conn) = self.manager.get_by_client_id(&message.client_id) else {
            debug!(
                client_id = %message.client_id,
                message_id = %message.message_id,
                "target connection gone, message discarded"
            );
            return;
        };
        if !conn.is_open() {
            return;
        }

        let frame = MessageFrame {
            message_id: message.message_id.clone(),
            send_user_id: message.send_user_id,
            code: message.code,
            msg: message.msg,
            data: message.data,
        };
        let text = match serde_json::to_string(&frame) {
            Ok(text) => text,
            Err(e) => {
                error!(message_id = %message.message_id, error = %e, "frame encoding failed");
                return;
            }
        };

        match conn.socket().send_text(text).await {
            Ok(()) => {
                counter!("pombo_messages_delivered_total").increment(1);
            }
            Err(e) => {
                // A failed write means a dead connection, not a transient
                // error; the transport has no native resend
                counter!("pombo_delivery_errors_total").increment(1);
                error!(
                    client_id = %message.client_id,
                    message_id = %message.message_id,
                    error = %e,
                    "write failed, evicting connection"
                );
                self.manager.disconnect(conn).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use super::*;
    use crate::connection::{ClientConnection, ConnectionState};
    use crate::test_support::{MockSocket, wait_until};

    fn setup(capacity: usize) -> (Arc<ConnectionManager>, Arc<DeliveryPipeline>) {
        let manager = ConnectionManager::new();
        let pipeline = DeliveryPipeline::new(manager.clone(), capacity);
        manager.set_delivery(pipeline.handle());
        manager.start();
        pipeline.start();
        (manager, pipeline)
    }

    fn message(client_id: &str, n: usize) -> OutboundMessage {
        OutboundMessage {
            message_id: format!("m{}", n),
            client_id: client_id.to_string(),
            send_user_id: String::new(),
            code: 200,
            msg: format!("payload-{}", n),
            data: None,
        }
    }

    #[tokio::test]
    async fn test_messages_delivered_in_enqueue_order() {
        let (manager, pipeline) = setup(1000);
        let socket = Arc::new(MockSocket::default());
        let conn = Arc::new(ClientConnection::new(
            "c1".to_string(),
            "sys1".to_string(),
            socket.clone(),
        ));
        manager.add(conn);

        let handle = pipeline.handle();
        for n in 0..100 {
            handle.enqueue(message("c1", n));
        }

        assert!(
            wait_until(|| socket.sent_frames().len() == 100, Duration::from_secs(2)).await
        );
        let frames = socket.sent_frames();
        for (n, frame) in frames.iter().enumerate() {
            let parsed: pombo_api::MessageFrame = serde_json::from_str(frame).unwrap();
            assert_eq!(parsed.msg, format!("payload-{}", n));
        }
    }

    #[tokio::test]
    async fn test_write_failure_evicts_connection() {
        let (manager, pipeline) = setup(1000);
        let socket = Arc::new(MockSocket::default());
        socket.fail_send.store(true, Ordering::SeqCst);
        let conn = Arc::new(ClientConnection::new(
            "c1".to_string(),
            "sys1".to_string(),
            socket,
        ));
        manager.add(conn.clone());

        pipeline.handle().enqueue(message("c1", 0));

        assert!(
            wait_until(
                || conn.state() == ConnectionState::Closed,
                Duration::from_secs(1)
            )
            .await
        );
        assert!(manager.get_by_client_id("c1").is_none());
    }

    #[tokio::test]
    async fn test_unknown_target_is_skipped() {
        let (_manager, pipeline) = setup(1000);
        // Must not panic or wedge the consumer
        pipeline.handle().enqueue(message("ghost", 0));
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
