//! Transport seam between the core and the WebSocket layer.

use std::time::Duration;

use pombo_common::PomboError;

/// Write side of a client connection.
///
/// The delivery pipeline and the heartbeat monitor only ever touch a
/// connection through this trait, so the core stays independent of the
/// concrete WebSocket implementation (and tests can observe writes).
#[async_trait::async_trait]
pub trait ClientSocket: Send + Sync {
    /// Write one text frame. An error means the connection is dead; the
    /// caller is expected to evict it rather than retry.
    async fn send_text(&self, text: String) -> Result<(), PomboError>;

    /// Write a liveness probe, failing if it cannot be flushed within
    /// `deadline`.
    async fn ping(&self, deadline: Duration) -> Result<(), PomboError>;

    /// Close the underlying transport. Must be safe to call more than once.
    async fn close(&self);
}
