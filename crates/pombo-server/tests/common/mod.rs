//! Shared fixtures for the gateway integration tests.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use pombo_common::PomboError;
use pombo_common::crypto::SecretBox;
use pombo_core::socket::ClientSocket;
use pombo_core::{
    AccountService, ClientConnection, ClientIdCodec, ConnectionManager, DeliveryPipeline, Router,
};

pub const LOCAL_ADDRESS: &str = "127.0.0.1:9190";

/// Recording socket standing in for a client's WebSocket.
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

/// A fully wired standalone gateway core.
pub struct TestGateway {
    pub manager: Arc<ConnectionManager>,
    pub codec: Arc<ClientIdCodec>,
    pub router: Arc<Router>,
    pub account: Arc<AccountService>,
}

pub fn standalone_gateway() -> TestGateway {
    let manager = ConnectionManager::new();
    let pipeline = DeliveryPipeline::new(manager.clone(), 1000);
    manager.set_delivery(pipeline.handle());
    manager.start();
    pipeline.start();

    let codec = Arc::new(ClientIdCodec::new(&SecretBox::generate_key()));
    let router = Arc::new(Router::new(
        manager.clone(),
        codec.clone(),
        LOCAL_ADDRESS.to_string(),
        None,
    ));
    let account = Arc::new(AccountService::new(None));

    TestGateway {
        manager,
        codec,
        router,
        account,
    }
}

/// Open a mock connection the way the WebSocket layer would.
pub fn connect_client(gateway: &TestGateway, system_id: &str) -> (String, Arc<MockSocket>) {
    let client_id = gateway.codec.generate(LOCAL_ADDRESS).unwrap();
    let socket = Arc::new(MockSocket::default());
    let conn = Arc::new(ClientConnection::new(
        client_id.clone(),
        system_id.to_string(),
        socket.clone(),
    ));
    gateway.manager.add(conn);
    (client_id, socket)
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
