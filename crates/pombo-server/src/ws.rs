//! WebSocket endpoint.
//!
//! Dedicated listener for client connections. The handshake carries the
//! client's system id as a query parameter; accepted connections are
//! registered with the core and handed a freshly minted client id through
//! the regular delivery pipeline, so the very first frame a client parses
//! has the same shape as every later message.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{SplitSink, StreamExt};
use futures::SinkExt;
use metrics::counter;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tracing::{debug, info, warn};
use uuid::Uuid;

use pombo_common::PomboError;
use pombo_common::error::SUCCESS;
use pombo_core::socket::ClientSocket;
use pombo_core::{AccountService, ClientConnection, ClientIdCodec, ConnectionManager,
    OutboundMessage};

/// Write half of a client's WebSocket, behind the core's socket seam.
pub struct WsClientSocket {
    sink: tokio::sync::Mutex<SplitSink<WebSocketStream<TcpStream>, Message>>,
}

impl WsClientSocket {
    fn new(sink: SplitSink<WebSocketStream<TcpStream>, Message>) -> Self {
        Self {
            sink: tokio::sync::Mutex::new(sink),
        }
    }
}

#[async_trait::async_trait]
impl ClientSocket for WsClientSocket {
    async fn send_text(&self, text: String) -> Result<(), PomboError> {
        let mut sink = self.sink.lock().await;
        sink.send(Message::Text(text))
            .await
            .map_err(|e| PomboError::NetworkError(e.to_string()))
    }

    async fn ping(&self, deadline: Duration) -> Result<(), PomboError> {
        let probe = async {
            let mut sink = self.sink.lock().await;
            sink.send(Message::Ping(Vec::new())).await
        };
        match tokio::time::timeout(deadline, probe).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(PomboError::NetworkError(e.to_string())),
            Err(_) => Err(PomboError::NetworkError("ping deadline exceeded".into())),
        }
    }

    async fn close(&self) {
        let mut sink = self.sink.lock().await;
        let _ = sink.send(Message::Close(None)).await;
        let _ = sink.close().await;
    }
}

pub struct WsServer {
    bind_address: String,
    local_address: String,
    account: Arc<AccountService>,
    manager: Arc<ConnectionManager>,
    codec: Arc<ClientIdCodec>,
}

impl WsServer {
    pub fn new(
        bind_address: String,
        local_address: String,
        account: Arc<AccountService>,
        manager: Arc<ConnectionManager>,
        codec: Arc<ClientIdCodec>,
    ) -> Arc<Self> {
        Arc::new(Self {
            bind_address,
            local_address,
            account,
            manager,
            codec,
        })
    }

    /// Accept loop; one task per connection.
    pub async fn run(self: Arc<Self>) -> std::io::Result<()> {
        let listener = TcpListener::bind(&self.bind_address).await?;
        info!(address = %self.bind_address, "WebSocket endpoint listening");

        loop {
            match listener.accept().await {
                Ok((stream, peer_addr)) => {
                    let server = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = server.handle_socket(stream, peer_addr).await {
                            debug!(peer = %peer_addr, error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => {
                    warn!(error = %e, "accept failed");
                }
            }
        }
    }

    async fn handle_socket(
        &self,
        stream: TcpStream,
        peer_addr: SocketAddr,
    ) -> Result<(), PomboError> {
        let mut request_uri = None;
        let ws = accept_hdr_async(stream, |req: &Request, resp: Response| {
            request_uri = Some(req.uri().clone());
            Ok(resp)
        })
        .await
        .map_err(|e| PomboError::NetworkError(e.to_string()))?;

        let system_id = request_uri
            .as_ref()
            .and_then(|uri| uri.query())
            .and_then(|query| {
                url::form_urlencoded::parse(query.as_bytes())
                    .find(|(key, _)| key == "systemId")
                    .map(|(_, value)| value.into_owned())
            })
            .unwrap_or_default();

        if system_id.is_empty() || !self.account.is_registered(&system_id).await {
            debug!(peer = %peer_addr, system_id = %system_id, "handshake rejected");
            let mut ws = ws;
            let _ = ws
                .close(Some(CloseFrame {
                    code: CloseCode::Policy,
                    reason: "systemId missing or not registered".into(),
                }))
                .await;
            return Ok(());
        }

        // The minted id embeds this node's internal RPC address so any
        // node can route to it without a lookup
        let client_id = self.codec.generate(&self.local_address)?;
        let (sink, mut frames) = ws.split();
        let socket = Arc::new(WsClientSocket::new(sink));
        let conn = Arc::new(ClientConnection::new(
            client_id.clone(),
            system_id.clone(),
            socket,
        ));
        self.manager.add(conn.clone());
        counter!("pombo_connections_accepted_total").increment(1);
        info!(
            peer = %peer_addr,
            system_id = %system_id,
            online = self.manager.count(),
            "client connected"
        );

        // Hand the client its id through the normal pipeline
        self.manager.enqueue_message(OutboundMessage {
            message_id: Uuid::new_v4().to_string(),
            client_id: client_id.clone(),
            send_user_id: String::new(),
            code: SUCCESS.code,
            msg: "connect success".to_string(),
            data: Some(client_id.clone()),
        });

        // Read loop: the gateway pushes, clients only answer control
        // frames or close
        while let Some(frame) = frames.next().await {
            match frame {
                Ok(Message::Close(_)) => break,
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
                Ok(_) => {}
                Err(e) => {
                    debug!(client_id = %client_id, error = %e, "read failed");
                    break;
                }
            }
        }

        self.manager.disconnect(conn).await;
        Ok(())
    }
}
