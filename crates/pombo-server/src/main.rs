//! Main entry point for the Pombo gateway server.
//!
//! Wires configuration, logging, the core services, cluster participation,
//! and the WebSocket/HTTP listeners, then runs until a shutdown signal.

use std::sync::Arc;
use std::time::Duration;

use pombo_common::PomboError;
use pombo_common::crypto::SecretBox;
use pombo_core::cluster::{HttpPeerClient, LeaseRegistry, PeerClient, ServerMemberManager};
use pombo_core::store::{CoordinationStore, EtcdStore};
use pombo_core::{
    AccountService, ClientIdCodec, Configuration, ConnectionManager, DeliveryPipeline,
    HeartbeatConfig, HeartbeatMonitor, Router, RouterCluster,
};
use pombo_server::model::AppState;
use pombo_server::startup::{self, GracefulShutdown, LoggingConfig};
use pombo_server::ws::WsServer;
use tracing::{error, info, warn};

const STORE_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[actix_web::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize configuration and logging
    let configuration = Configuration::new()?;
    let logging_config = LoggingConfig::from_config(
        configuration.log_dir(),
        configuration.log_console(),
        configuration.log_file(),
        configuration.log_level(),
    );
    let _logging_guard = startup::init_logging(&logging_config)?;

    pombo_server::metrics::init_metrics();

    let local_address = configuration.local_address();
    let server_address = configuration.server_address();
    let server_port = configuration.server_port();
    let ws_port = configuration.ws_port();
    let is_cluster = configuration.is_cluster();

    // Coordination store: fatal at startup if configured but unreachable
    let store: Option<Arc<dyn CoordinationStore>> = if is_cluster {
        info!(
            endpoints = ?configuration.etcd_endpoints(),
            "cluster mode, connecting coordination store"
        );
        let store = EtcdStore::connect(configuration.etcd_endpoints(), STORE_CONNECT_TIMEOUT)
            .await
            .map_err(|e| {
                error!(error = %e, "coordination store unreachable");
                e
            })?;
        Some(Arc::new(store))
    } else {
        info!("standalone mode, no coordination store configured");
        None
    };

    // Client id codec: cluster nodes must share the key, standalone can
    // mint an ephemeral one
    let codec = Arc::new(match configuration.cluster_secret() {
        Some(secret) => ClientIdCodec::from_base64_key(&secret)?,
        None if is_cluster => {
            return Err(Box::new(PomboError::ConfigError(
                "cluster.secret is required in cluster mode".into(),
            )) as Box<dyn std::error::Error>);
        }
        None => ClientIdCodec::new(&SecretBox::generate_key()),
    });

    let account = Arc::new(AccountService::new(store.clone()));

    // Connection registry + delivery pipeline + heartbeat
    let manager = ConnectionManager::new();
    let pipeline = DeliveryPipeline::new(manager.clone(), configuration.delivery_queue_size());
    manager.set_delivery(pipeline.handle());
    manager.start();
    pipeline.start();

    let heartbeat = HeartbeatMonitor::new(
        manager.clone(),
        HeartbeatConfig {
            interval: configuration.heartbeat_interval(),
            probe_timeout: configuration.heartbeat_probe_timeout(),
        },
    );
    heartbeat.start().await;

    // Cluster participation: register self under a lease, then build the
    // membership view
    let mut cluster_parts: Option<(Arc<LeaseRegistry>, Arc<ServerMemberManager>)> = None;
    let router_cluster = if let Some(store) = &store {
        let lease = Arc::new(LeaseRegistry::new(
            store.clone(),
            local_address.clone(),
            configuration.lease_ttl(),
        ));
        lease.register().await?;

        let members = ServerMemberManager::new(store.clone(), local_address.clone());
        let addresses = members.bootstrap().await?;
        info!(members = addresses.len(), "cluster membership bootstrapped");
        members.start().await?;

        let peer: Arc<dyn PeerClient> =
            Arc::new(HttpPeerClient::new(configuration.peer_timeout())?);

        cluster_parts = Some((lease, members.clone()));
        Some(RouterCluster { members, peer })
    } else {
        None
    };

    let router = Arc::new(Router::new(
        manager.clone(),
        codec.clone(),
        local_address.clone(),
        router_cluster,
    ));

    let app_state = Arc::new(AppState {
        configuration: configuration.clone(),
        account: account.clone(),
        manager: manager.clone(),
        router,
    });

    // WebSocket endpoint on its own listener
    let ws_server = WsServer::new(
        format!("{}:{}", server_address, ws_port),
        local_address.clone(),
        account,
        manager,
        codec,
    );
    let ws_handle = tokio::spawn(ws_server.run());

    // Admin API + cluster RPC
    info!(
        address = %server_address,
        port = server_port,
        "starting HTTP server"
    );
    let http = startup::http_server(app_state, server_address, server_port)?;

    let shutdown_signal = startup::wait_for_shutdown_signal().await;
    let graceful_shutdown = GracefulShutdown::new(shutdown_signal, Duration::from_secs(5));

    tokio::select! {
        result = http => {
            if let Err(e) = result {
                error!("HTTP server error: {}", e);
            }
        }
        _ = graceful_shutdown.wait_for_shutdown() => {
            info!("servers shutting down gracefully");
        }
    }

    // Cleanup: leave the cluster first so peers stop routing here
    if let Some((lease, members)) = cluster_parts {
        info!("revoking cluster registration...");
        members.stop();
        lease.revoke().await;
    }
    heartbeat.stop().await;
    ws_handle.abort();
    if let Err(e) = ws_handle.await
        && !e.is_cancelled()
    {
        warn!(error = %e, "WebSocket listener ended abnormally");
    }

    info!("pombo server shutdown complete");
    Ok(())
}
