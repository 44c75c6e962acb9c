//! Routing layer.
//!
//! Decides, per operation, whether the target lives in this process or
//! behind a peer, without a network round trip: the owning address is
//! embedded in the client id itself. Group and system operations fan out
//! to every known member because group state is sharded across nodes.

use std::sync::Arc;

use tracing::warn;
use uuid::Uuid;

use pombo_api::OnlineList;
use pombo_api::cluster::{
    PeerBindRequest, PeerCloseRequest, PeerGroupMessageRequest, PeerOnlineListRequest,
    PeerSendRequest, PeerSystemMessageRequest,
};
use pombo_common::PomboError;

use crate::cluster::{PeerClient, ServerMemberManager};
use crate::connection::ConnectionManager;
use crate::delivery::OutboundMessage;
use crate::resolver::OwnerResolver;

/// Cluster collaborators; absent in standalone deployments.
#[derive(Clone)]
pub struct RouterCluster {
    pub members: Arc<ServerMemberManager>,
    pub peer: Arc<dyn PeerClient>,
}

pub struct Router {
    manager: Arc<ConnectionManager>,
    resolver: Arc<dyn OwnerResolver>,
    local_address: String,
    cluster: Option<RouterCluster>,
}

impl Router {
    pub fn new(
        manager: Arc<ConnectionManager>,
        resolver: Arc<dyn OwnerResolver>,
        local_address: String,
        cluster: Option<RouterCluster>,
    ) -> Self {
        Self {
            manager,
            resolver,
            local_address,
            cluster,
        }
    }

    /// Resolve a target to `None` (local) or `Some(peer address)`.
    /// Standalone deployments resolve local unconditionally.
    fn resolve_owner(&self, client_id: &str) -> Result<Option<String>, PomboError> {
        if self.cluster.is_none() {
            return Ok(None);
        }
        let address = self.resolver.resolve(client_id)?;
        if address == self.local_address {
            Ok(None)
        } else {
            Ok(Some(address))
        }
    }

    /// Send one message to one client. Returns the generated message id;
    /// the id is a tracking token, not a delivery acknowledgement.
    pub async fn send_to_client(
        &self,
        client_id: &str,
        send_user_id: &str,
        code: i32,
        msg: &str,
        data: Option<&str>,
    ) -> Result<String, PomboError> {
        let message_id = Uuid::new_v4().to_string();
        self.dispatch_send(&message_id, client_id, send_user_id, code, msg, data)
            .await?;
        Ok(message_id)
    }

    /// Send the same message to several clients under one message id.
    /// A malformed id in the batch is logged and skipped, the rest are
    /// still dispatched.
    pub async fn send_to_clients(
        &self,
        client_ids: &[String],
        send_user_id: &str,
        code: i32,
        msg: &str,
        data: Option<&str>,
    ) -> Result<String, PomboError> {
        let message_id = Uuid::new_v4().to_string();
        for client_id in client_ids {
            if let Err(e) = self
                .dispatch_send(&message_id, client_id, send_user_id, code, msg, data)
                .await
            {
                warn!(client_id = %client_id, error = %e, "skipping undeliverable target");
            }
        }
        Ok(message_id)
    }

    async fn dispatch_send(
        &self,
        message_id: &str,
        client_id: &str,
        send_user_id: &str,
        code: i32,
        msg: &str,
        data: Option<&str>,
    ) -> Result<(), PomboError> {
        match self.resolve_owner(client_id)? {
            None => {
                self.manager.enqueue_message(OutboundMessage {
                    message_id: message_id.to_string(),
                    client_id: client_id.to_string(),
                    send_user_id: send_user_id.to_string(),
                    code,
                    msg: msg.to_string(),
                    data: data.map(|d| d.to_string()),
                });
            }
            Some(address) => {
                let Some(cluster) = &self.cluster else {
                    return Ok(());
                };
                let request = PeerSendRequest {
                    message_id: message_id.to_string(),
                    client_id: client_id.to_string(),
                    send_user_id: send_user_id.to_string(),
                    code,
                    msg: msg.to_string(),
                    data: data.map(|d| d.to_string()),
                };
                // Best-effort: an unreachable peer is logged, never retried
                if let Err(e) = cluster.peer.send_to_client(&address, &request).await {
                    warn!(peer = %address, client_id = %client_id, error = %e, "peer delivery failed");
                }
            }
        }
        Ok(())
    }

    /// Close a client's connection wherever it lives. The owning node only
    /// honors the close when the system id matches the connection's.
    pub async fn close_client(&self, client_id: &str, system_id: &str) -> Result<(), PomboError> {
        match self.resolve_owner(client_id)? {
            None => {
                if let Some(conn) = self.manager.get_by_client_id(client_id)
                    && conn.system_id() == system_id
                {
                    self.manager.disconnect(conn).await;
                }
                Ok(())
            }
            Some(address) => {
                let Some(cluster) = &self.cluster else {
                    return Ok(());
                };
                let request = PeerCloseRequest {
                    client_id: client_id.to_string(),
                    system_id: system_id.to_string(),
                };
                if let Err(e) = cluster.peer.close_client(&address, &request).await {
                    warn!(peer = %address, client_id = %client_id, error = %e, "peer close failed");
                }
                Ok(())
            }
        }
    }

    /// Bind a client to a group on its owning node.
    pub async fn bind_to_group(
        &self,
        system_id: &str,
        group_name: &str,
        client_id: &str,
        user_id: &str,
        extend: &str,
    ) -> Result<(), PomboError> {
        match self.resolve_owner(client_id)? {
            None => {
                let conn = self
                    .manager
                    .get_by_client_id(client_id)
                    .ok_or_else(|| PomboError::ClientNotFound(client_id.to_string()))?;
                self.manager
                    .add_to_local_group(system_id, group_name, &conn, user_id, extend);
                Ok(())
            }
            Some(address) => {
                let Some(cluster) = &self.cluster else {
                    return Ok(());
                };
                let request = PeerBindRequest {
                    system_id: system_id.to_string(),
                    group_name: group_name.to_string(),
                    client_id: client_id.to_string(),
                    user_id: user_id.to_string(),
                    extend: extend.to_string(),
                };
                if let Err(e) = cluster.peer.bind_to_group(&address, &request).await {
                    warn!(peer = %address, client_id = %client_id, error = %e, "peer bind failed");
                }
                Ok(())
            }
        }
    }

    /// Broadcast a message to every member of a group. No node holds the
    /// global membership, so every peer answers for its local slice.
    pub async fn send_to_group(
        &self,
        system_id: &str,
        group_name: &str,
        send_user_id: &str,
        code: i32,
        msg: &str,
        data: Option<&str>,
    ) -> Result<String, PomboError> {
        let message_id = Uuid::new_v4().to_string();

        // Local slice is always served directly
        self.manager.send_to_local_group(
            system_id,
            group_name,
            &message_id,
            send_user_id,
            code,
            msg,
            data,
        );

        if let Some(cluster) = &self.cluster {
            let request = PeerGroupMessageRequest {
                system_id: system_id.to_string(),
                group_name: group_name.to_string(),
                message_id: message_id.clone(),
                send_user_id: send_user_id.to_string(),
                code,
                msg: msg.to_string(),
                data: data.map(|d| d.to_string()),
            };
            self.fan_out(cluster, move |peer, address| {
                let request = request.clone();
                async move { peer.send_to_group(&address, &request).await }
            })
            .await;
        }

        Ok(message_id)
    }

    /// Broadcast a message to every connection of a system.
    pub async fn send_to_system(
        &self,
        system_id: &str,
        send_user_id: &str,
        code: i32,
        msg: &str,
        data: Option<&str>,
    ) -> Result<String, PomboError> {
        let message_id = Uuid::new_v4().to_string();

        self.manager
            .send_to_local_system(system_id, &message_id, send_user_id, code, msg, data);

        if let Some(cluster) = &self.cluster {
            let request = PeerSystemMessageRequest {
                system_id: system_id.to_string(),
                message_id: message_id.clone(),
                send_user_id: send_user_id.to_string(),
                code,
                msg: msg.to_string(),
                data: data.map(|d| d.to_string()),
            };
            self.fan_out(cluster, move |peer, address| {
                let request = request.clone();
                async move { peer.send_to_system(&address, &request).await }
            })
            .await;
        }

        Ok(message_id)
    }

    /// Merge the group membership scattered across the cluster.
    pub async fn online_list(&self, system_id: &str, group_name: &str) -> OnlineList {
        let mut list = self.manager.local_group_clients(system_id, group_name);

        if let Some(cluster) = &self.cluster {
            let request = PeerOnlineListRequest {
                system_id: system_id.to_string(),
                group_name: group_name.to_string(),
            };

            let mut handles = Vec::new();
            for address in cluster.members.all_addresses() {
                if address == self.local_address {
                    continue;
                }
                let peer = cluster.peer.clone();
                let request = request.clone();
                handles.push(tokio::spawn(async move {
                    let result = peer.online_list(&address, &request).await;
                    (address, result)
                }));
            }

            for handle in handles {
                if let Ok((address, result)) = handle.await {
                    match result {
                        Ok(slice) => list.extend(slice),
                        Err(e) => warn!(peer = %address, error = %e, "online list query failed"),
                    }
                }
            }
        }

        OnlineList {
            count: list.len(),
            list,
        }
    }

    /// Issue one peer operation per non-local member, in parallel.
    async fn fan_out<F, Fut>(&self, cluster: &RouterCluster, op: F)
    where
        F: Fn(Arc<dyn PeerClient>, String) -> Fut,
        Fut: std::future::Future<Output = Result<(), PomboError>> + Send + 'static,
    {
        let mut handles = Vec::new();
        for address in cluster.members.all_addresses() {
            if address == self.local_address {
                continue;
            }
            let future = op(cluster.peer.clone(), address.clone());
            handles.push(tokio::spawn(async move {
                (address, future.await)
            }));
        }

        for handle in handles {
            if let Ok((address, Err(e))) = handle.await {
                warn!(peer = %address, error = %e, "broadcast to peer failed");
            }
        }
    }
}
