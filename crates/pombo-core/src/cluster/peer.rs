//! Remote-call collaborator.
//!
//! Point-to-point calls against a specific peer's internal `/cluster`
//! routes. Calls are synchronous from the router's perspective and carry
//! no retry: an unreachable peer is the caller's signal to log and move
//! on, delivery being best-effort.

use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use pombo_api::ApiResult;
use pombo_api::cluster::{
    PeerBindRequest, PeerCloseRequest, PeerGroupMessageRequest, PeerOnlineListRequest,
    PeerOnlineListResponse, PeerSendRequest, PeerSystemMessageRequest,
};
use pombo_common::PomboError;
use pombo_common::error::SUCCESS;

#[async_trait::async_trait]
pub trait PeerClient: Send + Sync {
    async fn send_to_client(&self, address: &str, req: &PeerSendRequest)
    -> Result<(), PomboError>;

    async fn close_client(&self, address: &str, req: &PeerCloseRequest)
    -> Result<(), PomboError>;

    async fn bind_to_group(&self, address: &str, req: &PeerBindRequest)
    -> Result<(), PomboError>;

    async fn send_to_group(
        &self,
        address: &str,
        req: &PeerGroupMessageRequest,
    ) -> Result<(), PomboError>;

    async fn send_to_system(
        &self,
        address: &str,
        req: &PeerSystemMessageRequest,
    ) -> Result<(), PomboError>;

    /// The peer's local slice of a group's membership.
    async fn online_list(
        &self,
        address: &str,
        req: &PeerOnlineListRequest,
    ) -> Result<Vec<String>, PomboError>;
}

/// HTTP implementation of the peer collaborator.
pub struct HttpPeerClient {
    http: reqwest::Client,
}

impl HttpPeerClient {
    pub fn new(timeout: Duration) -> Result<Self, PomboError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PomboError::NetworkError(e.to_string()))?;
        Ok(Self { http })
    }

    async fn post<B: Serialize + ?Sized, R: DeserializeOwned>(
        &self,
        address: &str,
        path: &str,
        body: &B,
    ) -> Result<R, PomboError> {
        let url = format!("http://{}/cluster/{}", address, path);
        debug!(url = %url, "peer call");

        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| PomboError::NetworkError(format!("{}: {}", address, e)))?;

        if !response.status().is_success() {
            return Err(PomboError::NetworkError(format!(
                "{} answered {}",
                address,
                response.status()
            )));
        }

        let envelope: ApiResult<R> = response
            .json()
            .await
            .map_err(|e| PomboError::NetworkError(format!("{}: {}", address, e)))?;

        if envelope.code != SUCCESS.code {
            return Err(PomboError::NetworkError(format!(
                "{} rejected call: {}",
                address, envelope.message
            )));
        }
        Ok(envelope.data)
    }

    async fn post_unit<B: Serialize + ?Sized>(
        &self,
        address: &str,
        path: &str,
        body: &B,
    ) -> Result<(), PomboError> {
        let _: Option<serde_json::Value> = self.post(address, path, body).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl PeerClient for HttpPeerClient {
    async fn send_to_client(
        &self,
        address: &str,
        req: &PeerSendRequest,
    ) -> Result<(), PomboError> {
        self.post_unit(address, "send_to_client", req).await
    }

    async fn close_client(
        &self,
        address: &str,
        req: &PeerCloseRequest,
    ) -> Result<(), PomboError> {
        self.post_unit(address, "close_client", req).await
    }

    async fn bind_to_group(
        &self,
        address: &str,
        req: &PeerBindRequest,
    ) -> Result<(), PomboError> {
        self.post_unit(address, "bind_to_group", req).await
    }

    async fn send_to_group(
        &self,
        address: &str,
        req: &PeerGroupMessageRequest,
    ) -> Result<(), PomboError> {
        self.post_unit(address, "send_to_group", req).await
    }

    async fn send_to_system(
        &self,
        address: &str,
        req: &PeerSystemMessageRequest,
    ) -> Result<(), PomboError> {
        self.post_unit(address, "send_to_system", req).await
    }

    async fn online_list(
        &self,
        address: &str,
        req: &PeerOnlineListRequest,
    ) -> Result<Vec<String>, PomboError> {
        let response: PeerOnlineListResponse = self.post(address, "online_list", req).await?;
        Ok(response.list)
    }
}
