//! Inter-node RPC bodies.
//!
//! These travel between peers on the internal `/cluster` routes. Each node
//! answers only for connections it owns locally, so every body carries
//! enough context for the receiving node to act without further lookups.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerSendRequest {
    pub message_id: String,
    pub client_id: String,
    pub send_user_id: String,
    pub code: i32,
    pub msg: String,
    pub data: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerCloseRequest {
    pub client_id: String,
    pub system_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerBindRequest {
    pub system_id: String,
    pub group_name: String,
    pub client_id: String,
    pub user_id: String,
    pub extend: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerGroupMessageRequest {
    pub system_id: String,
    pub group_name: String,
    pub message_id: String,
    pub send_user_id: String,
    pub code: i32,
    pub msg: String,
    pub data: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerSystemMessageRequest {
    pub system_id: String,
    pub message_id: String,
    pub send_user_id: String,
    pub code: i32,
    pub msg: String,
    pub data: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerOnlineListRequest {
    pub system_id: String,
    pub group_name: String,
}

/// A peer's local slice of a group's membership.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerOnlineListResponse {
    pub list: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_send_roundtrip() {
        let req = PeerSendRequest {
            message_id: "m1".to_string(),
            client_id: "c1".to_string(),
            send_user_id: "u1".to_string(),
            code: 200,
            msg: "hello".to_string(),
            data: Some("payload".to_string()),
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"clientId\""));
        let parsed: PeerSendRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.client_id, "c1");
        assert_eq!(parsed.data.as_deref(), Some("payload"));
    }
}
