//! Admin API request bodies.
//!
//! All bodies are JSON with camelCase field names. Required fields carry
//! `validator` constraints and are checked before any state is touched.

use serde::Deserialize;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[validate(length(min = 1, message = "systemId is required"))]
    pub system_id: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SendToClientRequest {
    #[validate(length(min = 1, message = "clientId is required"))]
    pub client_id: String,
    #[serde(default)]
    pub send_user_id: String,
    pub code: i32,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub data: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SendToClientsRequest {
    #[validate(length(min = 1, message = "clientIds is required"))]
    pub client_ids: Vec<String>,
    #[serde(default)]
    pub send_user_id: String,
    pub code: i32,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub data: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SendToGroupRequest {
    #[validate(length(min = 1, message = "groupName is required"))]
    pub group_name: String,
    #[serde(default)]
    pub send_user_id: String,
    pub code: i32,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub data: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SendToSystemRequest {
    #[serde(default)]
    pub send_user_id: String,
    pub code: i32,
    #[serde(default)]
    pub msg: String,
    #[serde(default)]
    pub data: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BindToGroupRequest {
    #[validate(length(min = 1, message = "groupName is required"))]
    pub group_name: String,
    #[validate(length(min = 1, message = "clientId is required"))]
    pub client_id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub extend: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct OnlineListRequest {
    #[validate(length(min = 1, message = "groupName is required"))]
    pub group_name: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CloseClientRequest {
    #[validate(length(min = 1, message = "clientId is required"))]
    pub client_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_request_validation() {
        let ok = RegisterRequest {
            system_id: "sys1".to_string(),
        };
        assert!(ok.validate().is_ok());

        let empty = RegisterRequest {
            system_id: String::new(),
        };
        assert!(empty.validate().is_err());
    }

    #[test]
    fn test_send_request_defaults() {
        let req: SendToClientRequest =
            serde_json::from_str(r#"{"clientId":"c1","code":200}"#).unwrap();
        assert_eq!(req.client_id, "c1");
        assert_eq!(req.send_user_id, "");
        assert_eq!(req.msg, "");
        assert!(req.data.is_none());
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_send_to_clients_requires_targets() {
        let req: SendToClientsRequest =
            serde_json::from_str(r#"{"clientIds":[],"code":200}"#).unwrap();
        assert!(req.validate().is_err());
    }
}
