use pombo_common::error::SUCCESS;
use serde::{Deserialize, Serialize};

/// Response envelope used by every admin and cluster endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResult<T> {
    pub code: i32,
    pub message: String,
    pub data: T,
}

pub fn success<T>(data: T) -> ApiResult<T> {
    ApiResult::<T> {
        code: SUCCESS.code,
        message: SUCCESS.message.to_string(),
        data,
    }
}

pub fn failure<T>(code: i32, message: String, data: T) -> ApiResult<T> {
    ApiResult::<T> {
        code,
        message,
        data,
    }
}

/// The frame written to a client socket for every delivered message.
///
/// Also pushed once at connection setup with the freshly minted client id
/// in `data`, so the wire format a client has to parse is uniform.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageFrame {
    pub message_id: String,
    pub send_user_id: String,
    pub code: i32,
    pub msg: String,
    pub data: Option<String>,
}

/// Merged result of an online-list query over the whole cluster.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OnlineList {
    pub count: usize,
    pub list: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_envelope() {
        let result = success("ok");
        assert_eq!(result.code, 0);
        assert_eq!(result.message, "success");
        assert_eq!(result.data, "ok");
    }

    #[test]
    fn test_message_frame_serializes_camel_case() {
        let frame = MessageFrame {
            message_id: "m1".to_string(),
            send_user_id: "u1".to_string(),
            code: 0,
            msg: "hello".to_string(),
            data: None,
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert!(json.get("messageId").is_some());
        assert!(json.get("sendUserId").is_some());
    }
}
