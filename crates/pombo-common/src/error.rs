//! Error types and error codes for Pombo
//!
//! This module defines:
//! - `PomboError`: Application-specific error enum
//! - `ErrorCode`: Structured error codes for API responses

use serde::{Deserialize, Serialize};

/// Application-specific error types
#[derive(thiserror::Error, Debug)]
pub enum PomboError {
    #[error("caused: {0}")]
    IllegalArgument(String),

    #[error("system '{0}' already registered")]
    SystemAlreadyRegistered(String),

    #[error("system '{0}' not registered")]
    SystemNotRegistered(String),

    #[error("client '{0}' not found")]
    ClientNotFound(String),

    #[error("malformed client id: {0}")]
    MalformedClientId(String),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("coordination store error: {0}")]
    StoreError(String),

    #[error("network error: {0}")]
    NetworkError(String),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("internal error: {0}")]
    InternalError(String),
}

impl PomboError {
    /// Map the error onto a structured API error code.
    pub fn code(&self) -> i32 {
        match self {
            PomboError::IllegalArgument(_) => PARAMETER_MISSING.code,
            PomboError::SystemAlreadyRegistered(_) => SYSTEM_ALREADY_REGISTERED.code,
            PomboError::SystemNotRegistered(_) => SYSTEM_NOT_REGISTERED.code,
            PomboError::ClientNotFound(_) => CLIENT_NOT_FOUND.code,
            PomboError::MalformedClientId(_) => MALFORMED_CLIENT_ID.code,
            PomboError::ConnectionClosed => CLIENT_NOT_FOUND.code,
            PomboError::StoreError(_) => STORE_ERROR.code,
            PomboError::NetworkError(_) => PEER_UNREACHABLE.code,
            PomboError::ConfigError(_) | PomboError::InternalError(_) => INTERNAL_ERROR.code,
        }
    }
}

/// Error code structure for API responses
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ErrorCode<'a> {
    pub code: i32,
    pub message: &'a str,
}

// General success and error codes
pub const SUCCESS: ErrorCode<'static> = ErrorCode {
    code: 0,
    message: "success",
};

pub const PARAMETER_MISSING: ErrorCode<'static> = ErrorCode {
    code: 10000,
    message: "parameter missing",
};

pub const ACCESS_DENIED: ErrorCode<'static> = ErrorCode {
    code: 10001,
    message: "access denied",
};

pub const INTERNAL_ERROR: ErrorCode<'static> = ErrorCode {
    code: 10002,
    message: "internal error",
};

// Account errors
pub const SYSTEM_ALREADY_REGISTERED: ErrorCode<'static> = ErrorCode {
    code: 20001,
    message: "system already registered",
};

pub const SYSTEM_NOT_REGISTERED: ErrorCode<'static> = ErrorCode {
    code: 20002,
    message: "system not registered",
};

// Routing errors
pub const CLIENT_NOT_FOUND: ErrorCode<'static> = ErrorCode {
    code: 21001,
    message: "client not found",
};

pub const MALFORMED_CLIENT_ID: ErrorCode<'static> = ErrorCode {
    code: 21002,
    message: "malformed client id",
};

// Cluster errors
pub const STORE_ERROR: ErrorCode<'static> = ErrorCode {
    code: 30001,
    message: "coordination store error",
};

pub const PEER_UNREACHABLE: ErrorCode<'static> = ErrorCode {
    code: 30002,
    message: "peer unreachable",
};
