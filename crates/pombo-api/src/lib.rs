//! Request/response models shared by the Pombo admin surface and the
//! inter-node cluster RPC.

pub mod admin;
pub mod cluster;
pub mod model;

pub use model::{ApiResult, MessageFrame, OnlineList, failure, success};
