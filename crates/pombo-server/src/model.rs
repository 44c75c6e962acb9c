//! Shared application state.

use std::sync::Arc;

use pombo_core::{AccountService, Configuration, ConnectionManager, Router};

/// State handed to every HTTP handler.
pub struct AppState {
    pub configuration: Configuration,
    pub account: Arc<AccountService>,
    pub manager: Arc<ConnectionManager>,
    pub router: Arc<Router>,
}

/// Header carrying the caller's system id on admin requests.
pub const SYSTEM_ID_HEADER: &str = "SystemId";
