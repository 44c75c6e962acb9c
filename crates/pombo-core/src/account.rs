//! Account (system/tenant) registration.
//!
//! Every caller-facing operation is scoped to a registered system id. In
//! cluster mode the uniqueness record is shared through the coordination
//! store with an atomic conditional put; standalone keeps it in-process.

use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::info;

use pombo_common::{PomboError, is_valid};

use crate::store::CoordinationStore;

pub const ACCOUNT_KEY_PREFIX: &str = "/pombo/accounts/";

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountInfo {
    pub system_id: String,
    pub register_time: i64,
}

pub struct AccountService {
    store: Option<Arc<dyn CoordinationStore>>,
    local: DashMap<String, AccountInfo>,
}

impl AccountService {
    pub fn new(store: Option<Arc<dyn CoordinationStore>>) -> Self {
        Self {
            store,
            local: DashMap::new(),
        }
    }

    /// Register a system id. Rejected synchronously before any state
    /// mutation on duplicates; the check-and-insert is atomic in both
    /// modes, so concurrent registrations cannot both succeed.
    pub async fn register(&self, system_id: &str) -> Result<(), PomboError> {
        if system_id.is_empty() {
            return Err(PomboError::IllegalArgument("systemId is required".into()));
        }
        if !is_valid(system_id) {
            return Err(PomboError::IllegalArgument(format!(
                "systemId '{}' contains invalid characters",
                system_id
            )));
        }

        let info = AccountInfo {
            system_id: system_id.to_string(),
            register_time: chrono::Utc::now().timestamp(),
        };

        match &self.store {
            Some(store) => {
                let value = serde_json::to_string(&info)
                    .map_err(|e| PomboError::InternalError(e.to_string()))?;
                let key = format!("{}{}", ACCOUNT_KEY_PREFIX, system_id);
                let created = store.create_if_absent(&key, &value).await?;
                if !created {
                    return Err(PomboError::SystemAlreadyRegistered(system_id.to_string()));
                }
            }
            None => match self.local.entry(system_id.to_string()) {
                dashmap::mapref::entry::Entry::Occupied(_) => {
                    return Err(PomboError::SystemAlreadyRegistered(system_id.to_string()));
                }
                dashmap::mapref::entry::Entry::Vacant(entry) => {
                    entry.insert(info);
                }
            },
        }

        info!(system_id = %system_id, "system registered");
        Ok(())
    }

    pub async fn is_registered(&self, system_id: &str) -> bool {
        if system_id.is_empty() {
            return false;
        }
        match &self.store {
            Some(store) => {
                let key = format!("{}{}", ACCOUNT_KEY_PREFIX, system_id);
                matches!(store.get(&key).await, Ok(Some(_)))
            }
            None => self.local.contains_key(system_id),
        }
    }
}
