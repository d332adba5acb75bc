use serde::Deserialize;
use std::collections::HashMap;
use uuid::Uuid;

/// Optional scope selector. Absent `user_id` means the global scope.
#[derive(Debug, Deserialize)]
pub struct ScopeQuery {
    pub user_id: Option<Uuid>,
}

/// Raw update payload: arbitrary keys mapped to JSON values, stringified by
/// the service before persisting.
pub type SettingsUpdate = HashMap<String, serde_json::Value>;
