use axum::{
    extract::{Query, State},
    routing::{get, put},
    Json, Router,
};
use tracing::{info, instrument};

use crate::error::AppError;
use crate::state::AppState;

use super::dto::{ScopeQuery, SettingsUpdate};
use super::services::{self, SettingsMap};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/settings", get(get_settings).put(put_settings))
        .route("/settings/global", get(get_global).put(put_global))
}

#[instrument(skip(state))]
async fn get_settings(
    State(state): State<AppState>,
    Query(scope): Query<ScopeQuery>,
) -> Result<Json<SettingsMap>, AppError> {
    let settings = services::settings_for_scope(&state.db, scope.user_id).await?;
    Ok(Json(settings))
}

#[instrument(skip(state, updates))]
async fn put_settings(
    State(state): State<AppState>,
    Query(scope): Query<ScopeQuery>,
    Json(updates): Json<SettingsUpdate>,
) -> Result<Json<SettingsMap>, AppError> {
    info!(user_id = ?scope.user_id, count = updates.len(), "received settings update");
    let settings = services::update_settings(&state.db, scope.user_id, updates).await?;
    Ok(Json(settings))
}

#[instrument(skip(state))]
async fn get_global(State(state): State<AppState>) -> Result<Json<SettingsMap>, AppError> {
    let settings = services::global_settings(&state.db).await?;
    Ok(Json(settings))
}

#[instrument(skip(state, updates))]
async fn put_global(
    State(state): State<AppState>,
    Json(updates): Json<SettingsUpdate>,
) -> Result<Json<SettingsMap>, AppError> {
    info!(count = updates.len(), "received global settings update");
    let settings = services::update_settings(&state.db, None, updates).await?;
    Ok(Json(settings))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_query_parses_optional_user_id() {
        let q: ScopeQuery = serde_json::from_str("{}").unwrap();
        assert!(q.user_id.is_none());

        let uid = uuid::Uuid::new_v4();
        let q: ScopeQuery =
            serde_json::from_str(&format!(r#"{{"user_id": "{}"}}"#, uid)).unwrap();
        assert_eq!(q.user_id, Some(uid));
    }

    #[test]
    fn settings_map_serializes_null_values() {
        let mut map = SettingsMap::new();
        map.insert("ui.theme".into(), Some("dark".into()));
        map.insert("notification.sms".into(), None);

        let json = serde_json::to_value(&map).unwrap();
        assert_eq!(json["ui.theme"], "dark");
        assert!(json["notification.sms"].is_null());
    }
}
