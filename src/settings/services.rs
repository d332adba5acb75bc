use std::collections::HashMap;

use serde_json::Value;
use sqlx::PgPool;
use time::OffsetDateTime;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::AppError;
use crate::settings::repo::{self, Setting};

pub type SettingsMap = HashMap<String, Option<String>>;

/// Derives a category from the key prefix. Evaluated once, when a row is
/// first created; updates never re-classify.
pub(crate) fn categorize(key: &str) -> &'static str {
    if key.starts_with("notification.") {
        "notifications"
    } else if key.starts_with("ui.") {
        "user_interface"
    } else if key.starts_with("system.") {
        "system"
    } else {
        "general"
    }
}

/// JSON null stays null; everything else becomes its string form.
fn stringify(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn merge(global: Vec<Setting>, user: Vec<Setting>) -> SettingsMap {
    let mut out: SettingsMap = global
        .into_iter()
        .map(|s| (s.setting_key, s.setting_value))
        .collect();
    // user rows win key-for-key
    for s in user {
        out.insert(s.setting_key, s.setting_value);
    }
    out
}

/// Effective settings for a scope: global rows overlaid by the user's rows.
/// With no user the result is exactly the global set.
pub async fn settings_for_scope(
    db: &PgPool,
    user_id: Option<Uuid>,
) -> Result<SettingsMap, AppError> {
    let global = repo::find_by_scope(db, None).await?;
    let user = match user_id {
        Some(uid) => repo::find_by_scope(db, Some(uid)).await?,
        None => Vec::new(),
    };
    let merged = merge(global, user);
    debug!(user_id = ?user_id, count = merged.len(), "settings resolved");
    Ok(merged)
}

pub async fn global_settings(db: &PgPool) -> Result<SettingsMap, AppError> {
    settings_for_scope(db, None).await
}

/// Upserts every key in `updates` for the given scope inside one transaction,
/// then returns the fresh merged view for that scope. Callers always see the
/// resulting effective state, not just the keys they wrote.
pub async fn update_settings(
    db: &PgPool,
    user_id: Option<Uuid>,
    updates: HashMap<String, Value>,
) -> Result<SettingsMap, AppError> {
    let mut tx = db.begin().await?;
    let now = OffsetDateTime::now_utc();

    for (key, value) in &updates {
        let text = stringify(value);
        let kind = value_kind(value);

        match repo::find_one(&mut tx, user_id, key).await? {
            Some(existing) => {
                repo::update_value(&mut tx, existing.id, text.as_deref(), kind, now).await?;
            }
            None => {
                repo::insert(
                    &mut tx,
                    user_id,
                    key,
                    categorize(key),
                    text.as_deref(),
                    kind,
                    now,
                )
                .await?;
            }
        }
    }

    tx.commit().await?;
    info!(user_id = ?user_id, count = updates.len(), "settings updated");

    settings_for_scope(db, user_id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(user_id: Option<Uuid>, key: &str, value: Option<&str>) -> Setting {
        Setting {
            id: Uuid::new_v4(),
            user_id,
            category: categorize(key).to_string(),
            setting_key: key.to_string(),
            setting_value: value.map(String::from),
            setting_type: None,
            updated_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn categorizer_uses_key_prefixes() {
        assert_eq!(categorize("notification.email"), "notifications");
        assert_eq!(categorize("ui.theme"), "user_interface");
        assert_eq!(categorize("system.maintenance_mode"), "system");
        assert_eq!(categorize("default_page_size"), "general");
        // prefix match only, not substring
        assert_eq!(categorize("my.notification.email"), "general");
    }

    #[test]
    fn stringify_preserves_null_and_flattens_the_rest() {
        assert_eq!(stringify(&Value::Null), None);
        assert_eq!(stringify(&json!("dark")), Some("dark".into()));
        assert_eq!(stringify(&json!(true)), Some("true".into()));
        assert_eq!(stringify(&json!(25)), Some("25".into()));
    }

    #[test]
    fn value_kind_names_every_variant() {
        assert_eq!(value_kind(&Value::Null), "null");
        assert_eq!(value_kind(&json!(false)), "boolean");
        assert_eq!(value_kind(&json!(1.5)), "number");
        assert_eq!(value_kind(&json!("x")), "string");
        assert_eq!(value_kind(&json!([1])), "array");
        assert_eq!(value_kind(&json!({"a": 1})), "object");
    }

    #[test]
    fn user_rows_override_global_key_for_key() {
        let uid = Uuid::new_v4();
        let global = vec![
            row(None, "ui.theme", Some("light")),
            row(None, "notification.email", Some("true")),
        ];
        let user = vec![row(Some(uid), "ui.theme", Some("dark"))];

        let merged = merge(global, user);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged["ui.theme"].as_deref(), Some("dark"));
        assert_eq!(merged["notification.email"].as_deref(), Some("true"));
    }

    #[test]
    fn no_user_rows_means_the_pure_global_set() {
        let global = vec![row(None, "ui.theme", Some("light"))];
        let merged = merge(global, Vec::new());
        assert_eq!(merged.len(), 1);
        assert_eq!(merged["ui.theme"].as_deref(), Some("light"));
    }

    #[test]
    fn user_can_override_with_null() {
        let uid = Uuid::new_v4();
        let global = vec![row(None, "ui.theme", Some("light"))];
        let user = vec![row(Some(uid), "ui.theme", None)];
        let merged = merge(global, user);
        assert_eq!(merged["ui.theme"], None);
    }
}
