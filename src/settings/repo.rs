use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

/// One settings row. `user_id = NULL` marks a global default; a non-null
/// `user_id` is a per-user override of the same key.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Setting {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub category: String,
    pub setting_key: String,
    pub setting_value: Option<String>,
    pub setting_type: Option<String>,
    pub updated_at: OffsetDateTime,
}

const COLUMNS: &str = "id, user_id, category, setting_key, setting_value, setting_type, updated_at";

/// All rows for one scope. `IS NOT DISTINCT FROM` folds the global
/// (NULL user_id) and per-user cases into a single query.
pub async fn find_by_scope(db: &PgPool, user_id: Option<Uuid>) -> Result<Vec<Setting>, sqlx::Error> {
    let sql = format!("SELECT {COLUMNS} FROM settings WHERE user_id IS NOT DISTINCT FROM $1");
    sqlx::query_as::<_, Setting>(&sql)
        .bind(user_id)
        .fetch_all(db)
        .await
}

pub async fn find_one(
    conn: &mut PgConnection,
    user_id: Option<Uuid>,
    key: &str,
) -> Result<Option<Setting>, sqlx::Error> {
    let sql = format!(
        "SELECT {COLUMNS} FROM settings WHERE user_id IS NOT DISTINCT FROM $1 AND setting_key = $2"
    );
    sqlx::query_as::<_, Setting>(&sql)
        .bind(user_id)
        .bind(key)
        .fetch_optional(&mut *conn)
        .await
}

pub async fn insert(
    conn: &mut PgConnection,
    user_id: Option<Uuid>,
    key: &str,
    category: &str,
    value: Option<&str>,
    value_type: &str,
    now: OffsetDateTime,
) -> Result<Setting, sqlx::Error> {
    let sql = format!(
        r#"
        INSERT INTO settings (id, user_id, category, setting_key, setting_value, setting_type, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING {COLUMNS}
        "#
    );
    sqlx::query_as::<_, Setting>(&sql)
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(category)
        .bind(key)
        .bind(value)
        .bind(value_type)
        .bind(now)
        .fetch_one(&mut *conn)
        .await
}

/// Updates value, value-kind hint and timestamp in place. The category set
/// at creation is deliberately left alone.
pub async fn update_value(
    conn: &mut PgConnection,
    id: Uuid,
    value: Option<&str>,
    value_type: &str,
    now: OffsetDateTime,
) -> Result<Setting, sqlx::Error> {
    let sql = format!(
        r#"
        UPDATE settings
        SET setting_value = $2, setting_type = $3, updated_at = $4
        WHERE id = $1
        RETURNING {COLUMNS}
        "#
    );
    sqlx::query_as::<_, Setting>(&sql)
        .bind(id)
        .bind(value)
        .bind(value_type)
        .bind(now)
        .fetch_one(&mut *conn)
        .await
}
