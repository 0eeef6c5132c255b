use std::collections::HashMap;

use serde_json::Value;

use crate::error::SettingsError;

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS user_preferences (
    user_id TEXT NOT NULL,
    database_name TEXT NOT NULL,
    module_id TEXT NOT NULL,
    key TEXT NOT NULL,
    value_json TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (user_id, database_name, module_id, key)
)";

pub async fn ensure_schema(db: &modkit_db::DbHandle) -> Result<(), SettingsError> {
    let pool = db
        .sqlx_sqlite()
        .ok_or_else(|| SettingsError::Storage("settings store requires a sqlite handle".into()))?;
    sqlx::query(CREATE_TABLE).execute(pool).await?;
    Ok(())
}

pub async fn load_preferences(
    db: &modkit_db::DbHandle,
    user_id: &str,
    database: &str,
    module_id: &str,
) -> Result<HashMap<String, Value>, SettingsError> {
    ensure_schema(db).await?;
    let pool = db
        .sqlx_sqlite()
        .ok_or_else(|| SettingsError::Storage("settings store requires a sqlite handle".into()))?;
    let rows: Vec<(String, String)> = sqlx::query_as(
        "SELECT key, value_json FROM user_preferences
         WHERE user_id = ? AND database_name = ? AND module_id = ?",
    )
    .bind(user_id)
    .bind(database)
    .bind(module_id)
    .fetch_all(pool)
    .await?;

    let mut out = HashMap::new();
    for (key, value_json) in rows {
        let value: Value = serde_json::from_str(&value_json)
            .map_err(|e| SettingsError::Storage(format!("corrupt preference '{key}': {e}")))?;
        out.insert(key, value);
    }
    Ok(out)
}

pub async fn upsert_preference(
    db: &modkit_db::DbHandle,
    user_id: &str,
    database: &str,
    module_id: &str,
    key: &str,
    value: &Value,
) -> Result<(), SettingsError> {
    ensure_schema(db).await?;
    let pool = db
        .sqlx_sqlite()
        .ok_or_else(|| SettingsError::Storage("settings store requires a sqlite handle".into()))?;
    let value_json = serde_json::to_string(value)
        .map_err(|e| SettingsError::ValidationFailed(format!("cannot serialize value: {e}")))?;
    sqlx::query(
        "INSERT INTO user_preferences (user_id, database_name, module_id, key, value_json, updated_at)
         VALUES (?, ?, ?, ?, ?, datetime('now'))
         ON CONFLICT(user_id, database_name, module_id, key)
         DO UPDATE SET value_json = excluded.value_json, updated_at = excluded.updated_at",
    )
    .bind(user_id)
    .bind(database)
    .bind(module_id)
    .bind(key)
    .bind(value_json)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn delete_preference(
    db: &modkit_db::DbHandle,
    user_id: &str,
    database: &str,
    module_id: &str,
    key: &str,
) -> Result<(), SettingsError> {
    ensure_schema(db).await?;
    let pool = db
        .sqlx_sqlite()
        .ok_or_else(|| SettingsError::Storage("settings store requires a sqlite handle".into()))?;
    sqlx::query(
        "DELETE FROM user_preferences
         WHERE user_id = ? AND database_name = ? AND module_id = ? AND key = ?",
    )
    .bind(user_id)
    .bind(database)
    .bind(module_id)
    .bind(key)
    .execute(pool)
    .await?;
    Ok(())
}
