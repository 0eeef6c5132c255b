use crate::error::GreeterError;

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS greetings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    greeted_at TEXT NOT NULL
)";

pub async fn ensure_schema(db: &modkit_db::DbHandle) -> Result<(), GreeterError> {
    let pool = db.sqlx_sqlite().ok_or(GreeterError::NoDatabase)?;
    sqlx::query(CREATE_TABLE).execute(pool).await?;
    Ok(())
}

pub async fn record_greeting(db: &modkit_db::DbHandle, name: &str) -> Result<(), GreeterError> {
    let pool = db.sqlx_sqlite().ok_or(GreeterError::NoDatabase)?;
    sqlx::query("INSERT INTO greetings (name, greeted_at) VALUES (?, datetime('now'))")
        .bind(name)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn count_greetings(db: &modkit_db::DbHandle) -> Result<i64, GreeterError> {
    let pool = db.sqlx_sqlite().ok_or(GreeterError::NoDatabase)?;
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM greetings")
        .fetch_one(pool)
        .await?;
    Ok(count)
}
