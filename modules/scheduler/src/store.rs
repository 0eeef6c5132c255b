//! SQLite persistence for scheduled events, execution records, and cleanup
//! registrations. Follows the raw-`sqlx::query`-against-`sqlx_sqlite()`
//! pattern used by `settings::store`.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{Row, SqlitePool};

use crate::error::SchedulerError;
use crate::housekeeper::CleanupRegistration;
use crate::model::{EventFilters, EventStatus, ExecutionOutcome, ExecutionRecord, ScheduledEvent, Trigger};

const CREATE_EVENTS: &str = "CREATE TABLE IF NOT EXISTS scheduled_events (
    id TEXT PRIMARY KEY,
    module_id TEXT NOT NULL,
    function_name TEXT NOT NULL,
    parameters TEXT NOT NULL,
    trigger_json TEXT NOT NULL,
    status TEXT NOT NULL,
    description TEXT,
    timeout_seconds INTEGER NOT NULL,
    next_fire_at TEXT,
    last_fire_at TEXT,
    missed_fires INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)";

const CREATE_EXECUTIONS: &str = "CREATE TABLE IF NOT EXISTS executions (
    id TEXT PRIMARY KEY,
    event_id TEXT NOT NULL,
    started_at TEXT NOT NULL,
    ended_at TEXT,
    outcome TEXT,
    error_kind TEXT,
    error_message TEXT
)";

const CREATE_CLEANUP: &str = "CREATE TABLE IF NOT EXISTS cleanup_registrations (
    id TEXT PRIMARY KEY,
    module_id TEXT NOT NULL,
    directory TEXT NOT NULL,
    pattern TEXT NOT NULL,
    retention_days INTEGER,
    max_files INTEGER,
    max_size_mb INTEGER,
    priority INTEGER NOT NULL,
    description TEXT,
    last_run_at TEXT
)";

fn no_sqlite() -> SchedulerError {
    SchedulerError::Storage("scheduler module requires a sqlite handle".into())
}

pub async fn ensure_schema(db: &modkit_db::DbHandle) -> Result<(), SchedulerError> {
    let pool = db.sqlx_sqlite().ok_or_else(no_sqlite)?;
    sqlx::query(CREATE_EVENTS).execute(pool).await?;
    sqlx::query(CREATE_EXECUTIONS).execute(pool).await?;
    sqlx::query(CREATE_CLEANUP).execute(pool).await?;
    Ok(())
}

fn row_to_event(row: &sqlx::sqlite::SqliteRow) -> Result<ScheduledEvent, SchedulerError> {
    let trigger_json: String = row.try_get("trigger_json")?;
    let trigger: Trigger = serde_json::from_str(&trigger_json)
        .map_err(|e| SchedulerError::Storage(format!("corrupt trigger: {e}")))?;
    let parameters_json: String = row.try_get("parameters")?;
    let parameters: Value = serde_json::from_str(&parameters_json)
        .map_err(|e| SchedulerError::Storage(format!("corrupt parameters: {e}")))?;
    let status_str: String = row.try_get("status")?;
    let status = EventStatus::from_str(&status_str)
        .ok_or_else(|| SchedulerError::Storage(format!("corrupt status '{status_str}'")))?;
    let timeout_seconds: i64 = row.try_get("timeout_seconds")?;
    let missed_fires: i64 = row.try_get("missed_fires")?;
    Ok(ScheduledEvent {
        id: row.try_get("id")?,
        module_id: row.try_get("module_id")?,
        function_name: row.try_get("function_name")?,
        parameters,
        trigger,
        status,
        description: row.try_get("description")?,
        timeout_seconds: timeout_seconds as u64,
        next_fire_at: row.try_get("next_fire_at")?,
        last_fire_at: row.try_get("last_fire_at")?,
        missed_fires: missed_fires as u64,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub async fn insert_event(db: &modkit_db::DbHandle, event: &ScheduledEvent) -> Result<(), SchedulerError> {
    let pool = db.sqlx_sqlite().ok_or_else(no_sqlite)?;
    let trigger_json = serde_json::to_string(&event.trigger)
        .map_err(|e| SchedulerError::ParameterInvalid(format!("cannot serialize trigger: {e}")))?;
    let parameters_json = serde_json::to_string(&event.parameters)
        .map_err(|e| SchedulerError::ParameterInvalid(format!("cannot serialize parameters: {e}")))?;
    sqlx::query(
        "INSERT INTO scheduled_events
         (id, module_id, function_name, parameters, trigger_json, status, description,
          timeout_seconds, next_fire_at, last_fire_at, missed_fires, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&event.id)
    .bind(&event.module_id)
    .bind(&event.function_name)
    .bind(parameters_json)
    .bind(trigger_json)
    .bind(event.status.as_str())
    .bind(&event.description)
    .bind(event.timeout_seconds as i64)
    .bind(event.next_fire_at)
    .bind(event.last_fire_at)
    .bind(event.missed_fires as i64)
    .bind(event.created_at)
    .bind(event.updated_at)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_event(db: &modkit_db::DbHandle, id: &str) -> Result<Option<ScheduledEvent>, SchedulerError> {
    let pool = db.sqlx_sqlite().ok_or_else(no_sqlite)?;
    let row = sqlx::query("SELECT * FROM scheduled_events WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(row_to_event).transpose()
}

pub async fn list_events(db: &modkit_db::DbHandle, filters: &EventFilters) -> Result<Vec<ScheduledEvent>, SchedulerError> {
    let pool = db.sqlx_sqlite().ok_or_else(no_sqlite)?;
    let mut sql = String::from("SELECT * FROM scheduled_events WHERE 1=1");
    if filters.status.is_some() {
        sql.push_str(" AND status = ?");
    }
    if filters.module_id.is_some() {
        sql.push_str(" AND module_id = ?");
    }
    if filters.function_name.is_some() {
        sql.push_str(" AND function_name = ?");
    }
    sql.push_str(" ORDER BY created_at ASC");
    if filters.limit.is_some() {
        sql.push_str(" LIMIT ?");
    }

    let mut query = sqlx::query(&sql);
    if let Some(status) = &filters.status {
        query = query.bind(status.clone());
    }
    if let Some(module_id) = &filters.module_id {
        query = query.bind(module_id.clone());
    }
    if let Some(function_name) = &filters.function_name {
        query = query.bind(function_name.clone());
    }
    if let Some(limit) = filters.limit {
        query = query.bind(limit as i64);
    }

    let rows = query.fetch_all(pool).await?;
    let mut events: Vec<ScheduledEvent> = rows.iter().map(row_to_event).collect::<Result<_, _>>()?;
    if let Some(recurring) = filters.recurring {
        events.retain(|e| e.trigger.recurring() == recurring);
    }
    Ok(events)
}

/// Events due to fire: PENDING and `next_fire_at <= now`, ordered by
/// `next_fire_at` then id for a deterministic fire order.
pub async fn due_events(db: &modkit_db::DbHandle, now: DateTime<Utc>) -> Result<Vec<ScheduledEvent>, SchedulerError> {
    let pool = db.sqlx_sqlite().ok_or_else(no_sqlite)?;
    let rows = sqlx::query(
        "SELECT * FROM scheduled_events
         WHERE status = 'PENDING' AND next_fire_at IS NOT NULL AND next_fire_at <= ?
         ORDER BY next_fire_at ASC, id ASC",
    )
    .bind(now)
    .fetch_all(pool)
    .await?;
    rows.iter().map(row_to_event).collect()
}

pub async fn update_fields(
    db: &modkit_db::DbHandle,
    id: &str,
    parameters: Option<&Value>,
    trigger: Option<&Trigger>,
    description: Option<&str>,
    next_fire_at: Option<Option<DateTime<Utc>>>,
    now: DateTime<Utc>,
) -> Result<(), SchedulerError> {
    let pool = db.sqlx_sqlite().ok_or_else(no_sqlite)?;
    if let Some(params) = parameters {
        let json = serde_json::to_string(params)
            .map_err(|e| SchedulerError::ParameterInvalid(format!("cannot serialize parameters: {e}")))?;
        sqlx::query("UPDATE scheduled_events SET parameters = ?, updated_at = ? WHERE id = ?")
            .bind(json)
            .bind(now)
            .bind(id)
            .execute(pool)
            .await?;
    }
    if let Some(trig) = trigger {
        let json = serde_json::to_string(trig)
            .map_err(|e| SchedulerError::ParameterInvalid(format!("cannot serialize trigger: {e}")))?;
        sqlx::query("UPDATE scheduled_events SET trigger_json = ?, updated_at = ? WHERE id = ?")
            .bind(json)
            .bind(now)
            .bind(id)
            .execute(pool)
            .await?;
    }
    if let Some(desc) = description {
        sqlx::query("UPDATE scheduled_events SET description = ?, updated_at = ? WHERE id = ?")
            .bind(desc)
            .bind(now)
            .bind(id)
            .execute(pool)
            .await?;
    }
    if let Some(next) = next_fire_at {
        sqlx::query("UPDATE scheduled_events SET next_fire_at = ?, updated_at = ? WHERE id = ?")
            .bind(next)
            .bind(now)
            .bind(id)
            .execute(pool)
            .await?;
    }
    Ok(())
}

pub async fn set_status(
    db: &modkit_db::DbHandle,
    id: &str,
    status: EventStatus,
    now: DateTime<Utc>,
) -> Result<(), SchedulerError> {
    let pool = db.sqlx_sqlite().ok_or_else(no_sqlite)?;
    sqlx::query("UPDATE scheduled_events SET status = ?, updated_at = ? WHERE id = ?")
        .bind(status.as_str())
        .bind(now)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Transition a PENDING event to RUNNING, recording a fresh execution
/// record, all within one transaction.
pub async fn begin_run(
    db: &modkit_db::DbHandle,
    event_id: &str,
    execution_id: &str,
    started_at: DateTime<Utc>,
) -> Result<(), SchedulerError> {
    let pool = db.sqlx_sqlite().ok_or_else(no_sqlite)?;
    let mut tx = pool.begin().await?;
    sqlx::query("UPDATE scheduled_events SET status = 'RUNNING', last_fire_at = ?, updated_at = ? WHERE id = ?")
        .bind(started_at)
        .bind(started_at)
        .bind(event_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query(
        "INSERT INTO executions (id, event_id, started_at, ended_at, outcome, error_kind, error_message)
         VALUES (?, ?, ?, NULL, NULL, NULL, NULL)",
    )
    .bind(execution_id)
    .bind(event_id)
    .bind(started_at)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(())
}

/// Record the outcome of a fire and advance (or terminate) the event's
/// schedule, atomically with the execution record.
#[allow(clippy::too_many_arguments)]
pub async fn complete_run(
    db: &modkit_db::DbHandle,
    event_id: &str,
    execution_id: &str,
    ended_at: DateTime<Utc>,
    outcome: ExecutionOutcome,
    error_kind: Option<&str>,
    error_message: Option<&str>,
    new_status: EventStatus,
    next_fire_at: Option<DateTime<Utc>>,
) -> Result<(), SchedulerError> {
    let pool = db.sqlx_sqlite().ok_or_else(no_sqlite)?;
    let mut tx = pool.begin().await?;
    sqlx::query(
        "UPDATE executions SET ended_at = ?, outcome = ?, error_kind = ?, error_message = ? WHERE id = ?",
    )
    .bind(ended_at)
    .bind(outcome_str(outcome))
    .bind(error_kind)
    .bind(error_message)
    .bind(execution_id)
    .execute(&mut *tx)
    .await?;
    sqlx::query("UPDATE scheduled_events SET status = ?, next_fire_at = ?, updated_at = ? WHERE id = ?")
        .bind(new_status.as_str())
        .bind(next_fire_at)
        .bind(ended_at)
        .bind(event_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
}

pub async fn increment_missed_fires(db: &modkit_db::DbHandle, event_id: &str) -> Result<(), SchedulerError> {
    let pool = db.sqlx_sqlite().ok_or_else(no_sqlite)?;
    sqlx::query("UPDATE scheduled_events SET missed_fires = missed_fires + 1 WHERE id = ?")
        .bind(event_id)
        .execute(pool)
        .await?;
    Ok(())
}

fn outcome_str(outcome: ExecutionOutcome) -> &'static str {
    match outcome {
        ExecutionOutcome::Success => "SUCCESS",
        ExecutionOutcome::Failed => "FAILED",
        ExecutionOutcome::Timeout => "TIMEOUT",
        ExecutionOutcome::Cancelled => "CANCELLED",
    }
}

/// Events stuck in RUNNING whose latest execution record lacks an
/// `ended_at` — crashed mid-fire.
pub async fn stuck_running_events(db: &modkit_db::DbHandle) -> Result<Vec<(ScheduledEvent, String)>, SchedulerError> {
    let pool = db.sqlx_sqlite().ok_or_else(no_sqlite)?;
    let rows = sqlx::query(
        "SELECT e.*, x.id as execution_id FROM scheduled_events e
         JOIN executions x ON x.event_id = e.id
         WHERE e.status = 'RUNNING' AND x.ended_at IS NULL",
    )
    .fetch_all(pool)
    .await?;
    rows.iter()
        .map(|row| {
            let event = row_to_event(row)?;
            let execution_id: String = row.try_get("execution_id")?;
            Ok((event, execution_id))
        })
        .collect()
}

pub async fn list_executions(db: &modkit_db::DbHandle, event_id: &str) -> Result<Vec<ExecutionRecord>, SchedulerError> {
    let pool = db.sqlx_sqlite().ok_or_else(no_sqlite)?;
    let rows = sqlx::query("SELECT * FROM executions WHERE event_id = ? ORDER BY started_at ASC")
        .bind(event_id)
        .fetch_all(pool)
        .await?;
    rows.iter()
        .map(|row| {
            let outcome_str: Option<String> = row.try_get("outcome")?;
            let outcome = outcome_str.and_then(|s| match s.as_str() {
                "SUCCESS" => Some(ExecutionOutcome::Success),
                "FAILED" => Some(ExecutionOutcome::Failed),
                "TIMEOUT" => Some(ExecutionOutcome::Timeout),
                "CANCELLED" => Some(ExecutionOutcome::Cancelled),
                _ => None,
            });
            Ok(ExecutionRecord {
                id: row.try_get("id")?,
                event_id: row.try_get("event_id")?,
                started_at: row.try_get("started_at")?,
                ended_at: row.try_get("ended_at")?,
                outcome,
                error_kind: row.try_get("error_kind")?,
                error_message: row.try_get("error_message")?,
            })
        })
        .collect::<Result<_, sqlx::Error>>()
        .map_err(SchedulerError::from)
}

// --- Cleanup registrations --------------------------------------------------

pub async fn insert_cleanup_registration(db: &modkit_db::DbHandle, reg: &CleanupRegistration) -> Result<(), SchedulerError> {
    let pool = db.sqlx_sqlite().ok_or_else(no_sqlite)?;
    sqlx::query(
        "INSERT INTO cleanup_registrations
         (id, module_id, directory, pattern, retention_days, max_files, max_size_mb, priority, description, last_run_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, NULL)",
    )
    .bind(&reg.id)
    .bind(&reg.module_id)
    .bind(&reg.directory)
    .bind(&reg.pattern)
    .bind(reg.retention_days.map(|v| v as i64))
    .bind(reg.max_files.map(|v| v as i64))
    .bind(reg.max_size_mb.map(|v| v as i64))
    .bind(reg.priority)
    .bind(&reg.description)
    .execute(pool)
    .await?;
    Ok(())
}

fn row_to_registration(row: &sqlx::sqlite::SqliteRow) -> Result<CleanupRegistration, SchedulerError> {
    let retention_days: Option<i64> = row.try_get("retention_days")?;
    let max_files: Option<i64> = row.try_get("max_files")?;
    let max_size_mb: Option<i64> = row.try_get("max_size_mb")?;
    Ok(CleanupRegistration {
        id: row.try_get("id")?,
        module_id: row.try_get("module_id")?,
        directory: row.try_get("directory")?,
        pattern: row.try_get("pattern")?,
        retention_days: retention_days.map(|v| v as u64),
        max_files: max_files.map(|v| v as u64),
        max_size_mb: max_size_mb.map(|v| v as u64),
        priority: row.try_get("priority")?,
        description: row.try_get("description")?,
        last_run_at: row.try_get("last_run_at")?,
    })
}

pub async fn list_cleanup_registrations(db: &modkit_db::DbHandle) -> Result<Vec<CleanupRegistration>, SchedulerError> {
    let pool = db.sqlx_sqlite().ok_or_else(no_sqlite)?;
    let rows = sqlx::query("SELECT * FROM cleanup_registrations ORDER BY priority ASC")
        .fetch_all(pool)
        .await?;
    rows.iter().map(row_to_registration).collect()
}

pub async fn get_cleanup_registration(db: &modkit_db::DbHandle, id: &str) -> Result<Option<CleanupRegistration>, SchedulerError> {
    let pool = db.sqlx_sqlite().ok_or_else(no_sqlite)?;
    let row = sqlx::query("SELECT * FROM cleanup_registrations WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(row_to_registration).transpose()
}

pub async fn touch_cleanup_last_run(db: &modkit_db::DbHandle, id: &str, at: DateTime<Utc>) -> Result<(), SchedulerError> {
    let pool = db.sqlx_sqlite().ok_or_else(no_sqlite)?;
    sqlx::query("UPDATE cleanup_registrations SET last_run_at = ? WHERE id = ?")
        .bind(at)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}
