//! Bootstrap Stage.
//!
//! Runs before any module class is instantiated. Two built-in handlers,
//! ordered by priority: the directory handler (5) then the database handler
//! (10). Both must be infrastructure-only, self-contained (no service
//! lookups — services don't exist yet), idempotent, and fail fast with a
//! clear reason.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use sqlx::Executor;

pub const DIRECTORY_HANDLER_PRIORITY: u32 = 5;
pub const DATABASE_HANDLER_PRIORITY: u32 = 10;

/// Fixed set of directories the directory handler ensures exist, relative to
/// the configured base directory.
pub const REQUIRED_DIRECTORIES: &[&str] = &[
    "logs",
    "cache",
    "temp",
    "database",
    "config",
    "error_logs",
    "logs/modules",
    "models",
    "exports",
    "imports",
];

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error("bootstrap failed in handler '{handler}': {reason}")]
    Failed { handler: &'static str, reason: String },
}

/// A single table a module's database model declares. `create_sql` must be
/// an idempotent `CREATE TABLE IF NOT EXISTS ...` statement.
#[derive(Debug, Clone, Copy)]
pub struct TableSpec {
    pub name: &'static str,
    pub create_sql: &'static str,
}

/// A module's database-model declaration: which database it belongs to
/// (grouped by `database_name`) and which tables it needs created.
#[derive(Debug, Clone, Copy)]
pub struct DatabaseModelDecl {
    pub database_name: &'static str,
    pub tables: &'static [TableSpec],
}

pub struct DatabaseModelRegistrator(pub DatabaseModelDecl);
inventory::collect!(DatabaseModelRegistrator);

/// Ensures [`REQUIRED_DIRECTORIES`] exist under `base_dir`. Idempotent: safe
/// to run on every startup.
pub fn run_directory_handler(base_dir: &Path) -> Result<(), BootstrapError> {
    for rel in REQUIRED_DIRECTORIES {
        let dir = base_dir.join(rel);
        std::fs::create_dir_all(&dir).map_err(|e| BootstrapError::Failed {
            handler: "directory",
            reason: format!("could not create '{}': {e}", dir.display()),
        })?;
    }
    Ok(())
}

/// Groups every discovered [`DatabaseModelDecl`] by `database_name`, opens or
/// creates each database file under `base_dir/database/<name>.db`, and
/// creates any missing tables in a single transaction per database.
pub async fn run_database_handler(base_dir: &Path) -> Result<(), BootstrapError> {
    let mut grouped: HashMap<&'static str, Vec<TableSpec>> = HashMap::new();
    for reg in inventory::iter::<DatabaseModelRegistrator> {
        grouped
            .entry(reg.0.database_name)
            .or_default()
            .extend(reg.0.tables.iter().copied());
    }

    for (database_name, tables) in grouped {
        create_database_tables(base_dir, database_name, &tables)
            .await
            .map_err(|e| BootstrapError::Failed {
                handler: "database",
                reason: format!("database '{database_name}': {e}"),
            })?;
    }
    Ok(())
}

async fn create_database_tables(
    base_dir: &Path,
    database_name: &str,
    tables: &[TableSpec],
) -> anyhow::Result<()> {
    let db_dir = base_dir.join("database");
    std::fs::create_dir_all(&db_dir)?;
    let path: PathBuf = db_dir.join(format!("{database_name}.db"));

    let dsn = format!("sqlite:{}?mode=rwc", path.display());
    let db = modkit_db::DbHandle::connect(&dsn, modkit_db::ConnectOpts {
        max_conns: Some(1),
        ..Default::default()
    })
    .await?;

    let tables = tables.to_vec();
    db.with_sqlite_tx(|tx| async move {
        for table in &tables {
            tx.execute(table.create_sql).await?;
        }
        Ok(())
    })
    .await
    .map_err(|e| anyhow::anyhow!("database '{database_name}': {e}"))?;

    db.close().await;
    Ok(())
}

/// Runs both bootstrap handlers in priority order. Aborts at the first
/// failure — no Phase 1 begins when this returns `Err`.
pub async fn run_bootstrap(base_dir: &Path) -> Result<(), BootstrapError> {
    run_directory_handler(base_dir)?;
    run_database_handler(base_dir).await?;
    Ok(())
}
