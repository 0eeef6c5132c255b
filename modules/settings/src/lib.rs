//! Settings Resolver.
//!
//! Each module declares a settings schema: a set of typed defaults plus an
//! environment variable prefix. At Phase 2 the resolver builds one baseline
//! per module (`defaults ⊕ env`); at runtime, reads additionally overlay any
//! persisted user preference (`user preferences → environment → defaults`).
//! Preferences are namespaced by an explicit `database` name chosen by the
//! caller and by the `user_id` they belong to, and persisted in this
//! module's own SQLite store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{Extension, Router};
use modkit::api::{OpenApiRegistry, OperationBuilder};
use modkit::contracts::{Module, RestfulModule};
use modkit::ModuleCtx;
use parking_lot::RwLock;
use serde_json::Value;

mod baseline;
mod env_override;
mod error;
mod rest;
mod store;

pub use error::SettingsError;

/// A module's settings schema, discovered via `inventory` the same way
/// `bootstrap::DatabaseModelDecl` discovers table declarations. `defaults_json`
/// returns the schema's default values as a JSON object; the shape of that
/// object drives how environment variables are matched to nested keys.
#[derive(Clone, Copy)]
pub struct SettingsSchemaDecl {
    pub module_id: &'static str,
    pub env_prefix: &'static str,
    pub defaults_json: fn() -> Value,
}

pub struct SettingsSchemaRegistrator(pub SettingsSchemaDecl);
inventory::collect!(SettingsSchemaRegistrator);

/// One module's resolved baseline: defaults merged with environment
/// overrides, computed once during Phase 2.
#[derive(Debug, Clone, Default)]
pub struct Baseline {
    pub defaults: Value,
    pub merged: Value,
}

/// Service registered into the container as `core.settings.service`. Other
/// modules look it up via `ctx.container().get::<SettingsResolver>(...)`.
pub struct SettingsResolver {
    baselines: RwLock<HashMap<String, Baseline>>,
}

impl Default for SettingsResolver {
    fn default() -> Self {
        Self { baselines: RwLock::new(HashMap::new()) }
    }
}

impl SettingsResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build baselines for every schema discovered via `inventory`. Called
    /// once from Phase 2 (`load_baseline`), safe to call again (idempotent,
    /// last write wins per module id — matches discovery being static).
    pub fn load_baselines(&self) {
        let mut map = self.baselines.write();
        for reg in inventory::iter::<SettingsSchemaRegistrator> {
            let decl = reg.0;
            let defaults = (decl.defaults_json)();
            let merged = env_override::apply_env_overrides(&defaults, decl.env_prefix);
            map.insert(
                decl.module_id.to_string(),
                Baseline { defaults, merged },
            );
        }
    }

    pub fn baseline_for(&self, module_id: &str) -> Option<Baseline> {
        self.baselines.read().get(module_id).cloned()
    }

    pub fn known_modules(&self) -> Vec<String> {
        self.baselines.read().keys().cloned().collect()
    }

    /// Resolve a module's full settings view: baseline overlaid with every
    /// persisted user preference for `(user_id, database, module_id)`.
    pub async fn get_merged(
        &self,
        db: &modkit_db::DbHandle,
        user_id: &str,
        database: &str,
        module_id: &str,
    ) -> Result<Value, SettingsError> {
        let baseline = self
            .baseline_for(module_id)
            .ok_or_else(|| SettingsError::UnknownModule(module_id.to_string()))?;
        let prefs = store::load_preferences(db, user_id, database, module_id).await?;
        Ok(baseline::overlay(&baseline.merged, &prefs))
    }

    /// Same as [`Self::get_merged`] plus the counts the settings HTTP surface
    /// reports: the number of baseline keys and the number of active
    /// per-key user overrides.
    pub async fn get_merged_with_counts(
        &self,
        db: &modkit_db::DbHandle,
        user_id: &str,
        database: &str,
        module_id: &str,
    ) -> Result<(Value, usize, usize), SettingsError> {
        let baseline = self
            .baseline_for(module_id)
            .ok_or_else(|| SettingsError::UnknownModule(module_id.to_string()))?;
        let prefs = store::load_preferences(db, user_id, database, module_id).await?;
        let baseline_count = baseline
            .merged
            .as_object()
            .map(|o| o.len())
            .unwrap_or(0);
        let user_overrides_count = prefs.len();
        let merged = baseline::overlay(&baseline.merged, &prefs);
        Ok((merged, baseline_count, user_overrides_count))
    }

    /// Resolve and deserialize a module's settings into `T`.
    pub async fn get_typed<T: serde::de::DeserializeOwned>(
        &self,
        db: &modkit_db::DbHandle,
        user_id: &str,
        database: &str,
        module_id: &str,
    ) -> Result<T, SettingsError> {
        let merged = self.get_merged(db, user_id, database, module_id).await?;
        serde_json::from_value(merged)
            .map_err(|e| SettingsError::ValidationFailed(format!("{module_id}: {e}")))
    }

    /// Persist a single user preference, overriding env/defaults for `key`
    /// until cleared. `key` may be a dotted path (`"nested.field"`).
    pub async fn set_preference(
        &self,
        db: &modkit_db::DbHandle,
        user_id: &str,
        database: &str,
        module_id: &str,
        key: &str,
        value: Value,
    ) -> Result<(), SettingsError> {
        if !self.baselines.read().contains_key(module_id) {
            return Err(SettingsError::UnknownModule(module_id.to_string()));
        }
        store::upsert_preference(db, user_id, database, module_id, key, &value).await
    }

    pub async fn clear_preference(
        &self,
        db: &modkit_db::DbHandle,
        user_id: &str,
        database: &str,
        module_id: &str,
        key: &str,
    ) -> Result<(), SettingsError> {
        store::delete_preference(db, user_id, database, module_id, key).await
    }
}

#[modkit::module(
    name = "settings",
    capabilities = [rest],
    phase1 = [],
    phase2_ops = [("load_baseline", 10, [], required)],
    services = [("core.settings.service", 20)],
)]
#[derive(Default)]
pub struct SettingsModule {
    resolver: Arc<SettingsResolver>,
    db: std::sync::OnceLock<Arc<modkit_db::DbHandle>>,
}

#[async_trait]
impl Module for SettingsModule {
    async fn init(&self, ctx: &ModuleCtx) -> anyhow::Result<()> {
        if let Some(db) = ctx.db_async().await? {
            store::ensure_schema(&db).await?;
            let _ = self.db.set(db);
        }
        ctx.container()
            .register("core.settings.service", self.resolver.clone(), 20)
            .map_err(|e| anyhow::anyhow!("{e}"))?;
        Ok(())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

#[async_trait]
impl modkit::phase2::Phase2Module for SettingsModule {
    async fn run_phase2(&self, method_name: &str, _ctx: &ModuleCtx) -> anyhow::Result<()> {
        match method_name {
            "load_baseline" => {
                self.resolver.load_baselines();
                Ok(())
            }
            other => anyhow::bail!("settings: unknown phase2 op '{other}'"),
        }
    }
}

impl RestfulModule for SettingsModule {
    fn register_rest(
        &self,
        _ctx: &ModuleCtx,
        router: Router,
        openapi: &dyn OpenApiRegistry,
    ) -> anyhow::Result<Router> {
        rest::register_routes(router, openapi, self.resolver.clone(), self.db.get().cloned())
    }
}
