use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query};
use axum::{Extension, Json, Router};
use modkit::api::{Missing, OpenApiRegistry, OperationBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

use crate::error::SettingsError;
use crate::SettingsResolver;

#[derive(Clone)]
struct RestState {
    resolver: Arc<SettingsResolver>,
    db: Option<Arc<modkit_db::DbHandle>>,
}

#[derive(Debug, Deserialize)]
struct DatabaseQuery {
    #[serde(default)]
    database: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
struct ModuleSettingsDto {
    settings: Value,
    baseline_count: usize,
    user_overrides_count: usize,
}

#[derive(Debug, Serialize, ToSchema)]
struct SettingsListDto {
    modules: HashMap<String, ModuleSettingsDto>,
}

#[derive(Debug, Deserialize, ToSchema)]
struct SetPreferenceReq {
    value: Value,
}

pub fn register_routes(
    mut router: Router,
    openapi: &dyn OpenApiRegistry,
    resolver: Arc<SettingsResolver>,
    db: Option<Arc<modkit_db::DbHandle>>,
) -> anyhow::Result<Router> {
    let state = RestState { resolver, db };

    router = OperationBuilder::<Missing, Missing, ()>::get("/settings")
        .operation_id("settings.list")
        .summary("List resolved settings for every known module")
        .tag("settings")
        .query_param("database", true, "Target database name (no hidden default)")
        .query_param("user_id", true, "Target user identifier (no hidden default)")
        .handler(list_settings)
        .json_response_with_schema::<SettingsListDto>(openapi, 200, "Resolved settings per module")
        .problem_response(openapi, 500, "Internal Server Error")
        .register(router, openapi);

    router = OperationBuilder::<Missing, Missing, ()>::get("/settings/{module_id}")
        .operation_id("settings.get")
        .summary("Get resolved settings for a module")
        .tag("settings")
        .path_param("module_id", "Module identifier")
        .query_param("database", true, "Target database name (no hidden default)")
        .query_param("user_id", true, "Target user identifier (no hidden default)")
        .handler(get_settings)
        .json_response_with_schema::<ModuleSettingsDto>(openapi, 200, "Resolved settings")
        .problem_response(openapi, 404, "Unknown module")
        .register(router, openapi);

    router = OperationBuilder::<Missing, Missing, ()>::put("/settings/{module_id}/{key}")
        .operation_id("settings.set_preference")
        .summary("Set a user preference override")
        .tag("settings")
        .path_param("module_id", "Module identifier")
        .path_param("key", "Dotted settings key")
        .query_param("database", true, "Target database name (no hidden default)")
        .query_param("user_id", true, "Target user identifier (no hidden default)")
        .json_request::<SetPreferenceReq>(openapi, "New value")
        .handler(set_preference)
        .json_response(204, "Preference stored")
        .problem_response(openapi, 400, "Validation failed")
        .problem_response(openapi, 404, "Unknown module")
        .register(router, openapi);

    router = OperationBuilder::<Missing, Missing, ()>::delete("/settings/{module_id}/{key}")
        .operation_id("settings.clear_preference")
        .summary("Clear a user preference override")
        .tag("settings")
        .path_param("module_id", "Module identifier")
        .path_param("key", "Dotted settings key")
        .query_param("database", true, "Target database name (no hidden default)")
        .query_param("user_id", true, "Target user identifier (no hidden default)")
        .handler(clear_preference)
        .json_response(204, "Preference cleared")
        .register(router, openapi);

    router = router.layer(Extension(state));
    router = modkit::api::mount_standard_routes(router, openapi, "/settings", "settings", &["rest"], None);
    Ok(router)
}

fn require_db(db: &Option<Arc<modkit_db::DbHandle>>) -> Result<&modkit_db::DbHandle, SettingsError> {
    db.as_deref()
        .ok_or_else(|| SettingsError::Storage("settings module has no database configured".into()))
}

/// Database selection is explicit in every call; there is no hidden
/// default to fall back to.
fn require_database(q: &DatabaseQuery) -> Result<&str, SettingsError> {
    q.database.as_deref().ok_or_else(|| {
        SettingsError::ValidationFailed("query parameter 'database' is required".into())
    })
}

/// Same as [`require_database`]: preferences are per-user, so there is no
/// hidden default user to fall back to either.
fn require_user_id(q: &DatabaseQuery) -> Result<&str, SettingsError> {
    q.user_id.as_deref().ok_or_else(|| {
        SettingsError::ValidationFailed("query parameter 'user_id' is required".into())
    })
}

async fn list_settings(
    Extension(state): Extension<RestState>,
    Query(q): Query<DatabaseQuery>,
) -> Result<Json<SettingsListDto>, SettingsError> {
    let database = require_database(&q)?;
    let user_id = require_user_id(&q)?;
    let db = require_db(&state.db)?;
    let mut modules = HashMap::new();
    for module_id in state.resolver.known_modules() {
        let (settings, baseline_count, user_overrides_count) = state
            .resolver
            .get_merged_with_counts(db, user_id, database, &module_id)
            .await?;
        modules.insert(
            module_id,
            ModuleSettingsDto { settings, baseline_count, user_overrides_count },
        );
    }
    Ok(Json(SettingsListDto { modules }))
}

async fn get_settings(
    Extension(state): Extension<RestState>,
    Path(module_id): Path<String>,
    Query(q): Query<DatabaseQuery>,
) -> Result<Json<ModuleSettingsDto>, SettingsError> {
    let database = require_database(&q)?;
    let user_id = require_user_id(&q)?;
    let db = require_db(&state.db)?;
    let (settings, baseline_count, user_overrides_count) = state
        .resolver
        .get_merged_with_counts(db, user_id, database, &module_id)
        .await?;
    Ok(Json(ModuleSettingsDto { settings, baseline_count, user_overrides_count }))
}

async fn set_preference(
    Extension(state): Extension<RestState>,
    Path((module_id, key)): Path<(String, String)>,
    Query(q): Query<DatabaseQuery>,
    Json(req): Json<SetPreferenceReq>,
) -> Result<axum::http::StatusCode, SettingsError> {
    let database = require_database(&q)?;
    let user_id = require_user_id(&q)?;
    let db = require_db(&state.db)?;
    state
        .resolver
        .set_preference(db, user_id, database, &module_id, &key, req.value)
        .await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

async fn clear_preference(
    Extension(state): Extension<RestState>,
    Path((module_id, key)): Path<(String, String)>,
    Query(q): Query<DatabaseQuery>,
) -> Result<axum::http::StatusCode, SettingsError> {
    let database = require_database(&q)?;
    let user_id = require_user_id(&q)?;
    let db = require_db(&state.db)?;
    state.resolver.clear_preference(db, user_id, database, &module_id, &key).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}
