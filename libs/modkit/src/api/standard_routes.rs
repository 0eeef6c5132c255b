//! Standard per-module `/status` and `/info` endpoints, advertised by every
//! module's router for UI discovery. Mounted under the module's own URL
//! prefix alongside its domain routes, so a module calls
//! [`mount_standard_routes`] once from `register_rest` next to its other
//! `OperationBuilder` registrations.

use axum::{Extension, Json, Router};
use serde::Serialize;
use utoipa::ToSchema;

use super::{Missing, OpenApiRegistry, OperationBuilder};

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ModuleStatusDto {
    pub module_id: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ModuleInfoDto {
    pub module_id: String,
    pub capabilities: Vec<String>,
    /// Advisory only: the core does not poll the module on this interval.
    pub health_check_interval_seconds: Option<u64>,
}

#[derive(Clone)]
struct StandardRoutesState {
    status: ModuleStatusDto,
    info: ModuleInfoDto,
}

/// Mounts `GET {prefix}/status` and `GET {prefix}/info` for a module. `prefix`
/// must not have a trailing slash (e.g. `/scheduler`, `/settings`).
pub fn mount_standard_routes(
    mut router: Router,
    openapi: &dyn OpenApiRegistry,
    prefix: &str,
    module_id: &str,
    capabilities: &[&str],
    health_check_interval_seconds: Option<u64>,
) -> Router {
    let state = StandardRoutesState {
        status: ModuleStatusDto {
            module_id: module_id.to_string(),
            status: "ready".to_string(),
        },
        info: ModuleInfoDto {
            module_id: module_id.to_string(),
            capabilities: capabilities.iter().map(|c| c.to_string()).collect(),
            health_check_interval_seconds,
        },
    };

    router = OperationBuilder::<Missing, Missing, ()>::get(format!("{prefix}/status"))
        .operation_id(format!("{module_id}.status"))
        .summary("Module status")
        .tag(module_id.to_string())
        .handler(status_handler)
        .json_response_with_schema::<ModuleStatusDto>(openapi, 200, "Module status")
        .register(router, openapi);

    router = OperationBuilder::<Missing, Missing, ()>::get(format!("{prefix}/info"))
        .operation_id(format!("{module_id}.info"))
        .summary("Module capability info")
        .tag(module_id.to_string())
        .handler(info_handler)
        .json_response_with_schema::<ModuleInfoDto>(openapi, 200, "Module info")
        .register(router, openapi);

    router.layer(Extension(state))
}

async fn status_handler(Extension(state): Extension<StandardRoutesState>) -> Json<ModuleStatusDto> {
    Json(state.status)
}

async fn info_handler(Extension(state): Extension<StandardRoutesState>) -> Json<ModuleInfoDto> {
    Json(state.info)
}
