//! HTTP surface for the scheduler and housekeeper.

use std::sync::Arc;

use axum::extract::{Path, Query};
use axum::{Extension, Json, Router};
use modkit::api::{Missing, OpenApiRegistry, OperationBuilder};
use serde::Deserialize;

use crate::engine::SchedulerEngine;
use crate::error::SchedulerError;
use crate::housekeeper::{CleanupRegistration, CleanupRegistrationSpec, CleanupReport};
use crate::model::{EventFilters, EventSpec, EventUpdate, ExecutionRecord, ScheduledEvent};

#[derive(Clone)]
struct RestState {
    engine: Arc<SchedulerEngine>,
}

pub fn register_routes(
    mut router: Router,
    openapi: &dyn OpenApiRegistry,
    engine: Arc<SchedulerEngine>,
) -> anyhow::Result<Router> {
    let state = RestState { engine };

    router = OperationBuilder::<Missing, Missing, ()>::get("/scheduler/events")
        .operation_id("scheduler.list_events")
        .summary("List scheduled events")
        .tag("scheduler")
        .query_param("status", false, "Filter by event status")
        .query_param("module_id", false, "Filter by owning module")
        .query_param("function_name", false, "Filter by schedulable function")
        .query_param("recurring", false, "Filter by whether the event recurs")
        .query_param("limit", false, "Maximum number of events to return")
        .handler(list_events)
        .json_response_with_schema::<Vec<ScheduledEvent>>(openapi, 200, "Scheduled events")
        .register(router, openapi);

    router = OperationBuilder::<Missing, Missing, ()>::post("/scheduler/events")
        .operation_id("scheduler.schedule")
        .summary("Schedule a new event")
        .tag("scheduler")
        .json_request::<EventSpec>(openapi, "Event specification")
        .handler(schedule_event)
        .json_response(201, "Event id")
        .problem_response(openapi, 400, "Invalid trigger or unknown function")
        .register(router, openapi);

    router = OperationBuilder::<Missing, Missing, ()>::get("/scheduler/events/{id}")
        .operation_id("scheduler.get_event")
        .summary("Get a scheduled event")
        .tag("scheduler")
        .path_param("id", "Event id")
        .handler(get_event)
        .json_response_with_schema::<ScheduledEvent>(openapi, 200, "Scheduled event")
        .problem_response(openapi, 404, "Unknown event")
        .register(router, openapi);

    router = OperationBuilder::<Missing, Missing, ()>::patch("/scheduler/events/{id}")
        .operation_id("scheduler.update_event")
        .summary("Update parameters, trigger, or description")
        .tag("scheduler")
        .path_param("id", "Event id")
        .json_request::<EventUpdate>(openapi, "Fields to update")
        .handler(update_event)
        .json_response_with_schema::<ScheduledEvent>(openapi, 200, "Updated event")
        .problem_response(openapi, 404, "Unknown event")
        .problem_response(openapi, 409, "Event is running")
        .register(router, openapi);

    router = OperationBuilder::<Missing, Missing, ()>::get("/scheduler/events/{id}/executions")
        .operation_id("scheduler.list_executions")
        .summary("List execution history for an event")
        .tag("scheduler")
        .path_param("id", "Event id")
        .handler(list_executions)
        .json_response_with_schema::<Vec<ExecutionRecord>>(openapi, 200, "Execution history")
        .problem_response(openapi, 404, "Unknown event")
        .register(router, openapi);

    router = OperationBuilder::<Missing, Missing, ()>::post("/scheduler/events/{id}/pause")
        .operation_id("scheduler.pause")
        .summary("Pause an event")
        .tag("scheduler")
        .path_param("id", "Event id")
        .handler(pause_event)
        .json_response(204, "Paused")
        .problem_response(openapi, 404, "Unknown event")
        .problem_response(openapi, 409, "Event is running")
        .register(router, openapi);

    router = OperationBuilder::<Missing, Missing, ()>::post("/scheduler/events/{id}/resume")
        .operation_id("scheduler.resume")
        .summary("Resume a paused event")
        .tag("scheduler")
        .path_param("id", "Event id")
        .handler(resume_event)
        .json_response(204, "Resumed")
        .problem_response(openapi, 404, "Unknown event")
        .register(router, openapi);

    router = OperationBuilder::<Missing, Missing, ()>::post("/scheduler/events/{id}/cancel")
        .operation_id("scheduler.cancel")
        .summary("Cancel an event")
        .tag("scheduler")
        .path_param("id", "Event id")
        .handler(cancel_event)
        .json_response(204, "Cancelled")
        .problem_response(openapi, 404, "Unknown event")
        .register(router, openapi);

    router = OperationBuilder::<Missing, Missing, ()>::post("/scheduler/events/{id}/run-now")
        .operation_id("scheduler.run_now")
        .summary("Fire an event immediately without disturbing its schedule")
        .tag("scheduler")
        .path_param("id", "Event id")
        .handler(run_now)
        .json_response(202, "Execution id")
        .problem_response(openapi, 404, "Unknown event")
        .problem_response(openapi, 409, "Event is already running")
        .register(router, openapi);

    router = OperationBuilder::<Missing, Missing, ()>::post("/scheduler/cleanup/register")
        .operation_id("scheduler.register_cleanup")
        .summary("Register a directory cleanup policy")
        .tag("housekeeper")
        .json_request::<CleanupRegistrationSpec>(openapi, "Cleanup registration")
        .handler(register_cleanup)
        .json_response(201, "Registration id")
        .problem_response(openapi, 400, "No policy field set")
        .register(router, openapi);

    router = OperationBuilder::<Missing, Missing, ()>::get("/scheduler/cleanup")
        .operation_id("scheduler.list_cleanup")
        .summary("List cleanup registrations")
        .tag("housekeeper")
        .handler(list_cleanup)
        .json_response_with_schema::<Vec<CleanupRegistration>>(openapi, 200, "Cleanup registrations")
        .register(router, openapi);

    router = OperationBuilder::<Missing, Missing, ()>::post("/scheduler/cleanup/run")
        .operation_id("scheduler.run_cleanup")
        .summary("Run one cleanup registration")
        .tag("housekeeper")
        .query_param("registration_id", true, "Registration to run")
        .query_param("dry_run", false, "Report candidates without deleting")
        .handler(run_cleanup)
        .json_response_with_schema::<CleanupReport>(openapi, 200, "Cleanup report")
        .problem_response(openapi, 404, "Unknown registration")
        .register(router, openapi);

    router = router.layer(Extension(state));
    router = modkit::api::mount_standard_routes(
        router,
        openapi,
        "/scheduler",
        "scheduler",
        &["rest", "phase2"],
        None,
    );
    Ok(router)
}

async fn list_events(
    Extension(state): Extension<RestState>,
    Query(filters): Query<EventFilters>,
) -> Result<Json<Vec<ScheduledEvent>>, SchedulerError> {
    Ok(Json(state.engine.list(&filters).await?))
}

async fn schedule_event(
    Extension(state): Extension<RestState>,
    Json(spec): Json<EventSpec>,
) -> Result<(axum::http::StatusCode, Json<serde_json::Value>), SchedulerError> {
    let id = state.engine.schedule(spec).await?;
    Ok((axum::http::StatusCode::CREATED, Json(serde_json::json!({ "id": id }))))
}

async fn get_event(
    Extension(state): Extension<RestState>,
    Path(id): Path<String>,
) -> Result<Json<ScheduledEvent>, SchedulerError> {
    Ok(Json(state.engine.get(&id).await?))
}

async fn update_event(
    Extension(state): Extension<RestState>,
    Path(id): Path<String>,
    Json(update): Json<EventUpdate>,
) -> Result<Json<ScheduledEvent>, SchedulerError> {
    Ok(Json(state.engine.update(&id, update).await?))
}

async fn list_executions(
    Extension(state): Extension<RestState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<ExecutionRecord>>, SchedulerError> {
    state.engine.get(&id).await?;
    Ok(Json(state.engine.list_executions(&id).await?))
}

async fn pause_event(
    Extension(state): Extension<RestState>,
    Path(id): Path<String>,
) -> Result<axum::http::StatusCode, SchedulerError> {
    state.engine.pause(&id).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

async fn resume_event(
    Extension(state): Extension<RestState>,
    Path(id): Path<String>,
) -> Result<axum::http::StatusCode, SchedulerError> {
    state.engine.resume(&id).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

async fn cancel_event(
    Extension(state): Extension<RestState>,
    Path(id): Path<String>,
) -> Result<axum::http::StatusCode, SchedulerError> {
    state.engine.cancel(&id).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

async fn run_now(
    Extension(state): Extension<RestState>,
    Path(id): Path<String>,
) -> Result<(axum::http::StatusCode, Json<serde_json::Value>), SchedulerError> {
    let execution_id = state.engine.run_now(&id).await?;
    Ok((
        axum::http::StatusCode::ACCEPTED,
        Json(serde_json::json!({ "execution_id": execution_id })),
    ))
}

async fn register_cleanup(
    Extension(state): Extension<RestState>,
    Json(spec): Json<CleanupRegistrationSpec>,
) -> Result<(axum::http::StatusCode, Json<serde_json::Value>), SchedulerError> {
    let id = state.engine.register_cleanup(spec).await?;
    Ok((axum::http::StatusCode::CREATED, Json(serde_json::json!({ "id": id }))))
}

async fn list_cleanup(
    Extension(state): Extension<RestState>,
) -> Result<Json<Vec<CleanupRegistration>>, SchedulerError> {
    Ok(Json(state.engine.list_cleanup_registrations().await?))
}

#[derive(Debug, Deserialize)]
struct RunCleanupQuery {
    registration_id: String,
    #[serde(default)]
    dry_run: bool,
}

async fn run_cleanup(
    Extension(state): Extension<RestState>,
    Query(q): Query<RunCleanupQuery>,
) -> Result<Json<CleanupReport>, SchedulerError> {
    Ok(Json(state.engine.run_cleanup(&q.registration_id, q.dry_run).await?))
}
