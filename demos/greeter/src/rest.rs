use std::sync::Arc;

use axum::extract::{Extension, Path};
use axum::Json;
use modkit::api::{Missing, OpenApiRegistry, OperationBuilder};
use serde::Serialize;
use utoipa::ToSchema;

use crate::error::GreeterError;
use crate::GreeterService;

#[derive(Debug, Serialize, ToSchema)]
struct GreetingDto {
    message: String,
}

#[derive(Debug, Serialize, ToSchema)]
struct GreeterStatsDto {
    greetings_served: i64,
}

pub fn register_routes(
    mut router: axum::Router,
    openapi: &dyn OpenApiRegistry,
    service: Arc<GreeterService>,
) -> anyhow::Result<axum::Router> {
    router = OperationBuilder::<Missing, Missing, ()>::get("/greeter/hello/{name}")
        .operation_id("greeter.hello")
        .summary("Greet a visitor by name and record the visit")
        .tag("greeter")
        .path_param("name", "Visitor name")
        .handler(hello)
        .json_response_with_schema::<GreetingDto>(openapi, 200, "Greeting message")
        .problem_response(openapi, 500, "Internal Server Error")
        .register(router, openapi);

    router = OperationBuilder::<Missing, Missing, ()>::get("/greeter/stats")
        .operation_id("greeter.stats")
        .summary("Count of greetings served so far")
        .tag("greeter")
        .handler(stats)
        .json_response_with_schema::<GreeterStatsDto>(openapi, 200, "Greeter stats")
        .problem_response(openapi, 500, "Internal Server Error")
        .register(router, openapi);

    router = router.layer(Extension(service));
    router = modkit::api::mount_standard_routes(
        router,
        openapi,
        "/greeter",
        "greeter",
        &["rest", "phase2"],
        Some(30),
    );
    Ok(router)
}

async fn hello(
    Extension(service): Extension<Arc<GreeterService>>,
    Path(name): Path<String>,
) -> Result<Json<GreetingDto>, GreeterError> {
    let message = service.greet(&name).await?;
    Ok(Json(GreetingDto { message }))
}

async fn stats(
    Extension(service): Extension<Arc<GreeterService>>,
) -> Result<Json<GreeterStatsDto>, GreeterError> {
    let greetings_served = service.count().await?;
    Ok(Json(GreeterStatsDto { greetings_served }))
}
