//! Scheduler and Housekeeper.
//!
//! Other modules register schedulable work via `inventory` (see
//! [`function_registry`]), then call into [`SchedulerEngine`] (exposed
//! through the container as a future extension point, or directly through
//! this crate) to schedule, inspect, and control events. The module itself
//! owns the background tick loop and the reserved daily cleanup sweep.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use modkit::api::OpenApiRegistry;
use modkit::{Lifecycle, Module, ModuleCtx, Phase2Module, RestfulModule, StatefulModule};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

pub mod engine;
pub mod error;
pub mod function_registry;
pub mod housekeeper;
pub mod model;
mod rest;
mod store;
mod trigger;

pub use engine::{SchedulerConfig, SchedulerEngine, SELF_MODULE_ID};
pub use error::SchedulerError;
pub use function_registry::{FunctionDecl, FunctionRegistrator, HandlerFn, HandlerFuture, HandlerResult};
pub use housekeeper::{CleanupRegistration, CleanupRegistrationSpec, CleanupReport};
pub use model::*;

fn scheduler_defaults() -> Value {
    serde_json::json!({
        "tick_interval_seconds": 2,
        "max_in_flight": 8,
        "default_timeout_seconds": 30,
        "housekeeper_cron": "0 3 * * *",
    })
}

inventory::submit! {
    settings::SettingsSchemaRegistrator(settings::SettingsSchemaDecl {
        module_id: "scheduler",
        env_prefix: "CORE_SCHEDULER_",
        defaults_json: scheduler_defaults,
    })
}

#[modkit::module(
    name = "scheduler",
    deps = ["settings"],
    capabilities = [rest, stateful, phase2],
    services_required = ["core.settings.service"],
    phase2_ops = [("load_config", 30, ["settings.load_baseline"], required)],
)]
#[derive(Default)]
pub struct SchedulerModule {
    engine: OnceLock<Arc<SchedulerEngine>>,
    lc: Lifecycle,
}

impl SchedulerModule {
    pub fn engine(&self) -> Arc<SchedulerEngine> {
        self.engine.get().expect("scheduler module not initialized").clone()
    }
}

#[async_trait]
impl Module for SchedulerModule {
    async fn init(&self, ctx: &ModuleCtx) -> anyhow::Result<()> {
        let db = ctx
            .db_async()
            .await?
            .ok_or_else(|| anyhow::anyhow!("scheduler module requires a database"))?;
        let engine = Arc::new(SchedulerEngine::new(db));
        engine.ensure_schema().await?;
        engine.recover().await?;
        self.engine
            .set(engine)
            .map_err(|_| anyhow::anyhow!("scheduler module initialized twice"))?;
        Ok(())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

#[async_trait]
impl Phase2Module for SchedulerModule {
    async fn run_phase2(&self, method_name: &str, ctx: &ModuleCtx) -> anyhow::Result<()> {
        match method_name {
            "load_config" => {
                let resolver = ctx
                    .container()
                    .get::<settings::SettingsResolver>("core.settings.service")
                    .ok_or_else(|| anyhow::anyhow!("scheduler: core.settings.service not available"))?;
                let baseline = resolver
                    .baseline_for("scheduler")
                    .ok_or_else(|| anyhow::anyhow!("scheduler: settings schema not resolved"))?;
                let config: SchedulerConfig = serde_json::from_value(baseline.merged)
                    .map_err(|e| anyhow::anyhow!("scheduler: invalid resolved settings: {e}"))?;
                self.engine().set_config(config);
                self.engine().ensure_housekeeper_scheduled().await?;
                Ok(())
            }
            other => anyhow::bail!("scheduler: unknown phase2 op '{other}'"),
        }
    }
}

impl RestfulModule for SchedulerModule {
    fn register_rest(
        &self,
        _ctx: &ModuleCtx,
        router: Router,
        openapi: &dyn OpenApiRegistry,
    ) -> anyhow::Result<Router> {
        rest::register_routes(router, openapi, self.engine())
    }
}

#[async_trait]
impl StatefulModule for SchedulerModule {
    async fn start(&self, external_cancel: CancellationToken) -> anyhow::Result<()> {
        let engine = self.engine();
        let composed = external_cancel.child_token();
        self.lc
            .start_with_token(composed, move |cancel| async move {
                engine.run_loop(cancel).await;
                Ok(())
            })
            .map_err(anyhow::Error::from)
    }

    async fn stop(&self, external_cancel: CancellationToken) -> anyhow::Result<()> {
        tokio::select! {
            res = self.lc.stop(Duration::from_secs(30)) => {
                res.map_err(anyhow::Error::from)?;
                Ok(())
            }
            _ = external_cancel.cancelled() => {
                self.lc.stop(Duration::from_millis(0)).await.map_err(anyhow::Error::from)?;
                Ok(())
            }
        }
    }
}

