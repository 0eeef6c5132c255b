// Exercises every `#[module(...)]` key the macro accepts.
use modkit_macros::module;

#[derive(Default)]
#[module(
    name = "full",
    deps = ["settings"],
    capabilities = [rest, stateful, phase2],
    services = [("full.service", 10)],
    services_required = ["core.settings.service"],
    settings_schema = "full",
    phase1 = ["load_defaults"],
    phase2_ops = [("load_config", 30, ["settings.load_baseline"], required)],
    shutdown_graceful = [("drain", 10, 5000)],
    shutdown_force = [("kill", 10, 0)],
    health_check = ("ping", 30),
    auto_service = ("full.service", 10),
    integrity_base = "full.base",
)]
pub struct Full;

#[async_trait::async_trait]
impl modkit::Module for Full {
    async fn init(&self, _ctx: &modkit::ModuleCtx) -> anyhow::Result<()> {
        Ok(())
    }
    fn as_any(&self) -> &dyn core::any::Any {
        self
    }
}

#[async_trait::async_trait]
impl modkit::Phase2Module for Full {
    async fn run_phase2(&self, _method_name: &str, _ctx: &modkit::ModuleCtx) -> anyhow::Result<()> {
        Ok(())
    }
}

#[async_trait::async_trait]
impl modkit::StatefulModule for Full {
    async fn start(&self, _cancel: tokio_util::sync::CancellationToken) -> anyhow::Result<()> {
        Ok(())
    }
    async fn stop(&self, _cancel: tokio_util::sync::CancellationToken) -> anyhow::Result<()> {
        Ok(())
    }
}

impl modkit::RestfulModule for Full {
    fn register_rest(
        &self,
        _ctx: &modkit::ModuleCtx,
        router: axum::Router,
        _openapi: &dyn modkit::api::OpenApiRegistry,
    ) -> anyhow::Result<axum::Router> {
        Ok(router)
    }
}

fn main() {}
