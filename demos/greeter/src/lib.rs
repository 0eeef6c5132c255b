//! Greeter: a narrow demo module exercising the declarative module system's
//! full annotation surface (service advertisement, settings schema, Phase-2
//! dependency on another module's operation, a shutdown hook, a health
//! check, a data-integrity base, an auto-created service, a bootstrap
//! database-model declaration, and a scheduler-callable function) without
//! any real business logic behind it.

use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use axum::Router;
use modkit::api::OpenApiRegistry;
use modkit::{Module, ModuleCtx, Phase2Module, RestfulModule};
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::Value;

mod error;
mod rest;
mod store;

pub use error::GreeterError;

const DATABASE_NAME: &str = "greeter";

inventory::submit! {
    bootstrap::DatabaseModelRegistrator(bootstrap::DatabaseModelDecl {
        database_name: DATABASE_NAME,
        tables: &[bootstrap::TableSpec {
            name: "greetings",
            create_sql: "CREATE TABLE IF NOT EXISTS greetings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                greeted_at TEXT NOT NULL
            )",
        }],
    })
}

fn greeter_defaults() -> Value {
    serde_json::json!({ "greeting_template": "Hello, {name}!" })
}

inventory::submit! {
    settings::SettingsSchemaRegistrator(settings::SettingsSchemaDecl {
        module_id: "greeter",
        env_prefix: "CORE_GREETER_",
        defaults_json: greeter_defaults,
    })
}

#[derive(Debug, Deserialize)]
struct GreeterConfig {
    greeting_template: String,
}

/// Service registered into the container as `demo.greeter.service`. Other
/// modules could look this up the same way `scheduler` looks up
/// `core.settings.service`.
pub struct GreeterService {
    db: OnceLock<Arc<modkit_db::DbHandle>>,
    template: RwLock<String>,
}

impl Default for GreeterService {
    fn default() -> Self {
        Self {
            db: OnceLock::new(),
            template: RwLock::new("Hello, {name}!".to_string()),
        }
    }
}

impl GreeterService {
    fn set_template(&self, template: String) {
        *self.template.write() = template;
    }

    pub async fn greet(&self, name: &str) -> Result<String, GreeterError> {
        let db = self.db.get().ok_or(GreeterError::NoDatabase)?;
        store::record_greeting(db, name).await?;
        Ok(self.template.read().replace("{name}", name))
    }

    pub async fn count(&self) -> Result<i64, GreeterError> {
        let db = self.db.get().ok_or(GreeterError::NoDatabase)?;
        store::count_greetings(db).await
    }
}

/// Process-wide handle the scheduler's function registry can reach from a
/// plain `fn` pointer, which cannot close over module state directly.
static GREETER_SERVICE: OnceLock<Arc<GreeterService>> = OnceLock::new();

fn send_scheduled_greeting(params: Value) -> scheduler::HandlerFuture {
    Box::pin(async move {
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("scheduled visitor")
            .to_string();
        let service = GREETER_SERVICE
            .get()
            .ok_or_else(|| "greeter module not initialized".to_string())?;
        let message = service
            .greet(&name)
            .await
            .map_err(|e| e.to_string())?;
        Ok(serde_json::json!({ "message": message }))
    })
}

inventory::submit! {
    scheduler::FunctionRegistrator(scheduler::FunctionDecl {
        module_id: "greeter",
        function_name: "send_scheduled_greeting",
        handler: send_scheduled_greeting,
    })
}

#[modkit::module(
    name = "greeter",
    deps = ["settings"],
    capabilities = [rest, phase2],
    services = [("demo.greeter.service", 60)],
    services_required = ["core.settings.service"],
    settings_schema = "greeter",
    phase1 = ["register_client"],
    phase2_ops = [("load_greeting", 40, ["settings.load_baseline"], required)],
    shutdown_graceful = [("say_goodbye", 500, 2000)],
    health_check = ("check_health", 30),
    auto_service = ("demo.greeter.auto_client", 15),
    integrity_base = "settings",
)]
#[derive(Default)]
pub struct GreeterModule {
    service: Arc<GreeterService>,
}

#[async_trait]
impl Module for GreeterModule {
    async fn init(&self, ctx: &ModuleCtx) -> anyhow::Result<()> {
        if let Some(db) = ctx.db_async().await? {
            store::ensure_schema(&db).await?;
            let _ = self.service.db.set(db);
        }
        ctx.container()
            .register("demo.greeter.service", self.service.clone(), 60)
            .map_err(|e| anyhow::anyhow!("{e}"))?;
        let _ = GREETER_SERVICE.set(self.service.clone());

        ctx.container().register_shutdown(
            "greeter.say_goodbye",
            modkit::ShutdownKind::Graceful,
            500,
            std::time::Duration::from_secs(2),
            || Box::pin(async move {
                tracing::info!("greeter: goodbye!");
                Ok(())
            }),
        );
        Ok(())
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn auto_created_service(&self) -> Option<Arc<dyn std::any::Any + Send + Sync>> {
        Some(self.service.clone() as Arc<dyn std::any::Any + Send + Sync>)
    }
}

#[async_trait]
impl Phase2Module for GreeterModule {
    async fn run_phase2(&self, method_name: &str, ctx: &ModuleCtx) -> anyhow::Result<()> {
        match method_name {
            "load_greeting" => {
                let resolver = ctx
                    .container()
                    .get::<settings::SettingsResolver>("core.settings.service")
                    .ok_or_else(|| anyhow::anyhow!("greeter: core.settings.service not available"))?;
                let baseline = resolver
                    .baseline_for("greeter")
                    .ok_or_else(|| anyhow::anyhow!("greeter: settings schema not resolved"))?;
                let config: GreeterConfig = serde_json::from_value(baseline.merged)
                    .map_err(|e| anyhow::anyhow!("greeter: invalid resolved settings: {e}"))?;
                self.service.set_template(config.greeting_template);
                Ok(())
            }
            other => anyhow::bail!("greeter: unknown phase2 op '{other}'"),
        }
    }
}

impl RestfulModule for GreeterModule {
    fn register_rest(
        &self,
        _ctx: &ModuleCtx,
        router: Router,
        openapi: &dyn OpenApiRegistry,
    ) -> anyhow::Result<Router> {
        rest::register_routes(router, openapi, self.service.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_is_registered_via_inventory() {
        let registry = modkit::ModuleRegistry::discover_and_build().expect("build registry");
        let module = registry.modules().iter().find(|m| m.name == "greeter");
        assert!(module.is_some(), "greeter module should be discoverable via inventory");
    }

    #[test]
    fn descriptor_declares_full_c2_surface() {
        let metadata = modkit::MetadataRegistry::discover();
        let descriptor = metadata.get("greeter").expect("greeter descriptor should be registered");
        assert_eq!(descriptor.dependencies, &["settings"]);
        assert!(descriptor.services_advertised.iter().any(|s| s.name == "demo.greeter.service"));
        assert!(descriptor.services_required.contains(&"core.settings.service"));
        assert_eq!(descriptor.settings_schema, Some("greeter"));
        assert!(!descriptor.phase2_operations.is_empty());
        assert!(descriptor.phase2_operations.iter().any(|op| op.method_name == "load_greeting" && op.required));
        assert!(!descriptor.shutdown_hooks.is_empty());
        assert!(descriptor.health_check.is_some());
        assert!(descriptor.auto_service_creation.is_some());
        assert!(descriptor.data_integrity.is_some());
    }

    #[tokio::test]
    async fn auto_created_service_registers_under_the_declared_name() {
        let module = GreeterModule::default();
        let cancel = tokio_util::sync::CancellationToken::new();
        let ctx = modkit::context::ModuleCtxBuilder::new(cancel).build();
        Module::init(&module, &ctx).await.expect("init succeeds without a database");

        let metadata = modkit::MetadataRegistry::discover();
        let descriptor = metadata.get("greeter").expect("greeter descriptor should be registered");
        let auto = descriptor.auto_service_creation.as_ref().expect("declares auto_service");

        let instance = module.auto_created_service().expect("module exposes its auto-created service");
        ctx.container()
            .register_erased(auto.service_name, instance, auto.priority)
            .expect("registers under the declared name");

        assert!(ctx.container().get::<GreeterService>("demo.greeter.auto_client").is_some());
    }

    #[test]
    fn default_greeting_template_is_used_until_phase2_overrides_it() {
        let service = GreeterService::default();
        assert_eq!(*service.template.read(), "Hello, {name}!");
    }
}
