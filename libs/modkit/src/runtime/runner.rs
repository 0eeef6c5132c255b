//! ModKit runtime runner.
//!
//! Supported DB modes:
//!   - `DbOptions::None` — modules get no DB in their contexts.
//!   - `DbOptions::Manager` — modules use async DB access through DbManager.
//!
//! Design notes:
//! - We build **one stable ModuleCtx** (`base_ctx`) and reuse it across all phases
//!   (init → db → rest → start → wait → stop). When using DbManager, modules
//!   access databases asynchronously through the shared manager context.
//! - Shutdown can be driven by OS signals, an external `CancellationToken`,
//!   or an arbitrary future.

use crate::context::{ConfigProvider, ModuleCtxBuilder};
use crate::runtime::shutdown;
use std::{future::Future, pin::Pin, sync::Arc};
use tokio_util::sync::CancellationToken;

/// How the runtime should provide DBs to modules.
pub enum DbOptions {
    /// No database integration. `ModuleCtx::db()` will be `None`, `db_required()` will error.
    None,
    /// Use a DbManager to handle database connections with Figment-based configuration.
    Manager(Arc<modkit_db::DbManager>),
}

/// How the runtime should decide when to stop.
pub enum ShutdownOptions {
    /// Listen for OS signals (Ctrl+C / SIGTERM).
    Signals,
    /// An external `CancellationToken` controls the lifecycle.
    Token(CancellationToken),
    /// An arbitrary future; when it completes, we initiate shutdown.
    Future(Pin<Box<dyn Future<Output = ()> + Send>>),
}

/// Options for running the ModKit runner.
pub struct RunOptions {
    /// Provider of module config sections (raw JSON by module name).
    pub modules_cfg: Arc<dyn ConfigProvider>,
    /// DB strategy: none, or DbManager.
    pub db: DbOptions,
    /// Shutdown strategy.
    pub shutdown: ShutdownOptions,
}

/// Everything `run()` produces once the START phase has returned, before it
/// blocks waiting for shutdown. Exposed so integration tests can drive the
/// real boot sequence and inspect `ctx`/`registry` without waiting on
/// `cancel` to fire.
pub struct Booted {
    pub ctx: crate::context::ModuleCtx,
    pub registry: crate::registry::ModuleRegistry,
    pub cancel: CancellationToken,
}

/// Runs every phase up to and including START: discovery, metadata
/// validation, init, auto-service-creation, load-record success, REST
/// composition, Phase-2, start. Does not spawn a shutdown waiter — the
/// caller already owns `cancel` and decides when to stop.
pub async fn boot(opts: &RunOptions, cancel: CancellationToken) -> anyhow::Result<Booted> {
    let hub = Arc::new(crate::client_hub::ClientHub::default());

    // Discover modules upfront.
    let registry = crate::registry::ModuleRegistry::discover_and_build()?;

    // Metadata registry: descriptors collected independently of the
    // `ModuleRegistry`'s topo-sorted capability tables, validated once
    // before anything runs.
    let metadata = crate::descriptor::MetadataRegistry::discover();
    metadata
        .validate()
        .map_err(|errs| anyhow::anyhow!("module metadata validation failed: {errs:?}"))?;

    // Module Processor: seed the per-module load record for every
    // discovered module (steps 3-9) before any instance is constructed.
    let mut load_table = crate::processor::ModuleLoadTable::new();
    for descriptor in metadata.descriptors() {
        load_table.seed(descriptor);
    }

    // Build ONE stable base context used across all phases.
    let mut ctx_builder = ModuleCtxBuilder::new(cancel.clone())
        .with_client_hub(hub.clone())
        .with_config_provider(opts.modules_cfg.clone());

    // Add DbManager if using the new approach
    if let DbOptions::Manager(ref manager) = opts.db {
        ctx_builder = ctx_builder.with_db_manager(manager.clone());
    }

    let base_ctx = ctx_builder.build();

    // INIT phase
    tracing::info!("Phase: init");
    registry.run_init_phase(&base_ctx).await?;

    // Module Processor step 11: auto-create-and-register. Every module
    // that declared `auto_service = (name, priority)` built its instance
    // alongside itself (e.g. a `Default`-constructed field) and exposes it
    // via `Module::auto_created_service`; the runtime registers it here,
    // under the declared name/priority, so other modules can resolve it by
    // name like any other service.
    for descriptor in metadata.descriptors() {
        let Some(auto) = &descriptor.auto_service_creation else { continue };
        let Some(module) = registry.get_module(descriptor.module_id) else { continue };
        match module.auto_created_service() {
            Some(instance) => {
                base_ctx
                    .container()
                    .register_erased(auto.service_name, instance, auto.priority)
                    .map_err(|e| anyhow::anyhow!("{e}"))?;
            }
            None => {
                anyhow::bail!(
                    "module '{}' declares auto_service_creation ('{}') but Module::auto_created_service returned None",
                    descriptor.module_id,
                    auto.service_name
                );
            }
        }
    }

    // Module Processor: now that every module's instantiation,
    // auto-service-creation and Phase-1 sequence (folded together into
    // `init()` for each module) has returned successfully, merge
    // `runtime_info` into each module's load record. This must merge into
    // the record `seed` built above, never replace it — see
    // `processor::tests::record_success_merges_not_replaces`.
    let recorded_at = chrono::Utc::now();
    for descriptor in metadata.descriptors() {
        let active: Vec<String> = descriptor
            .services_advertised
            .iter()
            .map(|s| s.name.to_string())
            .filter(|name| base_ctx.container().contains(name))
            .collect();
        load_table.record_success(descriptor.module_id, active, recorded_at);
    }
    for record in load_table.all() {
        tracing::debug!(
            module = record.descriptor.module_id,
            reserved = record.services_reserved.len(),
            active = record.runtime_info.active_services.len(),
            "module load record"
        );
    }

    // DB MIGRATION phase
    match &opts.db {
        DbOptions::Manager(_) => {
            tracing::info!("Phase: db (manager)");
            // DbManager approach: modules will handle their own DB migration
            // during their lifecycle using async DB access
            // No centralized migration phase needed
        }
        DbOptions::None => {
            // No DB — nothing to migrate.
        }
    }

    // REST phase (synchronous router composition against ingress).
    tracing::info!("Phase: rest (sync)");
    let _ = registry.run_rest_phase(&base_ctx, axum::Router::new())?;

    // PHASE-2: cross-module async orchestration, run only after every
    // Phase-1 `init` has returned successfully for every module.
    tracing::info!("Phase: phase2");
    let phase2_modules = registry.phase2_modules();
    if !phase2_modules.is_empty() {
        let orchestrator = crate::phase2::Orchestrator::new(
            metadata.descriptors().to_vec(),
            phase2_modules,
        );
        let base_ctx_for_phase2 = base_ctx.clone();
        let summary = orchestrator
            .run(
                move |module_name| base_ctx_for_phase2.clone().for_module(module_name),
                base_ctx.container(),
            )
            .await
            .map_err(|e| anyhow::anyhow!("phase2 orchestration failed: {e}"))?;
        tracing::info!(
            ready = ?summary.ready,
            degraded = ?summary.degraded,
            failed = ?summary.failed,
            "Phase-2 orchestration complete"
        );
    }

    // START phase
    tracing::info!("Phase: start");
    registry.run_start_phase(cancel.clone()).await?;

    Ok(Booted { ctx: base_ctx, registry, cancel })
}

/// Full cycle: init → db → rest (sync) → start → wait → stop.
pub async fn run(opts: RunOptions) -> anyhow::Result<()> {
    // Stable components shared across all phases.
    let cancel = match &opts.shutdown {
        ShutdownOptions::Token(t) => t.clone(),
        _ => CancellationToken::new(),
    };

    let booted = boot(&opts, cancel.clone()).await?;

    // Spawn the shutdown waiter according to the chosen strategy. Spawned
    // after boot so `opts` can still be passed by reference to `boot` above
    // (this match moves `opts.shutdown` out of `opts`).
    match opts.shutdown {
        ShutdownOptions::Signals => {
            let c = cancel.clone();
            tokio::spawn(async move {
                match shutdown::wait_for_shutdown().await {
                    Ok(()) => {
                        tracing::info!("shutdown: signal received");
                    }
                    Err(e) => {
                        tracing::warn!(
                            error = %e,
                            "shutdown: primary waiter failed; falling back to ctrl_c()"
                        );
                        // Cross-platform fallback.
                        let _ = tokio::signal::ctrl_c().await;
                    }
                }
                c.cancel();
            });
        }
        ShutdownOptions::Future(waiter) => {
            let c = cancel.clone();
            tokio::spawn(async move {
                waiter.await;
                tracing::info!("shutdown: external future completed");
                c.cancel();
            });
        }
        ShutdownOptions::Token(_) => {
            // External owner controls lifecycle; nothing to spawn.
            tracing::info!("shutdown: external token will control lifecycle");
        }
    }

    // WAIT
    cancel.cancelled().await;

    // STOP phase
    tracing::info!("Phase: stop");
    booted.registry.run_stop_phase(cancel.clone()).await?;

    // SHUTDOWN COORDINATOR: run the container's registered shutdown
    // handlers — graceful first (priority ascending, each bounded by its own
    // timeout), then force — all within a global deadline. Database handles
    // close last.
    run_shutdown_coordinator(booted.ctx.container(), &opts.db).await;

    Ok(())
}

/// Global cap on the graceful shutdown phase (spec default: 60s). Overrun
/// does not block process exit — handlers still in flight are abandoned.
const SHUTDOWN_DEADLINE: std::time::Duration = std::time::Duration::from_secs(60);

async fn run_shutdown_coordinator(container: &crate::container::ServiceContainer, db: &DbOptions) {
    let deadline = tokio::time::Instant::now() + SHUTDOWN_DEADLINE;
    let mut handlers_run = 0u32;
    let mut timeouts = 0u32;
    let mut errors = 0u32;

    for kind in [
        crate::container::ShutdownKind::Graceful,
        crate::container::ShutdownKind::Force,
    ] {
        for handler in container.shutdown_handlers(kind) {
            handlers_run += 1;
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            let budget = handler.timeout.min(remaining);
            match tokio::time::timeout(budget, (handler.run)()).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    errors += 1;
                    tracing::warn!(handler = %handler.name, error = %err, "shutdown handler failed");
                }
                Err(_) => {
                    timeouts += 1;
                    tracing::warn!(handler = %handler.name, "shutdown handler timed out");
                }
            }
        }
    }

    if let DbOptions::Manager(manager) = db {
        manager.close_all().await;
    }

    tracing::info!(
        handlers_run,
        timeouts,
        errors,
        "Shutdown coordinator finished"
    );
}
