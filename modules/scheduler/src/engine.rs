//! Core scheduler engine: persistence-backed event CRUD, the
//! background tick loop, and the reserved housekeeper job.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::SchedulerError;
use crate::function_registry;
use crate::housekeeper::{self, CleanupRegistration, CleanupRegistrationSpec, CleanupReport};
use crate::model::{EventFilters, EventSpec, EventStatus, EventUpdate, ExecutionOutcome, ExecutionRecord, ScheduledEvent};
use crate::trigger;

/// Reserved module id for the scheduler's own background jobs (its
/// housekeeper run), namespaced the same way any other module's events are.
pub const SELF_MODULE_ID: &str = "kernel.scheduler";
const HOUSEKEEPER_FUNCTION: &str = "run_housekeeping";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub tick_interval_seconds: u64,
    pub max_in_flight: usize,
    pub default_timeout_seconds: u64,
    pub housekeeper_cron: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_seconds: 2,
            max_in_flight: 8,
            default_timeout_seconds: 30,
            housekeeper_cron: "0 3 * * *".to_string(),
        }
    }
}

pub struct SchedulerEngine {
    db: Arc<modkit_db::DbHandle>,
    config: RwLock<SchedulerConfig>,
    /// Events currently RUNNING, keyed by event id, so ticks and `run_now`
    /// calls can detect overlap and serialize against it, and `cancel` can
    /// reach the in-flight invocation cooperatively.
    running: DashMap<String, CancellationToken>,
}

impl SchedulerEngine {
    pub fn new(db: Arc<modkit_db::DbHandle>) -> Self {
        Self { db, config: RwLock::new(SchedulerConfig::default()), running: DashMap::new() }
    }

    pub fn set_config(&self, config: SchedulerConfig) {
        *self.config.write() = config;
    }

    pub fn config(&self) -> SchedulerConfig {
        self.config.read().clone()
    }

    pub async fn ensure_schema(&self) -> Result<(), SchedulerError> {
        crate::store::ensure_schema(&self.db).await
    }

    /// Ensure the reserved housekeeper cron event exists. Called once from
    /// `init()`, after `ensure_schema`.
    pub async fn ensure_housekeeper_scheduled(&self) -> Result<(), SchedulerError> {
        let existing = crate::store::list_events(
            &self.db,
            &EventFilters {
                module_id: Some(SELF_MODULE_ID.to_string()),
                function_name: Some(HOUSEKEEPER_FUNCTION.to_string()),
                ..Default::default()
            },
        )
        .await?;
        if existing.iter().any(|e| !e.status.is_terminal()) {
            return Ok(());
        }
        let cron = self.config().housekeeper_cron.clone();
        self.schedule(EventSpec {
            module_id: SELF_MODULE_ID.to_string(),
            function_name: HOUSEKEEPER_FUNCTION.to_string(),
            parameters: Value::Null,
            trigger: crate::model::Trigger::Cron { expression: cron },
            description: Some("scheduler's own cleanup sweep".to_string()),
            timeout_seconds: Some(300),
        })
        .await?;
        Ok(())
    }

    // -- CRUD -----------------------------------------------------------

    pub async fn schedule(&self, spec: EventSpec) -> Result<String, SchedulerError> {
        if spec.module_id != SELF_MODULE_ID && !function_registry::exists(&spec.module_id, &spec.function_name) {
            return Err(SchedulerError::FunctionNotFound(spec.module_id, spec.function_name));
        }
        let now = Utc::now();
        let next_fire_at = trigger::initial_fire_at(&spec.trigger, now).map_err(SchedulerError::ParameterInvalid)?;
        let event = ScheduledEvent {
            id: Uuid::new_v4().to_string(),
            module_id: spec.module_id,
            function_name: spec.function_name,
            parameters: spec.parameters,
            trigger: spec.trigger,
            status: EventStatus::Pending,
            description: spec.description,
            timeout_seconds: spec.timeout_seconds.unwrap_or(self.config().default_timeout_seconds),
            next_fire_at: Some(next_fire_at),
            last_fire_at: None,
            missed_fires: 0,
            created_at: now,
            updated_at: now,
        };
        let id = event.id.clone();
        crate::store::insert_event(&self.db, &event).await?;
        Ok(id)
    }

    pub async fn get(&self, id: &str) -> Result<ScheduledEvent, SchedulerError> {
        crate::store::get_event(&self.db, id).await?.ok_or_else(|| SchedulerError::NotFound(id.to_string()))
    }

    pub async fn list(&self, filters: &EventFilters) -> Result<Vec<ScheduledEvent>, SchedulerError> {
        crate::store::list_events(&self.db, filters).await
    }

    pub async fn list_executions(&self, event_id: &str) -> Result<Vec<ExecutionRecord>, SchedulerError> {
        crate::store::list_executions(&self.db, event_id).await
    }

    pub async fn update(&self, id: &str, update: EventUpdate) -> Result<ScheduledEvent, SchedulerError> {
        let event = self.get(id).await?;
        if event.status == EventStatus::Running {
            return Err(SchedulerError::AlreadyRunning(id.to_string()));
        }
        let now = Utc::now();
        let recomputed_next_fire = match &update.trigger {
            Some(trig) => Some(Some(trigger::initial_fire_at(trig, now).map_err(SchedulerError::ParameterInvalid)?)),
            None => None,
        };
        crate::store::update_fields(
            &self.db,
            id,
            update.parameters.as_ref(),
            update.trigger.as_ref(),
            update.description.as_deref(),
            recomputed_next_fire,
            now,
        )
        .await?;
        self.get(id).await
    }

    pub async fn pause(&self, id: &str) -> Result<(), SchedulerError> {
        let event = self.get(id).await?;
        match event.status {
            EventStatus::Pending => {
                crate::store::set_status(&self.db, id, EventStatus::Paused, Utc::now()).await
            }
            EventStatus::Running => Err(SchedulerError::AlreadyRunning(id.to_string())),
            other => Err(SchedulerError::ParameterInvalid(format!("cannot pause event in state {:?}", other))),
        }
    }

    pub async fn resume(&self, id: &str) -> Result<(), SchedulerError> {
        let event = self.get(id).await?;
        match event.status {
            EventStatus::Paused => {
                crate::store::set_status(&self.db, id, EventStatus::Pending, Utc::now()).await
            }
            other => Err(SchedulerError::ParameterInvalid(format!("cannot resume event in state {:?}", other))),
        }
    }

    pub async fn cancel(&self, id: &str) -> Result<(), SchedulerError> {
        let event = self.get(id).await?;
        if event.status.is_terminal() {
            return Ok(());
        }
        if let Some(token) = self.running.get(id) {
            token.cancel();
            return Ok(());
        }
        crate::store::update_fields(&self.db, id, None, None, None, Some(None), Utc::now()).await?;
        crate::store::set_status(&self.db, id, EventStatus::Cancelled, Utc::now()).await
    }

    /// Fire immediately without disturbing the persisted schedule: the
    /// event's status and `next_fire_at` are restored to their pre-fire
    /// values once the manual run completes.
    pub async fn run_now(&self, id: &str) -> Result<String, SchedulerError> {
        let event = self.get(id).await?;
        if event.status == EventStatus::Running || self.running.contains_key(id) {
            return Err(SchedulerError::AlreadyRunning(id.to_string()));
        }
        let token = CancellationToken::new();
        self.running.insert(id.to_string(), token.clone());
        let execution_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        crate::store::begin_run(&self.db, &event.id, &execution_id, started_at).await?;
        let (outcome, error_kind, error_message) = self.invoke(&event, &token).await;
        let ended_at = Utc::now();
        crate::store::complete_run(
            &self.db,
            &event.id,
            &execution_id,
            ended_at,
            outcome,
            error_kind.as_deref(),
            error_message.as_deref(),
            event.status,
            event.next_fire_at,
        )
        .await?;
        self.running.remove(id);
        Ok(execution_id)
    }

    // -- Crash recovery (startup) ----------------------------------------

    /// Finds events left RUNNING by a crash and recovers them. Called once
    /// from `init()`, before the tick loop starts.
    pub async fn recover(&self) -> Result<(), SchedulerError> {
        let now = Utc::now();
        for (event, execution_id) in crate::store::stuck_running_events(&self.db).await? {
            let (new_status, next_fire_at) = if event.trigger.recurring() {
                let base = event.next_fire_at.unwrap_or(now);
                match trigger::catch_up(&event.trigger, base, now) {
                    Ok((next, skipped)) => {
                        for _ in 0..skipped {
                            crate::store::increment_missed_fires(&self.db, &event.id).await?;
                        }
                        (EventStatus::Pending, Some(next))
                    }
                    Err(e) => {
                        tracing::error!(event = %event.id, error = %e, "scheduler: crash recovery could not compute next fire");
                        (EventStatus::Failed, None)
                    }
                }
            } else {
                (EventStatus::Failed, None)
            };
            crate::store::complete_run(
                &self.db,
                &event.id,
                &execution_id,
                now,
                ExecutionOutcome::Failed,
                Some("CRASH_RECOVERY"),
                Some("process restarted while event was running"),
                new_status,
                next_fire_at,
            )
            .await?;
            tracing::warn!(event = %event.id, "scheduler: recovered event stuck in RUNNING across restart");
        }
        Ok(())
    }

    // -- Tick loop ---------------------------------------------------------

    /// Runs until `cancel` fires. Bounded by `max_in_flight` concurrent
    /// dispatches; same-event overlap is prevented via `self.running`.
    pub async fn run_loop(self: Arc<Self>, cancel: CancellationToken) {
        let tick_interval = Duration::from_secs(self.config().tick_interval_seconds.max(1));
        let mut ticker = tokio::time::interval(tick_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut in_flight: JoinSet<()> = JoinSet::new();

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.clone().tick(&mut in_flight).await;
                }
                Some(res) = in_flight.join_next(), if !in_flight.is_empty() => {
                    if let Err(e) = res {
                        tracing::error!(error = %e, "scheduler: dispatch task panicked");
                    }
                }
            }
        }

        // Stop accepting new fires; await in-flight executions (C9 step 1).
        while in_flight.join_next().await.is_some() {}
    }

    async fn tick(self: Arc<Self>, in_flight: &mut JoinSet<()>) {
        let max_in_flight = self.config().max_in_flight;
        let now = Utc::now();
        let due = match crate::store::due_events(&self.db, now).await {
            Ok(events) => events,
            Err(e) => {
                tracing::error!(error = %e, "scheduler: failed to load due events");
                return;
            }
        };
        for event in due {
            if in_flight.len() >= max_in_flight {
                break;
            }
            if self.running.contains_key(&event.id) {
                if let Err(e) = crate::store::increment_missed_fires(&self.db, &event.id).await {
                    tracing::warn!(event = %event.id, error = %e, "scheduler: failed to record missed fire");
                }
                continue;
            }
            let token = CancellationToken::new();
            self.running.insert(event.id.clone(), token.clone());
            let engine = self.clone();
            in_flight.spawn(async move {
                engine.dispatch(event, token).await;
            });
        }
    }

    async fn dispatch(self: Arc<Self>, event: ScheduledEvent, token: CancellationToken) {
        let event_id = event.id.clone();
        let execution_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        if let Err(e) = crate::store::begin_run(&self.db, &event_id, &execution_id, started_at).await {
            tracing::error!(event = %event_id, error = %e, "scheduler: failed to begin run");
            self.running.remove(&event_id);
            return;
        }

        let (outcome, error_kind, error_message) = self.invoke(&event, &token).await;
        let ended_at = Utc::now();

        let (new_status, next_fire_at) = if outcome == ExecutionOutcome::Cancelled {
            (EventStatus::Cancelled, None)
        } else if event.trigger.recurring() {
            match trigger::next_fire_after(&event.trigger, ended_at) {
                Ok(next) => (EventStatus::Pending, next),
                Err(e) => {
                    tracing::error!(event = %event_id, error = %e, "scheduler: failed to compute next fire");
                    (EventStatus::Failed, None)
                }
            }
        } else {
            let status = if outcome == ExecutionOutcome::Success { EventStatus::Completed } else { EventStatus::Failed };
            (status, None)
        };

        if let Err(e) = crate::store::complete_run(
            &self.db,
            &event_id,
            &execution_id,
            ended_at,
            outcome,
            error_kind.as_deref(),
            error_message.as_deref(),
            new_status,
            next_fire_at,
        )
        .await
        {
            tracing::error!(event = %event_id, error = %e, "scheduler: failed to record completion");
        }

        self.running.remove(&event_id);
    }

    /// Runs the event's function (or the reserved housekeeper job) under a
    /// per-event timeout, racing a cooperative cancellation signal.
    async fn invoke(
        &self,
        event: &ScheduledEvent,
        cancel: &CancellationToken,
    ) -> (ExecutionOutcome, Option<String>, Option<String>) {
        let timeout_secs = if event.timeout_seconds > 0 { event.timeout_seconds } else { self.config().default_timeout_seconds };
        let timeout = Duration::from_secs(timeout_secs);

        if event.module_id == SELF_MODULE_ID && event.function_name == HOUSEKEEPER_FUNCTION {
            let fut = self.run_all_housekeeping();
            return race(fut, timeout, cancel, timeout_secs).await;
        }

        match function_registry::find(&event.module_id, &event.function_name) {
            None => (
                ExecutionOutcome::Failed,
                Some("FUNCTION_NOT_FOUND".to_string()),
                Some(format!("no function registered as '{}.{}'", event.module_id, event.function_name)),
            ),
            Some(handler) => {
                let fut = async move { handler(event.parameters.clone()).await };
                race(fut, timeout, cancel, timeout_secs).await
            }
        }
    }

    // -- Housekeeper --------------------------------------------------------

    pub async fn register_cleanup(&self, spec: CleanupRegistrationSpec) -> Result<String, SchedulerError> {
        spec.validate()?;
        let reg = spec.into_registration();
        let id = reg.id.clone();
        crate::store::insert_cleanup_registration(&self.db, &reg).await?;
        Ok(id)
    }

    pub async fn list_cleanup_registrations(&self) -> Result<Vec<CleanupRegistration>, SchedulerError> {
        crate::store::list_cleanup_registrations(&self.db).await
    }

    pub async fn run_cleanup(&self, registration_id: &str, dry_run: bool) -> Result<CleanupReport, SchedulerError> {
        let reg = crate::store::get_cleanup_registration(&self.db, registration_id)
            .await?
            .ok_or_else(|| SchedulerError::NotFound(registration_id.to_string()))?;
        let report = housekeeper::run_registration(&reg, dry_run)?;
        if !dry_run {
            crate::store::touch_cleanup_last_run(&self.db, registration_id, Utc::now()).await?;
        }
        Ok(report)
    }

    async fn run_all_housekeeping(&self) -> Result<Value, String> {
        let registrations = crate::store::list_cleanup_registrations(&self.db)
            .await
            .map_err(|e| e.to_string())?;
        let mut reports = Vec::new();
        for reg in registrations {
            match housekeeper::run_registration(&reg, false) {
                Ok(report) => {
                    let _ = crate::store::touch_cleanup_last_run(&self.db, &reg.id, Utc::now()).await;
                    reports.push(report);
                }
                Err(e) => {
                    tracing::warn!(registration = %reg.id, error = %e, "housekeeper: registration failed");
                }
            }
        }
        serde_json::to_value(&reports).map_err(|e| e.to_string())
    }
}

async fn race<F>(
    fut: F,
    timeout: Duration,
    cancel: &CancellationToken,
    timeout_secs: u64,
) -> (ExecutionOutcome, Option<String>, Option<String>)
where
    F: std::future::Future<Output = Result<Value, String>>,
{
    tokio::select! {
        res = tokio::time::timeout(timeout, fut) => match res {
            Ok(Ok(_value)) => (ExecutionOutcome::Success, None, None),
            Ok(Err(msg)) => (ExecutionOutcome::Failed, Some("HANDLER_ERROR".to_string()), Some(msg)),
            Err(_) => (ExecutionOutcome::Timeout, Some("TIMEOUT".to_string()), Some(format!("execution exceeded {timeout_secs}s timeout"))),
        },
        _ = cancel.cancelled() => (
            ExecutionOutcome::Cancelled,
            Some("CANCELLED".to_string()),
            Some("cancelled cooperatively by caller".to_string()),
        ),
    }
}
