use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum IntervalUnit {
    Minutes,
    Hours,
    Days,
    Weeks,
    Months,
}

/// Trigger configuration for a scheduled event. Exactly one shape is valid
/// per `kind`; `schedule()` rejects a spec whose fields don't match its
/// declared `kind`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "UPPERCASE")]
pub enum Trigger {
    Once {
        next_execution: DateTime<Utc>,
    },
    Interval {
        interval_amount: u32,
        interval_unit: IntervalUnit,
        next_execution: DateTime<Utc>,
    },
    Cron {
        expression: String,
    },
}

impl Trigger {
    pub fn kind_str(&self) -> &'static str {
        match self {
            Trigger::Once { .. } => "ONCE",
            Trigger::Interval { .. } => "INTERVAL",
            Trigger::Cron { .. } => "CRON",
        }
    }

    pub fn recurring(&self) -> bool {
        !matches!(self, Trigger::Once { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventStatus {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventStatus::Pending => "PENDING",
            EventStatus::Running => "RUNNING",
            EventStatus::Paused => "PAUSED",
            EventStatus::Completed => "COMPLETED",
            EventStatus::Failed => "FAILED",
            EventStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "PENDING" => EventStatus::Pending,
            "RUNNING" => EventStatus::Running,
            "PAUSED" => EventStatus::Paused,
            "COMPLETED" => EventStatus::Completed,
            "FAILED" => EventStatus::Failed,
            "CANCELLED" => EventStatus::Cancelled,
            _ => return None,
        })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, EventStatus::Completed | EventStatus::Failed | EventStatus::Cancelled)
    }
}

/// Request payload for `schedule()` / the create-event HTTP endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct EventSpec {
    pub module_id: String,
    pub function_name: String,
    #[serde(default)]
    pub parameters: serde_json::Value,
    pub trigger: Trigger,
    #[serde(default)]
    pub description: Option<String>,
    pub timeout_seconds: Option<u64>,
}

/// Fields `update()` is allowed to change; status transitions go through the
/// dedicated verbs instead.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct EventUpdate {
    pub parameters: Option<serde_json::Value>,
    pub trigger: Option<Trigger>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ScheduledEvent {
    pub id: String,
    pub module_id: String,
    pub function_name: String,
    pub parameters: serde_json::Value,
    pub trigger: Trigger,
    pub status: EventStatus,
    pub description: Option<String>,
    pub timeout_seconds: u64,
    pub next_fire_at: Option<DateTime<Utc>>,
    pub last_fire_at: Option<DateTime<Utc>>,
    pub missed_fires: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum ExecutionOutcome {
    Success,
    Failed,
    Timeout,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ExecutionRecord {
    pub id: String,
    pub event_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub outcome: Option<ExecutionOutcome>,
    pub error_kind: Option<String>,
    pub error_message: Option<String>,
}

/// Filters accepted by `list()` / `GET /scheduler/events`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventFilters {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub module_id: Option<String>,
    #[serde(default)]
    pub function_name: Option<String>,
    #[serde(default)]
    pub recurring: Option<bool>,
    #[serde(default)]
    pub limit: Option<u32>,
}
