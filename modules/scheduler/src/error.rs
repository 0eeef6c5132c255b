use axum::http::StatusCode;
use axum::response::IntoResponse;
use modkit::api::problem::{Problem, ProblemResponse};

/// Closed set of failure modes the scheduler and housekeeper can produce.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("unknown event '{0}'")]
    NotFound(String),
    #[error("function not registered: {0}.{1}")]
    FunctionNotFound(String, String),
    #[error("invalid parameters: {0}")]
    ParameterInvalid(String),
    #[error("event '{0}' is already running")]
    AlreadyRunning(String),
    #[error("storage error: {0}")]
    Storage(String),
    #[error("cleanup directory missing: {0}")]
    DirectoryMissing(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
}

impl From<modkit_db::DbError> for SchedulerError {
    fn from(e: modkit_db::DbError) -> Self {
        SchedulerError::Storage(e.to_string())
    }
}

impl From<sqlx::Error> for SchedulerError {
    fn from(e: sqlx::Error) -> Self {
        SchedulerError::Storage(e.to_string())
    }
}

impl SchedulerError {
    pub fn to_problem(&self) -> Problem {
        match self {
            SchedulerError::NotFound(id) => {
                Problem::new(StatusCode::NOT_FOUND, "Not Found", format!("event '{id}' not found"))
                    .with_code("NOT_FOUND")
            }
            SchedulerError::FunctionNotFound(m, f) => Problem::new(
                StatusCode::BAD_REQUEST,
                "Bad Request",
                format!("no function registered as '{m}.{f}'"),
            )
            .with_code("FUNCTION_NOT_FOUND"),
            SchedulerError::ParameterInvalid(detail) => {
                Problem::new(StatusCode::BAD_REQUEST, "Bad Request", detail.clone())
                    .with_code("PARAMETER_INVALID")
            }
            SchedulerError::AlreadyRunning(id) => Problem::new(
                StatusCode::CONFLICT,
                "Conflict",
                format!("event '{id}' is already running"),
            )
            .with_code("ALREADY_RUNNING"),
            SchedulerError::Storage(detail) => Problem::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal Server Error",
                detail.clone(),
            )
            .with_code("STORAGE_ERROR"),
            SchedulerError::DirectoryMissing(dir) => Problem::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal Server Error",
                format!("directory missing: {dir}"),
            )
            .with_code("DIRECTORY_MISSING"),
            SchedulerError::PermissionDenied(detail) => Problem::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal Server Error",
                detail.clone(),
            )
            .with_code("PERMISSION_DENIED"),
        }
    }
}

impl IntoResponse for SchedulerError {
    fn into_response(self) -> axum::response::Response {
        ProblemResponse::from(self.to_problem()).into_response()
    }
}
