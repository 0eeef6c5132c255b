use axum::http::StatusCode;
use axum::response::IntoResponse;
use modkit::api::problem::{Problem, ProblemResponse};

/// Closed set of failure modes the settings resolver can produce, mapped to
/// the RFC 9457 problem responses its HTTP surface returns.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("unknown module '{0}'")]
    UnknownModule(String),
    #[error("settings validation failed: {0}")]
    ValidationFailed(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<modkit_db::DbError> for SettingsError {
    fn from(e: modkit_db::DbError) -> Self {
        SettingsError::Storage(e.to_string())
    }
}

impl From<sqlx::Error> for SettingsError {
    fn from(e: sqlx::Error) -> Self {
        SettingsError::Storage(e.to_string())
    }
}

impl SettingsError {
    fn to_problem(&self) -> Problem {
        match self {
            SettingsError::UnknownModule(m) => Problem::new(
                StatusCode::NOT_FOUND,
                "Not Found",
                format!("no settings schema registered for module '{m}'"),
            )
            .with_code("UNKNOWN_DEPENDENCY"),
            SettingsError::ValidationFailed(detail) => {
                Problem::new(StatusCode::BAD_REQUEST, "Bad Request", detail.clone())
                    .with_code("SETTINGS_VALIDATION_FAILED")
            }
            SettingsError::Storage(detail) => Problem::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal Server Error",
                detail.clone(),
            )
            .with_code("STORAGE_ERROR"),
        }
    }
}

impl IntoResponse for SettingsError {
    fn into_response(self) -> axum::response::Response {
        ProblemResponse::from(self.to_problem()).into_response()
    }
}
