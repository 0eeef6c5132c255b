use axum::http::StatusCode;
use axum::response::IntoResponse;
use modkit::api::problem::{Problem, ProblemResponse};

#[derive(Debug, thiserror::Error)]
pub enum GreeterError {
    #[error("greeter has no database configured")]
    NoDatabase,
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<sqlx::Error> for GreeterError {
    fn from(e: sqlx::Error) -> Self {
        GreeterError::Storage(e.to_string())
    }
}

impl GreeterError {
    fn to_problem(&self) -> Problem {
        match self {
            GreeterError::NoDatabase => Problem::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal Server Error",
                self.to_string(),
            )
            .with_code("STORAGE_ERROR"),
            GreeterError::Storage(detail) => {
                Problem::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error", detail.clone())
                    .with_code("STORAGE_ERROR")
            }
        }
    }
}

impl IntoResponse for GreeterError {
    fn into_response(self) -> axum::response::Response {
        ProblemResponse::from(self.to_problem()).into_response()
    }
}
