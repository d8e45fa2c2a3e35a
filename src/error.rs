//! The service's error taxonomy. Every fallible operation from the store up
//! through the facade returns `Result<T, Error>`; kinds are never collapsed
//! so callers (and tests) can pattern-match on them.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

#[derive(Debug, Clone)]
pub enum Error {
    InvalidId(String),
    InvalidContent(String),
    InvalidQuery(String),
    NotFound(String),
    ResultTooLarge(usize),
    Internal(String),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::InvalidId(_) | Error::InvalidContent(_) | Error::InvalidQuery(_) => {
                StatusCode::BAD_REQUEST
            }
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::ResultTooLarge(_) => StatusCode::BAD_REQUEST,
            Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Error::InvalidId(msg) => format!("invalid id: {msg}"),
            Error::InvalidContent(msg) => format!("invalid content: {msg}"),
            Error::InvalidQuery(msg) => format!("invalid query: {msg}"),
            Error::NotFound(id) => format!("not found: {id}"),
            Error::ResultTooLarge(n) => format!("result too large: {n} rows exceeds 5000"),
            Error::Internal(_) => "internal server error".to_string(),
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for Error {}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        if let Error::Internal(detail) = &self {
            tracing::error!(detail = %detail, "internal error");
        }
        let body = serde_json::json!({ "error": self.message() });
        (self.status_code(), Json(body)).into_response()
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Internal(e.to_string())
    }
}
