//! Typed errors and HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("duplicate resource key: {0}")]
    DuplicateKey(String),
    #[error("invalid resource key: '{0}'")]
    InvalidKey(String),
    #[error("invalid identifier in resource '{resource}': '{ident}'")]
    InvalidIdentifier { resource: String, ident: String },
    #[error("config load: {0}")]
    Load(String),
    #[error("validation: {0}")]
    Validation(String),
}

/// Backing-store failure. The message is passed through for diagnosis with connection credentials removed.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct StorageError {
    pub message: String,
}

impl StorageError {
    pub fn new(message: impl Into<String>) -> Self {
        StorageError {
            message: redact_credentials(&message.into()),
        }
    }
}

impl From<sqlx::Error> for StorageError {
    fn from(e: sqlx::Error) -> Self {
        StorageError::new(e.to_string())
    }
}

fn credentials_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)([a-z][a-z0-9+.\-]*://)[^\s/@]+@").expect("static credentials pattern"))
}

/// Strip `user:password@` from anything shaped like a connection URL.
pub fn redact_credentials(message: &str) -> String {
    credentials_pattern()
        .replace_all(message, "${1}[redacted]@")
        .into_owned()
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("resource not found: {0}")]
    ResourceNotFound(String),
    #[error("record not found: {0}")]
    RecordNotFound(String),
    #[error("scope configuration: {0}")]
    ScopeConfiguration(String),
    #[error("usage: {0}")]
    Usage(String),
    #[error("missing anchor for record {0}")]
    MissingAnchor(String),
    #[error("storage: {0}")]
    Storage(#[from] StorageError),
    #[error("validation: {0}")]
    Validation(String),
    #[error("out of scope: {0}")]
    OutOfScope(String),
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        AppError::Storage(e.into())
    }
}

impl AppError {
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            AppError::ResourceNotFound(_) => (StatusCode::NOT_FOUND, "resource_not_found"),
            AppError::RecordNotFound(_) => (StatusCode::NOT_FOUND, "record_not_found"),
            AppError::ScopeConfiguration(_) => (StatusCode::INTERNAL_SERVER_ERROR, "scope_configuration_error"),
            AppError::Usage(_) => (StatusCode::BAD_REQUEST, "usage_error"),
            AppError::MissingAnchor(_) => (StatusCode::INTERNAL_SERVER_ERROR, "missing_anchor"),
            AppError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
            AppError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation_error"),
            AppError::OutOfScope(_) => (StatusCode::FORBIDDEN, "out_of_scope"),
            AppError::Unauthenticated(_) => (StatusCode::UNAUTHORIZED, "unauthenticated"),
        }
    }
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!(code, error = %self, "request failed");
        }
        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message: self.to_string(),
                details: None,
            },
        };
        (status, Json(body)).into_response()
    }
}
