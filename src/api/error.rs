//! Errors surfaced to API callers

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Category of a failed request, serialized as `kind` in every error body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MethodNotAllowed,
    Unauthorized,
    Configuration,
    InvalidJson,
    PayloadTooLarge,
    Validation,
    NotFound,
    Store,
    Internal,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Method not allowed")]
    MethodNotAllowed,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Server missing ADMIN_SECRET")]
    SecretNotConfigured,

    #[error("Server missing store configuration")]
    StoreNotConfigured,

    #[error("Invalid JSON body")]
    InvalidJson,

    #[error("Request body too large")]
    PayloadTooLarge,

    #[error("{0}")]
    Validation(&'static str),

    #[error("Tap not found")]
    NotFound,

    #[error("{}", store_message(.source, .fallback))]
    Store {
        source: crate::Error,
        fallback: &'static str,
    },

    #[error("{0}")]
    Internal(String),
}

fn store_message(source: &crate::Error, fallback: &str) -> String {
    let message = source.to_string();
    if message.trim().is_empty() {
        fallback.to_string()
    } else {
        message
    }
}

impl ApiError {
    /// Wrap a store failure; `fallback` is reported when the store gave no message.
    pub fn store(fallback: &'static str) -> impl Fn(crate::Error) -> ApiError {
        move |source| ApiError::Store { source, fallback }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::MethodNotAllowed => ErrorKind::MethodNotAllowed,
            ApiError::Unauthorized => ErrorKind::Unauthorized,
            ApiError::SecretNotConfigured | ApiError::StoreNotConfigured => {
                ErrorKind::Configuration
            }
            ApiError::InvalidJson => ErrorKind::InvalidJson,
            ApiError::PayloadTooLarge => ErrorKind::PayloadTooLarge,
            ApiError::Validation(_) => ErrorKind::Validation,
            ApiError::NotFound => ErrorKind::NotFound,
            ApiError::Store { .. } => ErrorKind::Store,
            ApiError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::InvalidJson | ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Configuration | ErrorKind::Store | ErrorKind::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: ErrorKind,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let kind = self.kind();
        let message = self.to_string();

        if status.is_server_error() {
            tracing::error!(?kind, error = %message, "Request failed");
        } else {
            tracing::warn!(?kind, error = %message, "Request rejected");
        }

        (status, Json(ErrorBody { error: message, kind })).into_response()
    }
}
