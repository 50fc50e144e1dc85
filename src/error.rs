//! Error taxonomy shared by the binding layer and the HTTP surface.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use thiserror::Error;

use crate::server::ErrorEnvelope;

/// Errors surfaced by counter operations.
#[derive(Error, Debug)]
pub enum CounterError {
    /// Missing endpoint, unusable key, or a signer needed but absent.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// No contract binding is loaded.
    #[error("Counter contract not initialized. Please deploy the contract first. ({0})")]
    NotInitialized(String),

    /// Node or transport failure, including receipt timeouts.
    #[error("Chain call failed: {0}")]
    ChainCall(String),

    /// The contract reverted the transaction.
    #[error("Transaction rejected by contract: {0}")]
    StateTransitionRejected(String),

    #[error("Route not found: {0}")]
    NotFound(String),

    #[error("Method {method} not allowed on {path}")]
    MethodNotAllowed { method: String, path: String },
}

impl CounterError {
    pub fn status(&self) -> StatusCode {
        match self {
            CounterError::Configuration(_) | CounterError::NotInitialized(_) => {
                StatusCode::BAD_REQUEST
            }
            CounterError::NotFound(_) => StatusCode::NOT_FOUND,
            CounterError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            CounterError::ChainCall(_) | CounterError::StateTransitionRejected(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            CounterError::Configuration(_) => "CONFIGURATION_ERROR",
            CounterError::NotInitialized(_) => "NOT_INITIALIZED",
            CounterError::ChainCall(_) => "CHAIN_CALL_ERROR",
            CounterError::StateTransitionRejected(_) => "STATE_TRANSITION_REJECTED",
            CounterError::NotFound(_) => "NOT_FOUND",
            CounterError::MethodNotAllowed { .. } => "METHOD_NOT_ALLOWED",
        }
    }

    /// Builds a signer-required error for write paths on a read-only connection.
    pub fn signer_required() -> Self {
        CounterError::Configuration(
            "signer required, operate in read-only mode otherwise (set PRIVATE_KEY)".to_string(),
        )
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

impl IntoResponse for CounterError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(code = self.code(), error = %self, "Request failed");
        } else {
            tracing::warn!(code = self.code(), error = %self, "Request rejected");
        }

        let body = ErrorEnvelope::new(
            status,
            ErrorBody {
                code: self.code(),
                message: self.to_string(),
            },
        );
        (status, Json(body)).into_response()
    }
}
