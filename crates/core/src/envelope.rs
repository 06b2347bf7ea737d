//! The canonical error shape surfaced to every caller of a wrapped operation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context;

pub const INTERNAL_ERROR_CODE: u16 = 500;
pub const INTERNAL_ERROR_MESSAGE_CODE: &str = "INTERNAL_ERROR";
pub const INTERNAL_ERROR_MESSAGE: &str =
    "Ocurrió un error interno, por favor intente nuevamente más tarde.";

pub const TIMEOUT_CODE: u16 = 504;
pub const TIMEOUT_MESSAGE_CODE: &str = "REQUEST_TIMEOUT";
pub const TIMEOUT_MESSAGE: &str = "La solicitud excedió el tiempo máximo de espera.";

/// Error envelope: `{responseCode, messageCode, message, result?, transactionId, timestamp}`.
///
/// Business code that wants a specific status raises one of these directly;
/// anything else is flattened into [`ApiErrorEnvelope::internal`] by the
/// interceptor, so raw error text never reaches the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "camelCase")]
#[error("[{response_code}] {message_code}: {message}")]
pub struct ApiErrorEnvelope {
    pub response_code: u16,
    pub message_code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    pub transaction_id: String,
    pub timestamp: DateTime<Utc>,
}

impl ApiErrorEnvelope {
    /// Build an envelope stamped with the active transaction id (empty outside a scope).
    pub fn new(
        response_code: u16,
        message_code: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            response_code,
            message_code: message_code.into(),
            message: message.into(),
            result: None,
            transaction_id: context::current_transaction_id().unwrap_or_default(),
            timestamp: Utc::now(),
        }
    }

    /// Generic internal error with the fixed public retry message.
    pub fn internal() -> Self {
        Self::new(
            INTERNAL_ERROR_CODE,
            INTERNAL_ERROR_MESSAGE_CODE,
            INTERNAL_ERROR_MESSAGE,
        )
    }

    pub fn timeout() -> Self {
        Self::new(TIMEOUT_CODE, TIMEOUT_MESSAGE_CODE, TIMEOUT_MESSAGE)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(400, "BAD_REQUEST", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(404, "NOT_FOUND", message)
    }

    pub fn with_result(mut self, result: Value) -> Self {
        self.result = Some(result);
        self
    }

    pub fn with_transaction_id(mut self, transaction_id: impl Into<String>) -> Self {
        self.transaction_id = transaction_id.into();
        self
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.response_code)
    }

    pub fn is_server_error(&self) -> bool {
        self.response_code >= 500
    }
}
