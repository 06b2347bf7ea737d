use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use traza_core::ApiErrorEnvelope;

/// Everything an HTTP handler can fail with. Each variant is answered with
/// an [`ApiErrorEnvelope`] body whose `responseCode` is the HTTP status.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Already classified by a wrapped call
    #[error("{0}")]
    Envelope(#[from] ApiErrorEnvelope),

    /// Invalid input detected at the HTTP layer
    #[error("Solicitud inválida: {0}")]
    BadRequest(String),

    /// Unknown route or resource
    #[error("Recurso no encontrado: {0}")]
    NotFound(String),

    /// Body could not be parsed as the expected JSON
    #[error("Cuerpo JSON inválido: {0}")]
    JsonBody(#[from] JsonRejection),

    /// Response body could not be serialized
    #[error("Error de serialización: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ApiError {
    /// The envelope sent back to the client
    pub fn into_envelope(self) -> ApiErrorEnvelope {
        match self {
            ApiError::Envelope(envelope) => envelope,
            ApiError::BadRequest(message) => ApiErrorEnvelope::bad_request(message),
            ApiError::NotFound(message) => ApiErrorEnvelope::not_found(message),
            ApiError::JsonBody(rejection) => ApiErrorEnvelope::bad_request(rejection.body_text()),
            ApiError::Serialization(_) => ApiErrorEnvelope::internal(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        envelope_response(self.into_envelope())
    }
}

/// Translate an envelope into an HTTP response: status = `responseCode`, body = envelope JSON.
pub fn envelope_response(envelope: ApiErrorEnvelope) -> Response {
    let status =
        StatusCode::from_u16(envelope.response_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(envelope)).into_response()
}

/// Result type for HTTP handlers
pub type ApiResult<T> = Result<T, ApiError>;
