//! Normalization of anything a wrapped call can fail with.

use std::any::Any;

use serde_json::{json, Value};
use traza_core::ApiErrorEnvelope;
use traza_observability::CapturedError;

/// A failure observed by the interceptor, before it becomes an envelope.
#[derive(Debug)]
pub(crate) struct Failure {
    name: &'static str,
    message: String,
    stack: Vec<String>,
    envelope: Option<ApiErrorEnvelope>,
}

impl Failure {
    pub(crate) fn from_error(error: anyhow::Error) -> Self {
        match error.downcast::<ApiErrorEnvelope>() {
            Ok(envelope) => Self {
                name: "ApiErrorEnvelope",
                message: envelope.message.clone(),
                stack: Vec::new(),
                envelope: Some(envelope),
            },
            Err(error) => Self {
                name: "Error",
                message: error.to_string(),
                stack: error.chain().skip(1).map(ToString::to_string).collect(),
                envelope: None,
            },
        }
    }

    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|text| text.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "panic with non-string payload".to_string());

        Self {
            name: "Panic",
            message,
            stack: Vec::new(),
            envelope: None,
        }
    }

    pub(crate) fn message(&self) -> &str {
        &self.message
    }

    /// `{error, stack, name}` as written to the error log entry
    pub(crate) fn log_detail(&self) -> Value {
        json!({
            "error": self.message,
            "stack": self.stack,
            "name": self.name,
        })
    }

    pub(crate) fn captured(&self) -> CapturedError {
        CapturedError::new(self.name, self.message.clone()).with_chain(self.stack.clone())
    }

    /// Envelopes pass through untouched; everything else becomes the generic internal error.
    pub(crate) fn into_envelope(self, transaction_id: &str) -> ApiErrorEnvelope {
        self.envelope
            .unwrap_or_else(|| ApiErrorEnvelope::internal().with_transaction_id(transaction_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;
    use traza_core::envelope::{INTERNAL_ERROR_CODE, INTERNAL_ERROR_MESSAGE};

    #[test]
    fn test_raw_error_becomes_internal_envelope() {
        let failure = Failure::from_error(anyhow::anyhow!("boom"));
        assert_eq!(failure.message(), "boom");
        assert_eq!(failure.log_detail()["name"], "Error");

        let envelope = failure.into_envelope("T-1");
        assert_eq!(envelope.response_code, INTERNAL_ERROR_CODE);
        assert_eq!(envelope.message, INTERNAL_ERROR_MESSAGE);
        assert_eq!(envelope.transaction_id, "T-1");
    }

    #[test]
    fn test_envelope_passes_through() {
        let original = ApiErrorEnvelope::not_found("Pago no encontrado").with_transaction_id("T-0");
        let failure = Failure::from_error(anyhow::Error::new(original.clone()));
        assert_eq!(failure.log_detail()["name"], "ApiErrorEnvelope");
        assert_eq!(failure.into_envelope("T-other"), original);
    }

    #[test]
    fn test_envelope_found_behind_context() {
        let original = ApiErrorEnvelope::bad_request("monto inválido");
        let error = Err::<(), _>(original.clone())
            .context("validating payment")
            .unwrap_err();
        assert_eq!(Failure::from_error(error).into_envelope("T"), original);
    }

    #[test]
    fn test_cause_chain_kept_for_logs() {
        let error = Err::<(), _>(std::io::Error::new(std::io::ErrorKind::Other, "socket closed"))
            .context("calling gateway")
            .unwrap_err();
        let failure = Failure::from_error(error);
        assert_eq!(failure.message(), "calling gateway");
        assert_eq!(failure.log_detail()["stack"], json!(["socket closed"]));
    }

    #[test]
    fn test_panic_payloads() {
        assert_eq!(Failure::from_panic(Box::new("static")).message(), "static");
        assert_eq!(Failure::from_panic(Box::new(String::from("owned"))).message(), "owned");
        assert_eq!(Failure::from_panic(Box::new(3u8)).log_detail()["name"], "Panic");
    }
}
