use std::sync::Arc;

use async_trait::async_trait;
use traza_api::{MessageEnvelope, MessageHandler};
use traza_core::ApiErrorEnvelope;

use super::model::PaymentEvent;
use super::service::PaymentsService;

/// Applies payment status events to the service.
pub struct PaymentEventsHandler {
    service: Arc<PaymentsService>,
}

impl PaymentEventsHandler {
    pub fn new(service: Arc<PaymentsService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl MessageHandler for PaymentEventsHandler {
    async fn handle(&self, message: &MessageEnvelope) -> Result<(), ApiErrorEnvelope> {
        let event: PaymentEvent = serde_json::from_value(message.payload.clone()).map_err(|e| {
            ApiErrorEnvelope::bad_request(format!("Evento de pago inválido: {e}"))
        })?;
        self.service.apply_event(event).await?;
        Ok(())
    }
}
