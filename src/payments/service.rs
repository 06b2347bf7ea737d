use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;
use tracing::warn;
use traza_api::MessageEnvelope;
use traza_core::{current_transaction_id, to_log_value, ApiErrorEnvelope};
use traza_interceptor::{CallArg, Instrumented};
use uuid::Uuid;

use super::model::{CreatePaymentRequest, Payment, PaymentEvent, PaymentStatus};
use super::repository::PaymentRepository;

/// Topic the service publishes status changes to.
pub const PAYMENT_EVENTS_TOPIC: &str = "payments.events";

pub struct PaymentsService {
    repository: Arc<dyn PaymentRepository>,
    events: Option<mpsc::Sender<MessageEnvelope>>,
    instrumented: Instrumented,
}

impl PaymentsService {
    pub fn new(repository: Arc<dyn PaymentRepository>, instrumented: Instrumented) -> Self {
        Self {
            repository,
            events: None,
            instrumented,
        }
    }

    /// Publish an authorization request for every created payment
    pub fn with_events(mut self, events: mpsc::Sender<MessageEnvelope>) -> Self {
        self.events = Some(events);
        self
    }

    pub async fn create(&self, request: CreatePaymentRequest) -> Result<Payment, ApiErrorEnvelope> {
        self.instrumented
            .execute("create", &[CallArg::of(&request)], async {
                request.validate()?;

                let now = Utc::now();
                let payment = Payment {
                    id: Uuid::new_v4().to_string(),
                    amount: request.amount,
                    currency: request.currency.trim().to_uppercase(),
                    reference: request.reference.clone(),
                    status: PaymentStatus::Pending,
                    created_at: now,
                    updated_at: now,
                };
                let stored = self.repository.insert(payment).await?;
                self.publish(&stored.id, PaymentStatus::Authorized);
                Ok(stored)
            })
            .await
    }

    pub async fn get(&self, id: &str) -> Result<Payment, ApiErrorEnvelope> {
        self.instrumented
            .execute("get", &[CallArg::text(id)], async {
                let payment = self.repository.find_by_id(id).await?;
                payment.ok_or_else(|| anyhow::Error::from(not_found(id)))
            })
            .await
    }

    pub async fn list(&self, status: Option<PaymentStatus>) -> Result<Vec<Payment>, ApiErrorEnvelope> {
        self.instrumented
            .execute("list", &[CallArg::of(&status)], async {
                Ok(self.repository.list(status).await?)
            })
            .await
    }

    /// Apply a status change received from the events topic.
    pub async fn apply_event(&self, event: PaymentEvent) -> Result<Payment, ApiErrorEnvelope> {
        self.instrumented
            .execute("apply_event", &[CallArg::of(&event)], async {
                let current = self
                    .repository
                    .find_by_id(&event.payment_id)
                    .await?
                    .ok_or_else(|| not_found(&event.payment_id))?;

                if current.status == event.status {
                    return Ok(current);
                }
                if !current.status.can_transition_to(event.status) {
                    return Err(anyhow::Error::from(ApiErrorEnvelope::new(
                        409,
                        "INVALID_TRANSITION",
                        format!(
                            "No se puede pasar el pago de {} a {}",
                            current.status, event.status
                        ),
                    )));
                }

                let updated = self
                    .repository
                    .update_status(&event.payment_id, event.status)
                    .await?;
                updated.ok_or_else(|| anyhow::Error::from(not_found(&event.payment_id)))
            })
            .await
    }

    /// Settle every authorized payment. Returns how many were settled.
    pub async fn reconcile(&self) -> Result<usize, ApiErrorEnvelope> {
        self.instrumented
            .execute("reconcile", &[], async {
                let authorized = self.repository.list(Some(PaymentStatus::Authorized)).await?;
                let mut settled = 0;
                for payment in authorized {
                    if self
                        .repository
                        .update_status(&payment.id, PaymentStatus::Settled)
                        .await?
                        .is_some()
                    {
                        settled += 1;
                    }
                }
                Ok(settled)
            })
            .await
    }

    /// Queue a status change carrying the active transaction id; a full queue only warns.
    fn publish(&self, payment_id: &str, status: PaymentStatus) {
        let Some(events) = &self.events else {
            return;
        };

        let event = PaymentEvent {
            payment_id: payment_id.to_string(),
            status,
        };
        let mut message = MessageEnvelope::new(PAYMENT_EVENTS_TOPIC, to_log_value(&event))
            .with_key(payment_id);
        if let Some(transaction_id) = current_transaction_id() {
            message = message.with_transaction_id(transaction_id);
        }

        if let Err(e) = events.try_send(message) {
            warn!(payment_id, error = %e, "Payment event not published");
        }
    }
}

fn not_found(id: &str) -> ApiErrorEnvelope {
    ApiErrorEnvelope::not_found(format!("Pago {id} no encontrado"))
}
