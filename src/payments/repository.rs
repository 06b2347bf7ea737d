use std::collections::HashMap;

use anyhow::bail;
use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use traza_core::ApiErrorEnvelope;
use traza_interceptor::{CallArg, Instrumented};

use super::model::{Payment, PaymentStatus};

/// Storage port of the payments module.
#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn insert(&self, payment: Payment) -> Result<Payment, ApiErrorEnvelope>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Payment>, ApiErrorEnvelope>;

    /// All payments, oldest first, optionally filtered by status
    async fn list(&self, status: Option<PaymentStatus>) -> Result<Vec<Payment>, ApiErrorEnvelope>;

    async fn update_status(
        &self,
        id: &str,
        status: PaymentStatus,
    ) -> Result<Option<Payment>, ApiErrorEnvelope>;
}

pub struct InMemoryPaymentRepository {
    payments: RwLock<HashMap<String, Payment>>,
    instrumented: Instrumented,
}

impl InMemoryPaymentRepository {
    pub fn new(instrumented: Instrumented) -> Self {
        Self {
            payments: RwLock::new(HashMap::new()),
            instrumented,
        }
    }
}

#[async_trait]
impl PaymentRepository for InMemoryPaymentRepository {
    async fn insert(&self, payment: Payment) -> Result<Payment, ApiErrorEnvelope> {
        let args = [CallArg::of(&payment)];
        self.instrumented
            .execute("insert", &args, async move {
                let mut payments = self.payments.write().await;
                if payments.contains_key(&payment.id) {
                    bail!("duplicate key: payment {} already stored", payment.id);
                }
                payments.insert(payment.id.clone(), payment.clone());
                Ok(payment)
            })
            .await
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Payment>, ApiErrorEnvelope> {
        self.instrumented
            .execute("find_by_id", &[CallArg::text(id)], async {
                Ok(self.payments.read().await.get(id).cloned())
            })
            .await
    }

    async fn list(&self, status: Option<PaymentStatus>) -> Result<Vec<Payment>, ApiErrorEnvelope> {
        self.instrumented
            .execute("list", &[CallArg::of(&status)], async {
                let payments = self.payments.read().await;
                let mut matching: Vec<Payment> = payments
                    .values()
                    .filter(|payment| status.map_or(true, |wanted| payment.status == wanted))
                    .cloned()
                    .collect();
                matching.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
                Ok(matching)
            })
            .await
    }

    async fn update_status(
        &self,
        id: &str,
        status: PaymentStatus,
    ) -> Result<Option<Payment>, ApiErrorEnvelope> {
        let args = [CallArg::text(id), CallArg::of(&status)];
        self.instrumented
            .execute("update_status", &args, async {
                let mut payments = self.payments.write().await;
                Ok(payments.get_mut(id).map(|payment| {
                    payment.status = status;
                    payment.updated_at = Utc::now();
                    payment.clone()
                }))
            })
            .await
    }
}
