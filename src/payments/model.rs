use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use traza_core::ApiErrorEnvelope;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Authorized,
    Settled,
    Rejected,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Authorized => "AUTHORIZED",
            PaymentStatus::Settled => "SETTLED",
            PaymentStatus::Rejected => "REJECTED",
        }
    }

    /// Allowed moves: PENDING -> AUTHORIZED | REJECTED, AUTHORIZED -> SETTLED.
    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        matches!(
            (self, next),
            (PaymentStatus::Pending, PaymentStatus::Authorized)
                | (PaymentStatus::Pending, PaymentStatus::Rejected)
                | (PaymentStatus::Authorized, PaymentStatus::Settled)
        )
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = ApiErrorEnvelope;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "PENDING" => Ok(PaymentStatus::Pending),
            "AUTHORIZED" => Ok(PaymentStatus::Authorized),
            "SETTLED" => Ok(PaymentStatus::Settled),
            "REJECTED" => Ok(PaymentStatus::Rejected),
            _ => Err(ApiErrorEnvelope::bad_request(format!(
                "Estado de pago desconocido: {s}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Payment {
    pub id: String,
    /// Minor units (cents)
    pub amount: i64,
    pub currency: String,
    pub reference: Option<String>,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentRequest {
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub reference: Option<String>,
}

impl CreatePaymentRequest {
    pub fn validate(&self) -> Result<(), ApiErrorEnvelope> {
        if self.amount <= 0 {
            return Err(ApiErrorEnvelope::bad_request(
                "El monto debe ser mayor que cero",
            ));
        }
        let currency = self.currency.trim();
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ApiErrorEnvelope::bad_request(
                "La moneda debe ser un código ISO 4217 de tres letras",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaymentQuery {
    pub status: Option<String>,
}

/// Status change published on the payment events topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentEvent {
    pub payment_id: String,
    pub status: PaymentStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions() {
        assert!(PaymentStatus::Pending.can_transition_to(PaymentStatus::Authorized));
        assert!(PaymentStatus::Authorized.can_transition_to(PaymentStatus::Settled));
        assert!(!PaymentStatus::Settled.can_transition_to(PaymentStatus::Pending));
        assert!(!PaymentStatus::Pending.can_transition_to(PaymentStatus::Settled));
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("settled".parse::<PaymentStatus>().unwrap(), PaymentStatus::Settled);
        let err = "lost".parse::<PaymentStatus>().unwrap_err();
        assert_eq!(err.response_code, 400);
    }

    #[test]
    fn test_create_request_validation() {
        let ok = CreatePaymentRequest {
            amount: 1500,
            currency: "MXN".to_string(),
            reference: None,
        };
        assert!(ok.validate().is_ok());

        let zero = CreatePaymentRequest { amount: 0, ..ok.clone() };
        assert_eq!(zero.validate().unwrap_err().message_code, "BAD_REQUEST");

        let bad_currency = CreatePaymentRequest {
            currency: "pesos".to_string(),
            ..ok
        };
        assert!(bad_currency.validate().is_err());
    }
}
