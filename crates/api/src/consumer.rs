//! Queue-message entry point: seeds the transaction context for each message
//! and decides whether it is acknowledged, redelivered or dead-lettered.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};
use traza_core::context::{self, resolve_transaction_id};
use traza_core::{
    ApiErrorEnvelope, LogMetadata, StructuredLogger, TransactionContext, TransactionIdGenerator,
    UuidGenerator,
};
use traza_observability::MetricsCollector;

use crate::middleware::TRANSACTION_ID_HEADER;

/// One inbound message as handed over by the broker client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageEnvelope {
    /// Topic the message was read from
    pub topic: String,
    /// Partition key, if the producer set one
    pub key: Option<String>,
    /// Broker headers; `x-transaction-id` seeds the context
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Transaction id carried inside the envelope by the producer
    pub transaction_id: Option<String>,
    /// Message body
    pub payload: Value,
}

impl MessageEnvelope {
    /// Envelope with no key, headers or transaction id
    pub fn new(topic: impl Into<String>, payload: Value) -> Self {
        Self {
            topic: topic.into(),
            key: None,
            headers: HashMap::new(),
            transaction_id: None,
            payload,
        }
    }

    /// Set the partition key
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Add a broker header
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Carry `transaction_id` in the envelope itself
    pub fn with_transaction_id(mut self, transaction_id: impl Into<String>) -> Self {
        self.transaction_id = Some(transaction_id.into());
        self
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// What the broker should do with a message after one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Processed; remove from the queue
    Ack,
    /// Transient failure; deliver again
    Retry,
    /// Give up and park the message
    DeadLetter,
}

impl Disposition {
    /// Label used in logs and metrics
    pub fn as_str(&self) -> &'static str {
        match self {
            Disposition::Ack => "ack",
            Disposition::Retry => "retry",
            Disposition::DeadLetter => "dead_letter",
        }
    }
}

/// Business handler for one topic.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Process one message. Failures must already be envelopes.
    async fn handle(&self, message: &MessageEnvelope) -> Result<(), ApiErrorEnvelope>;
}

/// Seeds a context per delivery and turns handler results into dispositions.
pub struct MessageConsumer {
    /// Business handler for the consumed topic
    handler: Arc<dyn MessageHandler>,
    /// Source of ids for messages that carry none
    generator: Arc<dyn TransactionIdGenerator>,
    /// Logger for failed deliveries
    logger: StructuredLogger,
    /// Disposition counters
    metrics: MetricsCollector,
    /// Deliveries allowed for a message failing with a server error
    max_retries: u32,
    /// Pause between redeliveries
    retry_backoff: Duration,
    /// Where dead-lettered messages are forwarded, if anywhere
    dead_letters: Option<mpsc::UnboundedSender<MessageEnvelope>>,
}

impl MessageConsumer {
    /// Consumer with UUID ids, 3 deliveries and a 100ms backoff
    pub fn new(handler: Arc<dyn MessageHandler>) -> Self {
        Self {
            handler,
            generator: Arc::new(UuidGenerator),
            logger: StructuredLogger::new("MessageConsumer"),
            metrics: MetricsCollector::new(),
            max_retries: 3,
            retry_backoff: Duration::from_millis(100),
            dead_letters: None,
        }
    }

    /// Use `generator` for messages without a transaction id
    pub fn with_generator(mut self, generator: Arc<dyn TransactionIdGenerator>) -> Self {
        self.generator = generator;
        self
    }

    /// Use an already configured logger
    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Deliveries allowed for a message failing with a server error.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Pause between redeliveries in [`MessageConsumer::process`]
    pub fn with_retry_backoff(mut self, retry_backoff: Duration) -> Self {
        self.retry_backoff = retry_backoff;
        self
    }

    /// Forward dead-lettered messages to `sender`
    pub fn with_dead_letters(mut self, sender: mpsc::UnboundedSender<MessageEnvelope>) -> Self {
        self.dead_letters = Some(sender);
        self
    }

    /// Deliver `message` once (`attempt` starts at 1) inside its own context scope.
    ///
    /// The id comes from the `x-transaction-id` header, then the envelope's
    /// `transactionId`, else a fresh one. Server errors are retried until
    /// `max_retries` deliveries; client errors go straight to dead letter.
    pub async fn dispatch(&self, message: &MessageEnvelope, attempt: u32) -> Disposition {
        let transaction_id = resolve_transaction_id(
            message.header(TRANSACTION_ID_HEADER),
            message.transaction_id.as_deref(),
            self.generator.as_ref(),
        );

        let outcome = context::run(
            TransactionContext::new(transaction_id.clone()),
            self.handler.handle(message),
        )
        .await;

        let disposition = match &outcome {
            Ok(()) => Disposition::Ack,
            Err(envelope) if envelope.is_server_error() && attempt < self.max_retries => {
                Disposition::Retry
            }
            Err(_) => Disposition::DeadLetter,
        };

        if let Err(envelope) = &outcome {
            let metadata = LogMetadata::new()
                .with_method_name("dispatch")
                .with_transaction_id(&transaction_id)
                .with_field("topic", &message.topic)
                .with_field("attempt", &attempt)
                .with_field("disposition", disposition.as_str())
                .with_response(envelope);
            let text = format!(
                "Mensaje de {} rechazado: {}",
                message.topic, envelope.message_code
            );
            match disposition {
                Disposition::Retry => self.logger.warn(&text, metadata),
                _ => self.logger.error(&text, metadata),
            }
        }

        debug!(
            topic = %message.topic,
            transaction_id = %transaction_id,
            attempt,
            disposition = disposition.as_str(),
            "Message dispatched"
        );
        self.metrics
            .record_message(&message.topic, disposition.as_str());
        disposition
    }

    /// Deliver until acknowledged or dead-lettered.
    pub async fn process(&self, message: MessageEnvelope) -> Disposition {
        let mut attempt = 1;
        loop {
            match self.dispatch(&message, attempt).await {
                Disposition::Retry => {
                    tokio::time::sleep(self.retry_backoff).await;
                    attempt += 1;
                }
                Disposition::DeadLetter => {
                    if let Some(sender) = &self.dead_letters {
                        if sender.send(message).is_err() {
                            warn!("Dead-letter receiver dropped");
                        }
                    }
                    return Disposition::DeadLetter;
                }
                Disposition::Ack => return Disposition::Ack,
            }
        }
    }

    /// Consume `messages` until the channel closes or shutdown is signalled.
    pub async fn run(
        &self,
        mut messages: mpsc::Receiver<MessageEnvelope>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        info!("Message consumer started");
        loop {
            tokio::select! {
                received = messages.recv() => {
                    match received {
                        Some(message) => {
                            self.process(message).await;
                        }
                        None => {
                            info!("Message channel closed");
                            break;
                        }
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("Message consumer received shutdown signal");
                    break;
                }
            }
        }
        info!("Message consumer stopped");
    }
}

impl std::fmt::Debug for MessageConsumer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageConsumer")
            .field("max_retries", &self.max_retries)
            .field("retry_backoff", &self.retry_backoff)
            .finish_non_exhaustive()
    }
}
