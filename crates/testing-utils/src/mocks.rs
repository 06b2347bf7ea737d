//! APM backend doubles

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use traza_observability::{
    ApmBackend, ApmError, ApmResult, CapturedError, LabelValue, Outcome, SpanHandle,
};

/// Everything a [`RecordingApmBackend`] observed, in call order.
#[derive(Debug, Clone, PartialEq)]
pub enum ApmEvent {
    TransactionStarted {
        name: String,
        kind: String,
    },
    SpanStarted {
        name: String,
        span_type: String,
        parent: Option<String>,
    },
    Label {
        target: String,
        key: String,
        value: LabelValue,
    },
    OutcomeSet {
        target: String,
        outcome: Outcome,
    },
    ErrorCaptured {
        target: String,
        name: String,
        message: String,
    },
    OrphanError {
        message: String,
    },
    Ended {
        target: String,
    },
}

type EventLog = Arc<Mutex<Vec<ApmEvent>>>;

fn push(events: &EventLog, event: ApmEvent) {
    events
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push(event);
}

/// In-memory backend recording every call.
#[derive(Debug, Clone)]
pub struct RecordingApmBackend {
    active: Arc<AtomicBool>,
    events: EventLog,
}

impl RecordingApmBackend {
    pub fn new() -> Self {
        Self {
            active: Arc::new(AtomicBool::new(true)),
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn inactive() -> Self {
        let backend = Self::new();
        backend.set_active(false);
        backend
    }

    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<ApmEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn transactions_started(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ApmEvent::TransactionStarted { name, .. } => Some(name),
                _ => None,
            })
            .collect()
    }

    pub fn spans_started(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ApmEvent::SpanStarted { name, .. } => Some(name),
                _ => None,
            })
            .collect()
    }

    /// Last value of each label set on `target`
    pub fn labels_for(&self, target: &str) -> HashMap<String, LabelValue> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ApmEvent::Label { target: t, key, value } if t == target => Some((key, value)),
                _ => None,
            })
            .collect()
    }

    pub fn outcome_of(&self, target: &str) -> Option<Outcome> {
        self.events().into_iter().rev().find_map(|event| match event {
            ApmEvent::OutcomeSet { target: t, outcome } if t == target => Some(outcome),
            _ => None,
        })
    }

    pub fn end_count(&self, target: &str) -> usize {
        self.events()
            .iter()
            .filter(|event| matches!(event, ApmEvent::Ended { target: t } if t == target))
            .count()
    }

    pub fn captured_errors(&self) -> Vec<(String, String)> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ApmEvent::ErrorCaptured { target, message, .. } => Some((target, message)),
                _ => None,
            })
            .collect()
    }
}

impl Default for RecordingApmBackend {
    fn default() -> Self {
        Self::new()
    }
}

struct RecordingHandle {
    name: String,
    events: EventLog,
}

impl SpanHandle for RecordingHandle {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_label(&self, key: &str, value: LabelValue) -> ApmResult<()> {
        push(
            &self.events,
            ApmEvent::Label {
                target: self.name.clone(),
                key: key.to_string(),
                value,
            },
        );
        Ok(())
    }

    fn set_outcome(&self, outcome: Outcome) -> ApmResult<()> {
        push(
            &self.events,
            ApmEvent::OutcomeSet {
                target: self.name.clone(),
                outcome,
            },
        );
        Ok(())
    }

    fn capture_error(&self, error: &CapturedError) -> ApmResult<()> {
        push(
            &self.events,
            ApmEvent::ErrorCaptured {
                target: self.name.clone(),
                name: error.name.clone(),
                message: error.message.clone(),
            },
        );
        Ok(())
    }

    fn end(&self) -> ApmResult<()> {
        push(
            &self.events,
            ApmEvent::Ended {
                target: self.name.clone(),
            },
        );
        Ok(())
    }
}

impl ApmBackend for RecordingApmBackend {
    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn start_transaction(&self, name: &str, kind: &str) -> ApmResult<Arc<dyn SpanHandle>> {
        push(
            &self.events,
            ApmEvent::TransactionStarted {
                name: name.to_string(),
                kind: kind.to_string(),
            },
        );
        Ok(Arc::new(RecordingHandle {
            name: name.to_string(),
            events: Arc::clone(&self.events),
        }))
    }

    fn start_span(
        &self,
        parent: Option<&dyn SpanHandle>,
        name: &str,
        span_type: &str,
        _subtype: Option<&str>,
        _action: Option<&str>,
    ) -> ApmResult<Arc<dyn SpanHandle>> {
        push(
            &self.events,
            ApmEvent::SpanStarted {
                name: name.to_string(),
                span_type: span_type.to_string(),
                parent: parent.map(|handle| handle.name().to_string()),
            },
        );
        Ok(Arc::new(RecordingHandle {
            name: name.to_string(),
            events: Arc::clone(&self.events),
        }))
    }

    fn capture_orphan_error(&self, error: &CapturedError) -> ApmResult<()> {
        push(
            &self.events,
            ApmEvent::OrphanError {
                message: error.message.clone(),
            },
        );
        Ok(())
    }
}

/// Active backend whose every operation fails. Exercises error containment.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingApmBackend;

impl ApmBackend for FailingApmBackend {
    fn is_active(&self) -> bool {
        true
    }

    fn start_transaction(&self, _name: &str, _kind: &str) -> ApmResult<Arc<dyn SpanHandle>> {
        Err(ApmError::Unavailable("collector unreachable".to_string()))
    }

    fn start_span(
        &self,
        _parent: Option<&dyn SpanHandle>,
        _name: &str,
        _span_type: &str,
        _subtype: Option<&str>,
        _action: Option<&str>,
    ) -> ApmResult<Arc<dyn SpanHandle>> {
        Err(ApmError::Unavailable("collector unreachable".to_string()))
    }

    fn capture_orphan_error(&self, _error: &CapturedError) -> ApmResult<()> {
        Err(ApmError::Backend("capture rejected".to_string()))
    }
}
