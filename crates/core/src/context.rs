//! Transaction context propagation.
//!
//! A [`TransactionContext`] is bound to the current task with [`run`] and is
//! observed by every `.await` inside that future, however deeply nested.
//! Concurrent scopes are isolated: each `run` installs its own task-local slot
//! instead of touching a shared global.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::task::JoinHandle;

tokio::task_local! {
    static ACTIVE_CONTEXT: TransactionContext;
}

/// Immutable correlation scope for one logical operation (request, message, job).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransactionContext {
    transaction_id: Arc<str>,
}

impl TransactionContext {
    pub fn new(transaction_id: impl Into<String>) -> Self {
        Self {
            transaction_id: Arc::from(transaction_id.into()),
        }
    }

    /// Build a context with a freshly generated id
    pub fn generate(generator: &dyn TransactionIdGenerator) -> Self {
        Self::new(generator.generate())
    }

    pub fn transaction_id(&self) -> &str {
        &self.transaction_id
    }
}

/// Execute `future` with `context` bound for its whole dynamic extent.
///
/// The previous binding (or none) is visible again once the future settles.
/// The output, including any error, is returned unchanged.
pub fn run<F>(context: TransactionContext, future: F) -> impl Future<Output = F::Output>
where
    F: Future,
{
    ACTIVE_CONTEXT.scope(context, future)
}

/// Synchronous counterpart of [`run`].
pub fn run_sync<F, R>(context: TransactionContext, f: F) -> R
where
    F: FnOnce() -> R,
{
    ACTIVE_CONTEXT.sync_scope(context, f)
}

/// The active context, or `None` outside any scope.
pub fn current() -> Option<TransactionContext> {
    ACTIVE_CONTEXT.try_with(Clone::clone).ok()
}

pub fn current_transaction_id() -> Option<String> {
    ACTIVE_CONTEXT
        .try_with(|ctx| ctx.transaction_id().to_string())
        .ok()
}

/// Spawn a Tokio task that inherits the caller's active context.
///
/// Task-local values do not cross `tokio::spawn` on their own, so the context
/// is captured here and re-installed around the spawned future.
pub fn spawn_in_context<F>(future: F) -> JoinHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    match current() {
        Some(context) => tokio::spawn(ACTIVE_CONTEXT.scope(context, future)),
        None => tokio::spawn(future),
    }
}

/// Source of fresh transaction identifiers.
#[cfg_attr(test, mockall::automock)]
pub trait TransactionIdGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Random v4 UUIDs. Default generator.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidGenerator;

impl TransactionIdGenerator for UuidGenerator {
    fn generate(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// Monotonic ids of the form `<prefix>-<n>`, starting at 1.
#[derive(Debug)]
pub struct SequentialGenerator {
    prefix: String,
    next: AtomicU64,
}

impl SequentialGenerator {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }
}

impl TransactionIdGenerator for SequentialGenerator {
    fn generate(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}-{n}", self.prefix)
    }
}

/// Resolve the id used to seed a new scope.
///
/// Precedence: explicit inbound header, then the id carried by the message
/// envelope, then a generated one. Blank values are skipped.
pub fn resolve_transaction_id(
    header: Option<&str>,
    envelope_field: Option<&str>,
    generator: &dyn TransactionIdGenerator,
) -> String {
    [header, envelope_field]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|candidate| !candidate.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| generator.generate())
}
