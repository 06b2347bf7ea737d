//! Cycle-safe, size-bounded serialization for log and trace payloads.
//!
//! Logging must never crash or hang its caller. Every entry point here is
//! infallible: a value that cannot be serialized degrades to its original form
//! (or a placeholder), and reference graphs built from [`Shared`] nodes render
//! repeated references as [`CIRCULAR_SENTINEL`] instead of recursing.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use serde::{Serialize, Serializer};
use serde_json::Value;

pub const CIRCULAR_SENTINEL: &str = "[Circular]";
pub const TRUNCATION_MARKER: &str = "... [truncated]";
pub const UNSERIALIZABLE: &str = "[Unserializable]";

thread_local! {
    static VISITED: RefCell<Option<HashSet<usize>>> = const { RefCell::new(None) };
}

/// Owns the visited set for one top-level serialization.
///
/// Nested entries reuse the outer set, only the outermost guard clears it.
struct VisitScope {
    owner: bool,
}

impl VisitScope {
    fn enter() -> Self {
        VISITED.with(|visited| {
            let mut visited = visited.borrow_mut();
            if visited.is_none() {
                *visited = Some(HashSet::new());
                Self { owner: true }
            } else {
                Self { owner: false }
            }
        })
    }
}

impl Drop for VisitScope {
    fn drop(&mut self) {
        if self.owner {
            VISITED.with(|visited| *visited.borrow_mut() = None);
        }
    }
}

/// Reference-counted node of a possibly cyclic object graph.
///
/// Within one serialization, the first occurrence of a node is serialized in
/// full and every later occurrence of the same allocation becomes
/// `"[Circular]"`.
pub struct Shared<T: ?Sized>(Arc<T>);

impl<T> Shared<T> {
    pub fn new(value: T) -> Self {
        Self(Arc::new(value))
    }
}

impl<T: ?Sized> Shared<T> {
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }

    fn address(&self) -> usize {
        Arc::as_ptr(&self.0).cast::<()>() as usize
    }
}

impl<T: ?Sized> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T: ?Sized> Deref for Shared<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.0
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for Shared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Shared").field(&self.address()).finish()
    }
}

impl<T: ?Sized + Serialize> Serialize for Shared<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let _scope = VisitScope::enter();
        let address = self.address();
        // The borrow is released before descending so nested nodes can record themselves.
        let first_visit = VISITED.with(|visited| {
            visited
                .borrow_mut()
                .as_mut()
                .map_or(true, |set| set.insert(address))
        });

        if first_visit {
            self.0.serialize(serializer)
        } else {
            serializer.serialize_str(CIRCULAR_SENTINEL)
        }
    }
}

/// Outcome of [`serialize_for_log`].
#[derive(Debug)]
pub enum SafeLog<'a, T: ?Sized> {
    /// The value is loggable as-is.
    Original(&'a T),
    /// Serialized text cut to the configured size and suffixed with the marker.
    Truncated(String),
}

impl<T: ?Sized + Serialize> SafeLog<'_, T> {
    /// Collapse into a JSON value ready to embed in a log entry
    pub fn into_value(self) -> Value {
        match self {
            SafeLog::Original(value) => to_log_value(value),
            SafeLog::Truncated(text) => Value::String(text),
        }
    }

    pub fn is_truncated(&self) -> bool {
        matches!(self, SafeLog::Truncated(_))
    }
}

/// Bound a value for logging.
///
/// Falsy values (`null`, `false`, `0`, `""`), values that fail to serialize
/// and values whose serialized text fits within `max_size` come back as
/// [`SafeLog::Original`]. Without a limit (`None` or `0`) nothing is ever
/// truncated. Lengths are measured in characters.
pub fn serialize_for_log<T>(value: &T, max_size: Option<usize>) -> SafeLog<'_, T>
where
    T: ?Sized + Serialize,
{
    let Some(max_size) = max_size.filter(|limit| *limit > 0) else {
        return SafeLog::Original(value);
    };

    let text = {
        let _scope = VisitScope::enter();
        match serde_json::to_string(value) {
            Ok(text) => text,
            Err(_) => return SafeLog::Original(value),
        }
    };

    if is_falsy(&text) || text.chars().count() <= max_size {
        return SafeLog::Original(value);
    }

    SafeLog::Truncated(bound_text(text, Some(max_size)))
}

/// Cut already rendered text to `max_size` characters plus the truncation
/// marker. Without a limit (`None` or `0`) the text is kept whole.
pub fn bound_text(text: String, max_size: Option<usize>) -> String {
    match max_size.filter(|limit| *limit > 0) {
        Some(limit) if text.chars().count() > limit => {
            let mut truncated: String = text.chars().take(limit).collect();
            truncated.push_str(TRUNCATION_MARKER);
            truncated
        }
        _ => text,
    }
}

/// Cycle-safe conversion to a JSON value. Never fails.
pub fn to_log_value<T: ?Sized + Serialize>(value: &T) -> Value {
    let _scope = VisitScope::enter();
    serde_json::to_value(value).unwrap_or_else(|_| Value::String(UNSERIALIZABLE.to_string()))
}

/// Cycle-safe conversion to compact JSON text. Never fails.
pub fn to_log_string<T: ?Sized + Serialize>(value: &T) -> String {
    let _scope = VisitScope::enter();
    serde_json::to_string(value).unwrap_or_else(|_| UNSERIALIZABLE.to_string())
}

/// Whether a JSON value is empty in the logging sense (null, empty object/array/string).
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::String(text) => text.is_empty(),
        _ => false,
    }
}

fn is_falsy(serialized: &str) -> bool {
    matches!(serialized, "null" | "false" | "0" | "0.0" | "-0.0" | "\"\"")
}
