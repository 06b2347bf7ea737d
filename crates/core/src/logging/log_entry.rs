use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::logging::log_level::LogLevel;
use crate::serializer::to_log_value;

/// One structured log line.
///
/// Serialized as a single JSON object carrying `level`, `message`,
/// `timestamp` and the execution fields in camelCase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StandardLogEntry {
    /// Severity of the entry
    pub level: LogLevel,
    /// Human-readable message
    pub message: String,
    /// Write time
    pub timestamp: DateTime<Utc>,
    /// Logger context, usually the owning type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// Instrumented method, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method_name: Option<String>,
    /// Correlation id of the logical operation
    #[serde(default)]
    pub transaction_id: Option<String>,
    /// Size-bounded request snapshot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<Value>,
    /// Size-bounded result or error detail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    /// Elapsed time, e.g. `12.5ms`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processing_time: Option<String>,
    /// Additional fields flattened into the record
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StandardLogEntry {
    /// One-line JSON rendering
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Caller-supplied fields for one log call.
///
/// `request` and `response` are captured cycle-safe at build time; size
/// bounding happens when the logger writes the entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LogMetadata {
    /// Instrumented method name
    pub method_name: Option<String>,
    /// Overrides the id of the active context
    pub transaction_id: Option<String>,
    /// Request payload
    pub request: Option<Value>,
    /// Result or error payload
    pub response: Option<Value>,
    /// Elapsed time string
    pub processing_time: Option<String>,
    /// Extra fields merged into the entry
    pub extra: Map<String, Value>,
}

impl LogMetadata {
    /// Empty metadata
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the method name
    pub fn with_method_name(mut self, method_name: impl Into<String>) -> Self {
        self.method_name = Some(method_name.into());
        self
    }

    /// Set the transaction id explicitly
    pub fn with_transaction_id(mut self, transaction_id: impl Into<String>) -> Self {
        self.transaction_id = Some(transaction_id.into());
        self
    }

    /// Capture the request payload
    pub fn with_request<T: Serialize + ?Sized>(mut self, request: &T) -> Self {
        self.request = Some(to_log_value(request));
        self
    }

    /// Capture the result payload
    pub fn with_response<T: Serialize + ?Sized>(mut self, response: &T) -> Self {
        self.response = Some(to_log_value(response));
        self
    }

    /// Set the elapsed time
    pub fn with_processing_time(mut self, processing_time: impl Into<String>) -> Self {
        self.processing_time = Some(processing_time.into());
        self
    }

    /// Add an extra field
    pub fn with_field<T: Serialize + ?Sized>(mut self, key: impl Into<String>, value: &T) -> Self {
        self.extra.insert(key.into(), to_log_value(value));
        self
    }

    /// Overlay `other` on top of `self`; fields set in `other` win.
    pub fn merge(mut self, other: LogMetadata) -> Self {
        if other.method_name.is_some() {
            self.method_name = other.method_name;
        }
        if other.transaction_id.is_some() {
            self.transaction_id = other.transaction_id;
        }
        if other.request.is_some() {
            self.request = other.request;
        }
        if other.response.is_some() {
            self.response = other.response;
        }
        if other.processing_time.is_some() {
            self.processing_time = other.processing_time;
        }
        self.extra.extend(other.extra);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_entry_json_field_names() {
        let entry = StandardLogEntry {
            level: LogLevel::Info,
            message: "hola".to_string(),
            timestamp: Utc::now(),
            context: Some("PaymentsService".to_string()),
            method_name: Some("create".to_string()),
            transaction_id: Some("T-1".to_string()),
            request: Some(json!({"body": {"a": 1}})),
            response: None,
            processing_time: Some("0ms".to_string()),
            extra: Map::new(),
        };

        let value: Value = serde_json::from_str(&entry.to_json().unwrap()).unwrap();
        assert_eq!(value["level"], "info");
        assert_eq!(value["methodName"], "create");
        assert_eq!(value["transactionId"], "T-1");
        assert_eq!(value["processingTime"], "0ms");
        assert_eq!(value["request"]["body"]["a"], 1);
        assert!(value.get("response").is_none());
    }

    #[test]
    fn test_metadata_merge_prefers_overlay() {
        let base = LogMetadata::new()
            .with_method_name("start")
            .with_transaction_id("T-1")
            .with_field("procedure", "PKG.SP_PAGOS");
        let overlay = LogMetadata::new()
            .with_method_name("end")
            .with_response(&json!({"rows": 3}));

        let merged = base.merge(overlay);
        assert_eq!(merged.method_name.as_deref(), Some("end"));
        assert_eq!(merged.transaction_id.as_deref(), Some("T-1"));
        assert_eq!(merged.response, Some(json!({"rows": 3})));
        assert_eq!(merged.extra["procedure"], "PKG.SP_PAGOS");
    }
}
