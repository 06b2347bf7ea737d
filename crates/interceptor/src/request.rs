//! Loggable request data extracted from the arguments of a wrapped call.
//!
//! Callers describe each argument with a [`CallArg`]. For untyped JSON input,
//! [`CallArg::infer`] reproduces the shape-sniffing classification of
//! framework request and response objects.

use serde::Serialize;
use serde_json::{Map, Value};
use traza_core::serializer::{is_empty_value, to_log_value};

const RESPONSE_MARKERS: [&str; 4] = ["code", "send", "status", "json"];
const REQUEST_MARKERS: [&str; 6] = ["method", "url", "headers", "body", "params", "query"];

/// Parts of an inbound framework request worth logging.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestParts {
    pub body: Option<Value>,
    pub params: Option<Value>,
    pub query: Option<Value>,
}

impl RequestParts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_body<T: Serialize + ?Sized>(mut self, body: &T) -> Self {
        self.body = Some(to_log_value(body));
        self
    }

    pub fn with_params<T: Serialize + ?Sized>(mut self, params: &T) -> Self {
        self.params = Some(to_log_value(params));
        self
    }

    pub fn with_query<T: Serialize + ?Sized>(mut self, query: &T) -> Self {
        self.query = Some(to_log_value(query));
        self
    }
}

/// One argument of a wrapped call.
#[derive(Debug, Clone, PartialEq)]
pub enum CallArg {
    /// Framework request: only non-empty body, params and query are kept
    Request(RequestParts),
    /// Framework response object: never logged
    Response,
    /// Structured value, logged as `body`
    Object(Value),
    /// Raw text: parsed as JSON into `body`, else kept verbatim as `data`
    Text(String),
    /// Number or boolean, logged as `value`
    Scalar(Value),
    /// Null or missing
    Absent,
}

impl CallArg {
    /// Describe a typed argument by its JSON shape.
    ///
    /// No request or response sniffing happens here: a struct is always an
    /// [`CallArg::Object`] whatever its field names. Framework requests are
    /// described with [`CallArg::request`].
    pub fn of<T: Serialize + ?Sized>(value: &T) -> Self {
        match to_log_value(value) {
            Value::Null => CallArg::Absent,
            Value::String(text) => CallArg::Text(text),
            scalar @ (Value::Bool(_) | Value::Number(_)) => CallArg::Scalar(scalar),
            structured => CallArg::Object(structured),
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        CallArg::Text(text.into())
    }

    pub fn request(parts: RequestParts) -> Self {
        CallArg::Request(parts)
    }

    /// Classify an untyped JSON argument.
    ///
    /// Objects carrying any response marker (`code`, `send`, `status`,
    /// `json`) are responses; otherwise objects carrying any request marker
    /// (`method`, `url`, `headers`, `body`, `params`, `query`) are requests.
    pub fn infer(value: Value) -> Self {
        match value {
            Value::Null => CallArg::Absent,
            Value::Object(map) => {
                if RESPONSE_MARKERS.iter().any(|key| map.contains_key(*key)) {
                    CallArg::Response
                } else if REQUEST_MARKERS.iter().any(|key| map.contains_key(*key)) {
                    CallArg::Request(RequestParts {
                        body: map.get("body").cloned(),
                        params: map.get("params").cloned(),
                        query: map.get("query").cloned(),
                    })
                } else {
                    CallArg::Object(Value::Object(map))
                }
            }
            Value::Array(_) => CallArg::Object(value),
            Value::String(text) => CallArg::Text(text),
            Value::Bool(_) | Value::Number(_) => CallArg::Scalar(value),
        }
    }
}

/// Build the request snapshot of one call. Later arguments overwrite earlier ones.
pub fn extract_request_snapshot(args: &[CallArg]) -> Map<String, Value> {
    let mut snapshot = Map::new();

    for arg in args {
        match arg {
            CallArg::Response | CallArg::Absent => {}
            CallArg::Request(parts) => {
                let fields = [
                    ("body", &parts.body),
                    ("params", &parts.params),
                    ("query", &parts.query),
                ];
                for (key, value) in fields {
                    if let Some(value) = value.as_ref().filter(|v| !is_empty_value(v)) {
                        snapshot.insert(key.to_string(), value.clone());
                    }
                }
            }
            CallArg::Object(value) => {
                snapshot.insert("body".to_string(), value.clone());
            }
            CallArg::Text(text) => match serde_json::from_str::<Value>(text) {
                Ok(parsed) => {
                    snapshot.insert("body".to_string(), parsed);
                }
                Err(_) => {
                    snapshot.insert("data".to_string(), Value::String(text.clone()));
                }
            },
            CallArg::Scalar(value) => {
                snapshot.insert("value".to_string(), value.clone());
            }
        }
    }

    snapshot
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snapshot_of(values: Vec<Value>) -> Value {
        let args: Vec<CallArg> = values.into_iter().map(CallArg::infer).collect();
        Value::Object(extract_request_snapshot(&args))
    }

    #[test]
    fn test_request_shaped_argument() {
        let snapshot = snapshot_of(vec![json!({"body": {"a": 1}, "params": {}, "query": {"q": 1}})]);
        assert_eq!(snapshot, json!({"body": {"a": 1}, "query": {"q": 1}}));
    }

    #[test]
    fn test_json_text_argument() {
        assert_eq!(snapshot_of(vec![json!("{\"x\":1}")]), json!({"body": {"x": 1}}));
    }

    #[test]
    fn test_plain_text_argument() {
        assert_eq!(snapshot_of(vec![json!("not json")]), json!({"data": "not json"}));
    }

    #[test]
    fn test_scalar_argument() {
        assert_eq!(snapshot_of(vec![json!(42)]), json!({"value": 42}));
        assert_eq!(snapshot_of(vec![json!(true)]), json!({"value": true}));
    }

    #[test]
    fn test_absent_argument() {
        assert_eq!(snapshot_of(vec![Value::Null]), json!({}));
        assert_eq!(extract_request_snapshot(&[]), Map::new());
    }

    #[test]
    fn test_response_shaped_argument_skipped() {
        let snapshot = snapshot_of(vec![
            json!({"status": 200, "body": {"ignored": true}}),
            json!({"id": "p-1"}),
        ]);
        assert_eq!(snapshot, json!({"body": {"id": "p-1"}}));
    }

    #[test]
    fn test_last_object_wins() {
        let snapshot = snapshot_of(vec![json!({"first": 1}), json!({"second": 2})]);
        assert_eq!(snapshot, json!({"body": {"second": 2}}));
    }

    #[test]
    fn test_request_with_only_headers_contributes_nothing() {
        let snapshot = snapshot_of(vec![json!({"headers": {"x-transaction-id": "T"}, "url": "/x"})]);
        assert_eq!(snapshot, json!({}));
    }

    #[test]
    fn test_typed_struct_is_logged_as_body() {
        #[derive(Serialize)]
        struct StatusChange {
            payment_id: &'static str,
            status: &'static str,
        }

        let args = [CallArg::of(&StatusChange {
            payment_id: "p-1",
            status: "AUTHORIZED",
        })];
        assert_eq!(
            Value::Object(extract_request_snapshot(&args)),
            json!({"body": {"payment_id": "p-1", "status": "AUTHORIZED"}})
        );
    }

    #[test]
    fn test_typed_values_skip_shape_sniffing() {
        assert_eq!(
            CallArg::of(&json!({"body": {"a": 1}, "code": 7})),
            CallArg::Object(json!({"body": {"a": 1}, "code": 7}))
        );
        assert_eq!(CallArg::of(&Option::<u8>::None), CallArg::Absent);
        assert_eq!(CallArg::of("abc"), CallArg::Text("abc".to_string()));
        assert_eq!(CallArg::of(&3.5), CallArg::Scalar(json!(3.5)));
        assert_eq!(CallArg::of(&[1, 2]), CallArg::Object(json!([1, 2])));
    }

    #[test]
    fn test_typed_request_parts() {
        #[derive(Serialize)]
        struct Filter {
            status: &'static str,
        }

        let args = [
            CallArg::request(
                RequestParts::new()
                    .with_params(&json!({"id": "p-9"}))
                    .with_query(&Filter { status: "PENDING" }),
            ),
            CallArg::of(&7u32),
        ];
        let snapshot = Value::Object(extract_request_snapshot(&args));
        assert_eq!(
            snapshot,
            json!({"params": {"id": "p-9"}, "query": {"status": "PENDING"}, "value": 7})
        );
    }
}
