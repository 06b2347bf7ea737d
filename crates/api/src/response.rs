use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use traza_core::current_transaction_id;

/// Success body: the payload under `data`, stamped with the transaction id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    /// Always `true` for this type
    pub success: bool,
    /// Response payload
    pub data: Option<T>,
    /// Optional human-readable note
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Transaction id of the request, empty outside a context scope
    pub transaction_id: String,
    /// When the response was built
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl<T> ApiResponse<T>
where
    T: Serialize,
{
    /// Wrap `data` under the active transaction id
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            transaction_id: current_transaction_id().unwrap_or_default(),
            timestamp: chrono::Utc::now(),
        }
    }

    /// Like [`ApiResponse::success`] with a message
    pub fn success_with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::success(data)
        }
    }
}

impl ApiResponse<()> {
    /// Success without payload
    pub fn success_empty() -> Self {
        Self {
            success: true,
            data: None,
            message: None,
            transaction_id: current_transaction_id().unwrap_or_default(),
            timestamp: chrono::Utc::now(),
        }
    }
}

impl<T> IntoResponse for ApiResponse<T>
where
    T: Serialize,
{
    fn into_response(self) -> axum::response::Response {
        Json(self).into_response()
    }
}

/// List payload with its total count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResponse<T> {
    /// Page items
    pub items: Vec<T>,
    /// Number of items
    pub total: usize,
}

impl<T> ListResponse<T> {
    /// Build a list, counting `items`
    pub fn new(items: Vec<T>) -> Self {
        let total = items.len();
        Self { items, total }
    }
}

/// 200 with the payload
pub fn success<T: Serialize>(data: T) -> impl IntoResponse {
    (StatusCode::OK, ApiResponse::success(data))
}

/// 201 with the created resource
pub fn created<T: Serialize>(data: T) -> impl IntoResponse {
    (StatusCode::CREATED, ApiResponse::success(data))
}

/// 202 without payload
pub fn accepted() -> impl IntoResponse {
    (StatusCode::ACCEPTED, ApiResponse::success_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use traza_core::{run_sync, TransactionContext};

    #[test]
    fn test_api_response_success() {
        let response = ApiResponse::success("test_data");

        assert!(response.success);
        assert_eq!(response.data, Some("test_data"));
        assert!(response.message.is_none());
        assert_eq!(response.transaction_id, "");
    }

    #[test]
    fn test_api_response_carries_active_transaction() {
        let response = run_sync(TransactionContext::new("T-9"), || {
            ApiResponse::success_with_message(1, "creado")
        });
        assert_eq!(response.transaction_id, "T-9");
        assert_eq!(response.message.as_deref(), Some("creado"));
    }

    #[test]
    fn test_api_response_serializes_camel_case() {
        let json = serde_json::to_value(ApiResponse::success(vec![1, 2])).unwrap();
        assert_eq!(json["data"], serde_json::json!([1, 2]));
        assert!(json.get("transactionId").is_some());
        assert!(json.get("message").is_none());
    }

    #[test]
    fn test_list_response_counts_items() {
        let list = ListResponse::new(vec!["a", "b", "c"]);
        assert_eq!(list.total, 3);
    }

    #[test]
    fn test_status_helpers() {
        assert_eq!(created(1).into_response().status(), StatusCode::CREATED);
        assert_eq!(success(1).into_response().status(), StatusCode::OK);
        assert_eq!(accepted().into_response().status(), StatusCode::ACCEPTED);
    }
}
