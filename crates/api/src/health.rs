use axum::Json;
use serde_json::{json, Value};

/// Liveness probe: service name, version and current time
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "service": "traza",
        "version": env!("CARGO_PKG_VERSION")
    }))
}
