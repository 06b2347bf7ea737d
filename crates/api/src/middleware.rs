//! HTTP layers: transaction-id seeding, request timeout and request logging.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{Request, State},
    http::{HeaderValue, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tower_http::{
    classify::{ServerErrorsAsFailures, SharedClassifier},
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use traza_core::context::{self, resolve_transaction_id};
use traza_core::{current_transaction_id, ApiErrorEnvelope, TransactionContext, TransactionIdGenerator};

use crate::error::ApiError;

/// Inbound header carrying an explicit transaction id. Echoed on every response.
pub const TRANSACTION_ID_HEADER: &str = "x-transaction-id";

/// State of [`transaction_context`]: where fresh ids come from.
#[derive(Clone)]
pub struct TransactionSeed {
    /// Source of ids for requests without the header
    generator: Arc<dyn TransactionIdGenerator>,
}

impl TransactionSeed {
    /// Seed requests without the header from `generator`
    pub fn new(generator: Arc<dyn TransactionIdGenerator>) -> Self {
        Self { generator }
    }
}

/// Run the rest of the stack inside a context scope seeded from
/// `x-transaction-id`, or a generated id when the header is absent or blank.
pub async fn transaction_context(
    State(seed): State<TransactionSeed>,
    request: Request,
    next: Next,
) -> Response {
    let transaction_id = {
        let header = request
            .headers()
            .get(TRANSACTION_ID_HEADER)
            .and_then(|value| value.to_str().ok());
        resolve_transaction_id(header, None, seed.generator.as_ref())
    };

    let mut response =
        context::run(TransactionContext::new(transaction_id.clone()), next.run(request)).await;

    if let Ok(value) = HeaderValue::from_str(&transaction_id) {
        response.headers_mut().insert(TRANSACTION_ID_HEADER, value);
    }
    response
}

/// Answer with a 504 envelope when the handler does not finish within the limit.
pub async fn request_timeout(
    State(limit): State<Duration>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();

    match tokio::time::timeout(limit, next.run(request)).await {
        Ok(response) => response,
        Err(_) => {
            warn!(
                %method,
                %uri,
                timeout_ms = limit.as_millis() as u64,
                transaction_id = %current_transaction_id().unwrap_or_default(),
                "Request timed out"
            );
            ApiError::from(ApiErrorEnvelope::timeout()).into_response()
        }
    }
}

/// Log method, path, status and latency of every request
pub async fn request_logging(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    info!(%method, %uri, "Request started");

    let response = next.run(request).await;

    info!(
        %method,
        %uri,
        status = response.status().as_u16(),
        duration_ms = start.elapsed().as_millis() as u64,
        transaction_id = %current_transaction_id().unwrap_or_default(),
        "Request completed"
    );

    response
}

/// Permissive CORS that exposes the transaction id header to browsers
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any)
        .expose_headers([axum::http::HeaderName::from_static(TRANSACTION_ID_HEADER)])
}

/// HTTP spans from `tower-http`
pub fn trace_layer() -> TraceLayer<SharedClassifier<ServerErrorsAsFailures>> {
    TraceLayer::new_for_http()
}
