use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::json;
use traza_api::response::created;
use traza_api::{ApiResponse, ApiResult, ListResponse};
use traza_core::ApiErrorEnvelope;
use traza_interceptor::{CallArg, Instrumented, RequestParts};

use super::model::{CreatePaymentRequest, Payment, PaymentQuery, PaymentStatus};
use super::service::PaymentsService;

/// HTTP-facing layer of the payments module.
pub struct PaymentsController {
    service: Arc<PaymentsService>,
    instrumented: Instrumented,
}

impl PaymentsController {
    pub fn new(service: Arc<PaymentsService>, instrumented: Instrumented) -> Self {
        Self {
            service,
            instrumented,
        }
    }

    pub async fn create(&self, request: CreatePaymentRequest) -> Result<Payment, ApiErrorEnvelope> {
        let args = [CallArg::request(RequestParts::new().with_body(&request))];
        self.instrumented
            .execute("create", &args, async move {
                Ok(self.service.create(request).await?)
            })
            .await
    }

    pub async fn get(&self, id: String) -> Result<Payment, ApiErrorEnvelope> {
        let args = [CallArg::request(
            RequestParts::new().with_params(&json!({ "id": id })),
        )];
        self.instrumented
            .execute("get", &args, async { Ok(self.service.get(&id).await?) })
            .await
    }

    pub async fn list(&self, query: PaymentQuery) -> Result<Vec<Payment>, ApiErrorEnvelope> {
        let args = [CallArg::request(RequestParts::new().with_query(&query))];
        self.instrumented
            .execute("list", &args, async {
                let status = query
                    .status
                    .as_deref()
                    .filter(|status| !status.trim().is_empty())
                    .map(str::parse::<PaymentStatus>)
                    .transpose()?;
                Ok(self.service.list(status).await?)
            })
            .await
    }
}

pub fn routes(controller: Arc<PaymentsController>) -> Router {
    Router::new()
        .route("/api/payments", get(list_payments).post(create_payment))
        .route("/api/payments/{id}", get(get_payment))
        .with_state(controller)
}

async fn create_payment(
    State(controller): State<Arc<PaymentsController>>,
    payload: Result<Json<CreatePaymentRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(request) = payload?;
    let payment = controller.create(request).await?;
    Ok(created(payment))
}

async fn get_payment(
    State(controller): State<Arc<PaymentsController>>,
    Path(id): Path<String>,
) -> ApiResult<ApiResponse<Payment>> {
    let payment = controller.get(id).await?;
    Ok(ApiResponse::success(payment))
}

async fn list_payments(
    State(controller): State<Arc<PaymentsController>>,
    Query(query): Query<PaymentQuery>,
) -> ApiResult<ApiResponse<ListResponse<Payment>>> {
    let payments = controller.list(query).await?;
    Ok(ApiResponse::success(ListResponse::new(payments)))
}
