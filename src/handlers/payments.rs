use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

use super::JsonBody;
use crate::{
    auth::AuthUser,
    handlers::AppState,
    services::payments::{
        CheckoutHandoff, CreateGatewayOrderRequest, PaymentResponse, VerifyPaymentRequest,
        VerifyPaymentResponse,
    },
    ApiResponse, ApiResult,
};

pub fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/order", post(create_gateway_order))
        .route("/verify", post(verify_payment))
        .route("/:id", get(get_payment))
}

/// Open a gateway order for a pending booking
///
/// Returns the fields the checkout widget is opened with. A gateway failure
/// leaves the booking pending so the call can simply be retried.
#[utoipa::path(
    post,
    path = "/api/v1/payments/order",
    request_body = CreateGatewayOrderRequest,
    responses(
        (status = 200, description = "Checkout handoff", body = ApiResponse<CheckoutHandoff>),
        (status = 400, description = "Amount does not match the booking total", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Booking not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Booking is not pending", body = crate::errors::ErrorResponse),
        (status = 502, description = "Payment gateway failed; retry", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn create_gateway_order(
    State(state): State<AppState>,
    user: AuthUser,
    JsonBody(request): JsonBody<CreateGatewayOrderRequest>,
) -> ApiResult<CheckoutHandoff> {
    let handoff = state
        .services
        .payments
        .create_gateway_order(&user, request)
        .await?;
    Ok(Json(ApiResponse::success(handoff)))
}

/// Verify the checkout widget's signed result
///
/// A signature mismatch is a normal `failed` outcome, not an error. Replaying
/// a callback returns the outcome already stored.
#[utoipa::path(
    post,
    path = "/api/v1/payments/verify",
    request_body = VerifyPaymentRequest,
    responses(
        (status = 200, description = "Verification outcome", body = ApiResponse<VerifyPaymentResponse>),
        (status = 400, description = "Missing or mismatched callback fields", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Payment or booking not found", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn verify_payment(
    State(state): State<AppState>,
    user: AuthUser,
    JsonBody(request): JsonBody<VerifyPaymentRequest>,
) -> ApiResult<VerifyPaymentResponse> {
    let outcome = state.services.payments.verify_payment(&user, request).await?;
    Ok(Json(ApiResponse::success(outcome)))
}

/// Get a payment
#[utoipa::path(
    get,
    path = "/api/v1/payments/:id",
    params(("id" = Uuid, Path, description = "Payment ID")),
    responses(
        (status = 200, description = "Payment details", body = ApiResponse<PaymentResponse>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn get_payment(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<PaymentResponse> {
    let payment = state.services.payments.get_payment(&user, id).await?;
    Ok(Json(ApiResponse::success(payment)))
}
