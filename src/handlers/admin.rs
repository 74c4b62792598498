use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use tracing::info;
use uuid::Uuid;

use crate::{
    auth::AdminUser,
    handlers::AppState,
    services::reconciliation::{ListAlertsQuery, OrphanedPayment, ReconciliationAlertResponse},
    ApiResponse, ApiResult,
};

pub fn reconciliation_routes() -> Router<AppState> {
    Router::new()
        .route("/alerts", get(list_alerts))
        .route("/alerts/:id/resolve", post(resolve_alert))
        .route("/orphans", get(list_orphans))
}

/// List reconciliation alerts
#[utoipa::path(
    get,
    path = "/api/v1/admin/reconciliation/alerts",
    params(ListAlertsQuery),
    responses(
        (status = 200, description = "Alerts, newest first", body = ApiResponse<Vec<ReconciliationAlertResponse>>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Administrator role required", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn list_alerts(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Query(query): Query<ListAlertsQuery>,
) -> ApiResult<Vec<ReconciliationAlertResponse>> {
    let alerts = state.services.reconciliation.list_alerts(query).await?;
    Ok(Json(ApiResponse::success(alerts)))
}

/// Mark an alert as handled
#[utoipa::path(
    post,
    path = "/api/v1/admin/reconciliation/alerts/:id/resolve",
    params(("id" = Uuid, Path, description = "Alert ID")),
    responses(
        (status = 200, description = "Resolved alert", body = ApiResponse<ReconciliationAlertResponse>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Administrator role required", body = crate::errors::ErrorResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn resolve_alert(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
) -> ApiResult<ReconciliationAlertResponse> {
    let alert = state.services.reconciliation.resolve_alert(id).await?;
    info!(alert_id = %id, admin = %admin.user_id, "alert resolved by operator");
    Ok(Json(ApiResponse::success(alert)))
}

/// Successful payments with no paid booking
///
/// Detection only; repairing a record is an operator decision.
#[utoipa::path(
    get,
    path = "/api/v1/admin/reconciliation/orphans",
    responses(
        (status = 200, description = "Orphaned payments", body = ApiResponse<Vec<OrphanedPayment>>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Administrator role required", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "Admin"
)]
pub async fn list_orphans(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
) -> ApiResult<Vec<OrphanedPayment>> {
    let orphans = state
        .services
        .reconciliation
        .find_orphaned_successes()
        .await?;
    Ok(Json(ApiResponse::success(orphans)))
}
