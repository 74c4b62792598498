use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use uuid::Uuid;

use super::JsonBody;
use crate::{
    auth::AuthUser,
    errors::ServiceError,
    handlers::AppState,
    services::bookings::{
        BookingResponse, ListBookingsQuery, StartBookingRequest, UpdateBookingStatusRequest,
    },
    ApiResponse, ApiResult, PaginatedResponse,
};

pub fn booking_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_bookings).post(start_booking))
        .route("/:id", get(get_booking).patch(update_booking_status))
}

/// Start a booking
///
/// The total is computed from the catalog rate; a `total` sent by the client
/// is ignored.
#[utoipa::path(
    post,
    path = "/api/v1/bookings",
    request_body = StartBookingRequest,
    responses(
        (status = 201, description = "Booking created", body = ApiResponse<BookingResponse>,
            headers(("X-Request-Id" = String, description = "Unique request identifier"))
        ),
        (status = 400, description = "Invalid category, material or quantity", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "Bookings"
)]
pub async fn start_booking(
    State(state): State<AppState>,
    user: AuthUser,
    JsonBody(request): JsonBody<StartBookingRequest>,
) -> Result<(StatusCode, Json<ApiResponse<BookingResponse>>), ServiceError> {
    let booking = state.services.bookings.start_booking(&user, request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(booking))))
}

/// List bookings
///
/// Customers see their own bookings; administrators see all of them.
#[utoipa::path(
    get,
    path = "/api/v1/bookings",
    params(ListBookingsQuery),
    responses(
        (status = 200, description = "Bookings, newest first", body = ApiResponse<PaginatedResponse<BookingResponse>>),
        (status = 400, description = "Unknown status filter", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "Bookings"
)]
pub async fn list_bookings(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ListBookingsQuery>,
) -> ApiResult<PaginatedResponse<BookingResponse>> {
    let page = state.services.bookings.list_bookings(&user, query).await?;
    let total_pages = page.total.div_ceil(page.per_page);

    Ok(Json(ApiResponse::success(PaginatedResponse {
        items: page.bookings,
        total: page.total,
        page: page.page,
        limit: page.per_page,
        total_pages,
    })))
}

/// Get a booking
#[utoipa::path(
    get,
    path = "/api/v1/bookings/:id",
    params(("id" = Uuid, Path, description = "Booking ID")),
    responses(
        (status = 200, description = "Booking details", body = ApiResponse<BookingResponse>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "Bookings"
)]
pub async fn get_booking(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<BookingResponse> {
    let booking = state.services.bookings.get_booking(&user, id).await?;
    Ok(Json(ApiResponse::success(booking)))
}

/// Change a booking's status
///
/// `cancelled` cancels a pending booking (administrators may also cancel one
/// in processing). `completed` is reserved for administrators.
#[utoipa::path(
    patch,
    path = "/api/v1/bookings/:id",
    params(("id" = Uuid, Path, description = "Booking ID")),
    request_body = UpdateBookingStatusRequest,
    responses(
        (status = 200, description = "Updated booking", body = ApiResponse<BookingResponse>),
        (status = 400, description = "Unsupported target status", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Administrator role required", body = crate::errors::ErrorResponse),
        (status = 404, description = "Not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Booking is not in a state that allows the change", body = crate::errors::ErrorResponse),
    ),
    security(("bearer_auth" = [])),
    tag = "Bookings"
)]
pub async fn update_booking_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    JsonBody(request): JsonBody<UpdateBookingStatusRequest>,
) -> ApiResult<BookingResponse> {
    let booking = state
        .services
        .bookings
        .update_status(&user, id, request)
        .await?;
    Ok(Json(ApiResponse::success(booking)))
}
