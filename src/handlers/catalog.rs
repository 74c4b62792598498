use axum::{extract::State, Json};

use crate::{handlers::AppState, services::pricing::CatalogEntry, ApiResponse, ApiResult};

/// List processing rates
///
/// Public; the storefront renders its price list from this.
#[utoipa::path(
    get,
    path = "/api/v1/catalog",
    responses(
        (status = 200, description = "Rates per process and material", body = ApiResponse<Vec<CatalogEntry>>),
    ),
    tag = "Catalog"
)]
pub async fn list_catalog(
    State(state): State<AppState>,
) -> ApiResult<Vec<CatalogEntry>> {
    Ok(Json(ApiResponse::success(
        state.services.bookings.catalog().entries(),
    )))
}
