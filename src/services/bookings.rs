use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use sea_orm::{
    sea_query::Expr, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::AuthUser,
    entities::booking::{self, ActiveModel as BookingActiveModel, Entity as BookingEntity},
    errors::ServiceError,
    events::{Event, EventSender},
    models::{BookingStatus, ProcessCategory},
    services::{
        payments::to_minor_units,
        pricing::{material_slug, PricingCatalog},
    },
};

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct StartBookingRequest {
    /// One of `sizing`, `weaving`
    #[validate(length(min = 1, message = "process_category is required"))]
    #[schema(example = "sizing")]
    pub process_category: String,
    #[validate(length(min = 1, max = 120, message = "material is required"))]
    #[schema(example = "Cotton")]
    pub material: String,
    #[schema(value_type = String, example = "10")]
    pub quantity: Decimal,
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
    /// Display-only; the stored total is always computed from the catalog rate.
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub total: Option<Decimal>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateBookingStatusRequest {
    /// `cancelled`, or `completed` for administrators
    #[schema(example = "cancelled")]
    pub status: String,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct ListBookingsQuery {
    pub status: Option<String>,
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BookingResponse {
    pub id: Uuid,
    pub user_id: String,
    pub process_category: ProcessCategory,
    pub material: String,
    #[schema(value_type = String)]
    pub unit_rate: Decimal,
    #[schema(value_type = String)]
    pub quantity: Decimal,
    #[schema(value_type = String)]
    pub total: Decimal,
    pub notes: Option<String>,
    pub status: BookingStatus,
    pub payment_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<booking::Model> for BookingResponse {
    fn from(model: booking::Model) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            process_category: model.process_category,
            material: model.material,
            unit_rate: model.unit_rate,
            quantity: model.quantity,
            total: model.total,
            notes: model.notes,
            status: model.status,
            payment_id: model.payment_id,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BookingListResponse {
    pub bookings: Vec<BookingResponse>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

/// Largest quantity a single booking may carry.
pub const MAX_QUANTITY: Decimal = Decimal::from_parts(1_000_000, 0, 0, false, 0);

/// Booking total in currency units: `rate × quantity`, rounded half away
/// from zero to paise.
pub fn booking_total(unit_rate: Decimal, quantity: Decimal) -> Result<Decimal, ServiceError> {
    unit_rate
        .checked_mul(quantity)
        .map(|total| total.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
        .ok_or_else(|| {
            ServiceError::ValidationError(format!(
                "total for {} at {} is out of range",
                quantity, unit_rate
            ))
        })
}

/// Moves a booking from one of `from` to `to` in a single conditional
/// update. Returns `false` when the booking was not in any of `from`, so
/// concurrent writers can never both win the same transition.
pub(crate) async fn transition_booking<C: ConnectionTrait>(
    db: &C,
    booking_id: Uuid,
    from: &[BookingStatus],
    to: BookingStatus,
    payment_id: Option<Uuid>,
) -> Result<bool, ServiceError> {
    let mut update = BookingEntity::update_many()
        .col_expr(booking::Column::Status, Expr::value(to))
        .col_expr(booking::Column::UpdatedAt, Expr::value(Utc::now()));
    if let Some(payment_id) = payment_id {
        update = update.col_expr(booking::Column::PaymentId, Expr::value(Some(payment_id)));
    }

    let result = update
        .filter(booking::Column::Id.eq(booking_id))
        .filter(booking::Column::Status.is_in(from.iter().copied()))
        .exec(db)
        .await
        .map_err(ServiceError::db_error)?;

    Ok(result.rows_affected == 1)
}

/// Loads a booking visible to `user`: their own, or any for administrators.
/// Someone else's booking is reported exactly like a missing one.
pub(crate) async fn find_visible_booking<C: ConnectionTrait>(
    db: &C,
    user: &AuthUser,
    booking_id: Uuid,
) -> Result<booking::Model, ServiceError> {
    BookingEntity::find_by_id(booking_id)
        .one(db)
        .await
        .map_err(ServiceError::db_error)?
        .filter(|b| b.is_owned_by(&user.user_id) || user.is_admin())
        .ok_or_else(|| ServiceError::NotFound(format!("Booking {} not found", booking_id)))
}

#[derive(Clone)]
pub struct BookingService {
    db: Arc<DatabaseConnection>,
    catalog: Arc<PricingCatalog>,
    event_sender: Arc<EventSender>,
    default_page_size: u64,
    max_page_size: u64,
}

impl BookingService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        catalog: Arc<PricingCatalog>,
        event_sender: Arc<EventSender>,
    ) -> Self {
        Self {
            db,
            catalog,
            event_sender,
            default_page_size: 20,
            max_page_size: 100,
        }
    }

    pub fn with_page_sizes(mut self, default_page_size: u64, max_page_size: u64) -> Self {
        self.default_page_size = default_page_size.max(1);
        self.max_page_size = max_page_size.max(self.default_page_size);
        self
    }

    pub fn catalog(&self) -> &PricingCatalog {
        &self.catalog
    }

    /// StartBooking: prices the selection from the catalog and stores a
    /// `pending` booking.
    #[instrument(skip(self, user, request), fields(user_id = %user.user_id, category = %request.process_category))]
    pub async fn start_booking(
        &self,
        user: &AuthUser,
        request: StartBookingRequest,
    ) -> Result<BookingResponse, ServiceError> {
        request.validate()?;

        let category = ProcessCategory::from_str(request.process_category.trim()).map_err(|_| {
            ServiceError::ValidationError(format!(
                "unknown process category '{}'",
                request.process_category
            ))
        })?;

        if request.quantity <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "quantity must be positive".to_string(),
            ));
        }
        if request.quantity > MAX_QUANTITY {
            return Err(ServiceError::ValidationError(format!(
                "quantity must not exceed {}",
                MAX_QUANTITY
            )));
        }

        let unit_rate = self.catalog.get_rate(category, &request.material)?;
        let total = booking_total(unit_rate, request.quantity)?;
        // Never store a booking the gateway could not be asked to charge.
        to_minor_units(total)?;

        if let Some(client_total) = request.total {
            if client_total != total {
                debug!(%client_total, %total, "ignoring client-supplied booking total");
            }
        }

        let now = Utc::now();
        let booking_id = Uuid::new_v4();
        let model = BookingActiveModel {
            id: Set(booking_id),
            user_id: Set(user.user_id.clone()),
            user_email: Set(user.email.clone()),
            user_name: Set(user.name.clone()),
            process_category: Set(category),
            material: Set(request.material.trim().to_string()),
            material_slug: Set(material_slug(&request.material)),
            unit_rate: Set(unit_rate),
            quantity: Set(request.quantity),
            total: Set(total),
            notes: Set(request.notes.filter(|n| !n.trim().is_empty())),
            status: Set(BookingStatus::Pending),
            payment_id: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let booking = BookingEntity::insert(model)
            .exec_with_returning(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        metrics::counter!("textile.bookings.created", 1, "category" => category.to_string());
        info!(booking_id = %booking_id, %total, "Booking created");

        self.event_sender
            .send_or_log(Event::BookingCreated(booking_id))
            .await;

        Ok(booking.into())
    }

    #[instrument(skip(self, user), fields(user_id = %user.user_id))]
    pub async fn get_booking(
        &self,
        user: &AuthUser,
        booking_id: Uuid,
    ) -> Result<BookingResponse, ServiceError> {
        find_visible_booking(&*self.db, user, booking_id)
            .await
            .map(Into::into)
    }

    /// Newest first. Administrators see every booking.
    #[instrument(skip(self, user), fields(user_id = %user.user_id))]
    pub async fn list_bookings(
        &self,
        user: &AuthUser,
        query: ListBookingsQuery,
    ) -> Result<BookingListResponse, ServiceError> {
        let page = query.page.unwrap_or(1).max(1);
        let per_page = query
            .per_page
            .unwrap_or(self.default_page_size)
            .clamp(1, self.max_page_size);

        let mut select = BookingEntity::find();
        if !user.is_admin() {
            select = select.filter(booking::Column::UserId.eq(user.user_id.clone()));
        }
        if let Some(status) = query.status.as_deref().filter(|s| !s.is_empty()) {
            let status = BookingStatus::from_str(status).map_err(|_| {
                ServiceError::ValidationError(format!("unknown booking status '{}'", status))
            })?;
            select = select.filter(booking::Column::Status.eq(status));
        }

        let paginator = select
            .order_by_desc(booking::Column::CreatedAt)
            .paginate(&*self.db, per_page);
        let total = paginator.num_items().await.map_err(ServiceError::db_error)?;
        let bookings = paginator
            .fetch_page(page - 1)
            .await
            .map_err(ServiceError::db_error)?;

        Ok(BookingListResponse {
            bookings: bookings.into_iter().map(Into::into).collect(),
            total,
            page,
            per_page,
        })
    }

    /// `PATCH /bookings/:id` entry point.
    pub async fn update_status(
        &self,
        user: &AuthUser,
        booking_id: Uuid,
        request: UpdateBookingStatusRequest,
    ) -> Result<BookingResponse, ServiceError> {
        let target = BookingStatus::from_str(request.status.trim()).map_err(|_| {
            ServiceError::ValidationError(format!("unknown booking status '{}'", request.status))
        })?;

        match target {
            BookingStatus::Cancelled => self.cancel_booking(user, booking_id).await,
            BookingStatus::Completed if user.is_admin() => {
                self.complete_booking(user, booking_id).await
            }
            BookingStatus::Completed => Err(ServiceError::Forbidden(
                "only administrators can complete bookings".to_string(),
            )),
            other => Err(ServiceError::ValidationError(format!(
                "bookings cannot be moved to '{}' directly",
                other
            ))),
        }
    }

    /// CancelBooking. Owners may cancel while `pending`; administrators may
    /// cancel anything not yet terminal. Payments are never touched here.
    #[instrument(skip(self, user), fields(user_id = %user.user_id))]
    pub async fn cancel_booking(
        &self,
        user: &AuthUser,
        booking_id: Uuid,
    ) -> Result<BookingResponse, ServiceError> {
        let booking = find_visible_booking(&*self.db, user, booking_id).await?;

        let allowed_from: &[BookingStatus] = if user.is_admin() {
            &[BookingStatus::Pending, BookingStatus::Processing]
        } else {
            &[BookingStatus::Pending]
        };

        if !allowed_from.contains(&booking.status) {
            return Err(ServiceError::StateError(format!(
                "booking {} is {} and cannot be cancelled",
                booking_id, booking.status
            )));
        }

        self.apply_transition(booking, allowed_from, BookingStatus::Cancelled)
            .await
    }

    /// Administrative completion of paid work: `processing -> completed`.
    #[instrument(skip(self, user), fields(user_id = %user.user_id))]
    pub async fn complete_booking(
        &self,
        user: &AuthUser,
        booking_id: Uuid,
    ) -> Result<BookingResponse, ServiceError> {
        if !user.is_admin() {
            return Err(ServiceError::Forbidden(
                "only administrators can complete bookings".to_string(),
            ));
        }

        let booking = find_visible_booking(&*self.db, user, booking_id).await?;
        if booking.status != BookingStatus::Processing {
            return Err(ServiceError::StateError(format!(
                "booking {} is {}, expected processing",
                booking_id, booking.status
            )));
        }

        self.apply_transition(booking, &[BookingStatus::Processing], BookingStatus::Completed)
            .await
    }

    async fn apply_transition(
        &self,
        booking: booking::Model,
        from: &[BookingStatus],
        to: BookingStatus,
    ) -> Result<BookingResponse, ServiceError> {
        let booking_id = booking.id;
        let old_status = booking.status;

        if !transition_booking(&*self.db, booking_id, from, to, None).await? {
            // Lost a race with another writer; report what it left behind.
            let current = BookingEntity::find_by_id(booking_id)
                .one(&*self.db)
                .await
                .map_err(ServiceError::db_error)?
                .map(|b| b.status.to_string())
                .unwrap_or_else(|| "missing".to_string());
            warn!(booking_id = %booking_id, current = %current, target = %to, "booking changed concurrently");
            return Err(ServiceError::StateError(format!(
                "booking {} is {} and cannot move to {}",
                booking_id, current, to
            )));
        }

        let updated = BookingEntity::find_by_id(booking_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Booking {} not found", booking_id)))?;

        info!(booking_id = %booking_id, from = %old_status, to = %to, "Booking status updated");
        self.event_sender
            .send_or_log(Event::BookingStatusChanged {
                booking_id,
                old_status,
                new_status: to,
            })
            .await;

        Ok(updated.into())
    }
}
