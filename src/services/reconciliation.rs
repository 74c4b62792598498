use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::{
    entities::{
        booking::{self, Entity as BookingEntity},
        payment::{self, Entity as PaymentEntity},
        reconciliation_alert::{self, Entity as AlertEntity},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    models::{AlertKind, BookingStatus, PaymentStatus},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ReconciliationAlertResponse {
    pub id: Uuid,
    pub booking_id: Uuid,
    pub payment_id: Uuid,
    pub kind: AlertKind,
    pub booking_status: BookingStatus,
    pub detail: String,
    pub resolved: bool,
    pub created_at: DateTime<Utc>,
}

impl From<reconciliation_alert::Model> for ReconciliationAlertResponse {
    fn from(model: reconciliation_alert::Model) -> Self {
        Self {
            id: model.id,
            booking_id: model.booking_id,
            payment_id: model.payment_id,
            kind: model.kind,
            booking_status: model.booking_status,
            detail: model.detail,
            resolved: model.resolved,
            created_at: model.created_at,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct ListAlertsQuery {
    /// Include alerts an operator has already resolved.
    #[serde(default)]
    pub include_resolved: bool,
}

/// A successful payment that no paid booking accounts for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct OrphanedPayment {
    pub payment_id: Uuid,
    pub gateway_order_id: String,
    pub gateway_payment_id: Option<String>,
    pub receipt: String,
    pub user_id: String,
    pub currency: String,
    #[schema(value_type = String)]
    pub amount: rust_decimal::Decimal,
    /// Status of the booking named by the receipt, if it still exists.
    pub booking_status: Option<BookingStatus>,
    pub verified_at: Option<DateTime<Utc>>,
}

/// Records and surfaces bookings and payments that disagree. Nothing here
/// moves money or changes booking state; an operator decides.
#[derive(Clone)]
pub struct ReconciliationService {
    db: Arc<DatabaseConnection>,
    event_sender: Arc<EventSender>,
}

impl ReconciliationService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: Arc<EventSender>) -> Self {
        Self { db, event_sender }
    }

    #[instrument(skip(self, detail))]
    pub async fn record_alert(
        &self,
        booking_id: Uuid,
        payment_id: Uuid,
        kind: AlertKind,
        booking_status: BookingStatus,
        detail: String,
    ) -> Result<reconciliation_alert::Model, ServiceError> {
        let alert = record_alert(
            &*self.db,
            booking_id,
            payment_id,
            kind,
            booking_status,
            detail,
        )
        .await?;

        self.event_sender
            .send_or_log(Event::ReconciliationConflict {
                alert_id: alert.id,
                booking_id,
                payment_id,
                kind,
            })
            .await;

        Ok(alert)
    }

    #[instrument(skip(self))]
    pub async fn list_alerts(
        &self,
        query: ListAlertsQuery,
    ) -> Result<Vec<ReconciliationAlertResponse>, ServiceError> {
        let mut select = AlertEntity::find();
        if !query.include_resolved {
            select = select.filter(reconciliation_alert::Column::Resolved.eq(false));
        }

        let alerts = select
            .order_by_desc(reconciliation_alert::Column::CreatedAt)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        Ok(alerts.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self))]
    pub async fn resolve_alert(
        &self,
        alert_id: Uuid,
    ) -> Result<ReconciliationAlertResponse, ServiceError> {
        let alert = AlertEntity::find_by_id(alert_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Alert {} not found", alert_id)))?;

        if alert.resolved {
            return Ok(alert.into());
        }

        let mut active: reconciliation_alert::ActiveModel = alert.into();
        active.resolved = Set(true);
        let updated = sea_orm::ActiveModelTrait::update(active, &*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        info!(alert_id = %alert_id, "Reconciliation alert resolved");
        Ok(updated.into())
    }

    /// Successful payments whose booking is neither `processing` nor
    /// `completed` with a link back to them.
    #[instrument(skip(self))]
    pub async fn find_orphaned_successes(&self) -> Result<Vec<OrphanedPayment>, ServiceError> {
        let payments = PaymentEntity::find()
            .filter(payment::Column::Status.eq(PaymentStatus::Success))
            .order_by_asc(payment::Column::CreatedAt)
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        if payments.is_empty() {
            return Ok(Vec::new());
        }

        let booking_ids: Vec<Uuid> = payments
            .iter()
            .filter_map(|p| Uuid::parse_str(&p.receipt).ok())
            .collect();

        let bookings: HashMap<Uuid, booking::Model> = BookingEntity::find()
            .filter(booking::Column::Id.is_in(booking_ids))
            .all(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .into_iter()
            .map(|b| (b.id, b))
            .collect();

        let orphans: Vec<OrphanedPayment> = payments
            .into_iter()
            .filter_map(|p| {
                let booking = Uuid::parse_str(&p.receipt)
                    .ok()
                    .and_then(|id| bookings.get(&id));
                let accounted_for = booking.is_some_and(|b| {
                    b.payment_id == Some(p.id)
                        && matches!(
                            b.status,
                            BookingStatus::Processing | BookingStatus::Completed
                        )
                });
                if accounted_for {
                    return None;
                }
                Some(OrphanedPayment {
                    payment_id: p.id,
                    gateway_order_id: p.gateway_order_id,
                    gateway_payment_id: p.gateway_payment_id,
                    receipt: p.receipt,
                    user_id: p.user_id,
                    currency: p.currency,
                    amount: p.amount,
                    booking_status: booking.map(|b| b.status),
                    verified_at: p.verified_at,
                })
            })
            .collect();

        if !orphans.is_empty() {
            warn!(count = orphans.len(), "successful payments without a paid booking");
        }
        metrics::gauge!("textile.reconciliation.orphaned_payments", orphans.len() as f64);

        Ok(orphans)
    }
}

/// Inserts an unresolved alert row.
pub(crate) async fn record_alert<C: ConnectionTrait>(
    db: &C,
    booking_id: Uuid,
    payment_id: Uuid,
    kind: AlertKind,
    booking_status: BookingStatus,
    detail: String,
) -> Result<reconciliation_alert::Model, ServiceError> {
    let model = reconciliation_alert::ActiveModel {
        id: Set(Uuid::new_v4()),
        booking_id: Set(booking_id),
        payment_id: Set(payment_id),
        kind: Set(kind),
        booking_status: Set(booking_status),
        detail: Set(detail),
        resolved: Set(false),
        created_at: Set(Utc::now()),
    };

    let alert = AlertEntity::insert(model)
        .exec_with_returning(db)
        .await
        .map_err(ServiceError::db_error)?;

    metrics::counter!("textile.reconciliation.alerts", 1, "kind" => kind.to_string());
    warn!(
        alert_id = %alert.id,
        %booking_id,
        %payment_id,
        %kind,
        %booking_status,
        "reconciliation alert recorded"
    );

    Ok(alert)
}
