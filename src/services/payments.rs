use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::AuthUser,
    entities::{
        booking::{self, Entity as BookingEntity},
        payment::{self, ActiveModel as PaymentActiveModel, Entity as PaymentEntity},
    },
    errors::ServiceError,
    events::{Event, EventSender},
    gateway::{PaymentGateway, SignatureVerifier},
    models::{AlertKind, BookingStatus, PaymentStatus, VerificationOutcome},
    notifications::{BookingPaidNotice, BookingSummary, Notifier, PaymentSummary},
    services::{
        bookings::{transition_booking, BookingResponse},
        reconciliation::ReconciliationService,
    },
};

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateGatewayOrderRequest {
    pub booking_id: Uuid,
    /// Must equal the booking total exactly.
    #[schema(value_type = String, example = "4500")]
    pub amount: Decimal,
}

/// What the checkout widget needs to collect payment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct CheckoutHandoff {
    pub gateway_order_id: String,
    pub amount_minor_units: i64,
    pub currency: String,
    /// Public gateway key id. Never the secret.
    pub key: String,
    pub payment_id: Uuid,
    pub booking_id: Uuid,
}

/// Callback fields handed back by the checkout widget. Every field is
/// required; they are optional here so a missing one reads as a validation
/// failure rather than a malformed body.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct VerifyPaymentRequest {
    pub gateway_order_id: Option<String>,
    pub gateway_payment_id: Option<String>,
    pub gateway_signature: Option<String>,
    pub payment_id: Option<Uuid>,
    pub booking_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PaymentResponse {
    pub id: Uuid,
    pub user_id: String,
    #[schema(value_type = String)]
    pub amount: Decimal,
    pub amount_minor_units: i64,
    pub currency: String,
    pub receipt: String,
    pub gateway_order_id: String,
    pub gateway_payment_id: Option<String>,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub verified_at: Option<DateTime<Utc>>,
}

impl From<payment::Model> for PaymentResponse {
    fn from(model: payment::Model) -> Self {
        Self {
            id: model.id,
            user_id: model.user_id,
            amount: model.amount,
            amount_minor_units: model.amount_minor,
            currency: model.currency,
            receipt: model.receipt,
            gateway_order_id: model.gateway_order_id,
            gateway_payment_id: model.gateway_payment_id,
            status: model.status.normalized(),
            created_at: model.created_at,
            verified_at: model.verified_at,
        }
    }
}

/// Set when a verified payment could not be applied to its booking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ReconciliationConflict {
    pub alert_id: Option<Uuid>,
    pub kind: AlertKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct VerifyPaymentResponse {
    pub status: VerificationOutcome,
    pub payment: PaymentResponse,
    pub booking: BookingResponse,
    pub conflict: Option<ReconciliationConflict>,
}

/// Converts a currency amount to integral minor units (paise).
pub fn to_minor_units(amount: Decimal) -> Result<i64, ServiceError> {
    let scaled = amount
        .checked_mul(Decimal::ONE_HUNDRED)
        .ok_or_else(|| ServiceError::ValidationError(format!("amount {} is out of range", amount)))?;
    if scaled.fract() != Decimal::ZERO {
        return Err(ServiceError::ValidationError(format!(
            "amount {} has more precision than the currency allows",
            amount
        )));
    }
    scaled.to_i64().ok_or_else(|| {
        ServiceError::ValidationError(format!("amount {} is out of range", amount))
    })
}

fn required(field: &'static str, value: Option<String>) -> Result<String, ServiceError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ServiceError::ValidationError(format!("{} is required", field)))
}

#[derive(Clone)]
pub struct PaymentService {
    db: Arc<DatabaseConnection>,
    gateway: Arc<dyn PaymentGateway>,
    verifier: Arc<SignatureVerifier>,
    notifier: Notifier,
    reconciliation: ReconciliationService,
    event_sender: Arc<EventSender>,
    currency: String,
}

impl PaymentService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        gateway: Arc<dyn PaymentGateway>,
        verifier: Arc<SignatureVerifier>,
        notifier: Notifier,
        reconciliation: ReconciliationService,
        event_sender: Arc<EventSender>,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            db,
            gateway,
            verifier,
            notifier,
            reconciliation,
            event_sender,
            currency: currency.into(),
        }
    }

    /// CreateGatewayOrder: opens a gateway order for a pending booking's
    /// exact total and records a `created` payment for it.
    #[instrument(skip(self, user, request), fields(user_id = %user.user_id, booking_id = %request.booking_id))]
    pub async fn create_gateway_order(
        &self,
        user: &AuthUser,
        request: CreateGatewayOrderRequest,
    ) -> Result<CheckoutHandoff, ServiceError> {
        request.validate()?;

        let booking = BookingEntity::find_by_id(request.booking_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .filter(|b| b.is_owned_by(&user.user_id))
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Booking {} not found", request.booking_id))
            })?;

        if booking.status != BookingStatus::Pending {
            return Err(ServiceError::StateError(format!(
                "booking {} is {}, only pending bookings can be paid",
                booking.id, booking.status
            )));
        }

        // Totals are stored at paise precision; some backends hand them
        // back as floats.
        let total = booking.total.round_dp(2);
        if request.amount != total {
            return Err(ServiceError::ValidationError(format!(
                "amount {} does not match booking total {}",
                request.amount, total
            )));
        }

        let amount_minor = to_minor_units(total)?;
        let receipt = booking.id.to_string();

        let order = match self
            .gateway
            .create_order(amount_minor, &self.currency, &receipt)
            .await
        {
            Ok(order) => order,
            Err(e) => {
                metrics::counter!("textile.gateway.order_failures", 1);
                error!(error = %e, booking_id = %booking.id, "gateway order creation failed");
                return Err(e.into());
            }
        };

        if order.amount_minor_units != amount_minor || order.currency != self.currency {
            metrics::counter!("textile.gateway.order_failures", 1);
            error!(
                expected_amount = amount_minor,
                gateway_amount = order.amount_minor_units,
                expected_currency = %self.currency,
                gateway_currency = %order.currency,
                gateway_order_id = %order.gateway_order_id,
                "gateway order does not match the booking"
            );
            return Err(ServiceError::GatewayError(format!(
                "gateway order {} does not match the requested amount",
                order.gateway_order_id
            )));
        }

        let payment_id = Uuid::new_v4();
        let model = PaymentActiveModel {
            id: Set(payment_id),
            user_id: Set(user.user_id.clone()),
            amount: Set(total),
            amount_minor: Set(amount_minor),
            currency: Set(order.currency.clone()),
            receipt: Set(receipt),
            gateway_order_id: Set(order.gateway_order_id.clone()),
            gateway_payment_id: Set(None),
            gateway_signature: Set(None),
            status: Set(PaymentStatus::Created),
            created_at: Set(Utc::now()),
            verified_at: Set(None),
        };
        PaymentEntity::insert(model)
            .exec_without_returning(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        metrics::counter!("textile.payments.orders_created", 1);
        info!(
            payment_id = %payment_id,
            gateway_order_id = %order.gateway_order_id,
            amount_minor,
            "Gateway order created"
        );

        self.event_sender
            .send_or_log(Event::PaymentOrderCreated {
                payment_id,
                booking_id: booking.id,
                gateway_order_id: order.gateway_order_id.clone(),
            })
            .await;

        Ok(CheckoutHandoff {
            gateway_order_id: order.gateway_order_id,
            amount_minor_units: amount_minor,
            currency: order.currency,
            key: self.gateway.public_key().to_string(),
            payment_id,
            booking_id: booking.id,
        })
    }

    /// VerifyPayment: settles a payment from the widget's signed callback
    /// and moves its booking. Settled payments are never re-decided; a replay
    /// reports what was stored.
    #[instrument(skip(self, user, request), fields(user_id = %user.user_id))]
    pub async fn verify_payment(
        &self,
        user: &AuthUser,
        request: VerifyPaymentRequest,
    ) -> Result<VerifyPaymentResponse, ServiceError> {
        let gateway_order_id = required("gateway_order_id", request.gateway_order_id)?;
        let gateway_payment_id = required("gateway_payment_id", request.gateway_payment_id)?;
        let gateway_signature = required("gateway_signature", request.gateway_signature)?;
        let payment_id = request
            .payment_id
            .ok_or_else(|| ServiceError::ValidationError("payment_id is required".to_string()))?;
        let booking_id = request
            .booking_id
            .ok_or_else(|| ServiceError::ValidationError("booking_id is required".to_string()))?;

        let outcome = if self
            .verifier
            .verify(&gateway_order_id, &gateway_payment_id, &gateway_signature)
        {
            VerificationOutcome::Success
        } else {
            VerificationOutcome::Failed
        };

        let payment = PaymentEntity::find_by_id(payment_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .filter(|p| p.user_id == user.user_id);
        let Some(payment) = payment else {
            if outcome == VerificationOutcome::Success {
                // The customer may have been charged for something we cannot find.
                warn!(%payment_id, %gateway_order_id, %gateway_payment_id, "valid signature for unknown payment");
            }
            return Err(ServiceError::NotFound(format!("Payment {} not found", payment_id)));
        };

        let booking = BookingEntity::find_by_id(booking_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .filter(|b| b.is_owned_by(&user.user_id))
            .ok_or_else(|| ServiceError::NotFound(format!("Booking {} not found", booking_id)))?;

        if payment.gateway_order_id != gateway_order_id {
            return Err(ServiceError::ValidationError(
                "gateway_order_id does not belong to this payment".to_string(),
            ));
        }
        if payment.receipt != booking.id.to_string() {
            return Err(ServiceError::ValidationError(
                "payment was not opened for this booking".to_string(),
            ));
        }

        if payment.status.is_terminal() {
            info!(payment_id = %payment.id, status = %payment.status, "payment already settled");
            return self.settled_response(payment, booking);
        }

        let new_status = outcome.payment_status();
        let now = Utc::now();
        let result = PaymentEntity::update_many()
            .col_expr(payment::Column::Status, Expr::value(new_status))
            .col_expr(
                payment::Column::GatewayPaymentId,
                Expr::value(Some(gateway_payment_id.clone())),
            )
            .col_expr(
                payment::Column::GatewaySignature,
                Expr::value(Some(gateway_signature.clone())),
            )
            .col_expr(payment::Column::VerifiedAt, Expr::value(Some(now)))
            .filter(payment::Column::Id.eq(payment.id))
            .filter(payment::Column::Status.is_in(PaymentStatus::OPEN))
            .exec(&*self.db)
            .await
            .map_err(ServiceError::db_error)?;

        if result.rows_affected == 0 {
            // A concurrent verification settled it first.
            let payment = self.reload_payment(payment.id).await?;
            let booking = self.reload_booking(booking.id).await?;
            info!(payment_id = %payment.id, status = %payment.status, "payment settled concurrently");
            return self.settled_response(payment, booking);
        }

        metrics::counter!("textile.payments.verified", 1, "outcome" => outcome.to_string());
        info!(payment_id = %payment.id, %outcome, "Payment verified");

        self.event_sender
            .send_or_log(Event::PaymentVerified {
                payment_id: payment.id,
                booking_id: booking.id,
                outcome,
            })
            .await;

        let mut conflict = None;
        match outcome {
            VerificationOutcome::Success => {
                let moved = transition_booking(
                    &*self.db,
                    booking.id,
                    &[BookingStatus::Pending],
                    BookingStatus::Processing,
                    Some(payment.id),
                )
                .await?;

                if moved {
                    self.booking_moved(booking.id, BookingStatus::Processing)
                        .await;
                } else {
                    let current = self.reload_booking(booking.id).await?;
                    let kind = if current.status == BookingStatus::Cancelled {
                        AlertKind::VerifiedAfterCancel
                    } else {
                        AlertKind::DuplicateSuccess
                    };
                    let detail = format!(
                        "payment {} ({}) succeeded but booking {} is {}",
                        payment.id, gateway_payment_id, current.id, current.status
                    );
                    let alert = self
                        .reconciliation
                        .record_alert(current.id, payment.id, kind, current.status, detail)
                        .await?;
                    conflict = Some(ReconciliationConflict {
                        alert_id: Some(alert.id),
                        kind,
                    });
                }
            }
            VerificationOutcome::Failed => {
                let moved = transition_booking(
                    &*self.db,
                    booking.id,
                    &[BookingStatus::Pending],
                    BookingStatus::Cancelled,
                    None,
                )
                .await?;
                if moved {
                    self.booking_moved(booking.id, BookingStatus::Cancelled)
                        .await;
                } else {
                    info!(booking_id = %booking.id, "booking no longer pending; failed payment leaves it as is");
                }
            }
        }

        let payment = self.reload_payment(payment.id).await?;
        let booking = self.reload_booking(booking.id).await?;

        if conflict.is_none()
            && outcome == VerificationOutcome::Success
            && booking.payment_id == Some(payment.id)
        {
            self.notifier.dispatch(paid_notice(&booking, &payment));
        }

        Ok(VerifyPaymentResponse {
            status: outcome,
            payment: payment.into(),
            booking: booking.into(),
            conflict,
        })
    }

    #[instrument(skip(self, user), fields(user_id = %user.user_id))]
    pub async fn get_payment(
        &self,
        user: &AuthUser,
        payment_id: Uuid,
    ) -> Result<PaymentResponse, ServiceError> {
        PaymentEntity::find_by_id(payment_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .filter(|p| p.user_id == user.user_id || user.is_admin())
            .map(Into::into)
            .ok_or_else(|| ServiceError::NotFound(format!("Payment {} not found", payment_id)))
    }

    async fn booking_moved(&self, booking_id: Uuid, new_status: BookingStatus) {
        self.event_sender
            .send_or_log(Event::BookingStatusChanged {
                booking_id,
                old_status: BookingStatus::Pending,
                new_status,
            })
            .await;
    }

    fn settled_response(
        &self,
        payment: payment::Model,
        booking: booking::Model,
    ) -> Result<VerifyPaymentResponse, ServiceError> {
        let status = VerificationOutcome::from_settled(payment.status).ok_or_else(|| {
            ServiceError::InternalError(format!("payment {} is not settled", payment.id))
        })?;

        if status == VerificationOutcome::Success && booking.status == BookingStatus::Pending {
            // Either the settling call is still between its two writes or it
            // died there; the orphan report picks up the latter.
            warn!(
                payment_id = %payment.id,
                booking_id = %booking.id,
                "settled payment replayed while its booking is still pending"
            );
        }

        // A pending booking means the winning call has not linked it yet.
        let conflict = (status == VerificationOutcome::Success
            && booking.status != BookingStatus::Pending
            && booking.payment_id != Some(payment.id))
        .then(|| ReconciliationConflict {
            alert_id: None,
            kind: if booking.status == BookingStatus::Cancelled {
                AlertKind::VerifiedAfterCancel
            } else {
                AlertKind::DuplicateSuccess
            },
        });

        Ok(VerifyPaymentResponse {
            status,
            payment: payment.into(),
            booking: booking.into(),
            conflict,
        })
    }

    async fn reload_payment(&self, payment_id: Uuid) -> Result<payment::Model, ServiceError> {
        PaymentEntity::find_by_id(payment_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Payment {} not found", payment_id)))
    }

    async fn reload_booking(&self, booking_id: Uuid) -> Result<booking::Model, ServiceError> {
        BookingEntity::find_by_id(booking_id)
            .one(&*self.db)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| ServiceError::NotFound(format!("Booking {} not found", booking_id)))
    }
}

fn paid_notice(booking: &booking::Model, payment: &payment::Model) -> BookingPaidNotice {
    BookingPaidNotice {
        user_email: booking.user_email.clone(),
        user_name: booking.user_name.clone(),
        booking: BookingSummary {
            booking_id: booking.id,
            process_category: booking.process_category.to_string(),
            material: booking.material.clone(),
            quantity: booking.quantity,
            unit_rate: booking.unit_rate,
            total: booking.total,
        },
        payment: PaymentSummary {
            payment_id: payment.id,
            gateway_payment_id: payment.gateway_payment_id.clone().unwrap_or_default(),
            amount: payment.amount,
            currency: payment.currency.clone(),
            verified_at: payment.verified_at.unwrap_or(payment.created_at),
        },
    }
}
