pub mod booking;
pub mod payment;

pub use booking::{BookingStatus, ProcessCategory};
pub use payment::{PaymentStatus, VerificationOutcome};

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Kinds of booking/payment disagreement raised for an operator.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(48))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AlertKind {
    /// A valid payment arrived for a booking that was already cancelled.
    #[sea_orm(string_value = "verified_after_cancel")]
    VerifiedAfterCancel,
    /// A second successful payment arrived for a booking already paid.
    #[sea_orm(string_value = "duplicate_success")]
    DuplicateSuccess,
}
