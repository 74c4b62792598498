use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Lifecycle of a payment attempt: `created -> success | failed`.
///
/// `pending` is a legacy value from older rows and is read as `created`.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    EnumIter,
    DeriveActiveEnum,
    Serialize,
    Deserialize,
    ToSchema,
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PaymentStatus {
    #[sea_orm(string_value = "created")]
    Created,
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "success")]
    Success,
    #[sea_orm(string_value = "failed")]
    Failed,
}

impl PaymentStatus {
    /// Statuses a verification is still allowed to move out of.
    pub const OPEN: [PaymentStatus; 2] = [PaymentStatus::Created, PaymentStatus::Pending];

    pub fn normalized(self) -> Self {
        match self {
            Self::Pending => Self::Created,
            other => other,
        }
    }

    pub fn is_open(self) -> bool {
        self.normalized() == Self::Created
    }

    pub fn is_terminal(self) -> bool {
        !self.is_open()
    }

    pub fn can_transition_to(self, next: PaymentStatus) -> bool {
        self.is_open() && matches!(next, Self::Success | Self::Failed)
    }
}

/// Result of checking a gateway callback signature.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum VerificationOutcome {
    Success,
    Failed,
}

impl VerificationOutcome {
    pub fn payment_status(self) -> PaymentStatus {
        match self {
            Self::Success => PaymentStatus::Success,
            Self::Failed => PaymentStatus::Failed,
        }
    }

    /// Outcome already recorded on a settled payment.
    pub fn from_settled(status: PaymentStatus) -> Option<Self> {
        match status {
            PaymentStatus::Success => Some(Self::Success),
            PaymentStatus::Failed => Some(Self::Failed),
            PaymentStatus::Created | PaymentStatus::Pending => None,
        }
    }
}
