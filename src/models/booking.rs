use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Lifecycle of a booking.
///
/// ```text
/// pending -> processing -> completed
///    \           \
///     +-----------+-> cancelled
/// ```
///
/// `processing -> cancelled` is reserved for administrators.
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
pub enum BookingStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "processing")]
    Processing,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl BookingStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Transitions any caller may trigger through the booking flow.
    pub fn can_transition_to(self, next: BookingStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing)
                | (Self::Pending, Self::Cancelled)
                | (Self::Processing, Self::Completed)
        )
    }

    /// Transitions an administrator may trigger. Adds cancelling work that
    /// is already paid for and in progress.
    pub fn can_admin_transition_to(self, next: BookingStatus) -> bool {
        self.can_transition_to(next) || (self == Self::Processing && next == Self::Cancelled)
    }
}

/// Processing services offered by the mill.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
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
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ProcessCategory {
    #[sea_orm(string_value = "sizing")]
    Sizing,
    #[sea_orm(string_value = "weaving")]
    Weaving,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    const ALL: [BookingStatus; 4] = [
        BookingStatus::Pending,
        BookingStatus::Processing,
        BookingStatus::Completed,
        BookingStatus::Cancelled,
    ];

    #[test]
    fn terminal_states_have_no_exits() {
        for from in ALL.iter().copied().filter(|s| s.is_terminal()) {
            for to in ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
                assert!(!from.can_admin_transition_to(to), "{from} -> {to} (admin)");
            }
        }
    }

    #[test]
    fn pending_moves_forward_or_cancels() {
        assert!(BookingStatus::Pending.can_transition_to(BookingStatus::Processing));
        assert!(BookingStatus::Pending.can_transition_to(BookingStatus::Cancelled));
        assert!(!BookingStatus::Pending.can_transition_to(BookingStatus::Completed));
        assert!(!BookingStatus::Pending.can_transition_to(BookingStatus::Pending));
    }

    #[test]
    fn only_admin_cancels_processing() {
        assert!(!BookingStatus::Processing.can_transition_to(BookingStatus::Cancelled));
        assert!(BookingStatus::Processing.can_admin_transition_to(BookingStatus::Cancelled));
        assert!(!BookingStatus::Processing.can_admin_transition_to(BookingStatus::Pending));
    }

    #[test]
    fn status_text_round_trips() {
        assert_eq!(BookingStatus::Cancelled.to_string(), "cancelled");
        assert_eq!(
            BookingStatus::from_str("processing").unwrap(),
            BookingStatus::Processing
        );
        assert_eq!(
            serde_json::to_value(BookingStatus::Pending).unwrap(),
            serde_json::json!("pending")
        );
    }

    #[test]
    fn category_parse_is_case_insensitive() {
        assert_eq!(
            ProcessCategory::from_str("Weaving").unwrap(),
            ProcessCategory::Weaving
        );
        assert!(ProcessCategory::from_str("dyeing").is_err());
    }
}
