pub mod booking;
pub mod payment;
pub mod reconciliation_alert;
