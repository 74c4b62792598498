// Booking flow
pub mod bookings;
pub mod payments;
pub mod pricing;

// Operator tooling
pub mod reconciliation;
