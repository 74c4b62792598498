//! Client side of the checkout: a typed HTTP client for the booking API and
//! the state machine that holds a pending payment between the gateway order
//! being opened and its result being verified.
//!
//! ```text
//! NoPendingPayment --order created--> AwaitingGatewayResult
//! AwaitingGatewayResult --verified--> NoPendingPayment
//! AwaitingGatewayResult --dismissed--> Resumable
//! Resumable --resume--> AwaitingGatewayResult   (same gateway order)
//! Resumable --abandon--> NoPendingPayment        (booking cancelled)
//! ```
//!
//! Nothing expires a descriptor; it stays until one of the transitions above
//! removes it.

pub mod client;
pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::services::payments::CheckoutHandoff;

pub use client::{BookingClient, ClientError};
pub use store::{DescriptorStore, FileDescriptorStore, InMemoryDescriptorStore, StoreError};

/// Everything needed to reopen the checkout widget for an in-flight payment
/// without asking the server for a new gateway order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingPaymentDescriptor {
    pub booking_id: Uuid,
    pub payment_id: Uuid,
    pub gateway_order_id: String,
    pub amount_minor_units: i64,
    pub currency: String,
    pub key: String,
    pub created_at: DateTime<Utc>,
}

impl From<&CheckoutHandoff> for PendingPaymentDescriptor {
    fn from(handoff: &CheckoutHandoff) -> Self {
        Self {
            booking_id: handoff.booking_id,
            payment_id: handoff.payment_id,
            gateway_order_id: handoff.gateway_order_id.clone(),
            amount_minor_units: handoff.amount_minor_units,
            currency: handoff.currency.clone(),
            key: handoff.key.clone(),
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckoutState {
    NoPendingPayment,
    AwaitingGatewayResult(PendingPaymentDescriptor),
    Resumable(PendingPaymentDescriptor),
}

impl CheckoutState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::NoPendingPayment => "no_pending_payment",
            Self::AwaitingGatewayResult(_) => "awaiting_gateway_result",
            Self::Resumable(_) => "resumable",
        }
    }

    pub fn descriptor(&self) -> Option<&PendingPaymentDescriptor> {
        match self {
            Self::NoPendingPayment => None,
            Self::AwaitingGatewayResult(d) | Self::Resumable(d) => Some(d),
        }
    }
}

#[derive(Debug, Error)]
pub enum CheckoutError {
    #[error("a payment for booking {booking_id} is already pending; resume or abandon it first")]
    AlreadyPending { booking_id: Uuid },

    #[error("cannot {action} while {state}")]
    InvalidTransition {
        action: &'static str,
        state: &'static str,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Resume/abandon state machine over a descriptor store. Every transition
/// writes the store before the in-memory state changes, so a crash leaves
/// the store describing the last completed transition.
pub struct CheckoutMachine<S: DescriptorStore> {
    store: S,
    state: CheckoutState,
}

impl<S: DescriptorStore> CheckoutMachine<S> {
    /// A descriptor found in the store belongs to a checkout from an earlier
    /// session, whose widget is gone: it starts out `Resumable`.
    pub fn load(store: S) -> Result<Self, CheckoutError> {
        let state = match store.load()? {
            Some(descriptor) => {
                debug!(booking_id = %descriptor.booking_id, "found pending payment descriptor");
                CheckoutState::Resumable(descriptor)
            }
            None => CheckoutState::NoPendingPayment,
        };
        Ok(Self { store, state })
    }

    pub fn state(&self) -> &CheckoutState {
        &self.state
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// `NoPendingPayment -> AwaitingGatewayResult` once the gateway order exists.
    pub fn order_created(
        &mut self,
        handoff: &CheckoutHandoff,
    ) -> Result<PendingPaymentDescriptor, CheckoutError> {
        if let Some(existing) = self.state.descriptor() {
            return Err(CheckoutError::AlreadyPending {
                booking_id: existing.booking_id,
            });
        }

        let descriptor = PendingPaymentDescriptor::from(handoff);
        self.store.save(&descriptor)?;
        info!(booking_id = %descriptor.booking_id, gateway_order_id = %descriptor.gateway_order_id, "checkout opened");
        self.state = CheckoutState::AwaitingGatewayResult(descriptor.clone());
        Ok(descriptor)
    }

    /// `AwaitingGatewayResult -> NoPendingPayment` after a verified outcome,
    /// success or failure alike.
    pub fn outcome_verified(&mut self) -> Result<PendingPaymentDescriptor, CheckoutError> {
        let descriptor = match &self.state {
            CheckoutState::AwaitingGatewayResult(d) => d.clone(),
            other => return Err(invalid("record a verified outcome", other)),
        };
        self.store.clear()?;
        self.state = CheckoutState::NoPendingPayment;
        Ok(descriptor)
    }

    /// `AwaitingGatewayResult -> Resumable` when the widget closes with no
    /// result. The stored descriptor is kept as is.
    pub fn dismissed(&mut self) -> Result<PendingPaymentDescriptor, CheckoutError> {
        let descriptor = match &self.state {
            CheckoutState::AwaitingGatewayResult(d) => d.clone(),
            other => return Err(invalid("dismiss the checkout", other)),
        };
        self.state = CheckoutState::Resumable(descriptor.clone());
        Ok(descriptor)
    }

    /// `Resumable -> AwaitingGatewayResult`, reusing the same gateway order.
    pub fn resume(&mut self) -> Result<PendingPaymentDescriptor, CheckoutError> {
        let descriptor = match &self.state {
            CheckoutState::Resumable(d) => d.clone(),
            other => return Err(invalid("resume", other)),
        };
        self.state = CheckoutState::AwaitingGatewayResult(descriptor.clone());
        Ok(descriptor)
    }

    /// `Resumable -> NoPendingPayment`. The caller cancels the booking
    /// before calling this; the descriptor is only discarded afterwards.
    pub fn abandon(&mut self) -> Result<PendingPaymentDescriptor, CheckoutError> {
        let descriptor = match &self.state {
            CheckoutState::Resumable(d) => d.clone(),
            other => return Err(invalid("abandon", other)),
        };
        self.store.clear()?;
        self.state = CheckoutState::NoPendingPayment;
        info!(booking_id = %descriptor.booking_id, "pending payment abandoned");
        Ok(descriptor)
    }
}

fn invalid(action: &'static str, state: &CheckoutState) -> CheckoutError {
    CheckoutError::InvalidTransition {
        action,
        state: state.name(),
    }
}
