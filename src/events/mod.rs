use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{AlertKind, BookingStatus, VerificationOutcome};

/// Domain events emitted by the booking and payment services.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    BookingCreated(Uuid),
    BookingStatusChanged {
        booking_id: Uuid,
        old_status: BookingStatus,
        new_status: BookingStatus,
    },
    PaymentOrderCreated {
        payment_id: Uuid,
        booking_id: Uuid,
        gateway_order_id: String,
    },
    PaymentVerified {
        payment_id: Uuid,
        booking_id: Uuid,
        outcome: VerificationOutcome,
    },
    ReconciliationConflict {
        alert_id: Uuid,
        booking_id: Uuid,
        payment_id: Uuid,
        kind: AlertKind,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when the processor is gone.
    /// State changes have already been committed by the time events go out.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            warn!("{}", e);
        }
    }
}

pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::ReconciliationConflict {
                alert_id,
                booking_id,
                payment_id,
                kind,
            } => {
                warn!(
                    %alert_id,
                    %booking_id,
                    %payment_id,
                    %kind,
                    "reconciliation conflict needs operator attention"
                );
            }
            other => info!(event = ?other, "domain event"),
        }
    }

    info!("Event channel closed, stopping event processing loop");
}
