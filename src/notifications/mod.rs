use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::config::NotificationConfig;

/// Booking side of a paid notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingSummary {
    pub booking_id: Uuid,
    pub process_category: String,
    pub material: String,
    pub quantity: Decimal,
    pub unit_rate: Decimal,
    pub total: Decimal,
}

/// Payment side of a paid notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentSummary {
    pub payment_id: Uuid,
    pub gateway_payment_id: String,
    pub amount: Decimal,
    pub currency: String,
    pub verified_at: DateTime<Utc>,
}

/// `NotifyBookingPaid(userEmail, userName, bookingSummary, paymentSummary)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookingPaidNotice {
    pub user_email: Option<String>,
    pub user_name: Option<String>,
    pub booking: BookingSummary,
    pub payment: PaymentSummary,
}

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Delivery failed: {0}")]
    Delivery(String),
}

#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn notify_booking_paid(&self, notice: &BookingPaidNotice)
        -> Result<(), NotificationError>;
}

/// Writes notices to the log only. Used when no webhook is configured.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl NotificationDispatcher for LogNotifier {
    async fn notify_booking_paid(
        &self,
        notice: &BookingPaidNotice,
    ) -> Result<(), NotificationError> {
        info!(
            booking_id = %notice.booking.booking_id,
            payment_id = %notice.payment.payment_id,
            email = notice.user_email.as_deref().unwrap_or("-"),
            "booking paid"
        );
        Ok(())
    }
}

/// Posts notices as JSON to a webhook, retrying with exponential backoff.
#[derive(Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
    secret: Option<String>,
    max_retries: u32,
    base_backoff: Duration,
}

impl WebhookNotifier {
    pub fn new(
        url: impl Into<String>,
        secret: Option<String>,
        max_retries: u32,
    ) -> Result<Self, NotificationError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| NotificationError::Delivery(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
            secret,
            max_retries: max_retries.max(1),
            base_backoff: Duration::from_secs(1),
        })
    }

    pub fn with_base_backoff(mut self, base_backoff: Duration) -> Self {
        self.base_backoff = base_backoff;
        self
    }

    fn sign(&self, timestamp: &str, body: &str) -> Option<String> {
        use hmac::{Hmac, Mac};
        use sha2::Sha256;

        let secret = self.secret.as_ref()?;
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).ok()?;
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(body.as_bytes());
        Some(hex::encode(mac.finalize().into_bytes()))
    }
}

#[async_trait]
impl NotificationDispatcher for WebhookNotifier {
    #[instrument(skip(self, notice), fields(booking_id = %notice.booking.booking_id))]
    async fn notify_booking_paid(
        &self,
        notice: &BookingPaidNotice,
    ) -> Result<(), NotificationError> {
        let body = serde_json::to_string(&serde_json::json!({
            "type": "booking_paid",
            "data": notice,
        }))?;
        let timestamp = Utc::now().to_rfc3339();
        let signature = self.sign(&timestamp, &body);

        for attempt in 1..=self.max_retries {
            let mut request = self
                .client
                .post(&self.url)
                .header("Content-Type", "application/json")
                .header("Timestamp", &timestamp)
                .body(body.clone());

            if let Some(ref sig) = signature {
                request = request.header("X-Signature", sig);
            }

            match request.send().await {
                Ok(response) if response.status().is_success() => {
                    info!("booking paid notification delivered");
                    return Ok(());
                }
                Ok(response) => {
                    warn!(
                        "notification delivery failed with status: {} (attempt {}/{})",
                        response.status(),
                        attempt,
                        self.max_retries
                    );
                }
                Err(e) => {
                    warn!(
                        "notification delivery error: {} (attempt {}/{})",
                        e.without_url(),
                        attempt,
                        self.max_retries
                    );
                }
            }

            if attempt < self.max_retries {
                tokio::time::sleep(self.base_backoff * 2_u32.pow(attempt - 1)).await;
            }
        }

        Err(NotificationError::Delivery(format!(
            "gave up after {} attempts",
            self.max_retries
        )))
    }
}

/// Fire-and-forget front for a [`NotificationDispatcher`].
#[derive(Clone)]
pub struct Notifier {
    inner: Arc<dyn NotificationDispatcher>,
}

impl Notifier {
    pub fn new(inner: Arc<dyn NotificationDispatcher>) -> Self {
        Self { inner }
    }

    pub fn from_config(config: &NotificationConfig) -> Result<Self, NotificationError> {
        let inner: Arc<dyn NotificationDispatcher> = match &config.webhook_url {
            Some(url) if !url.trim().is_empty() => Arc::new(WebhookNotifier::new(
                url.clone(),
                config.webhook_secret.clone(),
                config.max_retries,
            )?),
            _ => Arc::new(LogNotifier),
        };
        Ok(Self { inner })
    }

    /// Spawns delivery on the runtime; the caller never waits for it and a
    /// failure is only logged.
    pub fn dispatch(&self, notice: BookingPaidNotice) {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            if let Err(e) = inner.notify_booking_paid(&notice).await {
                metrics::counter!("textile.notifications.failed", 1);
                error!(
                    booking_id = %notice.booking.booking_id,
                    error = %e,
                    "booking paid notification failed"
                );
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn notice() -> BookingPaidNotice {
        BookingPaidNotice {
            user_email: Some("weaver@example.com".into()),
            user_name: Some("Asha".into()),
            booking: BookingSummary {
                booking_id: Uuid::new_v4(),
                process_category: "sizing".into(),
                material: "Cotton".into(),
                quantity: dec!(10),
                unit_rate: dec!(450),
                total: dec!(4500),
            },
            payment: PaymentSummary {
                payment_id: Uuid::new_v4(),
                gateway_payment_id: "pay_1".into(),
                amount: dec!(4500),
                currency: "INR".into(),
                verified_at: Utc::now(),
            },
        }
    }

    #[tokio::test]
    async fn webhook_retries_until_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hooks/booking"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/hooks/booking"))
            .and(header_exists("X-Signature"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = WebhookNotifier::new(
            format!("{}/hooks/booking", server.uri()),
            Some("hook-secret".into()),
            3,
        )
        .unwrap()
        .with_base_backoff(Duration::from_millis(1));

        notifier.notify_booking_paid(&notice()).await.unwrap();
    }

    #[tokio::test]
    async fn webhook_gives_up_after_max_retries() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .expect(2)
            .mount(&server)
            .await;

        let notifier = WebhookNotifier::new(server.uri(), None, 2)
            .unwrap()
            .with_base_backoff(Duration::from_millis(1));

        let err = notifier.notify_booking_paid(&notice()).await.unwrap_err();
        assert!(matches!(err, NotificationError::Delivery(_)));
    }

    mockall::mock! {
        Dispatcher {}
        #[async_trait]
        impl NotificationDispatcher for Dispatcher {
            async fn notify_booking_paid(&self, notice: &BookingPaidNotice)
                -> Result<(), NotificationError>;
        }
    }

    #[tokio::test]
    async fn dispatch_swallows_delivery_failure() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let mut dispatcher = MockDispatcher::new();
        dispatcher
            .expect_notify_booking_paid()
            .times(1)
            .returning(move |notice| {
                let _ = tx.send(notice.booking.booking_id);
                Err(NotificationError::Delivery("smtp down".into()))
            });

        let sent = notice();
        Notifier::new(Arc::new(dispatcher)).dispatch(sent.clone());

        let delivered = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap();
        assert_eq!(delivered, Some(sent.booking.booking_id));
    }

    #[test]
    fn unset_webhook_falls_back_to_log_notifier() {
        assert!(Notifier::from_config(&NotificationConfig::default()).is_ok());
    }
}
