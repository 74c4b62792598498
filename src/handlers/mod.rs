pub mod admin;
pub mod bookings;
pub mod catalog;
pub mod health;
pub mod payments;

use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequest, Request},
    Json,
};
use sea_orm::DatabaseConnection;
use serde::de::DeserializeOwned;

use crate::{
    config::AppConfig,
    errors::ServiceError,
    events::EventSender,
    gateway::{PaymentGateway, SignatureVerifier},
    notifications::Notifier,
    services::{
        bookings::BookingService, payments::PaymentService, pricing::PricingCatalog,
        reconciliation::ReconciliationService,
    },
};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub bookings: Arc<BookingService>,
    pub payments: Arc<PaymentService>,
    pub reconciliation: Arc<ReconciliationService>,
}

impl AppServices {
    /// Wires the booking flow around one database and one gateway.
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: &AppConfig,
        catalog: Arc<PricingCatalog>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Notifier,
        event_sender: Arc<EventSender>,
    ) -> Result<Self, ServiceError> {
        let verifier = Arc::new(SignatureVerifier::new(&config.gateway.key_secret)?);

        let bookings = BookingService::new(db.clone(), catalog, event_sender.clone())
            .with_page_sizes(config.api_default_page_size, config.api_max_page_size);
        let reconciliation = ReconciliationService::new(db.clone(), event_sender.clone());
        let payments = PaymentService::new(
            db,
            gateway,
            verifier,
            notifier,
            reconciliation.clone(),
            event_sender,
            config.gateway.currency.clone(),
        );

        Ok(Self {
            bookings: Arc::new(bookings),
            payments: Arc::new(payments),
            reconciliation: Arc::new(reconciliation),
        })
    }
}

/// `Json` extractor whose rejections use the service error taxonomy, so a
/// malformed body is a 400 with the usual error envelope.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(JsonBody(value)),
            Err(rejection) => Err(ServiceError::ValidationError(rejection.body_text())),
        }
    }
}
