use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    handlers::health::{ComponentHealth, ComponentStatus, HealthResponse, StatusResponse},
    models::{AlertKind, BookingStatus, PaymentStatus, ProcessCategory, VerificationOutcome},
    services::{
        bookings::{BookingResponse, StartBookingRequest, UpdateBookingStatusRequest},
        payments::{
            CheckoutHandoff, CreateGatewayOrderRequest, PaymentResponse, ReconciliationConflict,
            VerifyPaymentRequest, VerifyPaymentResponse,
        },
        pricing::CatalogEntry,
        reconciliation::{OrphanedPayment, ReconciliationAlertResponse},
    },
};

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Textile Booking API",
        version = "1.0.0",
        description = r#"
# Textile Booking API

Book sizing and weaving work and pay for it through the payment gateway's
checkout widget.

## Flow

1. `POST /api/v1/bookings` creates a `pending` booking priced from the catalog.
2. `POST /api/v1/payments/order` opens a gateway order for the booking total.
3. The checkout widget collects payment and returns a signed result.
4. `POST /api/v1/payments/verify` checks the signature and moves the booking
   to `processing` (paid) or `cancelled` (failed).

A booking that is cancelled while a payment is still in flight stays
cancelled; the late payment is recorded and raised as a reconciliation alert.

## Authentication

Every endpoint except the catalog, status and health requires a bearer token:

```
Authorization: Bearer <your-jwt-token>
```

## Error Handling

Failures share one body shape:

```json
{
  "error": "Conflict",
  "message": "Invalid state: booking ... is processing, expected pending",
  "request_id": "req-abc123xyz",
  "timestamp": "2026-01-01T00:00:00Z"
}
```
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Bookings", description = "Booking lifecycle"),
        (name = "Payments", description = "Gateway orders and verification"),
        (name = "Catalog", description = "Processing rates"),
        (name = "Admin", description = "Reconciliation tooling"),
        (name = "Health", description = "Health check endpoints")
    ),
    paths(
        // Bookings
        crate::handlers::bookings::start_booking,
        crate::handlers::bookings::list_bookings,
        crate::handlers::bookings::get_booking,
        crate::handlers::bookings::update_booking_status,

        // Payments
        crate::handlers::payments::create_gateway_order,
        crate::handlers::payments::verify_payment,
        crate::handlers::payments::get_payment,

        // Catalog
        crate::handlers::catalog::list_catalog,

        // Admin
        crate::handlers::admin::list_alerts,
        crate::handlers::admin::resolve_alert,
        crate::handlers::admin::list_orphans,

        // Health
        crate::handlers::health::api_status,
        crate::handlers::health::health_check,
    ),
    components(
        schemas(
            BookingStatus,
            ProcessCategory,
            PaymentStatus,
            VerificationOutcome,
            AlertKind,
            StartBookingRequest,
            UpdateBookingStatusRequest,
            BookingResponse,
            CreateGatewayOrderRequest,
            CheckoutHandoff,
            VerifyPaymentRequest,
            VerifyPaymentResponse,
            PaymentResponse,
            ReconciliationConflict,
            CatalogEntry,
            ReconciliationAlertResponse,
            OrphanedPayment,
            StatusResponse,
            HealthResponse,
            ComponentHealth,
            ComponentStatus,

            // Error types
            crate::errors::ErrorResponse
        )
    ),
    modifiers(&BearerAuth)
)]
pub struct ApiDocV1;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDocV1::openapi())
        .config(utoipa_swagger_ui::Config::from("/api-docs/openapi.json").try_it_out_enabled(true))
}
