#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{Method, Request, StatusCode},
    response::Response,
    Router,
};
use serde_json::Value;
use textile_booking_api::{
    app_router,
    auth::{AuthConfig, AuthService, AuthUser},
    config::AppConfig,
    db::{self, DbConfig},
    events::{self, EventSender},
    gateway::{GatewayError, GatewayOrder, PaymentGateway, SignatureVerifier},
    handlers::AppServices,
    notifications::{BookingPaidNotice, NotificationDispatcher, NotificationError, Notifier},
    services::pricing::PricingCatalog,
    AppState,
};
use tokio::sync::mpsc;
use tower::ServiceExt;

pub const JWT_SECRET: &str = "k3Jd8s0Qm2Zx7Vb1Nc4Lp9Wy6Rt5Ge0Hu3Io8Pa2Sd7Fg1Jk4Lz6Xc9Vb0Nm5Qw3Er";
pub const GATEWAY_SECRET: &str = "gateway_test_secret";

/// How the fake gateway answers the next `create_order` calls.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum GatewayMode {
    Accept = 0,
    Timeout = 1,
    WrongAmount = 2,
}

/// In-process stand-in for the payment gateway.
#[derive(Default)]
pub struct FakeGateway {
    mode: AtomicU8,
    next_order: AtomicU64,
    calls: AtomicU64,
}

impl FakeGateway {
    pub fn set_mode(&self, mode: GatewayMode) {
        self.mode.store(mode as u8, Ordering::SeqCst);
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_order(
        &self,
        amount_minor_units: i64,
        currency: &str,
        _receipt: &str,
    ) -> Result<GatewayOrder, GatewayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.mode.load(Ordering::SeqCst) {
            1 => Err(GatewayError::Timeout),
            mode => {
                let n = self.next_order.fetch_add(1, Ordering::SeqCst) + 1;
                let amount = if mode == GatewayMode::WrongAmount as u8 {
                    amount_minor_units + 1
                } else {
                    amount_minor_units
                };
                Ok(GatewayOrder {
                    gateway_order_id: format!("order_test_{n}"),
                    amount_minor_units: amount,
                    currency: currency.to_string(),
                })
            }
        }
    }

    fn public_key(&self) -> &str {
        "rzp_test_key"
    }
}

/// Keeps every booking-paid notice it is handed.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<BookingPaidNotice>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<BookingPaidNotice> {
        self.sent.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingNotifier {
    async fn notify_booking_paid(
        &self,
        notice: &BookingPaidNotice,
    ) -> Result<(), NotificationError> {
        self.sent.lock().unwrap().push(notice.clone());
        Ok(())
    }
}

/// Full application over an in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub gateway: Arc<FakeGateway>,
    pub notifications: Arc<RecordingNotifier>,
    auth: Arc<AuthService>,
    verifier: SignatureVerifier,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            JWT_SECRET.to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.gateway.key_secret = GATEWAY_SECRET.to_string();

        // One connection: every connection to `sqlite::memory:` is its own database.
        let pool = db::establish_connection_with_config(&DbConfig {
            url: cfg.database_url.clone(),
            max_connections: 1,
            min_connections: 1,
            idle_timeout: Duration::from_secs(3600),
            ..DbConfig::default()
        })
        .await
        .expect("in-memory database");
        db::run_migrations(&pool).await.expect("migrations");
        let db = Arc::new(pool);

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = Arc::new(EventSender::new(event_tx));
        let event_task = tokio::spawn(events::process_events(event_rx));

        let gateway = Arc::new(FakeGateway::default());
        let notifications = Arc::new(RecordingNotifier::default());
        let auth = Arc::new(AuthService::new(AuthConfig::from(&cfg)));

        let services = AppServices::new(
            db.clone(),
            &cfg,
            Arc::new(PricingCatalog::default()),
            gateway.clone(),
            Notifier::new(notifications.clone()),
            event_sender,
        )
        .expect("services");

        let state = AppState {
            db,
            config: Arc::new(cfg),
            auth: auth.clone(),
            services,
        };

        Self {
            router: app_router(state.clone()),
            state,
            gateway,
            notifications,
            auth,
            verifier: SignatureVerifier::new(GATEWAY_SECRET).expect("verifier"),
            _event_task: event_task,
        }
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub async fn payment_rows(&self) -> u64 {
        use sea_orm::{EntityTrait, PaginatorTrait};
        textile_booking_api::entities::payment::Entity::find()
            .count(self.state.db.as_ref())
            .await
            .expect("count payments")
    }

    pub async fn booking_rows(&self) -> u64 {
        use sea_orm::{EntityTrait, PaginatorTrait};
        textile_booking_api::entities::booking::Entity::find()
            .count(self.state.db.as_ref())
            .await
            .expect("count bookings")
    }

    pub fn token_for(&self, user_id: &str, roles: &[&str]) -> String {
        self.auth
            .issue_token(&AuthUser {
                user_id: user_id.to_string(),
                name: Some(format!("{user_id} name")),
                email: Some(format!("{user_id}@example.com")),
                roles: roles.iter().map(|r| r.to_string()).collect(),
            })
            .expect("token")
    }

    pub fn customer_token(&self) -> String {
        self.token_for("customer-1", &["customer"])
    }

    pub fn admin_token(&self) -> String {
        self.token_for("operator-1", &["admin"])
    }

    /// Signature the checkout widget would hand back for a paid order.
    pub fn sign(&self, gateway_order_id: &str, gateway_payment_id: &str) -> String {
        self.verifier.sign(gateway_order_id, gateway_payment_id)
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }
        let body = match body {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(serde_json::to_vec(&json).expect("json body"))
            }
            None => Body::empty(),
        };

        self.router
            .clone()
            .oneshot(builder.body(body).expect("request"))
            .await
            .expect("router error during test request")
    }

    /// Sends a request and returns the status with the decoded JSON body.
    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> (StatusCode, Value) {
        let response = self.request(method, uri, body, token).await;
        let status = response.status();
        (status, response_json(response).await)
    }

    pub async fn start_booking(&self, token: &str, category: &str, material: &str, quantity: &str) -> Value {
        let (status, body) = self
            .call(
                Method::POST,
                "/api/v1/bookings",
                Some(serde_json::json!({
                    "process_category": category,
                    "material": material,
                    "quantity": quantity,
                })),
                Some(token),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "start booking: {body}");
        body["data"].clone()
    }

    pub async fn create_order(&self, token: &str, booking_id: &str, amount: &str) -> (StatusCode, Value) {
        self.call(
            Method::POST,
            "/api/v1/payments/order",
            Some(serde_json::json!({ "booking_id": booking_id, "amount": amount })),
            Some(token),
        )
        .await
    }

    /// Verifies `handoff` as the widget would after a payment, signing with
    /// the real secret when `valid` is set.
    pub async fn verify(&self, token: &str, handoff: &Value, gateway_payment_id: &str, valid: bool) -> (StatusCode, Value) {
        let order_id = handoff["gateway_order_id"].as_str().expect("order id");
        let signature = if valid {
            self.sign(order_id, gateway_payment_id)
        } else {
            "0".repeat(64)
        };
        self.call(
            Method::POST,
            "/api/v1/payments/verify",
            Some(serde_json::json!({
                "gateway_order_id": order_id,
                "gateway_payment_id": gateway_payment_id,
                "gateway_signature": signature,
                "payment_id": handoff["payment_id"],
                "booking_id": handoff["booking_id"],
            })),
            Some(token),
        )
        .await
    }

    /// Waits for spawned notification deliveries to land.
    pub async fn wait_for_notifications(&self, expected: usize) -> Vec<BookingPaidNotice> {
        for _ in 0..50 {
            let sent = self.notifications.sent();
            if sent.len() >= expected {
                return sent;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.notifications.sent()
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes).expect("json response")
}

/// Parses a decimal the API rendered as a JSON string or number.
pub fn decimal(value: &Value) -> rust_decimal::Decimal {
    let raw = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    raw.parse().expect("decimal value")
}
