use std::time::Duration;

use reqwest::{Method, RequestBuilder, StatusCode};
use rust_decimal::Decimal;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::{
    errors::ErrorResponse,
    services::{
        bookings::{BookingResponse, StartBookingRequest, UpdateBookingStatusRequest},
        payments::{
            CheckoutHandoff, CreateGatewayOrderRequest, PaymentResponse, VerifyPaymentRequest,
            VerifyPaymentResponse,
        },
        pricing::CatalogEntry,
    },
    ApiResponse, PaginatedResponse,
};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{status} {error}: {message}")]
    Api {
        status: u16,
        error: String,
        message: String,
        request_id: Option<String>,
    },

    #[error("unexpected response body: {0}")]
    Decode(String),
}

impl ClientError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            Self::Decode(_) => None,
        }
    }

    /// Gateway failures and lost connections can be retried; client bugs
    /// and state conflicts cannot.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Api { status, .. } => matches!(*status, 502..=504),
            Self::Decode(_) => false,
        }
    }
}

/// Typed client for the `/api/v1` booking surface.
#[derive(Debug, Clone)]
pub struct BookingClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl BookingClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: None,
        })
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub async fn catalog(&self) -> Result<Vec<CatalogEntry>, ClientError> {
        self.send(self.request(Method::GET, "/catalog")).await
    }

    #[instrument(skip(self, request))]
    pub async fn start_booking(
        &self,
        request: &StartBookingRequest,
    ) -> Result<BookingResponse, ClientError> {
        self.send(self.request(Method::POST, "/bookings").json(request))
            .await
    }

    pub async fn get_booking(&self, booking_id: Uuid) -> Result<BookingResponse, ClientError> {
        self.send(self.request(Method::GET, &format!("/bookings/{}", booking_id)))
            .await
    }

    pub async fn list_bookings(
        &self,
        status: Option<&str>,
        page: u64,
        per_page: u64,
    ) -> Result<PaginatedResponse<BookingResponse>, ClientError> {
        let mut query: Vec<(&str, String)> = vec![
            ("page", page.to_string()),
            ("per_page", per_page.to_string()),
        ];
        if let Some(status) = status {
            query.push(("status", status.to_string()));
        }
        self.send(self.request(Method::GET, "/bookings").query(&query))
            .await
    }

    #[instrument(skip(self))]
    pub async fn cancel_booking(&self, booking_id: Uuid) -> Result<BookingResponse, ClientError> {
        let body = UpdateBookingStatusRequest {
            status: "cancelled".to_string(),
        };
        self.send(
            self.request(Method::PATCH, &format!("/bookings/{}", booking_id))
                .json(&body),
        )
        .await
    }

    #[instrument(skip(self))]
    pub async fn create_gateway_order(
        &self,
        booking_id: Uuid,
        amount: Decimal,
    ) -> Result<CheckoutHandoff, ClientError> {
        let body = CreateGatewayOrderRequest { booking_id, amount };
        self.send(self.request(Method::POST, "/payments/order").json(&body))
            .await
    }

    #[instrument(skip(self, request))]
    pub async fn verify_payment(
        &self,
        request: &VerifyPaymentRequest,
    ) -> Result<VerifyPaymentResponse, ClientError> {
        self.send(self.request(Method::POST, "/payments/verify").json(request))
            .await
    }

    pub async fn get_payment(&self, payment_id: Uuid) -> Result<PaymentResponse, ClientError> {
        self.send(self.request(Method::GET, &format!("/payments/{}", payment_id)))
            .await
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .http
            .request(method, format!("{}/api/v1{}", self.base_url, path));
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ClientError> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        debug!(status = status.as_u16(), "booking api responded");
        decode_response(status, &body)
    }
}

fn decode_response<T: DeserializeOwned>(status: StatusCode, body: &str) -> Result<T, ClientError> {
    if status.is_success() {
        let envelope: ApiResponse<T> =
            serde_json::from_str(body).map_err(|e| ClientError::Decode(e.to_string()))?;
        return envelope
            .data
            .ok_or_else(|| ClientError::Decode("response envelope carried no data".to_string()));
    }

    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(err) => Err(ClientError::Api {
            status: status.as_u16(),
            error: err.error,
            message: err.message,
            request_id: err.request_id,
        }),
        Err(_) => Err(ClientError::Api {
            status: status.as_u16(),
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: body.to_string(),
            request_id: None,
        }),
    }
}

/// Serializable form of a client failure for `--json` output.
#[derive(Debug, Serialize)]
pub struct ClientFailure {
    pub status: Option<u16>,
    pub retryable: bool,
    pub message: String,
}

impl From<&ClientError> for ClientFailure {
    fn from(err: &ClientError) -> Self {
        Self {
            status: err.status(),
            retryable: err.is_retryable(),
            message: err.to_string(),
        }
    }
}
