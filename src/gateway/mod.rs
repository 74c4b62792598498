//! Adapter for the third-party payment gateway.
//!
//! The gateway is reached over HTTP and treated as a black box: it creates
//! orders, and its checkout widget hands back an HMAC-signed
//! `(order id, payment id)` pair that [`signature::SignatureVerifier`]
//! checks with the server-held secret.

pub mod http;
pub mod signature;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use http::HttpGateway;
pub use signature::SignatureVerifier;

/// Order as acknowledged by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayOrder {
    pub gateway_order_id: String,
    pub amount_minor_units: i64,
    pub currency: String,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway request timed out")]
    Timeout,
    #[error("gateway transport error: {0}")]
    Transport(String),
    #[error("gateway rejected the request with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("gateway returned an unreadable response: {0}")]
    InvalidResponse(String),
    #[error("gateway circuit is open")]
    Unavailable,
}

impl From<GatewayError> for crate::errors::ServiceError {
    fn from(err: GatewayError) -> Self {
        crate::errors::ServiceError::GatewayError(err.to_string())
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Opens an order for `amount_minor_units`. `receipt` is echoed back by
    /// the gateway on its records.
    async fn create_order(
        &self,
        amount_minor_units: i64,
        currency: &str,
        receipt: &str,
    ) -> Result<GatewayOrder, GatewayError>;

    /// Public key id the checkout widget is opened with.
    fn public_key(&self) -> &str;
}
