use super::{GatewayError, GatewayOrder, PaymentGateway};
use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerError};
use crate::config::GatewayConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, instrument, warn};

#[derive(Debug, Serialize)]
struct CreateOrderBody<'a> {
    amount: i64,
    currency: &'a str,
    receipt: &'a str,
}

#[derive(Debug, Deserialize)]
struct CreateOrderReply {
    id: String,
    amount: i64,
    currency: String,
}

/// Gateway reached over its REST API with basic auth.
#[derive(Clone)]
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
    key_id: String,
    key_secret: String,
    breaker: CircuitBreaker,
}

impl HttpGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            key_id: config.key_id.clone(),
            key_secret: config.key_secret.clone(),
            breaker: CircuitBreaker::new(
                config.circuit_breaker_failure_threshold,
                Duration::from_secs(config.circuit_breaker_timeout_secs),
            ),
        })
    }

    async fn post_order(
        &self,
        amount_minor_units: i64,
        currency: &str,
        receipt: &str,
    ) -> Result<GatewayOrder, GatewayError> {
        let response = self
            .client
            .post(format!("{}/v1/orders", self.base_url))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&CreateOrderBody {
                amount: amount_minor_units,
                currency,
                receipt,
            })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::Timeout
                } else {
                    GatewayError::Transport(e.without_url().to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let reply: CreateOrderReply = response
            .json()
            .await
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;

        Ok(GatewayOrder {
            gateway_order_id: reply.id,
            amount_minor_units: reply.amount,
            currency: reply.currency,
        })
    }
}

#[async_trait]
impl PaymentGateway for HttpGateway {
    #[instrument(skip(self), fields(gateway = %self.base_url))]
    async fn create_order(
        &self,
        amount_minor_units: i64,
        currency: &str,
        receipt: &str,
    ) -> Result<GatewayOrder, GatewayError> {
        let result = self
            .breaker
            .call(|| self.post_order(amount_minor_units, currency, receipt))
            .await;

        match result {
            Ok(order) => {
                info!(gateway_order_id = %order.gateway_order_id, "gateway order created");
                Ok(order)
            }
            Err(CircuitBreakerError::CircuitOpen) => {
                warn!("gateway circuit open, refusing create_order");
                Err(GatewayError::Unavailable)
            }
            Err(CircuitBreakerError::ServiceFailure(err)) => {
                warn!(error = %err, "gateway create_order failed");
                Err(err)
            }
        }
    }

    fn public_key(&self) -> &str {
        &self.key_id
    }
}
