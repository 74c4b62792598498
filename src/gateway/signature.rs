use crate::errors::ServiceError;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Checks checkout callbacks against the gateway key secret.
///
/// The signed message is `"{gateway_order_id}|{gateway_payment_id}"` and the
/// signature is its HMAC-SHA256, hex encoded.
#[derive(Clone)]
pub struct SignatureVerifier {
    mac: HmacSha256,
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier").finish_non_exhaustive()
    }
}

impl SignatureVerifier {
    pub fn new(secret: &str) -> Result<Self, ServiceError> {
        let mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| ServiceError::InternalError(format!("invalid signing key: {e}")))?;
        Ok(Self { mac })
    }

    fn keyed(&self, gateway_order_id: &str, gateway_payment_id: &str) -> HmacSha256 {
        let mut mac = self.mac.clone();
        mac.update(gateway_order_id.as_bytes());
        mac.update(b"|");
        mac.update(gateway_payment_id.as_bytes());
        mac
    }

    pub fn sign(&self, gateway_order_id: &str, gateway_payment_id: &str) -> String {
        hex::encode(
            self.keyed(gateway_order_id, gateway_payment_id)
                .finalize()
                .into_bytes(),
        )
    }

    /// Constant-time comparison of `signature` with the expected one.
    /// Anything that is not valid hex simply fails to verify.
    pub fn verify(&self, gateway_order_id: &str, gateway_payment_id: &str, signature: &str) -> bool {
        let Ok(provided) = hex::decode(signature.trim()) else {
            return false;
        };
        self.keyed(gateway_order_id, gateway_payment_id)
            .verify_slice(&provided)
            .is_ok()
    }
}
