//! Slack request signature verification.
//!
//! Slack signs `v0:{timestamp}:{body}` with HMAC-SHA256 and sends the result
//! as `X-Slack-Signature: v0=<hex>` next to `X-Slack-Request-Timestamp`.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

/// Requests older (or further in the future) than this are replays.
const MAX_SKEW_SECS: i64 = 300;
const VERSION: &str = "v0";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    #[error("missing {0} header")]
    MissingHeader(&'static str),
    #[error("malformed timestamp")]
    MalformedTimestamp,
    #[error("timestamp outside the accepted window")]
    Stale,
    #[error("signature mismatch")]
    Mismatch,
}

#[derive(Clone)]
pub struct SignatureVerifier {
    secret: SecretString,
}

impl SignatureVerifier {
    pub fn new(secret: SecretString) -> Self {
        Self { secret }
    }

    pub fn verify(
        &self,
        timestamp: Option<&str>,
        signature: Option<&str>,
        body: &[u8],
    ) -> Result<(), SignatureError> {
        self.verify_at(chrono::Utc::now().timestamp(), timestamp, signature, body)
    }

    pub fn verify_at(
        &self,
        now: i64,
        timestamp: Option<&str>,
        signature: Option<&str>,
        body: &[u8],
    ) -> Result<(), SignatureError> {
        let timestamp = timestamp.ok_or(SignatureError::MissingHeader("X-Slack-Request-Timestamp"))?;
        let signature = signature.ok_or(SignatureError::MissingHeader("X-Slack-Signature"))?;

        let ts: i64 = timestamp
            .trim()
            .parse()
            .map_err(|_| SignatureError::MalformedTimestamp)?;
        if (now - ts).abs() > MAX_SKEW_SECS {
            return Err(SignatureError::Stale);
        }

        let provided = signature
            .strip_prefix("v0=")
            .and_then(|hex_sig| hex::decode(hex_sig).ok())
            .ok_or(SignatureError::Mismatch)?;
        let expected = self.compute(ts, body)?;

        if expected.len() == provided.len() && bool::from(expected.ct_eq(&provided)) {
            Ok(())
        } else {
            Err(SignatureError::Mismatch)
        }
    }

    fn compute(&self, timestamp: i64, body: &[u8]) -> Result<Vec<u8>, SignatureError> {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.secret.expose_secret().as_bytes())
            .map_err(|_| SignatureError::Mismatch)?;
        mac.update(format!("{VERSION}:{timestamp}:").as_bytes());
        mac.update(body);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

/// Signs a body the way Slack does. Used by gateway tests.
#[cfg(test)]
pub fn sign(secret: &str, timestamp: i64, body: &str) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(format!("{VERSION}:{timestamp}:{body}").as_bytes());
    format!("{VERSION}={}", hex::encode(mac.finalize().into_bytes()))
}
