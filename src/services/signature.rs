//! Request and webhook signing.
//!
//! Outbound checkout requests and inbound webhooks share one canonicalization,
//! so a faithfully-echoed field set always reproduces the same digest:
//! sort keys bytewise, render each scalar, join as `k1=v1&k2=v2&...`, then
//! HMAC-SHA256 the UTF-8 bytes and hex-encode the result in lowercase.

use std::collections::BTreeMap;

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, Secret};
use serde_json::{Map, Value};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("signing secret must not be empty")]
    EmptySecret,

    #[error("field `{0}` is not a scalar value")]
    NonScalarField(String),

    #[error("invalid HMAC key")]
    InvalidKey,
}

#[derive(Clone)]
pub struct SignatureEngine {
    secret: Secret<String>,
}

impl SignatureEngine {
    /// Build an engine around the shared secret. An empty key is a
    /// configuration error and is refused outright.
    pub fn new(secret: Secret<String>) -> Result<Self, SignatureError> {
        if secret.expose_secret().is_empty() {
            return Err(SignatureError::EmptySecret);
        }
        Ok(Self { secret })
    }

    /// Compute the digest over a field set.
    pub fn sign(&self, fields: &Map<String, Value>) -> Result<String, SignatureError> {
        let canonical = canonicalize(fields)?;

        let mut mac = HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .map_err(|_| SignatureError::InvalidKey)?;
        mac.update(canonical.as_bytes());

        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// Recompute the digest and compare it to the provided one in constant
    /// time. `fields` must already exclude the `signature` field itself.
    pub fn verify(
        &self,
        fields: &Map<String, Value>,
        provided: &str,
    ) -> Result<bool, SignatureError> {
        let expected = self.sign(fields)?;

        let expected_bytes = expected.as_bytes();
        let provided_bytes = provided.as_bytes();
        if expected_bytes.len() != provided_bytes.len() {
            return Ok(false);
        }

        Ok(expected_bytes.ct_eq(provided_bytes).into())
    }
}

fn canonicalize(fields: &Map<String, Value>) -> Result<String, SignatureError> {
    // BTreeMap gives the bytewise key order the digest is defined over.
    let mut sorted = BTreeMap::new();
    for (key, value) in fields {
        sorted.insert(key.as_str(), render_scalar(key, value)?);
    }

    let pairs: Vec<String> = sorted
        .into_iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect();

    Ok(pairs.join("&"))
}

fn render_scalar(key: &str, value: &Value) -> Result<String, SignatureError> {
    match value {
        Value::Null => Ok(String::new()),
        Value::Number(n) => Ok(n.to_string()),
        Value::String(s) => Ok(s.clone()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Array(_) | Value::Object(_) => {
            Err(SignatureError::NonScalarField(key.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn engine() -> SignatureEngine {
        SignatureEngine::new(Secret::new("test-checksum-secret".to_string())).unwrap()
    }

    fn fields(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn empty_secret_is_refused() {
        assert!(matches!(
            SignatureEngine::new(Secret::new(String::new())),
            Err(SignatureError::EmptySecret)
        ));
    }

    #[test]
    fn digest_is_lowercase_hex() {
        let digest = engine()
            .sign(&fields(json!({"amount": 500000, "orderCode": 42000123})))
            .unwrap();
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn digest_ignores_field_insertion_order() {
        let engine = engine();
        let mut forward = Map::new();
        forward.insert("amount".to_string(), json!(500000));
        forward.insert("description".to_string(), json!("Booking #42"));
        forward.insert("orderCode".to_string(), json!(42000123));

        let mut reverse = Map::new();
        reverse.insert("orderCode".to_string(), json!(42000123));
        reverse.insert("description".to_string(), json!("Booking #42"));
        reverse.insert("amount".to_string(), json!(500000));

        assert_eq!(engine.sign(&forward).unwrap(), engine.sign(&reverse).unwrap());
    }

    #[test]
    fn null_renders_as_empty_string() {
        let engine = engine();
        let with_null = engine.sign(&fields(json!({"a": null, "b": 1}))).unwrap();
        let with_empty = engine.sign(&fields(json!({"a": "", "b": 1}))).unwrap();
        assert_eq!(with_null, with_empty);
    }

    #[test]
    fn verify_accepts_own_signature() {
        let engine = engine();
        let payload = fields(json!({"orderCode": 42000123, "status": "PAID"}));
        let digest = engine.sign(&payload).unwrap();
        assert!(engine.verify(&payload, &digest).unwrap());
    }

    #[test]
    fn verify_rejects_single_character_changes() {
        let engine = engine();
        let payload = fields(json!({"orderCode": 42000123, "status": "PAID"}));
        let digest = engine.sign(&payload).unwrap();

        let flipped = if digest.starts_with('a') {
            format!("b{}", &digest[1..])
        } else {
            format!("a{}", &digest[1..])
        };
        assert!(!engine.verify(&payload, &flipped).unwrap());

        let tampered = fields(json!({"orderCode": 42000124, "status": "PAID"}));
        assert!(!engine.verify(&tampered, &digest).unwrap());
    }

    #[test]
    fn verify_rejects_truncated_signature() {
        let engine = engine();
        let payload = fields(json!({"orderCode": 42000123}));
        let digest = engine.sign(&payload).unwrap();
        assert!(!engine.verify(&payload, &digest[..63]).unwrap());
    }

    #[test]
    fn nested_values_are_rejected() {
        let payload = fields(json!({"orderCode": 1, "data": {"nested": true}}));
        assert!(matches!(
            engine().sign(&payload),
            Err(SignatureError::NonScalarField(field)) if field == "data"
        ));
    }
}
