//! External payment processor client.
//!
//! Builds signed checkout requests, parses the processor's response and
//! persists the initial pending payment row.

use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::config::GatewayConfig;
use crate::models::{Payment, PaymentTarget};
use crate::services::order_code;
use crate::services::signature::{SignatureEngine, SignatureError};
use crate::services::stores::PaymentStore;

/// Hard limit the processor imposes on the description field.
pub const DESCRIPTION_LIMIT: usize = 25;

/// Payload code the processor uses for an accepted request.
const SUCCESS_CODE: &str = "00";

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("checkout amount must be positive, got {0}")]
    InvalidAmount(i64),

    #[error("failed to reach payment processor: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("payment processor returned HTTP {0}")]
    HttpStatus(StatusCode),

    #[error("payment processor declined the request: {code} {desc}")]
    Declined { code: String, desc: String },

    #[error("payment processor response missing {0}")]
    MalformedResponse(&'static str),

    #[error("failed to sign checkout request: {0}")]
    Signature(#[from] SignatureError),

    #[error("failed to persist payment record: {0}")]
    Store(#[source] anyhow::Error),
}

#[derive(Debug, Deserialize)]
struct ProcessorResponse {
    code: String,
    #[serde(default)]
    desc: String,
    data: Option<ProcessorData>,
}

#[derive(Debug, Deserialize)]
struct ProcessorData {
    #[serde(rename = "checkoutUrl")]
    checkout_url: Option<String>,
}

/// Result of a successful checkout creation.
#[derive(Debug, Clone)]
pub struct CheckoutSession {
    pub payment_id: Uuid,
    pub order_code: i64,
    pub checkout_url: String,
}

#[derive(Clone)]
pub struct GatewayClient {
    client: reqwest::Client,
    config: GatewayConfig,
    signature: SignatureEngine,
    payments: Arc<dyn PaymentStore>,
}

impl GatewayClient {
    pub fn new(
        config: GatewayConfig,
        signature: SignatureEngine,
        payments: Arc<dyn PaymentStore>,
    ) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            config,
            signature,
            payments,
        })
    }

    /// Create a checkout session for a booking or an upgrade fee.
    ///
    /// On success a pending payment row is persisted and the hosted checkout
    /// URL returned. Any failure leaves no local state behind; there is no
    /// automatic retry, the caller decides what to do with a failed attempt.
    pub async fn create_checkout(
        &self,
        target: PaymentTarget,
        amount: i64,
        description: &str,
    ) -> Result<CheckoutSession, GatewayError> {
        if amount <= 0 {
            return Err(GatewayError::InvalidAmount(amount));
        }

        let description = normalize_description(description, &target);
        let order_code = order_code::encode(&target);

        // The signed set is an explicit allow-list. The webhook delivery
        // address is configured on the processor dashboard and is never part
        // of the request body or the digest.
        let mut fields = Map::new();
        fields.insert("amount".to_string(), json!(amount));
        fields.insert("cancelUrl".to_string(), json!(self.config.cancel_url));
        fields.insert("description".to_string(), json!(description));
        fields.insert("orderCode".to_string(), json!(order_code));
        fields.insert("returnUrl".to_string(), json!(self.config.return_url));

        let signature = self.signature.sign(&fields)?;

        let mut body = fields;
        body.insert("signature".to_string(), json!(signature));

        let url = format!("{}/payment-requests", self.config.api_base_url);
        let response = self
            .client
            .post(&url)
            .header("x-client-id", self.config.client_id.as_str())
            .header("x-api-key", self.config.api_key.expose_secret().as_str())
            .json(&Value::Object(body))
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;

        tracing::debug!(status = %status, body = %text, "processor checkout response");

        if !status.is_success() {
            tracing::error!(status = %status, order_code, "checkout request failed");
            return Err(GatewayError::HttpStatus(status));
        }

        let parsed: ProcessorResponse = serde_json::from_str(&text)
            .map_err(|_| GatewayError::MalformedResponse("a parseable response body"))?;

        if parsed.code != SUCCESS_CODE {
            tracing::error!(
                code = %parsed.code,
                desc = %parsed.desc,
                order_code,
                "processor declined checkout request"
            );
            return Err(GatewayError::Declined {
                code: parsed.code,
                desc: parsed.desc,
            });
        }

        let checkout_url = parsed
            .data
            .ok_or(GatewayError::MalformedResponse("data"))?
            .checkout_url
            .ok_or(GatewayError::MalformedResponse("data.checkoutUrl"))?;

        let payment = match target {
            PaymentTarget::Booking { booking_id } => Payment::for_booking(booking_id, amount),
            PaymentTarget::Upgrade { user_id, kind } => {
                Payment::for_upgrade(user_id, kind, amount)
            }
        };
        let payment_id = payment.id;

        self.payments
            .insert(payment)
            .await
            .map_err(GatewayError::Store)?;

        tracing::info!(
            payment_id = %payment_id,
            order_code,
            amount,
            "checkout session created"
        );

        Ok(CheckoutSession {
            payment_id,
            order_code,
            checkout_url,
        })
    }
}

/// Default an empty description and enforce the processor's 25-character
/// limit; anything longer is cut to exactly the first 25 characters.
fn normalize_description(description: &str, target: &PaymentTarget) -> String {
    let description = description.trim();
    let description = if description.is_empty() {
        match target {
            PaymentTarget::Booking { booking_id } => format!("Booking #{}", booking_id),
            PaymentTarget::Upgrade { kind, .. } => format!("{} upgrade fee", kind),
        }
    } else {
        description.to_string()
    };

    description.chars().take(DESCRIPTION_LIMIT).collect()
}
