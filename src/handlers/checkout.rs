//! Checkout creation handler.

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{PaymentTarget, UpgradeKind};
use crate::AppState;

/// Request to open a checkout session for a booking or an upgrade fee.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub booking_id: Option<i64>,
    pub user_id: Option<i64>,
    pub upgrade_kind: Option<UpgradeKind>,
    /// Positive amount in whole currency units.
    pub amount: i64,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub payment_id: Uuid,
    pub order_code: i64,
    pub checkout_url: String,
}

pub async fn create_checkout(
    State(state): State<AppState>,
    Json(payload): Json<CheckoutRequest>,
) -> Result<(StatusCode, Json<CheckoutResponse>), AppError> {
    let target = match (payload.booking_id, payload.user_id) {
        (Some(booking_id), None) => PaymentTarget::Booking { booking_id },
        (None, Some(user_id)) => {
            let kind = payload.upgrade_kind.ok_or_else(|| {
                AppError::BadRequest(anyhow::anyhow!(
                    "upgradeKind is required for upgrade checkouts"
                ))
            })?;
            PaymentTarget::Upgrade { user_id, kind }
        }
        _ => {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "exactly one of bookingId or userId must be provided"
            )))
        }
    };

    tracing::info!(?target, amount = payload.amount, "creating checkout session");

    let session = state
        .gateway
        .create_checkout(target, payload.amount, &payload.description)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CheckoutResponse {
            payment_id: session.payment_id,
            order_code: session.order_code,
            checkout_url: session.checkout_url,
        }),
    ))
}
