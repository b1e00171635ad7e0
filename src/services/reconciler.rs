//! Webhook reconciliation.
//!
//! The processor delivers callbacks at least once, possibly duplicated and out
//! of order. Reconciliation verifies the signature, decodes the order code,
//! targets the newest payment row for the decoded scope and applies a single
//! idempotent state transition with its side effects.
//!
//! A superseded checkout attempt whose webhook arrives late is absorbed by the
//! most-recent-row rule together with terminal-state monotonicity: it can only
//! ever touch the newest row, and never un-settle it.

use std::sync::Arc;

use dashmap::DashMap;
use mongodb::bson::DateTime;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::models::{
    BookingStatus, CredentialStatus, Payment, PaymentEvent, PaymentStatus,
};
use crate::services::order_code::{self, OrderScope};
use crate::services::signature::SignatureEngine;
use crate::services::stores::{
    BookingStore, CredentialStore, NotificationDispatcher, PaymentStore,
};

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("webhook signature missing or invalid")]
    InvalidSignature,

    #[error("malformed webhook payload: {0}")]
    MalformedPayload(&'static str),

    #[error("storage failure during reconciliation: {0}")]
    Store(#[source] anyhow::Error),
}

/// What a delivery amounted to. Benign no-ops are outcomes, not errors: the
/// processor must never see stale or unrelated traffic fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Health ping, unknown order code or otherwise unrelated traffic.
    Ignored,
    /// Duplicate or late delivery; stored state already covers it.
    Unchanged,
    /// A transition was applied.
    Applied(PaymentStatus),
}

#[derive(Clone)]
pub struct WebhookReconciler {
    signature: SignatureEngine,
    payments: Arc<dyn PaymentStore>,
    bookings: Arc<dyn BookingStore>,
    credentials: Arc<dyn CredentialStore>,
    notifier: Arc<dyn NotificationDispatcher>,
    // Serializes reconciliation per decoded scope so concurrent duplicate
    // deliveries cannot both observe the pending row.
    scope_locks: Arc<DashMap<OrderScope, Arc<Mutex<()>>>>,
}

impl WebhookReconciler {
    pub fn new(
        signature: SignatureEngine,
        payments: Arc<dyn PaymentStore>,
        bookings: Arc<dyn BookingStore>,
        credentials: Arc<dyn CredentialStore>,
        notifier: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        Self {
            signature,
            payments,
            bookings,
            credentials,
            notifier,
            scope_locks: Arc::new(DashMap::new()),
        }
    }

    /// Process one webhook delivery body.
    pub async fn process(&self, body: &str) -> Result<ReconcileOutcome, ReconcileError> {
        let body = body.trim();
        if body.is_empty() {
            // The processor probes the endpoint with empty pings.
            tracing::debug!("empty webhook body, acknowledging");
            return Ok(ReconcileOutcome::Ignored);
        }

        let payload: Value = serde_json::from_str(body)
            .map_err(|_| ReconcileError::MalformedPayload("not valid JSON"))?;
        let Value::Object(mut fields) = payload else {
            return Err(ReconcileError::MalformedPayload("not a JSON object"));
        };

        let provided = match fields.remove("signature") {
            Some(Value::String(s)) => s,
            _ => {
                tracing::warn!("webhook without signature field rejected");
                return Err(ReconcileError::InvalidSignature);
            }
        };

        let valid = self
            .signature
            .verify(&fields, &provided)
            .map_err(|_| ReconcileError::MalformedPayload("non-scalar field in signed set"))?;
        if !valid {
            tracing::warn!("webhook signature mismatch");
            return Err(ReconcileError::InvalidSignature);
        }

        let order_code = fields
            .get("orderCode")
            .and_then(Value::as_i64)
            .ok_or(ReconcileError::MalformedPayload("missing integer orderCode"))?;
        let external_status = fields
            .get("status")
            .and_then(Value::as_str)
            .ok_or(ReconcileError::MalformedPayload("missing status"))?;
        let transaction_id = fields
            .get("transactionId")
            .and_then(Value::as_str)
            .map(str::to_owned);

        let scope = order_code::decode(order_code);
        let new_status = map_external_status(external_status);

        let lock = self.scope_lock(scope);
        let _guard = lock.lock().await;

        let candidate = match scope {
            OrderScope::Booking(booking_id) => {
                self.payments.latest_for_booking(booking_id).await
            }
            OrderScope::Upgrade(user_id) => self.payments.latest_for_upgrade(user_id).await,
        }
        .map_err(ReconcileError::Store)?;

        let Some(mut payment) = candidate else {
            tracing::info!(order_code, "no payment matches webhook order code, ignoring");
            return Ok(ReconcileOutcome::Ignored);
        };

        if payment.status == new_status {
            tracing::debug!(
                payment_id = %payment.id,
                order_code,
                status = ?new_status,
                "duplicate webhook delivery, no changes"
            );
            return Ok(ReconcileOutcome::Unchanged);
        }
        if payment.status.is_terminal() {
            tracing::info!(
                payment_id = %payment.id,
                order_code,
                stored = ?payment.status,
                incoming = ?new_status,
                "payment already settled, ignoring late webhook"
            );
            return Ok(ReconcileOutcome::Unchanged);
        }

        let now = DateTime::now();
        payment.status = new_status;
        payment.transaction_id = transaction_id;
        payment.updated_at = now;
        if new_status == PaymentStatus::Success && payment.payment_date.is_none() {
            payment.payment_date = Some(now);
        }

        self.payments
            .update(payment.clone())
            .await
            .map_err(ReconcileError::Store)?;

        self.apply_side_effects(&payment, new_status).await?;

        // Notification is fire-and-forget; a failed dispatch never rolls back
        // the transition already committed above.
        let event = PaymentEvent {
            payment_id: payment.id,
            booking_id: payment.booking_id,
            user_id: payment.user_id,
            status: new_status,
        };
        if let Err(err) = self.notifier.notify(event).await {
            tracing::warn!(
                payment_id = %payment.id,
                error = %err,
                "notification dispatch failed"
            );
        }

        tracing::info!(
            payment_id = %payment.id,
            order_code,
            status = ?new_status,
            "payment reconciled"
        );

        Ok(ReconcileOutcome::Applied(new_status))
    }

    async fn apply_side_effects(
        &self,
        payment: &Payment,
        new_status: PaymentStatus,
    ) -> Result<(), ReconcileError> {
        if let Some(booking_id) = payment.booking_id {
            let Some(mut booking) = self
                .bookings
                .get(booking_id)
                .await
                .map_err(ReconcileError::Store)?
            else {
                tracing::warn!(booking_id, "payment references a missing booking");
                return Ok(());
            };

            let now = DateTime::now();
            match new_status {
                PaymentStatus::Success => {
                    booking.status = BookingStatus::Completed;
                    booking.completed_date = Some(now);
                }
                PaymentStatus::Cancelled => {
                    booking.status = BookingStatus::Cancelled;
                }
                PaymentStatus::Pending => return Ok(()),
            }
            booking.updated_at = now;

            self.bookings
                .update(booking)
                .await
                .map_err(ReconcileError::Store)?;
        } else if let Some(user_id) = payment.user_id {
            if new_status != PaymentStatus::Success || payment.upgrade_kind().is_none() {
                return Ok(());
            }

            let Some(mut credential) = self
                .credentials
                .latest_pending_for_user(user_id)
                .await
                .map_err(ReconcileError::Store)?
            else {
                // The request may have been withdrawn; approval is a separate
                // human-driven workflow either way.
                tracing::info!(user_id, "no pending upgrade credential for paid upgrade");
                return Ok(());
            };

            credential.status = CredentialStatus::PaidPending;
            credential.updated_at = DateTime::now();

            self.credentials
                .update(credential)
                .await
                .map_err(ReconcileError::Store)?;
        }

        Ok(())
    }

    fn scope_lock(&self, scope: OrderScope) -> Arc<Mutex<()>> {
        self.scope_locks
            .entry(scope)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

fn map_external_status(status: &str) -> PaymentStatus {
    match status {
        "PAID" => PaymentStatus::Success,
        "CANCELED" => PaymentStatus::Cancelled,
        _ => PaymentStatus::Pending,
    }
}
