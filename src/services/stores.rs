//! Collaborator interfaces consumed by the checkout and reconciliation flows.
//!
//! The wider platform owns bookings, upgrade credentials and notification
//! delivery; this service only touches them through these traits.

use anyhow::Result;
use async_trait::async_trait;
use mockall::automock;

use crate::models::{Booking, Payment, PaymentEvent, UpgradeCredential};

#[async_trait]
#[automock]
pub trait PaymentStore: Send + Sync {
    async fn insert(&self, payment: Payment) -> Result<()>;

    /// Most recently created payment for a booking. A retried checkout creates
    /// a fresh row per attempt; the newest attempt is authoritative.
    async fn latest_for_booking(&self, booking_id: i64) -> Result<Option<Payment>>;

    /// Most recently created upgrade payment for a user (rows with no booking).
    async fn latest_for_upgrade(&self, user_id: i64) -> Result<Option<Payment>>;

    async fn update(&self, payment: Payment) -> Result<()>;
}

#[async_trait]
#[automock]
pub trait BookingStore: Send + Sync {
    async fn get(&self, booking_id: i64) -> Result<Option<Booking>>;

    /// Writes only status, completed_date and updated_at.
    async fn update(&self, booking: Booking) -> Result<()>;
}

#[async_trait]
#[automock]
pub trait CredentialStore: Send + Sync {
    async fn latest_pending_for_user(&self, user_id: i64) -> Result<Option<UpgradeCredential>>;

    async fn update(&self, credential: UpgradeCredential) -> Result<()>;
}

#[async_trait]
#[automock]
pub trait NotificationDispatcher: Send + Sync {
    async fn notify(&self, event: PaymentEvent) -> Result<()>;
}

/// Dispatcher used until the platform notification channel is wired in; it
/// records the event in the log and nothing else.
pub struct LoggingDispatcher;

#[async_trait]
impl NotificationDispatcher for LoggingDispatcher {
    async fn notify(&self, event: PaymentEvent) -> Result<()> {
        tracing::info!(
            payment_id = %event.payment_id,
            booking_id = ?event.booking_id,
            user_id = ?event.user_id,
            status = ?event.status,
            "payment event"
        );
        Ok(())
    }
}
