//! MongoDB-backed implementations of the collaborator stores.

use anyhow::Result;
use async_trait::async_trait;
use mongodb::bson::{doc, to_bson, Bson};
use mongodb::options::{FindOneOptions, IndexOptions};
use mongodb::{Collection, Database, IndexModel};

use crate::models::{Booking, CredentialStatus, Payment, UpgradeCredential};
use crate::services::stores::{BookingStore, CredentialStore, PaymentStore};

#[derive(Clone)]
pub struct PaymentRepository {
    payments: Collection<Payment>,
}

impl PaymentRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            payments: db.collection("payments"),
        }
    }

    /// Indexes backing the scope lookups the reconciler performs.
    pub async fn init_indexes(&self) -> Result<()> {
        let booking_index = IndexModel::builder()
            .keys(doc! { "booking_id": 1, "created_at": -1 })
            .options(
                IndexOptions::builder()
                    .name("booking_scope_idx".to_string())
                    .build(),
            )
            .build();

        let upgrade_index = IndexModel::builder()
            .keys(doc! { "user_id": 1, "created_at": -1 })
            .options(
                IndexOptions::builder()
                    .name("upgrade_scope_idx".to_string())
                    .build(),
            )
            .build();

        self.payments
            .create_indexes([booking_index, upgrade_index], None)
            .await?;

        tracing::info!("payment indexes initialized");
        Ok(())
    }
}

#[async_trait]
impl PaymentStore for PaymentRepository {
    async fn insert(&self, payment: Payment) -> Result<()> {
        self.payments.insert_one(payment, None).await?;
        Ok(())
    }

    async fn latest_for_booking(&self, booking_id: i64) -> Result<Option<Payment>> {
        let options = FindOneOptions::builder()
            .sort(doc! { "created_at": -1 })
            .build();
        let payment = self
            .payments
            .find_one(doc! { "booking_id": booking_id }, options)
            .await?;
        Ok(payment)
    }

    async fn latest_for_upgrade(&self, user_id: i64) -> Result<Option<Payment>> {
        let options = FindOneOptions::builder()
            .sort(doc! { "created_at": -1 })
            .build();
        let payment = self
            .payments
            .find_one(
                doc! { "user_id": user_id, "booking_id": Bson::Null },
                options,
            )
            .await?;
        Ok(payment)
    }

    async fn update(&self, payment: Payment) -> Result<()> {
        let update = doc! {
            "$set": {
                "status": to_bson(&payment.status)?,
                "transaction_id": to_bson(&payment.transaction_id)?,
                "payment_date": to_bson(&payment.payment_date)?,
                "updated_at": payment.updated_at,
            }
        };
        self.payments
            .update_one(doc! { "_id": to_bson(&payment.id)? }, update, None)
            .await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct BookingRepository {
    bookings: Collection<Booking>,
}

impl BookingRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            bookings: db.collection("bookings"),
        }
    }
}

#[async_trait]
impl BookingStore for BookingRepository {
    async fn get(&self, booking_id: i64) -> Result<Option<Booking>> {
        let booking = self
            .bookings
            .find_one(doc! { "_id": booking_id }, None)
            .await?;
        Ok(booking)
    }

    async fn update(&self, booking: Booking) -> Result<()> {
        // Bookings are owned by the platform; only the fields this service is
        // responsible for are written.
        let update = doc! {
            "$set": {
                "status": to_bson(&booking.status)?,
                "completed_date": to_bson(&booking.completed_date)?,
                "updated_at": booking.updated_at,
            }
        };
        self.bookings
            .update_one(doc! { "_id": booking.id }, update, None)
            .await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct CredentialRepository {
    credentials: Collection<UpgradeCredential>,
}

impl CredentialRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            credentials: db.collection("upgrade_credentials"),
        }
    }
}

#[async_trait]
impl CredentialStore for CredentialRepository {
    async fn latest_pending_for_user(&self, user_id: i64) -> Result<Option<UpgradeCredential>> {
        let options = FindOneOptions::builder()
            .sort(doc! { "created_at": -1 })
            .build();
        let credential = self
            .credentials
            .find_one(
                doc! {
                    "user_id": user_id,
                    "status": to_bson(&CredentialStatus::Pending)?,
                },
                options,
            )
            .await?;
        Ok(credential)
    }

    async fn update(&self, credential: UpgradeCredential) -> Result<()> {
        let update = doc! {
            "$set": {
                "status": to_bson(&credential.status)?,
                "updated_at": credential.updated_at,
            }
        };
        self.credentials
            .update_one(doc! { "_id": to_bson(&credential.id)? }, update, None)
            .await?;
        Ok(())
    }
}
