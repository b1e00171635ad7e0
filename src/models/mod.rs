//! Domain entities shared by the checkout and reconciliation flows.

use mongodb::bson::DateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Payment method recorded on every row this service creates.
pub const GATEWAY_METHOD: &str = "external-gateway";

/// Role a user can pay to be upgraded to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpgradeKind {
    Agency,
    Host,
}

impl std::fmt::Display for UpgradeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpgradeKind::Agency => write!(f, "Agency"),
            UpgradeKind::Host => write!(f, "Host"),
        }
    }
}

/// What a payment is for. Resolved once at the API boundary; downstream code
/// matches on the variants instead of re-inspecting raw type strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum PaymentType {
    Booking,
    Upgrade(UpgradeKind),
}

impl From<PaymentType> for String {
    fn from(value: PaymentType) -> Self {
        match value {
            PaymentType::Booking => "BOOKING",
            PaymentType::Upgrade(UpgradeKind::Agency) => "UPGRADE_AGENCY",
            PaymentType::Upgrade(UpgradeKind::Host) => "UPGRADE_HOST",
        }
        .to_string()
    }
}

impl TryFrom<String> for PaymentType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "BOOKING" => Ok(PaymentType::Booking),
            "UPGRADE_AGENCY" => Ok(PaymentType::Upgrade(UpgradeKind::Agency)),
            "UPGRADE_HOST" => Ok(PaymentType::Upgrade(UpgradeKind::Host)),
            other => Err(format!("unknown payment type `{}`", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Success,
    Cancelled,
}

impl PaymentStatus {
    /// Success and cancelled are terminal; no webhook moves a payment out of them.
    pub fn is_terminal(self) -> bool {
        matches!(self, PaymentStatus::Success | PaymentStatus::Cancelled)
    }
}

/// Target a checkout session is raised against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentTarget {
    Booking { booking_id: i64 },
    Upgrade { user_id: i64, kind: UpgradeKind },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub booking_id: Option<i64>,
    pub user_id: Option<i64>,
    pub amount: i64,
    pub method: String,
    pub payment_type: PaymentType,
    pub status: PaymentStatus,
    pub transaction_id: Option<String>,
    pub payment_date: Option<DateTime>,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl Payment {
    // Invariant: exactly one of booking_id / (user_id + upgrade type) is
    // populated, which is why rows are only built through these constructors.

    pub fn for_booking(booking_id: i64, amount: i64) -> Self {
        let now = DateTime::now();
        Self {
            id: Uuid::new_v4(),
            booking_id: Some(booking_id),
            user_id: None,
            amount,
            method: GATEWAY_METHOD.to_string(),
            payment_type: PaymentType::Booking,
            status: PaymentStatus::Pending,
            transaction_id: None,
            payment_date: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn for_upgrade(user_id: i64, kind: UpgradeKind, amount: i64) -> Self {
        let now = DateTime::now();
        Self {
            id: Uuid::new_v4(),
            booking_id: None,
            user_id: Some(user_id),
            amount,
            method: GATEWAY_METHOD.to_string(),
            payment_type: PaymentType::Upgrade(kind),
            status: PaymentStatus::Pending,
            transaction_id: None,
            payment_date: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn upgrade_kind(&self) -> Option<UpgradeKind> {
        match self.payment_type {
            PaymentType::Upgrade(kind) => Some(kind),
            PaymentType::Booking => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

/// Booking collaborator entity; only the fields this service reads or writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    #[serde(rename = "_id")]
    pub id: i64,
    pub status: BookingStatus,
    pub completed_date: Option<DateTime>,
    pub updated_at: DateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CredentialStatus {
    Pending,
    PaidPending,
    Approved,
    Rejected,
}

/// A user's pending request for an elevated role. This service only performs
/// the Pending -> PaidPending transition; approval is a separate manual flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpgradeCredential {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub user_id: i64,
    pub kind: UpgradeKind,
    pub status: CredentialStatus,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

/// Reconciliation event handed to the notification collaborator.
#[derive(Debug, Clone)]
pub struct PaymentEvent {
    pub payment_id: Uuid,
    pub booking_id: Option<i64>,
    pub user_id: Option<i64>,
    pub status: PaymentStatus,
}
