#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use secrecy::Secret;
use serde_json::{json, Map, Value};

use checkout_service::config::{Config, DatabaseConfig, GatewayConfig, ServerConfig};
use checkout_service::models::{Booking, Payment, PaymentEvent, UpgradeCredential};
use checkout_service::services::stores::{
    BookingStore, CredentialStore, NotificationDispatcher, PaymentStore,
};
use checkout_service::services::{GatewayClient, SignatureEngine, WebhookReconciler};
use checkout_service::{router, AppState};

pub const TEST_SECRET: &str = "test-checksum-secret";

/// In-memory payment rows, ordered by insertion like the real collection.
#[derive(Default)]
pub struct InMemoryPayments {
    rows: Mutex<Vec<Payment>>,
}

impl InMemoryPayments {
    pub fn all(&self) -> Vec<Payment> {
        self.rows.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentStore for InMemoryPayments {
    async fn insert(&self, payment: Payment) -> Result<()> {
        self.rows.lock().unwrap().push(payment);
        Ok(())
    }

    async fn latest_for_booking(&self, booking_id: i64) -> Result<Option<Payment>> {
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .iter()
            .filter(|p| p.booking_id == Some(booking_id))
            .max_by_key(|p| p.created_at)
            .cloned())
    }

    async fn latest_for_upgrade(&self, user_id: i64) -> Result<Option<Payment>> {
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .iter()
            .filter(|p| p.user_id == Some(user_id) && p.booking_id.is_none())
            .max_by_key(|p| p.created_at)
            .cloned())
    }

    async fn update(&self, payment: Payment) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        if let Some(row) = rows.iter_mut().find(|p| p.id == payment.id) {
            *row = payment;
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryBookings {
    rows: Mutex<HashMap<i64, Booking>>,
    update_calls: AtomicUsize,
}

impl InMemoryBookings {
    pub fn seed(&self, booking: Booking) {
        self.rows.lock().unwrap().insert(booking.id, booking);
    }

    pub fn get_sync(&self, booking_id: i64) -> Option<Booking> {
        self.rows.lock().unwrap().get(&booking_id).cloned()
    }

    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BookingStore for InMemoryBookings {
    async fn get(&self, booking_id: i64) -> Result<Option<Booking>> {
        Ok(self.rows.lock().unwrap().get(&booking_id).cloned())
    }

    async fn update(&self, booking: Booking) -> Result<()> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        self.rows.lock().unwrap().insert(booking.id, booking);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryCredentials {
    rows: Mutex<Vec<UpgradeCredential>>,
    update_calls: AtomicUsize,
}

impl InMemoryCredentials {
    pub fn seed(&self, credential: UpgradeCredential) {
        self.rows.lock().unwrap().push(credential);
    }

    pub fn all(&self) -> Vec<UpgradeCredential> {
        self.rows.lock().unwrap().clone()
    }

    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentials {
    async fn latest_pending_for_user(&self, user_id: i64) -> Result<Option<UpgradeCredential>> {
        use checkout_service::models::CredentialStatus;
        let rows = self.rows.lock().unwrap();
        Ok(rows
            .iter()
            .filter(|c| c.user_id == user_id && c.status == CredentialStatus::Pending)
            .max_by_key(|c| c.created_at)
            .cloned())
    }

    async fn update(&self, credential: UpgradeCredential) -> Result<()> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        let mut rows = self.rows.lock().unwrap();
        if let Some(row) = rows.iter_mut().find(|c| c.id == credential.id) {
            *row = credential;
        }
        Ok(())
    }
}

/// Records every dispatched event so tests can assert exactly-once delivery.
#[derive(Default)]
pub struct RecordingDispatcher {
    events: Mutex<Vec<PaymentEvent>>,
}

impl RecordingDispatcher {
    pub fn events(&self) -> Vec<PaymentEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    async fn notify(&self, event: PaymentEvent) -> Result<()> {
        self.events.lock().unwrap().push(event);
        Ok(())
    }
}

pub struct TestApp {
    pub address: String,
    pub client: reqwest::Client,
    pub signature: SignatureEngine,
    pub payments: Arc<InMemoryPayments>,
    pub bookings: Arc<InMemoryBookings>,
    pub credentials: Arc<InMemoryCredentials>,
    pub notifier: Arc<RecordingDispatcher>,
}

impl TestApp {
    /// Spawn the router on a random port against in-memory stores;
    /// `gateway_base_url` points at the (usually mocked) processor API.
    pub async fn spawn(gateway_base_url: &str) -> Self {
        let config = Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
            },
            database: DatabaseConfig {
                url: Secret::new("mongodb://localhost:27017".to_string()),
                db_name: "checkout_test".to_string(),
            },
            gateway: GatewayConfig {
                api_base_url: gateway_base_url.to_string(),
                client_id: "test-client".to_string(),
                api_key: Secret::new("test-api-key".to_string()),
                checksum_secret: Secret::new(TEST_SECRET.to_string()),
                return_url: "https://booking.example/payment/return".to_string(),
                cancel_url: "https://booking.example/payment/cancel".to_string(),
                timeout_seconds: 5,
            },
            service_name: "checkout-service-test".to_string(),
        };

        let payments = Arc::new(InMemoryPayments::default());
        let bookings = Arc::new(InMemoryBookings::default());
        let credentials = Arc::new(InMemoryCredentials::default());
        let notifier = Arc::new(RecordingDispatcher::default());

        let signature = SignatureEngine::new(config.gateway.checksum_secret.clone())
            .expect("test secret is non-empty");

        let gateway = GatewayClient::new(
            config.gateway.clone(),
            signature.clone(),
            payments.clone(),
        )
        .expect("failed to build gateway client");

        let reconciler = WebhookReconciler::new(
            signature.clone(),
            payments.clone(),
            bookings.clone(),
            credentials.clone(),
            notifier.clone(),
        );

        let state = AppState {
            config,
            gateway,
            reconciler,
        };

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind test listener");
        let port = listener.local_addr().unwrap().port();
        let address = format!("http://127.0.0.1:{}", port);

        let app = router(state);
        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        let client = reqwest::Client::new();
        for _ in 0..20 {
            if client
                .get(format!("{}/health", address))
                .send()
                .await
                .is_ok()
            {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(25)).await;
        }

        Self {
            address,
            client,
            signature,
            payments,
            bookings,
            credentials,
            notifier,
        }
    }

    /// Sign a webhook field set with the shared test secret and serialize it
    /// the way the processor would deliver it.
    pub fn signed_webhook_body(&self, fields: Map<String, Value>) -> String {
        let signature = self
            .signature
            .sign(&fields)
            .expect("webhook fields must be scalar");
        let mut body = fields;
        body.insert("signature".to_string(), json!(signature));
        Value::Object(body).to_string()
    }

    pub async fn post_webhook(&self, body: &str) -> reqwest::Response {
        self.client
            .post(format!("{}/webhooks/gateway", self.address))
            .body(body.to_string())
            .send()
            .await
            .expect("failed to deliver webhook")
    }
}

pub fn webhook_fields(order_code: i64, status: &str, transaction_id: &str) -> Map<String, Value> {
    json!({
        "orderCode": order_code,
        "status": status,
        "transactionId": transaction_id,
    })
    .as_object()
    .unwrap()
    .clone()
}
