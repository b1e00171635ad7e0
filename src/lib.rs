pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
pub mod services;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use mongodb::{options::ClientOptions, Client};
use secrecy::ExposeSecret;
use tower_http::trace::TraceLayer;

use config::Config;
use services::repository::{BookingRepository, CredentialRepository, PaymentRepository};
use services::stores::{
    BookingStore, CredentialStore, LoggingDispatcher, NotificationDispatcher, PaymentStore,
};
use services::{GatewayClient, SignatureEngine, WebhookReconciler};

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub gateway: GatewayClient,
    pub reconciler: WebhookReconciler,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/checkout", post(handlers::checkout::create_checkout))
        .route("/webhooks/gateway", post(handlers::webhook::receive))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                )
            }),
        )
        .with_state(state)
}

pub struct Application {
    host: String,
    port: u16,
    router: Router,
}

impl Application {
    pub async fn build(config: Config) -> anyhow::Result<Self> {
        let mut client_options = ClientOptions::parse(config.database.url.expose_secret()).await?;
        client_options.app_name = Some(config.service_name.clone());

        let client = Client::with_options(client_options)?;
        let db = client.database(&config.database.db_name);

        let payment_repository = PaymentRepository::new(&db);
        payment_repository.init_indexes().await?;

        let payments: Arc<dyn PaymentStore> = Arc::new(payment_repository);
        let bookings: Arc<dyn BookingStore> = Arc::new(BookingRepository::new(&db));
        let credentials: Arc<dyn CredentialStore> = Arc::new(CredentialRepository::new(&db));
        let notifier: Arc<dyn NotificationDispatcher> = Arc::new(LoggingDispatcher);

        // Refuses to initialize when the checksum secret is empty.
        let signature = SignatureEngine::new(config.gateway.checksum_secret.clone())?;

        let gateway = GatewayClient::new(config.gateway.clone(), signature.clone(), payments.clone())?;
        let reconciler = WebhookReconciler::new(signature, payments, bookings, credentials, notifier);

        let state = AppState {
            config: config.clone(),
            gateway,
            reconciler,
        };

        Ok(Self {
            host: config.server.host.clone(),
            port: config.server.port,
            router: router(state),
        })
    }

    pub async fn run_until_stopped(self) -> anyhow::Result<()> {
        let addr = format!("{}:{}", self.host, self.port);
        tracing::info!("Listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr).await?;
        axum::serve(listener, self.router).await?;

        Ok(())
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}
