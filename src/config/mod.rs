use anyhow::{bail, Context, Result};
use dotenvy::dotenv;
use secrecy::Secret;
use serde::Deserialize;
use std::env;

#[derive(Deserialize, Clone, Debug)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub gateway: GatewayConfig,
    pub service_name: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Deserialize, Clone, Debug)]
pub struct DatabaseConfig {
    pub url: Secret<String>,
    pub db_name: String,
}

#[derive(Deserialize, Clone, Debug)]
pub struct GatewayConfig {
    pub api_base_url: String,
    pub client_id: String,
    pub api_key: Secret<String>,
    /// Shared secret for the request/webhook checksum. The service refuses to
    /// start without it; signing with an empty key is never acceptable.
    pub checksum_secret: Secret<String>,
    pub return_url: String,
    pub cancel_url: String,
    pub timeout_seconds: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let host = env::var("CHECKOUT_SERVICE_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let port = env::var("CHECKOUT_SERVICE_PORT")
            .unwrap_or_else(|_| "3007".to_string())
            .parse()
            .context("CHECKOUT_SERVICE_PORT must be a valid port number")?;

        let db_url = env::var("CHECKOUT_DATABASE_URL")
            .context("CHECKOUT_DATABASE_URL must be set")?;
        let db_name =
            env::var("CHECKOUT_DATABASE_NAME").unwrap_or_else(|_| "checkout_db".to_string());

        let api_base_url =
            env::var("GATEWAY_API_BASE_URL").context("GATEWAY_API_BASE_URL must be set")?;
        let client_id = require_non_empty("GATEWAY_CLIENT_ID")?;
        let api_key = require_non_empty("GATEWAY_API_KEY")?;
        let checksum_secret = require_non_empty("GATEWAY_CHECKSUM_SECRET")?;
        let return_url = env::var("GATEWAY_RETURN_URL").context("GATEWAY_RETURN_URL must be set")?;
        let cancel_url = env::var("GATEWAY_CANCEL_URL").context("GATEWAY_CANCEL_URL must be set")?;
        let timeout_seconds = env::var("GATEWAY_TIMEOUT_SECONDS")
            .unwrap_or_else(|_| "30".to_string())
            .parse()
            .context("GATEWAY_TIMEOUT_SECONDS must be a number of seconds")?;

        Ok(Self {
            server: ServerConfig { host, port },
            database: DatabaseConfig {
                url: Secret::new(db_url),
                db_name,
            },
            gateway: GatewayConfig {
                api_base_url,
                client_id,
                api_key: Secret::new(api_key),
                checksum_secret: Secret::new(checksum_secret),
                return_url,
                cancel_url,
                timeout_seconds,
            },
            service_name: "checkout-service".to_string(),
        })
    }
}

fn require_non_empty(name: &str) -> Result<String> {
    let value = env::var(name).unwrap_or_default();
    if value.trim().is_empty() {
        bail!("{} must be set to a non-empty value", name);
    }
    Ok(value)
}
