//! Application configuration
//!
//! Environment-driven settings, loaded once at startup. The overpayment
//! tolerance and the pending-request TTL are deployment policy knobs, not
//! constants.

use rust_decimal::Decimal;
use std::str::FromStr;

/// Runtime configuration for the workflow and billing services.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Postgres connection string.
    pub database_url: String,
    /// HTTP listen port for the API server.
    pub port: u16,
    /// Base URL of the external mobile-money gateway.
    pub gateway_base_url: String,
    /// Provider label recorded on initiated requests (e.g. "mpesa").
    pub gateway_provider: String,
    /// Maximum amount by which a payment may exceed the outstanding
    /// balance before it is rejected as an overpayment.
    pub overpayment_tolerance: Decimal,
    /// Minutes after which a still-pending mobile payment request is
    /// eligible for the expiry sweep. 0 disables expiry.
    pub pending_request_ttl_minutes: i64,
}

impl AppConfig {
    /// Load configuration from the environment, with development defaults.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgresql://localhost:5432/visitflow".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            gateway_base_url: std::env::var("MOBILE_GATEWAY_URL")
                .unwrap_or_else(|_| "https://gateway.invalid".to_string()),
            gateway_provider: std::env::var("MOBILE_GATEWAY_PROVIDER")
                .unwrap_or_else(|_| "mpesa".to_string()),
            overpayment_tolerance: std::env::var("OVERPAYMENT_TOLERANCE")
                .ok()
                .and_then(|v| Decimal::from_str(&v).ok())
                .unwrap_or(Decimal::ZERO),
            pending_request_ttl_minutes: std::env::var("PENDING_REQUEST_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: "postgresql://localhost:5432/visitflow".to_string(),
            port: 3000,
            gateway_base_url: "https://gateway.invalid".to_string(),
            gateway_provider: "mpesa".to_string(),
            overpayment_tolerance: Decimal::ZERO,
            pending_request_ttl_minutes: 0,
        }
    }
}
