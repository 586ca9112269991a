//! Error types for the gatekeeper
//!
//! Limit breaches are never errors; they come back as [`crate::RiskDecision`]
//! values. Errors are reserved for configuration and input that is malformed
//! at the point it enters the system.

use thiserror::Error;

/// Errors raised at configuration or data-entry time
#[derive(Error, Debug)]
pub enum GatekeeperError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Invalid calendar entry: {0}")]
    InvalidCalendarEntry(String),

    #[error("Out-of-order P&L sample: {date} is older than newest sample {newest}")]
    OutOfOrderSample {
        date: chrono::NaiveDate,
        newest: chrono::NaiveDate,
    },

    #[error("Inconsistent position {symbol}: quantity {quantity} does not match side {side}")]
    InconsistentPosition {
        symbol: String,
        quantity: f64,
        side: String,
    },

    /// YAML parsing error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, GatekeeperError>;
