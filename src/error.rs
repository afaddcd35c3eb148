//! Error taxonomy.
//!
//! Discovery errors (`NoVideoFound`, `Timeout`, `CrossOriginAccessDenied`)
//! never reach the user: they are logged and recovered from locally. Only
//! configuration input errors are surfaced through the notifier.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("no video element found")]
    NoVideoFound,

    #[error("timed out waiting for a video element")]
    Timeout,

    #[error("frame content from {origin} is not accessible")]
    CrossOriginAccessDenied { origin: String },

    #[error("{name} must be between {min} and {max} (got {value})")]
    InvalidSettingValue {
        name: &'static str,
        value: String,
        min: f64,
        max: f64,
    },

    #[error("unknown setting: {0}")]
    UnknownSetting(String),

    #[error("invalid selector `{0}`")]
    InvalidSelector(String),

    #[error("unknown element `{0}`")]
    UnknownElement(String),

    #[error("database: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("scenario: {0}")]
    Scenario(#[from] serde_json::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
