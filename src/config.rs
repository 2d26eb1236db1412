//! Configuration loading for the recap gateway
//!
//! All credentials are supplied out of band through environment
//! variables; nothing secret lives on the command line.

use crate::{Error, Result};

/// Default storage bucket holding per-recording artifacts
const DEFAULT_BUCKET: &str = "call-recordings";

/// Default metadata table keyed by recording SID
const DEFAULT_TABLE: &str = "call_recordings";

/// Gateway configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Telephony provider credentials
    pub telephony: TelephonyConfig,

    /// API key for transcription, summarization, and speech synthesis
    pub openai_api_key: String,

    /// Object storage and metadata table settings
    pub storage: StorageConfig,
}

/// Telephony provider (Twilio) settings
#[derive(Debug, Clone)]
pub struct TelephonyConfig {
    /// Account SID, also the HTTP Basic username for recording downloads
    pub account_sid: String,

    /// Auth token, the HTTP Basic password
    pub auth_token: String,

    /// Outbound caller ID for the summary callback
    pub phone_number: String,
}

/// Object storage (Supabase) settings
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Project base URL, e.g. `https://xyz.supabase.co`
    pub url: String,

    /// Service role key used for uploads and metadata writes
    pub service_key: String,

    /// Bucket holding audio and transcript objects
    pub bucket: String,

    /// Metadata table name
    pub table: String,
}

impl Config {
    /// Load configuration from the environment.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if any required variable is missing or empty.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            telephony: TelephonyConfig {
                account_sid: required("TWILIO_ACCOUNT_SID")?,
                auth_token: required("TWILIO_AUTH_TOKEN")?,
                phone_number: required("TWILIO_PHONE_NUMBER")?,
            },
            openai_api_key: required("OPENAI_API_KEY")?,
            storage: StorageConfig {
                url: required("SUPABASE_URL")?,
                service_key: required("SUPABASE_SERVICE_KEY")?,
                bucket: optional_or("RECORDINGS_BUCKET", DEFAULT_BUCKET),
                table: optional_or("RECORDINGS_TABLE", DEFAULT_TABLE),
            },
        })
    }
}

/// Read a required environment variable, rejecting empty values
fn required(name: &str) -> Result<String> {
    match std::env::var(name) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(Error::Config(format!("{name} must be set"))),
    }
}

/// Read an optional environment variable with a default
fn optional_or(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}
