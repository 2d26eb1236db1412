//! Telephony provider client (Twilio REST API)

use async_trait::async_trait;

use crate::{Error, Result};

/// Twilio API host
const DEFAULT_BASE_URL: &str = "https://api.twilio.com";

/// Recording cap for inbound calls, in seconds
pub const MAX_RECORDING_SECS: u32 = 300;

/// Spoken notice played before recording starts
pub const RECORDING_NOTICE: &str =
    "This call will be recorded, transcribed, and summarized. Please leave your message after the tone.";

/// Operations the gateway needs from the telephony provider
#[async_trait]
pub trait Telephony: Send + Sync {
    /// Fetch the raw recording audio at `source_url`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Download` when the provider responds with a
    /// non-success status.
    async fn download_recording(&self, source_url: &str) -> Result<Vec<u8>>;

    /// Look up the originating number of a call.
    ///
    /// # Errors
    ///
    /// Returns `Error::Telephony` when the call resource cannot be fetched.
    async fn caller_number(&self, call_sid: &str) -> Result<String>;

    /// Place an outbound call to `to` that plays the audio at `audio_url`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Telephony` when call placement fails.
    async fn place_call(&self, to: &str, audio_url: &str) -> Result<()>;
}

/// Call resource as returned by the provider's REST API
#[derive(serde::Deserialize)]
struct CallResource {
    from: String,
}

/// Twilio REST client
pub struct TwilioClient {
    client: reqwest::Client,
    account_sid: String,
    auth_token: String,
    from_number: String,
    base_url: String,
}

impl TwilioClient {
    /// Create a new client for one account.
    ///
    /// # Errors
    ///
    /// Returns error if credentials are missing
    pub fn new(account_sid: String, auth_token: String, from_number: String) -> Result<Self> {
        if account_sid.is_empty() || auth_token.is_empty() {
            return Err(Error::Config(
                "Twilio account SID and auth token required".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            account_sid,
            auth_token,
            from_number,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Point the client at a different API host (local test servers)
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl Telephony for TwilioClient {
    async fn download_recording(&self, source_url: &str) -> Result<Vec<u8>> {
        tracing::debug!(url = %source_url, "downloading recording audio");

        let response = self
            .client
            .get(source_url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .send()
            .await
            .map_err(|e| Error::Download {
                status: 0,
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let reason = status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string();
            tracing::error!(status = %status, "recording download failed");
            return Err(Error::Download {
                status: status.as_u16(),
                reason,
            });
        }

        let audio = response.bytes().await?;
        tracing::info!(audio_bytes = audio.len(), "recording downloaded");
        Ok(audio.to_vec())
    }

    async fn caller_number(&self, call_sid: &str) -> Result<String> {
        let url = format!(
            "{}/2010-04-01/Accounts/{}/Calls/{}.json",
            self.base_url, self.account_sid, call_sid
        );

        let response = self
            .client
            .get(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .send()
            .await
            .map_err(|e| Error::Telephony(format!("call lookup failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Telephony(format!(
                "call lookup error {status}: {body}"
            )));
        }

        let call: CallResource = response
            .json()
            .await
            .map_err(|e| Error::Telephony(format!("invalid call resource: {e}")))?;

        Ok(call.from)
    }

    async fn place_call(&self, to: &str, audio_url: &str) -> Result<()> {
        let url = format!(
            "{}/2010-04-01/Accounts/{}/Calls.json",
            self.base_url, self.account_sid
        );

        let twiml = play_twiml(audio_url);
        let params = [("To", to), ("From", &self.from_number), ("Twiml", &twiml)];

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&params)
            .send()
            .await
            .map_err(|e| Error::Telephony(format!("call placement failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Telephony(format!(
                "call placement error {status}: {body}"
            )));
        }

        tracing::info!(to = %to, "outbound summary call placed");
        Ok(())
    }
}

/// Render the call-control document that plays one audio URL
#[must_use]
pub fn play_twiml(audio_url: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><Response><Play>{}</Play></Response>"#,
        xml_escape(audio_url)
    )
}

/// Render the call-control document returned to an inbound call: a spoken
/// notice followed by a capped recording, with the completion callback
/// pointed at `action`.
#[must_use]
pub fn record_twiml(notice: &str, max_secs: u32, action: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><Response><Say>{}</Say><Record maxLength="{max_secs}" action="{action}" recordingStatusCallback="{action}"/></Response>"#,
        xml_escape(notice)
    )
}

/// Escape text for embedding in an XML document
fn xml_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
