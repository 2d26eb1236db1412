//! Speech synthesis adapter
//!
//! Turns summary text into MP3 audio via the OpenAI speech API, stores
//! it next to the recording's other artifacts, and hands back the public
//! URL for the callback call to play.

use std::sync::Arc;

use async_trait::async_trait;

use crate::storage::ArtifactStore;
use crate::{Error, Result};

const DEFAULT_BASE_URL: &str = "https://api.openai.com";
const TTS_MODEL: &str = "tts-1";

/// Fixed natural-sounding voice for summary callbacks
const TTS_VOICE: &str = "nova";

/// Produces a stored, publicly retrievable speech rendition of text
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize `text`, store it under the recording's key, and return
    /// the public URL.
    ///
    /// # Errors
    ///
    /// Returns `Error::Synthesis` when synthesis or the upload fails. The
    /// orchestrator treats this as non-fatal.
    async fn generate_speech(&self, text: &str, recording_sid: &str) -> Result<String>;
}

/// Text-to-speech client
pub struct TextToSpeech {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl TextToSpeech {
    /// Create a new TTS client.
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing
    pub fn new(api_key: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config("OpenAI API key required for TTS".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Point the client at a different API host (local test servers)
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Synthesize text to MP3 audio bytes.
    ///
    /// # Errors
    ///
    /// Returns `Error::Synthesis` if the API call fails
    pub async fn synthesize(&self, text: &str) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct TtsRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
        }

        let request = TtsRequest {
            model: TTS_MODEL,
            input: text,
            voice: TTS_VOICE,
        };

        let response = self
            .client
            .post(format!("{}/v1/audio/speech", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Synthesis(format!("TTS request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Synthesis(format!("TTS error {status}: {body}")));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| Error::Synthesis(format!("TTS body read failed: {e}")))?;
        Ok(audio.to_vec())
    }
}

/// Synthesizer that persists its output through the artifact store
pub struct Synthesizer {
    tts: TextToSpeech,
    store: Arc<dyn ArtifactStore>,
}

impl Synthesizer {
    #[must_use]
    pub fn new(tts: TextToSpeech, store: Arc<dyn ArtifactStore>) -> Self {
        Self { tts, store }
    }
}

#[async_trait]
impl SpeechSynthesizer for Synthesizer {
    async fn generate_speech(&self, text: &str, recording_sid: &str) -> Result<String> {
        let audio = self.tts.synthesize(text).await?;
        tracing::debug!(
            recording_sid = %recording_sid,
            audio_bytes = audio.len(),
            "summary speech synthesized"
        );

        self.store
            .store_speech(recording_sid, &audio)
            .await
            .map_err(|e| Error::Synthesis(format!("speech upload failed: {e}")))
    }
}
