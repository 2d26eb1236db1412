//! Transcription and summarization adapter
//!
//! Both stages talk to the OpenAI API with bounded retry and backoff.
//! Quota and billing failures are classified separately from transient
//! ones: they are never retried and surface immediately, since repeating
//! the call cannot succeed until the account owner intervenes.

use std::time::Duration;

use async_trait::async_trait;

use crate::retry::{self, RetryPolicy};
use crate::{Error, Result};

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

const TRANSCRIPTION_MODEL: &str = "whisper-1";
const SUMMARY_MODEL: &str = "gpt-4o-mini";
const SUMMARY_MAX_TOKENS: u32 = 500;

const SUMMARY_PROMPT: &str = "You summarize recorded phone calls. Write a short, \
structured summary of the call transcript: the main topic, key points, and any \
follow-up actions. Speak plainly; the summary will be read back to the caller.";

/// Placeholder returned when summarization exhausts its retries.
///
/// Summarization failure downgrades gracefully: the transcript is still
/// stored, so the pipeline must not fail over a missing summary.
pub const FALLBACK_SUMMARY: &str = "Summary unavailable. Please review the transcript.";

/// Audio uploads can be large; give them more room than the default
const TRANSCRIPTION_TIMEOUT: Duration = Duration::from_secs(120);

/// Transcript and summary produced from one recording
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallNotes {
    pub transcript: String,
    pub summary: String,
}

/// Abstraction over speech-to-text plus summarization.
///
/// Implementations convert raw call audio to a transcript and derive a
/// narrative summary from it. The trait seam lets the orchestrator run
/// against test doubles.
#[async_trait]
pub trait CallIntelligence: Send + Sync {
    /// Transcribe raw audio bytes to plain text.
    ///
    /// # Errors
    ///
    /// Returns `Error::Quota` on account-limit failures and
    /// `Error::Transcription` after transient retries are exhausted.
    async fn transcribe(&self, audio: &[u8]) -> Result<String>;

    /// Summarize a transcript.
    ///
    /// # Errors
    ///
    /// Returns `Error::Quota` on account-limit failures. Transient
    /// exhaustion yields [`FALLBACK_SUMMARY`] instead of an error.
    async fn summarize(&self, transcript: &str) -> Result<String>;

    /// Transcribe then summarize, strictly in sequence.
    ///
    /// # Errors
    ///
    /// Propagates either stage's failure; quota errors carry a note
    /// naming the stage that hit account limits.
    async fn analyze(&self, audio: &[u8]) -> Result<CallNotes>;

    /// Probe whether the API account still has quota.
    ///
    /// Fails open: returns `false` only on a detected quota error, `true`
    /// otherwise, including on unrelated failures.
    async fn check_quota(&self) -> bool;
}

/// Response from the transcription API
#[derive(serde::Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// Chat completion response, reduced to the one field we read
#[derive(serde::Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(serde::Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(serde::Deserialize)]
struct CompletionMessage {
    content: String,
}

/// Error envelope returned by the API on failure
#[derive(serde::Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(serde::Deserialize)]
struct ErrorBody {
    message: String,
    #[serde(rename = "type")]
    kind: Option<String>,
    code: Option<String>,
}

/// A failed API response, decomposed for classification
#[derive(Debug)]
pub struct ApiFailure {
    pub status: u16,
    pub code: Option<String>,
    pub kind: Option<String>,
    pub message: String,
}

impl ApiFailure {
    /// Decompose a non-success response body.
    ///
    /// The body is expected to be the provider's JSON error envelope, but
    /// raw text is preserved as the message when it is not.
    #[must_use]
    pub fn from_response(status: u16, body: &str) -> Self {
        serde_json::from_str::<ErrorEnvelope>(body).map_or_else(
            |_| Self {
                status,
                code: None,
                kind: None,
                message: body.to_string(),
            },
            |envelope| Self {
                status,
                code: envelope.error.code,
                kind: envelope.error.kind,
                message: envelope.error.message,
            },
        )
    }

    /// Whether this failure indicates exhausted quota, billing problems,
    /// or rate limiting. These are not retryable.
    #[must_use]
    pub fn is_quota(&self) -> bool {
        if self.status == 429 {
            return true;
        }

        if self.code.as_deref() == Some("insufficient_quota") {
            return true;
        }

        if matches!(
            self.kind.as_deref(),
            Some("insufficient_quota" | "billing_not_active")
        ) {
            return true;
        }

        let lower = self.message.to_lowercase();
        lower.contains("quota") || lower.contains("billing") || lower.contains("rate limit")
    }

    /// Map this failure into the error taxonomy, using `transient` for
    /// anything not classified as a quota failure.
    fn into_error(self, transient: impl FnOnce(String) -> Error) -> Error {
        let detail = format!("{} (status {})", self.message, self.status);
        if self.is_quota() {
            Error::Quota(detail)
        } else {
            transient(detail)
        }
    }
}

/// OpenAI-backed transcription and summarization
pub struct OpenAiIntelligence {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    transcribe_policy: RetryPolicy,
    summary_policy: RetryPolicy,
}

impl OpenAiIntelligence {
    /// Create a new adapter.
    ///
    /// # Errors
    ///
    /// Returns error if the API key is missing
    pub fn new(api_key: String) -> Result<Self> {
        if api_key.is_empty() {
            return Err(Error::Config(
                "OpenAI API key required for transcription".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(TRANSCRIPTION_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            transcribe_policy: RetryPolicy::new(
                5,
                Duration::from_secs(1),
                Duration::from_secs(30),
            ),
            summary_policy: RetryPolicy::new(3, Duration::from_secs(1), Duration::from_secs(10)),
        })
    }

    /// Point the adapter at a different API host (local test servers)
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Override the retry policies (tests use millisecond delays)
    #[must_use]
    pub fn with_retry_policies(mut self, transcribe: RetryPolicy, summary: RetryPolicy) -> Self {
        self.transcribe_policy = transcribe;
        self.summary_policy = summary;
        self
    }

    /// One transcription attempt: multipart audio upload
    async fn transcribe_once(&self, audio: &[u8]) -> Result<String> {
        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(audio.to_vec())
                    .file_name("audio.mp3")
                    .mime_str("audio/mpeg")
                    .map_err(|e| Error::Transcription(e.to_string()))?,
            )
            .text("model", TRANSCRIPTION_MODEL);

        let response = self
            .client
            .post(format!("{}/v1/audio/transcriptions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(
                ApiFailure::from_response(status.as_u16(), &body).into_error(Error::Transcription)
            );
        }

        let result: TranscriptionResponse = response.json().await?;
        Ok(result.text)
    }

    /// One completion attempt against the chat API
    async fn complete_once(&self, system: &str, user: &str, max_tokens: u32) -> Result<String> {
        let request = serde_json::json!({
            "model": SUMMARY_MODEL,
            "max_tokens": max_tokens,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
        });

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(
                ApiFailure::from_response(status.as_u16(), &body).into_error(Error::Transcription)
            );
        }

        let result: CompletionResponse = response.json().await?;
        result
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| Error::Transcription("completion returned no choices".to_string()))
    }
}

#[async_trait]
impl CallIntelligence for OpenAiIntelligence {
    async fn transcribe(&self, audio: &[u8]) -> Result<String> {
        tracing::debug!(audio_bytes = audio.len(), "starting transcription");

        let result = retry::run(&self.transcribe_policy, Error::is_quota, || {
            self.transcribe_once(audio)
        })
        .await
        .map_err(|e| {
            if e.is_quota() {
                e
            } else {
                Error::Transcription(format!(
                    "failed after {} attempts: {e}",
                    self.transcribe_policy.max_attempts
                ))
            }
        })?;

        tracing::info!(transcript_chars = result.len(), "transcription complete");
        Ok(result)
    }

    async fn summarize(&self, transcript: &str) -> Result<String> {
        let outcome = retry::run(&self.summary_policy, Error::is_quota, || {
            self.complete_once(SUMMARY_PROMPT, transcript, SUMMARY_MAX_TOKENS)
        })
        .await;

        match outcome {
            Ok(summary) => {
                tracing::info!(summary_chars = summary.len(), "summary generated");
                Ok(summary)
            }
            Err(e) if e.is_quota() => Err(e),
            Err(e) => {
                tracing::warn!(error = %e, "summarization exhausted retries, using fallback");
                Ok(FALLBACK_SUMMARY.to_string())
            }
        }
    }

    async fn analyze(&self, audio: &[u8]) -> Result<CallNotes> {
        let transcript = self.transcribe(audio).await.map_err(|e| match e {
            Error::Quota(msg) => Error::Quota(format!("transcription stage: {msg}")),
            other => other,
        })?;

        let summary = self.summarize(&transcript).await.map_err(|e| match e {
            Error::Quota(msg) => Error::Quota(format!("summarization stage: {msg}")),
            other => other,
        })?;

        Ok(CallNotes {
            transcript,
            summary,
        })
    }

    async fn check_quota(&self) -> bool {
        // Minimal one-token completion; cost is negligible next to a
        // transcription upload
        match self.complete_once("Reply with OK.", "ping", 1).await {
            Ok(_) => true,
            Err(e) if e.is_quota() => {
                tracing::warn!(error = %e, "quota probe detected exhausted quota");
                false
            }
            // Fail open on anything else; the probe is advisory
            Err(e) => {
                tracing::debug!(error = %e, "quota probe failed for unrelated reason");
                true
            }
        }
    }
}
