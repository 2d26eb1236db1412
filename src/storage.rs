//! Artifact store adapter (Supabase object storage + PostgREST metadata)
//!
//! One bucket holds the per-recording artifacts; one table holds the
//! metadata record keyed by recording SID. The record is inserted when
//! the raw audio lands and updated once transcript and summary exist,
//! so no record ever exists without an `audio_url`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Fields known at raw-audio upload time
#[derive(Debug, Clone)]
pub struct RecordingMetadata {
    pub recording_sid: String,
    pub call_sid: String,
    pub duration: u32,
}

/// Durable record describing one recording's artifacts and derived text
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub recording_sid: String,
    pub call_sid: String,
    pub duration: u32,
    pub audio_url: String,
    pub transcript_url: Option<String>,
    pub audio_summary: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Persistence surface for recording artifacts
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Upload raw audio and insert the metadata record.
    ///
    /// Returns the public URL of the stored audio.
    ///
    /// # Errors
    ///
    /// Returns `Error::Storage` when the upload or record insert fails.
    async fn store_recording(&self, audio: &[u8], meta: &RecordingMetadata) -> Result<String>;

    /// Upload the transcript text and update the existing record with the
    /// transcript URL and summary.
    ///
    /// Returns the public URL of the stored transcript.
    ///
    /// # Errors
    ///
    /// Returns `Error::Storage` when the upload fails or the update does
    /// not match exactly one record.
    async fn store_transcript_and_summary(
        &self,
        recording_sid: &str,
        transcript: &str,
        summary: &str,
    ) -> Result<String>;

    /// Upload synthesized summary speech; returns its public URL.
    ///
    /// # Errors
    ///
    /// Returns `Error::Storage` when the upload fails.
    async fn store_speech(&self, recording_sid: &str, audio: &[u8]) -> Result<String>;

    /// Fetch the metadata record for a recording, if one exists.
    ///
    /// # Errors
    ///
    /// Returns `Error::Storage` when the lookup request fails.
    async fn find_record(&self, recording_sid: &str) -> Result<Option<MetadataRecord>>;
}

/// Object key for the raw audio
pub(crate) fn audio_key(recording_sid: &str) -> String {
    format!("{recording_sid}.mp3")
}

/// Object key for the transcript text
pub(crate) fn transcript_key(recording_sid: &str) -> String {
    format!("{recording_sid}_transcript.txt")
}

/// Object key for the synthesized summary speech
pub(crate) fn speech_key(recording_sid: &str) -> String {
    format!("{recording_sid}_summary_speech.mp3")
}

/// Supabase-backed artifact store
pub struct SupabaseStore {
    client: reqwest::Client,
    base_url: String,
    service_key: String,
    bucket: String,
    table: String,
}

impl SupabaseStore {
    /// Create a store for one project.
    ///
    /// # Errors
    ///
    /// Returns error if the URL or service key is missing
    pub fn new(base_url: String, service_key: String, bucket: String, table: String) -> Result<Self> {
        if base_url.is_empty() || service_key.is_empty() {
            return Err(Error::Config(
                "storage URL and service key required".to_string(),
            ));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key,
            bucket,
            table,
        })
    }

    /// Public retrieval URL for an object in the bucket
    fn public_url(&self, key: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url, self.bucket, key
        )
    }

    /// Upload one object; returns its public URL.
    ///
    /// `x-upsert` keeps webhook redelivery from failing on an object that
    /// already exists.
    async fn upload(&self, key: &str, content_type: &str, bytes: Vec<u8>) -> Result<String> {
        let url = format!("{}/storage/v1/object/{}/{}", self.base_url, self.bucket, key);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.service_key)
            .header("Content-Type", content_type)
            .header("x-upsert", "true")
            .body(bytes)
            .send()
            .await
            .map_err(|e| Error::Storage(format!("upload of {key} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, key = %key, "object upload failed");
            return Err(Error::Storage(format!(
                "upload of {key} failed ({status}): {body}"
            )));
        }

        tracing::debug!(key = %key, "object uploaded");
        Ok(self.public_url(key))
    }
}

#[async_trait]
impl ArtifactStore for SupabaseStore {
    async fn store_recording(&self, audio: &[u8], meta: &RecordingMetadata) -> Result<String> {
        let key = audio_key(&meta.recording_sid);
        let audio_url = self.upload(&key, "audio/mpeg", audio.to_vec()).await?;

        let record = MetadataRecord {
            recording_sid: meta.recording_sid.clone(),
            call_sid: meta.call_sid.clone(),
            duration: meta.duration,
            audio_url: audio_url.clone(),
            transcript_url: None,
            audio_summary: None,
            created_at: Utc::now(),
        };

        let url = format!("{}/rest/v1/{}", self.base_url, self.table);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.service_key)
            .header("apikey", &self.service_key)
            // Idempotent against the provider redelivering the same
            // completed-recording notification
            .header("Prefer", "resolution=merge-duplicates")
            .json(&record)
            .send()
            .await
            .map_err(|e| Error::Storage(format!("metadata insert failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Storage(format!(
                "metadata insert failed ({status}): {body}"
            )));
        }

        tracing::info!(recording_sid = %meta.recording_sid, audio_url = %audio_url, "recording stored");
        Ok(audio_url)
    }

    async fn store_transcript_and_summary(
        &self,
        recording_sid: &str,
        transcript: &str,
        summary: &str,
    ) -> Result<String> {
        let key = transcript_key(recording_sid);
        let transcript_url = self
            .upload(&key, "text/plain", transcript.as_bytes().to_vec())
            .await?;

        let url = format!(
            "{}/rest/v1/{}?recording_sid=eq.{}",
            self.base_url,
            self.table,
            urlencoding::encode(recording_sid)
        );

        let patch = serde_json::json!({
            "transcript_url": transcript_url,
            "audio_summary": summary,
        });

        let response = self
            .client
            .patch(&url)
            .bearer_auth(&self.service_key)
            .header("apikey", &self.service_key)
            .header("Prefer", "return=representation")
            .json(&patch)
            .send()
            .await
            .map_err(|e| Error::Storage(format!("metadata update failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Storage(format!(
                "metadata update failed ({status}): {body}"
            )));
        }

        let updated: Vec<MetadataRecord> = response
            .json()
            .await
            .map_err(|e| Error::Storage(format!("invalid metadata update response: {e}")))?;

        if updated.len() != 1 {
            return Err(Error::Storage(format!(
                "metadata update for {recording_sid} matched {} records, expected 1",
                updated.len()
            )));
        }

        tracing::info!(recording_sid = %recording_sid, transcript_url = %transcript_url, "transcript and summary stored");
        Ok(transcript_url)
    }

    async fn store_speech(&self, recording_sid: &str, audio: &[u8]) -> Result<String> {
        let key = speech_key(recording_sid);
        self.upload(&key, "audio/mpeg", audio.to_vec()).await
    }

    async fn find_record(&self, recording_sid: &str) -> Result<Option<MetadataRecord>> {
        let url = format!(
            "{}/rest/v1/{}?recording_sid=eq.{}&limit=1",
            self.base_url,
            self.table,
            urlencoding::encode(recording_sid)
        );

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.service_key)
            .header("apikey", &self.service_key)
            .send()
            .await
            .map_err(|e| Error::Storage(format!("metadata lookup failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Storage(format!(
                "metadata lookup failed ({status}): {body}"
            )));
        }

        let rows: Vec<MetadataRecord> = response
            .json()
            .await
            .map_err(|e| Error::Storage(format!("invalid metadata lookup response: {e}")))?;

        Ok(rows.into_iter().next())
    }
}
