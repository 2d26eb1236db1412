//! Recording-to-callback orchestration
//!
//! One pipeline run per completed-recording notification: download the
//! audio, store it and analyze it concurrently, persist the combined
//! result, then call the original caller back with a spoken summary.
//! The callback is best-effort; everything before it must fully commit
//! or fail as a whole.

use std::sync::Arc;

use crate::speech::SpeechSynthesizer;
use crate::storage::{ArtifactStore, RecordingMetadata};
use crate::telephony::Telephony;
use crate::transcribe::CallIntelligence;
use crate::Result;

/// A completed-recording notification, as handed over by the webhook
#[derive(Debug, Clone)]
pub struct RecordingNotice {
    /// Provider-issued recording identifier
    pub recording_sid: String,
    /// Identifier of the call the recording belongs to
    pub call_sid: String,
    /// Time-limited, provider-hosted URL of the audio
    pub source_url: String,
    /// Recording duration in seconds
    pub duration: u32,
}

/// Orchestrates one pipeline run per recording.
///
/// All collaborators are injected as trait handles; the pipeline owns no
/// global state, and concurrent runs share nothing but the durable
/// metadata store behind [`ArtifactStore`].
pub struct Pipeline {
    telephony: Arc<dyn Telephony>,
    intelligence: Arc<dyn CallIntelligence>,
    store: Arc<dyn ArtifactStore>,
    synthesizer: Arc<dyn SpeechSynthesizer>,
}

impl Pipeline {
    #[must_use]
    pub fn new(
        telephony: Arc<dyn Telephony>,
        intelligence: Arc<dyn CallIntelligence>,
        store: Arc<dyn ArtifactStore>,
        synthesizer: Arc<dyn SpeechSynthesizer>,
    ) -> Self {
        Self {
            telephony,
            intelligence,
            store,
            synthesizer,
        }
    }

    /// Process one completed recording end to end.
    ///
    /// Steps: download, then raw-audio storage and transcription+
    /// summarization concurrently, then the metadata update. A failure in
    /// any of those propagates to the webhook handler. The final callback
    /// step is logged and swallowed: by then every artifact is durably
    /// committed, and the provider must not be told to redeliver.
    ///
    /// # Errors
    ///
    /// Propagates `Error::Download`, `Error::Quota`,
    /// `Error::Transcription`, and `Error::Storage` from steps 1-3.
    pub async fn process_recording(&self, notice: &RecordingNotice) -> Result<()> {
        let sid = notice.recording_sid.as_str();

        // Redelivered notifications are a no-op once the record is
        // complete; a partial record (insert committed, update missing)
        // re-runs, which the store's upserts keep safe.
        match self.store.find_record(sid).await {
            Ok(Some(record)) if record.transcript_url.is_some() => {
                tracing::info!(recording_sid = %sid, "recording already processed, skipping");
                return Ok(());
            }
            Ok(Some(_)) => {
                tracing::warn!(recording_sid = %sid, "partial record found, re-running pipeline");
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(error = %e, recording_sid = %sid, "idempotency probe failed, proceeding");
            }
        }

        tracing::info!(
            recording_sid = %sid,
            call_sid = %notice.call_sid,
            duration = notice.duration,
            "processing recording"
        );

        let audio = self.telephony.download_recording(&notice.source_url).await?;

        let meta = RecordingMetadata {
            recording_sid: notice.recording_sid.clone(),
            call_sid: notice.call_sid.clone(),
            duration: notice.duration,
        };

        // Storage and analysis are independent; run them concurrently and
        // fail the whole run if either fails
        let (audio_url, notes) = tokio::try_join!(
            self.store.store_recording(&audio, &meta),
            self.intelligence.analyze(&audio),
        )?;

        let transcript_url = self
            .store
            .store_transcript_and_summary(sid, &notes.transcript, &notes.summary)
            .await?;

        tracing::info!(
            recording_sid = %sid,
            audio_url = %audio_url,
            transcript_url = %transcript_url,
            "artifacts committed"
        );

        // Artifacts are durable; a failed callback must not fail the run
        if let Err(e) = self.callback(notice, &notes.summary).await {
            tracing::warn!(
                error = %e,
                recording_sid = %sid,
                "summary callback failed; artifacts remain stored"
            );
        }

        Ok(())
    }

    /// Synthesize the summary and call the original caller back with it
    async fn callback(&self, notice: &RecordingNotice, summary: &str) -> Result<()> {
        let to = self.telephony.caller_number(&notice.call_sid).await?;
        let speech_url = self
            .synthesizer
            .generate_speech(summary, &notice.recording_sid)
            .await?;
        self.telephony.place_call(&to, &speech_url).await
    }
}
