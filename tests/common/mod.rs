//! Shared test doubles for the pipeline's adapter seams

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use recap_gateway::speech::SpeechSynthesizer;
use recap_gateway::storage::{ArtifactStore, MetadataRecord, RecordingMetadata};
use recap_gateway::telephony::Telephony;
use recap_gateway::transcribe::{CallIntelligence, CallNotes};
use recap_gateway::{Error, Result};

pub const CALLER: &str = "+15550001111";

/// Telephony double: serves a canned audio payload and records placed calls
pub struct MockTelephony {
    pub audio: Vec<u8>,
    pub download_failure: Option<u16>,
    pub fail_place_call: bool,
    pub placed_calls: Mutex<Vec<(String, String)>>,
}

impl MockTelephony {
    pub fn serving(audio: Vec<u8>) -> Self {
        Self {
            audio,
            download_failure: None,
            fail_place_call: false,
            placed_calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Telephony for MockTelephony {
    async fn download_recording(&self, _source_url: &str) -> Result<Vec<u8>> {
        if let Some(status) = self.download_failure {
            return Err(Error::Download {
                status,
                reason: "Not Found".to_string(),
            });
        }
        Ok(self.audio.clone())
    }

    async fn caller_number(&self, _call_sid: &str) -> Result<String> {
        Ok(CALLER.to_string())
    }

    async fn place_call(&self, to: &str, audio_url: &str) -> Result<()> {
        if self.fail_place_call {
            return Err(Error::Telephony("carrier rejected call".to_string()));
        }
        self.placed_calls
            .lock()
            .unwrap()
            .push((to.to_string(), audio_url.to_string()));
        Ok(())
    }
}

/// Intelligence double with fixed transcript and summary
pub struct MockIntelligence {
    pub transcript: String,
    pub summary: String,
}

#[async_trait]
impl CallIntelligence for MockIntelligence {
    async fn transcribe(&self, _audio: &[u8]) -> Result<String> {
        Ok(self.transcript.clone())
    }

    async fn summarize(&self, _transcript: &str) -> Result<String> {
        Ok(self.summary.clone())
    }

    async fn analyze(&self, _audio: &[u8]) -> Result<CallNotes> {
        Ok(CallNotes {
            transcript: self.transcript.clone(),
            summary: self.summary.clone(),
        })
    }

    async fn check_quota(&self) -> bool {
        true
    }
}

/// In-memory artifact store keyed by recording SID
#[derive(Default)]
pub struct MockStore {
    pub records: Mutex<HashMap<String, MetadataRecord>>,
    pub speech_uploads: Mutex<Vec<String>>,
    pub fail_update: bool,
}

impl MockStore {
    pub fn record(&self, recording_sid: &str) -> Option<MetadataRecord> {
        self.records.lock().unwrap().get(recording_sid).cloned()
    }
}

#[async_trait]
impl ArtifactStore for MockStore {
    async fn store_recording(&self, _audio: &[u8], meta: &RecordingMetadata) -> Result<String> {
        let audio_url = format!("https://store.test/{}.mp3", meta.recording_sid);
        let record = MetadataRecord {
            recording_sid: meta.recording_sid.clone(),
            call_sid: meta.call_sid.clone(),
            duration: meta.duration,
            audio_url: audio_url.clone(),
            transcript_url: None,
            audio_summary: None,
            created_at: Utc::now(),
        };
        self.records
            .lock()
            .unwrap()
            .insert(meta.recording_sid.clone(), record);
        Ok(audio_url)
    }

    async fn store_transcript_and_summary(
        &self,
        recording_sid: &str,
        _transcript: &str,
        summary: &str,
    ) -> Result<String> {
        if self.fail_update {
            return Err(Error::Storage("metadata update failed".to_string()));
        }

        let transcript_url = format!("https://store.test/{recording_sid}_transcript.txt");
        let mut records = self.records.lock().unwrap();
        let record = records
            .get_mut(recording_sid)
            .ok_or_else(|| Error::Storage(format!("no record for {recording_sid}")))?;

        record.transcript_url = Some(transcript_url.clone());
        record.audio_summary = Some(summary.to_string());
        Ok(transcript_url)
    }

    async fn store_speech(&self, recording_sid: &str, _audio: &[u8]) -> Result<String> {
        self.speech_uploads
            .lock()
            .unwrap()
            .push(recording_sid.to_string());
        Ok(format!(
            "https://store.test/{recording_sid}_summary_speech.mp3"
        ))
    }

    async fn find_record(&self, recording_sid: &str) -> Result<Option<MetadataRecord>> {
        Ok(self.record(recording_sid))
    }
}

/// Synthesizer double returning a deterministic URL
pub struct MockSynthesizer {
    pub fail: bool,
}

#[async_trait]
impl SpeechSynthesizer for MockSynthesizer {
    async fn generate_speech(&self, _text: &str, recording_sid: &str) -> Result<String> {
        if self.fail {
            return Err(Error::Synthesis("voice model unavailable".to_string()));
        }
        Ok(format!(
            "https://store.test/{recording_sid}_summary_speech.mp3"
        ))
    }
}
