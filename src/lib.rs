//! Recap Gateway - call recording transcription and voice callback
//!
//! Receives completed-recording webhooks from the telephony provider,
//! then runs one pipeline per recording:
//!
//! ```text
//! webhook ──▶ download audio ──▶ ┌ store raw audio   ┐
//!                                │                   ├──▶ store transcript
//!                                └ transcribe+summarize    + summary
//!                                                          │
//!                            synthesized summary callback ◀┘
//! ```
//!
//! Raw-audio storage and transcription run concurrently; the metadata
//! record is updated only once both succeed. The callback call is
//! best-effort and never fails a run whose artifacts are already stored.

pub mod api;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod retry;
pub mod speech;
pub mod storage;
pub mod telephony;
pub mod transcribe;

pub use config::Config;
pub use error::{Error, Result};
pub use pipeline::{Pipeline, RecordingNotice};
pub use retry::RetryPolicy;
pub use speech::{SpeechSynthesizer, Synthesizer, TextToSpeech};
pub use storage::{ArtifactStore, MetadataRecord, RecordingMetadata, SupabaseStore};
pub use telephony::{Telephony, TwilioClient};
pub use transcribe::{CallIntelligence, CallNotes, OpenAiIntelligence, FALLBACK_SUMMARY};
