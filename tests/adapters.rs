//! HTTP adapter tests against local mock API servers
//!
//! Each test spins up an axum server on an ephemeral port standing in for
//! the external API, then drives the real reqwest-based adapter at it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::Form;
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::{Json, Router};

use recap_gateway::telephony::Telephony;
use recap_gateway::transcribe::CallIntelligence;
use recap_gateway::{
    ArtifactStore, Error, OpenAiIntelligence, RecordingMetadata, RetryPolicy, SupabaseStore,
    TwilioClient, FALLBACK_SUMMARY,
};

/// Bind a mock API server on an ephemeral port; returns its base URL
async fn spawn(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

/// Millisecond-scale policies so retry tests finish quickly
fn fast_policies() -> (RetryPolicy, RetryPolicy) {
    (
        RetryPolicy::new(5, Duration::from_millis(1), Duration::from_millis(5)),
        RetryPolicy::new(3, Duration::from_millis(1), Duration::from_millis(5)),
    )
}

fn adapter(base_url: &str) -> OpenAiIntelligence {
    let (transcribe, summary) = fast_policies();
    OpenAiIntelligence::new("sk-test".to_string())
        .unwrap()
        .with_base_url(base_url)
        .with_retry_policies(transcribe, summary)
}

fn server_error() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({
            "error": {"message": "The server had an error", "type": "server_error"}
        })),
    )
}

fn quota_error() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::TOO_MANY_REQUESTS,
        Json(serde_json::json!({
            "error": {
                "message": "You exceeded your current quota",
                "type": "insufficient_quota",
                "code": "insufficient_quota"
            }
        })),
    )
}

// -- transcription ----------------------------------------------------------

#[tokio::test]
async fn transcribe_returns_text() {
    let app = Router::new().route(
        "/v1/audio/transcriptions",
        post(|| async { Json(serde_json::json!({"text": "hello world"})) }),
    );
    let base = spawn(app).await;

    let text = adapter(&base).transcribe(&[0u8; 64]).await.unwrap();
    assert_eq!(text, "hello world");
}

#[tokio::test]
async fn transcribe_makes_exactly_five_attempts_on_transient_failure() {
    let hits = Arc::new(AtomicU32::new(0));
    let counter = hits.clone();
    let app = Router::new().route(
        "/v1/audio/transcriptions",
        post(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                server_error()
            }
        }),
    );
    let base = spawn(app).await;

    let err = adapter(&base).transcribe(&[0u8; 64]).await.unwrap_err();
    assert!(matches!(err, Error::Transcription(_)));
    assert_eq!(hits.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn transcribe_quota_error_fails_on_first_attempt() {
    let hits = Arc::new(AtomicU32::new(0));
    let counter = hits.clone();
    let app = Router::new().route(
        "/v1/audio/transcriptions",
        post(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                quota_error()
            }
        }),
    );
    let base = spawn(app).await;

    let err = adapter(&base).transcribe(&[0u8; 64]).await.unwrap_err();
    assert!(matches!(err, Error::Quota(_)));
    assert_eq!(hits.load(Ordering::SeqCst), 1, "quota must not be retried");
}

// -- summarization ----------------------------------------------------------

#[tokio::test]
async fn summarize_falls_back_after_three_attempts() {
    let hits = Arc::new(AtomicU32::new(0));
    let counter = hits.clone();
    let app = Router::new().route(
        "/v1/chat/completions",
        post(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                server_error()
            }
        }),
    );
    let base = spawn(app).await;

    // Transient exhaustion downgrades to the placeholder, not an error
    let summary = adapter(&base).summarize("hello world").await.unwrap();
    assert_eq!(summary, FALLBACK_SUMMARY);
    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn summarize_quota_error_propagates() {
    let app = Router::new().route("/v1/chat/completions", post(|| async { quota_error() }));
    let base = spawn(app).await;

    let err = adapter(&base).summarize("hello world").await.unwrap_err();
    assert!(matches!(err, Error::Quota(_)));
}

#[tokio::test]
async fn analyze_sequences_transcription_then_summary() {
    let app = Router::new()
        .route(
            "/v1/audio/transcriptions",
            post(|| async { Json(serde_json::json!({"text": "hello world"})) }),
        )
        .route(
            "/v1/chat/completions",
            post(|| async {
                Json(serde_json::json!({
                    "choices": [{"message": {"content": "Quick call about hello world."}}]
                }))
            }),
        );
    let base = spawn(app).await;

    let notes = adapter(&base).analyze(&[0u8; 64]).await.unwrap();
    assert_eq!(notes.transcript, "hello world");
    assert_eq!(notes.summary, "Quick call about hello world.");
}

#[tokio::test]
async fn check_quota_detects_exhaustion_and_fails_open() {
    let quota_app = Router::new().route("/v1/chat/completions", post(|| async { quota_error() }));
    let base = spawn(quota_app).await;
    assert!(!adapter(&base).check_quota().await);

    let flaky_app = Router::new().route("/v1/chat/completions", post(|| async { server_error() }));
    let base = spawn(flaky_app).await;
    assert!(adapter(&base).check_quota().await, "unrelated errors fail open");
}

// -- telephony ---------------------------------------------------------------

fn twilio(base: &str) -> TwilioClient {
    TwilioClient::new(
        "AC123".to_string(),
        "token".to_string(),
        "+15550009999".to_string(),
    )
    .unwrap()
    .with_base_url(base)
}

#[tokio::test]
async fn download_recording_returns_audio_bytes() {
    let app = Router::new().route("/Recordings/RE1", get(|| async { vec![7u8; 2048] }));
    let base = spawn(app).await;

    let audio = twilio(&base)
        .download_recording(&format!("{base}/Recordings/RE1"))
        .await
        .unwrap();
    assert_eq!(audio.len(), 2048);
}

#[tokio::test]
async fn download_recording_maps_not_found() {
    let app = Router::new();
    let base = spawn(app).await;

    let err = twilio(&base)
        .download_recording(&format!("{base}/Recordings/RE404"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Download { status: 404, .. }));
}

#[tokio::test]
async fn place_call_posts_play_document() {
    let calls: Arc<Mutex<Vec<HashMap<String, String>>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = calls.clone();
    let app = Router::new().route(
        "/2010-04-01/Accounts/AC123/Calls.json",
        post(move |Form(params): Form<HashMap<String, String>>| {
            let sink = sink.clone();
            async move {
                sink.lock().unwrap().push(params);
                (StatusCode::CREATED, "{}")
            }
        }),
    );
    let base = spawn(app).await;

    twilio(&base)
        .place_call("+15550001111", "https://store.test/RE1_summary_speech.mp3")
        .await
        .unwrap();

    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].get("To").map(String::as_str), Some("+15550001111"));
    assert_eq!(calls[0].get("From").map(String::as_str), Some("+15550009999"));
    assert!(calls[0]
        .get("Twiml")
        .is_some_and(|t| t.contains("RE1_summary_speech.mp3")));
}

#[tokio::test]
async fn caller_number_reads_call_resource() {
    let app = Router::new().route(
        "/2010-04-01/Accounts/AC123/Calls/CA1.json",
        get(|| async { Json(serde_json::json!({"from": "+15550001111", "to": "+15550009999"})) }),
    );
    let base = spawn(app).await;

    let from = twilio(&base).caller_number("CA1").await.unwrap();
    assert_eq!(from, "+15550001111");
}

// -- speech synthesis ---------------------------------------------------------

#[tokio::test]
async fn synthesize_returns_audio_bytes() {
    let app = Router::new().route(
        "/v1/audio/speech",
        post(|| async { vec![3u8; 4096] }),
    );
    let base = spawn(app).await;

    let tts = recap_gateway::TextToSpeech::new("sk-test".to_string())
        .unwrap()
        .with_base_url(base);
    let audio = tts.synthesize("Quick call about hello world.").await.unwrap();
    assert_eq!(audio.len(), 4096);
}

#[tokio::test]
async fn synthesis_failure_maps_to_synthesis_error() {
    let app = Router::new().route(
        "/v1/audio/speech",
        post(|| async { (StatusCode::BAD_REQUEST, "invalid voice") }),
    );
    let base = spawn(app).await;

    let tts = recap_gateway::TextToSpeech::new("sk-test".to_string())
        .unwrap()
        .with_base_url(base);
    let err = tts.synthesize("hello").await.unwrap_err();
    assert!(matches!(err, Error::Synthesis(_)));
}

// -- artifact store -----------------------------------------------------------

#[tokio::test]
async fn store_recording_uploads_and_inserts_record() {
    let inserts = Arc::new(AtomicU32::new(0));
    let counter = inserts.clone();
    let app = Router::new()
        .route(
            "/storage/v1/object/call-recordings/{key}",
            post(|| async { Json(serde_json::json!({"Key": "call-recordings/RE1.mp3"})) }),
        )
        .route(
            "/rest/v1/call_recordings",
            post(move || {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    StatusCode::CREATED
                }
            }),
        );
    let base = spawn(app).await;

    let store = SupabaseStore::new(
        base.clone(),
        "service-key".to_string(),
        "call-recordings".to_string(),
        "call_recordings".to_string(),
    )
    .unwrap();

    let meta = RecordingMetadata {
        recording_sid: "RE1".to_string(),
        call_sid: "CA1".to_string(),
        duration: 42,
    };
    let url = store.store_recording(&[0u8; 128], &meta).await.unwrap();

    assert_eq!(
        url,
        format!("{base}/storage/v1/object/public/call-recordings/RE1.mp3")
    );
    assert_eq!(inserts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn transcript_update_requires_exactly_one_matching_record() {
    let record = serde_json::json!({
        "recording_sid": "RE1",
        "call_sid": "CA1",
        "duration": 42,
        "audio_url": "https://x/RE1.mp3",
        "transcript_url": "https://x/RE1_transcript.txt",
        "audio_summary": "s",
        "created_at": "2026-08-27T00:00:00Z"
    });

    let one_row = record.clone();
    let app = Router::new()
        .route(
            "/storage/v1/object/call-recordings/{key}",
            post(|| async { StatusCode::OK }),
        )
        .route(
            "/rest/v1/call_recordings",
            patch(move || {
                let row = one_row.clone();
                async move { Json(serde_json::json!([row])) }
            }),
        );
    let base = spawn(app).await;

    let store = SupabaseStore::new(
        base,
        "service-key".to_string(),
        "call-recordings".to_string(),
        "call_recordings".to_string(),
    )
    .unwrap();

    let url = store
        .store_transcript_and_summary("RE1", "hello world", "s")
        .await
        .unwrap();
    assert!(url.ends_with("/RE1_transcript.txt"));

    // No matching record: the update must fail
    let empty_app = Router::new()
        .route(
            "/storage/v1/object/call-recordings/{key}",
            post(|| async { StatusCode::OK }),
        )
        .route(
            "/rest/v1/call_recordings",
            patch(|| async { Json(serde_json::json!([])) }),
        );
    let base = spawn(empty_app).await;

    let store = SupabaseStore::new(
        base,
        "service-key".to_string(),
        "call-recordings".to_string(),
        "call_recordings".to_string(),
    )
    .unwrap();

    let err = store
        .store_transcript_and_summary("RE1", "hello world", "s")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Storage(_)));
}

#[tokio::test]
async fn find_record_returns_none_for_unknown_sid() {
    let app = Router::new().route(
        "/rest/v1/call_recordings",
        get(|| async { Json(serde_json::json!([])) }),
    );
    let base = spawn(app).await;

    let store = SupabaseStore::new(
        base,
        "service-key".to_string(),
        "call-recordings".to_string(),
        "call_recordings".to_string(),
    )
    .unwrap();

    let found = store.find_record("RE404").await.unwrap();
    assert!(found.is_none());
}
