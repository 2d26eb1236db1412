//! Telephony webhook handlers: inbound call control and the
//! completed-recording notification

use std::sync::Arc;

use axum::extract::{Form, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::Router;
use serde::Deserialize;

use super::ApiState;
use crate::pipeline::RecordingNotice;
use crate::telephony::{record_twiml, MAX_RECORDING_SECS, RECORDING_NOTICE};

/// Completed-recording notification body (form-encoded by the provider)
#[derive(Debug, Deserialize)]
pub struct RecordingStatusBody {
    #[serde(rename = "RecordingUrl")]
    pub recording_url: Option<String>,
    #[serde(rename = "RecordingSid")]
    pub recording_sid: Option<String>,
    #[serde(rename = "CallSid")]
    pub call_sid: Option<String>,
    #[serde(rename = "RecordingDuration")]
    pub recording_duration: Option<String>,
    #[serde(rename = "RecordingStatus")]
    pub recording_status: Option<String>,
}

/// `POST /record` - call-control document telling the provider to play a
/// notice and record the call, with completion reported to
/// `/recording-status`
async fn record() -> impl IntoResponse {
    let twiml = record_twiml(RECORDING_NOTICE, MAX_RECORDING_SECS, "/recording-status");
    ([(header::CONTENT_TYPE, "text/xml")], twiml)
}

/// `POST /recording-status` - completed-recording webhook.
///
/// 400 when any of `RecordingUrl`, `RecordingSid`, `CallSid` is missing;
/// 200 once the pipeline has run (or the notification was ignorable);
/// 500 when the pipeline errors, which makes the provider redeliver.
async fn recording_status(
    State(state): State<Arc<ApiState>>,
    Form(body): Form<RecordingStatusBody>,
) -> StatusCode {
    let (Some(source_url), Some(recording_sid), Some(call_sid)) =
        (body.recording_url, body.recording_sid, body.call_sid)
    else {
        tracing::warn!("recording-status webhook missing required fields");
        return StatusCode::BAD_REQUEST;
    };

    // The provider only posts this callback on completion; any other
    // status that does arrive is acknowledged and ignored
    if let Some(status) = &body.recording_status {
        if status != "completed" {
            tracing::debug!(recording_sid = %recording_sid, status = %status, "ignoring non-completed status");
            return StatusCode::OK;
        }
    }

    let duration = body
        .recording_duration
        .as_deref()
        .and_then(|d| d.parse().ok())
        .unwrap_or(0);

    let notice = RecordingNotice {
        recording_sid,
        call_sid,
        source_url,
        duration,
    };

    match state.pipeline.process_recording(&notice).await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            tracing::error!(
                error = %e,
                recording_sid = %notice.recording_sid,
                "recording pipeline failed"
            );
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Router for the telephony webhook endpoints
#[must_use]
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/record", post(record))
        .route("/recording-status", post(recording_status))
        .with_state(state)
}
