//! Video stream and session lifecycle routes

use axum::{
    body::{Body, Bytes},
    extract::{rejection::JsonRejection, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use futures_util::stream::{self, Stream};
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use storage::SummaryRecord;
use tokio::sync::mpsc;
use tracing::{error, info};

use crate::error::{ApiError, StatusResponse};
use crate::session::{SessionTotals, BOUNDARY};
use crate::AppState;

/// Answers reported when a quiz session ends
#[derive(Debug, Deserialize)]
pub struct ExitRequest {
    pub correct: u32,
    pub incorrect: u32,
    #[serde(default)]
    pub tag: Option<String>,
}

fn frame_stream(rx: mpsc::Receiver<Bytes>) -> impl Stream<Item = Result<Bytes, Infallible>> {
    stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|part| (Ok(part), rx))
    })
}

/// MJPEG stream of annotated frames; starts (or resumes) the session
pub async fn video_feed(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let rx = state.session.start_stream().await?;
    let content_type = format!("multipart/x-mixed-replace; boundary={BOUNDARY}");

    Ok((
        [(header::CONTENT_TYPE, content_type)],
        Body::from_stream(frame_stream(rx)),
    )
        .into_response())
}

fn clamp(count: u64) -> i64 {
    i64::try_from(count).unwrap_or(i64::MAX)
}

/// Build the row persisted for a finished session
pub fn summary_record(tag: String, request: &ExitRequest, totals: &SessionTotals) -> SummaryRecord {
    let emotions = totals.emotions;
    SummaryRecord {
        tag,
        attentive: totals.clock.attentive_secs(),
        distracted: totals.clock.distracted_secs(),
        correct: i64::from(request.correct),
        incorrect: i64::from(request.incorrect),
        happy: clamp(emotions.happy),
        sad: clamp(emotions.sad),
        surprise: clamp(emotions.surprise),
        angry: clamp(emotions.angry),
        disgusted: clamp(emotions.disgusted),
        fear: clamp(emotions.fear),
        neutral: clamp(emotions.neutral),
    }
}

/// End the session and persist its summary
pub async fn video_feed_exit(
    State(state): State<Arc<AppState>>,
    body: Result<Json<ExitRequest>, JsonRejection>,
) -> Result<Json<StatusResponse>, ApiError> {
    let Json(request) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let totals = state.session.stop_session();
    let tag = request
        .tag
        .clone()
        .unwrap_or_else(|| state.session.settings().default_tag.clone());
    let record = summary_record(tag, &request, &totals);

    let id = match state.repository.insert_summary(&record).await {
        Ok(id) => id,
        Err(e) => {
            // the session is already closed; keep its totals in the log
            error!("Session summary not stored: {:?}", record);
            return Err(e.into());
        }
    };
    info!(
        "Stored session {} ({}s attentive, {}s distracted, {}/{} correct)",
        id,
        record.attentive,
        record.distracted,
        record.correct,
        record.correct + record.incorrect
    );

    Ok(Json(StatusResponse::ok("Session saved")))
}

/// Release the camera without ending or saving the session
pub async fn exit_video(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    if state.session.release_camera() {
        Json(StatusResponse::ok("Camera released"))
    } else {
        Json(StatusResponse::ok("Camera not in use"))
    }
}
