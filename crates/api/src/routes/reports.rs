//! Aggregate queries over stored sessions

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::ApiError;
use crate::AppState;
use storage::{AttentionReport, EmotionTotals, QuizReport, StoredSummary};

/// Attentive / distracted seconds per session id
pub async fn get_attention(
    State(state): State<Arc<AppState>>,
) -> Result<Json<AttentionReport>, ApiError> {
    Ok(Json(state.repository.attention_by_session().await?))
}

/// Emotion counts summed over all sessions
pub async fn get_emotions(
    State(state): State<Arc<AppState>>,
) -> Result<Json<EmotionTotals>, ApiError> {
    Ok(Json(state.repository.emotion_totals().await?))
}

/// Correct / incorrect answers per session id
pub async fn quiz_result(State(state): State<Arc<AppState>>) -> Result<Json<QuizReport>, ApiError> {
    Ok(Json(state.repository.quiz_results().await?))
}

/// Query parameters for the sessions endpoint
#[derive(Debug, Deserialize)]
pub struct SessionsQuery {
    /// Maximum number of records
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    50
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionsResponse {
    pub data: Vec<StoredSummary>,
    pub count: usize,
}

/// Most recent stored summaries
pub async fn sessions(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SessionsQuery>,
) -> Result<Json<SessionsResponse>, ApiError> {
    let limit = params.limit.min(500);
    let data = state.repository.list_summaries(limit).await?;

    Ok(Json(SessionsResponse {
        count: data.len(),
        data,
    }))
}
