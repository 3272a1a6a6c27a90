//! Live session readings

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct EmotionResponse {
    pub emotion: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FlagResponse {
    #[serde(rename = "showFlag")]
    pub show_flag: u8,
}

/// Latest observed emotion
pub async fn get_emotion(State(state): State<Arc<AppState>>) -> Json<EmotionResponse> {
    Json(EmotionResponse {
        emotion: state.session.current_emotion().to_string(),
    })
}

/// 1 once attentive time passes the configured threshold
pub async fn get_flag(State(state): State<Arc<AppState>>) -> Json<FlagResponse> {
    Json(FlagResponse {
        show_flag: u8::from(state.session.threshold_exceeded()),
    })
}
