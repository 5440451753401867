use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::utils::http::HttpResponse;
use crate::AppContext;

pub fn callback_router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/callback", post(transcription_callback))
        .with_state(ctx)
}

/// Out-of-band completion from the transcription service. Carries either the
/// video id directly or a correlation id the adapter registered.
#[derive(Debug, Deserialize, Serialize)]
pub struct CallbackPayload {
    pub video_id: Option<i64>,
    pub correlation_id: Option<String>,
    pub text: Option<String>,
    pub error: Option<String>,
}

/// Idempotent and always 200: the transcription service retries blindly on
/// non-2xx, and there is nothing useful it could do differently. Unknown
/// videos are reported in the envelope only.
pub async fn transcription_callback(
    State(ctx): State<Arc<AppContext>>,
    Json(payload): Json<CallbackPayload>,
) -> impl IntoResponse {
    let video_id = payload.video_id.or_else(|| {
        payload
            .correlation_id
            .as_deref()
            .and_then(|corr| ctx.correlations.resolve(corr))
    });

    let Some(video_id) = video_id else {
        warn!("Callback without resolvable video id: {:?}", payload);
        let response = HttpResponse::new(
            404,
            "Unknown video".to_string(),
            "callback carried no resolvable video id".to_string(),
        );
        return (StatusCode::OK, Json(response)).into_response();
    };

    let result = match (payload.text, payload.error) {
        (_, Some(error)) => Err(error),
        (Some(text), None) => Ok(text),
        (None, None) => Err("callback carried neither text nor error".to_string()),
    };

    match ctx.engine.complete_transcription(video_id, result).await {
        Ok(()) => {
            info!("Callback for video {} processed", video_id);
            let response = HttpResponse::ok("Callback processed".to_string(), video_id);
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(e) => {
            error!("Callback for video {} failed: {:#}", video_id, e);
            let response =
                HttpResponse::new(500, "Callback processing failed".to_string(), e.to_string());
            (StatusCode::INTERNAL_SERVER_ERROR, Json(response)).into_response()
        }
    }
}
