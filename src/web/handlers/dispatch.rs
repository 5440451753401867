use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info};

use crate::error::PipelineError;
use crate::pipeline::types::GenerationMode;
use crate::utils::http::HttpResponse;
use crate::AppContext;

pub fn dispatch_router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/dispatch", post(dispatch))
        .with_state(ctx)
}

#[derive(Debug, Deserialize, Serialize)]
pub struct DispatchRequest {
    pub video_id: i64,
    pub video_url: String,
    #[serde(default)]
    pub generation_mode: GenerationMode,
}

pub async fn dispatch(
    State(ctx): State<Arc<AppContext>>,
    Json(req): Json<DispatchRequest>,
) -> impl IntoResponse {
    match ctx
        .dispatcher
        .submit(req.video_id, &req.video_url, req.generation_mode)
        .await
    {
        Ok(job_id) => {
            info!("Pipeline run accepted for video {}", req.video_id);
            let response = HttpResponse::ok("Pipeline run accepted".to_string(), job_id);
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(PipelineError::NotFound(what)) => {
            let response = HttpResponse::new(404, "Video not found".to_string(), what);
            (StatusCode::NOT_FOUND, Json(response)).into_response()
        }
        Err(PipelineError::Validation(reason)) => {
            let response = HttpResponse::new(400, "Invalid request".to_string(), reason);
            (StatusCode::BAD_REQUEST, Json(response)).into_response()
        }
        Err(e) => {
            error!("Failed to dispatch video {}: {}", req.video_id, e);
            let response =
                HttpResponse::new(500, "Failed to dispatch".to_string(), e.to_string());
            (StatusCode::INTERNAL_SERVER_ERROR, Json(response)).into_response()
        }
    }
}
