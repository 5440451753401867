use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::error;

use crate::storage::video::{Quiz, Video};
use crate::utils::http::HttpResponse;
use crate::AppContext;

pub fn video_router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .route("/:video_id", get(get_video))
        .with_state(ctx)
}

#[derive(Debug, Serialize)]
struct VideoView {
    video: Video,
    quiz: Option<Quiz>,
}

async fn get_video(
    State(ctx): State<Arc<AppContext>>,
    Path(video_id): Path<i64>,
) -> impl IntoResponse {
    let video = match ctx.store.get(video_id).await {
        Ok(Some(video)) => video,
        Ok(None) => {
            let response =
                HttpResponse::new(404, "Video not found".to_string(), video_id.to_string());
            return (StatusCode::NOT_FOUND, Json(response)).into_response();
        }
        Err(e) => {
            error!("Failed to load video {}: {:#}", video_id, e);
            let response =
                HttpResponse::new(500, "Failed to load video".to_string(), e.to_string());
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(response)).into_response();
        }
    };

    let quiz = match ctx.store.get_quiz(video_id).await {
        Ok(quiz) => quiz,
        Err(e) => {
            error!("Failed to load quiz for video {}: {:#}", video_id, e);
            None
        }
    };

    let response = HttpResponse::ok("ok".to_string(), VideoView { video, quiz });
    (StatusCode::OK, Json(response)).into_response()
}
