use axum::Router;
use std::sync::Arc;

use crate::AppContext;

pub mod callback;
pub mod dispatch;
pub mod video;

pub fn router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .nest("/pipeline", dispatch::dispatch_router(ctx.clone()))
        .merge(callback::callback_router(ctx.clone()))
        .nest("/videos", video::video_router(ctx))
}
