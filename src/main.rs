#![allow(clippy::uninlined_format_args)]

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use documentor_rs::generate::{Generator, HttpGenerationClient};
use documentor_rs::pipeline::{self, Dispatcher, InProcessQueue};
use documentor_rs::storage::video::SqliteVideoStore;
use documentor_rs::transcribe::{CorrelationMap, HttpTranscriptionClient, RetryPolicy};
use documentor_rs::utils::logger;
use documentor_rs::{
    AppContext, CALLBACK_BASE_URL, GENERATION_API_URL, GENERATION_MODEL,
    GENERATION_TIMEOUT_SECS, SQLITE_PATH, TRANSCRIBE_TIMEOUT_SECS, WHISPER_API_URL,
};

const WORKER_COUNT: usize = 4;

#[tokio::main]
async fn main() -> Result<()> {
    let _guard = logger::init("./logs".to_string())?;
    documentor_rs::init_env();

    info!("Starting documentor pipeline service...");

    info!("Initializing video store...");
    let store = Arc::new(SqliteVideoStore::new(&SQLITE_PATH).await?);

    let correlations = Arc::new(CorrelationMap::new());
    let callback_url = if CALLBACK_BASE_URL.is_empty() {
        None
    } else {
        Some(format!("{}/callback", *CALLBACK_BASE_URL))
    };

    info!("Initializing transcription client: {}", *WHISPER_API_URL);
    let transcriber = Arc::new(HttpTranscriptionClient::new(
        WHISPER_API_URL.clone(),
        callback_url,
        Duration::from_secs(*TRANSCRIBE_TIMEOUT_SECS),
        RetryPolicy::default(),
        correlations.clone(),
    )?);

    info!("Initializing generation client: {}", *GENERATION_API_URL);
    let generation = Arc::new(HttpGenerationClient::new(
        GENERATION_API_URL.clone(),
        GENERATION_MODEL.clone(),
        Duration::from_secs(*GENERATION_TIMEOUT_SECS),
    )?);
    let generator = Generator::new(generation);

    let queue = Arc::new(InProcessQueue::new());

    info!("Spawning {} pipeline workers...", WORKER_COUNT);
    let engine = pipeline::spawn_workers(
        store.clone(),
        transcriber,
        generator,
        queue.clone(),
        WORKER_COUNT,
    );

    let dispatcher = Arc::new(Dispatcher::new(store.clone(), queue));

    let ctx = Arc::new(AppContext {
        store,
        dispatcher,
        engine,
        correlations,
    });

    let addr = SocketAddr::from(([127, 0, 0, 1], 7300));
    info!("Starting HTTP server at http://{}", addr);

    match documentor_rs::web::start_server(ctx, addr).await {
        Ok(_) => info!("Server stopped gracefully"),
        Err(e) => {
            tracing::error!("Server error: {}", e);
            return Err(e);
        }
    }

    Ok(())
}
