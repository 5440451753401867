pub mod error;
pub mod generate;
pub mod pipeline;
pub mod storage;
pub mod transcribe;
pub mod utils;
pub mod web;

use std::{env, sync::Arc};

use once_cell::sync::Lazy;

use pipeline::{Dispatcher, PipelineEngine};
use storage::video::VideoStore;
use transcribe::CorrelationMap;

/// Shared state handed to the web layer. Every component receives its
/// dependencies at construction; nothing global beyond the env settings.
pub struct AppContext {
    pub store: Arc<dyn VideoStore>,
    pub dispatcher: Arc<Dispatcher>,
    pub engine: Arc<PipelineEngine>,
    pub correlations: Arc<CorrelationMap>,
}

const DEFAULT_SQLITE_PATH: &str = "sqlite://./documentor_data/database/storage.db?mode=rwc";
const DEFAULT_WHISPER_API_URL: &str = "http://localhost:5000/transcribe";
const DEFAULT_GENERATION_API_URL: &str = "http://localhost:8001/v1/chat/completions";
const DEFAULT_GENERATION_MODEL: &str = "gpt-4o-mini";

fn setting(name: &str, default: &str) -> String {
    match env::var(name) {
        Ok(value) => value,
        Err(_) => dotenv::var(name).unwrap_or_else(|_| default.to_string()),
    }
}

pub static SQLITE_PATH: Lazy<String> =
    Lazy::new(|| setting("DOCUMENTOR_SQLITE_PATH", DEFAULT_SQLITE_PATH));

pub static WHISPER_API_URL: Lazy<String> =
    Lazy::new(|| setting("WHISPER_API_URL", DEFAULT_WHISPER_API_URL));

pub static GENERATION_API_URL: Lazy<String> =
    Lazy::new(|| setting("GENERATION_API_URL", DEFAULT_GENERATION_API_URL));

pub static GENERATION_MODEL: Lazy<String> =
    Lazy::new(|| setting("GENERATION_MODEL", DEFAULT_GENERATION_MODEL));

/// Base URL the transcription service calls back on; empty leaves the
/// callback hint out of outgoing requests.
pub static CALLBACK_BASE_URL: Lazy<String> = Lazy::new(|| setting("CALLBACK_BASE_URL", ""));

/// Outer bound on one transcription request. Deployments run anywhere in
/// the 60-800s range depending on how slow the service is.
pub static TRANSCRIBE_TIMEOUT_SECS: Lazy<u64> = Lazy::new(|| {
    setting("TRANSCRIBE_TIMEOUT_SECS", "800")
        .parse()
        .unwrap_or(800)
});

pub static GENERATION_TIMEOUT_SECS: Lazy<u64> = Lazy::new(|| {
    setting("GENERATION_TIMEOUT_SECS", "120")
        .parse()
        .unwrap_or(120)
});

pub fn init_env() {
    dotenv::dotenv().ok();

    if let Some(db_path) = SQLITE_PATH.strip_prefix("sqlite://") {
        let db_path = db_path.split('?').next().unwrap_or(db_path);
        if let Some(dir) = std::path::Path::new(db_path).parent() {
            std::fs::create_dir_all(dir).unwrap_or_else(|e| {
                eprintln!("Failed to create database directory: {}", e);
            });
        }
    }
}
