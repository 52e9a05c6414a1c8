use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod extract;
mod mcq;
mod ollama;
mod storage;
mod stt;
mod whisper;

use whisper::{Transcriber, WhisperClient};

#[derive(Clone)]
pub struct AppState {
    /// Process-wide scratch directory for staged uploads; read-only after
    /// startup.
    pub storage_dir: PathBuf,
    pub ollama_url: String,
    pub mcq_model: String,
    pub transcriber: Arc<dyn Transcriber>,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting lectura services...");

    let storage_dir =
        PathBuf::from(std::env::var("STORAGE_DIR").unwrap_or_else(|_| "storage".to_string()));
    let ollama_url =
        std::env::var("OLLAMA_URL").unwrap_or_else(|_| "http://localhost:11434".to_string());
    let mcq_model = std::env::var("OLLAMA_MODEL").unwrap_or_else(|_| "llama2:latest".to_string());
    let whisper_url =
        std::env::var("WHISPER_URL").unwrap_or_else(|_| "http://localhost:8080".to_string());
    let whisper_model = std::env::var("WHISPER_MODEL").unwrap_or_else(|_| "base".to_string());

    let state = AppState {
        storage_dir,
        ollama_url,
        mcq_model,
        transcriber: Arc::new(WhisperClient::new(&whisper_url, &whisper_model)),
    };

    // Build router
    let app = Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/stt", post(stt::transcribe_audio))
        .route("/api/v1/mcq", post(mcq::generate_mcqs))
        // Audio uploads routinely exceed the default multipart cap; the
        // handler streams to disk in chunks anyway.
        .layer(DefaultBodyLimit::disable())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .with_state(state);

    let port = std::env::var("PORT").unwrap_or_else(|_| "3001".to_string());
    let addr = format!("0.0.0.0:{}", port);

    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap();
    axum::serve(listener, app).await.unwrap();
}

// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
