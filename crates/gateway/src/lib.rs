//! HTTP gateway for chatbridge.
//!
//! Routes:
//! - `POST /chat`: one chat turn (any other method gets 405)
//! - `GET /health`: liveness probe
//!
//! Built on Axum; the chat pipeline itself lives in `chatbridge-agent`.

pub mod chat;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderName, Method, header};
use axum::{
    Router,
    response::Json,
    routing::{get, post},
};
use chatbridge_agent::{ChatService, CompletionEngine};
use chatbridge_config::AppConfig;
use chatbridge_core::error::Result;
use chatbridge_core::memory::HistoryStore;
use chatbridge_memory::{FileHistoryStore, InMemoryHistoryStore, LayeredHistoryStore};
use chatbridge_providers::{CachedFileUploader, GigaChatBackend, OAuthTokenSource};
use serde::Serialize;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Shared application state for the gateway.
pub struct GatewayState {
    pub service: ChatService,
}

pub type SharedState = Arc<GatewayState>;

/// Build the Axum router with all gateway routes.
pub fn build_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST])
        .allow_headers([
            header::CONTENT_TYPE,
            HeaderName::from_static(chat::SESSION_HEADER),
        ]);

    Router::new()
        .route(
            "/chat",
            post(chat::chat_handler).fallback(chat::method_not_allowed),
        )
        .route("/health", get(health_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(DefaultBodyLimit::max(1024 * 1024)),
        )
        .with_state(state)
}

/// Pick the history backend named in the configuration.
fn build_store(config: &AppConfig) -> Arc<dyn HistoryStore> {
    let dir = config.history.dir();
    match config.history.backend.as_str() {
        "memory" => Arc::new(InMemoryHistoryStore::new()),
        "file" => Arc::new(FileHistoryStore::new(dir)),
        _ => Arc::new(LayeredHistoryStore::new(FileHistoryStore::new(dir))),
    }
}

/// Wire the production collaborators into a [`ChatService`].
pub fn build_service(config: &AppConfig) -> Result<ChatService> {
    let backend = Arc::new(GigaChatBackend::from_config(config)?);
    let tokens = Arc::new(OAuthTokenSource::from_config(config)?);
    let uploader = Arc::new(CachedFileUploader::from_config(config)?);
    let store = build_store(config);

    let engine = CompletionEngine::new(backend, config.model.clone(), config.resolve_system_prompt());
    let attachment = config.attachment.active_file().map(|p| p.to_path_buf());

    info!(
        model = %config.model,
        store = store.name(),
        attachment = attachment.is_some(),
        "Chat service ready"
    );

    Ok(ChatService::new(tokens, uploader, store, engine).with_attachment(attachment))
}

/// Start the gateway HTTP server.
pub async fn start(config: AppConfig) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    if !config.has_credentials() {
        warn!("Client credentials are not configured; every chat request will fail");
    }

    let state = Arc::new(GatewayState {
        service: build_service(&config)?,
    });
    let app = build_router(state);

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// --- Handlers ---

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
