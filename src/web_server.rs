use std::convert::Infallible;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{DefaultBodyLimit, Multipart, State},
    http::{HeaderMap, StatusCode},
    response::{
        sse::{Event, Sse},
        Html, IntoResponse, Response,
    },
    routing::{get, post},
    serve, Json, Router,
};
use futures::stream::{Stream, StreamExt};
use minijinja::{path_loader, Environment};
use minijinja_autoreload::AutoReloader;
use serde::Deserialize;
use serde_json::json;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{error, info, warn};

use crate::chat::SessionStore;
use crate::config::RelayConfig;
use crate::constants::{DEFAULT_SESSION, SESSION_HEADER};
use crate::error::{RelayError, UploadError};
use crate::llm_interaction::{ProbeOutcome, UpstreamClient};
use crate::relay::Relay;
use crate::upload::{UploadResponse, UploadedFile};

// Shared application state
#[derive(Clone)]
pub struct AppState {
    templates: Arc<AutoReloader>,
    relay: Relay,
    config: Arc<RelayConfig>,
}

impl AppState {
    pub fn new(config: RelayConfig) -> Result<Self> {
        let templates = create_minijinja_env(&config.templates_dir);
        let upstream = UpstreamClient::new(&config)?;
        let sessions = SessionStore::new(config.system_prompt.clone(), config.max_history);
        Ok(Self {
            templates: Arc::new(templates),
            relay: Relay::new(upstream, sessions),
            config: Arc::new(config),
        })
    }

    pub fn sessions(&self) -> &SessionStore {
        self.relay.sessions()
    }
}

// Minijinja Environment setup
fn create_minijinja_env(templates_dir: &Path) -> AutoReloader {
    let templates_dir = templates_dir.to_path_buf();
    AutoReloader::new(move |notifier| {
        let mut env = Environment::new();
        env.set_loader(path_loader(&templates_dir));
        // Watch the templates directory for changes
        notifier.watch_path(&templates_dir, true);
        Ok(env)
    })
}

/// Session id from the `X-Session-Id` header, or the shared default.
pub fn session_id(headers: &HeaderMap) -> String {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(DEFAULT_SESSION)
        .to_string()
}

async fn index_handler(State(state): State<AppState>) -> Response {
    let rendered = state.templates.acquire_env().and_then(|env| {
        env.get_template("index.html").and_then(|tmpl| {
            tmpl.render(minijinja::context! {
                title => state.config.title.as_str(),
                model => state.config.model.as_str(),
            })
        })
    });
    match rendered {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            error!("Failed to get or render template: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Html(format!("Internal Server Error: {}", e)),
            )
                .into_response()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    // Null or non-string values count as no message.
    #[serde(default)]
    pub message: serde_json::Value,
}

impl ChatRequest {
    pub fn message(&self) -> &str {
        self.message.as_str().unwrap_or_default()
    }
}

async fn chat_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, RelayError> {
    let session = session_id(&headers);
    let events = state.relay.start(&session, request.message()).await?;
    Ok(Sse::new(events.map(|event| Ok::<_, Infallible>(event.into_sse()))))
}

async fn upload_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, UploadError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let client_name = field.file_name().map(str::to_string);
        let data = field.bytes().await?;
        let file = UploadedFile::new(&state.config.upload_dir, client_name.as_deref(), data)?;
        return Ok(Json(file.store().await?));
    }
    Err(UploadError::NoFile)
}

async fn clear_handler(State(state): State<AppState>, headers: HeaderMap) -> Json<serde_json::Value> {
    let session = session_id(&headers);
    state.sessions().clear(&session).await;
    info!(session = %session, "Conversation cleared");
    Json(json!({ "success": true }))
}

async fn test_api_handler(State(state): State<AppState>) -> Response {
    match state.relay.upstream().probe().await {
        Ok(ProbeOutcome::Valid) => {
            Json(json!({ "status": "success", "message": "API key is valid" })).into_response()
        }
        Ok(ProbeOutcome::Rejected { status, body }) => {
            let code = StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY);
            (
                code,
                Json(json!({ "status": "error", "code": status, "message": body })),
            )
                .into_response()
        }
        Err(e) => {
            warn!("API probe failed: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "status": "error", "message": format!("{:#}", e) })),
            )
                .into_response()
        }
    }
}

/// Build the application router. Exposed for tests.
pub fn build_router(state: AppState) -> Router {
    let max_body_bytes = state.config.max_body_bytes;

    // Serve static files from the configured directory
    let static_files_service = ServeDir::new(&state.config.static_dir).not_found_service(
        tower::service_fn(|_| async {
            Ok::<_, Infallible>((StatusCode::NOT_FOUND, "Not Found").into_response())
        }),
    );

    Router::new()
        .route("/", get(index_handler))
        .route("/chat", post(chat_handler))
        .route("/upload", post(upload_handler))
        .route("/clear", post(clear_handler))
        .route("/test-api", get(test_api_handler))
        .nest_service("/static", static_files_service)
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http()) // Add request logging
}

pub async fn start_web_server(addr: SocketAddr, config: RelayConfig) -> Result<()> {
    tokio::fs::create_dir_all(&config.upload_dir)
        .await
        .context(format!("Failed to create upload directory {:?}", config.upload_dir))?;

    let state = AppState::new(config)?;
    let app = build_router(state);

    info!("Web server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context(format!("Failed to bind to address {}", addr))?;

    serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Web server failed")?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
