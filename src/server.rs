use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use crate::companion::{CompanionConfig, MovieCompanion, SharedHistory};
use crate::config::AppConfig;
use crate::context::extract_context_from_text;
use crate::error::CompanionError;
use crate::provider::{AnswerClient, ProviderKind};
use crate::timestamp::{format_clock, parse_timestamp, TimestampValue};

#[derive(Clone)]
struct AppState {
    config: Arc<AppConfig>,
    history: SharedHistory,
    generation_limit: Arc<Semaphore>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AskRequest {
    pub title: String,
    pub timestamp: TimestampValue,
    pub subtitles_text: String,
    #[serde(default)]
    pub question: String,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub max_output_tokens: Option<u32>,
    pub previously_watched: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct ContextResponse {
    pub context: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct AskResponse {
    pub answer: String,
}

pub async fn run_server(config: AppConfig, history: SharedHistory) -> Result<()> {
    let addr: SocketAddr = config.bind_addr.parse()?;

    let state = AppState {
        generation_limit: Arc::new(Semaphore::new(config.generation_concurrency)),
        config: Arc::new(config),
        history,
    };

    let app = router(state);

    tracing::info!("listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// API routes, plus the bundled frontend when `public_dir` exists: its
/// `index.html` at `/` and the whole directory under `/static`.
fn router(state: AppState) -> Router {
    let public_dir = state.config.public_dir.clone();

    let mut app = Router::new()
        .route("/health", get(health))
        .route("/context", post(context_handler))
        .route("/ask", post(ask_handler));

    if public_dir.is_dir() {
        let index_path = public_dir.join("index.html");
        app = if index_path.is_file() {
            app.route_service("/", ServeFile::new(index_path))
        } else {
            app.route("/", get(frontend_missing))
        };
        app = app.nest_service("/static", ServeDir::new(public_dir));
    }

    app.layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn frontend_missing() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": "Movie companion API - frontend not found" }))
}

async fn context_handler(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> Result<Json<ContextResponse>, ApiError> {
    let seconds = parse_timestamp(request.timestamp).map_err(CompanionError::from)?;
    let context = extract_context_from_text(&request.subtitles_text, seconds, state.config.context)
        .map_err(CompanionError::from)?;

    Ok(Json(ContextResponse {
        context,
        timestamp: format_clock(seconds),
    }))
}

async fn ask_handler(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> Result<Json<AskResponse>, ApiError> {
    let seconds = parse_timestamp(request.timestamp.clone()).map_err(CompanionError::from)?;
    let context = extract_context_from_text(&request.subtitles_text, seconds, state.config.context)
        .map_err(CompanionError::from)?;
    let companion_config = companion_config_for(&state.config, &request)?;

    let _permit = state
        .generation_limit
        .acquire()
        .await
        .map_err(|err| ApiError::internal(err.to_string()))?;

    let config = state.config.clone();
    let history = state.history.clone();
    let answer = tokio::task::spawn_blocking(move || -> Result<String, CompanionError> {
        let client = AnswerClient::new(&companion_config.provider, &config.credentials)?;
        let companion = MovieCompanion::from_parts(companion_config, client, history);
        companion.answer_from_context(
            &request.title,
            &context,
            seconds,
            &request.question,
            request.previously_watched.as_deref(),
        )
    })
    .await
    .map_err(|err| ApiError::internal(format!("answer worker failed: {err}")))?;

    match answer {
        Ok(answer) => Ok(Json(AskResponse { answer })),
        Err(err) => {
            if let CompanionError::Provider(provider_err) = &err {
                if provider_err.is_retryable() {
                    tracing::error!("LLM request failed: {}", provider_err);
                }
            }
            Err(ApiError::from(err))
        }
    }
}

fn companion_config_for(config: &AppConfig, request: &AskRequest) -> Result<CompanionConfig, ApiError> {
    let mut companion = CompanionConfig::from(config);

    if let Some(name) = request.provider.as_deref().filter(|v| !v.trim().is_empty()) {
        companion.provider.provider = name
            .parse::<ProviderKind>()
            .map_err(CompanionError::from)?;
    }
    if let Some(model) = request.model.as_deref().filter(|v| !v.trim().is_empty()) {
        companion.provider.model = model.to_string();
    }
    if let Some(temperature) = request.temperature {
        companion.provider.temperature = temperature;
    }
    if let Some(max_output_tokens) = request.max_output_tokens {
        companion.provider.max_output_tokens = max_output_tokens;
    }

    Ok(companion)
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn internal(message: String) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message,
        }
    }
}

impl From<CompanionError> for ApiError {
    fn from(value: CompanionError) -> Self {
        let status = match &value {
            CompanionError::Timestamp(_) | CompanionError::Subtitles(_) | CompanionError::Prompt(_) => {
                StatusCode::BAD_REQUEST
            }
            CompanionError::Provider(err) if err.is_retryable() => StatusCode::BAD_GATEWAY,
            CompanionError::Provider(_) => StatusCode::BAD_REQUEST,
            CompanionError::History(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = if status == StatusCode::BAD_GATEWAY {
            "Failed to generate answer. Try again.".to_string()
        } else {
            value.to_string()
        };

        Self { status, message }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({ "error": self.message });
        (self.status, Json(body)).into_response()
    }
}
