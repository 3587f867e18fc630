use anyhow::{Context, Result};

#[cfg(test)]
mod tests;
use axum::{
    extract::State,
    http::{HeaderValue, StatusCode},
    routing::{get, post},
    Json, Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::SystemTime;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, info_span, warn, Instrument};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use twin_common::{
    ChatRequest, ChatResponse, Error as CommonError, ErrorResponse, HealthResponse, HealthStatus,
    RequestId, RootResponse, SessionsResponse,
};
use twin_config::{ConfigLoader, Persona};
use twin_runtime::{ChatOrchestrator, ProviderRuntime};
use twin_store::FileSessionStore;

const APP_NAME: &str = "AI Digital Twin App";

type ApiError = (StatusCode, Json<ErrorResponse>);

#[derive(Clone)]
struct AppState {
    orchestrator: Arc<ChatOrchestrator>,
    start_time: SystemTime,
}

impl AppState {
    fn new(orchestrator: ChatOrchestrator) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
            start_time: SystemTime::now(),
        }
    }
}

/// Render an error with the status its kind maps to
fn error_response(err: &CommonError, request_id: Option<&RequestId>) -> ApiError {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut response = ErrorResponse::from(err);
    response.request_id = request_id.map(|id| id.to_string());
    (status, Json(response))
}

async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        message: APP_NAME.to_string(),
    })
}

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = state.start_time.elapsed().unwrap_or_default().as_secs();

    Json(HealthResponse {
        status: HealthStatus::Healthy,
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime,
    })
}

async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    // Generate request ID for tracing
    let request_id = RequestId::new();
    let span = info_span!("chat", request_id = %request_id);

    async move {
        if let Err(e) = request.validate() {
            warn!("Rejected chat request: {}", e);
            return Err(error_response(&e, Some(&request_id)));
        }

        let outcome = state
            .orchestrator
            .handle_chat(request.session_id, request.message)
            .await
            .map_err(|e| {
                if e.is_client_error() {
                    warn!("Rejected chat request: {}", e);
                } else {
                    error!(error_type = e.error_type(), "Chat failed: {}", e);
                }
                error_response(&e, Some(&request_id))
            })?;

        Ok::<_, ApiError>(Json(ChatResponse {
            response: outcome.response,
            session_id: outcome.session_id,
        }))
    }
    .instrument(span)
    .await
}

async fn list_sessions(State(state): State<AppState>) -> Result<Json<SessionsResponse>, ApiError> {
    let sessions = state.orchestrator.store().list().await.map_err(|e| {
        error!(error_type = e.error_type(), "Failed to list sessions: {}", e);
        error_response(&e, None)
    })?;

    Ok(Json(SessionsResponse { sessions }))
}

/// CORS for the configured origins, with credentials and mirrored methods/headers
fn cors_layer(origins: &[String]) -> Result<CorsLayer> {
    // "*" cannot be combined with credentials; echo the caller's origin instead
    let allow_origin = if origins.iter().any(|origin| origin.trim() == "*") {
        warn!("CORS allows any origin");
        AllowOrigin::mirror_request()
    } else {
        let origins = origins
            .iter()
            .map(|origin| {
                origin
                    .parse::<HeaderValue>()
                    .with_context(|| format!("Invalid CORS origin: {}", origin))
            })
            .collect::<Result<Vec<_>>>()?;
        AllowOrigin::list(origins)
    };

    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_credentials(true)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request()))
}

/// Build the router with tracing and CORS layers
fn app(state: AppState, cors_origins: &[String]) -> Result<Router> {
    Ok(Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/chat", post(chat))
        .route("/sessions", get(list_sessions))
        .layer(cors_layer(cors_origins)?)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Starting {}", APP_NAME);

    // Load configuration
    let config = ConfigLoader::load(None)?;

    // The persona is a hard startup dependency
    let persona = Persona::load(&config.persona.path)?;

    let store = FileSessionStore::open(config.storage.memory_dir.clone()).await?;
    let provider = ProviderRuntime::create(&config.provider)?;

    let orchestrator = ChatOrchestrator::new(
        provider,
        Arc::new(store),
        persona,
        config.provider.model.clone(),
    );
    let state = AppState::new(orchestrator);

    info!("CORS origins: {}", config.cors.origins.join(", "));
    let router = app(state, &config.cors.origins)?;

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| {
            format!(
                "Invalid listen address {}:{}",
                config.server.host, config.server.port
            )
        })?;
    info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
