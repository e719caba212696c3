//! Main Gateway implementation
//!
//! HTTP surface over the guard components. Every route sits behind the
//! admission gate.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use conductor_guard::{
    validate_project_name, AgentInvocation, CommandBuilder, ConflictResolver, DeletionManager,
    EnvMap, EventSink, InvocationPreview, ResolutionResult, ReviewPayload,
    SafetyEvent, CONFIRMATION_TTL_SECS,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::GatewayConfig;
use crate::events::EventBus;
use crate::rate_limit::{admission_middleware, RateLimiter};
use crate::{GatewayError, Result};

/// Header carrying a deletion confirmation token
pub const CONFIRMATION_HEADER: &str = "x-confirmation-token";

const DEFAULT_OUTPUT_FORMAT: &str = "text";

/// Gateway state shared across handlers
#[derive(Clone)]
pub struct GatewayState {
    pub config: GatewayConfig,
    pub limiter: Arc<RateLimiter>,
    pub deletions: Arc<DeletionManager>,
    pub resolver: ConflictResolver,
    pub commands: CommandBuilder,
    pub events: EventBus,
}

impl GatewayState {
    pub fn new(config: GatewayConfig) -> Self {
        let events = EventBus::new(config.event_capacity);
        let limiter = RateLimiter::new(config.rate_limit.clone()).with_events(Arc::new(events.clone()));

        Self {
            limiter: Arc::new(limiter),
            deletions: Arc::new(DeletionManager::new()),
            resolver: ConflictResolver::new(config.resolver.clone()),
            commands: CommandBuilder::new(config.agent_executable.clone()),
            events,
            config,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub output_format: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChatCommandRequest {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    pub output_format: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    #[serde(default)]
    pub security: ReviewPayload,
    #[serde(default)]
    pub architecture: ReviewPayload,
    pub security_weight: Option<f64>,
    pub architecture_weight: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DeletionRequest {
    #[serde(default)]
    pub remove_source: bool,
}

impl DeletionRequest {
    /// An absent body means the defaults. A body that is present must parse.
    fn from_body(body: &[u8]) -> Result<Self> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(body)
            .map_err(|e| GatewayError::BadRequest(format!("malformed deletion request: {e}")))
    }
}

#[derive(Debug, Serialize)]
pub struct DeletionTicket {
    pub token: String,
    pub project_name: String,
    pub files_to_delete: Vec<String>,
    pub expires_in: i64,
}

#[derive(Debug, Serialize)]
pub struct DeletionReport {
    pub project_name: String,
    pub removed: Vec<String>,
}

/// Main Gateway
pub struct Gateway {
    state: Arc<GatewayState>,
}

impl Gateway {
    /// Create a new gateway with configuration
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            state: Arc::new(GatewayState::new(config)),
        }
    }

    /// Get gateway state
    pub fn state(&self) -> Arc<GatewayState> {
        self.state.clone()
    }

    /// Build the Axum router
    pub fn build_router(&self) -> Router {
        Router::new()
            .route("/health", get(Self::handle_health))
            .route("/status", get(Self::handle_status))
            .route("/api/chat", post(Self::handle_chat))
            .route("/api/chat/command", post(Self::handle_chat_command))
            .route("/api/review/resolve", post(Self::handle_resolve))
            .route("/api/projects/:name/deletion", post(Self::handle_request_deletion))
            .route("/api/projects/:name", axum::routing::delete(Self::handle_delete_project))
            .layer(middleware::from_fn_with_state(
                self.state.limiter.clone(),
                admission_middleware,
            ))
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Start the gateway server
    pub async fn start(&self) -> Result<()> {
        let addr = self.state.config.socket_addr()?;
        let router = self.build_router();

        tracing::info!(%addr, "Conductor gateway starting");

        let listener = tokio::net::TcpListener::bind(addr).await?;

        axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .map_err(|e| GatewayError::Internal(e.to_string()))?;

        Ok(())
    }

    // HTTP handlers

    async fn handle_health() -> impl IntoResponse {
        Json(serde_json::json!({
            "status": "healthy",
            "version": crate::VERSION
        }))
    }

    async fn handle_status(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
        Json(serde_json::json!({
            "version": crate::VERSION,
            "rate_limit": {
                "enabled": state.limiter.is_enabled(),
                "tracked_clients": state.limiter.tracked_clients(),
            },
            "pending_deletions": state.deletions.pending_count(),
            "event_subscribers": state.events.subscriber_count(),
        }))
    }

    async fn handle_chat(
        State(state): State<Arc<GatewayState>>,
        Json(request): Json<ChatRequest>,
    ) -> Result<Json<InvocationPreview>> {
        let format = request.output_format.as_deref().unwrap_or(DEFAULT_OUTPUT_FORMAT);
        let invocation = AgentInvocation::chat::<&str>(
            &state.commands,
            &request.message,
            format,
            &[],
            &EnvMap::new(),
        )?;
        Ok(Json(invocation.preview()))
    }

    async fn handle_chat_command(
        State(state): State<Arc<GatewayState>>,
        Json(request): Json<ChatCommandRequest>,
    ) -> Result<Json<InvocationPreview>> {
        let format = request.output_format.as_deref().unwrap_or(DEFAULT_OUTPUT_FORMAT);
        let invocation = AgentInvocation::slash(
            &state.commands,
            &request.command,
            request.args.as_slice(),
            format,
            &EnvMap::new(),
        )?;
        Ok(Json(invocation.preview()))
    }

    async fn handle_resolve(
        State(state): State<Arc<GatewayState>>,
        Json(request): Json<ResolveRequest>,
    ) -> Json<ResolutionResult> {
        let result = state.resolver.resolve_with_weights(
            &request.security,
            &request.architecture,
            request.security_weight,
            request.architecture_weight,
        );

        state.events.broadcast(SafetyEvent::ReviewResolved {
            action: result.action,
            approved: result.approved,
            final_score: result.final_score,
            decision_reason: result.decision_reason.clone(),
        });
        Json(result)
    }

    async fn handle_request_deletion(
        State(state): State<Arc<GatewayState>>,
        Path(name): Path<String>,
        body: Bytes,
    ) -> Result<Json<DeletionTicket>> {
        let name = validate_project_name(&name)?;
        let request = DeletionRequest::from_body(&body)?;
        let project_dir = state.config.projects_root.join(name);

        let confirmation =
            state
                .deletions
                .create_confirmation(name, &project_dir, request.remove_source)?;

        state.events.broadcast(SafetyEvent::DeletionRequested {
            project_name: confirmation.project_name.clone(),
            token_hint: confirmation.token_hint().to_string(),
            files: confirmation.files_to_delete.len(),
            expires_at: confirmation.expires_at(),
        });

        Ok(Json(DeletionTicket {
            token: confirmation.token,
            project_name: confirmation.project_name,
            files_to_delete: confirmation.files_to_delete,
            expires_in: CONFIRMATION_TTL_SECS,
        }))
    }

    async fn handle_delete_project(
        State(state): State<Arc<GatewayState>>,
        Path(name): Path<String>,
        headers: HeaderMap,
    ) -> Result<Json<DeletionReport>> {
        let name = validate_project_name(&name)?.to_string();

        let token = headers
            .get(CONFIRMATION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .unwrap_or_default();

        let confirmation = match state.deletions.consume_for(&name, token) {
            Ok(confirmation) => confirmation,
            Err(e) => {
                state.events.broadcast(SafetyEvent::DeletionRejected {
                    project_name: name.clone(),
                    reason: e.to_string(),
                });
                return Err(e.into());
            }
        };

        let removed = tokio::task::spawn_blocking(move || confirmation.execute())
            .await
            .map_err(|e| GatewayError::Internal(e.to_string()))??;

        state.events.broadcast(SafetyEvent::DeletionConfirmed {
            project_name: name.clone(),
            removed: removed.clone(),
        });

        Ok(Json(DeletionReport {
            project_name: name,
            removed,
        }))
    }
}
