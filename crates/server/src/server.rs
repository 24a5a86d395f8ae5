//! Router composition and the serve loop.
//!
//! Request path, outermost first: trace → throttle → auth gate → `/mcp` (and the optional
//! `/tools` + `/invoke/{name}` debugging routes). Health routes sit outside both gates.

use crate::auth::{AuthGate, require_auth};
use crate::config::Config;
use crate::error::{Result, ServerError};
use crate::health::{self, HealthService, UpstreamStatusCheck};
use crate::mcp;
use crate::throttle::{Throttle, throttle_requests};
use crate::tools::bookstack::{self, SharedApi};
use crate::tools::{FailureKind, InvocationResult, ToolRegistry};
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router, middleware};
use bookstack_api::BookStackClient;
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

/// Everything the router needs, built once at startup.
pub struct App {
    pub registry: Arc<ToolRegistry>,
    pub health: Arc<HealthService>,
    pub auth: Arc<AuthGate>,
    pub throttle: Option<Arc<Throttle>>,
    pub debug_routes: bool,
}

impl App {
    /// Wire the real BookStack client into the tool catalog and health checks.
    ///
    /// # Errors
    ///
    /// Returns an error if the client, the auth gate or the tool registry cannot be built.
    pub fn from_config(config: &Config, shutdown: &CancellationToken) -> Result<Self> {
        let client = BookStackClient::new(&config.book_stack.api_config())?;
        let health = HealthService::new(shutdown.clone()).with_check(Arc::new(
            UpstreamStatusCheck::new(client.clone(), config.health.timeout()),
        ));
        let api: SharedApi = Arc::new(client);
        Self::new(config, &api, health)
    }

    /// # Errors
    ///
    /// Returns an error if the auth gate or the tool registry cannot be built.
    pub fn new(config: &Config, api: &SharedApi, health: HealthService) -> Result<Self> {
        let registry = bookstack::catalog(api, config.tools.expose_write_tools)
            .map_err(|e| ServerError::Startup(format!("failed to build tool registry: {e}")))?;
        Ok(Self {
            registry: Arc::new(registry),
            health: Arc::new(health),
            auth: Arc::new(AuthGate::new(&config.security)?),
            throttle: Throttle::from_config(&config.throttling).map(Arc::new),
            debug_routes: config.http.debug_routes,
        })
    }

    #[must_use]
    pub fn router(&self) -> Router {
        let mut gated =
            Router::new().nest_service("/mcp", mcp::streamable_service(Arc::clone(&self.registry)));
        if self.debug_routes {
            gated = gated.merge(debug_routes(Arc::clone(&self.registry)));
        }
        gated = gated.layer(middleware::from_fn_with_state(
            Arc::clone(&self.auth),
            require_auth,
        ));
        if let Some(throttle) = &self.throttle {
            gated = gated.layer(middleware::from_fn_with_state(
                Arc::clone(throttle),
                throttle_requests,
            ));
        }

        Router::new()
            .merge(health::routes(Arc::clone(&self.health)))
            .merge(gated)
            .layer(TraceLayer::new_for_http())
    }
}

fn debug_routes(registry: Arc<ToolRegistry>) -> Router {
    Router::new()
        .route("/tools", get(list_tools))
        .route("/invoke/{name}", post(invoke_tool))
        .with_state(registry)
}

async fn list_tools(State(registry): State<Arc<ToolRegistry>>) -> Json<Value> {
    let tools: Vec<Value> = registry.list_tools().map(|t| t.to_json()).collect();
    Json(json!({ "tools": tools }))
}

async fn invoke_tool(
    State(registry): State<Arc<ToolRegistry>>,
    Path(name): Path<String>,
    body: Bytes,
) -> Response {
    let args = if body.iter().all(u8::is_ascii_whitespace) {
        None
    } else {
        match serde_json::from_slice::<Value>(&body) {
            Ok(Value::Object(map)) => Some(map),
            Ok(Value::Null) => None,
            Ok(_) | Err(_) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({
                        "error": "Invalid arguments",
                        "message": "Request body must be a JSON object",
                        "tool": name,
                    })),
                )
                    .into_response();
            }
        }
    };

    // Axum drops this future when the client disconnects, which cancels the upstream call.
    let result = registry
        .dispatch(&name, args.as_ref(), &CancellationToken::new())
        .await;
    (invocation_status(&result), Json(result.to_json())).into_response()
}

fn invocation_status(result: &InvocationResult) -> StatusCode {
    match result.failure_kind() {
        None => StatusCode::OK,
        Some(FailureKind::NotFound) => StatusCode::NOT_FOUND,
        Some(FailureKind::BadRequest) => StatusCode::BAD_REQUEST,
        Some(FailureKind::InternalError) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Serve until `shutdown` fires. Peer addresses are exposed to the throttle via `ConnectInfo`.
///
/// # Errors
///
/// Returns an error if the server loop fails.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    shutdown: CancellationToken,
) -> Result<()> {
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move { shutdown.cancelled().await })
    .await?;
    Ok(())
}

/// Build the app from `config`, bind `bind` and serve until `shutdown` fires.
///
/// # Errors
///
/// Returns an error if startup fails or the listener cannot be bound.
pub async fn run(config: &Config, bind: SocketAddr, shutdown: CancellationToken) -> Result<()> {
    let app = App::from_config(config, &shutdown)?;

    if let Some(throttle) = &app.throttle {
        tokio::spawn(Arc::clone(throttle).run_sweeper(shutdown.clone()));
    }

    let listener = TcpListener::bind(bind)
        .await
        .map_err(|e| ServerError::Startup(format!("failed to bind {bind}: {e}")))?;
    let local = listener.local_addr()?;

    tracing::info!(
        addr = %local,
        upstream = %config.book_stack.base_url.trim_end_matches('/'),
        tools = app.registry.len(),
        write_tools = config.tools.expose_write_tools,
        auth = app.auth.is_enabled(),
        throttling = app.throttle.is_some(),
        debug_routes = app.debug_routes,
        "BookStack MCP server listening"
    );

    serve(listener, app.router(), shutdown).await?;
    tracing::info!("server stopped");
    Ok(())
}
