//! HTTP transport for the agent server.
//!
//! Serves the MCP server over streamable HTTP at `/mcp`, next to plain REST
//! routes for clients that do not speak MCP:
//!
//! - `GET /` and `GET /health`
//! - `GET /tools`
//! - `POST /tools/{tool_name}` with `{"parameters": {...}}`, answered with a
//!   [`ToolResult`], including for malformed bodies
//! - `POST /process` with `{"prompt": "..."}`, routed to a tool by keyword

use crate::{
    AgentServer,
    dispatch::{Tool, ToolError, ToolKind, ToolRequest, ToolResult},
    validate::ValidateError,
};
use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    routing::{get, post},
};
use rmcp::transport::streamable_http_server::{
    StreamableHttpServerConfig, StreamableHttpService, session::local::LocalSessionManager,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::{
    io,
    net::{IpAddr, Ipv4Addr, SocketAddr},
};
use thiserror::Error;
use tokio::net::TcpListener;

pub const DEFAULT_PORT: u16 = 8081;
pub const DEFAULT_PORT_ATTEMPTS: u16 = 5;

/// Errors starting the HTTP server.
#[derive(Error, Debug)]
pub enum HttpError {
    #[error("could not find an available port after {attempts} attempts starting at {host}:{first}")]
    NoFreePort { host: IpAddr, first: u16, attempts: u16 },
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

/// Where to listen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpConfig {
    pub host: IpAddr,
    /// Preferred port.
    pub port: u16,
    /// How many consecutive ports to try, starting at `port`.
    pub port_attempts: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_PORT,
            port_attempts: DEFAULT_PORT_ATTEMPTS,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ToolCallBody {
    #[serde(default)]
    parameters: Map<String, Value>,
}

/// Body of `POST /process`. Other fields sent by clients are ignored.
#[derive(Debug, Deserialize)]
struct PromptRequest {
    prompt: String,
}

#[derive(Debug, Serialize)]
struct PromptResponse {
    response: String,
    metadata: Value,
}

impl PromptResponse {
    fn json(response: String, metadata: Value) -> Json<Self> {
        Json(Self { response, metadata })
    }
}

/// Build the HTTP application for `server`.
pub fn router(server: AgentServer) -> Router {
    let factory = server.clone();
    let mcp = StreamableHttpService::new(
        move || Ok(factory.clone()),
        LocalSessionManager::default().into(),
        StreamableHttpServerConfig::default(),
    );

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/tools", get(list_tools))
        .route("/tools/{tool_name}", post(call_tool))
        .route("/process", post(process))
        .nest_service("/mcp", mcp)
        .with_state(server)
}

async fn root() -> Json<Value> {
    Json(json!({ "message": "Welcome to the MCP agent server" }))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

async fn list_tools(State(server): State<AgentServer>) -> Json<Value> {
    Json(json!({ "tools": server.tool_router.list_all() }))
}

async fn call_tool(
    State(server): State<AgentServer>,
    Path(tool_name): Path<String>,
    body: Result<Json<ToolCallBody>, JsonRejection>,
) -> (StatusCode, Json<ToolResult>) {
    let Json(body) = match body {
        Ok(body) => body,
        Err(rejection) => {
            return (rejection.status(), Json(ToolResult::err(rejection.body_text())));
        }
    };
    let request = ToolRequest {
        tool_name,
        parameters: body.parameters,
    };
    match server.dispatcher().call(&request).await {
        Ok(content) => (StatusCode::OK, Json(ToolResult::ok(content))),
        Err(e) => (status_for(&e), Json(ToolResult::err(e.to_string()))),
    }
}

async fn process(
    State(server): State<AgentServer>,
    body: Result<Json<PromptRequest>, JsonRejection>,
) -> (StatusCode, Json<PromptResponse>) {
    let Json(request) = match body {
        Ok(body) => body,
        Err(rejection) => {
            let metadata = json!({ "status": "error", "error": "invalid_request" });
            return (
                rejection.status(),
                PromptResponse::json(rejection.body_text(), metadata),
            );
        }
    };
    tracing::debug!("received prompt: {}", request.prompt);

    let Some(tool) = Tool::from_prompt(&request.prompt) else {
        let names: Vec<_> = ToolKind::ALL.iter().map(|kind| kind.name()).collect();
        let metadata = json!({ "status": "error", "error": "invalid_tool" });
        return (
            StatusCode::OK,
            PromptResponse::json(
                format!("Invalid tool request. Available tools: {}", names.join(", ")),
                metadata,
            ),
        );
    };

    let kind = tool.kind();
    match server.dispatcher().run(tool).await {
        Ok(content) => {
            let response = match kind {
                ToolKind::ReadFile => content,
                ToolKind::CountR => format!("Number of 'r' characters: {content}"),
            };
            let metadata = json!({ "status": "success", "tool": kind.name() });
            (StatusCode::OK, PromptResponse::json(response, metadata))
        }
        Err(e) => {
            let metadata = json!({ "status": "error", "tool": kind.name(), "error": e.to_string() });
            (status_for(&e), PromptResponse::json(e.to_string(), metadata))
        }
    }
}

fn status_for(error: &ToolError) -> StatusCode {
    match error {
        ToolError::MissingParameter(_)
        | ToolError::InvalidParameter(_)
        | ToolError::Rejected(ValidateError::InvalidPath(_)) => StatusCode::BAD_REQUEST,
        ToolError::Rejected(ValidateError::OutsideAllowedDirectories(_)) => StatusCode::FORBIDDEN,
        ToolError::Rejected(ValidateError::NotFound(_)) | ToolError::UnknownTool(_) => {
            StatusCode::NOT_FOUND
        }
        ToolError::Decode(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ToolError::Rejected(ValidateError::Io(_)) | ToolError::Io { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Bind the preferred port, moving to the next one while ports are in use.
pub async fn bind(config: &HttpConfig) -> Result<TcpListener, HttpError> {
    let mut port = config.port;
    for _ in 0..config.port_attempts {
        match TcpListener::bind(SocketAddr::new(config.host, port)).await {
            Ok(listener) => return Ok(listener),
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                tracing::warn!("port {port} is in use, trying next port");
            }
            Err(e) => return Err(e.into()),
        }
        port = match port.checked_add(1) {
            Some(next) => next,
            None => break,
        };
    }
    Err(HttpError::NoFreePort {
        host: config.host,
        first: config.port,
        attempts: config.port_attempts,
    })
}

/// Serve `server` over HTTP until Ctrl-C.
pub async fn serve(server: AgentServer, config: &HttpConfig) -> Result<(), HttpError> {
    let listener = bind(config).await?;
    tracing::info!("starting server on {}", listener.local_addr()?);
    axum::serve(listener, router(server))
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;
    Ok(())
}
