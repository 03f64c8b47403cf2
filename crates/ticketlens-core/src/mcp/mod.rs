//! MCP (Model Context Protocol) server implementation
//!
//! Provides a stdio JSON-RPC interface over the search engine.

mod protocol;
mod resources;
mod tools;

pub use protocol::*;
pub use resources::*;
pub use tools::*;

use std::sync::Arc;

use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::search::SearchEngine;
use crate::session::Session;

const PROTOCOL_VERSION: &str = "2024-11-05";
const SLOW_REQUEST_MS: u128 = 1000;

/// MCP Server for TicketLens
pub struct McpServer {
    tools: ToolHandler,
    resources: ResourceHandler,
}

impl McpServer {
    /// Create a new MCP server
    pub fn new(engine: Arc<SearchEngine>, config: Arc<Config>) -> Self {
        Self {
            tools: ToolHandler::new(engine.clone(), config),
            resources: ResourceHandler::new(engine),
        }
    }

    /// Run the MCP server on stdio
    pub async fn run(&self) -> Result<()> {
        info!("Starting MCP server on stdio");
        self.run_with(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
            .await
    }

    /// Serve newline-delimited requests from `reader` until EOF.
    ///
    /// One session spans the whole connection.
    pub async fn run_with<R, W>(&self, mut reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut session = Session::new();
        let mut line = String::new();

        loop {
            line.clear();
            let n = reader.read_line(&mut line).await?;

            if n == 0 {
                debug!("Received EOF, shutting down");
                break;
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            debug!("Received request: {}", trimmed);

            let response = match serde_json::from_str::<JsonRpcRequest>(trimmed) {
                Ok(request) => self.handle_request(&request, &mut session).await,
                Err(e) => {
                    warn!("Unparseable request: {}", e);
                    Some(JsonRpcResponse::failure(
                        None,
                        JsonRpcError {
                            code: PARSE_ERROR,
                            message: format!("Parse error: {}", e),
                            data: None,
                        },
                    ))
                }
            };

            if let Some(response) = response {
                let response_json = serde_json::to_string(&response)?;
                debug!("Sending response: {}", response_json);
                writer.write_all(response_json.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
        }

        Ok(())
    }

    /// Handle a JSON-RPC request; notifications produce no response
    pub async fn handle_request(
        &self,
        request: &JsonRpcRequest,
        session: &mut Session,
    ) -> Option<JsonRpcResponse> {
        let start = std::time::Instant::now();
        let method = request.method.as_str();

        let request_desc = match (method, &request.params) {
            ("tools/call", Some(params)) => {
                format!("tools/call:{}", params["name"].as_str().unwrap_or("unknown"))
            }
            _ => method.to_string(),
        };

        info!("→ {}", request_desc);

        let result = match method {
            "initialize" => Ok(self.handle_initialize()),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({ "tools": get_tool_definitions() })),
            "tools/call" => self
                .handle_tools_call(&request.params, session)
                .await
                .map_err(|e| JsonRpcError::from(&e)),
            "resources/list" => Ok(json!({ "resources": get_resource_definitions() })),
            "resources/read" => self
                .handle_resources_read(&request.params)
                .await
                .map_err(|e| JsonRpcError::from(&e)),
            m if m == "initialized" || m.starts_with("notifications/") => Ok(Value::Null),
            _ => Err(JsonRpcError {
                code: METHOD_NOT_FOUND,
                message: format!("Unknown method: {}", method),
                data: None,
            }),
        };

        let elapsed_ms = start.elapsed().as_millis();

        match &result {
            Ok(_) if elapsed_ms > SLOW_REQUEST_MS => {
                warn!("← {} OK ({}ms) SLOW", request_desc, elapsed_ms)
            }
            Ok(_) => info!("← {} OK ({}ms)", request_desc, elapsed_ms),
            Err(e) => error!("← {} ERROR ({}ms): {}", request_desc, elapsed_ms, e.message),
        }

        if request.is_notification() {
            return None;
        }

        let id = request.id.clone();
        Some(match result {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(e) => JsonRpcResponse::failure(id, e),
        })
    }

    fn handle_initialize(&self) -> Value {
        json!({
            "protocolVersion": PROTOCOL_VERSION,
            "serverInfo": {
                "name": crate::APP_NAME,
                "version": env!("CARGO_PKG_VERSION")
            },
            "capabilities": {
                "tools": {},
                "resources": {
                    "subscribe": false,
                    "listChanged": false
                }
            }
        })
    }

    async fn handle_tools_call(&self, params: &Option<Value>, session: &mut Session) -> Result<Value> {
        let params = params
            .as_ref()
            .ok_or_else(|| Error::McpProtocol("Missing params".to_string()))?;

        let name = params["name"]
            .as_str()
            .ok_or_else(|| Error::McpProtocol("Missing tool name".to_string()))?;

        let arguments = params.get("arguments").cloned().unwrap_or(Value::Null);

        self.tools.call(name, arguments, session).await
    }

    async fn handle_resources_read(&self, params: &Option<Value>) -> Result<Value> {
        let uri = params
            .as_ref()
            .and_then(|p| p["uri"].as_str())
            .ok_or_else(|| Error::McpProtocol("Missing resource URI".to_string()))?;

        self.resources.read(uri).await
    }
}
