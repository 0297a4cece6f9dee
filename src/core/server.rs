/// MCP Server Implementation
///
/// This module contains the core MCP server implementation including:
/// - JSON-RPC 2.0 request/response structures
/// - Tool registry mapping tool names to their handlers
/// - Request handlers for MCP protocol methods
/// - STDIO transport for line-based communication

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tracing::{debug, error, info, warn};

use crate::core::config::ServerConfig;
use crate::core::error::{Result, ToolError};
use crate::tools;
use crate::tools::date::{Clock, SystemClock};

/// Protocol versions this server can speak, newest first.
pub const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2025-06-18", "2025-03-26", "2024-11-05"];

const INSTRUCTIONS: &str =
    "Date tools for the host's local calendar: get_day_name returns the weekday, \
     get_iso_date returns the date as YYYY-MM-DD.";

// JSON-RPC 2.0 error codes
pub const PARSE_ERROR: i32 = -32700;
pub const INVALID_REQUEST: i32 = -32600;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;

/// JSON-RPC 2.0 request structure for MCP protocol.
///
/// id is None for notifications, which never receive a response.
#[derive(Deserialize, Debug)]
pub struct MCPRequest {
    /// JSON-RPC version identifier, must be "2.0"
    jsonrpc: String,
    /// Request ID for correlating responses
    #[serde(default)]
    id: Option<Value>,
    /// MCP method name (e.g., "initialize", "tools/list", "tools/call")
    method: String,
    /// Method-specific parameters
    #[serde(default)]
    params: Value,
}

/// JSON-RPC 2.0 response structure.
///
/// Exactly one of result or error is present.
#[derive(Serialize, Debug)]
pub struct MCPResponse {
    jsonrpc: &'static str,
    id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<MCPError>,
}

/// JSON-RPC 2.0 error object.
#[derive(Serialize, Debug)]
pub struct MCPError {
    code: i32,
    message: String,
}

impl MCPResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Option<Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(MCPError {
                code,
                message: message.into(),
            }),
        }
    }
}

/// MCP tool definition as listed by tools/list.
#[derive(Serialize, Debug, Clone)]
pub struct MCPTool {
    /// Unique tool identifier (e.g., "get_iso_date")
    pub name: String,
    /// Human-readable description of what the tool does
    pub description: String,
    /// JSON Schema for the tool's input
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

impl MCPTool {
    /// Definition for a tool that takes no arguments.
    pub fn without_arguments(name: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            input_schema: json!({ "type": "object", "properties": {} }),
        }
    }
}

/// Parameters of a tools/call request.
///
/// Registered tools take no arguments; any `arguments` object is skipped
/// during deserialization.
#[derive(Deserialize, Debug)]
struct ToolCallParams {
    name: String,
}

/// Text content block inside a tool result.
#[derive(Serialize, Debug)]
struct ToolContent {
    #[serde(rename = "type")]
    content_type: &'static str,
    text: String,
}

/// Result payload of a tools/call request.
#[derive(Serialize, Debug)]
struct ToolCallResult {
    content: Vec<ToolContent>,
    #[serde(rename = "isError")]
    is_error: bool,
}

impl ToolCallResult {
    fn text(text: String, is_error: bool) -> Self {
        Self {
            content: vec![ToolContent {
                content_type: "text",
                text,
            }],
            is_error,
        }
    }
}

/// Tool handler function type definition.
///
/// Handlers take no arguments and return the tool's text output.
pub type ToolHandler = Box<dyn Fn() -> std::result::Result<String, ToolError> + Send + Sync>;

/// Registry of available MCP tools.
///
/// Keeps tool definitions in registration order for tools/list and a map
/// of tool names to handlers for tools/call.
pub struct ToolRegistry {
    pub tools: Vec<MCPTool>,
    handlers: HashMap<String, ToolHandler>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    /// Create a new empty tool registry.
    ///
    /// Tools are added with `register` during server initialization.
    pub fn new() -> Self {
        Self {
            tools: Vec::new(),
            handlers: HashMap::new(),
        }
    }

    /// Register a tool with the registry.
    ///
    /// Adds the definition to the tools list and stores the handler under the
    /// tool's name. Names are unique: a second registration under an existing
    /// name is logged and ignored, leaving the first one in place.
    ///
    /// # Arguments
    /// * `tool` - Tool definition with name, description, and input schema
    /// * `handler` - Function that executes the tool when called
    pub fn register(&mut self, tool: MCPTool, handler: ToolHandler) {
        if self.handlers.contains_key(&tool.name) {
            warn!(tool = %tool.name, "duplicate tool registration ignored");
            return;
        }
        self.handlers.insert(tool.name.clone(), handler);
        self.tools.push(tool);
    }

    /// Invoke the named tool.
    ///
    /// A panicking handler is caught and reported as `ToolError::Panicked`
    /// so one faulty tool cannot take the serve loop down with it.
    ///
    /// # Arguments
    /// * `name` - Tool name as sent in the tools/call params
    ///
    /// # Returns
    /// None when no tool of that name is registered, otherwise the handler's
    /// text output or its error.
    pub fn call(&self, name: &str) -> Option<std::result::Result<String, ToolError>> {
        let handler = self.handlers.get(name)?;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler()));
        Some(outcome.unwrap_or_else(|payload| {
            Err(ToolError::Panicked(name.to_string(), panic_message(&*payload)))
        }))
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Create the tool registry with every tool this server exposes.
///
/// Add new tool registrations here following the pattern
/// `tools::your_tool::register(&mut registry, ..)`.
///
/// # Arguments
/// * `clock` - Date source shared by the date tools
pub fn initialize_tools(clock: Arc<dyn Clock>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    tools::date::register(&mut registry, clock);
    registry
}

/// MCP server: server metadata plus the tool registry.
///
/// Built once at startup, then driven by `serve` until the input closes.
pub struct McpServer {
    server_name: String,
    server_version: String,
    registry: ToolRegistry,
}

impl McpServer {
    /// Create a server from its configuration and a populated registry.
    ///
    /// # Arguments
    /// * `config` - Supplies the name and version reported by initialize
    /// * `registry` - Tools served by tools/list and tools/call
    pub fn new(config: &ServerConfig, registry: ToolRegistry) -> Self {
        Self {
            server_name: config.server_name.clone(),
            server_version: config.server_version.clone(),
            registry,
        }
    }

    /// Process one raw line of input.
    ///
    /// Bytes that are not valid UTF-8 are malformed input like any other
    /// unparseable line and get a parse error response.
    pub fn handle_bytes(&self, line: &[u8]) -> Option<MCPResponse> {
        match std::str::from_utf8(line) {
            Ok(text) => self.handle_line(text),
            Err(e) => {
                warn!("parse error: {}", e);
                Some(MCPResponse::error(None, PARSE_ERROR, format!("Parse error: {}", e)))
            }
        }
    }

    /// Process one line of input. Returns None when nothing should be sent
    /// back (blank lines and notifications).
    pub fn handle_line(&self, line: &str) -> Option<MCPResponse> {
        if line.trim().is_empty() {
            return None;
        }

        let value: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                warn!("parse error: {}", e);
                return Some(MCPResponse::error(None, PARSE_ERROR, format!("Parse error: {}", e)));
            }
        };

        let id = value.get("id").cloned().filter(|id| !id.is_null());
        let request: MCPRequest = match serde_json::from_value(value) {
            Ok(req) => req,
            Err(e) => {
                warn!("invalid request: {}", e);
                return Some(MCPResponse::error(
                    id,
                    INVALID_REQUEST,
                    format!("Invalid request: {}", e),
                ));
            }
        };

        if request.jsonrpc != "2.0" {
            return Some(MCPResponse::error(
                id,
                INVALID_REQUEST,
                format!("Unsupported jsonrpc version: {}", request.jsonrpc),
            ));
        }

        self.handle_request(request)
    }

    /// Route a request to its method handler.
    pub fn handle_request(&self, req: MCPRequest) -> Option<MCPResponse> {
        // Notifications (e.g. notifications/initialized) get no response.
        let Some(id) = req.id.filter(|id| !id.is_null()) else {
            debug!(method = %req.method, "notification received");
            return None;
        };
        let id = Some(id);

        debug!(method = %req.method, "dispatching request");
        let response = match req.method.as_str() {
            "initialize" => self.handle_initialize(id, &req.params),
            "ping" => MCPResponse::success(id, json!({})),
            "tools/list" => self.handle_tools_list(id),
            "tools/call" => self.handle_tools_call(id, req.params),
            _ => MCPResponse::error(
                id,
                METHOD_NOT_FOUND,
                format!("Method not found: {}", req.method),
            ),
        };
        Some(response)
    }

    /// Handle MCP initialize method.
    ///
    /// Echoes the client's protocol version when supported, otherwise offers
    /// the newest version this server knows.
    fn handle_initialize(&self, id: Option<Value>, params: &Value) -> MCPResponse {
        let requested = params.get("protocolVersion").and_then(Value::as_str);
        let version = requested
            .filter(|v| SUPPORTED_PROTOCOL_VERSIONS.contains(v))
            .unwrap_or(SUPPORTED_PROTOCOL_VERSIONS[0]);

        info!(
            client_version = requested.unwrap_or("none"),
            negotiated = version,
            "client initialized"
        );

        MCPResponse::success(
            id,
            json!({
                "protocolVersion": version,
                "capabilities": {
                    "tools": {}
                },
                "serverInfo": {
                    "name": self.server_name,
                    "version": self.server_version
                },
                "instructions": INSTRUCTIONS
            }),
        )
    }

    fn handle_tools_list(&self, id: Option<Value>) -> MCPResponse {
        MCPResponse::success(id, json!({ "tools": self.registry.tools }))
    }

    /// Handle MCP tools/call method.
    ///
    /// Unknown tools are a protocol error; handler failures are a normal
    /// result with `isError: true`.
    fn handle_tools_call(&self, id: Option<Value>, params: Value) -> MCPResponse {
        let params: ToolCallParams = match serde_json::from_value(params) {
            Ok(p) => p,
            Err(e) => {
                return MCPResponse::error(id, INVALID_PARAMS, format!("Invalid params: {}", e));
            }
        };

        let Some(outcome) = self.registry.call(&params.name) else {
            warn!(tool = %params.name, "unknown tool requested");
            return MCPResponse::error(
                id,
                METHOD_NOT_FOUND,
                format!("Unknown tool: {}", params.name),
            );
        };

        let result = match outcome {
            Ok(text) => ToolCallResult::text(text, false),
            Err(e) => {
                warn!(tool = %params.name, error = %e, "tool execution failed");
                ToolCallResult::text(format!("Error: {}", e), true)
            }
        };

        match serde_json::to_value(result) {
            Ok(value) => MCPResponse::success(id, value),
            Err(e) => MCPResponse::error(id, INTERNAL_ERROR, format!("Unserializable result: {}", e)),
        }
    }

    /// Serve requests until the reader reaches end of input.
    ///
    /// Requests are handled one at a time, each response written as a single
    /// line and flushed before the next request is read. The writer is shut
    /// down on every exit path.
    ///
    /// # Arguments
    /// * `reader` - Newline-delimited JSON-RPC requests (stdin in production)
    /// * `writer` - Destination for responses (stdout in production)
    ///
    /// # Returns
    /// Ok on end of input; Err only when reading or writing the transport
    /// itself fails.
    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let result = self.serve_lines(reader, &mut writer).await;
        let shutdown = writer.shutdown().await;
        result?;
        shutdown?;
        Ok(())
    }

    async fn serve_lines<R, W>(&self, mut reader: R, writer: &mut W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        // Raw bytes, so a line that is not UTF-8 is answered instead of
        // failing the read.
        let mut buf = Vec::with_capacity(1024);
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                break;
            }
            let line = buf.strip_suffix(b"\n").unwrap_or(&buf[..]);
            let line = line.strip_suffix(b"\r").unwrap_or(line);

            let Some(response) = self.handle_bytes(line) else {
                continue;
            };
            let encoded = encode_response(&response, response.id.clone());
            writer.write_all(&encoded).await?;
            writer.flush().await?;
        }
        info!("input stream closed");
        Ok(())
    }
}

/// Encode a message as a single newline-terminated JSON line.
///
/// If the message cannot be serialized the caller still gets an answer for
/// `id`: an internal error response takes its place.
fn encode_response<T: Serialize>(message: &T, id: Option<Value>) -> Vec<u8> {
    let mut line = serde_json::to_vec(message).unwrap_or_else(|e| {
        error!("error serializing response: {}", e);
        let fallback = MCPResponse::error(
            id,
            INTERNAL_ERROR,
            format!("Failed to serialize response: {}", e),
        );
        serde_json::to_vec(&fallback).unwrap_or_else(|_| {
            br#"{"jsonrpc":"2.0","id":null,"error":{"code":-32603,"message":"Internal error"}}"#
                .to_vec()
        })
    });
    line.push(b'\n');
    line
}

/// Run the MCP server in STDIO mode.
///
/// Reads JSON-RPC requests line-by-line from stdin and writes responses to
/// stdout. All logging goes to stderr to keep the protocol stream clean.
pub async fn run_server_stdio(config: &ServerConfig) -> Result<()> {
    let server = McpServer::new(config, initialize_tools(Arc::new(SystemClock)));

    info!(
        name = %config.server_name,
        version = %config.server_version,
        tools = server.registry.tools.len(),
        "MCP server starting (STDIO mode)"
    );

    let stdin = BufReader::with_capacity(8192, tokio::io::stdin());
    let stdout = BufWriter::with_capacity(8192, tokio::io::stdout());
    server.serve(stdin, stdout).await
}
