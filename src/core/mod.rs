/// Core Server Framework Module
///
/// - config.rs: Environment-based server configuration
/// - error.rs: Tool and transport error types
/// - server.rs: MCP server implementation with STDIO transport

pub mod config;
pub mod error;
pub mod server;
