/// Server Configuration
///
/// Configuration comes from environment variables, each optional:
/// - SERVER_NAME: Name reported in `serverInfo` (default: "date")
/// - SERVER_VERSION: Version reported in `serverInfo` (default: crate version)
/// - RUST_LOG: Log filter directives (default: "info")

pub const DEFAULT_SERVER_NAME: &str = "date";
pub const DEFAULT_SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Server metadata and logging settings resolved at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Server name as reported in MCP initialize responses
    pub server_name: String,
    /// Server version string as reported in MCP initialize responses
    pub server_version: String,
    /// `tracing_subscriber::EnvFilter` directives
    pub log_filter: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_name: DEFAULT_SERVER_NAME.to_string(),
            server_version: DEFAULT_SERVER_VERSION.to_string(),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    ///
    /// Empty values are treated as unset so that `SERVER_NAME=` does not
    /// produce a nameless server.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        Self {
            server_name: get("SERVER_NAME", DEFAULT_SERVER_NAME),
            server_version: get("SERVER_VERSION", DEFAULT_SERVER_VERSION),
            log_filter: get("RUST_LOG", DEFAULT_LOG_FILTER),
        }
    }
}
