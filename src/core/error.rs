/// Error Types
///
/// `ToolError` covers failures inside a single tool invocation and is reported
/// back to the client as a tool result with `isError: true`. `ServerError`
/// covers transport failures, which end the serve loop.

use thiserror::Error;

/// Failure of a single tool invocation.
#[derive(Error, Debug)]
pub enum ToolError {
    /// The system clock could not produce a usable time.
    #[error("clock unavailable: {0}")]
    Clock(String),

    /// The handler panicked while running.
    #[error("tool '{0}' panicked: {1}")]
    Panicked(String, String),
}

/// Failure of the server transport.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ServerError>;
