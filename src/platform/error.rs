//! Typed failures reported by platform capabilities.

use thiserror::Error;

/// Error raised while creating or running a worker.
#[derive(Debug, Clone, Error)]
pub enum PlatformError {
    /// The code location for the function does not exist.
    #[error("code location not found: {0}")]
    CodeNotFound(String),

    /// The worker spec or the function's manifest is unusable.
    #[error("invalid worker spec: {0}")]
    InvalidSpec(String),

    /// The platform could not grant the requested resources.
    #[error("resource limit exceeded: {0}")]
    ResourceExhausted(String),

    /// The worker exited without producing a response.
    #[error("worker exited with {status}: {stderr}")]
    Crashed { status: String, stderr: String },

    /// The worker produced bytes that are not a valid response.
    #[error("malformed worker response: {0}")]
    MalformedResponse(String),

    /// The function body reported an error.
    #[error("function error: {0}")]
    FunctionFailed(String),

    #[error("platform error: {0}")]
    Internal(String),
}

impl PlatformError {
    /// Whether this error means the function's code location is absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, PlatformError::CodeNotFound(_))
    }

    /// Translate a free-text platform message into a typed error.
    ///
    /// Only for capabilities that cannot report structured errors. The
    /// markers below are what such platforms emit for a missing code
    /// location; revalidate them when integrating a new capability.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.contains("not found") || message.contains("ENOENT") {
            PlatformError::CodeNotFound(message)
        } else {
            PlatformError::Internal(message)
        }
    }

    /// Translate an I/O error touching `location`.
    pub fn from_io(err: &std::io::Error, location: &std::path::Path) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => PlatformError::CodeNotFound(location.display().to_string()),
            std::io::ErrorKind::OutOfMemory | std::io::ErrorKind::WouldBlock => {
                PlatformError::ResourceExhausted(err.to_string())
            }
            _ => PlatformError::Internal(format!("{}: {}", location.display(), err)),
        }
    }
}
