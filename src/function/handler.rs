//! Edge function handler trait and context.

use crate::http::{EdgeRequest, EdgeResponse, StatusCode};
use async_trait::async_trait;
use thiserror::Error;

/// Execution context handed to an in-process function.
///
/// The environment is exactly the list a worker was provisioned with; a
/// function never sees the dispatcher's own process environment.
#[derive(Debug, Clone, Default)]
pub struct FunctionContext {
    /// Environment variables, in provisioning order.
    pub env: Vec<(String, String)>,
    /// Function name.
    pub function_name: String,
    /// Request ID for tracing.
    pub request_id: String,
}

impl FunctionContext {
    /// Create a new function context.
    pub fn new(function_name: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self {
            env: Vec::new(),
            function_name: function_name.into(),
            request_id: request_id.into(),
        }
    }

    /// Add an environment variable.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Get an environment variable. Empty values count as unset.
    pub fn get_env(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .filter(|v| !v.is_empty())
    }
}

/// Trait implemented by functions that run inside a [`LocalPlatform`] worker.
///
/// Each worker owns a fresh instance: `on_load` runs when the worker is
/// created, `fetch` once per forwarded request and `on_unload` when the
/// worker is released.
///
/// [`LocalPlatform`]: crate::platform::LocalPlatform
#[async_trait]
pub trait EdgeFunction: Send + Sync {
    /// Called when the worker hosting this function is created.
    async fn on_load(&mut self, ctx: &FunctionContext) -> Result<(), FunctionError> {
        let _ = ctx;
        Ok(())
    }

    /// Handle a forwarded HTTP request.
    async fn fetch(
        &self,
        request: EdgeRequest,
        ctx: &FunctionContext,
    ) -> Result<EdgeResponse, FunctionError>;

    /// Called when the worker is released.
    async fn on_unload(&mut self, ctx: &FunctionContext) -> Result<(), FunctionError> {
        let _ = ctx;
        Ok(())
    }

    /// Get the function name.
    fn name(&self) -> &str;
}

/// Error raised by a function body.
#[derive(Debug, Clone, Error)]
#[error("[{code}] {message}")]
pub struct FunctionError {
    /// Error message.
    pub message: String,
    /// HTTP status the function would like to report.
    pub code: u16,
}

impl FunctionError {
    /// Create a new FunctionError.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: 500,
        }
    }

    /// Create a FunctionError with a specific code.
    pub fn with_code(code: u16, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code,
        }
    }

    /// Create a bad request error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::with_code(400, message)
    }
}

impl From<FunctionError> for EdgeResponse {
    fn from(err: FunctionError) -> Self {
        let status = StatusCode::from_u16(err.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        EdgeResponse::json(&serde_json::json!({ "error": err.message }))
            .unwrap_or_default()
            .with_status(status)
    }
}

impl From<std::io::Error> for FunctionError {
    fn from(err: std::io::Error) -> Self {
        FunctionError::new(err.to_string())
    }
}

impl From<serde_json::Error> for FunctionError {
    fn from(err: serde_json::Error) -> Self {
        FunctionError::bad_request(err.to_string())
    }
}
