//! Failure taxonomy and its externally visible responses.

use super::forward::ExecutionError;
use super::provision::ProvisionError;
use crate::function::FunctionIdentifier;
use crate::http::{EdgeResponse, StatusCode};
use crate::runtime::MissingConfiguration;
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

const NOT_FOUND_HINT: &str =
    "Create a new function by adding a directory under the functions root with a function.json manifest";

/// Every way a request can fail at the dispatcher boundary.
#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    #[error("invalid path '{path}'")]
    InvalidRoute { path: String },

    #[error("{missing}")]
    ConfigurationMissing {
        function: Option<FunctionIdentifier>,
        missing: MissingConfiguration,
    },

    #[error("function '{function}' not found")]
    NotFound { function: FunctionIdentifier },

    #[error("function '{function}' failed: {details}")]
    ExecutionFailure {
        function: FunctionIdentifier,
        details: String,
    },

    #[error("request body exceeds {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("failed to read request body: {details}")]
    BodyRead { details: String },
}

impl DispatchError {
    pub fn status(&self) -> StatusCode {
        match self {
            DispatchError::InvalidRoute { .. } => StatusCode::BAD_REQUEST,
            DispatchError::ConfigurationMissing { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            DispatchError::NotFound { .. } => StatusCode::NOT_FOUND,
            DispatchError::ExecutionFailure { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            DispatchError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            DispatchError::BodyRead { .. } => StatusCode::BAD_REQUEST,
        }
    }
}

impl From<ProvisionError> for DispatchError {
    fn from(err: ProvisionError) -> Self {
        match err {
            ProvisionError::NotFound { function, .. } => DispatchError::NotFound { function },
            ProvisionError::ConfigurationMissing { function, missing } => {
                DispatchError::ConfigurationMissing {
                    function: Some(function),
                    missing,
                }
            }
            ProvisionError::Timeout { function, timeout } => DispatchError::ExecutionFailure {
                function,
                details: format!("worker startup timed out after {}ms", timeout.as_millis()),
            },
            ProvisionError::Failed { function, source } => DispatchError::ExecutionFailure {
                function,
                details: source.to_string(),
            },
        }
    }
}

impl From<ExecutionError> for DispatchError {
    fn from(err: ExecutionError) -> Self {
        let details = match &err {
            ExecutionError::Timeout { timeout, .. } => {
                format!("worker timed out after {}ms", timeout.as_millis())
            }
            ExecutionError::Failed { source, .. } => source.to_string(),
        };
        let function = match err {
            ExecutionError::Timeout { function, .. } | ExecutionError::Failed { function, .. } => {
                function
            }
        };
        DispatchError::ExecutionFailure { function, details }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidRoutePayload {
    pub error: String,
    pub path: String,
    pub hint: String,
    pub available_functions: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotFoundPayload {
    pub error: String,
    pub available_functions: Vec<String>,
    pub hint: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionFailurePayload {
    pub error: String,
    pub function: String,
    pub details: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfigurationMissingPayload {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    /// `"set"` or `"missing"` per required key.
    #[serde(flatten)]
    pub keys: BTreeMap<String, &'static str>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PayloadTooLargePayload {
    pub error: String,
    pub limit: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct BodyReadPayload {
    pub error: String,
    pub details: String,
}

/// Body of a dispatcher-generated error response.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ErrorPayload {
    InvalidRoute(InvalidRoutePayload),
    ConfigurationMissing(ConfigurationMissingPayload),
    NotFound(NotFoundPayload),
    ExecutionFailure(ExecutionFailurePayload),
    PayloadTooLarge(PayloadTooLargePayload),
    BodyRead(BodyReadPayload),
}

/// Map an error to its status and payload.
///
/// `available_functions` and `api_prefix` give callers enough context to
/// correct the request without reading server logs.
pub fn classify(
    error: &DispatchError,
    available_functions: Vec<String>,
    api_prefix: &str,
) -> (StatusCode, ErrorPayload) {
    let payload = match error {
        DispatchError::InvalidRoute { path } => ErrorPayload::InvalidRoute(InvalidRoutePayload {
            error: "Invalid path".to_string(),
            path: path.clone(),
            hint: format!("Use {}/{{function-name}}", api_prefix),
            available_functions,
        }),
        DispatchError::ConfigurationMissing { function, missing } => {
            ErrorPayload::ConfigurationMissing(ConfigurationMissingPayload {
                error: "Configuration missing".to_string(),
                function: function.as_ref().map(ToString::to_string),
                keys: missing
                    .presence
                    .iter()
                    .map(|(key, set)| (key.clone(), if *set { "set" } else { "missing" }))
                    .collect(),
            })
        }
        DispatchError::NotFound { function } => ErrorPayload::NotFound(NotFoundPayload {
            error: format!("Function '{}' not found", function),
            available_functions,
            hint: NOT_FOUND_HINT.to_string(),
        }),
        DispatchError::ExecutionFailure { function, details } => {
            ErrorPayload::ExecutionFailure(ExecutionFailurePayload {
                error: "Function execution failed".to_string(),
                function: function.to_string(),
                details: details.clone(),
            })
        }
        DispatchError::PayloadTooLarge { limit } => {
            ErrorPayload::PayloadTooLarge(PayloadTooLargePayload {
                error: "Request body too large".to_string(),
                limit: *limit,
            })
        }
        DispatchError::BodyRead { details } => ErrorPayload::BodyRead(BodyReadPayload {
            error: "Failed to read request body".to_string(),
            details: details.clone(),
        }),
    };
    (error.status(), payload)
}

/// Render a classified failure as a JSON response.
pub fn error_response(status: StatusCode, payload: &ErrorPayload) -> EdgeResponse {
    match EdgeResponse::json(payload) {
        Ok(response) => response.with_status(status),
        Err(_) => EdgeResponse::text("internal error").with_status(StatusCode::INTERNAL_SERVER_ERROR),
    }
}
