//! Hands a request to a leased worker and waits for its answer.

use super::lease::WorkerHandle;
use super::provision::ContextProvisioner;
use crate::function::FunctionIdentifier;
use crate::http::{EdgeRequest, EdgeResponse};
use crate::platform::PlatformError;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Failure after a worker was obtained.
#[derive(Debug, Clone, Error)]
pub enum ExecutionError {
    /// The worker did not answer within its execution timeout.
    #[error("function '{function}' timed out after {}ms", timeout.as_millis())]
    Timeout {
        function: FunctionIdentifier,
        timeout: Duration,
    },

    /// The worker errored, crashed or produced an invalid response.
    #[error("function '{function}' failed: {source}")]
    Failed {
        function: FunctionIdentifier,
        source: PlatformError,
    },
}

/// Send `request` to the worker, bounded by the worker's execution timeout.
///
/// On timeout the pending fetch is dropped, so a late result can never
/// reach the caller.
pub async fn invoke(
    handle: &mut WorkerHandle,
    request: EdgeRequest,
    request_id: &str,
) -> Result<EdgeResponse, ExecutionError> {
    let function = handle.function().clone();
    let timeout = handle.spec().timeout;

    match tokio::time::timeout(timeout, handle.worker_mut().fetch(request, request_id)).await {
        Ok(Ok(response)) => Ok(response),
        Ok(Err(source)) => Err(ExecutionError::Failed { function, source }),
        Err(_) => {
            warn!("Function '{}' exceeded {:?} [{}]", function, timeout, request_id);
            Err(ExecutionError::Timeout { function, timeout })
        }
    }
}

/// Invoke the worker and release it afterwards, whatever the outcome.
pub async fn forward(
    provisioner: &ContextProvisioner,
    mut handle: WorkerHandle,
    request: EdgeRequest,
    request_id: &str,
) -> Result<EdgeResponse, ExecutionError> {
    let result = invoke(&mut handle, request, request_id).await;
    provisioner.release(handle, result.is_ok()).await;
    result
}
