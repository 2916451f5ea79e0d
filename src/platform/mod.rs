//! Platform capabilities that materialize isolated execution contexts.
//!
//! The dispatcher never runs function code itself. It hands a
//! [`WorkerSpec`] to a [`WorkerPlatform`], which returns a live [`Worker`]
//! bounded by the requested memory ceiling, or a typed [`PlatformError`].

mod error;
mod local;
mod process;
mod spec;

pub use error::PlatformError;
pub use local::{FunctionFactory, LocalPlatform};
pub use process::{FunctionManifest, ProcessPlatform, MANIFEST_FILE};
pub use spec::WorkerSpec;

use crate::http::{EdgeRequest, EdgeResponse};
use async_trait::async_trait;

/// A hosting capability able to create isolated workers.
#[async_trait]
pub trait WorkerPlatform: Send + Sync {
    /// Materialize a new isolated context for `spec`.
    async fn create(&self, spec: &WorkerSpec) -> Result<Box<dyn Worker>, PlatformError>;

    /// Names of every function this platform can resolve, sorted.
    ///
    /// This is the single source for the function list advertised in
    /// health and error payloads.
    async fn available_functions(&self) -> Vec<String>;
}

/// A live isolated execution context.
#[async_trait]
pub trait Worker: Send {
    /// Hand a request to the worker and wait for its response.
    async fn fetch(
        &mut self,
        request: EdgeRequest,
        request_id: &str,
    ) -> Result<EdgeResponse, PlatformError>;

    /// Whether the worker can serve another request after a successful one.
    fn is_reusable(&self) -> bool {
        false
    }

    /// Tear the context down.
    async fn terminate(self: Box<Self>);
}
