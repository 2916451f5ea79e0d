//! # edge-dispatch - path-routed dispatcher for isolated function workers
//!
//! edge-dispatch is a single HTTP entry point that routes each request by
//! path to a named function, provisions an isolated, resource-bounded worker
//! for it and relays the worker's response. Every failure becomes a
//! structured JSON response, and CORS headers are attached to everything.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                        EdgeServer (hyper)                           │
//! └─────────────────────────────────────────────────────────────────────┘
//!                                   │
//!                                   ▼
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                            Dispatcher                               │
//! │   RouteResolver ─▶ ContextProvisioner ─▶ forward ─▶ classify/CORS   │
//! └─────────────────────────────────────────────────────────────────────┘
//!                                   │ WorkerSpec (150 MB, 60 s, env)
//!                                   ▼
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                         WorkerPlatform                              │
//! │  ┌──────────────────────────┐      ┌───────────────────────────┐   │
//! │  │ ProcessPlatform          │      │ LocalPlatform             │   │
//! │  │ child process per worker │      │ EdgeFunction per worker   │   │
//! │  └──────────────────────────┘      └───────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use edge_dispatch::prelude::*;
//! use std::sync::Arc;
//!
//! #[edge_function(name = "hello")]
//! async fn hello(_req: EdgeRequest, _ctx: &FunctionContext) -> Result<EdgeResponse, FunctionError> {
//!     Ok(EdgeResponse::text("Hello!"))
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     let config = DispatcherConfig::from_env()?;
//!     let mut platform = LocalPlatform::new();
//!     platform.register(HelloFunction::NAME, HelloFunction::factory)?;
//!
//!     let dispatcher = Dispatcher::new(
//!         &config,
//!         Arc::new(ConfigSnapshot::capture()),
//!         Arc::new(platform),
//!     );
//!     EdgeServer::new(config, dispatcher).run().await
//! }
//! ```
//!
//! ## Routing
//!
//! - `OPTIONS` on any path answers `200 "ok"` with CORS headers.
//! - `/`, `/health` and the empty path answer the health payload.
//! - `/functions/v1/{name}/...` goes to the worker for `name`.
//! - Anything else is `400 Invalid path`.

pub mod dispatch;
pub mod function;
pub mod http;
pub mod platform;
pub mod runtime;

/// Re-export commonly used types.
pub mod prelude {
    pub use crate::dispatch::Dispatcher;
    pub use crate::function::{EdgeFunction, FunctionContext, FunctionError, FunctionIdentifier};
    pub use crate::http::{EdgeRequest, EdgeResponse, Method, StatusCode, Uri};
    pub use crate::platform::{LocalPlatform, ProcessPlatform, WorkerPlatform};
    pub use crate::runtime::{ConfigSnapshot, DispatcherConfig, EdgeServer};
    pub use async_trait::async_trait;
    pub use edge_macro::edge_function;
}

pub use dispatch::Dispatcher;
pub use edge_macro::edge_function;
pub use function::{EdgeFunction, FunctionContext, FunctionError};
pub use http::{EdgeRequest, EdgeResponse};
pub use runtime::{DispatcherConfig, EdgeServer};
