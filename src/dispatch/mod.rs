//! The request dispatcher.
//!
//! Every request flows through the same pipeline:
//!
//! ```text
//! preflight? ──yes──▶ 200 "ok"
//!     │no
//!     ▼
//! RouteResolver ──Health──▶ health payload
//!     │ Invalid ─────────▶ 400
//!     ▼ Function(name)
//! ContextProvisioner ──▶ forward() ──▶ worker response
//!     └──── errors ─────▶ classify() ──▶ 404 / 500
//! ```
//!
//! Each request produces exactly one response, and CORS headers are merged
//! into all of them.

pub mod classify;
pub mod cors;
pub mod forward;
pub mod health;
pub mod lease;
pub mod provision;
pub mod route;

pub use classify::{classify, DispatchError, ErrorPayload};
pub use forward::{forward, ExecutionError};
pub use lease::{FreshLeases, LeasePolicy, PooledLeases, WorkerHandle};
pub use provision::{ContextProvisioner, ProvisionError, ResourcePolicy, MEMORY_LIMIT_MB, WORKER_TIMEOUT};
pub use route::{resolve, RouteDecision, RouteResolver};

use crate::function::FunctionIdentifier;
use crate::http::{EdgeRequest, EdgeResponse};
use crate::platform::WorkerPlatform;
use crate::runtime::{ConfigSnapshot, DispatcherConfig, LeasePolicyKind};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Routes requests to isolated workers and turns every failure into a
/// structured response.
pub struct Dispatcher {
    resolver: RouteResolver,
    provisioner: ContextProvisioner,
    platform: Arc<dyn WorkerPlatform>,
    service_name: String,
}

impl Dispatcher {
    /// Build a dispatcher from configuration.
    pub fn new(
        config: &DispatcherConfig,
        snapshot: Arc<ConfigSnapshot>,
        platform: Arc<dyn WorkerPlatform>,
    ) -> Self {
        let leases: Arc<dyn LeasePolicy> = match config.lease_policy {
            LeasePolicyKind::Fresh => Arc::new(FreshLeases::new(platform.clone())),
            LeasePolicyKind::Pooled => Arc::new(PooledLeases::new(
                platform.clone(),
                config.pool_max_idle,
                config.pool_idle_timeout,
            )),
        };

        let provisioner = ContextProvisioner::new(&config.functions_root, snapshot, leases)
            .with_required_env(config.required_env.clone());

        Self::from_parts(
            RouteResolver::new(config.api_prefix.clone()),
            provisioner,
            platform,
            config.service_name.clone(),
        )
    }

    /// Assemble a dispatcher from already-built components.
    pub fn from_parts(
        resolver: RouteResolver,
        provisioner: ContextProvisioner,
        platform: Arc<dyn WorkerPlatform>,
        service_name: impl Into<String>,
    ) -> Self {
        Self {
            resolver,
            provisioner,
            platform,
            service_name: service_name.into(),
        }
    }

    pub fn provisioner(&self) -> &ContextProvisioner {
        &self.provisioner
    }

    /// Function names advertised to callers.
    pub async fn available_functions(&self) -> Vec<String> {
        self.platform.available_functions().await
    }

    /// Drop pooled workers that have been idle too long.
    pub async fn evict_idle(&self) -> usize {
        self.provisioner.leases().evict_idle().await
    }

    /// Produce the single response for `request`.
    pub async fn dispatch(&self, request: EdgeRequest, request_id: &str) -> EdgeResponse {
        if cors::is_preflight(&request.method) {
            return cors::preflight_response();
        }

        let mut response = match self.resolver.resolve(request.path()) {
            RouteDecision::Health => {
                health::health_response(&self.service_name, self.available_functions().await)
            }
            RouteDecision::Invalid(path) => self.failure(DispatchError::InvalidRoute { path }).await,
            RouteDecision::Function(name) => {
                match self.run_function(&name, request, request_id).await {
                    Ok(response) => response,
                    Err(e) => self.failure(e).await,
                }
            }
        };

        cors::apply(&mut response);
        response
    }

    async fn run_function(
        &self,
        name: &FunctionIdentifier,
        request: EdgeRequest,
        request_id: &str,
    ) -> Result<EdgeResponse, DispatchError> {
        debug!("Dispatching {} {} to '{}' [{}]", request.method, request.uri, name, request_id);

        let handle = self.provisioner.provision(name).await?;
        let response = forward(&self.provisioner, handle, request, request_id).await?;
        Ok(response)
    }

    /// Render a failure as a JSON response with CORS headers.
    pub async fn failure(&self, error: DispatchError) -> EdgeResponse {
        match &error {
            DispatchError::ExecutionFailure { .. } | DispatchError::ConfigurationMissing { .. } => {
                error!("{}", error)
            }
            _ => warn!("{}", error),
        }

        let available = match error {
            DispatchError::InvalidRoute { .. } | DispatchError::NotFound { .. } => {
                self.available_functions().await
            }
            _ => Vec::new(),
        };
        let (status, payload) = classify(&error, available, self.resolver.prefix());

        let mut response = classify::error_response(status, &payload);
        cors::apply(&mut response);
        response
    }
}

/// Current time as an RFC 3339 UTC timestamp with millisecond precision.
pub(crate) fn timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
