//! Builds worker specs and obtains workers for routed requests.

use super::lease::{LeasePolicy, WorkerHandle};
use crate::function::FunctionIdentifier;
use crate::platform::{PlatformError, WorkerSpec};
use crate::runtime::{ConfigSnapshot, MissingConfiguration};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Memory ceiling granted to every worker.
pub const MEMORY_LIMIT_MB: u64 = 150;

/// Upper bound on one forwarded request.
pub const WORKER_TIMEOUT: Duration = Duration::from_secs(60);

/// Resource ceilings applied to every worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourcePolicy {
    pub memory_limit_mb: u64,
    pub timeout: Duration,
}

impl Default for ResourcePolicy {
    fn default() -> Self {
        Self {
            memory_limit_mb: MEMORY_LIMIT_MB,
            timeout: WORKER_TIMEOUT,
        }
    }
}

/// Failure to obtain a worker.
#[derive(Debug, Clone, Error)]
pub enum ProvisionError {
    /// The function's code location does not exist.
    #[error("function '{function}' not found: {source}")]
    NotFound {
        function: FunctionIdentifier,
        source: PlatformError,
    },

    /// Required configuration is absent from the snapshot.
    #[error("cannot provision '{function}': {missing}")]
    ConfigurationMissing {
        function: FunctionIdentifier,
        missing: MissingConfiguration,
    },

    /// The platform did not produce a worker within the execution timeout.
    #[error("provisioning '{function}' timed out after {}ms", timeout.as_millis())]
    Timeout {
        function: FunctionIdentifier,
        timeout: Duration,
    },

    /// Any other platform failure.
    #[error("failed to provision '{function}': {source}")]
    Failed {
        function: FunctionIdentifier,
        source: PlatformError,
    },
}

impl ProvisionError {
    /// Split a platform error into the not-found and failure classes.
    pub fn from_platform(function: &FunctionIdentifier, source: PlatformError) -> Self {
        let function = function.clone();
        if source.is_not_found() {
            ProvisionError::NotFound { function, source }
        } else {
            ProvisionError::Failed { function, source }
        }
    }
}

/// Turns a function name into a live, resource-bounded worker.
///
/// Ceilings come from the provisioner's [`ResourcePolicy`], never from the
/// request, and the environment is always the full forwarded key set.
pub struct ContextProvisioner {
    functions_root: PathBuf,
    snapshot: Arc<ConfigSnapshot>,
    required_env: Vec<String>,
    resources: ResourcePolicy,
    leases: Arc<dyn LeasePolicy>,
}

impl ContextProvisioner {
    pub fn new(
        functions_root: impl Into<PathBuf>,
        snapshot: Arc<ConfigSnapshot>,
        leases: Arc<dyn LeasePolicy>,
    ) -> Self {
        Self {
            functions_root: functions_root.into(),
            snapshot,
            required_env: Vec::new(),
            resources: ResourcePolicy::default(),
            leases,
        }
    }

    /// Replace the resource ceilings applied to every worker.
    pub fn with_resources(mut self, resources: ResourcePolicy) -> Self {
        self.resources = resources;
        self
    }

    /// Snapshot keys that must be set before any worker is provisioned.
    pub fn with_required_env(mut self, keys: Vec<String>) -> Self {
        self.required_env = keys;
        self
    }

    pub fn resources(&self) -> ResourcePolicy {
        self.resources
    }

    pub fn leases(&self) -> &Arc<dyn LeasePolicy> {
        &self.leases
    }

    /// Code location for `name`: one directory per function.
    pub fn code_location(&self, name: &FunctionIdentifier) -> PathBuf {
        self.functions_root.join(name.as_str())
    }

    /// Build the provisioning request for `name`.
    pub fn build_spec(&self, name: &FunctionIdentifier) -> WorkerSpec {
        WorkerSpec {
            function: name.clone(),
            service_path: self.code_location(name),
            memory_limit_mb: self.resources.memory_limit_mb,
            timeout: self.resources.timeout,
            env_vars: self.snapshot.worker_env(),
            no_module_cache: false,
            import_map_path: None,
        }
    }

    /// Obtain a worker for `name`, bounded by the execution timeout.
    pub async fn provision(&self, name: &FunctionIdentifier) -> Result<WorkerHandle, ProvisionError> {
        self.snapshot
            .require(&self.required_env)
            .map_err(|missing| ProvisionError::ConfigurationMissing {
                function: name.clone(),
                missing,
            })?;

        let spec = self.build_spec(name);
        debug!(
            "Provisioning '{}' at {} ({} MB, {:?})",
            name,
            spec.service_path.display(),
            spec.memory_limit_mb,
            spec.timeout
        );

        let timeout = self.resources.timeout;
        match tokio::time::timeout(timeout, self.leases.acquire(spec)).await {
            Ok(acquired) => acquired.map_err(|e| ProvisionError::from_platform(name, e)),
            Err(_) => {
                warn!("Provisioning '{}' exceeded {:?}", name, timeout);
                Err(ProvisionError::Timeout {
                    function: name.clone(),
                    timeout,
                })
            }
        }
    }

    /// Hand a worker back to the lease policy.
    pub async fn release(&self, handle: WorkerHandle, healthy: bool) {
        self.leases.release(handle, healthy).await;
    }
}
