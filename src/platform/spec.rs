//! Provisioning request handed to a platform.

use crate::function::FunctionIdentifier;
use std::path::PathBuf;
use std::time::Duration;

/// Everything a platform needs to build one isolated worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSpec {
    /// Function this worker runs.
    pub function: FunctionIdentifier,
    /// Directory holding the function's code.
    pub service_path: PathBuf,
    /// Memory ceiling in megabytes.
    pub memory_limit_mb: u64,
    /// Upper bound on a single forwarded request.
    pub timeout: Duration,
    /// Environment visible inside the worker, in order.
    pub env_vars: Vec<(String, String)>,
    /// Disable any module cache the platform keeps for this code location.
    pub no_module_cache: bool,
    /// Optional import map for platforms that resolve modules.
    pub import_map_path: Option<PathBuf>,
}

impl WorkerSpec {
    /// Memory ceiling in bytes.
    pub fn memory_limit_bytes(&self) -> u64 {
        self.memory_limit_mb.saturating_mul(1024 * 1024)
    }

    /// Look up an environment entry.
    pub fn env(&self, key: &str) -> Option<&str> {
        self.env_vars
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}
