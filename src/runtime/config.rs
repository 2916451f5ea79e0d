//! Dispatcher configuration.

use super::snapshot::FORWARDED_KEYS;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// How workers are obtained for each request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeasePolicyKind {
    /// Provision a brand-new worker for every request.
    #[default]
    Fresh,
    /// Reuse idle workers from a bounded per-function pool.
    Pooled,
}

impl FromStr for LeasePolicyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fresh" => Ok(LeasePolicyKind::Fresh),
            "pooled" => Ok(LeasePolicyKind::Pooled),
            other => Err(format!("expected 'fresh' or 'pooled', got '{}'", other)),
        }
    }
}

/// Which platform capability materializes workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlatformKind {
    /// One OS process per worker, code under the functions root.
    #[default]
    Process,
    /// Built-in functions running in-process.
    Local,
}

impl FromStr for PlatformKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "process" => Ok(PlatformKind::Process),
            "local" => Ok(PlatformKind::Local),
            other => Err(format!("expected 'process' or 'local', got '{}'", other)),
        }
    }
}

/// Invalid configuration value.
#[derive(Debug, Clone, Error)]
#[error("invalid value '{value}' for {key}: {reason}")]
pub struct ConfigError {
    pub key: &'static str,
    pub value: String,
    pub reason: String,
}

/// Configuration for the dispatcher server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Directory holding one subdirectory per function.
    pub functions_root: PathBuf,
    /// Optional path prefix in front of function names.
    pub api_prefix: String,
    /// Service name reported by the health endpoint.
    pub service_name: String,
    /// Maximum request body size in bytes.
    pub max_body_size: usize,
    /// Worker lease policy.
    pub lease_policy: LeasePolicyKind,
    /// Idle workers kept per function when pooling.
    pub pool_max_idle: usize,
    /// How long a pooled worker may sit idle before eviction.
    pub pool_idle_timeout: Duration,
    /// Snapshot keys that must be set before any worker is provisioned.
    pub required_env: Vec<String>,
    /// Platform capability used to create workers.
    pub platform: PlatformKind,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            functions_root: PathBuf::from("./functions"),
            api_prefix: "/functions/v1".to_string(),
            service_name: "edge-functions".to_string(),
            max_body_size: 10 * 1024 * 1024, // 10MB
            lease_policy: LeasePolicyKind::Fresh,
            pool_max_idle: 4,
            pool_idle_timeout: Duration::from_secs(30),
            required_env: Vec::new(),
            platform: PlatformKind::Process,
        }
    }
}

impl DispatcherConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Read overrides from `EDGE_*` process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read overrides through an arbitrary lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(host) = lookup("EDGE_HOST") {
            config.host = host;
        }
        if let Some(port) = lookup("EDGE_PORT") {
            config.port = parse("EDGE_PORT", port)?;
        }
        if let Some(root) = lookup("EDGE_FUNCTIONS_ROOT") {
            config.functions_root = PathBuf::from(root);
        }
        if let Some(prefix) = lookup("EDGE_API_PREFIX") {
            config.api_prefix = prefix.trim_end_matches('/').to_string();
        }
        if let Some(name) = lookup("EDGE_SERVICE_NAME") {
            config.service_name = name;
        }
        if let Some(size) = lookup("EDGE_MAX_BODY_SIZE") {
            config.max_body_size = parse("EDGE_MAX_BODY_SIZE", size)?;
        }
        if let Some(policy) = lookup("EDGE_LEASE_POLICY") {
            config.lease_policy = parse("EDGE_LEASE_POLICY", policy)?;
        }
        if let Some(max_idle) = lookup("EDGE_POOL_MAX_IDLE") {
            config.pool_max_idle = parse("EDGE_POOL_MAX_IDLE", max_idle)?;
        }
        if let Some(secs) = lookup("EDGE_POOL_IDLE_TIMEOUT_SECS") {
            config.pool_idle_timeout = Duration::from_secs(parse("EDGE_POOL_IDLE_TIMEOUT_SECS", secs)?);
        }
        if let Some(keys) = lookup("EDGE_REQUIRED_ENV") {
            config.required_env = keys
                .split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(platform) = lookup("EDGE_PLATFORM") {
            config.platform = parse("EDGE_PLATFORM", platform)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check settings that the individual parsers cannot.
    ///
    /// Required keys must be ones the snapshot captures; any other key could
    /// never be set and would fail every request.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(key) = self
            .required_env
            .iter()
            .find(|key| !FORWARDED_KEYS.contains(&key.as_str()))
        {
            return Err(ConfigError {
                key: "EDGE_REQUIRED_ENV",
                value: self.required_env.join(","),
                reason: format!(
                    "'{}' is not one of the forwarded keys ({})",
                    key,
                    FORWARDED_KEYS.join(", ")
                ),
            });
        }
        Ok(())
    }

    /// Set the host address.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the functions root.
    pub fn functions_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.functions_root = root.into();
        self
    }

    /// Set the lease policy.
    pub fn lease_policy(mut self, policy: LeasePolicyKind) -> Self {
        self.lease_policy = policy;
        self
    }

    /// Require a snapshot key before provisioning.
    pub fn require_env(mut self, key: impl Into<String>) -> Self {
        self.required_env.push(key.into());
        self
    }

    /// Get the bind address.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse<T>(key: &'static str, value: String) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let parsed = value.trim().parse::<T>();
    parsed.map_err(|e| ConfigError {
        key,
        reason: e.to_string(),
        value,
    })
}
