//! Environment values captured once per process and forwarded to workers.

use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Keys copied from the snapshot into every worker's environment, in order.
pub const FORWARDED_KEYS: [&str; 5] = [
    "SUPABASE_URL",
    "SUPABASE_ANON_KEY",
    "SUPABASE_SERVICE_ROLE_KEY",
    "SUPABASE_DB_URL",
    "JWT_SECRET",
];

/// Read-only configuration captured at process start.
///
/// Values are secrets, so `Debug` only reports which keys are set.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ConfigSnapshot {
    values: BTreeMap<String, String>,
}

impl ConfigSnapshot {
    /// Capture the forwarded keys from the process environment.
    pub fn capture() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Capture the forwarded keys through an arbitrary lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let values = FORWARDED_KEYS
            .iter()
            .filter_map(|key| lookup(key).map(|value| (key.to_string(), value)))
            .collect();
        Self { values }
    }

    /// Build a snapshot from explicit pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Get a captured value.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Whether `key` holds a non-empty value.
    pub fn is_set(&self, key: &str) -> bool {
        self.get(key).is_some_and(|v| !v.is_empty())
    }

    /// Environment list for a worker: every forwarded key, unset ones as `""`.
    pub fn worker_env(&self) -> Vec<(String, String)> {
        FORWARDED_KEYS
            .iter()
            .map(|key| (key.to_string(), self.get(key).unwrap_or_default().to_string()))
            .collect()
    }

    /// Check that every key in `required` is set.
    pub fn require(&self, required: &[String]) -> Result<(), MissingConfiguration> {
        let presence: Vec<(String, bool)> = required
            .iter()
            .map(|key| (key.clone(), self.is_set(key)))
            .collect();

        if presence.iter().all(|(_, set)| *set) {
            Ok(())
        } else {
            Err(MissingConfiguration { presence })
        }
    }
}

impl fmt::Debug for ConfigSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set()
            .entries(self.values.keys().filter(|k| self.is_set(k)))
            .finish()
    }
}

/// Required configuration keys, with whether each one is set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("missing required configuration: {}", missing_keys(.presence))]
pub struct MissingConfiguration {
    pub presence: Vec<(String, bool)>,
}

impl MissingConfiguration {
    /// Keys that are not set.
    pub fn missing(&self) -> impl Iterator<Item = &str> {
        self.presence
            .iter()
            .filter(|(_, set)| !set)
            .map(|(key, _)| key.as_str())
    }
}

fn missing_keys(presence: &[(String, bool)]) -> String {
    presence
        .iter()
        .filter(|(_, set)| !set)
        .map(|(key, _)| key.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
