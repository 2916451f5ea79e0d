//! Process-level runtime: configuration, the environment snapshot and the HTTP server.

mod config;
mod server;
mod snapshot;

pub use config::{ConfigError, DispatcherConfig, LeasePolicyKind, PlatformKind};
pub use server::EdgeServer;
pub use snapshot::{ConfigSnapshot, MissingConfiguration, FORWARDED_KEYS};
