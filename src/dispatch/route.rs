//! Path-based route resolution.

use crate::function::FunctionIdentifier;

/// Default API-version prefix accepted in front of function names.
pub const DEFAULT_API_PREFIX: &str = "/functions/v1";

/// Where a request goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    /// Liveness probe.
    Health,
    /// Forward to the named function.
    Function(FunctionIdentifier),
    /// Unroutable; carries the original path.
    Invalid(String),
}

/// Maps request paths to [`RouteDecision`]s.
///
/// Accepted shapes are `{prefix}/{name}[/...]` and `/{name}[/...]`; only the
/// first segment after the optional prefix is significant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteResolver {
    prefix: String,
}

impl RouteResolver {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn resolve(&self, path: &str) -> RouteDecision {
        if matches!(path, "" | "/" | "/health") {
            return RouteDecision::Health;
        }

        // The prefix only counts when it ends on a segment boundary.
        let rest = match path.strip_prefix(self.prefix.as_str()) {
            Some(rest) if rest.is_empty() || rest.starts_with('/') => rest,
            _ => path,
        };

        let segment = rest
            .strip_prefix('/')
            .and_then(|r| r.split('/').next())
            .unwrap_or_default();

        match FunctionIdentifier::parse(segment) {
            Ok(name) => RouteDecision::Function(name),
            Err(_) => RouteDecision::Invalid(path.to_string()),
        }
    }
}

impl Default for RouteResolver {
    fn default() -> Self {
        Self::new(DEFAULT_API_PREFIX)
    }
}

/// Resolve `path` with the default prefix.
pub fn resolve(path: &str) -> RouteDecision {
    RouteResolver::default().resolve(path)
}
