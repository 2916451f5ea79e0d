//! Inbound request as seen by the dispatcher and forwarded to workers.

use bytes::Bytes;
use hyper::header::{HeaderName, HeaderValue};
use hyper::{HeaderMap, Method, Uri};
use tracing::warn;

/// A fully buffered HTTP request.
///
/// The dispatcher never rewrites any of these fields: a worker receives the
/// method, URI, header set and raw body exactly as the client sent them.
#[derive(Debug, Clone)]
pub struct EdgeRequest {
    /// HTTP method.
    pub method: Method,
    /// Original request URI, including the query string.
    pub uri: Uri,
    /// All request headers, in arrival order, duplicates preserved.
    pub headers: HeaderMap,
    /// Raw request body.
    pub body: Bytes,
}

impl EdgeRequest {
    /// Create a new request with no headers and an empty body.
    pub fn new(method: Method, uri: Uri) -> Self {
        Self {
            method,
            uri,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Append a header. Invalid names or values are dropped with a warning.
    pub fn header<K, V>(mut self, key: K, value: V) -> Self
    where
        K: TryInto<HeaderName>,
        V: TryInto<HeaderValue>,
    {
        match (key.try_into(), value.try_into()) {
            (Ok(key), Ok(value)) => {
                self.headers.append(key, value);
            }
            _ => warn!("Dropping invalid request header"),
        }
        self
    }

    /// Set the request body.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Request path without the query string.
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    /// Get the body as text if present.
    pub fn text(&self) -> Option<String> {
        if self.body.is_empty() {
            None
        } else {
            Some(String::from_utf8_lossy(&self.body).to_string())
        }
    }

    /// Parse the body as JSON if present.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Option<Result<T, serde_json::Error>> {
        if self.body.is_empty() {
            None
        } else {
            Some(serde_json::from_slice(&self.body))
        }
    }
}

impl Default for EdgeRequest {
    fn default() -> Self {
        Self::new(Method::GET, Uri::from_static("/"))
    }
}
