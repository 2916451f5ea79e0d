//! HTTP listener in front of the dispatcher.

use crate::dispatch::{cors, DispatchError, Dispatcher};
use crate::http::{EdgeRequest, EdgeResponse};
use crate::runtime::{DispatcherConfig, LeasePolicyKind};
use bytes::Bytes;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::header::HeaderValue;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

/// Single-listener HTTP server that hands every request to a [`Dispatcher`].
pub struct EdgeServer {
    /// Server configuration.
    config: DispatcherConfig,
    /// Shared dispatcher.
    dispatcher: Arc<Dispatcher>,
}

impl EdgeServer {
    /// Create a new server.
    pub fn new(config: DispatcherConfig, dispatcher: Dispatcher) -> Self {
        Self {
            config,
            dispatcher: Arc::new(dispatcher),
        }
    }

    /// Accept connections until Ctrl-C.
    pub async fn run(self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let addr: SocketAddr = self.config.bind_addr().parse()?;
        let listener = TcpListener::bind(addr).await?;

        info!("Edge dispatcher listening on {}", addr);

        if self.config.lease_policy == LeasePolicyKind::Pooled {
            spawn_idle_sweeper(self.dispatcher.clone(), self.config.pool_idle_timeout);
        }

        let max_body_size = self.config.max_body_size;
        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        loop {
            let (stream, remote_addr) = tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!("Failed to accept connection: {}", e);
                        continue;
                    }
                },
                _ = &mut shutdown => {
                    info!("Shutdown signal received, stopping listener");
                    return Ok(());
                }
            };
            let io = TokioIo::new(stream);
            let dispatcher = self.dispatcher.clone();

            tokio::task::spawn(async move {
                let service = service_fn(move |req| {
                    let dispatcher = dispatcher.clone();
                    async move { handle_request(req, dispatcher, max_body_size, remote_addr).await }
                });

                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    error!("Error serving connection: {:?}", err);
                }
            });
        }
    }
}

fn spawn_idle_sweeper(dispatcher: Arc<Dispatcher>, idle_timeout: Duration) {
    let period = idle_timeout.max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            dispatcher.evict_idle().await;
        }
    });
}

/// Handle an incoming HTTP request.
async fn handle_request(
    req: Request<Incoming>,
    dispatcher: Arc<Dispatcher>,
    max_body_size: usize,
    remote_addr: SocketAddr,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let request_id = generate_request_id();

    debug!(
        "Handling request: {} {} from {} [{}]",
        req.method(),
        req.uri().path(),
        remote_addr,
        request_id
    );

    let response = match convert_request(req, max_body_size).await {
        Ok(request) => dispatcher.dispatch(request, &request_id).await,
        Err(e) => dispatcher.failure(e).await,
    };

    Ok(build_response(response, &request_id))
}

/// Buffer a hyper request into an [`EdgeRequest`].
///
/// Preflight bodies are never read: the preflight answer must not depend
/// on anything but the method.
async fn convert_request(
    req: Request<Incoming>,
    max_body_size: usize,
) -> Result<EdgeRequest, DispatchError> {
    let (parts, body) = req.into_parts();

    let body = if cors::is_preflight(&parts.method) {
        Bytes::new()
    } else {
        match Limited::new(body, max_body_size).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
                return Err(DispatchError::PayloadTooLarge {
                    limit: max_body_size,
                });
            }
            Err(e) => {
                return Err(DispatchError::BodyRead {
                    details: e.to_string(),
                });
            }
        }
    };

    Ok(EdgeRequest {
        method: parts.method,
        uri: parts.uri,
        headers: parts.headers,
        body,
    })
}

/// Build a hyper Response from an EdgeResponse.
fn build_response(response: EdgeResponse, request_id: &str) -> Response<Full<Bytes>> {
    let mut http_response = Response::new(Full::new(response.body));
    *http_response.status_mut() = response.status;
    *http_response.headers_mut() = response.headers;

    if let Ok(value) = HeaderValue::from_str(request_id) {
        http_response
            .headers_mut()
            .entry("x-request-id")
            .or_insert(value);
    }
    http_response
}

/// Generate a unique request ID.
fn generate_request_id() -> String {
    static SEQUENCE: AtomicU64 = AtomicU64::new(0);
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let sequence = SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("{:x}-{:x}", timestamp, sequence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::StatusCode;

    #[test]
    fn test_build_response_keeps_worker_request_id() {
        let response = EdgeResponse::text("hi")
            .with_status(StatusCode::CREATED)
            .header("x-request-id", "from-worker");
        let http_response = build_response(response, "abc-1");

        assert_eq!(http_response.status(), StatusCode::CREATED);
        assert_eq!(http_response.headers()["x-request-id"], "from-worker");
    }

    #[test]
    fn test_build_response_adds_request_id() {
        let http_response = build_response(EdgeResponse::ok(), "abc-2");
        assert_eq!(http_response.headers()["x-request-id"], "abc-2");
    }

    #[test]
    fn test_request_ids_are_unique() {
        assert_ne!(generate_request_id(), generate_request_id());
    }
}
