//! CORS headers and preflight short-circuit.

use crate::http::{EdgeResponse, HeaderMap, Method};
use hyper::header::{
    HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN,
};

pub const ALLOW_ORIGIN: &str = "*";
pub const ALLOW_HEADERS: &str = "authorization, x-client-info, apikey, content-type";
pub const ALLOW_METHODS: &str = "GET, POST, PUT, DELETE, OPTIONS";

/// The dispatcher's CORS header set.
pub fn cors_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static(ALLOW_ORIGIN));
    headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static(ALLOW_HEADERS));
    headers.insert(ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static(ALLOW_METHODS));
    headers
}

pub fn is_preflight(method: &Method) -> bool {
    *method == Method::OPTIONS
}

/// Fixed answer to any preflight request.
pub fn preflight_response() -> EdgeResponse {
    let mut response = EdgeResponse::ok().body("ok");
    response.headers = cors_headers();
    response
}

/// Merge the CORS set into `response` without overriding values it already has.
pub fn apply(response: &mut EdgeResponse) {
    response.merge_missing_headers(&cors_headers());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preflight_is_plain_ok() {
        let response = preflight_response();
        assert_eq!(response.status, 200);
        assert_eq!(response.text_body(), "ok");
        assert_eq!(response.headers.len(), 3);
        assert_eq!(response.content_type(), None);
    }

    #[test]
    fn test_apply_respects_worker_headers() {
        let mut response = EdgeResponse::text("hi").header("access-control-allow-origin", "https://app.dev");
        apply(&mut response);

        assert_eq!(response.headers.get(ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(), "https://app.dev");
        assert_eq!(response.headers.get(ACCESS_CONTROL_ALLOW_METHODS).unwrap(), ALLOW_METHODS);
        assert_eq!(response.content_type(), Some("text/plain"));
    }
}
