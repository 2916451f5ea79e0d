//! Health endpoint payload.

use crate::http::EdgeResponse;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthPayload {
    pub status: &'static str,
    pub service: String,
    pub version: &'static str,
    pub timestamp: String,
    pub available_functions: Vec<String>,
}

impl HealthPayload {
    pub fn new(service: impl Into<String>, available_functions: Vec<String>) -> Self {
        Self {
            status: "ok",
            service: service.into(),
            version: env!("CARGO_PKG_VERSION"),
            timestamp: super::timestamp(),
            available_functions,
        }
    }
}

pub fn health_response(service: &str, available_functions: Vec<String>) -> EdgeResponse {
    let payload = HealthPayload::new(service, available_functions);
    EdgeResponse::json(&payload).unwrap_or_else(|_| EdgeResponse::text("ok"))
}
