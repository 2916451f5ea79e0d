//! Process worker that greets the caller.
//!
//! Build it, then point `functions/hello/function.json` at the binary.

use edge_wire::{WireHeader, WireRequest, WireResponse};
use serde::Deserialize;

#[derive(Default, Deserialize)]
struct Greeting {
    name: Option<String>,
}

fn greet(req: WireRequest) -> WireResponse {
    let greeting: Greeting = serde_json::from_slice(&req.body).unwrap_or_default();
    let name = greeting
        .name
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "World".to_string());

    let configured = |key: &str| match std::env::var(key) {
        Ok(v) if !v.is_empty() => "configured",
        _ => "not set",
    };

    let body = serde_json::json!({
        "message": format!("Hello {}!", name),
        "function": "hello",
        "requestId": req.meta.as_ref().and_then(|m| m.request_id.clone()),
        "environment": {
            "supabaseUrl": configured("SUPABASE_URL"),
            "jwtSecret": configured("JWT_SECRET"),
        },
    });

    WireResponse::new(
        200,
        vec![WireHeader::new("content-type", "application/json")],
        body.to_string(),
    )
}

fn main() {
    if let Err(e) = edge_wire::serve_stdio(greet) {
        eprintln!("hello-worker: {}", e);
        std::process::exit(1);
    }
}
