//! Reference functions served in-process when `EDGE_PLATFORM=local`.

use edge_dispatch::platform::PlatformError;
use edge_dispatch::prelude::*;
use serde::Deserialize;
use serde_json::{json, Map, Value};

fn configured(ctx: &FunctionContext, key: &str) -> &'static str {
    if ctx.get_env(key).is_some() {
        "configured"
    } else {
        "not set"
    }
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

#[derive(Debug, Default, Deserialize)]
struct Greeting {
    #[serde(default)]
    name: Option<String>,
}

#[edge_function(name = "hello", description = "Greets the caller by name")]
async fn hello(req: EdgeRequest, ctx: &FunctionContext) -> Result<EdgeResponse, FunctionError> {
    // An unreadable body greets the world rather than failing.
    let greeting = req.json::<Greeting>().and_then(Result::ok).unwrap_or_default();
    let name = greeting
        .name
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "World".to_string());

    Ok(EdgeResponse::json(&json!({
        "message": format!("Hello {}!", name),
        "timestamp": now(),
        "function": "hello",
        "environment": {
            "supabaseUrl": configured(ctx, "SUPABASE_URL"),
            "jwtSecret": configured(ctx, "JWT_SECRET"),
        },
    }))?)
}

#[edge_function(name = "echo", description = "Reflects the request back as JSON")]
async fn echo(req: EdgeRequest, _ctx: &FunctionContext) -> Result<EdgeResponse, FunctionError> {
    let query: Map<String, Value> = req
        .uri
        .query()
        .unwrap_or_default()
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (k.to_string(), Value::from(v)),
            None => (pair.to_string(), Value::from("")),
        })
        .collect();

    let headers: Map<String, Value> = req
        .headers
        .iter()
        .filter_map(|(k, v)| Some((k.to_string(), Value::from(v.to_str().ok()?))))
        .collect();

    Ok(EdgeResponse::json(&json!({
        "function": "echo",
        "method": req.method.as_str(),
        "url": req.uri.to_string(),
        "path": req.path(),
        "query": query,
        "headers": headers,
        "body": req.text(),
        "timestamp": now(),
    }))?)
}

#[edge_function(name = "db-test", description = "Reports database configuration")]
async fn db_test(_req: EdgeRequest, ctx: &FunctionContext) -> Result<EdgeResponse, FunctionError> {
    let url = ctx.get_env("SUPABASE_URL");
    let key = ctx.get_env("SUPABASE_SERVICE_ROLE_KEY");

    let url = match (url, key) {
        (Some(url), Some(_)) => url,
        _ => {
            let state = |v: Option<&str>| if v.is_some() { "set" } else { "missing" };
            return Ok(EdgeResponse::json(&json!({
                "error": "Supabase configuration missing",
                "supabaseUrl": state(url),
                "supabaseKey": state(key),
            }))?
            .with_status(StatusCode::INTERNAL_SERVER_ERROR));
        }
    };

    Ok(EdgeResponse::json(&json!({
        "status": "configured",
        "message": "Database configuration present",
        "function": "db-test",
        "supabaseUrl": url,
        "timestamp": now(),
    }))?)
}

/// Platform hosting the reference functions.
pub fn platform() -> Result<LocalPlatform, PlatformError> {
    let mut platform = LocalPlatform::new();
    platform.register(HelloFunction::NAME, HelloFunction::factory)?;
    platform.register(EchoFunction::NAME, EchoFunction::factory)?;
    platform.register(DbTestFunction::NAME, DbTestFunction::factory)?;
    Ok(platform)
}
