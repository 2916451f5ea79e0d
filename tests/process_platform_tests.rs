//! Child-process workers driven through the dispatcher.

#![cfg(unix)]

use edge_dispatch::dispatch::{ContextProvisioner, FreshLeases, ResourcePolicy, RouteResolver};
use edge_dispatch::platform::MANIFEST_FILE;
use edge_dispatch::prelude::*;
use edge_wire::{WireHeader, WireResponse};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn write_function(root: &Path, name: &str, script: &str) {
    let dir = root.join(name);
    std::fs::create_dir_all(&dir).unwrap();
    let manifest = serde_json::json!({ "entry": "/bin/sh", "args": ["-c", script] });
    std::fs::write(dir.join(MANIFEST_FILE), manifest.to_string()).unwrap();
}

fn dispatcher(root: &Path, timeout: Duration) -> Dispatcher {
    dispatcher_over(ProcessPlatform::new(root), root, timeout)
}

fn dispatcher_over(platform: ProcessPlatform, root: &Path, timeout: Duration) -> Dispatcher {
    let platform: Arc<dyn WorkerPlatform> = Arc::new(platform);
    let provisioner = ContextProvisioner::new(
        root,
        Arc::new(ConfigSnapshot::from_pairs([("SUPABASE_URL", "http://kong:8000")])),
        Arc::new(FreshLeases::new(platform.clone())),
    )
    .with_resources(ResourcePolicy {
        memory_limit_mb: 150,
        timeout,
    });
    Dispatcher::from_parts(RouteResolver::default(), provisioner, platform, "edge-functions")
}

fn get(path: &str) -> EdgeRequest {
    EdgeRequest::new(Method::GET, path.parse().unwrap())
}

#[tokio::test]
async fn test_available_functions_need_a_manifest() {
    let root = TempDir::new().unwrap();
    write_function(root.path(), "hello", "exit 0");
    write_function(root.path(), "echo", "exit 0");
    std::fs::create_dir_all(root.path().join("no-manifest")).unwrap();

    let platform = ProcessPlatform::new(root.path());
    assert_eq!(platform.available_functions().await, vec!["echo", "hello"]);
}

#[tokio::test]
async fn test_missing_directory_is_not_found() {
    let root = TempDir::new().unwrap();
    let response = dispatcher(root.path(), Duration::from_secs(5))
        .dispatch(get("/functions/v1/ghost"), "req-1")
        .await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
    let body: Value = response.json_body().unwrap();
    assert_eq!(body["error"], "Function 'ghost' not found");
}

#[tokio::test]
async fn test_missing_manifest_is_not_found() {
    let root = TempDir::new().unwrap();
    std::fs::create_dir_all(root.path().join("half")).unwrap();

    let response = dispatcher(root.path(), Duration::from_secs(5))
        .dispatch(get("/functions/v1/half"), "req-2")
        .await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_worker_response_is_relayed() {
    let root = TempDir::new().unwrap();
    let wire = WireResponse::new(
        201,
        vec![WireHeader::new("content-type", "text/plain")],
        b"made it".to_vec(),
    );
    let encoded = edge_wire::encode_response(&wire).unwrap();
    write_function(root.path(), "canned", "cat > /dev/null; cat response.cbor");
    std::fs::write(root.path().join("canned").join("response.cbor"), encoded).unwrap();

    let response = dispatcher(root.path(), Duration::from_secs(5))
        .dispatch(get("/functions/v1/canned"), "req-3")
        .await;

    assert_eq!(response.status, StatusCode::CREATED);
    assert_eq!(response.text_body(), "made it");
    assert_eq!(response.headers["access-control-allow-origin"], "*");
}

#[tokio::test]
async fn test_nonzero_exit_is_execution_failure() {
    let root = TempDir::new().unwrap();
    write_function(root.path(), "crashy", "echo boom >&2; exit 3");

    let response = dispatcher(root.path(), Duration::from_secs(5))
        .dispatch(get("/functions/v1/crashy"), "req-4")
        .await;

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json_body().unwrap();
    assert_eq!(body["error"], "Function execution failed");
    assert_eq!(body["function"], "crashy");
    assert!(body["details"].as_str().unwrap().contains("boom"));
}

#[tokio::test]
async fn test_garbage_output_is_execution_failure() {
    let root = TempDir::new().unwrap();
    write_function(root.path(), "mirror", "cat");

    let response = dispatcher(root.path(), Duration::from_secs(5))
        .dispatch(get("/functions/v1/mirror"), "req-5")
        .await;

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_worker_sees_only_forwarded_env() {
    let root = TempDir::new().unwrap();
    // Exit status encodes what the worker saw.
    write_function(
        root.path(),
        "env-check",
        r#"[ "$SUPABASE_URL" = "http://kong:8000" ] || exit 10; [ -z "${HOME+x}" ] || exit 11; exit 12"#,
    );

    let response = dispatcher(root.path(), Duration::from_secs(5))
        .dispatch(get("/functions/v1/env-check"), "req-6")
        .await;

    let body: Value = response.json_body().unwrap();
    assert!(body["details"].as_str().unwrap().contains("12"));
}

#[tokio::test]
async fn test_slow_worker_times_out() {
    let root = TempDir::new().unwrap();
    write_function(root.path(), "slow", "sleep 5");

    let started = std::time::Instant::now();
    let response = dispatcher(root.path(), Duration::from_millis(200))
        .dispatch(get("/functions/v1/slow"), "req-7")
        .await;

    assert!(started.elapsed() < Duration::from_secs(4));
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json_body().unwrap();
    assert_eq!(body["details"], "worker timed out after 200ms");
}

#[tokio::test]
async fn test_oversized_output_is_execution_failure() {
    let root = TempDir::new().unwrap();
    write_function(root.path(), "flood", "cat > /dev/null; head -c 4096 /dev/zero");

    let platform = ProcessPlatform::new(root.path()).with_output_limit(1024);
    let response = dispatcher_over(platform, root.path(), Duration::from_secs(5))
        .dispatch(get("/functions/v1/flood"), "req-8")
        .await;

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json_body().unwrap();
    assert_eq!(body["function"], "flood");
    assert!(body["details"]
        .as_str()
        .unwrap()
        .contains("exceeds 1024 bytes"));
}
