//! End-to-end dispatcher behaviour over in-process and recording platforms.

use async_trait::async_trait;
use edge_dispatch::dispatch::{
    ContextProvisioner, FreshLeases, ResourcePolicy, RouteResolver,
};
use edge_dispatch::platform::{PlatformError, Worker, WorkerSpec};
use edge_dispatch::prelude::*;
use edge_dispatch::runtime::LeasePolicyKind;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_test::assert_ok;

#[edge_function(name = "hello")]
async fn hello(req: EdgeRequest, _ctx: &FunctionContext) -> Result<EdgeResponse, FunctionError> {
    let body: Value = req.json().and_then(Result::ok).unwrap_or(Value::Null);
    let name = body["name"].as_str().unwrap_or("World");
    Ok(EdgeResponse::json(&serde_json::json!({ "message": format!("Hello {}!", name) }))?)
}

#[edge_function(name = "db-test")]
async fn db_test(_req: EdgeRequest, ctx: &FunctionContext) -> Result<EdgeResponse, FunctionError> {
    if ctx.get_env("SUPABASE_URL").is_none() {
        return Ok(EdgeResponse::json(&serde_json::json!({
            "error": "Supabase configuration missing",
            "supabaseUrl": "missing",
        }))?
        .with_status(StatusCode::INTERNAL_SERVER_ERROR));
    }
    Ok(EdgeResponse::text("connected"))
}

#[edge_function]
async fn sleepy(_req: EdgeRequest, _ctx: &FunctionContext) -> Result<EdgeResponse, FunctionError> {
    tokio::time::sleep(Duration::from_secs(5)).await;
    Ok(EdgeResponse::text("too late"))
}

#[edge_function(name = "branded")]
async fn branded(_req: EdgeRequest, _ctx: &FunctionContext) -> Result<EdgeResponse, FunctionError> {
    Ok(EdgeResponse::text("mine").header("access-control-allow-origin", "https://app.example"))
}

#[edge_function(name = "failing")]
async fn failing(_req: EdgeRequest, _ctx: &FunctionContext) -> Result<EdgeResponse, FunctionError> {
    Err(FunctionError::new("database unreachable"))
}

fn local_platform() -> LocalPlatform {
    let mut platform = LocalPlatform::new();
    platform.register(HelloFunction::NAME, HelloFunction::factory).unwrap();
    platform.register(DbTestFunction::NAME, DbTestFunction::factory).unwrap();
    platform.register(SleepyFunction::NAME, SleepyFunction::factory).unwrap();
    platform.register(BrandedFunction::NAME, BrandedFunction::factory).unwrap();
    platform.register(FailingFunction::NAME, FailingFunction::factory).unwrap();
    platform
}

fn dispatcher_with(config: DispatcherConfig, snapshot: ConfigSnapshot) -> Dispatcher {
    Dispatcher::new(&config, Arc::new(snapshot), Arc::new(local_platform()))
}

fn dispatcher() -> Dispatcher {
    dispatcher_with(DispatcherConfig::new(), ConfigSnapshot::default())
}

fn get(path: &str) -> EdgeRequest {
    EdgeRequest::new(Method::GET, path.parse().unwrap())
}

fn post(path: &str, body: &str) -> EdgeRequest {
    EdgeRequest::new(Method::POST, path.parse().unwrap())
        .header("content-type", "application/json")
        .body(body.to_string())
}

fn assert_cors(response: &EdgeResponse) {
    assert_eq!(response.headers["access-control-allow-origin"], "*");
    assert!(response.headers.contains_key("access-control-allow-headers"));
}

#[tokio::test]
async fn test_preflight_on_any_path() {
    let dispatcher = dispatcher();

    for path in ["/", "/functions/v1/hello", "/functions/v1/unknown-fn", "//x"] {
        let request = EdgeRequest::new(Method::OPTIONS, path.parse().unwrap());
        let response = dispatcher.dispatch(request, "req-1").await;

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.text_body(), "ok");
        assert_cors(&response);
    }
}

#[tokio::test]
async fn test_health_lists_functions() {
    let response = dispatcher().dispatch(get("/health"), "req-2").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_cors(&response);
    let body: Value = assert_ok!(response.json_body());
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "edge-functions");
    assert_eq!(
        body["availableFunctions"],
        serde_json::json!(["branded", "db-test", "failing", "hello", "sleepy"])
    );
    assert!(body["timestamp"].as_str().unwrap().ends_with('Z'));
}

#[tokio::test]
async fn test_root_is_health() {
    let response = dispatcher().dispatch(get("/"), "req-3").await;
    let body: Value = response.json_body().unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_prefix_without_name_is_invalid() {
    let response = dispatcher().dispatch(get("/functions/v1"), "req-4").await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_cors(&response);
    let body: Value = response.json_body().unwrap();
    assert_eq!(body["error"], "Invalid path");
    assert_eq!(body["path"], "/functions/v1");
    assert_eq!(body["hint"], "Use /functions/v1/{function-name}");
    assert!(body["availableFunctions"].is_array());
}

#[tokio::test]
async fn test_unknown_function_is_not_found() {
    let response = dispatcher()
        .dispatch(get("/functions/v1/unknown-fn"), "req-5")
        .await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_cors(&response);
    let body: Value = response.json_body().unwrap();
    assert_eq!(body["error"], "Function 'unknown-fn' not found");
    assert_eq!(body["availableFunctions"][0], "branded");
}

#[tokio::test]
async fn test_bare_path_uses_first_segment() {
    let response = dispatcher()
        .dispatch(get("/bogus/path/with/many/segments"), "req-6")
        .await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
    let body: Value = response.json_body().unwrap();
    assert_eq!(body["error"], "Function 'bogus' not found");
}

#[tokio::test]
async fn test_hello_is_forwarded() {
    let response = dispatcher()
        .dispatch(post("/functions/v1/hello", r#"{"name":"Ada"}"#), "req-7")
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_cors(&response);
    let body: Value = response.json_body().unwrap();
    assert_eq!(body["message"], "Hello Ada!");
}

#[tokio::test]
async fn test_callee_error_response_is_relayed() {
    let response = dispatcher()
        .dispatch(get("/functions/v1/db-test"), "req-8")
        .await;

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_cors(&response);
    let body: Value = response.json_body().unwrap();
    assert_eq!(body["error"], "Supabase configuration missing");
    assert_eq!(body["supabaseUrl"], "missing");
}

#[tokio::test]
async fn test_snapshot_reaches_worker() {
    let snapshot = ConfigSnapshot::from_pairs([("SUPABASE_URL", "http://kong:8000")]);
    let response = dispatcher_with(DispatcherConfig::new(), snapshot)
        .dispatch(get("/functions/v1/db-test"), "req-9")
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.text_body(), "connected");
}

#[tokio::test]
async fn test_required_env_blocks_provisioning() {
    let config = DispatcherConfig::new().require_env("SUPABASE_URL");
    let response = dispatcher_with(config, ConfigSnapshot::default())
        .dispatch(get("/functions/v1/hello"), "req-10")
        .await;

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_cors(&response);
    let body: Value = response.json_body().unwrap();
    assert_eq!(body["error"], "Configuration missing");
    assert_eq!(body["SUPABASE_URL"], "missing");
}

#[tokio::test]
async fn test_function_error_is_execution_failure() {
    let response = dispatcher()
        .dispatch(get("/functions/v1/failing"), "req-11")
        .await;

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json_body().unwrap();
    assert_eq!(body["error"], "Function execution failed");
    assert_eq!(body["function"], "failing");
    assert!(body["details"]
        .as_str()
        .unwrap()
        .contains("database unreachable"));
}

#[tokio::test]
async fn test_callee_cors_headers_win() {
    let response = dispatcher()
        .dispatch(get("/functions/v1/branded"), "req-12")
        .await;

    assert_eq!(
        response.headers["access-control-allow-origin"],
        "https://app.example"
    );
    assert!(response.headers.contains_key("access-control-allow-headers"));
}

fn dispatcher_with_timeout(platform: LocalPlatform, timeout: Duration) -> Dispatcher {
    let platform: Arc<dyn WorkerPlatform> = Arc::new(platform);
    let leases = Arc::new(FreshLeases::new(platform.clone()));
    let provisioner = ContextProvisioner::new(
        "./functions",
        Arc::new(ConfigSnapshot::default()),
        leases,
    )
    .with_resources(ResourcePolicy {
        memory_limit_mb: 150,
        timeout,
    });
    Dispatcher::from_parts(
        RouteResolver::default(),
        provisioner,
        platform,
        "edge-functions",
    )
}

#[tokio::test]
async fn test_timeout_is_execution_failure() {
    let dispatcher = dispatcher_with_timeout(local_platform(), Duration::from_millis(50));

    let response = dispatcher
        .dispatch(get("/functions/v1/sleepy"), "req-13")
        .await;

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json_body().unwrap();
    assert_eq!(body["function"], "sleepy");
    assert_eq!(body["details"], "worker timed out after 50ms");
}

#[edge_function(name = "panicky-fetch")]
async fn panicky_fetch(
    _req: EdgeRequest,
    _ctx: &FunctionContext,
) -> Result<EdgeResponse, FunctionError> {
    panic!("handler exploded")
}

struct BootPanic;

#[async_trait]
impl EdgeFunction for BootPanic {
    async fn on_load(&mut self, _ctx: &FunctionContext) -> Result<(), FunctionError> {
        panic!("boot panic")
    }

    async fn fetch(
        &self,
        _request: EdgeRequest,
        _ctx: &FunctionContext,
    ) -> Result<EdgeResponse, FunctionError> {
        Ok(EdgeResponse::ok())
    }

    fn name(&self) -> &str {
        "panicky-load"
    }
}

struct BootHang;

#[async_trait]
impl EdgeFunction for BootHang {
    async fn on_load(&mut self, _ctx: &FunctionContext) -> Result<(), FunctionError> {
        std::future::pending::<()>().await;
        Ok(())
    }

    async fn fetch(
        &self,
        _request: EdgeRequest,
        _ctx: &FunctionContext,
    ) -> Result<EdgeResponse, FunctionError> {
        Ok(EdgeResponse::ok())
    }

    fn name(&self) -> &str {
        "hangs"
    }
}

fn faulty_platform() -> LocalPlatform {
    let mut platform = local_platform();
    platform
        .register(PanickyFetchFunction::NAME, PanickyFetchFunction::factory)
        .unwrap();
    platform
        .register("panicky-load", || Box::new(BootPanic) as Box<dyn EdgeFunction>)
        .unwrap();
    platform
        .register("hangs", || Box::new(BootHang) as Box<dyn EdgeFunction>)
        .unwrap();
    platform
}

fn assert_execution_failure(response: &EdgeResponse, function: &str) -> Value {
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_cors(response);
    let body: Value = response.json_body().unwrap();
    assert_eq!(body["error"], "Function execution failed");
    assert_eq!(body["function"], function);
    body
}

#[tokio::test]
async fn test_panicking_fetch_is_answered() {
    let dispatcher = dispatcher_with_timeout(faulty_platform(), Duration::from_secs(5));

    let response = dispatcher
        .dispatch(get("/functions/v1/panicky-fetch"), "req-20")
        .await;

    let body = assert_execution_failure(&response, "panicky-fetch");
    assert!(body["details"].as_str().unwrap().contains("panic"));

    // The dispatcher keeps serving after the fault.
    let next = dispatcher.dispatch(get("/functions/v1/hello"), "req-21").await;
    assert_eq!(next.status, StatusCode::OK);
}

#[tokio::test]
async fn test_panicking_load_is_answered() {
    let dispatcher = dispatcher_with_timeout(faulty_platform(), Duration::from_secs(5));

    let response = dispatcher
        .dispatch(get("/functions/v1/panicky-load"), "req-22")
        .await;

    let body = assert_execution_failure(&response, "panicky-load");
    assert!(body["details"].as_str().unwrap().contains("panic"));
}

#[tokio::test]
async fn test_hanging_load_times_out() {
    let dispatcher = dispatcher_with_timeout(faulty_platform(), Duration::from_millis(80));

    let response = tokio::time::timeout(
        Duration::from_secs(3),
        dispatcher.dispatch(get("/functions/v1/hangs"), "req-23"),
    )
    .await
    .expect("dispatch must answer within the worker timeout");

    let body = assert_execution_failure(&response, "hangs");
    assert_eq!(body["details"], "worker startup timed out after 80ms");
}

/// Records every provisioning request and the request its worker received.
#[derive(Default)]
struct RecordingPlatform {
    specs: Mutex<Vec<WorkerSpec>>,
    requests: Arc<Mutex<Vec<EdgeRequest>>>,
}

struct RecordingWorker {
    requests: Arc<Mutex<Vec<EdgeRequest>>>,
}

#[async_trait]
impl Worker for RecordingWorker {
    async fn fetch(
        &mut self,
        request: EdgeRequest,
        _request_id: &str,
    ) -> Result<EdgeResponse, PlatformError> {
        self.requests.lock().unwrap().push(request);
        Ok(EdgeResponse::text("recorded").with_status(StatusCode::ACCEPTED))
    }

    async fn terminate(self: Box<Self>) {}
}

#[async_trait]
impl WorkerPlatform for RecordingPlatform {
    async fn create(&self, spec: &WorkerSpec) -> Result<Box<dyn Worker>, PlatformError> {
        self.specs.lock().unwrap().push(spec.clone());
        Ok(Box::new(RecordingWorker {
            requests: self.requests.clone(),
        }))
    }

    async fn available_functions(&self) -> Vec<String> {
        vec!["recorder".to_string()]
    }
}

#[tokio::test]
async fn test_worker_spec_and_verbatim_forwarding() {
    let platform = Arc::new(RecordingPlatform::default());
    let snapshot = ConfigSnapshot::from_pairs([
        ("SUPABASE_URL", "http://kong:8000"),
        ("JWT_SECRET", "secret"),
    ]);
    let config = DispatcherConfig::new().functions_root("/home/deno/functions");
    let dispatcher = Dispatcher::new(&config, Arc::new(snapshot), platform.clone());

    let request = EdgeRequest::new(Method::PUT, "/functions/v1/recorder/items?id=7".parse().unwrap())
        .header("x-tag", "a")
        .header("x-tag", "b")
        .body("payload");
    let response = dispatcher.dispatch(request, "req-14").await;

    assert_eq!(response.status, StatusCode::ACCEPTED);
    assert_eq!(response.text_body(), "recorded");
    assert_cors(&response);

    let specs = platform.specs.lock().unwrap().clone();
    assert_eq!(specs.len(), 1);
    let spec = &specs[0];
    assert_eq!(spec.function.as_str(), "recorder");
    assert_eq!(spec.service_path.to_str(), Some("/home/deno/functions/recorder"));
    assert_eq!(spec.memory_limit_mb, 150);
    assert_eq!(spec.timeout, Duration::from_secs(60));
    assert_eq!(spec.env("SUPABASE_URL"), Some("http://kong:8000"));
    assert_eq!(spec.env("SUPABASE_ANON_KEY"), Some(""));
    assert_eq!(spec.env_vars.len(), 5);

    let requests = platform.requests.lock().unwrap();
    let forwarded = &requests[0];
    assert_eq!(forwarded.method, Method::PUT);
    assert_eq!(forwarded.uri, "/functions/v1/recorder/items?id=7");
    assert_eq!(forwarded.headers.get_all("x-tag").iter().count(), 2);
    assert_eq!(forwarded.text().as_deref(), Some("payload"));
}

#[tokio::test]
async fn test_each_request_provisions_a_worker() {
    let platform = Arc::new(RecordingPlatform::default());
    let dispatcher = Dispatcher::new(
        &DispatcherConfig::new(),
        Arc::new(ConfigSnapshot::default()),
        platform.clone(),
    );

    dispatcher.dispatch(get("/functions/v1/recorder"), "a").await;
    dispatcher.dispatch(get("/functions/v1/recorder"), "b").await;

    assert_eq!(platform.specs.lock().unwrap().len(), 2);
}

struct Loaded {
    loads: Arc<AtomicUsize>,
}

#[async_trait]
impl EdgeFunction for Loaded {
    async fn on_load(&mut self, _ctx: &FunctionContext) -> Result<(), FunctionError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn fetch(
        &self,
        _request: EdgeRequest,
        _ctx: &FunctionContext,
    ) -> Result<EdgeResponse, FunctionError> {
        Ok(EdgeResponse::ok())
    }

    fn name(&self) -> &str {
        "loaded"
    }
}

#[tokio::test]
async fn test_pooled_leases_reuse_local_workers() {
    let loads = Arc::new(AtomicUsize::new(0));
    let mut platform = LocalPlatform::new();
    let counter = loads.clone();
    platform
        .register("loaded", move || {
            Box::new(Loaded {
                loads: counter.clone(),
            }) as Box<dyn EdgeFunction>
        })
        .unwrap();

    let config = DispatcherConfig::new().lease_policy(LeasePolicyKind::Pooled);
    let dispatcher = Dispatcher::new(&config, Arc::new(ConfigSnapshot::default()), Arc::new(platform));

    for id in ["a", "b", "c"] {
        let response = dispatcher.dispatch(get("/functions/v1/loaded"), id).await;
        assert_eq!(response.status, StatusCode::OK);
    }

    assert_eq!(loads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_macro_metadata() {
    assert_eq!(HelloFunction::NAME, "hello");
    assert_eq!(SleepyFunction::NAME, "sleepy");
    assert_eq!(DbTestFunction::new().name(), "db-test");
    assert_eq!(DbTestFunction::description(), "");
}
