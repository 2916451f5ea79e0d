//! Platform that runs every worker as a separate OS process.
//!
//! A function lives in `<functions_root>/<name>/` next to a `function.json`
//! manifest naming its entry executable. The worker process receives one
//! CBOR-encoded request on stdin and answers with one CBOR-encoded response
//! on stdout (see the `edge-wire` crate).

use super::{PlatformError, Worker, WorkerPlatform, WorkerSpec};
use crate::function::FunctionIdentifier;
use crate::http::{EdgeRequest, EdgeResponse, StatusCode};
use async_trait::async_trait;
use edge_wire::{ByteBuf, WireHeader, WireMeta, WireRequest, WireResponse};
use hyper::header::{HeaderName, HeaderValue};
use serde::Deserialize;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tracing::{debug, warn};

/// Name of the manifest file inside each function directory.
pub const MANIFEST_FILE: &str = "function.json";

/// Host variables passed through to workers on top of the provisioned environment.
const PASSTHROUGH_ENV: &[&str] = &["PATH"];

/// Default cap on a worker's encoded response.
const DEFAULT_OUTPUT_LIMIT: usize = 10 * 1024 * 1024;

/// Bytes of worker stderr kept for error reports; the rest is discarded.
const STDERR_LIMIT: usize = 64 * 1024;

/// Contents of a function's `function.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct FunctionManifest {
    /// Executable to run, relative to the function directory.
    pub entry: String,
    /// Extra arguments for the entry executable.
    #[serde(default)]
    pub args: Vec<String>,
}

/// Spawns one process per worker.
#[derive(Debug, Clone)]
pub struct ProcessPlatform {
    root: PathBuf,
    output_limit: usize,
}

impl ProcessPlatform {
    /// Create a platform serving functions below `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            output_limit: DEFAULT_OUTPUT_LIMIT,
        }
    }

    /// Cap the encoded response a worker may write to stdout.
    pub fn with_output_limit(mut self, bytes: usize) -> Self {
        self.output_limit = bytes;
        self
    }

    async fn read_manifest(&self, spec: &WorkerSpec) -> Result<FunctionManifest, PlatformError> {
        let manifest_path = spec.service_path.join(MANIFEST_FILE);
        let raw = tokio::fs::read_to_string(&manifest_path)
            .await
            .map_err(|e| PlatformError::from_io(&e, &manifest_path))?;

        serde_json::from_str(&raw).map_err(|e| {
            PlatformError::InvalidSpec(format!("{}: {}", manifest_path.display(), e))
        })
    }
}

#[async_trait]
impl WorkerPlatform for ProcessPlatform {
    async fn create(&self, spec: &WorkerSpec) -> Result<Box<dyn Worker>, PlatformError> {
        let manifest = self.read_manifest(spec).await?;
        let entry = spec.service_path.join(&manifest.entry);

        let mut command = Command::new(&entry);
        command
            .args(&manifest.args)
            .current_dir(&spec.service_path)
            .env_clear()
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        for key in PASSTHROUGH_ENV {
            if let Ok(value) = std::env::var(key) {
                command.env(key, value);
            }
        }
        command.envs(spec.env_vars.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        #[cfg(unix)]
        limit_address_space(&mut command, spec.memory_limit_bytes());

        let child = command
            .spawn()
            .map_err(|e| PlatformError::from_io(&e, &entry))?;

        debug!(
            "Spawned worker for '{}' (pid {:?}, no_module_cache={})",
            spec.function,
            child.id(),
            spec.no_module_cache
        );

        Ok(Box::new(ProcessWorker {
            function: spec.function.clone(),
            deadline_ms: spec.timeout.as_millis() as u64,
            output_limit: self.output_limit,
            child: Some(child),
        }))
    }

    async fn available_functions(&self) -> Vec<String> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Cannot list functions root {}: {}", self.root.display(), e);
                return Vec::new();
            }
        };

        let mut names = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if FunctionIdentifier::parse(&name).is_err() {
                continue;
            }
            if tokio::fs::metadata(entry.path().join(MANIFEST_FILE)).await.is_ok() {
                names.push(name);
            }
        }
        names.sort();
        names
    }
}

/// Caps the child's virtual address space at the memory ceiling.
#[cfg(unix)]
fn limit_address_space(command: &mut Command, bytes: u64) {
    let bytes = bytes as libc::rlim_t;
    // SAFETY: the closure only calls setrlimit, which is async-signal-safe.
    unsafe {
        command.pre_exec(move || {
            let limit = libc::rlimit {
                rlim_cur: bytes,
                rlim_max: bytes,
            };
            if libc::setrlimit(libc::RLIMIT_AS, &limit) != 0 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }
}

struct ProcessWorker {
    function: FunctionIdentifier,
    deadline_ms: u64,
    output_limit: usize,
    child: Option<Child>,
}

#[async_trait]
impl Worker for ProcessWorker {
    async fn fetch(
        &mut self,
        request: EdgeRequest,
        request_id: &str,
    ) -> Result<EdgeResponse, PlatformError> {
        let mut child = self
            .child
            .take()
            .ok_or_else(|| PlatformError::Internal("worker already served a request".to_string()))?;

        let wire_request = WireRequest {
            method: request.method.to_string(),
            path_and_query: request
                .uri
                .path_and_query()
                .map(|pq| pq.as_str().to_string())
                .unwrap_or_else(|| request.uri.path().to_string()),
            headers: request
                .headers
                .iter()
                .map(|(name, value)| WireHeader::new(name.as_str(), value.as_bytes()))
                .collect(),
            body: ByteBuf::from(request.body.to_vec()),
            meta: Some(WireMeta {
                request_id: Some(request_id.to_string()),
                function: Some(self.function.to_string()),
                deadline_ms: Some(self.deadline_ms),
            }),
        };
        let bytes = edge_wire::encode_request(&wire_request)
            .map_err(|e| PlatformError::Internal(format!("failed to encode request: {}", e)))?;

        // Feed stdin while draining stdout so large payloads cannot deadlock on pipe buffers.
        let stdin = child.stdin.take();
        let function = &self.function;
        let feed = async move {
            if let Some(mut stdin) = stdin {
                // A worker may exit before reading its input; its exit status says why.
                if let Err(e) = stdin.write_all(&bytes).await {
                    debug!("Worker for '{}' closed stdin early: {}", function, e);
                }
            }
        };

        let limit = self.output_limit;
        let stdout = child.stdout.take();
        // Dropping stdout after an overflow closes the pipe on the worker.
        let read_stdout = async move {
            match stdout {
                Some(mut stdout) => read_capped(&mut stdout, limit).await,
                None => Ok((Vec::new(), false)),
            }
        };
        let stderr = child.stderr.take();
        let read_stderr = async move {
            match stderr {
                Some(mut stderr) => {
                    let (captured, _) = read_capped(&mut stderr, STDERR_LIMIT).await?;
                    tokio::io::copy(&mut stderr, &mut tokio::io::sink()).await?;
                    Ok::<_, std::io::Error>(captured)
                }
                None => Ok(Vec::new()),
            }
        };

        let (_, stdout, stderr) = tokio::join!(feed, read_stdout, read_stderr);
        let (stdout, overflowed) = stdout
            .map_err(|e| PlatformError::Internal(format!("failed to read worker output: {}", e)))?;

        if overflowed {
            if let Err(e) = child.kill().await {
                warn!("Failed to kill worker for '{}': {}", self.function, e);
            }
            return Err(PlatformError::MalformedResponse(format!(
                "worker output exceeds {} bytes",
                limit
            )));
        }

        let status = child
            .wait()
            .await
            .map_err(|e| PlatformError::Internal(format!("failed to wait for worker: {}", e)))?;

        if !status.success() {
            return Err(PlatformError::Crashed {
                status: status.to_string(),
                stderr: String::from_utf8_lossy(&stderr.unwrap_or_default())
                    .trim()
                    .to_string(),
            });
        }

        let wire_response = edge_wire::decode_response(&stdout)
            .map_err(|e| PlatformError::MalformedResponse(e.to_string()))?;
        into_edge_response(wire_response)
    }

    async fn terminate(mut self: Box<Self>) {
        if let Some(mut child) = self.child.take() {
            if let Err(e) = child.kill().await {
                warn!("Failed to kill worker for '{}': {}", self.function, e);
            }
        }
    }
}

/// Read at most `limit` bytes; the flag reports whether the stream held more.
async fn read_capped<R>(reader: &mut R, limit: usize) -> std::io::Result<(Vec<u8>, bool)>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    reader.take(limit as u64 + 1).read_to_end(&mut buf).await?;
    let overflowed = buf.len() > limit;
    buf.truncate(limit);
    Ok((buf, overflowed))
}

fn into_edge_response(wire: WireResponse) -> Result<EdgeResponse, PlatformError> {
    let status = StatusCode::from_u16(wire.status)
        .map_err(|_| PlatformError::MalformedResponse(format!("invalid status {}", wire.status)))?;

    let mut response = EdgeResponse::new(status).body(wire.body.into_vec());
    for header in wire.headers {
        let name = match HeaderName::from_bytes(&header.name) {
            Ok(name) => name,
            Err(_) => {
                warn!("Skipping invalid header name from worker");
                continue;
            }
        };
        let value = match HeaderValue::from_bytes(&header.value) {
            Ok(value) => value,
            Err(_) => {
                warn!("Skipping invalid header value from worker");
                continue;
            }
        };
        response.headers.append(name, value);
    }
    Ok(response)
}
