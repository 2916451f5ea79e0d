//! Worker lease policies: always provision, or reuse from a bounded pool.

use crate::function::FunctionIdentifier;
use crate::platform::{PlatformError, Worker, WorkerPlatform, WorkerSpec};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// A live worker leased to exactly one request.
pub struct WorkerHandle {
    spec: WorkerSpec,
    worker: Box<dyn Worker>,
    reused: bool,
}

impl WorkerHandle {
    pub fn new(spec: WorkerSpec, worker: Box<dyn Worker>) -> Self {
        Self {
            spec,
            worker,
            reused: false,
        }
    }

    /// The spec this worker was provisioned with.
    pub fn spec(&self) -> &WorkerSpec {
        &self.spec
    }

    pub fn function(&self) -> &FunctionIdentifier {
        &self.spec.function
    }

    /// Whether the worker came out of a pool rather than a fresh provision.
    pub fn is_reused(&self) -> bool {
        self.reused
    }

    pub(crate) fn worker_mut(&mut self) -> &mut dyn Worker {
        self.worker.as_mut()
    }
}

impl std::fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("function", &self.spec.function)
            .field("reused", &self.reused)
            .finish()
    }
}

/// Decides whether a request gets a new worker or a pooled one.
#[async_trait]
pub trait LeasePolicy: Send + Sync {
    /// Obtain a worker for `spec`.
    async fn acquire(&self, spec: WorkerSpec) -> Result<WorkerHandle, PlatformError>;

    /// Give a worker back. `healthy` is false when its last request failed.
    async fn release(&self, handle: WorkerHandle, healthy: bool);

    /// Drop idle workers past their idle timeout; returns how many were evicted.
    async fn evict_idle(&self) -> usize {
        0
    }
}

/// Provisions a brand-new worker per request and tears it down afterwards.
pub struct FreshLeases {
    platform: Arc<dyn WorkerPlatform>,
}

impl FreshLeases {
    pub fn new(platform: Arc<dyn WorkerPlatform>) -> Self {
        Self { platform }
    }
}

#[async_trait]
impl LeasePolicy for FreshLeases {
    async fn acquire(&self, spec: WorkerSpec) -> Result<WorkerHandle, PlatformError> {
        let worker = self.platform.create(&spec).await?;
        Ok(WorkerHandle::new(spec, worker))
    }

    async fn release(&self, handle: WorkerHandle, _healthy: bool) {
        handle.worker.terminate().await;
    }
}

struct IdleWorker {
    spec: WorkerSpec,
    worker: Box<dyn Worker>,
    idle_since: Instant,
}

/// Keeps up to `max_idle` reusable workers per function.
///
/// A leased worker is removed from the pool for the duration of its request,
/// so no two requests ever share a worker. Only workers that report
/// [`Worker::is_reusable`] and finished their request cleanly are returned.
pub struct PooledLeases {
    platform: Arc<dyn WorkerPlatform>,
    max_idle: usize,
    idle_timeout: Duration,
    idle: Mutex<HashMap<FunctionIdentifier, Vec<IdleWorker>>>,
}

impl PooledLeases {
    pub fn new(platform: Arc<dyn WorkerPlatform>, max_idle: usize, idle_timeout: Duration) -> Self {
        Self {
            platform,
            max_idle,
            idle_timeout,
            idle: Mutex::new(HashMap::new()),
        }
    }

    /// Number of idle workers currently pooled for `function`.
    pub async fn idle_count(&self, function: &FunctionIdentifier) -> usize {
        self.idle.lock().await.get(function).map_or(0, Vec::len)
    }

    async fn take_idle(&self, spec: &WorkerSpec) -> Option<Box<dyn Worker>> {
        let mut expired = Vec::new();
        let found = {
            let mut idle = self.idle.lock().await;
            let entries = idle.get_mut(&spec.function)?;

            let (fresh, stale): (Vec<_>, Vec<_>) = entries
                .drain(..)
                .partition(|w| w.idle_since.elapsed() < self.idle_timeout);
            expired.extend(stale);
            *entries = fresh;

            // Most recently used first; a spec mismatch means the worker is stale.
            match entries.iter().rposition(|w| w.spec == *spec) {
                Some(index) => Some(entries.remove(index).worker),
                None => None,
            }
        };

        for stale in expired {
            stale.worker.terminate().await;
        }
        found
    }
}

#[async_trait]
impl LeasePolicy for PooledLeases {
    async fn acquire(&self, spec: WorkerSpec) -> Result<WorkerHandle, PlatformError> {
        if let Some(worker) = self.take_idle(&spec).await {
            debug!("Reusing pooled worker for '{}'", spec.function);
            return Ok(WorkerHandle {
                spec,
                worker,
                reused: true,
            });
        }

        let worker = self.platform.create(&spec).await?;
        Ok(WorkerHandle::new(spec, worker))
    }

    async fn release(&self, handle: WorkerHandle, healthy: bool) {
        let WorkerHandle { spec, worker, .. } = handle;

        let rejected = if healthy && worker.is_reusable() {
            let mut idle = self.idle.lock().await;
            let entries = idle.entry(spec.function.clone()).or_default();
            if entries.len() < self.max_idle {
                entries.push(IdleWorker {
                    spec,
                    worker,
                    idle_since: Instant::now(),
                });
                None
            } else {
                Some(worker)
            }
        } else {
            Some(worker)
        };

        if let Some(worker) = rejected {
            worker.terminate().await;
        }
    }

    async fn evict_idle(&self) -> usize {
        let expired: Vec<IdleWorker> = {
            let mut idle = self.idle.lock().await;
            let mut expired = Vec::new();
            for entries in idle.values_mut() {
                let (fresh, stale): (Vec<_>, Vec<_>) = entries
                    .drain(..)
                    .partition(|w| w.idle_since.elapsed() < self.idle_timeout);
                *entries = fresh;
                expired.extend(stale);
            }
            idle.retain(|_, entries| !entries.is_empty());
            expired
        };

        let count = expired.len();
        for stale in expired {
            stale.worker.terminate().await;
        }
        if count > 0 {
            info!("Evicted {} idle worker(s)", count);
        }
        count
    }
}
