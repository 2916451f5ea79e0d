//! In-process platform backed by a table of function factories.

use super::{PlatformError, Worker, WorkerPlatform, WorkerSpec};
use crate::function::{EdgeFunction, FunctionContext};
use crate::http::{EdgeRequest, EdgeResponse};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Builds a fresh function instance for every worker.
pub type FunctionFactory = Arc<dyn Fn() -> Box<dyn EdgeFunction> + Send + Sync>;

/// Runs registered [`EdgeFunction`]s inside the dispatcher process.
///
/// Every worker gets its own instance, so no state leaks between workers.
/// Factories, load hooks and fetches run on their own tasks, so a panic
/// becomes [`PlatformError::Crashed`]. Timeouts are enforced by the
/// dispatcher; the memory ceiling is advisory here because all workers share
/// one address space.
#[derive(Default, Clone)]
pub struct LocalPlatform {
    factories: BTreeMap<String, FunctionFactory>,
}

impl LocalPlatform {
    /// Create an empty platform.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function factory under `name`.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> Result<(), PlatformError>
    where
        F: Fn() -> Box<dyn EdgeFunction> + Send + Sync + 'static,
    {
        let name = name.into();
        if self.factories.contains_key(&name) {
            return Err(PlatformError::InvalidSpec(format!(
                "Function '{}' is already registered",
                name
            )));
        }

        info!("Registered local function: {}", name);
        self.factories.insert(name, Arc::new(factory));
        Ok(())
    }
}

#[async_trait]
impl WorkerPlatform for LocalPlatform {
    async fn create(&self, spec: &WorkerSpec) -> Result<Box<dyn Worker>, PlatformError> {
        let factory = self
            .factories
            .get(spec.function.as_str())
            .ok_or_else(|| PlatformError::CodeNotFound(spec.service_path.display().to_string()))?;

        let factory = Arc::clone(factory);
        let context = FunctionContext {
            env: spec.env_vars.clone(),
            function_name: spec.function.to_string(),
            request_id: String::new(),
        };

        let load_context = context.clone();
        let loaded = isolated(async move {
            let mut function = factory();
            function.on_load(&load_context).await.map(|()| function)
        })
        .await?;

        // Load hooks only report free text.
        let function = loaded.map_err(|e| {
            error!("Failed to load function '{}': {}", spec.function, e);
            PlatformError::from_message(e.message)
        })?;

        debug!("Loaded local worker for '{}'", spec.function);
        Ok(Box::new(LocalWorker {
            function: Arc::from(function),
            context,
        }))
    }

    async fn available_functions(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }
}

struct LocalWorker {
    function: Arc<dyn EdgeFunction>,
    context: FunctionContext,
}

#[async_trait]
impl Worker for LocalWorker {
    async fn fetch(
        &mut self,
        request: EdgeRequest,
        request_id: &str,
    ) -> Result<EdgeResponse, PlatformError> {
        let function = Arc::clone(&self.function);
        let mut context = self.context.clone();
        context.request_id = request_id.to_string();

        isolated(async move { function.fetch(request, &context).await })
            .await?
            .map_err(|e| PlatformError::FunctionFailed(e.message))
    }

    fn is_reusable(&self) -> bool {
        true
    }

    async fn terminate(mut self: Box<Self>) {
        let context = self.context.clone();
        let name = context.function_name.clone();
        match Arc::get_mut(&mut self.function) {
            Some(function) => {
                if let Err(e) = function.on_unload(&context).await {
                    error!("Error during unload of function '{}': {}", name, e);
                }
            }
            None => warn!("Function '{}' still running, skipping unload hook", name),
        }
        debug!("Released local worker for '{}'", name);
    }
}

/// Run callee code on its own task so a panic stays inside it.
///
/// The task lives in a [`JoinSet`], so dropping the returned future (on a
/// timeout) aborts the callee as well.
async fn isolated<F>(task: F) -> Result<F::Output, PlatformError>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    let mut tasks = JoinSet::new();
    tasks.spawn(task);

    match tasks.join_next().await {
        Some(Ok(output)) => Ok(output),
        Some(Err(e)) => Err(PlatformError::Crashed {
            status: if e.is_panic() { "panic" } else { "cancelled" }.to_string(),
            stderr: e.to_string(),
        }),
        None => Err(PlatformError::Internal("callee task vanished".to_string())),
    }
}
