//! Construction-time environment for pipelines

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::dataset::{DatasetRef, DatasetResource, IteratorContext};
use crate::error::{Error, Result};
use crate::executor::Runner;
use crate::function::{FunctionEnvironment, FunctionLibrary};
use crate::resource::{ResourceHandle, ResourceManager};

/// Owns the registries and worker pool that pipeline stages are built against
pub struct PipelineContext {
    config: PipelineConfig,
    resources: Arc<ResourceManager>,
    functions: Arc<FunctionLibrary>,
    runner: Runner,
}

impl PipelineContext {
    /// Create a context from a validated configuration
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let runner = if config.uses_worker_pool() {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(config.worker_threads)
                .thread_name(|i| format!("dataflow-worker-{i}"))
                .build()
                .map_err(|e| Error::Config(format!("Failed to build worker pool: {e}")))?;
            Runner::thread_pool(Arc::new(pool))
        } else {
            Runner::inline()
        };
        info!(
            worker_threads = config.worker_threads,
            container = %config.container,
            runner = ?runner,
            "Created pipeline context"
        );
        Ok(Self {
            config,
            resources: Arc::new(ResourceManager::new()),
            functions: Arc::new(FunctionLibrary::new()),
            runner,
        })
    }

    /// A context that runs every function on the calling thread
    pub fn inline() -> Self {
        Self {
            config: PipelineConfig {
                worker_threads: 1,
                inline_functions: true,
                ..PipelineConfig::default()
            },
            resources: Arc::new(ResourceManager::new()),
            functions: Arc::new(FunctionLibrary::new()),
            runner: Runner::inline(),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Get a shared reference to the caller-side resource registry
    pub fn resource_manager(&self) -> Arc<ResourceManager> {
        Arc::clone(&self.resources)
    }

    /// Get a shared reference to the function library
    pub fn function_library(&self) -> Arc<FunctionLibrary> {
        Arc::clone(&self.functions)
    }

    /// Environment to drive iterators with
    pub fn iterator_context(&self) -> IteratorContext {
        IteratorContext::new(self.runner.clone())
    }

    /// Publish `dataset` under `name` in the configured container
    pub fn publish_dataset(&self, name: &str, dataset: DatasetRef) -> Result<ResourceHandle> {
        debug!(name, dataset = %dataset.debug_string(), "Publishing dataset");
        self.resources
            .create(&self.config.container, name, Arc::new(DatasetResource::new(dataset)))
    }

    /// Publish `dataset` under a freshly generated name
    pub fn publish_anonymous(&self, dataset: DatasetRef) -> Result<ResourceHandle> {
        let name = format!("dataset_{}", Uuid::new_v4().simple());
        self.publish_dataset(&name, dataset)
    }

    /// Resolve a published dataset; the returned reference shares the instance
    pub fn lookup_dataset(&self, handle: &ResourceHandle) -> Result<DatasetRef> {
        let resource = self.resources.lookup_handle::<DatasetResource>(handle)?;
        Ok(resource.dataset())
    }
}

impl Default for PipelineContext {
    fn default() -> Self {
        Self::inline()
    }
}

impl FunctionEnvironment for PipelineContext {
    fn resources(&self) -> &ResourceManager {
        &self.resources
    }

    fn functions(&self) -> &FunctionLibrary {
        &self.functions
    }
}

impl fmt::Debug for PipelineContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineContext")
            .field("config", &self.config)
            .field("resources", &self.resources)
            .field("functions", &self.functions)
            .field("runner", &self.runner)
            .finish()
    }
}
