//! Function-invocation boundary and captured functions
//!
//! User logic enters a pipeline only through [`Function`]s registered in a
//! [`FunctionLibrary`]. Operators such as map and filter bind a function
//! reference and a list of captured tensors into a [`CapturedFunction`] at
//! construction time and invoke it synchronously from `get_next`.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::dataset::IteratorContext;
use crate::dtype::DType;
use crate::error::{Error, Result};
use crate::executor::{CancellationManager, Notification, Runner};
use crate::resource::{FifoQueue, LookupTable, Resource, ResourceHandle, ResourceKind, ResourceManager, Variable};
use crate::tensor::Tensor;

/// Attribute value attached to a function reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttrValue {
    /// Integer attribute
    Int(i64),
    /// Floating point attribute
    Float(f64),
    /// Boolean attribute
    Bool(bool),
    /// String attribute
    String(String),
    /// Type attribute
    Type(DType),
}

/// A function name plus the attributes to instantiate it with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionRef {
    name: String,
    attrs: BTreeMap<String, AttrValue>,
}

impl FunctionRef {
    /// Reference `name` with no attributes
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: BTreeMap::new(),
        }
    }

    /// Add an attribute
    pub fn with_attr(mut self, key: impl Into<String>, value: AttrValue) -> Self {
        self.attrs.insert(key.into(), value);
        self
    }

    /// Get the function name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the attributes
    pub fn attrs(&self) -> &BTreeMap<String, AttrValue> {
        &self.attrs
    }
}

/// What a function sees while it runs
pub struct CallContext<'a> {
    step_id: i64,
    attrs: &'a BTreeMap<String, AttrValue>,
    resources: &'a ResourceManager,
    cancellation: &'a CancellationManager,
}

impl<'a> CallContext<'a> {
    /// Step id of this invocation
    pub fn step_id(&self) -> i64 {
        self.step_id
    }

    /// Look up an attribute from the function reference
    pub fn attr(&self, key: &str) -> Option<&'a AttrValue> {
        self.attrs.get(key)
    }

    /// The isolated resource registry holding captured resources
    pub fn resources(&self) -> &'a ResourceManager {
        self.resources
    }

    /// The invocation-local cancellation manager
    pub fn cancellation(&self) -> &'a CancellationManager {
        self.cancellation
    }
}

/// A callable supplied from outside the pipeline
pub trait Function: Send + Sync {
    /// Invoke with per-call arguments followed by captured arguments
    fn call(&self, ctx: &CallContext<'_>, args: &[Tensor]) -> Result<Vec<Tensor>>;

    /// Declared output dtypes, if the function has a fixed signature
    fn output_dtypes(&self) -> Option<&[DType]> {
        None
    }
}

/// A [`Function`] backed by a closure
pub struct FnFunction<F> {
    f: F,
    output_dtypes: Option<Vec<DType>>,
}

impl<F> FnFunction<F>
where
    F: Fn(&CallContext<'_>, &[Tensor]) -> Result<Vec<Tensor>> + Send + Sync,
{
    /// Wrap `f` without a declared signature
    pub fn new(f: F) -> Self {
        Self { f, output_dtypes: None }
    }

    /// Wrap `f`, declaring the dtypes it returns
    pub fn with_output_dtypes(f: F, output_dtypes: Vec<DType>) -> Self {
        Self {
            f,
            output_dtypes: Some(output_dtypes),
        }
    }
}

impl<F> Function for FnFunction<F>
where
    F: Fn(&CallContext<'_>, &[Tensor]) -> Result<Vec<Tensor>> + Send + Sync,
{
    fn call(&self, ctx: &CallContext<'_>, args: &[Tensor]) -> Result<Vec<Tensor>> {
        (self.f)(ctx, args)
    }

    fn output_dtypes(&self) -> Option<&[DType]> {
        self.output_dtypes.as_deref()
    }
}

/// Name to function registry
#[derive(Default)]
pub struct FunctionLibrary {
    functions: RwLock<HashMap<String, Arc<dyn Function>>>,
}

impl FunctionLibrary {
    /// Create an empty library
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `function` under `name`
    pub fn register(&self, name: impl Into<String>, function: Arc<dyn Function>) -> Result<()> {
        let name = name.into();
        let mut functions = self.functions.write();
        if functions.contains_key(&name) {
            return Err(Error::AlreadyExists(format!("Function '{name}' is already registered")));
        }
        debug!(function = %name, "Registered function");
        functions.insert(name, function);
        Ok(())
    }

    /// Register a closure under `name`
    pub fn register_fn<F>(&self, name: impl Into<String>, f: F) -> Result<()>
    where
        F: Fn(&CallContext<'_>, &[Tensor]) -> Result<Vec<Tensor>> + Send + Sync + 'static,
    {
        self.register(name, Arc::new(FnFunction::new(f)))
    }

    /// Resolve a reference to its implementation
    pub fn instantiate(&self, func: &FunctionRef) -> Result<Arc<dyn Function>> {
        self.functions
            .read()
            .get(func.name())
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Function '{}' is not defined", func.name())))
    }

    /// Check whether `name` is registered
    pub fn contains(&self, name: &str) -> bool {
        self.functions.read().contains_key(name)
    }
}

impl fmt::Debug for FunctionLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.functions.read().keys().cloned().collect();
        names.sort();
        f.debug_struct("FunctionLibrary").field("functions", &names).finish()
    }
}

/// Choose a step id that cannot clash with normal, non-negative step ids
pub fn isolated_step_id() -> i64 {
    let magnitude = (rand::random::<u64>() >> 1) as i64;
    -magnitude - 1
}

/// Per-invocation options
#[derive(Debug, Clone)]
pub struct FunctionOptions {
    /// Step id for this invocation
    pub step_id: i64,
    /// Where the function body runs
    pub runner: Runner,
}

impl FunctionOptions {
    /// Options for an invocation made from inside an iterator
    pub fn for_iterator(ctx: &IteratorContext) -> Self {
        Self {
            step_id: isolated_step_id(),
            runner: ctx.runner().clone(),
        }
    }
}

/// Caller-side view needed to bind a function
pub trait FunctionEnvironment {
    /// The caller's resource registry
    fn resources(&self) -> &ResourceManager;

    /// The library to resolve function references against
    fn functions(&self) -> &FunctionLibrary;
}

/// A function bound to a fixed list of captured arguments
pub struct CapturedFunction {
    func_ref: FunctionRef,
    func: Arc<dyn Function>,
    captured_inputs: Arc<Vec<Tensor>>,
    resources: Arc<ResourceManager>,
}

impl CapturedFunction {
    /// Bind `func` to `captured_inputs`
    ///
    /// Captured resource handles are re-registered in a registry local to the
    /// returned function so the body sees them under the same names.
    pub fn create(
        env: &dyn FunctionEnvironment,
        func: &FunctionRef,
        captured_inputs: Vec<Tensor>,
    ) -> Result<Self> {
        let local = ResourceManager::new();
        for input in &captured_inputs {
            if input.dtype() != DType::Resource {
                continue;
            }
            for handle in input.as_slice::<ResourceHandle>()? {
                match handle.kind() {
                    ResourceKind::LookupTable => recapture::<LookupTable>(env.resources(), &local, handle)?,
                    ResourceKind::Queue => recapture::<FifoQueue>(env.resources(), &local, handle)?,
                    ResourceKind::Variable => recapture::<Variable>(env.resources(), &local, handle)?,
                    ResourceKind::Dataset => {
                        return Err(Error::Unimplemented(format!(
                            "Cannot currently capture resource '{handle}' in a dataset function (type not supported)."
                        )))
                    }
                }
            }
        }

        let function = env.functions().instantiate(func)?;
        debug!(
            function = func.name(),
            captured = captured_inputs.len(),
            "Created captured function"
        );
        Ok(Self {
            func_ref: func.clone(),
            func: function,
            captured_inputs: Arc::new(captured_inputs),
            resources: Arc::new(local),
        })
    }

    /// Get the bound function reference
    pub fn func_ref(&self) -> &FunctionRef {
        &self.func_ref
    }

    /// Get the captured arguments
    pub fn captured_inputs(&self) -> &[Tensor] {
        &self.captured_inputs
    }

    /// Get the local registry holding captured resources
    pub fn resources(&self) -> &ResourceManager {
        &self.resources
    }

    /// Invoke with `args` followed by the captured inputs, blocking until done
    pub fn run(&self, opts: &FunctionOptions, args: Vec<Tensor>) -> Result<Vec<Tensor>> {
        let slot: Arc<Mutex<Option<Result<Vec<Tensor>>>>> = Arc::new(Mutex::new(None));
        let done = Arc::new(Notification::new());

        let func = Arc::clone(&self.func);
        let captured = Arc::clone(&self.captured_inputs);
        let resources = Arc::clone(&self.resources);
        let attrs = self.func_ref.attrs().clone();
        let name = self.func_ref.name().to_string();
        let step_id = opts.step_id;
        let slot_in = Arc::clone(&slot);
        let done_in = Arc::clone(&done);

        opts.runner.schedule(Box::new(move || {
            // TODO: thread an outer cancellation manager through IteratorContext so
            // cancelling a pipeline also cancels in-flight invocations.
            let cancellation = CancellationManager::new();
            let ctx = CallContext {
                step_id,
                attrs: &attrs,
                resources: &resources,
                cancellation: &cancellation,
            };
            let mut full_args = args;
            full_args.extend(captured.iter().cloned());
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| func.call(&ctx, &full_args)))
                .unwrap_or_else(|_| Err(Error::Internal(format!("Function '{name}' panicked"))));
            *slot_in.lock() = Some(outcome);
            done_in.notify();
        }));
        done.wait();

        let outcome = slot.lock().take().unwrap_or_else(|| {
            Err(Error::Internal(format!(
                "Function '{}' finished without a result",
                self.func_ref.name()
            )))
        });
        let outputs = match outcome {
            Ok(outputs) => outputs,
            Err(e) => {
                warn!(function = self.func_ref.name(), error = %e, "Captured function failed");
                return Err(e);
            }
        };
        self.check_outputs(&outputs)?;
        Ok(outputs)
    }

    fn check_outputs(&self, outputs: &[Tensor]) -> Result<()> {
        let Some(expected) = self.func.output_dtypes() else {
            return Ok(());
        };
        let actual: Vec<DType> = outputs.iter().map(Tensor::dtype).collect();
        if actual != expected {
            return Err(Error::InvalidArgument(format!(
                "Function '{}' returned {:?}, but its signature declares {:?}",
                self.func_ref.name(),
                actual,
                expected
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for CapturedFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapturedFunction")
            .field("func", &self.func_ref.name())
            .field("captured_inputs", &self.captured_inputs.len())
            .finish()
    }
}

fn recapture<T: Resource>(
    caller: &ResourceManager,
    local: &ResourceManager,
    handle: &ResourceHandle,
) -> Result<()> {
    let resource = match caller.lookup_handle::<T>(handle) {
        Ok(resource) => resource,
        Err(Error::NotFound(_)) => {
            return Err(Error::FailedPrecondition(format!(
                "Failed to capture resource named \"{}\" in a dataset function. You may need to initialize it explicitly before initializing an iterator that uses it.",
                handle.name()
            )))
        }
        Err(e) => return Err(e),
    };
    local.create(handle.container(), handle.name(), resource)?;
    Ok(())
}
