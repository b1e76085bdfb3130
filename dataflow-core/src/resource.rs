//! Container-scoped, reference-counted resource registry
//!
//! Resources (datasets, variables, lookup tables, queues) are registered under a
//! `(container, name)` pair and handed around as [`ResourceHandle`] values. A
//! lookup returns a new `Arc` to the same instance, so the registry and every
//! holder share ownership.

use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::dtype::DType;
use crate::error::{Error, Result};
use crate::tensor::Tensor;

/// The kind of object a [`ResourceHandle`] refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    /// A published dataset
    Dataset,
    /// A mutable tensor variable
    Variable,
    /// A string to integer lookup table
    LookupTable,
    /// A FIFO queue of elements
    Queue,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceKind::Dataset => "Dataset",
            ResourceKind::Variable => "Variable",
            ResourceKind::LookupTable => "LookupTable",
            ResourceKind::Queue => "Queue",
        };
        f.write_str(name)
    }
}

/// Opaque reference to a registered resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceHandle {
    container: String,
    name: String,
    kind: ResourceKind,
}

impl ResourceHandle {
    /// Create a handle
    pub fn new(container: impl Into<String>, name: impl Into<String>, kind: ResourceKind) -> Self {
        Self {
            container: container.into(),
            name: name.into(),
            kind,
        }
    }

    /// Get the container name
    pub fn container(&self) -> &str {
        &self.container
    }

    /// Get the resource name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the resource kind
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Wrap this handle in a scalar resource tensor
    pub fn to_tensor(&self) -> Tensor {
        Tensor::scalar(self.clone())
    }
}

impl fmt::Display for ResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.kind, self.container, self.name)
    }
}

/// An object that can be stored in a [`ResourceManager`]
pub trait Resource: Send + Sync + 'static {
    /// The kind recorded in handles to this resource
    const KIND: ResourceKind;

    /// Short description for logging
    fn debug_string(&self) -> String;
}

type Entry = Arc<dyn Any + Send + Sync>;

/// Registry of resources keyed by container and name
#[derive(Default)]
pub struct ResourceManager {
    containers: RwLock<HashMap<String, HashMap<(ResourceKind, String), Entry>>>,
}

impl ResourceManager {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `resource` under `container`/`name`
    pub fn create<T: Resource>(
        &self,
        container: &str,
        name: &str,
        resource: Arc<T>,
    ) -> Result<ResourceHandle> {
        let mut containers = self.containers.write();
        let entries = containers.entry(container.to_string()).or_default();
        let key = (T::KIND, name.to_string());
        if entries.contains_key(&key) {
            return Err(Error::AlreadyExists(format!(
                "Resource {}/{} of kind {} already exists",
                container,
                name,
                T::KIND
            )));
        }
        debug!(container, name, kind = %T::KIND, resource = %resource.debug_string(), "Registered resource");
        entries.insert(key, resource);
        Ok(ResourceHandle::new(container, name, T::KIND))
    }

    /// Look up a resource of type `T` by container and name
    pub fn lookup<T: Resource>(&self, container: &str, name: &str) -> Result<Arc<T>> {
        let containers = self.containers.read();
        let entry = containers
            .get(container)
            .and_then(|entries| entries.get(&(T::KIND, name.to_string())))
            .cloned()
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "Resource {}/{} of kind {} does not exist",
                    container,
                    name,
                    T::KIND
                ))
            })?;
        trace!(container, name, "Resolved resource");
        entry.downcast::<T>().map_err(|_| {
            Error::Internal(format!(
                "Resource {container}/{name} is registered with an unexpected type"
            ))
        })
    }

    /// Look up the resource a handle refers to
    pub fn lookup_handle<T: Resource>(&self, handle: &ResourceHandle) -> Result<Arc<T>> {
        if handle.kind() != T::KIND {
            return Err(Error::InvalidArgument(format!(
                "Handle {handle} does not refer to a {}",
                T::KIND
            )));
        }
        self.lookup(handle.container(), handle.name())
    }

    /// Remove a resource; outstanding `Arc`s keep it alive
    pub fn delete(&self, handle: &ResourceHandle) -> Result<()> {
        let mut containers = self.containers.write();
        let removed = containers
            .get_mut(handle.container())
            .and_then(|entries| entries.remove(&(handle.kind(), handle.name().to_string())));
        match removed {
            Some(_) => Ok(()),
            None => Err(Error::NotFound(format!("Resource {handle} does not exist"))),
        }
    }

    /// Drop every resource in `container`
    pub fn cleanup(&self, container: &str) {
        if let Some(entries) = self.containers.write().remove(container) {
            debug!(container, count = entries.len(), "Cleaned up resource container");
        }
    }

    /// Check whether a handle resolves
    pub fn contains(&self, handle: &ResourceHandle) -> bool {
        self.containers
            .read()
            .get(handle.container())
            .is_some_and(|entries| entries.contains_key(&(handle.kind(), handle.name().to_string())))
    }

    /// Total number of registered resources
    pub fn len(&self) -> usize {
        self.containers.read().values().map(HashMap::len).sum()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for ResourceManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceManager")
            .field("resources", &self.len())
            .finish()
    }
}

/// A mutable tensor shared between pipeline stages
pub struct Variable {
    dtype: DType,
    value: RwLock<Tensor>,
}

impl Variable {
    /// Create a variable holding `initial`
    pub fn new(initial: Tensor) -> Self {
        Self {
            dtype: initial.dtype(),
            value: RwLock::new(initial),
        }
    }

    /// Get a copy of the current value
    pub fn read(&self) -> Tensor {
        self.value.read().clone()
    }

    /// Replace the current value; the dtype may not change
    pub fn assign(&self, value: Tensor) -> Result<()> {
        if value.dtype() != self.dtype {
            return Err(Error::InvalidArgument(format!(
                "Cannot assign {} value to {} variable",
                value.dtype(),
                self.dtype
            )));
        }
        *self.value.write() = value;
        Ok(())
    }
}

impl Resource for Variable {
    const KIND: ResourceKind = ResourceKind::Variable;

    fn debug_string(&self) -> String {
        format!("Variable<{}>", self.dtype)
    }
}

/// A string to `int64` table with a default for missing keys
pub struct LookupTable {
    default_value: i64,
    entries: RwLock<HashMap<String, i64>>,
}

impl LookupTable {
    /// Create an empty table
    pub fn new(default_value: i64) -> Self {
        Self {
            default_value,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Insert or replace a key
    pub fn insert(&self, key: impl Into<String>, value: i64) {
        self.entries.write().insert(key.into(), value);
    }

    /// Number of keys
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Check if the table is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Map every string in `keys` to its value, keeping the shape
    pub fn find(&self, keys: &Tensor) -> Result<Tensor> {
        let entries = self.entries.read();
        let values = keys
            .as_slice::<String>()?
            .iter()
            .map(|k| entries.get(k).copied().unwrap_or(self.default_value))
            .collect::<Vec<_>>();
        Tensor::from_vec(values, keys.shape().clone())
    }
}

impl Resource for LookupTable {
    const KIND: ResourceKind = ResourceKind::LookupTable;

    fn debug_string(&self) -> String {
        format!("LookupTable(size={})", self.len())
    }
}

/// A bounded FIFO queue of tensor tuples
pub struct FifoQueue {
    capacity: usize,
    items: Mutex<VecDeque<Vec<Tensor>>>,
}

impl FifoQueue {
    /// Create a queue holding at most `capacity` tuples
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            items: Mutex::new(VecDeque::new()),
        }
    }

    /// Append a tuple
    pub fn enqueue(&self, tuple: Vec<Tensor>) -> Result<()> {
        let mut items = self.items.lock();
        if items.len() >= self.capacity {
            return Err(Error::FailedPrecondition(format!(
                "Queue is full (capacity {})",
                self.capacity
            )));
        }
        items.push_back(tuple);
        Ok(())
    }

    /// Remove the oldest tuple, if any
    pub fn dequeue(&self) -> Option<Vec<Tensor>> {
        self.items.lock().pop_front()
    }

    /// Number of queued tuples
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Check if the queue is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Resource for FifoQueue {
    const KIND: ResourceKind = ResourceKind::Queue;

    fn debug_string(&self) -> String {
        format!("FifoQueue(capacity={})", self.capacity)
    }
}
