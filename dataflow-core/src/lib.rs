//! Core types and abstractions for lazy, pull-based dataset pipelines
//!
//! This crate defines the element model (dtypes, shapes, tensors), the
//! [`Dataset`] and [`DatasetIterator`] traits every operator implements, the
//! resource registry used to publish datasets and capture stateful objects,
//! and the function-invocation boundary through which user logic enters a
//! pipeline. Concrete operators live in `dataflow-ops`.

#![warn(missing_docs)]

pub mod config;
pub mod context;
pub mod dataset;
pub mod dtype;
pub mod error;
pub mod executor;
pub mod function;
pub mod resource;
pub mod shape;
pub mod sparse;
pub mod tensor;

// Re-export key types for convenience
pub use config::PipelineConfig;
pub use context::PipelineContext;
pub use dataset::{
    collect_elements, validate_element, Dataset, DatasetIterator, DatasetRef, Element, Elements,
    IteratorContext,
};
pub use dtype::{Complex128, Complex64, DType};
pub use error::{Error, ErrorCode, Result};
pub use function::{
    AttrValue, CallContext, CapturedFunction, FnFunction, Function, FunctionLibrary,
    FunctionOptions, FunctionRef,
};
pub use resource::{
    FifoQueue, LookupTable, Resource, ResourceHandle, ResourceKind, ResourceManager, Variable,
};
pub use shape::{PartialShape, TensorShape};
pub use sparse::SparseTensor;
pub use tensor::{Tensor, TensorData, TensorType};

static_assertions::assert_impl_all!(Tensor: Send, Sync);
static_assertions::assert_impl_all!(DatasetRef: Send, Sync);
static_assertions::assert_impl_all!(Box<dyn DatasetIterator>: Send, Sync);
static_assertions::assert_impl_all!(ResourceManager: Send, Sync);
