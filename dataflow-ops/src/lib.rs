//! Dataset sources and transform operators
//!
//! Every operator is a [`Dataset`](dataflow_core::Dataset) implementation paired
//! with a private iterator type. Sources have no upstream; transforms hold a
//! [`DatasetRef`](dataflow_core::DatasetRef) to each upstream dataset and build
//! one upstream iterator per iterator of their own.
//!
//! Pipelines are usually assembled with the [`DatasetExt`] builder methods:
//!
//! ```
//! use dataflow_core::{collect_elements, PipelineContext};
//! use dataflow_ops::{DatasetExt, IntoDatasetRef, RangeDataset};
//!
//! let ctx = PipelineContext::inline();
//! let batches = RangeDataset::new(0, 5, 1)
//!     .unwrap()
//!     .into_ref()
//!     .batch(2)
//!     .unwrap();
//! let elements = collect_elements(&batches, &ctx.iterator_context()).unwrap();
//! assert_eq!(elements.len(), 3);
//! ```

#![warn(missing_docs)]

pub mod batch;
pub mod dense_to_sparse_batch;
pub mod ext;
pub mod filter;
pub mod map;
pub mod range;
pub mod repeat;
pub mod shuffle;
pub mod skip;
pub mod sparse_tensor_slice;
pub mod take;
pub mod tensor;
pub mod tensor_slice;
pub mod zip;

mod util;

pub use batch::BatchDataset;
pub use dense_to_sparse_batch::DenseToSparseBatchDataset;
pub use ext::{DatasetExt, IntoDatasetRef};
pub use filter::FilterDataset;
pub use map::MapDataset;
pub use range::RangeDataset;
pub use repeat::RepeatDataset;
pub use shuffle::ShuffleDataset;
pub use skip::SkipDataset;
pub use sparse_tensor_slice::SparseTensorSliceDataset;
pub use take::TakeDataset;
pub use tensor::TensorDataset;
pub use tensor_slice::TensorSliceDataset;
pub use zip::ZipDataset;
