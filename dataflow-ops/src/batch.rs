//! Stacks consecutive elements into batches

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use dataflow_core::{
    Dataset, DatasetIterator, DatasetRef, DType, Element, Error, IteratorContext, PartialShape,
    Result, Tensor,
};

use crate::util::{check_batchable, positive_batch_size, preallocated};

/// Combines up to `batch_size` consecutive upstream elements into one
///
/// Each output component has shape `[k] + component_shape`, where `k` is the
/// number of elements gathered. Only the final batch may have `k < batch_size`;
/// batches are never padded.
pub struct BatchDataset {
    input: DatasetRef,
    batch_size: usize,
    shapes: Vec<PartialShape>,
}

impl BatchDataset {
    /// Wrap `input`; `batch_size` must be positive
    pub fn new(input: DatasetRef, batch_size: i64) -> Result<Self> {
        let batch_size = positive_batch_size(batch_size)?;
        check_batchable("BatchDataset", input.output_dtypes())?;
        let shapes = input
            .output_shapes()
            .iter()
            .map(|s| PartialShape::unknown_dims(1).concatenate(s))
            .collect();
        debug!(batch_size, input = %input.debug_string(), "Created BatchDataset");
        Ok(Self {
            input,
            batch_size,
            shapes,
        })
    }

    /// Get the maximum number of elements per batch
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }
}

impl Dataset for BatchDataset {
    fn output_dtypes(&self) -> &[DType] {
        self.input.output_dtypes()
    }

    fn output_shapes(&self) -> &[PartialShape] {
        &self.shapes
    }

    fn make_iterator(self: Arc<Self>) -> Box<dyn DatasetIterator> {
        let input = Arc::clone(&self.input).make_iterator();
        Box::new(BatchIterator {
            dataset: self,
            input: Mutex::new(input),
        })
    }

    fn debug_string(&self) -> String {
        format!("BatchDatasetOp({})::Dataset", self.batch_size)
    }
}

struct BatchIterator {
    dataset: Arc<BatchDataset>,
    input: Mutex<Box<dyn DatasetIterator>>,
}

impl DatasetIterator for BatchIterator {
    fn get_next(&self, ctx: &IteratorContext) -> Result<Option<Element>> {
        let mut batch = Vec::with_capacity(preallocated(self.dataset.batch_size));
        {
            // One batch accumulates atomically with respect to other callers.
            let input = self.input.lock();
            while batch.len() < self.dataset.batch_size {
                match input.get_next(ctx)? {
                    Some(element) => batch.push(element),
                    None => break,
                }
            }
        }

        if batch.is_empty() {
            trace!("BatchDataset reached end of sequence");
            return Ok(None);
        }
        stack(self.dataset.output_dtypes(), &batch).map(Some)
    }
}

/// Stack `batch` component-wise into one element
///
/// The first element decides each component's row shape; later elements must
/// hold the same number of values.
pub(crate) fn stack(dtypes: &[DType], batch: &[Element]) -> Result<Element> {
    let first = &batch[0];
    if first.len() != dtypes.len() {
        return Err(Error::InvalidArgument(format!(
            "Batched element has {} components, expected {}",
            first.len(),
            dtypes.len()
        )));
    }
    let mut out = Vec::with_capacity(dtypes.len());
    for (component, &dtype) in dtypes.iter().enumerate() {
        let row_shape = first[component].shape();
        let mut stacked = Tensor::zeros(dtype, row_shape.with_leading(batch.len()))?;
        for (row, element) in batch.iter().enumerate() {
            let value = element.get(component).ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "Batched element {row} is missing component {component}"
                ))
            })?;
            stacked.copy_into_chip(row, value)?;
        }
        out.push(stacked);
    }
    Ok(out)
}
