//! A source of evenly spaced `int64` scalars

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use dataflow_core::{
    Dataset, DatasetIterator, DType, Element, Error, IteratorContext, PartialShape, Result, Tensor,
};

/// Emits `start, start + step, ...` up to but excluding `stop`
pub struct RangeDataset {
    start: i64,
    stop: i64,
    step: i64,
    dtypes: Vec<DType>,
    shapes: Vec<PartialShape>,
}

impl RangeDataset {
    /// Create a range; `step` may be negative but not zero
    pub fn new(start: i64, stop: i64, step: i64) -> Result<Self> {
        if step == 0 {
            return Err(Error::InvalidArgument("step must be a non-zero integer.".into()));
        }
        debug!(start, stop, step, "Created RangeDataset");
        Ok(Self {
            start,
            stop,
            step,
            dtypes: vec![DType::Int64],
            shapes: vec![PartialShape::scalar()],
        })
    }
}

impl Dataset for RangeDataset {
    fn output_dtypes(&self) -> &[DType] {
        &self.dtypes
    }

    fn output_shapes(&self) -> &[PartialShape] {
        &self.shapes
    }

    fn make_iterator(self: Arc<Self>) -> Box<dyn DatasetIterator> {
        Box::new(RangeIterator {
            next: Mutex::new(self.start),
            dataset: self,
        })
    }

    fn debug_string(&self) -> String {
        format!(
            "RangeDatasetOp::Dataset(start={}, stop={}, step={})",
            self.start, self.stop, self.step
        )
    }
}

struct RangeIterator {
    dataset: Arc<RangeDataset>,
    next: Mutex<i64>,
}

impl DatasetIterator for RangeIterator {
    fn get_next(&self, _ctx: &IteratorContext) -> Result<Option<Element>> {
        let RangeDataset { stop, step, .. } = *self.dataset;
        let mut next = self.next.lock();
        if (step > 0 && *next >= stop) || (step < 0 && *next <= stop) {
            return Ok(None);
        }
        let value = *next;
        // saturation lands on or past `stop`, which ends the range
        *next = next.saturating_add(step);
        Ok(Some(vec![Tensor::scalar(value)]))
    }
}
