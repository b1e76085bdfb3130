//! Truncates a dataset

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use dataflow_core::{
    Dataset, DatasetIterator, DatasetRef, DType, Element, IteratorContext, PartialShape, Result,
};

/// Emits at most `count` elements of its input; a negative count keeps all of them
pub struct TakeDataset {
    input: DatasetRef,
    count: i64,
}

impl TakeDataset {
    /// Wrap `input`
    pub fn new(input: DatasetRef, count: i64) -> Self {
        debug!(count, "Created TakeDataset");
        Self { input, count }
    }
}

impl Dataset for TakeDataset {
    fn output_dtypes(&self) -> &[DType] {
        self.input.output_dtypes()
    }

    fn output_shapes(&self) -> &[PartialShape] {
        self.input.output_shapes()
    }

    fn make_iterator(self: Arc<Self>) -> Box<dyn DatasetIterator> {
        let input = Arc::clone(&self.input).make_iterator();
        Box::new(TakeIterator {
            dataset: self,
            state: Mutex::new(TakeState { input, taken: 0 }),
        })
    }

    fn debug_string(&self) -> String {
        format!("TakeDatasetOp({})::Dataset", self.count)
    }
}

struct TakeState {
    input: Box<dyn DatasetIterator>,
    taken: i64,
}

struct TakeIterator {
    dataset: Arc<TakeDataset>,
    state: Mutex<TakeState>,
}

impl DatasetIterator for TakeIterator {
    fn get_next(&self, ctx: &IteratorContext) -> Result<Option<Element>> {
        let mut state = self.state.lock();
        let count = self.dataset.count;
        if count >= 0 && state.taken >= count {
            return Ok(None);
        }
        let next = state.input.get_next(ctx)?;
        if next.is_some() {
            state.taken += 1;
        }
        Ok(next)
    }
}
