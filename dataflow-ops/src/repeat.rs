//! Replays a dataset several times

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use dataflow_core::{
    Dataset, DatasetIterator, DatasetRef, DType, Element, IteratorContext, PartialShape, Result,
};

/// Replays its input `count` times, or forever when `count` is negative
///
/// Each epoch uses a fresh upstream iterator. An epoch that yields nothing
/// ends the repetition, so repeating an empty dataset terminates.
pub struct RepeatDataset {
    input: DatasetRef,
    count: i64,
}

impl RepeatDataset {
    /// Wrap `input`
    pub fn new(input: DatasetRef, count: i64) -> Self {
        debug!(count, "Created RepeatDataset");
        Self { input, count }
    }
}

impl Dataset for RepeatDataset {
    fn output_dtypes(&self) -> &[DType] {
        self.input.output_dtypes()
    }

    fn output_shapes(&self) -> &[PartialShape] {
        self.input.output_shapes()
    }

    fn make_iterator(self: Arc<Self>) -> Box<dyn DatasetIterator> {
        let input = (self.count != 0).then(|| Arc::clone(&self.input).make_iterator());
        Box::new(RepeatIterator {
            dataset: self,
            state: Mutex::new(RepeatState {
                input,
                epoch: 0,
                produced_in_epoch: false,
            }),
        })
    }

    fn debug_string(&self) -> String {
        format!("RepeatDatasetOp({})::Dataset", self.count)
    }
}

struct RepeatState {
    /// `None` once every epoch has been consumed
    input: Option<Box<dyn DatasetIterator>>,
    epoch: i64,
    produced_in_epoch: bool,
}

struct RepeatIterator {
    dataset: Arc<RepeatDataset>,
    state: Mutex<RepeatState>,
}

impl DatasetIterator for RepeatIterator {
    fn get_next(&self, ctx: &IteratorContext) -> Result<Option<Element>> {
        let count = self.dataset.count;
        let mut state = self.state.lock();
        loop {
            let Some(input) = state.input.as_ref() else {
                return Ok(None);
            };
            if let Some(element) = input.get_next(ctx)? {
                state.produced_in_epoch = true;
                return Ok(Some(element));
            }

            state.epoch += 1;
            let finished = (count >= 0 && state.epoch >= count) || !state.produced_in_epoch;
            if finished {
                trace!(epochs = state.epoch, "RepeatDataset reached end of sequence");
                state.input = None;
                return Ok(None);
            }
            state.produced_in_epoch = false;
            state.input = Some(Arc::clone(&self.dataset.input).make_iterator());
        }
    }
}
