//! Drops a prefix of a dataset

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use dataflow_core::{
    Dataset, DatasetIterator, DatasetRef, DType, Element, IteratorContext, PartialShape, Result,
};

/// Drops the first `count` elements of its input; a negative count drops all of them
pub struct SkipDataset {
    input: DatasetRef,
    count: i64,
}

impl SkipDataset {
    /// Wrap `input`
    pub fn new(input: DatasetRef, count: i64) -> Self {
        debug!(count, "Created SkipDataset");
        Self { input, count }
    }
}

impl Dataset for SkipDataset {
    fn output_dtypes(&self) -> &[DType] {
        self.input.output_dtypes()
    }

    fn output_shapes(&self) -> &[PartialShape] {
        self.input.output_shapes()
    }

    fn make_iterator(self: Arc<Self>) -> Box<dyn DatasetIterator> {
        let input = Arc::clone(&self.input).make_iterator();
        Box::new(SkipIterator {
            dataset: self,
            state: Mutex::new(SkipState { input, skipped: 0 }),
        })
    }

    fn debug_string(&self) -> String {
        format!("SkipDatasetOp({})::Dataset", self.count)
    }
}

struct SkipState {
    input: Box<dyn DatasetIterator>,
    skipped: i64,
}

struct SkipIterator {
    dataset: Arc<SkipDataset>,
    state: Mutex<SkipState>,
}

impl DatasetIterator for SkipIterator {
    fn get_next(&self, ctx: &IteratorContext) -> Result<Option<Element>> {
        let mut state = self.state.lock();
        let count = self.dataset.count;
        while count < 0 || state.skipped < count {
            if state.input.get_next(ctx)?.is_none() {
                return Ok(None);
            }
            state.skipped += 1;
        }
        state.input.get_next(ctx)
    }
}

#[cfg(test)]
mod tests {
    use crate::ext::DatasetExt;
    use crate::util::testing::{drain, ints, scalars};
    use test_case::test_case;

    #[test_case(1, &[2, 3] ; "prefix")]
    #[test_case(0, &[1, 2, 3] ; "nothing")]
    #[test_case(5, &[] ; "more than available")]
    #[test_case(-1, &[] ; "everything")]
    fn test_skip(count: i64, expected: &[i64]) {
        assert_eq!(scalars(&drain(&ints(&[1, 2, 3]).skip(count))), expected);
    }
}
