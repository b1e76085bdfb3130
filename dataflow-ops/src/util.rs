//! Helpers shared by operator constructors

use dataflow_core::{DType, Error, Result};

/// Validate a user-supplied batch size
pub(crate) fn positive_batch_size(batch_size: i64) -> Result<usize> {
    usize::try_from(batch_size)
        .ok()
        .filter(|n| *n > 0)
        .ok_or_else(|| Error::InvalidArgument(format!("Batch size must be greater than zero, got {batch_size}.")))
}

/// Upper bound on buffer space reserved ahead of the elements that fill it
const MAX_PREALLOCATED: usize = 1024;

/// Capacity to reserve for a buffer that holds at most `limit` elements
pub(crate) fn preallocated(limit: usize) -> usize {
    limit.min(MAX_PREALLOCATED)
}

/// Reject component dtypes the stacking operators cannot copy
pub(crate) fn check_batchable(op: &str, dtypes: &[DType]) -> Result<()> {
    match dtypes.iter().find(|d| !d.is_batchable()) {
        Some(dtype) => Err(Error::Unimplemented(format!(
            "{op} does not support components of dtype {dtype}"
        ))),
        None => Ok(()),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use dataflow_core::{
        DType, Dataset, DatasetIterator, DatasetRef, Element, IteratorContext, PartialShape, Result,
        Tensor,
    };

    use crate::ext::IntoDatasetRef;
    use crate::tensor_slice::TensorSliceDataset;

    /// A dataset of `int64` scalars
    pub fn ints(values: &[i64]) -> DatasetRef {
        TensorSliceDataset::new(vec![Tensor::vector(values.to_vec())])
            .unwrap()
            .into_ref()
    }

    /// A single-component dataset replaying `elements`, whose shapes may vary
    pub fn elements(dtype: DType, elements: Vec<Element>) -> DatasetRef {
        Arc::new(Replay {
            dtypes: vec![dtype],
            shapes: vec![PartialShape::unknown()],
            elements,
        })
    }

    struct Replay {
        dtypes: Vec<DType>,
        shapes: Vec<PartialShape>,
        elements: Vec<Element>,
    }

    impl Dataset for Replay {
        fn output_dtypes(&self) -> &[DType] {
            &self.dtypes
        }

        fn output_shapes(&self) -> &[PartialShape] {
            &self.shapes
        }

        fn make_iterator(self: Arc<Self>) -> Box<dyn DatasetIterator> {
            Box::new(ReplayIterator {
                dataset: self,
                next: Mutex::new(0),
            })
        }

        fn debug_string(&self) -> String {
            "Replay".to_string()
        }
    }

    struct ReplayIterator {
        dataset: Arc<Replay>,
        next: Mutex<usize>,
    }

    impl DatasetIterator for ReplayIterator {
        fn get_next(&self, _ctx: &IteratorContext) -> Result<Option<Element>> {
            let mut next = self.next.lock();
            let element = self.dataset.elements.get(*next).cloned();
            if element.is_some() {
                *next += 1;
            }
            Ok(element)
        }
    }

    /// Pull every element of a fresh iterator, then check it stays exhausted
    pub fn drain(dataset: &DatasetRef) -> Vec<Element> {
        let ctx = IteratorContext::default();
        let iterator = Arc::clone(dataset).make_iterator();
        let mut out = Vec::new();
        while let Some(element) = iterator.get_next(&ctx).unwrap() {
            out.push(element);
        }
        assert_exhausted(iterator.as_ref(), &ctx);
        out
    }

    /// An exhausted iterator must keep reporting end of sequence
    pub fn assert_exhausted(iterator: &dyn DatasetIterator, ctx: &IteratorContext) {
        for _ in 0..3 {
            assert!(iterator.get_next(ctx).unwrap().is_none());
        }
    }

    /// Scalar `int64` values of the first component of each element
    pub fn scalars(elements: &[Element]) -> Vec<i64> {
        elements
            .iter()
            .map(|e| e[0].scalar_value::<i64>().unwrap())
            .collect()
    }
}
