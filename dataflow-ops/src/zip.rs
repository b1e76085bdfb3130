//! Combines several datasets element-wise

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use dataflow_core::{
    Dataset, DatasetIterator, DatasetRef, DType, Element, Error, IteratorContext, PartialShape,
    Result,
};

/// Emits one element per step, concatenating the components of each input's element
///
/// Ends as soon as any input ends.
pub struct ZipDataset {
    inputs: Vec<DatasetRef>,
    dtypes: Vec<DType>,
    shapes: Vec<PartialShape>,
}

impl ZipDataset {
    /// Zip `inputs`, of which there must be at least one
    pub fn new(inputs: Vec<DatasetRef>) -> Result<Self> {
        if inputs.is_empty() {
            return Err(Error::InvalidArgument(
                "ZipDataset requires at least one input dataset".into(),
            ));
        }
        let dtypes = inputs
            .iter()
            .flat_map(|d| d.output_dtypes().iter().copied())
            .collect();
        let shapes = inputs
            .iter()
            .flat_map(|d| d.output_shapes().iter().cloned())
            .collect();
        debug!(inputs = inputs.len(), "Created ZipDataset");
        Ok(Self {
            inputs,
            dtypes,
            shapes,
        })
    }
}

impl Dataset for ZipDataset {
    fn output_dtypes(&self) -> &[DType] {
        &self.dtypes
    }

    fn output_shapes(&self) -> &[PartialShape] {
        &self.shapes
    }

    fn make_iterator(self: Arc<Self>) -> Box<dyn DatasetIterator> {
        let inputs = self
            .inputs
            .iter()
            .map(|d| Arc::clone(d).make_iterator())
            .collect();
        Box::new(ZipIterator {
            state: Mutex::new(ZipState {
                inputs,
                exhausted: false,
            }),
            _dataset: self,
        })
    }

    fn debug_string(&self) -> String {
        format!("ZipDatasetOp::Dataset({})", self.inputs.len())
    }
}

struct ZipState {
    inputs: Vec<Box<dyn DatasetIterator>>,
    exhausted: bool,
}

struct ZipIterator {
    _dataset: Arc<ZipDataset>,
    state: Mutex<ZipState>,
}

impl DatasetIterator for ZipIterator {
    fn get_next(&self, ctx: &IteratorContext) -> Result<Option<Element>> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if state.exhausted {
            return Ok(None);
        }
        let mut out = Vec::new();
        for input in &state.inputs {
            match input.get_next(ctx)? {
                Some(element) => out.extend(element),
                None => {
                    state.exhausted = true;
                    trace!("ZipDataset reached end of sequence");
                    return Ok(None);
                }
            }
        }
        Ok(Some(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ext::{DatasetExt, IntoDatasetRef};
    use crate::tensor_slice::TensorSliceDataset;
    use crate::util::testing::{drain, ints};
    use dataflow_core::Tensor;

    #[test]
    fn test_zip_stops_at_shortest() {
        let words = TensorSliceDataset::new(vec![Tensor::vector(vec!["a".to_string(), "b".to_string()])])
            .unwrap()
            .into_ref();
        let zipped = ints(&[1, 2, 3]).zip(vec![words]).unwrap();
        assert_eq!(zipped.output_dtypes(), &[DType::Int64, DType::String]);

        let elements = drain(&zipped);
        assert_eq!(elements.len(), 2);
        assert_eq!(elements[1][0].scalar_value::<i64>().unwrap(), 2);
        assert_eq!(elements[1][1].scalar_value::<String>().unwrap(), "b");
    }

    #[test]
    fn test_zip_requires_inputs() {
        assert!(matches!(ZipDataset::new(vec![]), Err(Error::InvalidArgument(_))));
    }
}
