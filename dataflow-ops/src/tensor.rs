//! A source that emits one fixed element

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use dataflow_core::{
    Dataset, DatasetIterator, DType, Element, Error, IteratorContext, PartialShape, Result, Tensor,
};

/// Emits its component tuple exactly once
pub struct TensorDataset {
    components: Vec<Tensor>,
    dtypes: Vec<DType>,
    shapes: Vec<PartialShape>,
}

impl TensorDataset {
    /// Create a dataset whose single element is `components`
    pub fn new(components: Vec<Tensor>) -> Result<Self> {
        if components.is_empty() {
            return Err(Error::InvalidArgument(
                "TensorDataset requires at least one component".into(),
            ));
        }
        let dtypes = components.iter().map(Tensor::dtype).collect();
        let shapes = components.iter().map(|t| PartialShape::from(t.shape())).collect();
        debug!(components = components.len(), "Created TensorDataset");
        Ok(Self {
            components,
            dtypes,
            shapes,
        })
    }
}

impl Dataset for TensorDataset {
    fn output_dtypes(&self) -> &[DType] {
        &self.dtypes
    }

    fn output_shapes(&self) -> &[PartialShape] {
        &self.shapes
    }

    fn make_iterator(self: Arc<Self>) -> Box<dyn DatasetIterator> {
        Box::new(TensorIterator {
            dataset: self,
            produced: Mutex::new(false),
        })
    }

    fn debug_string(&self) -> String {
        "TensorDatasetOp::Dataset".to_string()
    }
}

struct TensorIterator {
    dataset: Arc<TensorDataset>,
    produced: Mutex<bool>,
}

impl DatasetIterator for TensorIterator {
    fn get_next(&self, _ctx: &IteratorContext) -> Result<Option<Element>> {
        let mut produced = self.produced.lock();
        if *produced {
            return Ok(None);
        }
        *produced = true;
        Ok(Some(self.dataset.components.clone()))
    }
}
