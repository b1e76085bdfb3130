//! A source that slices its components along the leading dimension

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use dataflow_core::{
    Dataset, DatasetIterator, DType, Element, Error, IteratorContext, PartialShape, Result, Tensor,
};

/// Emits one element per index of the shared leading dimension
pub struct TensorSliceDataset {
    components: Vec<Tensor>,
    dtypes: Vec<DType>,
    shapes: Vec<PartialShape>,
    num_slices: usize,
}

impl TensorSliceDataset {
    /// Create a dataset over `components`, which must agree in their leading dimension
    pub fn new(components: Vec<Tensor>) -> Result<Self> {
        let Some(first) = components.first() else {
            return Err(Error::InvalidArgument(
                "TensorSliceDataset requires at least one component".into(),
            ));
        };
        let Some(num_slices) = first.shape().dim(0) else {
            return Err(Error::InvalidArgument(format!(
                "All components must be at least 1-dimensional, got shape {}",
                first.shape()
            )));
        };
        for (i, component) in components.iter().enumerate() {
            if component.dtype() == DType::Resource {
                return Err(Error::Unimplemented(format!(
                    "Component {i} is a resource tensor, which cannot be sliced"
                )));
            }
            if component.shape().dim(0) != Some(num_slices) {
                return Err(Error::InvalidArgument(format!(
                    "All components must have the same size in the 0th dimension: component 0 has shape {} but component {i} has shape {}",
                    first.shape(),
                    component.shape()
                )));
            }
        }

        let dtypes = components.iter().map(Tensor::dtype).collect();
        let shapes = components
            .iter()
            .map(|t| PartialShape::from(t.shape().without_leading()))
            .collect();
        debug!(components = components.len(), num_slices, "Created TensorSliceDataset");
        Ok(Self {
            components,
            dtypes,
            shapes,
            num_slices,
        })
    }

    /// Number of elements this dataset produces
    pub fn len(&self) -> usize {
        self.num_slices
    }

    /// Check if this dataset produces no elements
    pub fn is_empty(&self) -> bool {
        self.num_slices == 0
    }
}

impl Dataset for TensorSliceDataset {
    fn output_dtypes(&self) -> &[DType] {
        &self.dtypes
    }

    fn output_shapes(&self) -> &[PartialShape] {
        &self.shapes
    }

    fn make_iterator(self: Arc<Self>) -> Box<dyn DatasetIterator> {
        Box::new(TensorSliceIterator {
            dataset: self,
            next: Mutex::new(0),
        })
    }

    fn debug_string(&self) -> String {
        format!("TensorSliceDatasetOp::Dataset({})", self.num_slices)
    }
}

struct TensorSliceIterator {
    dataset: Arc<TensorSliceDataset>,
    next: Mutex<usize>,
}

impl DatasetIterator for TensorSliceIterator {
    fn get_next(&self, _ctx: &IteratorContext) -> Result<Option<Element>> {
        let mut next = self.next.lock();
        if *next >= self.dataset.num_slices {
            return Ok(None);
        }
        let element = self
            .dataset
            .components
            .iter()
            .map(|t| t.chip(*next))
            .collect::<Result<Element>>()?;
        *next += 1;
        Ok(Some(element))
    }
}
