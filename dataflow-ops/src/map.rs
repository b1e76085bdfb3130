//! Applies a function to every element

use std::sync::Arc;

use tracing::debug;

use dataflow_core::{
    CapturedFunction, Dataset, DatasetIterator, DatasetRef, DType, Element, Error, FunctionOptions,
    IteratorContext, PartialShape, Result,
};

/// Emits `f(element)` for each upstream element
///
/// Output dtypes and shapes are the ones declared at construction; they are
/// not inferred from `f`.
pub struct MapDataset {
    input: DatasetRef,
    func: CapturedFunction,
    output_dtypes: Vec<DType>,
    output_shapes: Vec<PartialShape>,
}

impl MapDataset {
    /// Wrap `input` with the declared output signature of `func`
    pub fn new(
        input: DatasetRef,
        func: CapturedFunction,
        output_dtypes: Vec<DType>,
        output_shapes: Vec<PartialShape>,
    ) -> Result<Self> {
        if output_dtypes.is_empty() {
            return Err(Error::InvalidArgument(
                "MapDataset requires at least one output type".into(),
            ));
        }
        if output_dtypes.len() != output_shapes.len() {
            return Err(Error::InvalidArgument(format!(
                "MapDataset declares {} output types but {} output shapes",
                output_dtypes.len(),
                output_shapes.len()
            )));
        }
        debug!(
            func = func.func_ref().name(),
            outputs = output_dtypes.len(),
            "Created MapDataset"
        );
        Ok(Self {
            input,
            func,
            output_dtypes,
            output_shapes,
        })
    }
}

impl Dataset for MapDataset {
    fn output_dtypes(&self) -> &[DType] {
        &self.output_dtypes
    }

    fn output_shapes(&self) -> &[PartialShape] {
        &self.output_shapes
    }

    fn make_iterator(self: Arc<Self>) -> Box<dyn DatasetIterator> {
        let input = Arc::clone(&self.input).make_iterator();
        Box::new(MapIterator {
            dataset: self,
            input,
        })
    }

    fn debug_string(&self) -> String {
        "MapDatasetOp::Dataset".to_string()
    }
}

struct MapIterator {
    dataset: Arc<MapDataset>,
    input: Box<dyn DatasetIterator>,
}

impl DatasetIterator for MapIterator {
    fn get_next(&self, ctx: &IteratorContext) -> Result<Option<Element>> {
        let Some(element) = self.input.get_next(ctx)? else {
            return Ok(None);
        };
        let opts = FunctionOptions::for_iterator(ctx);
        self.dataset.func.run(&opts, element).map(Some)
    }
}
