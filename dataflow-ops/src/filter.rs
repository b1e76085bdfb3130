//! Keeps the elements a predicate accepts

use std::sync::Arc;

use tracing::debug;

use dataflow_core::{
    CapturedFunction, Dataset, DatasetIterator, DatasetRef, DType, Element, Error, FunctionOptions,
    IteratorContext, PartialShape, Result, Tensor,
};

/// Emits the upstream elements for which `predicate` returns `true`
///
/// The predicate receives each element's components followed by its captured
/// inputs and must return a single scalar `bool`.
pub struct FilterDataset {
    input: DatasetRef,
    predicate: CapturedFunction,
}

impl FilterDataset {
    /// Wrap `input`
    pub fn new(input: DatasetRef, predicate: CapturedFunction) -> Self {
        debug!(
            predicate = predicate.func_ref().name(),
            input = %input.debug_string(),
            "Created FilterDataset"
        );
        Self { input, predicate }
    }
}

impl Dataset for FilterDataset {
    fn output_dtypes(&self) -> &[DType] {
        self.input.output_dtypes()
    }

    fn output_shapes(&self) -> &[PartialShape] {
        self.input.output_shapes()
    }

    fn make_iterator(self: Arc<Self>) -> Box<dyn DatasetIterator> {
        let input = Arc::clone(&self.input).make_iterator();
        Box::new(FilterIterator {
            dataset: self,
            input,
        })
    }

    fn debug_string(&self) -> String {
        "FilterDatasetOp::Dataset".to_string()
    }
}

/// Concurrent callers each pull from the shared upstream iterator, so the
/// relative order of their results is not defined.
struct FilterIterator {
    dataset: Arc<FilterDataset>,
    input: Box<dyn DatasetIterator>,
}

impl DatasetIterator for FilterIterator {
    fn get_next(&self, ctx: &IteratorContext) -> Result<Option<Element>> {
        loop {
            let Some(element) = self.input.get_next(ctx)? else {
                return Ok(None);
            };
            let opts = FunctionOptions::for_iterator(ctx);
            let result = self.dataset.predicate.run(&opts, element.clone())?;
            if accepted(&result)? {
                return Ok(Some(element));
            }
        }
    }
}

fn accepted(result: &[Tensor]) -> Result<bool> {
    match result {
        [value] if value.dtype() == DType::Bool && value.num_elements() == 1 => {
            value.scalar_value::<bool>()
        }
        _ => Err(Error::InvalidArgument(
            "Filter predicate `f` must return a scalar bool.".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ext::DatasetExt;
    use crate::util::testing::{drain, ints, scalars};
    use dataflow_core::{ErrorCode, FunctionRef, PipelineContext};

    fn context() -> PipelineContext {
        let ctx = PipelineContext::inline();
        let functions = ctx.function_library();
        functions
            .register_fn("is_even", |_ctx, args| {
                Ok(vec![Tensor::scalar(args[0].scalar_value::<i64>()? % 2 == 0)])
            })
            .unwrap();
        functions
            .register_fn("greater_than", |_ctx, args| {
                let x = args[0].scalar_value::<i64>()?;
                let bound = args[1].scalar_value::<i64>()?;
                Ok(vec![Tensor::scalar(x > bound)])
            })
            .unwrap();
        functions
            .register_fn("never", |_ctx, _args| Ok(vec![Tensor::scalar(false)]))
            .unwrap();
        functions
            .register_fn("not_bool", |_ctx, args| Ok(vec![args[0].clone()]))
            .unwrap();
        functions
            .register_fn("two_bools", |_ctx, _args| {
                Ok(vec![Tensor::vector(vec![true, true])])
            })
            .unwrap();
        ctx
    }

    #[test]
    fn test_keeps_even_numbers() {
        let ctx = context();
        let filtered = ints(&[1, 2, 3, 4, 5, 6])
            .filter(&ctx, &FunctionRef::new("is_even"), vec![])
            .unwrap();
        assert_eq!(scalars(&drain(&filtered)), vec![2, 4, 6]);
    }

    #[test]
    fn test_captured_inputs_reach_predicate() {
        let ctx = context();
        let filtered = ints(&[5, 1, 9, 3, 7])
            .filter(&ctx, &FunctionRef::new("greater_than"), vec![Tensor::scalar(4i64)])
            .unwrap();
        assert_eq!(scalars(&drain(&filtered)), vec![5, 9, 7]);
    }

    #[test]
    fn test_predicate_rejecting_everything() {
        let ctx = context();
        let filtered = ints(&[1, 2, 3])
            .filter(&ctx, &FunctionRef::new("never"), vec![])
            .unwrap();
        assert!(drain(&filtered).is_empty());
    }

    #[test]
    fn test_non_scalar_bool_result() {
        let ctx = context();
        for name in ["not_bool", "two_bools"] {
            let filtered = ints(&[1]).filter(&ctx, &FunctionRef::new(name), vec![]).unwrap();
            let iterator = filtered.make_iterator();
            let err = iterator.get_next(&ctx.iterator_context()).unwrap_err();
            assert_eq!(err.code(), ErrorCode::InvalidArgument);
        }
    }

    #[test]
    fn test_unknown_predicate() {
        let ctx = context();
        let err = ints(&[1])
            .filter(&ctx, &FunctionRef::new("missing"), vec![])
            .err()
            .unwrap();
        assert_eq!(err.code(), ErrorCode::NotFound);
    }
}
