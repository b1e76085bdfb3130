//! Fluent pipeline construction on [`DatasetRef`]

use std::sync::Arc;

use dataflow_core::{
    CapturedFunction, Dataset, DatasetRef, DType, FunctionRef, PartialShape, PipelineContext,
    Result, Tensor, TensorShape,
};

use crate::batch::BatchDataset;
use crate::dense_to_sparse_batch::DenseToSparseBatchDataset;
use crate::filter::FilterDataset;
use crate::map::MapDataset;
use crate::repeat::RepeatDataset;
use crate::shuffle::ShuffleDataset;
use crate::skip::SkipDataset;
use crate::take::TakeDataset;
use crate::zip::ZipDataset;

/// Wrap a concrete dataset in a shared [`DatasetRef`]
pub trait IntoDatasetRef {
    /// Move `self` behind an `Arc`
    fn into_ref(self) -> DatasetRef;
}

impl<T: Dataset + 'static> IntoDatasetRef for T {
    fn into_ref(self) -> DatasetRef {
        Arc::new(self)
    }
}

/// Builder methods that wrap a dataset in a transform
///
/// Each method leaves `self` untouched and returns a new dataset holding a
/// reference to it.
pub trait DatasetExt {
    /// See [`BatchDataset`]
    fn batch(&self, batch_size: i64) -> Result<DatasetRef>;

    /// See [`DenseToSparseBatchDataset`]
    fn dense_to_sparse_batch(
        &self,
        batch_size: i64,
        row_shape: impl Into<TensorShape>,
    ) -> Result<DatasetRef>;

    /// See [`FilterDataset`]; `predicate` is resolved in `ctx`'s function library
    fn filter(
        &self,
        ctx: &PipelineContext,
        predicate: &FunctionRef,
        captured_inputs: Vec<Tensor>,
    ) -> Result<DatasetRef>;

    /// See [`MapDataset`]; `func` is resolved in `ctx`'s function library
    fn map(
        &self,
        ctx: &PipelineContext,
        func: &FunctionRef,
        captured_inputs: Vec<Tensor>,
        output_dtypes: Vec<DType>,
        output_shapes: Vec<PartialShape>,
    ) -> Result<DatasetRef>;

    /// See [`ZipDataset`]; `self` supplies the leading components
    fn zip(&self, others: Vec<DatasetRef>) -> Result<DatasetRef>;

    /// See [`ShuffleDataset`]
    ///
    /// When both seeds are zero and `ctx` configures a `shuffle_seed`, that
    /// seed is used instead of a random one.
    fn shuffle(
        &self,
        ctx: &PipelineContext,
        buffer_size: i64,
        seed: i64,
        seed2: i64,
    ) -> Result<DatasetRef>;

    /// See [`TakeDataset`]
    fn take(&self, count: i64) -> DatasetRef;

    /// See [`SkipDataset`]
    fn skip(&self, count: i64) -> DatasetRef;

    /// See [`RepeatDataset`]
    fn repeat(&self, count: i64) -> DatasetRef;
}

impl DatasetExt for DatasetRef {
    fn batch(&self, batch_size: i64) -> Result<DatasetRef> {
        Ok(BatchDataset::new(Arc::clone(self), batch_size)?.into_ref())
    }

    fn dense_to_sparse_batch(
        &self,
        batch_size: i64,
        row_shape: impl Into<TensorShape>,
    ) -> Result<DatasetRef> {
        Ok(DenseToSparseBatchDataset::new(Arc::clone(self), batch_size, row_shape.into())?.into_ref())
    }

    fn filter(
        &self,
        ctx: &PipelineContext,
        predicate: &FunctionRef,
        captured_inputs: Vec<Tensor>,
    ) -> Result<DatasetRef> {
        let predicate = CapturedFunction::create(ctx, predicate, captured_inputs)?;
        Ok(FilterDataset::new(Arc::clone(self), predicate).into_ref())
    }

    fn map(
        &self,
        ctx: &PipelineContext,
        func: &FunctionRef,
        captured_inputs: Vec<Tensor>,
        output_dtypes: Vec<DType>,
        output_shapes: Vec<PartialShape>,
    ) -> Result<DatasetRef> {
        let func = CapturedFunction::create(ctx, func, captured_inputs)?;
        Ok(MapDataset::new(Arc::clone(self), func, output_dtypes, output_shapes)?.into_ref())
    }

    fn zip(&self, others: Vec<DatasetRef>) -> Result<DatasetRef> {
        let mut inputs = Vec::with_capacity(others.len() + 1);
        inputs.push(Arc::clone(self));
        inputs.extend(others);
        Ok(ZipDataset::new(inputs)?.into_ref())
    }

    fn shuffle(
        &self,
        ctx: &PipelineContext,
        buffer_size: i64,
        seed: i64,
        seed2: i64,
    ) -> Result<DatasetRef> {
        let (seed, seed2) = match ctx.config().shuffle_seed {
            Some(fixed) if seed == 0 && seed2 == 0 => (fixed as i64, 1),
            _ => (seed, seed2),
        };
        Ok(ShuffleDataset::new(Arc::clone(self), buffer_size, seed, seed2)?.into_ref())
    }

    fn take(&self, count: i64) -> DatasetRef {
        TakeDataset::new(Arc::clone(self), count).into_ref()
    }

    fn skip(&self, count: i64) -> DatasetRef {
        SkipDataset::new(Arc::clone(self), count).into_ref()
    }

    fn repeat(&self, count: i64) -> DatasetRef {
        RepeatDataset::new(Arc::clone(self), count).into_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::testing::{drain, ints, scalars};
    use dataflow_core::PipelineConfig;

    #[test]
    fn test_configured_shuffle_seed() {
        let config = PipelineConfig {
            shuffle_seed: Some(11),
            inline_functions: true,
            ..PipelineConfig::default()
        };
        let ctx = PipelineContext::new(config).unwrap();
        let values: Vec<i64> = (0..40).collect();
        let a = ints(&values).shuffle(&ctx, 40, 0, 0).unwrap();
        let b = ints(&values).shuffle(&ctx, 40, 0, 0).unwrap();
        assert_eq!(scalars(&drain(&a)), scalars(&drain(&b)));
    }

    #[test]
    fn test_upstream_outlives_caller_handle() {
        let source = ints(&[1, 2, 3]);
        let pipeline = source.skip(1).take(1);
        drop(source);
        assert_eq!(scalars(&drain(&pipeline)), vec![2]);
    }

    #[test]
    fn test_upstream_refcount_follows_wrappers() {
        let source = ints(&[1]);
        let batched = source.batch(1).unwrap();
        assert_eq!(Arc::strong_count(&source), 2);
        // the iterator holds the batch dataset and its own upstream iterator
        let iterator = Arc::clone(&batched).make_iterator();
        assert_eq!(Arc::strong_count(&source), 3);
        drop(batched);
        assert_eq!(Arc::strong_count(&source), 3);
        drop(iterator);
        assert_eq!(Arc::strong_count(&source), 1);
    }
}
