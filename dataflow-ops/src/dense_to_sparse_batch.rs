//! Packs dense elements of varying shape into sparse batches

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use dataflow_core::{
    Dataset, DatasetIterator, DatasetRef, DType, Element, Error, IteratorContext, PartialShape,
    Result, Tensor, TensorData, TensorShape,
};

use crate::util::{check_batchable, positive_batch_size, preallocated};

/// Combines up to `batch_size` single-component elements into one sparse
/// `(indices, values, dense_shape)` triple
///
/// Row `i` of the batch holds element `i`; each element may be smaller than
/// `row_shape` in any dimension but must have the same rank.
pub struct DenseToSparseBatchDataset {
    input: DatasetRef,
    batch_size: usize,
    row_shape: TensorShape,
    dtypes: Vec<DType>,
    shapes: Vec<PartialShape>,
}

impl DenseToSparseBatchDataset {
    /// Wrap `input`, which must produce exactly one component
    pub fn new(input: DatasetRef, batch_size: i64, row_shape: TensorShape) -> Result<Self> {
        if input.output_dtypes().len() != 1 {
            return Err(Error::InvalidArgument(
                "DenseToSparseBatchDataset only supports inputs with a single component.".into(),
            ));
        }
        let batch_size = positive_batch_size(batch_size)?;
        check_batchable("DenseToSparseBatchDataset", input.output_dtypes())?;

        let rank = row_shape.rank();
        let dtypes = vec![DType::Int64, input.output_dtypes()[0], DType::Int64];
        let shapes = vec![
            PartialShape::new(vec![None, Some(rank + 1)]),
            PartialShape::new(vec![None]),
            PartialShape::new(vec![Some(rank + 1)]),
        ];
        debug!(batch_size, %row_shape, "Created DenseToSparseBatchDataset");
        Ok(Self {
            input,
            batch_size,
            row_shape,
            dtypes,
            shapes,
        })
    }

    /// Check one accumulated row against the declared row shape
    fn check_row(&self, row: &Tensor) -> Result<()> {
        let shape = row.shape();
        if shape.rank() != self.row_shape.rank() {
            return Err(Error::InvalidArgument(format!(
                "Input element had shape ({shape}) that is incompatible with the row shape ({}).",
                self.row_shape
            )));
        }
        if shape.dims().iter().zip(self.row_shape.dims()).any(|(d, bound)| d > bound) {
            return Err(Error::DataLoss(format!(
                "Input element had shape ({shape}) that is larger than the row shape ({}).",
                self.row_shape
            )));
        }
        Ok(())
    }

    fn pack(&self, rows: &[Tensor]) -> Result<Element> {
        let rank = self.row_shape.rank();
        let total: usize = rows.iter().map(Tensor::num_elements).sum();

        let mut indices = Vec::with_capacity(total * (rank + 1));
        let mut values = TensorData::zeros(self.dtypes[1], total)?;
        let mut position = 0;
        for (i, row) in rows.iter().enumerate() {
            // strides follow the element's own shape, not the row shape
            let strides = row.shape().strides();
            for j in 0..row.num_elements() {
                indices.push(i as i64);
                let mut remainder = j;
                for &stride in &strides {
                    indices.push((remainder / stride) as i64);
                    remainder %= stride;
                }
            }
            values.copy_from_at(position, row.data())?;
            position += row.num_elements();
        }

        let mut dense_shape = Vec::with_capacity(rank + 1);
        dense_shape.push(rows.len() as i64);
        dense_shape.extend(self.row_shape.dims().iter().map(|&d| d as i64));

        Ok(vec![
            Tensor::from_vec(indices, [total, rank + 1])?,
            Tensor::new(self.dtypes[1], [total], values)?,
            Tensor::vector(dense_shape),
        ])
    }
}

impl Dataset for DenseToSparseBatchDataset {
    fn output_dtypes(&self) -> &[DType] {
        &self.dtypes
    }

    fn output_shapes(&self) -> &[PartialShape] {
        &self.shapes
    }

    fn make_iterator(self: Arc<Self>) -> Box<dyn DatasetIterator> {
        let input = Arc::clone(&self.input).make_iterator();
        Box::new(DenseToSparseBatchIterator {
            dataset: self,
            input: Mutex::new(input),
        })
    }

    fn debug_string(&self) -> String {
        format!(
            "DenseToSparseBatchDatasetOp({}, {})::Dataset",
            self.batch_size, self.row_shape
        )
    }
}

struct DenseToSparseBatchIterator {
    dataset: Arc<DenseToSparseBatchDataset>,
    input: Mutex<Box<dyn DatasetIterator>>,
}

impl DatasetIterator for DenseToSparseBatchIterator {
    fn get_next(&self, ctx: &IteratorContext) -> Result<Option<Element>> {
        let dataset = &self.dataset;
        let mut rows = Vec::with_capacity(preallocated(dataset.batch_size));
        {
            let input = self.input.lock();
            while rows.len() < dataset.batch_size {
                let Some(mut element) = input.get_next(ctx)? else {
                    break;
                };
                if element.len() != 1 {
                    return Err(Error::InvalidArgument(format!(
                        "DenseToSparseBatchDataset expected 1 component, got {}",
                        element.len()
                    )));
                }
                let row = element.swap_remove(0);
                dataset.check_row(&row)?;
                rows.push(row);
            }
        }

        if rows.is_empty() {
            trace!("DenseToSparseBatchDataset reached end of sequence");
            return Ok(None);
        }
        dataset.pack(&rows).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ext::{DatasetExt, IntoDatasetRef};
    use crate::util::testing::{drain, elements, ints};
    use crate::zip::ZipDataset;
    use dataflow_core::{ErrorCode, SparseTensor};
    use test_case::test_case;

    /// Ragged `int32` vectors, one per element
    fn ragged(rows: &[&[i32]]) -> DatasetRef {
        elements(
            DType::Int32,
            rows.iter().map(|r| vec![Tensor::vector(r.to_vec())]).collect(),
        )
    }

    #[test]
    fn test_packs_ragged_rows() {
        let dataset = ragged(&[&[1, 2], &[3], &[], &[4, 5, 6]])
            .dense_to_sparse_batch(3, TensorShape::new(vec![4]))
            .unwrap();
        assert_eq!(dataset.output_dtypes(), &[DType::Int64, DType::Int32, DType::Int64]);
        assert_eq!(dataset.output_shapes()[0], PartialShape::new(vec![None, Some(2)]));

        let batches = drain(&dataset);
        assert_eq!(batches.len(), 2);

        let first = &batches[0];
        assert_eq!(first[0].shape().dims(), &[3, 2]);
        assert_eq!(first[0].as_slice::<i64>().unwrap(), &[0, 0, 0, 1, 1, 0]);
        assert_eq!(first[1].as_slice::<i32>().unwrap(), &[1, 2, 3]);
        assert_eq!(first[2].as_slice::<i64>().unwrap(), &[3, 4]);

        let last = &batches[1];
        assert_eq!(last[0].as_slice::<i64>().unwrap(), &[0, 0, 0, 1, 0, 2]);
        assert_eq!(last[2].as_slice::<i64>().unwrap(), &[1, 4]);
    }

    #[test]
    fn test_round_trip_to_padded_dense() {
        let row_shape = TensorShape::new(vec![2, 3]);
        let a = Tensor::from_vec(vec![1i64, 2, 3, 4], [2, 2]).unwrap();
        let b = Tensor::from_vec(vec![5i64, 6, 7], [1, 3]).unwrap();
        let dataset = elements(DType::Int64, vec![vec![a], vec![b]])
            .dense_to_sparse_batch(2, row_shape)
            .unwrap();

        let mut batch = drain(&dataset).remove(0);
        let dense_shape = batch.pop().unwrap();
        let values = batch.pop().unwrap();
        let indices = batch.pop().unwrap();
        let dense = SparseTensor::new(indices, values, dense_shape)
            .unwrap()
            .to_dense()
            .unwrap();
        assert_eq!(dense.shape().dims(), &[2, 2, 3]);
        assert_eq!(
            dense.as_slice::<i64>().unwrap(),
            &[1, 2, 0, 3, 4, 0, 5, 6, 7, 0, 0, 0]
        );
    }

    #[test]
    fn test_row_larger_than_row_shape_is_data_loss() {
        let dataset = ragged(&[&[1, 2, 3]])
            .dense_to_sparse_batch(2, TensorShape::new(vec![2]))
            .unwrap();
        let iterator = dataset.make_iterator();
        let err = iterator.get_next(&IteratorContext::default()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::DataLoss);
    }

    #[test_case(&[2, 3], Some(ErrorCode::DataLoss) ; "second dim too large")]
    #[test_case(&[3, 1], Some(ErrorCode::DataLoss) ; "first dim too large")]
    #[test_case(&[2, 2], None ; "exact fit")]
    #[test_case(&[1, 2], None ; "smaller")]
    fn test_matrix_rows_against_row_shape(dims: &[usize], expected: Option<ErrorCode>) {
        let row = Tensor::zeros(DType::Int64, dims).unwrap();
        let dataset = elements(DType::Int64, vec![vec![row]])
            .dense_to_sparse_batch(2, TensorShape::new(vec![2, 2]))
            .unwrap();
        let result = dataset.make_iterator().get_next(&IteratorContext::default());
        assert_eq!(result.err().map(|e| e.code()), expected);
    }

    #[test]
    fn test_resource_component_rejected() {
        let err = DenseToSparseBatchDataset::new(
            elements(DType::Resource, vec![]),
            2,
            TensorShape::new(vec![1]),
        )
        .err()
        .unwrap();
        assert_eq!(err.code(), ErrorCode::Unimplemented);
    }

    #[test]
    fn test_batch_size_beyond_input_length() {
        let batches = drain(
            &ints(&[1, 2, 3])
                .dense_to_sparse_batch(i64::MAX, TensorShape::scalar())
                .unwrap(),
        );
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0][1].as_slice::<i64>().unwrap(), &[1, 2, 3]);
        assert_eq!(batches[0][2].as_slice::<i64>().unwrap(), &[3]);
    }

    #[test]
    fn test_rank_mismatch_is_invalid_argument() {
        let dataset = ragged(&[&[1]])
            .dense_to_sparse_batch(2, TensorShape::new(vec![2, 2]))
            .unwrap();
        let iterator = dataset.make_iterator();
        let err = iterator.get_next(&IteratorContext::default()).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
        assert!(err.to_string().contains("incompatible with the row shape"));
    }

    #[test]
    fn test_construction_checks() {
        let two = ZipDataset::new(vec![ints(&[1]), ints(&[2])]).unwrap().into_ref();
        let err = DenseToSparseBatchDataset::new(two, 2, TensorShape::new(vec![1]))
            .err()
            .unwrap();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);

        let err = DenseToSparseBatchDataset::new(ints(&[1]), 0, TensorShape::scalar())
            .err()
            .unwrap();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
    }

    #[test]
    fn test_scalar_rows() {
        let dataset = ints(&[7, 8, 9])
            .dense_to_sparse_batch(2, TensorShape::scalar())
            .unwrap();
        let batches = drain(&dataset);
        assert_eq!(batches[0][0].shape().dims(), &[2, 1]);
        assert_eq!(batches[0][0].as_slice::<i64>().unwrap(), &[0, 1]);
        assert_eq!(batches[0][2].as_slice::<i64>().unwrap(), &[2]);
        assert_eq!(batches[1][1].as_slice::<i64>().unwrap(), &[9]);
    }
}
