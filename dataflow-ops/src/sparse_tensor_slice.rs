//! A source that emits one sparse row per leading index of a sparse tensor

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use dataflow_core::sparse::GroupCursor;
use dataflow_core::{
    Dataset, DatasetIterator, DType, Element, IteratorContext, PartialShape, Result, SparseTensor,
    Tensor,
};

use crate::util::check_batchable;

/// Emits each row of a batch-ordered [`SparseTensor`] as an
/// `(indices, values, dense_shape)` triple of one lower rank
pub struct SparseTensorSliceDataset {
    sparse: SparseTensor,
    num_rows: i64,
    row_dense_shape: Tensor,
    dtypes: Vec<DType>,
    shapes: Vec<PartialShape>,
}

impl SparseTensorSliceDataset {
    /// Create a dataset over `sparse`, whose entries must be sorted by leading index
    pub fn new(sparse: SparseTensor) -> Result<Self> {
        check_batchable("SparseTensorSliceDataset", &[sparse.dtype()])?;
        sparse.check_leading_order()?;

        let dense = sparse.dense_shape().as_slice::<i64>()?;
        let num_rows = dense[0];
        let row_dense_shape = Tensor::vector(dense[1..].to_vec());
        let row_rank = sparse.rank() - 1;
        let dtypes = vec![DType::Int64, sparse.dtype(), DType::Int64];
        let shapes = vec![
            PartialShape::new(vec![None, Some(row_rank)]),
            PartialShape::new(vec![None]),
            PartialShape::new(vec![Some(row_rank)]),
        ];
        debug!(
            num_rows,
            entries = sparse.num_entries(),
            dtype = %sparse.dtype(),
            "Created SparseTensorSliceDataset"
        );
        Ok(Self {
            sparse,
            num_rows,
            row_dense_shape,
            dtypes,
            shapes,
        })
    }

    fn empty_row(&self) -> Result<Element> {
        let row_rank = self.sparse.rank() - 1;
        Ok(vec![
            Tensor::zeros(DType::Int64, [0, row_rank])?,
            Tensor::zeros(self.sparse.dtype(), [0])?,
            self.row_dense_shape.clone(),
        ])
    }

    fn row(&self, entries: std::ops::Range<usize>) -> Result<Element> {
        let rank = self.sparse.rank();
        let count = entries.len();
        let indices: Vec<i64> = self.sparse.indices().as_slice::<i64>()?[entries.start * rank..entries.end * rank]
            .chunks(rank)
            .flat_map(|index| index[1..].iter().copied())
            .collect();
        let values = Tensor::new(
            self.sparse.dtype(),
            [count],
            self.sparse.values().data().slice_range(entries)?,
        )?;
        Ok(vec![
            Tensor::from_vec(indices, [count, rank - 1])?,
            values,
            self.row_dense_shape.clone(),
        ])
    }
}

impl Dataset for SparseTensorSliceDataset {
    fn output_dtypes(&self) -> &[DType] {
        &self.dtypes
    }

    fn output_shapes(&self) -> &[PartialShape] {
        &self.shapes
    }

    fn make_iterator(self: Arc<Self>) -> Box<dyn DatasetIterator> {
        Box::new(SparseTensorSliceIterator {
            dataset: self,
            state: Mutex::new(SliceState::default()),
        })
    }

    fn debug_string(&self) -> String {
        format!("SparseTensorSliceDatasetOp::Dataset<{}>", self.sparse.dtype())
    }
}

#[derive(Default)]
struct SliceState {
    row: i64,
    cursor: GroupCursor,
}

struct SparseTensorSliceIterator {
    dataset: Arc<SparseTensorSliceDataset>,
    state: Mutex<SliceState>,
}

impl DatasetIterator for SparseTensorSliceIterator {
    fn get_next(&self, _ctx: &IteratorContext) -> Result<Option<Element>> {
        let dataset = &self.dataset;
        let mut state = self.state.lock();
        if state.row >= dataset.num_rows {
            trace!(rows = dataset.num_rows, "SparseTensorSliceDataset exhausted");
            return Ok(None);
        }
        let row = state.row;
        state.row += 1;
        if state.cursor.peek(&dataset.sparse)? == Some(row) {
            if let Some((_, entries)) = state.cursor.next_group(&dataset.sparse)? {
                return dataset.row(entries).map(Some);
            }
        }
        dataset.empty_row().map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ext::IntoDatasetRef;
    use crate::util::testing::drain;
    use dataflow_core::Error;

    fn sparse(indices: Vec<i64>, values: Vec<f32>, dense: Vec<i64>) -> SparseTensor {
        let rank = dense.len();
        let n = values.len();
        SparseTensor::new(
            Tensor::from_vec(indices, [n, rank]).unwrap(),
            Tensor::vector(values),
            Tensor::vector(dense),
        )
        .unwrap()
    }

    #[test]
    fn test_rows_including_empty() {
        // rows 0 and 2 populated, row 1 and 3 empty
        let st = sparse(vec![0, 0, 0, 2, 2, 1], vec![1.0, 2.0, 3.0], vec![4, 3]);
        let dataset = SparseTensorSliceDataset::new(st).unwrap().into_ref();
        assert_eq!(dataset.output_dtypes(), &[DType::Int64, DType::Float32, DType::Int64]);
        assert_eq!(dataset.output_shapes()[0], PartialShape::new(vec![None, Some(1)]));

        let rows = drain(&dataset);
        assert_eq!(rows.len(), 4);

        assert_eq!(rows[0][0].shape().dims(), &[2, 1]);
        assert_eq!(rows[0][0].as_slice::<i64>().unwrap(), &[0, 2]);
        assert_eq!(rows[0][1].as_slice::<f32>().unwrap(), &[1.0, 2.0]);
        assert_eq!(rows[0][2].as_slice::<i64>().unwrap(), &[3]);

        for empty in [&rows[1], &rows[3]] {
            assert_eq!(empty[0].shape().dims(), &[0, 1]);
            assert_eq!(empty[1].shape().dims(), &[0]);
            assert_eq!(empty[2].as_slice::<i64>().unwrap(), &[3]);
        }

        assert_eq!(rows[2][0].as_slice::<i64>().unwrap(), &[1]);
        assert_eq!(rows[2][1].as_slice::<f32>().unwrap(), &[3.0]);
    }

    #[test]
    fn test_unordered_input_rejected() {
        let st = sparse(vec![1, 0, 0, 0], vec![1.0, 2.0], vec![2, 1]);
        let err = SparseTensorSliceDataset::new(st).err().unwrap();
        assert!(matches!(err, Error::Unimplemented(_)));
    }

    #[test]
    fn test_rank_one_input() {
        let st = sparse(vec![1], vec![5.0], vec![3]);
        let rows = drain(&SparseTensorSliceDataset::new(st).unwrap().into_ref());
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1][0].shape().dims(), &[1, 0]);
        assert_eq!(rows[1][1].as_slice::<f32>().unwrap(), &[5.0]);
        assert_eq!(rows[0][2].num_elements(), 0);
    }
}
