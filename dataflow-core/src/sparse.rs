//! Sparse tensors in `(indices, values, dense_shape)` form

use std::ops::Range;

use crate::dtype::DType;
use crate::error::{Error, Result};
use crate::shape::TensorShape;
use crate::tensor::Tensor;

/// A sparse array stored as coordinate triples
///
/// `indices` is an `int64` matrix `[N, rank]`, `values` a vector `[N]` and
/// `dense_shape` an `int64` vector `[rank]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseTensor {
    indices: Tensor,
    values: Tensor,
    dense_shape: Tensor,
}

impl SparseTensor {
    /// Build a sparse tensor, checking that the three parts agree
    pub fn new(indices: Tensor, values: Tensor, dense_shape: Tensor) -> Result<Self> {
        if indices.dtype() != DType::Int64 || indices.shape().rank() != 2 {
            return Err(Error::InvalidArgument(format!(
                "Input indices should be an int64 matrix but received {} tensor of shape {}",
                indices.dtype(),
                indices.shape()
            )));
        }
        if values.shape().rank() != 1 {
            return Err(Error::InvalidArgument(format!(
                "Input values should be a vector but received shape {}",
                values.shape()
            )));
        }
        if dense_shape.dtype() != DType::Int64 || dense_shape.shape().rank() != 1 {
            return Err(Error::InvalidArgument(format!(
                "Input shape should be an int64 vector but received {} tensor of shape {}",
                dense_shape.dtype(),
                dense_shape.shape()
            )));
        }
        let entries = indices.shape().dims()[0];
        let rank = indices.shape().dims()[1];
        if values.shape().dims()[0] != entries {
            return Err(Error::InvalidArgument(format!(
                "Number of values ({}) does not match number of indices ({entries})",
                values.shape().dims()[0]
            )));
        }
        if dense_shape.num_elements() != rank {
            return Err(Error::InvalidArgument(format!(
                "Indices have rank {rank} but dense shape has {} dimensions",
                dense_shape.num_elements()
            )));
        }
        if rank == 0 {
            return Err(Error::InvalidArgument(
                "Sparse tensor must have rank at least 1".into(),
            ));
        }

        let dims = dense_shape.as_slice::<i64>()?;
        if let Some(d) = dims.iter().find(|d| **d < 0) {
            return Err(Error::InvalidArgument(format!(
                "Dense shape has negative dimension {d}"
            )));
        }
        for (i, index) in indices.as_slice::<i64>()?.chunks(rank).enumerate() {
            for (j, (&coord, &bound)) in index.iter().zip(dims).enumerate() {
                if coord < 0 || coord >= bound {
                    return Err(Error::InvalidArgument(format!(
                        "indices[{i},{j}] = {coord} is out of bounds for dimension of size {bound}"
                    )));
                }
            }
        }

        Ok(Self {
            indices,
            values,
            dense_shape,
        })
    }

    /// Get the coordinate matrix
    pub fn indices(&self) -> &Tensor {
        &self.indices
    }

    /// Get the values vector
    pub fn values(&self) -> &Tensor {
        &self.values
    }

    /// Get the dense shape vector
    pub fn dense_shape(&self) -> &Tensor {
        &self.dense_shape
    }

    /// Get the value dtype
    pub fn dtype(&self) -> DType {
        self.values.dtype()
    }

    /// Number of dimensions of the dense array
    pub fn rank(&self) -> usize {
        self.dense_shape.num_elements()
    }

    /// Number of stored entries
    pub fn num_entries(&self) -> usize {
        self.values.num_elements()
    }

    /// Dense dimensions as sizes
    pub fn dense_dims(&self) -> Result<TensorShape> {
        let dims = self.dense_shape.as_slice::<i64>()?;
        TensorShape::from_signed(dims)
    }

    /// Leading coordinate of entry `i`
    fn leading_index(&self, i: usize) -> Result<i64> {
        Ok(self.indices.as_slice::<i64>()?[i * self.rank()])
    }

    /// Fail unless entries are sorted ascending by leading coordinate
    pub fn check_leading_order(&self) -> Result<()> {
        let rank = self.rank();
        let mut previous = -1;
        for index in self.indices.as_slice::<i64>()?.chunks(rank) {
            if index[0] < previous {
                return Err(Error::Unimplemented(
                    "The SparseTensor must be ordered in the batch dimension; handling arbitrarily ordered input is not currently supported.".into(),
                ));
            }
            previous = index[0];
        }
        Ok(())
    }

    /// Iterate runs of entries that share a leading coordinate
    pub fn groups(&self) -> Groups<'_> {
        Groups {
            tensor: self,
            cursor: GroupCursor::default(),
        }
    }

    /// Materialize as a dense tensor, filling absent positions with defaults
    pub fn to_dense(&self) -> Result<Tensor> {
        let shape = self.dense_dims()?;
        let strides = shape.strides();
        let mut dense = Tensor::zeros(self.dtype(), shape)?;
        let rank = self.rank();
        for (i, index) in self.indices.as_slice::<i64>()?.chunks(rank).enumerate() {
            let offset: usize = index
                .iter()
                .zip(&strides)
                .map(|(&c, &s)| c as usize * s)
                .sum();
            let value = self.values.data().slice_range(i..i + 1)?;
            dense.data_mut().copy_from_at(offset, &value)?;
        }
        Ok(dense)
    }

    /// Split into `[indices, values, dense_shape]` components
    pub fn into_components(self) -> Vec<Tensor> {
        vec![self.indices, self.values, self.dense_shape]
    }
}

/// Position within a leading-order sparse tensor
///
/// Holds no borrow, so an iterator can store it next to an owned
/// [`SparseTensor`] and advance one group per pull.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GroupCursor {
    next_entry: usize,
}

impl GroupCursor {
    /// Leading coordinate of the next group without consuming it
    pub fn peek(&self, tensor: &SparseTensor) -> Result<Option<i64>> {
        if self.next_entry >= tensor.num_entries() {
            return Ok(None);
        }
        tensor.leading_index(self.next_entry).map(Some)
    }

    /// Consume the next group, returning its leading coordinate and entry range
    pub fn next_group(&mut self, tensor: &SparseTensor) -> Result<Option<(i64, Range<usize>)>> {
        let Some(leading) = self.peek(tensor)? else {
            return Ok(None);
        };
        let start = self.next_entry;
        let mut end = start + 1;
        while end < tensor.num_entries() && tensor.leading_index(end)? == leading {
            end += 1;
        }
        self.next_entry = end;
        Ok(Some((leading, start..end)))
    }
}

/// Iterator over the entry groups of a [`SparseTensor`]
pub struct Groups<'a> {
    tensor: &'a SparseTensor,
    cursor: GroupCursor,
}

impl Iterator for Groups<'_> {
    type Item = Result<(i64, Range<usize>)>;

    fn next(&mut self) -> Option<Self::Item> {
        self.cursor.next_group(self.tensor).transpose()
    }
}
