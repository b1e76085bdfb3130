//! Dense tensor values that make up the components of an element

use std::fmt;
use std::ops::Range;

use bytemuck::Pod;

use crate::dtype::{Complex128, Complex64, DType};
use crate::error::{Error, Result};
use crate::resource::ResourceHandle;
use crate::shape::TensorShape;

/// Typed, flat, row-major storage for tensor values
///
/// One variant per storage layout. Quantized dtypes reuse the integer variant
/// of the same width.
#[derive(Debug, Clone, PartialEq)]
pub enum TensorData {
    /// `float32` values
    Float32(Vec<f32>),
    /// `float64` values
    Float64(Vec<f64>),
    /// `int8` / `qint8` values
    Int8(Vec<i8>),
    /// `int16` / `qint16` values
    Int16(Vec<i16>),
    /// `int32` / `qint32` values
    Int32(Vec<i32>),
    /// `int64` values
    Int64(Vec<i64>),
    /// `uint8` / `quint8` values
    UInt8(Vec<u8>),
    /// `uint16` / `quint16` values
    UInt16(Vec<u16>),
    /// `bool` values
    Bool(Vec<bool>),
    /// `string` values
    String(Vec<String>),
    /// `complex64` values
    Complex64(Vec<Complex64>),
    /// `complex128` values
    Complex128(Vec<Complex128>),
    /// Resource handles
    Resource(Vec<ResourceHandle>),
}

/// Applies `$body` to the vector inside any [`TensorData`] variant.
macro_rules! with_storage {
    ($data:expr, $v:ident => $body:expr) => {
        match $data {
            TensorData::Float32($v) => $body,
            TensorData::Float64($v) => $body,
            TensorData::Int8($v) => $body,
            TensorData::Int16($v) => $body,
            TensorData::Int32($v) => $body,
            TensorData::Int64($v) => $body,
            TensorData::UInt8($v) => $body,
            TensorData::UInt16($v) => $body,
            TensorData::Bool($v) => $body,
            TensorData::String($v) => $body,
            TensorData::Complex64($v) => $body,
            TensorData::Complex128($v) => $body,
            TensorData::Resource($v) => $body,
        }
    };
}

/// Rebuilds the same variant around `$body`, which sees the source vector as `$v`.
macro_rules! map_storage {
    ($data:expr, $v:ident => $body:expr) => {
        match $data {
            TensorData::Float32($v) => TensorData::Float32($body),
            TensorData::Float64($v) => TensorData::Float64($body),
            TensorData::Int8($v) => TensorData::Int8($body),
            TensorData::Int16($v) => TensorData::Int16($body),
            TensorData::Int32($v) => TensorData::Int32($body),
            TensorData::Int64($v) => TensorData::Int64($body),
            TensorData::UInt8($v) => TensorData::UInt8($body),
            TensorData::UInt16($v) => TensorData::UInt16($body),
            TensorData::Bool($v) => TensorData::Bool($body),
            TensorData::String($v) => TensorData::String($body),
            TensorData::Complex64($v) => TensorData::Complex64($body),
            TensorData::Complex128($v) => TensorData::Complex128($body),
            TensorData::Resource($v) => TensorData::Resource($body),
        }
    };
}

fn copy_pod<T: Pod>(dst: &mut [T], src: &[T]) {
    bytemuck::cast_slice_mut::<T, u8>(dst).copy_from_slice(bytemuck::cast_slice::<T, u8>(src));
}

impl TensorData {
    /// Allocate `len` default values with the storage layout of `dtype`
    pub fn zeros(dtype: DType, len: usize) -> Result<Self> {
        Ok(match dtype.storage_type() {
            DType::Float32 => TensorData::Float32(vec![0.0; len]),
            DType::Float64 => TensorData::Float64(vec![0.0; len]),
            DType::Int8 => TensorData::Int8(vec![0; len]),
            DType::Int16 => TensorData::Int16(vec![0; len]),
            DType::Int32 => TensorData::Int32(vec![0; len]),
            DType::Int64 => TensorData::Int64(vec![0; len]),
            DType::UInt8 => TensorData::UInt8(vec![0; len]),
            DType::UInt16 => TensorData::UInt16(vec![0; len]),
            DType::Bool => TensorData::Bool(vec![false; len]),
            DType::String => TensorData::String(vec![String::new(); len]),
            DType::Complex64 => TensorData::Complex64(vec![Complex64::default(); len]),
            DType::Complex128 => TensorData::Complex128(vec![Complex128::default(); len]),
            DType::Resource => {
                return Err(Error::Unimplemented(
                    "Cannot allocate default values for resource tensors".into(),
                ))
            }
            quantized => {
                return Err(Error::Internal(format!(
                    "No storage layout for dtype {quantized}"
                )))
            }
        })
    }

    /// Get the dtype describing this storage layout
    pub fn storage_dtype(&self) -> DType {
        match self {
            TensorData::Float32(_) => DType::Float32,
            TensorData::Float64(_) => DType::Float64,
            TensorData::Int8(_) => DType::Int8,
            TensorData::Int16(_) => DType::Int16,
            TensorData::Int32(_) => DType::Int32,
            TensorData::Int64(_) => DType::Int64,
            TensorData::UInt8(_) => DType::UInt8,
            TensorData::UInt16(_) => DType::UInt16,
            TensorData::Bool(_) => DType::Bool,
            TensorData::String(_) => DType::String,
            TensorData::Complex64(_) => DType::Complex64,
            TensorData::Complex128(_) => DType::Complex128,
            TensorData::Resource(_) => DType::Resource,
        }
    }

    /// Number of stored values
    pub fn len(&self) -> usize {
        with_storage!(self, v => v.len())
    }

    /// Check if no values are stored
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// View numeric storage as raw bytes
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            TensorData::Float32(v) => Some(bytemuck::cast_slice(v)),
            TensorData::Float64(v) => Some(bytemuck::cast_slice(v)),
            TensorData::Int8(v) => Some(bytemuck::cast_slice(v)),
            TensorData::Int16(v) => Some(bytemuck::cast_slice(v)),
            TensorData::Int32(v) => Some(bytemuck::cast_slice(v)),
            TensorData::Int64(v) => Some(bytemuck::cast_slice(v)),
            TensorData::UInt8(v) => Some(v.as_slice()),
            TensorData::UInt16(v) => Some(bytemuck::cast_slice(v)),
            TensorData::Complex64(v) => Some(bytemuck::cast_slice(v)),
            TensorData::Complex128(v) => Some(bytemuck::cast_slice(v)),
            TensorData::Bool(_) | TensorData::String(_) | TensorData::Resource(_) => None,
        }
    }

    /// Copy a contiguous run of values
    pub fn slice_range(&self, range: Range<usize>) -> Result<TensorData> {
        if range.end > self.len() || range.start > range.end {
            return Err(Error::Internal(format!(
                "Range {range:?} out of bounds for storage of length {}",
                self.len()
            )));
        }
        Ok(map_storage!(self, v => v[range.clone()].to_vec()))
    }

    /// Overwrite `src.len()` values starting at `offset` with the contents of `src`
    ///
    /// Numeric storage is copied bitwise; strings and booleans are cloned.
    pub fn copy_from_at(&mut self, offset: usize, src: &TensorData) -> Result<()> {
        let end = offset + src.len();
        if end > self.len() {
            return Err(Error::Internal(format!(
                "Cannot copy {} values at offset {offset} into storage of length {}",
                src.len(),
                self.len()
            )));
        }
        match (self, src) {
            (TensorData::Float32(d), TensorData::Float32(s)) => copy_pod(&mut d[offset..end], s),
            (TensorData::Float64(d), TensorData::Float64(s)) => copy_pod(&mut d[offset..end], s),
            (TensorData::Int8(d), TensorData::Int8(s)) => copy_pod(&mut d[offset..end], s),
            (TensorData::Int16(d), TensorData::Int16(s)) => copy_pod(&mut d[offset..end], s),
            (TensorData::Int32(d), TensorData::Int32(s)) => copy_pod(&mut d[offset..end], s),
            (TensorData::Int64(d), TensorData::Int64(s)) => copy_pod(&mut d[offset..end], s),
            (TensorData::UInt8(d), TensorData::UInt8(s)) => copy_pod(&mut d[offset..end], s),
            (TensorData::UInt16(d), TensorData::UInt16(s)) => copy_pod(&mut d[offset..end], s),
            (TensorData::Complex64(d), TensorData::Complex64(s)) => copy_pod(&mut d[offset..end], s),
            (TensorData::Complex128(d), TensorData::Complex128(s)) => copy_pod(&mut d[offset..end], s),
            (TensorData::Bool(d), TensorData::Bool(s)) => d[offset..end].copy_from_slice(s),
            (TensorData::String(d), TensorData::String(s)) => d[offset..end].clone_from_slice(s),
            (TensorData::Resource(_), TensorData::Resource(_)) => {
                return Err(Error::Unimplemented(
                    "Copying resource handles into a slice is not supported".into(),
                ))
            }
            (dst, src) => {
                return Err(Error::Internal(format!(
                    "Storage type mismatch: cannot copy {} values into {} storage",
                    src.storage_dtype(),
                    dst.storage_dtype()
                )))
            }
        }
        Ok(())
    }
}

/// Rust scalar types that can be stored in a [`Tensor`]
pub trait TensorType: Clone + Send + Sync + 'static {
    /// The dtype tag for this scalar type
    const DTYPE: DType;

    /// Wrap a vector of values as tensor storage
    fn into_data(values: Vec<Self>) -> TensorData;

    /// Borrow tensor storage as a slice of this type, if the layout matches
    fn from_data(data: &TensorData) -> Option<&[Self]>;
}

macro_rules! impl_tensor_type {
    ($t:ty, $variant:ident) => {
        impl TensorType for $t {
            const DTYPE: DType = DType::$variant;

            fn into_data(values: Vec<Self>) -> TensorData {
                TensorData::$variant(values)
            }

            fn from_data(data: &TensorData) -> Option<&[Self]> {
                match data {
                    TensorData::$variant(v) => Some(v),
                    _ => None,
                }
            }
        }
    };
}

impl_tensor_type!(f32, Float32);
impl_tensor_type!(f64, Float64);
impl_tensor_type!(i8, Int8);
impl_tensor_type!(i16, Int16);
impl_tensor_type!(i32, Int32);
impl_tensor_type!(i64, Int64);
impl_tensor_type!(u8, UInt8);
impl_tensor_type!(u16, UInt16);
impl_tensor_type!(bool, Bool);
impl_tensor_type!(String, String);
impl_tensor_type!(Complex64, Complex64);
impl_tensor_type!(Complex128, Complex128);
impl_tensor_type!(ResourceHandle, Resource);

/// A dense, typed, shaped value
#[derive(Clone, PartialEq)]
pub struct Tensor {
    dtype: DType,
    shape: TensorShape,
    data: TensorData,
}

impl Tensor {
    /// Create a tensor, checking that `data` matches `dtype` and `shape`
    pub fn new(dtype: DType, shape: impl Into<TensorShape>, data: TensorData) -> Result<Self> {
        let shape = shape.into();
        if data.storage_dtype() != dtype.storage_type() {
            return Err(Error::InvalidArgument(format!(
                "Tensor of dtype {dtype} cannot use {} storage",
                data.storage_dtype()
            )));
        }
        if data.len() != shape.num_elements() {
            return Err(Error::InvalidArgument(format!(
                "Data length {} does not match shape {shape} ({} elements)",
                data.len(),
                shape.num_elements()
            )));
        }
        Ok(Self { dtype, shape, data })
    }

    /// Create a tensor from a vector of values
    pub fn from_vec<T: TensorType>(values: Vec<T>, shape: impl Into<TensorShape>) -> Result<Self> {
        Self::new(T::DTYPE, shape, T::into_data(values))
    }

    /// Create a rank-0 tensor
    pub fn scalar<T: TensorType>(value: T) -> Self {
        Self {
            dtype: T::DTYPE,
            shape: TensorShape::scalar(),
            data: T::into_data(vec![value]),
        }
    }

    /// Create a rank-1 tensor
    pub fn vector<T: TensorType>(values: Vec<T>) -> Self {
        Self {
            dtype: T::DTYPE,
            shape: TensorShape::new(vec![values.len()]),
            data: T::into_data(values),
        }
    }

    /// Create a tensor filled with default values (zero, `false` or `""`)
    pub fn zeros(dtype: DType, shape: impl Into<TensorShape>) -> Result<Self> {
        let shape = shape.into();
        let data = TensorData::zeros(dtype, shape.num_elements())?;
        Ok(Self { dtype, shape, data })
    }

    /// Retag this tensor with a dtype that shares its storage (e.g. `int8` as `qint8`)
    pub fn with_dtype(self, dtype: DType) -> Result<Self> {
        Self::new(dtype, self.shape, self.data)
    }

    /// Get the dtype of this tensor
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Get the shape of this tensor
    pub fn shape(&self) -> &TensorShape {
        &self.shape
    }

    /// Get the total number of values in this tensor
    pub fn num_elements(&self) -> usize {
        self.data.len()
    }

    /// Get the underlying storage
    pub fn data(&self) -> &TensorData {
        &self.data
    }

    /// Get mutable access to the underlying storage
    pub(crate) fn data_mut(&mut self) -> &mut TensorData {
        &mut self.data
    }

    /// Take the underlying storage
    pub fn into_data(self) -> TensorData {
        self.data
    }

    /// Size of the numeric payload in bytes (0 for variable-length types)
    pub fn size_bytes(&self) -> usize {
        self.data.as_bytes().map_or(0, <[u8]>::len)
    }

    /// Borrow the values as a slice of `T`
    pub fn as_slice<T: TensorType>(&self) -> Result<&[T]> {
        T::from_data(&self.data).ok_or_else(|| {
            Error::InvalidArgument(format!(
                "Tensor has dtype {}, requested {}",
                self.dtype,
                T::DTYPE
            ))
        })
    }

    /// Get the single value of a one-element tensor
    pub fn scalar_value<T: TensorType>(&self) -> Result<T> {
        if self.num_elements() != 1 {
            return Err(Error::InvalidArgument(format!(
                "Expected a single value but tensor has shape {}",
                self.shape
            )));
        }
        Ok(self.as_slice::<T>()?[0].clone())
    }

    /// Get the resource handle stored in a scalar resource tensor
    pub fn resource_handle(&self) -> Result<&ResourceHandle> {
        if self.dtype != DType::Resource || self.num_elements() != 1 {
            return Err(Error::InvalidArgument(format!(
                "Expected a scalar resource handle, got {} tensor of shape {}",
                self.dtype, self.shape
            )));
        }
        Ok(&self.as_slice::<ResourceHandle>()?[0])
    }

    /// Extract the `index`th slice along the leading dimension
    pub fn chip(&self, index: usize) -> Result<Tensor> {
        let Some(rows) = self.shape.dim(0) else {
            return Err(Error::InvalidArgument(
                "Cannot slice a scalar tensor along its leading dimension".into(),
            ));
        };
        if index >= rows {
            return Err(Error::InvalidArgument(format!(
                "Slice index {index} out of range for shape {}",
                self.shape
            )));
        }
        let chip_shape = self.shape.without_leading();
        let chip_len = chip_shape.num_elements();
        let data = self.data.slice_range(index * chip_len..(index + 1) * chip_len)?;
        Ok(Self {
            dtype: self.dtype,
            shape: chip_shape,
            data,
        })
    }

    /// Overwrite the `index`th slice along the leading dimension with `element`
    ///
    /// Only the value count is checked against the slice, so an element of a
    /// different shape but equal size is accepted.
    pub fn copy_into_chip(&mut self, index: usize, element: &Tensor) -> Result<()> {
        let rows = self.shape.dim(0).unwrap_or(0);
        if rows == 0 || index >= rows {
            return Err(Error::Internal(format!(
                "Slice index {index} out of range for shape {}",
                self.shape
            )));
        }
        let chip_len = self.num_elements() / rows;
        if element.num_elements() != chip_len {
            return Err(Error::Internal(format!(
                "Cannot copy slice: number of elements does not match. Shapes are: [element]: {}, [parent slice]: {}",
                element.shape,
                self.shape.without_leading()
            )));
        }
        if element.dtype != self.dtype {
            return Err(Error::Internal(format!(
                "Cannot copy {} element into {} slice",
                element.dtype, self.dtype
            )));
        }
        self.data_mut().copy_from_at(index * chip_len, &element.data)
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tensor<{}>{{ shape: {}, data: ", self.dtype, self.shape)?;
        with_storage!(&self.data, v => {
            if v.len() <= 16 {
                write!(f, "{v:?}")?;
            } else {
                write!(f, "{:?} ... ({} values)", &v[..16], v.len())?;
            }
        });
        write!(f, " }}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_validates_length_and_dtype() {
        assert!(Tensor::from_vec(vec![1i32, 2, 3], [3]).is_ok());
        assert!(Tensor::from_vec(vec![1i32, 2, 3], [2]).is_err());
        let err = Tensor::new(DType::Float32, [1], TensorData::Int32(vec![1])).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn test_quantized_retag() {
        let t = Tensor::vector(vec![1i8, -2]).with_dtype(DType::QInt8).unwrap();
        assert_eq!(t.dtype(), DType::QInt8);
        assert_eq!(t.as_slice::<i8>().unwrap(), &[1, -2]);
        assert!(Tensor::vector(vec![1i8]).with_dtype(DType::QUInt8).is_err());
    }

    #[test]
    fn test_chip_and_copy_into_chip() {
        let t = Tensor::from_vec(vec![1i64, 2, 3, 4, 5, 6], [3, 2]).unwrap();
        let row = t.chip(1).unwrap();
        assert_eq!(row.shape().dims(), &[2]);
        assert_eq!(row.as_slice::<i64>().unwrap(), &[3, 4]);

        let mut parent = Tensor::zeros(DType::Int64, [2, 2]).unwrap();
        parent.copy_into_chip(1, &row).unwrap();
        assert_eq!(parent.as_slice::<i64>().unwrap(), &[0, 0, 3, 4]);
    }

    #[test]
    fn test_copy_into_chip_rejects_count_mismatch() {
        let mut parent = Tensor::zeros(DType::Float32, [2, 3]).unwrap();
        let element = Tensor::vector(vec![1.0f32, 2.0]);
        let err = parent.copy_into_chip(0, &element).unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
        assert!(err.to_string().contains("number of elements does not match"));
    }

    #[test]
    fn test_strings_are_deep_copied() {
        let mut parent = Tensor::zeros(DType::String, [2]).unwrap();
        let element = Tensor::scalar("hello".to_string());
        parent.copy_into_chip(1, &element).unwrap();
        drop(element);
        assert_eq!(parent.as_slice::<String>().unwrap(), &["".to_string(), "hello".to_string()]);
    }

    #[test]
    fn test_scalar_value() {
        assert!(Tensor::scalar(true).scalar_value::<bool>().unwrap());
        assert!(Tensor::vector(vec![true, false]).scalar_value::<bool>().is_err());
        assert!(Tensor::scalar(1i32).scalar_value::<bool>().is_err());
    }

    #[test]
    fn test_size_bytes() {
        assert_eq!(Tensor::vector(vec![0f64; 4]).size_bytes(), 32);
        assert_eq!(Tensor::vector(vec!["a".to_string()]).size_bytes(), 0);
    }

    proptest::proptest! {
        #[test]
        fn prop_chip_matches_row(rows in 1usize..6, cols in 0usize..6, seed in proptest::prelude::any::<i64>()) {
            let values: Vec<i64> = (0..rows * cols).map(|i| seed.wrapping_add(i as i64)).collect();
            let matrix = Tensor::from_vec(values.clone(), [rows, cols]).unwrap();
            let mut rebuilt = Tensor::zeros(DType::Int64, [rows, cols]).unwrap();
            for r in 0..rows {
                let row = matrix.chip(r).unwrap();
                proptest::prop_assert_eq!(row.shape().dims(), &[cols]);
                proptest::prop_assert_eq!(row.as_slice::<i64>().unwrap(), &values[r * cols..(r + 1) * cols]);
                rebuilt.copy_into_chip(r, &row).unwrap();
            }
            proptest::prop_assert_eq!(rebuilt, matrix);
        }
    }
}
