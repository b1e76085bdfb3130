//! Concrete and partially-known tensor shapes

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A fully known tensor shape
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TensorShape {
    dims: Vec<usize>,
}

impl TensorShape {
    /// Create a shape from its dimension sizes
    pub fn new(dims: Vec<usize>) -> Self {
        Self { dims }
    }

    /// The shape of a scalar
    pub fn scalar() -> Self {
        Self { dims: Vec::new() }
    }

    /// Build a shape from signed sizes, rejecting negative dimensions
    pub fn from_signed(dims: &[i64]) -> Result<Self> {
        dims.iter()
            .map(|&d| {
                usize::try_from(d).map_err(|_| {
                    Error::InvalidArgument(format!("Shape {dims:?} has a negative dimension"))
                })
            })
            .collect::<Result<Vec<_>>>()
            .map(Self::new)
    }

    /// Get the dimension sizes
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Get the number of dimensions
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// Get the size of dimension `index`
    pub fn dim(&self, index: usize) -> Option<usize> {
        self.dims.get(index).copied()
    }

    /// Total number of elements described by this shape
    pub fn num_elements(&self) -> usize {
        self.dims.iter().product()
    }

    /// Check if this is a scalar shape
    pub fn is_scalar(&self) -> bool {
        self.dims.is_empty()
    }

    /// Prepend a leading dimension
    pub fn with_leading(&self, size: usize) -> Self {
        let mut dims = Vec::with_capacity(self.dims.len() + 1);
        dims.push(size);
        dims.extend_from_slice(&self.dims);
        Self { dims }
    }

    /// Drop the leading dimension
    pub fn without_leading(&self) -> Self {
        Self {
            dims: self.dims.iter().skip(1).copied().collect(),
        }
    }

    /// Row-major strides (in elements) for this shape
    pub fn strides(&self) -> Vec<usize> {
        let mut strides = vec![1; self.dims.len()];
        for i in (0..self.dims.len().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * self.dims[i + 1];
        }
        strides
    }
}

impl From<Vec<usize>> for TensorShape {
    fn from(dims: Vec<usize>) -> Self {
        Self::new(dims)
    }
}

impl From<&[usize]> for TensorShape {
    fn from(dims: &[usize]) -> Self {
        Self::new(dims.to_vec())
    }
}

impl<const N: usize> From<[usize; N]> for TensorShape {
    fn from(dims: [usize; N]) -> Self {
        Self::new(dims.to_vec())
    }
}

impl fmt::Display for TensorShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{d}")?;
        }
        write!(f, "]")
    }
}

/// A shape whose rank and dimension sizes may be only partially known
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartialShape {
    /// `None` when even the rank is unknown
    dims: Option<Vec<Option<usize>>>,
}

impl PartialShape {
    /// A shape with known rank and possibly unknown dimensions
    pub fn new(dims: Vec<Option<usize>>) -> Self {
        Self { dims: Some(dims) }
    }

    /// A shape about which nothing is known
    pub fn unknown() -> Self {
        Self { dims: None }
    }

    /// A shape with known rank and every dimension unknown
    pub fn unknown_dims(rank: usize) -> Self {
        Self::new(vec![None; rank])
    }

    /// The partial shape of a scalar
    pub fn scalar() -> Self {
        Self::new(Vec::new())
    }

    /// Build from signed sizes where `-1` marks an unknown dimension
    pub fn from_signed(dims: &[i64]) -> Result<Self> {
        dims.iter()
            .map(|&d| match d {
                -1 => Ok(None),
                d if d >= 0 => Ok(Some(d as usize)),
                _ => Err(Error::InvalidArgument(format!(
                    "Partial shape {dims:?} has an invalid dimension {d}"
                ))),
            })
            .collect::<Result<Vec<_>>>()
            .map(Self::new)
    }

    /// Get the rank, if known
    pub fn rank(&self) -> Option<usize> {
        self.dims.as_ref().map(Vec::len)
    }

    /// Get the dimensions, if the rank is known
    pub fn dims(&self) -> Option<&[Option<usize>]> {
        self.dims.as_deref()
    }

    /// Check if every dimension is known
    pub fn is_fully_defined(&self) -> bool {
        self.dims
            .as_ref()
            .is_some_and(|dims| dims.iter().all(Option::is_some))
    }

    /// Concatenate `other` after this shape; unknown rank on either side yields unknown rank
    pub fn concatenate(&self, other: &PartialShape) -> PartialShape {
        match (&self.dims, &other.dims) {
            (Some(a), Some(b)) => {
                let mut dims = a.clone();
                dims.extend_from_slice(b);
                PartialShape::new(dims)
            }
            _ => PartialShape::unknown(),
        }
    }

    /// Check whether a concrete shape could be described by this partial shape
    pub fn is_compatible_with(&self, shape: &TensorShape) -> bool {
        match &self.dims {
            None => true,
            Some(dims) => {
                dims.len() == shape.rank()
                    && dims
                        .iter()
                        .zip(shape.dims())
                        .all(|(expected, actual)| expected.map_or(true, |e| e == *actual))
            }
        }
    }
}

impl From<&TensorShape> for PartialShape {
    fn from(shape: &TensorShape) -> Self {
        PartialShape::new(shape.dims().iter().map(|&d| Some(d)).collect())
    }
}

impl From<TensorShape> for PartialShape {
    fn from(shape: TensorShape) -> Self {
        PartialShape::from(&shape)
    }
}

impl fmt::Display for PartialShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(dims) = &self.dims else {
            return write!(f, "<unknown>");
        };
        write!(f, "[")?;
        for (i, d) in dims.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            match d {
                Some(d) => write!(f, "{d}")?,
                None => write!(f, "?")?,
            }
        }
        write!(f, "]")
    }
}
