//! Scalar element types carried by tensor components

use std::fmt;

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// Data type tag for a tensor component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DType {
    /// 32-bit floating point
    Float32,

    /// 64-bit floating point
    Float64,

    /// 8-bit signed integer
    Int8,

    /// 16-bit signed integer
    Int16,

    /// 32-bit signed integer
    Int32,

    /// 64-bit signed integer
    Int64,

    /// 8-bit unsigned integer
    UInt8,

    /// 16-bit unsigned integer
    UInt16,

    /// Boolean
    Bool,

    /// Variable-length UTF-8 string
    String,

    /// Complex number with 32-bit float parts
    Complex64,

    /// Complex number with 64-bit float parts
    Complex128,

    /// Quantized 8-bit signed integer
    QInt8,

    /// Quantized 8-bit unsigned integer
    QUInt8,

    /// Quantized 16-bit signed integer
    QInt16,

    /// Quantized 16-bit unsigned integer
    QUInt16,

    /// Quantized 32-bit signed integer
    QInt32,

    /// Handle to a registered resource
    Resource,
}

impl DType {
    /// All supported dtypes, in declaration order
    pub const ALL: [DType; 18] = [
        DType::Float32,
        DType::Float64,
        DType::Int8,
        DType::Int16,
        DType::Int32,
        DType::Int64,
        DType::UInt8,
        DType::UInt16,
        DType::Bool,
        DType::String,
        DType::Complex64,
        DType::Complex128,
        DType::QInt8,
        DType::QUInt8,
        DType::QInt16,
        DType::QUInt16,
        DType::QInt32,
        DType::Resource,
    ];

    /// Get the canonical lowercase name of this type
    pub fn name(&self) -> &'static str {
        match self {
            DType::Float32 => "float32",
            DType::Float64 => "float64",
            DType::Int8 => "int8",
            DType::Int16 => "int16",
            DType::Int32 => "int32",
            DType::Int64 => "int64",
            DType::UInt8 => "uint8",
            DType::UInt16 => "uint16",
            DType::Bool => "bool",
            DType::String => "string",
            DType::Complex64 => "complex64",
            DType::Complex128 => "complex128",
            DType::QInt8 => "qint8",
            DType::QUInt8 => "quint8",
            DType::QInt16 => "qint16",
            DType::QUInt16 => "quint16",
            DType::QInt32 => "qint32",
            DType::Resource => "resource",
        }
    }

    /// Get the size of one value in bytes, or 0 for variable-length types
    pub fn size_bytes(&self) -> usize {
        match self {
            DType::Int8 | DType::UInt8 | DType::Bool | DType::QInt8 | DType::QUInt8 => 1,
            DType::Int16 | DType::UInt16 | DType::QInt16 | DType::QUInt16 => 2,
            DType::Float32 | DType::Int32 | DType::QInt32 => 4,
            DType::Float64 | DType::Int64 | DType::Complex64 => 8,
            DType::Complex128 => 16,
            DType::String | DType::Resource => 0,
        }
    }

    /// Check if this is a quantized type
    pub fn is_quantized(&self) -> bool {
        matches!(
            self,
            DType::QInt8 | DType::QUInt8 | DType::QInt16 | DType::QUInt16 | DType::QInt32
        )
    }

    /// Check if values of this type are plain old data and copy bitwise
    pub fn is_pod(&self) -> bool {
        !matches!(self, DType::String | DType::Resource | DType::Bool)
    }

    /// Check if this type can be stacked, sliced and packed by the pipeline operators
    pub fn is_batchable(&self) -> bool {
        *self != DType::Resource
    }

    /// Get the dtype whose storage layout this type shares
    ///
    /// Quantized types are stored as the integer type of the same width.
    pub fn storage_type(&self) -> DType {
        match self {
            DType::QInt8 => DType::Int8,
            DType::QUInt8 => DType::UInt8,
            DType::QInt16 => DType::Int16,
            DType::QUInt16 => DType::UInt16,
            DType::QInt32 => DType::Int32,
            other => *other,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Complex number with single-precision parts
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Complex64 {
    /// Real part
    pub re: f32,
    /// Imaginary part
    pub im: f32,
}

impl Complex64 {
    /// Create a complex number from its parts
    pub fn new(re: f32, im: f32) -> Self {
        Self { re, im }
    }
}

/// Complex number with double-precision parts
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Complex128 {
    /// Real part
    pub re: f64,
    /// Imaginary part
    pub im: f64,
}

impl Complex128 {
    /// Create a complex number from its parts
    pub fn new(re: f64, im: f64) -> Self {
        Self { re, im }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantized_storage() {
        assert_eq!(DType::QUInt8.storage_type(), DType::UInt8);
        assert_eq!(DType::QInt32.storage_type(), DType::Int32);
        assert_eq!(DType::Float32.storage_type(), DType::Float32);
        assert!(DType::QInt16.is_quantized());
        assert!(!DType::Int16.is_quantized());
    }

    #[test]
    fn test_sizes() {
        assert_eq!(DType::Complex128.size_bytes(), 16);
        assert_eq!(DType::Complex64.size_bytes(), std::mem::size_of::<Complex64>());
        assert_eq!(DType::String.size_bytes(), 0);
    }

    #[test]
    fn test_only_resources_are_unbatchable() {
        let unbatchable: Vec<_> = DType::ALL.iter().filter(|d| !d.is_batchable()).collect();
        assert_eq!(unbatchable, vec![&DType::Resource]);
    }

    #[test]
    fn test_serde_roundtrip_name() {
        let json = serde_json::to_string(&DType::QInt8).unwrap();
        let back: DType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, DType::QInt8);
        assert_eq!(DType::QInt8.to_string(), "qint8");
    }
}
