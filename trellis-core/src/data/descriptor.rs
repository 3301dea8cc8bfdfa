//! Data Descriptors
//!
//! A descriptor is the (element type, shape) pair attached to every output at
//! closure. Descriptors are what the type pass reasons about; the buffers
//! themselves never carry type information.

use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Dimensions of an array. An empty shape is a scalar.
pub type Shape = SmallVec<[usize; 4]>;

/// Element type of the values held by an output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    Int32,
    Int64,
    Float32,
    Float64,
}

impl DType {
    /// Result type of combining two element types in arithmetic.
    ///
    /// Integers widen to the larger integer; anything mixed with a float
    /// becomes at least `Float64` unless both are `Float32`.
    pub fn promote(self, other: DType) -> DType {
        match (self, other) {
            (a, b) if a == b => a,
            (DType::Int32, DType::Int64) | (DType::Int64, DType::Int32) => DType::Int64,
            _ => DType::Float64,
        }
    }

    pub fn is_float(self) -> bool {
        matches!(self, DType::Float32 | DType::Float64)
    }

    pub fn name(self) -> &'static str {
        match self {
            DType::Int32 => "int32",
            DType::Int64 => "int64",
            DType::Float32 => "float32",
            DType::Float64 => "float64",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataDescriptor {
    pub dtype: DType,
    pub shape: Shape,
}

impl DataDescriptor {
    pub fn new(dtype: DType, shape: impl IntoIterator<Item = usize>) -> Self {
        Self {
            dtype,
            shape: shape.into_iter().collect(),
        }
    }

    /// A one-dimensional `Float64` array of the given length.
    pub fn vector(len: usize) -> Self {
        Self::new(DType::Float64, [len])
    }

    pub fn scalar(dtype: DType) -> Self {
        Self::new(dtype, [])
    }

    pub fn with_dtype(mut self, dtype: DType) -> Self {
        self.dtype = dtype;
        self
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Number of elements. A scalar holds one.
    pub fn size(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_scalar(&self) -> bool {
        self.shape.is_empty()
    }
}

impl fmt::Display for DataDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[", self.dtype.name())?;
        for (i, dim) in self.shape.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", dim)?;
        }
        write!(f, "]")
    }
}
