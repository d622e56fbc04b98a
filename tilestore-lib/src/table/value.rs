//! Cell values exchanged with columns.

use crate::Result;
use crate::tsm::{DataType, Shape};
use core::cmp::Ordering;
use core::fmt;
use ohno::bail;
use std::collections::BTreeMap;

/// A value in a keyword set, id field, or scalar cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    DoubleVec(Vec<f64>),
}

/// Ordered name to value map, used for keywords and hypercube id values.
pub type ValueRecord = BTreeMap<String, Value>;

impl Value {
    /// Total order used when sorting or grouping rows by a column.
    ///
    /// Values of different kinds order by kind; doubles use IEEE total order.
    #[must_use]
    pub fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a.cmp(b),
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            (Self::Double(a), Self::Double(b)) => a.total_cmp(b),
            #[expect(clippy::cast_precision_loss, reason = "mixed numeric comparison")]
            (Self::Int(a), Self::Double(b)) => (*a as f64).total_cmp(b),
            #[expect(clippy::cast_precision_loss, reason = "mixed numeric comparison")]
            (Self::Double(a), Self::Int(b)) => a.total_cmp(&(*b as f64)),
            (Self::String(a), Self::String(b)) => a.cmp(b),
            (Self::DoubleVec(a), Self::DoubleVec(b)) => {
                for (x, y) in a.iter().zip(b) {
                    let ord = x.total_cmp(y);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            _ => self.rank().cmp(&other.rank()),
        }
    }

    const fn rank(&self) -> u8 {
        match self {
            Self::Bool(_) => 0,
            Self::Int(_) => 1,
            Self::Double(_) => 2,
            Self::String(_) => 3,
            Self::DoubleVec(_) => 4,
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            #[expect(clippy::cast_precision_loss, reason = "coordinate values are doubles")]
            Self::Int(v) => Some(*v as f64),
            Self::Double(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::String(v) => write!(f, "\"{v}\""),
            Self::DoubleVec(v) => write!(f, "{v:?}"),
        }
    }
}

/// A Rust type that can be stored as the element of a tiled array.
pub trait Element: Copy + Default {
    const DATA_TYPE: DataType;

    /// Write the little-endian representation into `out` (exactly `element_size` bytes).
    fn write_le(self, out: &mut [u8]);

    fn read_le(bytes: &[u8]) -> Self;
}

macro_rules! impl_element {
    ($ty:ty, $dtype:expr) => {
        impl Element for $ty {
            const DATA_TYPE: DataType = $dtype;

            fn write_le(self, out: &mut [u8]) {
                out.copy_from_slice(&self.to_le_bytes());
            }

            fn read_le(bytes: &[u8]) -> Self {
                let mut buf = [0u8; size_of::<$ty>()];
                buf.copy_from_slice(bytes);
                <$ty>::from_le_bytes(buf)
            }
        }
    };
}

impl_element!(u8, DataType::UChar);
impl_element!(i16, DataType::Short);
impl_element!(i32, DataType::Int);
impl_element!(u32, DataType::UInt);
impl_element!(i64, DataType::Int64);
impl_element!(f32, DataType::Float);
impl_element!(f64, DataType::Double);

impl Element for bool {
    const DATA_TYPE: DataType = DataType::Bool;

    fn write_le(self, out: &mut [u8]) {
        out[0] = u8::from(self);
    }

    fn read_le(bytes: &[u8]) -> Self {
        bytes[0] != 0
    }
}

/// An N-dimensional array of fixed-size elements, stored contiguously with
/// the first axis varying fastest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayValue {
    dtype: DataType,
    shape: Shape,
    data: Vec<u8>,
}

impl ArrayValue {
    /// An all-zero array, which is what never-written tiles read as.
    pub fn zeros(dtype: DataType, shape: Shape) -> Result<Self> {
        if !dtype.is_tileable() {
            bail!("arrays of type {dtype} are not supported");
        }
        let len = byte_len(dtype, &shape)?;
        Ok(Self {
            dtype,
            shape,
            data: vec![0; len],
        })
    }

    pub fn from_vec<T: Element>(shape: Shape, values: &[T]) -> Result<Self> {
        let expected = shape.product();
        if values.len() as u64 != expected {
            bail!("array of shape {shape} needs {expected} values, got {}", values.len());
        }

        let size = T::DATA_TYPE.element_size();
        let mut data = vec![0u8; values.len() * size];
        for (chunk, &value) in data.chunks_exact_mut(size).zip(values) {
            value.write_le(chunk);
        }

        Ok(Self {
            dtype: T::DATA_TYPE,
            shape,
            data,
        })
    }

    pub fn from_bytes(dtype: DataType, shape: Shape, data: Vec<u8>) -> Result<Self> {
        let len = byte_len(dtype, &shape)?;
        if data.len() != len {
            bail!("internal error: array of shape {shape} and type {dtype} needs {len} bytes, got {}", data.len());
        }
        Ok(Self { dtype, shape, data })
    }

    pub fn to_vec<T: Element>(&self) -> Result<Vec<T>> {
        if T::DATA_TYPE != self.dtype {
            bail!("array holds {} values, not {}", self.dtype, T::DATA_TYPE);
        }
        Ok(self
            .data
            .chunks_exact(self.dtype.element_size())
            .map(T::read_le)
            .collect())
    }

    #[must_use]
    pub const fn data_type(&self) -> DataType {
        self.dtype
    }

    #[must_use]
    pub const fn shape(&self) -> &Shape {
        &self.shape
    }

    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Number of elements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len() / self.dtype.element_size()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The first element as a scalar value, used when a cell is sorted or grouped on.
    pub fn first_value(&self) -> Option<Value> {
        let bytes = self.data.get(..self.dtype.element_size())?;
        Some(match self.dtype {
            DataType::Bool => Value::Bool(bool::read_le(bytes)),
            DataType::UChar => Value::Int(i64::from(u8::read_le(bytes))),
            DataType::Short => Value::Int(i64::from(i16::read_le(bytes))),
            DataType::Int => Value::Int(i64::from(i32::read_le(bytes))),
            DataType::UInt => Value::Int(i64::from(u32::read_le(bytes))),
            DataType::Int64 => Value::Int(i64::read_le(bytes)),
            DataType::Float => Value::Double(f64::from(f32::read_le(bytes))),
            DataType::Double => Value::Double(f64::read_le(bytes)),
            DataType::String => return None,
        })
    }
}

fn byte_len(dtype: DataType, shape: &Shape) -> Result<usize> {
    let Some(len) = usize::try_from(shape.product())
        .ok()
        .and_then(|n| n.checked_mul(dtype.element_size()))
    else {
        bail!("array of shape {shape} is too large");
    };
    Ok(len)
}

/// The content of one cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Scalar(Value),
    Array(ArrayValue),
}

impl Cell {
    /// The value used to order rows on this cell.
    #[must_use]
    pub fn sort_value(&self) -> Option<Value> {
        match self {
            Self::Scalar(v) => Some(v.clone()),
            Self::Array(a) => a.first_value(),
        }
    }

    pub fn into_array(self) -> Result<ArrayValue> {
        match self {
            Self::Array(a) => Ok(a),
            Self::Scalar(v) => bail!("expected an array cell, found scalar {v}"),
        }
    }
}

impl From<ArrayValue> for Cell {
    fn from(value: ArrayValue) -> Self {
        Self::Array(value)
    }
}

/// A strided section of an array: `start..=end` with `stride` per axis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slicer {
    pub start: Vec<u64>,
    pub end: Vec<u64>,
    pub stride: Vec<u64>,
}

impl Slicer {
    /// A unit-stride section from `start` to `end` inclusive.
    #[must_use]
    pub fn new(start: Vec<u64>, end: Vec<u64>) -> Self {
        let stride = vec![1; start.len()];
        Self { start, end, stride }
    }

    #[must_use]
    pub const fn with_stride(start: Vec<u64>, end: Vec<u64>, stride: Vec<u64>) -> Self {
        Self { start, end, stride }
    }

    /// Shape of the section. Only meaningful once [`Self::validate`] accepted the slicer.
    #[must_use]
    pub fn shape(&self) -> Shape {
        Shape::new(
            self.start
                .iter()
                .zip(&self.end)
                .zip(&self.stride)
                .map(|((&s, &e), &st)| e.saturating_sub(s) / st.max(1) + 1)
                .collect(),
        )
    }

    /// Validate against a cell shape and return the shape of the section.
    pub fn section_shape(&self, cell_shape: &Shape) -> Result<Shape> {
        self.validate(cell_shape)?;
        Ok(self.shape())
    }

    /// Check that the section lies within a cell of the given shape.
    pub fn validate(&self, cell_shape: &Shape) -> Result<()> {
        let ndim = cell_shape.ndim();
        if self.start.len() != ndim || self.end.len() != ndim || self.stride.len() != ndim {
            bail!("slicer has {} axes but the cell shape {cell_shape} has {ndim}", self.start.len());
        }

        for (axis, &extent) in cell_shape.as_slice().iter().enumerate() {
            let (s, e, st) = (self.start[axis], self.end[axis], self.stride[axis]);
            if st == 0 {
                bail!("slicer stride on axis {axis} is zero");
            }
            if s > e || e >= extent {
                bail!("slicer range {s}..={e} on axis {axis} is outside the cell shape {cell_shape}");
            }
        }
        Ok(())
    }
}
