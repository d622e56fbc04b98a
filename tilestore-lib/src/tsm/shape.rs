use crate::Result;
use core::fmt;
use core::str::FromStr;
use ohno::{IntoAppError, bail};

/// Extent of an N-dimensional array; the first axis varies fastest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Shape(Vec<u64>);

impl Shape {
    #[must_use]
    pub const fn new(extents: Vec<u64>) -> Self {
        Self(extents)
    }

    #[must_use]
    pub const fn ndim(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u64] {
        &self.0
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<u64> {
        self.0
    }

    /// Number of elements; an empty shape describes a scalar and has one element.
    #[must_use]
    pub fn product(&self) -> u64 {
        self.0.iter().product()
    }

    /// The linear offset of `position` within an array of this shape.
    #[must_use]
    pub fn offset_of(&self, position: &[u64]) -> u64 {
        let mut offset = 0;
        let mut stride = 1;
        for (&pos, &extent) in position.iter().zip(&self.0) {
            offset += pos * stride;
            stride *= extent;
        }
        offset
    }

    /// Per-axis strides of a contiguous array of this shape.
    #[must_use]
    pub fn strides(&self) -> Vec<u64> {
        let mut strides = Vec::with_capacity(self.0.len());
        let mut stride = 1;
        for &extent in &self.0 {
            strides.push(stride);
            stride *= extent;
        }
        strides
    }

    /// This shape with one more axis appended.
    #[must_use]
    pub fn with_axis(&self, extent: u64) -> Self {
        let mut extents = self.0.clone();
        extents.push(extent);
        Self(extents)
    }

    /// This shape without its last axis.
    #[must_use]
    pub fn without_last_axis(&self) -> Self {
        let mut extents = self.0.clone();
        let _ = extents.pop();
        Self(extents)
    }

    #[must_use]
    pub fn last(&self) -> Option<u64> {
        self.0.last().copied()
    }
}

impl From<Vec<u64>> for Shape {
    fn from(extents: Vec<u64>) -> Self {
        Self(extents)
    }
}

impl<const N: usize> From<[u64; N]> for Shape {
    fn from(extents: [u64; N]) -> Self {
        Self(extents.to_vec())
    }
}

impl FromStr for Shape {
    type Err = ohno::AppError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Ok(Self::default());
        }

        let mut extents = Vec::new();
        for part in s.split(',') {
            let part = part.trim();
            if part.is_empty() {
                bail!("empty axis in shape '{s}'");
            }
            let extent = part
                .parse::<u64>()
                .into_app_err_with(|| format!("invalid axis length '{part}' in shape '{s}'"))?;
            extents.push(extent);
        }

        Ok(Self(extents))
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, extent) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{extent}")?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn test_product_and_ndim() {
        let shape = Shape::from([4, 8, 3]);
        assert_eq!(shape.ndim(), 3);
        assert_eq!(shape.product(), 96);
        assert_eq!(Shape::default().product(), 1);
    }

    #[test]
    fn test_offset_first_axis_fastest() {
        let shape = Shape::from([4, 8]);
        assert_eq!(shape.offset_of(&[1, 0]), 1);
        assert_eq!(shape.offset_of(&[0, 1]), 4);
        assert_eq!(shape.offset_of(&[3, 7]), 31);
        assert_eq!(shape.strides(), vec![1, 4]);
    }

    #[test]
    fn test_parse() {
        assert_eq!("4,8".parse::<Shape>().unwrap(), Shape::from([4, 8]));
        assert_eq!(" 4 , 8 ,16".parse::<Shape>().unwrap(), Shape::from([4, 8, 16]));
        assert_eq!("".parse::<Shape>().unwrap(), Shape::default());
        let _ = "4,,8".parse::<Shape>().unwrap_err();
        let _ = "4,x".parse::<Shape>().unwrap_err();
    }

    #[test]
    fn test_display() {
        assert_eq!(Shape::from([4, 8]).to_string(), "[4, 8]");
        assert_eq!(Shape::default().to_string(), "[]");
    }

    #[test]
    fn test_axis_helpers() {
        let shape = Shape::from([4, 8]);
        assert_eq!(shape.with_axis(10), Shape::from([4, 8, 10]));
        assert_eq!(shape.without_last_axis(), Shape::from([4]));
        assert_eq!(shape.last(), Some(8));
    }
}
