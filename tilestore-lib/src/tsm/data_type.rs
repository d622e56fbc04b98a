use crate::Result;
use ohno::bail;
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

/// The element type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum DataType {
    Bool,
    #[strum(to_string = "uchar", serialize = "u8")]
    UChar,
    #[strum(to_string = "short", serialize = "i16")]
    Short,
    #[strum(to_string = "int", serialize = "i32")]
    Int,
    #[strum(to_string = "uint", serialize = "u32")]
    UInt,
    #[strum(to_string = "int64", serialize = "i64")]
    Int64,
    #[strum(to_string = "float", serialize = "f32")]
    Float,
    #[strum(to_string = "double", serialize = "f64")]
    Double,
    String,
}

impl DataType {
    /// Size in bytes of one element as stored in a tile.
    ///
    /// Strings have no fixed size and return 0.
    #[must_use]
    pub const fn element_size(self) -> usize {
        match self {
            Self::Bool | Self::UChar => 1,
            Self::Short => 2,
            Self::Int | Self::UInt | Self::Float => 4,
            Self::Int64 | Self::Double => 8,
            Self::String => 0,
        }
    }

    /// Whether values of this type can be stored in tiles.
    #[must_use]
    pub const fn is_tileable(self) -> bool {
        !matches!(self, Self::String)
    }

    #[must_use]
    pub const fn to_code(self) -> u32 {
        match self {
            Self::Bool => 0,
            Self::UChar => 1,
            Self::Short => 2,
            Self::Int => 3,
            Self::UInt => 4,
            Self::Int64 => 5,
            Self::Float => 6,
            Self::Double => 7,
            Self::String => 8,
        }
    }

    pub fn from_code(code: u32) -> Result<Self> {
        Ok(match code {
            0 => Self::Bool,
            1 => Self::UChar,
            2 => Self::Short,
            3 => Self::Int,
            4 => Self::UInt,
            5 => Self::Int64,
            6 => Self::Float,
            7 => Self::Double,
            8 => Self::String,
            _ => bail!("internal error: unknown data type code {code}"),
        })
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_code_roundtrip_for_every_type() {
        for dtype in DataType::iter() {
            assert_eq!(DataType::from_code(dtype.to_code()).unwrap(), dtype);
        }
        let _ = DataType::from_code(42).unwrap_err();
    }

    #[test]
    fn test_element_sizes() {
        assert_eq!(DataType::Bool.element_size(), 1);
        assert_eq!(DataType::Short.element_size(), 2);
        assert_eq!(DataType::Float.element_size(), 4);
        assert_eq!(DataType::Double.element_size(), 8);
        assert!(!DataType::String.is_tileable());
        assert!(DataType::Int.is_tileable());
    }

    #[test]
    fn test_parse_names() {
        assert_eq!("double".parse::<DataType>().unwrap(), DataType::Double);
        assert_eq!("F32".parse::<DataType>().unwrap(), DataType::Float);
        assert_eq!("int64".parse::<DataType>().unwrap(), DataType::Int64);
        assert_eq!(DataType::UChar.to_string(), "uchar");
        let _ = "complex".parse::<DataType>().unwrap_err();
    }
}
