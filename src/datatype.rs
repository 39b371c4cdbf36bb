//! Element types stored in an index and their on-disk tags

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::distance::DistanceValue;

/// Numeric type tag written into every saved index header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Int8,
    Int16,
    Int32,
    Int64,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
}

impl DataType {
    /// Stable numeric code used in the file header.
    pub fn code(self) -> u32 {
        match self {
            DataType::Int8 => 0,
            DataType::Int16 => 1,
            DataType::Int32 => 2,
            DataType::Int64 => 3,
            DataType::UInt8 => 4,
            DataType::UInt16 => 5,
            DataType::UInt32 => 6,
            DataType::UInt64 => 7,
            DataType::Float32 => 8,
            DataType::Float64 => 9,
        }
    }

    /// Decode a header code; `None` for codes this build does not know.
    pub fn from_code(code: u32) -> Option<Self> {
        let data_type = match code {
            0 => DataType::Int8,
            1 => DataType::Int16,
            2 => DataType::Int32,
            3 => DataType::Int64,
            4 => DataType::UInt8,
            5 => DataType::UInt16,
            6 => DataType::UInt32,
            7 => DataType::UInt64,
            8 => DataType::Float32,
            9 => DataType::Float64,
            _ => return None,
        };
        Some(data_type)
    }

    pub fn name(self) -> &'static str {
        match self {
            DataType::Int8 => "int8",
            DataType::Int16 => "int16",
            DataType::Int32 => "int32",
            DataType::Int64 => "int64",
            DataType::UInt8 => "uint8",
            DataType::UInt16 => "uint16",
            DataType::UInt32 => "uint32",
            DataType::UInt64 => "uint64",
            DataType::Float32 => "float32",
            DataType::Float64 => "float64",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A coordinate type that points can be stored as.
///
/// `Accumulator` is the natural distance result type for the element: `f32`
/// for types up to 32 bits wide, `f64` for the 64-bit ones.
pub trait Element:
    Copy
    + Default
    + PartialEq
    + PartialOrd
    + fmt::Debug
    + Send
    + Sync
    + Serialize
    + DeserializeOwned
    + 'static
{
    const DATA_TYPE: DataType;

    type Accumulator: DistanceValue;

    fn to_f64(self) -> f64;
}

macro_rules! impl_element {
    ($($t:ty => $tag:ident, $acc:ty);* $(;)?) => {
        $(
            impl Element for $t {
                const DATA_TYPE: DataType = DataType::$tag;
                type Accumulator = $acc;

                #[inline]
                fn to_f64(self) -> f64 {
                    self as f64
                }
            }
        )*
    };
}

impl_element! {
    i8 => Int8, f32;
    i16 => Int16, f32;
    i32 => Int32, f32;
    i64 => Int64, f64;
    u8 => UInt8, f32;
    u16 => UInt16, f32;
    u32 => UInt32, f32;
    u64 => UInt64, f64;
    f32 => Float32, f32;
    f64 => Float64, f64;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_roundtrip() {
        for code in 0..10 {
            let dt = DataType::from_code(code).unwrap();
            assert_eq!(dt.code(), code);
        }
        assert_eq!(DataType::from_code(10), None);
    }

    #[test]
    fn test_element_tags() {
        assert_eq!(<f32 as Element>::DATA_TYPE, DataType::Float32);
        assert_eq!(<f64 as Element>::DATA_TYPE, DataType::Float64);
        assert_eq!(<u8 as Element>::DATA_TYPE, DataType::UInt8);
        assert_eq!(<i64 as Element>::DATA_TYPE, DataType::Int64);
    }

    #[test]
    fn test_display() {
        assert_eq!(DataType::Float32.to_string(), "float32");
        assert_eq!(DataType::UInt16.to_string(), "uint16");
    }
}
