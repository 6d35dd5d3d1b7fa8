use std::str::FromStr;

use derive_more::Display;
use half::{bf16, f16};
use serde::{Serialize, Serializer};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized data type `{0}`")]
pub struct DataTypeError(pub String);

/// Scalar element types a container may declare.
///
/// Displays with the conventional array-library name (`float32`, `bfloat16`, ...),
/// while [`DataType::as_str`] returns the tag written in container headers (`F32`, `BF16`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display)]
pub enum DataType {
    #[display("bool")]
    Bool,
    #[display("uint8")]
    U8,
    #[display("int8")]
    I8,
    #[display("float8_e5m2")]
    F8E5M2,
    #[display("float8_e4m3fn")]
    F8E4M3,
    #[display("int16")]
    I16,
    #[display("uint16")]
    U16,
    #[display("float16")]
    F16,
    #[display("bfloat16")]
    BF16,
    #[display("int32")]
    I32,
    #[display("uint32")]
    U32,
    #[display("float32")]
    F32,
    #[display("float64")]
    F64,
    #[display("int64")]
    I64,
    #[display("uint64")]
    U64,
}

impl DataType {
    pub const ALL: [DataType; 15] = [
        DataType::Bool,
        DataType::U8,
        DataType::I8,
        DataType::F8E5M2,
        DataType::F8E4M3,
        DataType::I16,
        DataType::U16,
        DataType::F16,
        DataType::BF16,
        DataType::I32,
        DataType::U32,
        DataType::F32,
        DataType::F64,
        DataType::I64,
        DataType::U64,
    ];

    /// Returns the byte width of one element.
    pub const fn size(self) -> usize {
        match self {
            DataType::Bool | DataType::U8 | DataType::I8 => 1,
            DataType::F8E5M2 | DataType::F8E4M3 => 1,
            DataType::I16 | DataType::U16 | DataType::F16 | DataType::BF16 => 2,
            DataType::I32 | DataType::U32 | DataType::F32 => 4,
            DataType::F64 | DataType::I64 | DataType::U64 => 8,
        }
    }

    /// Returns the tag used for this type in container headers.
    pub const fn as_str(self) -> &'static str {
        match self {
            DataType::Bool => "BOOL",
            DataType::U8 => "U8",
            DataType::I8 => "I8",
            DataType::F8E5M2 => "F8_E5M2",
            DataType::F8E4M3 => "F8_E4M3",
            DataType::I16 => "I16",
            DataType::U16 => "U16",
            DataType::F16 => "F16",
            DataType::BF16 => "BF16",
            DataType::I32 => "I32",
            DataType::U32 => "U32",
            DataType::F32 => "F32",
            DataType::F64 => "F64",
            DataType::I64 => "I64",
            DataType::U64 => "U64",
        }
    }
}

impl FromStr for DataType {
    type Err = DataTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DataType::ALL
            .into_iter()
            .find(|r#type| r#type.as_str() == s)
            .ok_or_else(|| DataTypeError(s.to_owned()))
    }
}

impl Serialize for DataType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Rust types whose in-memory representation matches a container [`DataType`].
pub trait Scalar: Sized + bytemuck::Pod + Send + Sync + sealed::Sealed {
    const DATA_TYPE: DataType;
}

macro_rules! impl_scalar {
    ($($ty:ty => $variant:ident),+ $(,)?) => {
        $(
            impl Scalar for $ty {
                const DATA_TYPE: DataType = DataType::$variant;
            }

            impl sealed::Sealed for $ty {}
        )+
    };
}

impl_scalar!(
    u8 => U8,
    i8 => I8,
    u16 => U16,
    i16 => I16,
    u32 => U32,
    i32 => I32,
    u64 => U64,
    i64 => I64,
    f16 => F16,
    bf16 => BF16,
    f32 => F32,
    f64 => F64,
);

mod sealed {
    pub trait Sealed {}
}
