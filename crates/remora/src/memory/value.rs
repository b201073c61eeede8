//! Scalar types that can be read from or written to remote memory.
//!
//! [`Scalar`] is the static, generic path (`read::<f32>(addr)`); [`ValueType`]
//! and [`Value`] are the dynamic path used when the type is only known at
//! runtime (config files, CLI arguments).

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

use crate::error::{Error, Result};

/// Runtime tag for every supported scalar type
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    EnumIter,
    IntoStaticStr,
    Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ValueType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
}

impl ValueType {
    /// Width of the type in bytes
    pub fn size(&self) -> usize {
        match self {
            Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::I64 | Self::U64 | Self::F64 => 8,
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }

    /// Decode a value of this type from the start of `bytes`
    pub fn decode(&self, bytes: &[u8]) -> Option<Value> {
        match self {
            Self::I8 => i8::decode(bytes).map(Value::I8),
            Self::U8 => u8::decode(bytes).map(Value::U8),
            Self::I16 => i16::decode(bytes).map(Value::I16),
            Self::U16 => u16::decode(bytes).map(Value::U16),
            Self::I32 => i32::decode(bytes).map(Value::I32),
            Self::U32 => u32::decode(bytes).map(Value::U32),
            Self::I64 => i64::decode(bytes).map(Value::I64),
            Self::U64 => u64::decode(bytes).map(Value::U64),
            Self::F32 => f32::decode(bytes).map(Value::F32),
            Self::F64 => f64::decode(bytes).map(Value::F64),
        }
    }
}

mod sealed {
    pub trait Sealed {}
}

/// A fixed-width, plain-old-data value stored little-endian in memory.
pub trait Scalar: Copy + sealed::Sealed {
    const SIZE: usize;
    const TYPE: ValueType;

    /// Decode from the first `SIZE` bytes, `None` if `bytes` is too short
    fn decode(bytes: &[u8]) -> Option<Self>;

    /// Encode into the first `SIZE` bytes of `out`
    fn encode(self, out: &mut [u8]);

    fn into_value(self) -> Value;
}

macro_rules! impl_scalar {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl sealed::Sealed for $ty {}

            impl Scalar for $ty {
                const SIZE: usize = std::mem::size_of::<$ty>();
                const TYPE: ValueType = ValueType::$variant;

                fn decode(bytes: &[u8]) -> Option<Self> {
                    let raw = bytes.get(..Self::SIZE)?;
                    raw.try_into().ok().map(<$ty>::from_le_bytes)
                }

                fn encode(self, out: &mut [u8]) {
                    out[..Self::SIZE].copy_from_slice(&self.to_le_bytes());
                }

                fn into_value(self) -> Value {
                    Value::$variant(self)
                }
            }

            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Value::$variant(value)
                }
            }
        )*
    };
}

impl_scalar! {
    i8 => I8,
    u8 => U8,
    i16 => I16,
    u16 => U16,
    i32 => I32,
    u32 => U32,
    i64 => I64,
    u64 => U64,
    f32 => F32,
    f64 => F64,
}

/// A scalar value tagged with its runtime type
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::I8(_) => ValueType::I8,
            Self::U8(_) => ValueType::U8,
            Self::I16(_) => ValueType::I16,
            Self::U16(_) => ValueType::U16,
            Self::I32(_) => ValueType::I32,
            Self::U32(_) => ValueType::U32,
            Self::I64(_) => ValueType::I64,
            Self::U64(_) => ValueType::U64,
            Self::F32(_) => ValueType::F32,
            Self::F64(_) => ValueType::F64,
        }
    }

    /// Encode into a little-endian byte vector of `value_type().size()` bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        match *self {
            Self::I8(v) => v.to_le_bytes().to_vec(),
            Self::U8(v) => v.to_le_bytes().to_vec(),
            Self::I16(v) => v.to_le_bytes().to_vec(),
            Self::U16(v) => v.to_le_bytes().to_vec(),
            Self::I32(v) => v.to_le_bytes().to_vec(),
            Self::U32(v) => v.to_le_bytes().to_vec(),
            Self::I64(v) => v.to_le_bytes().to_vec(),
            Self::U64(v) => v.to_le_bytes().to_vec(),
            Self::F32(v) => v.to_le_bytes().to_vec(),
            Self::F64(v) => v.to_le_bytes().to_vec(),
        }
    }

    pub fn as_f64(&self) -> f64 {
        match *self {
            Self::F32(v) => v as f64,
            Self::F64(v) => v,
            other => other.as_i128() as f64,
        }
    }

    fn as_i128(&self) -> i128 {
        match *self {
            Self::I8(v) => v as i128,
            Self::U8(v) => v as i128,
            Self::I16(v) => v as i128,
            Self::U16(v) => v as i128,
            Self::I32(v) => v as i128,
            Self::U32(v) => v as i128,
            Self::I64(v) => v as i128,
            Self::U64(v) => v as i128,
            Self::F32(v) => v as i128,
            Self::F64(v) => v as i128,
        }
    }

    /// Numeric conversion to another type with `as` semantics
    /// (integers truncate, floats saturate).
    pub fn cast(self, ty: ValueType) -> Value {
        if self.value_type().is_float() {
            let v = self.as_f64();
            return match ty {
                ValueType::I8 => Value::I8(v as i8),
                ValueType::U8 => Value::U8(v as u8),
                ValueType::I16 => Value::I16(v as i16),
                ValueType::U16 => Value::U16(v as u16),
                ValueType::I32 => Value::I32(v as i32),
                ValueType::U32 => Value::U32(v as u32),
                ValueType::I64 => Value::I64(v as i64),
                ValueType::U64 => Value::U64(v as u64),
                ValueType::F32 => Value::F32(v as f32),
                ValueType::F64 => Value::F64(v),
            };
        }

        from_i128(self.as_i128(), ty)
    }

    /// Parse text as a value of the given type.
    ///
    /// Integers accept decimal or `0x` hexadecimal; a leading `-` is allowed
    /// for signed types.
    pub fn parse(ty: ValueType, text: &str) -> Result<Value> {
        let text = text.trim();
        let invalid = || Error::InvalidValue(format!("{text:?} is not a valid {ty}"));

        if ty.is_float() {
            let v: f64 = text.parse().map_err(|_| invalid())?;
            return Ok(Value::F64(v).cast(ty));
        }

        let (negative, digits) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text),
        };
        let magnitude = match digits
            .strip_prefix("0x")
            .or_else(|| digits.strip_prefix("0X"))
        {
            Some(hex) => i128::from_str_radix(hex, 16),
            None => digits.parse::<i128>(),
        }
        .map_err(|_| invalid())?;
        let v = if negative { -magnitude } else { magnitude };

        let fits = match ty {
            ValueType::I8 => i8::try_from(v).is_ok(),
            ValueType::U8 => u8::try_from(v).is_ok(),
            ValueType::I16 => i16::try_from(v).is_ok(),
            ValueType::U16 => u16::try_from(v).is_ok(),
            ValueType::I32 => i32::try_from(v).is_ok(),
            ValueType::U32 => u32::try_from(v).is_ok(),
            ValueType::I64 => i64::try_from(v).is_ok(),
            ValueType::U64 => u64::try_from(v).is_ok(),
            ValueType::F32 | ValueType::F64 => true,
        };
        if !fits {
            return Err(Error::InvalidValue(format!("{text} is out of range for {ty}")));
        }

        Ok(from_i128(v, ty))
    }
}

fn from_i128(v: i128, ty: ValueType) -> Value {
    match ty {
        ValueType::I8 => Value::I8(v as i8),
        ValueType::U8 => Value::U8(v as u8),
        ValueType::I16 => Value::I16(v as i16),
        ValueType::U16 => Value::U16(v as u16),
        ValueType::I32 => Value::I32(v as i32),
        ValueType::U32 => Value::U32(v as u32),
        ValueType::I64 => Value::I64(v as i64),
        ValueType::U64 => Value::U64(v as u64),
        ValueType::F32 => Value::F32(v as f32),
        ValueType::F64 => Value::F64(v as f64),
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::I8(v) => write!(f, "{v}"),
            Self::U8(v) => write!(f, "{v}"),
            Self::I16(v) => write!(f, "{v}"),
            Self::U16(v) => write!(f, "{v}"),
            Self::I32(v) => write!(f, "{v}"),
            Self::U32(v) => write!(f, "{v}"),
            Self::I64(v) => write!(f, "{v}"),
            Self::U64(v) => write!(f, "{v}"),
            Self::F32(v) => write!(f, "{v}"),
            Self::F64(v) => write!(f, "{v}"),
        }
    }
}

/// Text encodings understood by the string accessors
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, EnumString, Display,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum StringEncoding {
    #[default]
    Utf8,
    Utf16Le,
    ShiftJis,
}

impl StringEncoding {
    /// Width of one code unit, which is also the terminator width
    pub fn unit_width(&self) -> usize {
        match self {
            Self::Utf16Le => 2,
            Self::Utf8 | Self::ShiftJis => 1,
        }
    }

    /// Byte offset of the first terminator in `bytes`, if any
    pub fn find_terminator(&self, bytes: &[u8]) -> Option<usize> {
        match self.unit_width() {
            1 => memchr::memchr(0, bytes),
            width => bytes
                .chunks_exact(width)
                .position(|unit| unit.iter().all(|&b| b == 0))
                .map(|units| units * width),
        }
    }

    /// Decode bytes that no longer contain the terminator
    pub fn decode(&self, bytes: &[u8]) -> String {
        match self {
            Self::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            Self::Utf16Le => encoding_rs::UTF_16LE
                .decode_without_bom_handling(bytes)
                .0
                .into_owned(),
            Self::ShiftJis => encoding_rs::SHIFT_JIS.decode(bytes).0.into_owned(),
        }
    }
}

/// Pointer width of the target process
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display)]
pub enum PointerWidth {
    #[strum(serialize = "32-bit")]
    Bits32,
    #[default]
    #[strum(serialize = "64-bit")]
    Bits64,
}

impl PointerWidth {
    pub fn bytes(&self) -> usize {
        match self {
            Self::Bits32 => 4,
            Self::Bits64 => 8,
        }
    }

    /// Decode a pointer of this width from the start of `bytes`
    pub fn decode(&self, bytes: &[u8]) -> Option<u64> {
        match self {
            Self::Bits32 => u32::decode(bytes).map(u64::from),
            Self::Bits64 => u64::decode(bytes),
        }
    }
}
