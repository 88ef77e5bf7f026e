//! Tagged primitive values captured from observed fields.

use memglass::{FieldProxy, PrimitiveType};
use serde::{Serialize, Serializer};

/// One primitive field value, tagged with its wire type.
///
/// Equality is primitive-tagged: two values compare equal only when both the
/// tag and the payload match. Floats compare by `==`, so a NaN field reports
/// as changed on every snapshot — consistent with the text rendering, which
/// has no stable NaN literal either.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Bool(bool),
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
    Char(u8),
}

impl Value {
    /// Wire tag of this value.
    pub fn type_tag(&self) -> PrimitiveType {
        match self {
            Value::Bool(_) => PrimitiveType::Bool,
            Value::I8(_) => PrimitiveType::Int8,
            Value::U8(_) => PrimitiveType::UInt8,
            Value::I16(_) => PrimitiveType::Int16,
            Value::U16(_) => PrimitiveType::UInt16,
            Value::I32(_) => PrimitiveType::Int32,
            Value::U32(_) => PrimitiveType::UInt32,
            Value::I64(_) => PrimitiveType::Int64,
            Value::U64(_) => PrimitiveType::UInt64,
            Value::F32(_) => PrimitiveType::Float32,
            Value::F64(_) => PrimitiveType::Float64,
            Value::Char(_) => PrimitiveType::Char,
        }
    }

    /// Whether the binary codec delta-codes this value.
    pub fn is_integer(&self) -> bool {
        self.type_tag().is_integer()
    }

    /// Integer payload widened to `i64` (floats map to 0).
    pub fn as_i64(&self) -> i64 {
        match *self {
            Value::Bool(v) => v as i64,
            Value::I8(v) => v as i64,
            Value::U8(v) => v as i64,
            Value::I16(v) => v as i64,
            Value::U16(v) => v as i64,
            Value::I32(v) => v as i64,
            Value::U32(v) => v as i64,
            Value::I64(v) => v,
            Value::U64(v) => v as i64,
            Value::Char(v) => v as i64,
            Value::F32(_) | Value::F64(_) => 0,
        }
    }

    /// Rebuild a value of integer tag `tag` from a widened `i64`.
    ///
    /// Float tags take a lossy cast; the binary decoder never routes floats
    /// through this path.
    pub fn from_integer(tag: PrimitiveType, v: i64) -> Value {
        match tag {
            PrimitiveType::Bool => Value::Bool(v != 0),
            PrimitiveType::Int8 => Value::I8(v as i8),
            PrimitiveType::UInt8 => Value::U8(v as u8),
            PrimitiveType::Int16 => Value::I16(v as i16),
            PrimitiveType::UInt16 => Value::U16(v as u16),
            PrimitiveType::Int32 => Value::I32(v as i32),
            PrimitiveType::UInt32 => Value::U32(v as u32),
            PrimitiveType::Int64 => Value::I64(v),
            PrimitiveType::UInt64 => Value::U64(v as u64),
            PrimitiveType::Float32 => Value::F32(v as f32),
            PrimitiveType::Float64 => Value::F64(v as f64),
            PrimitiveType::Char => Value::Char(v as u8),
        }
    }

    /// Read a proxy's current value under its declared primitive tag.
    ///
    /// Non-primitive (nested struct) fields yield `None`.
    pub fn read(proxy: &FieldProxy<'_>) -> Option<Value> {
        let field = proxy.info()?;
        let tag = field.primitive()?;
        Some(match tag {
            PrimitiveType::Bool => Value::Bool(proxy.get::<bool>()),
            PrimitiveType::Int8 => Value::I8(proxy.get::<i8>()),
            PrimitiveType::UInt8 => Value::U8(proxy.get::<u8>()),
            PrimitiveType::Int16 => Value::I16(proxy.get::<i16>()),
            PrimitiveType::UInt16 => Value::U16(proxy.get::<u16>()),
            PrimitiveType::Int32 => Value::I32(proxy.get::<i32>()),
            PrimitiveType::UInt32 => Value::U32(proxy.get::<u32>()),
            PrimitiveType::Int64 => Value::I64(proxy.get::<i64>()),
            PrimitiveType::UInt64 => Value::U64(proxy.get::<u64>()),
            PrimitiveType::Float32 => Value::F32(proxy.get::<f32>()),
            PrimitiveType::Float64 => Value::F64(proxy.get::<f64>()),
            PrimitiveType::Char => Value::Char(proxy.get::<u8>()),
        })
    }

    /// Text literal: decimal integers, `true`/`false`, quoted chars,
    /// six-significant-digit floats.
    pub fn text(&self) -> String {
        match *self {
            Value::Bool(v) => if v { "true" } else { "false" }.to_string(),
            Value::I8(v) => v.to_string(),
            Value::U8(v) => v.to_string(),
            Value::I16(v) => v.to_string(),
            Value::U16(v) => v.to_string(),
            Value::I32(v) => v.to_string(),
            Value::U32(v) => v.to_string(),
            Value::I64(v) => v.to_string(),
            Value::U64(v) => v.to_string(),
            Value::F32(v) => format_g6(v as f64),
            Value::F64(v) => format_g6(v),
            Value::Char(v) => format!("'{}'", v as char),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match *self {
            Value::Bool(v) => serializer.serialize_bool(v),
            Value::I8(v) => serializer.serialize_i8(v),
            Value::U8(v) => serializer.serialize_u8(v),
            Value::I16(v) => serializer.serialize_i16(v),
            Value::U16(v) => serializer.serialize_u16(v),
            Value::I32(v) => serializer.serialize_i32(v),
            Value::U32(v) => serializer.serialize_u32(v),
            Value::I64(v) => serializer.serialize_i64(v),
            Value::U64(v) => serializer.serialize_u64(v),
            Value::F32(v) => serialize_float(serializer, v as f64),
            Value::F64(v) => serialize_float(serializer, v),
            Value::Char(v) => serializer.serialize_char(v as char),
        }
    }
}

/// Finite floats are JSON numbers; NaN and infinities become the strings
/// `"NaN"`, `"Infinity"`, `"-Infinity"`.
fn serialize_float<S: Serializer>(serializer: S, v: f64) -> Result<S::Ok, S::Error> {
    if v.is_nan() {
        serializer.serialize_str("NaN")
    } else if v.is_infinite() {
        serializer.serialize_str(if v > 0.0 { "Infinity" } else { "-Infinity" })
    } else {
        serializer.serialize_f64(v)
    }
}

/// Format a float to six significant digits, fixed or scientific.
fn format_g6(value: f64) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }

    let exp = value.abs().log10().floor() as i32;
    if !(-4..6).contains(&exp) {
        let mantissa = value / 10f64.powi(exp);
        format!("{}e{exp}", trim_zeros(format!("{mantissa:.5}")))
    } else {
        let decimals = (5 - exp).max(0) as usize;
        trim_zeros(format!("{value:.decimals$}"))
    }
}

fn trim_zeros(s: String) -> String {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    } else {
        s
    }
}
