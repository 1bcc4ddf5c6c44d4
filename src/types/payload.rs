//! Binary payloads for each registered type.

use crate::codec::data::{DataRead, DataWrite};
use crate::config::StoreConfig;
use crate::error::{SparseError, ValueKind};
use crate::types::long_string::LongStringStore;
use crate::types::registry::{TypeId, TypeLimits, type_id_of};
use crate::types::value::{Calendar, Value};
use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use std::io::{Read, Write};
use std::str::FromStr;

/// Upper bound on speculative allocation while reading element counts.
const MAX_PREALLOC: usize = 4096;

/// Everything a payload needs besides the bytes: size limits, strictness for
/// unknown ids, and where long strings live.
#[derive(Clone, Copy)]
pub struct CodecContext<'a> {
    pub limits: TypeLimits,
    pub strict_types: bool,
    pub long_strings: Option<&'a dyn LongStringStore>,
}

impl std::fmt::Debug for CodecContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodecContext")
            .field("limits", &self.limits)
            .field("strict_types", &self.strict_types)
            .field("long_strings", &self.long_strings.is_some())
            .finish()
    }
}

impl<'a> CodecContext<'a> {
    pub fn new(config: &StoreConfig, long_strings: Option<&'a dyn LongStringStore>) -> Self {
        Self {
            limits: TypeLimits::from_config(config),
            strict_types: config.strict_types,
            long_strings,
        }
    }

    /// Default limits without out-of-row storage; long strings fail to encode.
    pub fn inline_only() -> CodecContext<'static> {
        CodecContext {
            limits: TypeLimits::default(),
            strict_types: false,
            long_strings: None,
        }
    }

    fn long_strings(&self) -> Result<&'a dyn LongStringStore, SparseError> {
        self.long_strings.ok_or_else(|| {
            SparseError::Encode("string exceeds inline limit and no long string store is configured".into())
        })
    }

    pub fn type_of(&self, value: &Value) -> Result<TypeId, SparseError> {
        type_id_of(value, &self.limits)
    }
}

fn load_vec<R, T, F>(r: &mut R, mut item: F) -> Result<Vec<T>, SparseError>
where
    R: Read + ?Sized,
    F: FnMut(&mut R) -> Result<T, SparseError>,
{
    let len = r.read_len()?;
    let mut out = Vec::with_capacity(len.min(MAX_PREALLOC));
    for _ in 0..len {
        out.push(item(r)?);
    }
    Ok(out)
}

fn save_calendar<W: Write + ?Sized>(w: &mut W, c: &Calendar) -> Result<(), SparseError> {
    w.write_i64_be(c.millis)?;
    w.write_utf(&c.time_zone)?;
    w.write_bool(c.date_only)?;
    Ok(())
}

fn load_calendar<R: Read + ?Sized>(r: &mut R) -> Result<Calendar, SparseError> {
    let millis = r.read_i64_be()?;
    let time_zone = r.read_utf()?;
    let date_only = r.read_bool()?;
    Ok(Calendar {
        millis,
        time_zone,
        date_only,
    })
}

fn parse_decimal(raw: &str) -> Result<BigDecimal, SparseError> {
    BigDecimal::from_str(raw).map_err(|e| SparseError::Decode(format!("bad decimal '{raw}': {e}")))
}

fn parse_bigint(raw: &str) -> Result<BigInt, SparseError> {
    BigInt::from_str(raw).map_err(|e| SparseError::Decode(format!("bad integer '{raw}': {e}")))
}

fn mismatch(type_id: TypeId, value: &Value) -> SparseError {
    SparseError::Encode(format!(
        "value of kind {} cannot be saved as {type_id:?}",
        value.kind_name()
    ))
}

/// Writes the payload of `value` as `type_id`. The caller writes the type id.
pub fn save<W: Write + ?Sized>(
    w: &mut W,
    type_id: TypeId,
    value: &Value,
    ctx: &CodecContext<'_>,
) -> Result<(), SparseError> {
    match (type_id, value) {
        (TypeId::String, Value::String(s)) => w.write_utf(s)?,
        (TypeId::LongString, Value::String(s)) => {
            let location = ctx.long_strings()?.store(s)?;
            w.write_utf(&location)?;
        }
        (TypeId::Integer, Value::Integer(v)) => w.write_i32_be(*v)?,
        (TypeId::Long, Value::Long(v)) => w.write_i64_be(*v)?,
        (TypeId::Boolean, Value::Boolean(v)) => w.write_bool(*v)?,
        (TypeId::Double, Value::Double(v)) => w.write_f64_be(*v)?,
        (TypeId::BigDecimal, Value::BigDecimal(v)) => w.write_utf(&v.to_string())?,
        (TypeId::BigInteger, Value::BigInteger(v)) => w.write_utf(&v.to_string())?,
        (TypeId::Calendar, Value::Calendar(c)) => save_calendar(w, c)?,
        (TypeId::ByteArray, Value::ByteArray(bytes)) => {
            if bytes.len() > ctx.limits.max_byte_array_bytes {
                return Err(SparseError::ValueTooLarge {
                    kind: ValueKind::ByteArray,
                    size: bytes.len(),
                    limit: ctx.limits.max_byte_array_bytes,
                });
            }
            w.write_len(bytes.len())?;
            w.write_all(bytes)?;
        }
        (TypeId::StringArray, Value::StringArray(items)) => {
            w.write_len(items.len())?;
            for s in items {
                w.write_utf(s)?;
            }
        }
        (TypeId::LongStringArray, Value::StringArray(items)) => {
            let store = ctx.long_strings()?;
            w.write_len(items.len())?;
            for s in items {
                w.write_utf(&store.store(s)?)?;
            }
        }
        (TypeId::IntegerArray, Value::IntegerArray(items)) => {
            w.write_len(items.len())?;
            for v in items {
                w.write_i32_be(*v)?;
            }
        }
        (TypeId::LongArray, Value::LongArray(items)) => {
            w.write_len(items.len())?;
            for v in items {
                w.write_i64_be(*v)?;
            }
        }
        (TypeId::BooleanArray, Value::BooleanArray(items)) => {
            w.write_len(items.len())?;
            for v in items {
                w.write_bool(*v)?;
            }
        }
        (TypeId::DoubleArray, Value::DoubleArray(items)) => {
            w.write_len(items.len())?;
            for v in items {
                w.write_f64_be(*v)?;
            }
        }
        (TypeId::BigDecimalArray, Value::BigDecimalArray(items)) => {
            w.write_len(items.len())?;
            for v in items {
                w.write_utf(&v.to_string())?;
            }
        }
        (TypeId::BigIntegerArray, Value::BigIntegerArray(items)) => {
            w.write_len(items.len())?;
            for v in items {
                w.write_utf(&v.to_string())?;
            }
        }
        (TypeId::CalendarArray, Value::CalendarArray(items)) => {
            w.write_len(items.len())?;
            for c in items {
                save_calendar(w, c)?;
            }
        }
        (TypeId::Removed, Value::Removed) => {}
        (TypeId::Unknown(id), _) => {
            return Err(SparseError::Encode(format!("cannot write unknown type id {id}")));
        }
        (type_id, value) => return Err(mismatch(type_id, value)),
    }
    Ok(())
}

/// Reads one payload of `type_id`. Unknown ids are read as strings unless the
/// context is strict.
pub fn load<R: Read + ?Sized>(
    r: &mut R,
    type_id: TypeId,
    ctx: &CodecContext<'_>,
) -> Result<Value, SparseError> {
    let value = match type_id {
        TypeId::String => Value::String(r.read_utf()?),
        TypeId::LongString => {
            let location = r.read_utf()?;
            Value::String(ctx.long_strings()?.load(&location)?)
        }
        TypeId::Integer => Value::Integer(r.read_i32_be()?),
        TypeId::Long => Value::Long(r.read_i64_be()?),
        TypeId::Boolean => Value::Boolean(r.read_bool()?),
        TypeId::Double => Value::Double(r.read_f64_be()?),
        TypeId::BigDecimal => Value::BigDecimal(parse_decimal(&r.read_utf()?)?),
        TypeId::BigInteger => Value::BigInteger(parse_bigint(&r.read_utf()?)?),
        TypeId::Calendar => Value::Calendar(load_calendar(r)?),
        TypeId::ByteArray => {
            let len = r.read_len()?;
            if len > ctx.limits.max_byte_array_bytes {
                return Err(SparseError::Decode(format!(
                    "byte array length {len} exceeds limit {}",
                    ctx.limits.max_byte_array_bytes
                )));
            }
            let mut bytes = vec![0u8; len];
            r.read_exact(&mut bytes)?;
            Value::ByteArray(bytes)
        }
        TypeId::StringArray => Value::StringArray(load_vec(r, |r| r.read_utf())?),
        TypeId::LongStringArray => {
            let store = ctx.long_strings()?;
            Value::StringArray(load_vec(r, |r| store.load(&r.read_utf()?))?)
        }
        TypeId::IntegerArray => Value::IntegerArray(load_vec(r, |r| Ok(r.read_i32_be()?))?),
        TypeId::LongArray => Value::LongArray(load_vec(r, |r| Ok(r.read_i64_be()?))?),
        TypeId::BooleanArray => Value::BooleanArray(load_vec(r, |r| Ok(r.read_bool()?))?),
        TypeId::DoubleArray => Value::DoubleArray(load_vec(r, |r| Ok(r.read_f64_be()?))?),
        TypeId::BigDecimalArray => {
            Value::BigDecimalArray(load_vec(r, |r| parse_decimal(&r.read_utf()?))?)
        }
        TypeId::BigIntegerArray => {
            Value::BigIntegerArray(load_vec(r, |r| parse_bigint(&r.read_utf()?))?)
        }
        TypeId::CalendarArray => Value::CalendarArray(load_vec(r, load_calendar)?),
        TypeId::Removed => Value::Removed,
        TypeId::Unknown(id) => {
            if ctx.strict_types {
                return Err(SparseError::UnknownType { type_id: id });
            }
            Value::String(r.read_utf()?)
        }
    };
    Ok(value)
}
