//! Human-diffable text forms for scalar values.
//!
//! Integers and longs are plain base-10 so column stores and dumps stay
//! readable. Arrays and byte arrays have no text form.

use crate::error::SparseError;
use crate::types::registry::TypeId;
use crate::types::value::{Calendar, Value};
use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use std::str::FromStr;

pub fn to_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.clone(),
        Value::Integer(v) => v.to_string(),
        Value::Long(v) => v.to_string(),
        Value::Boolean(v) => v.to_string(),
        Value::Double(v) => format!("{v:?}"),
        Value::BigDecimal(v) => v.to_string(),
        Value::BigInteger(v) => v.to_string(),
        Value::Calendar(c) => {
            if c.date_only {
                format!("{};{};date", c.millis, c.time_zone)
            } else {
                format!("{};{}", c.millis, c.time_zone)
            }
        }
        _ => return None,
    };
    Some(text)
}

fn bad(type_id: TypeId, raw: &str) -> SparseError {
    SparseError::Decode(format!("'{raw}' is not a valid {type_id:?}"))
}

pub fn from_text(type_id: TypeId, raw: &str) -> Result<Value, SparseError> {
    let value = match type_id {
        TypeId::String | TypeId::Unknown(_) => Value::String(raw.to_string()),
        TypeId::Integer => Value::Integer(raw.parse().map_err(|_| bad(type_id, raw))?),
        TypeId::Long => Value::Long(raw.parse().map_err(|_| bad(type_id, raw))?),
        TypeId::Boolean => match raw {
            "true" => Value::Boolean(true),
            "false" => Value::Boolean(false),
            _ => return Err(bad(type_id, raw)),
        },
        TypeId::Double => Value::Double(raw.parse().map_err(|_| bad(type_id, raw))?),
        TypeId::BigDecimal => {
            Value::BigDecimal(BigDecimal::from_str(raw).map_err(|_| bad(type_id, raw))?)
        }
        TypeId::BigInteger => {
            Value::BigInteger(BigInt::from_str(raw).map_err(|_| bad(type_id, raw))?)
        }
        TypeId::Calendar => {
            let mut parts = raw.splitn(3, ';');
            let millis = parts
                .next()
                .and_then(|m| m.parse::<i64>().ok())
                .ok_or_else(|| bad(type_id, raw))?;
            let time_zone = parts.next().ok_or_else(|| bad(type_id, raw))?;
            let date_only = match parts.next() {
                None => false,
                Some("date") => true,
                Some(_) => return Err(bad(type_id, raw)),
            };
            Value::Calendar(Calendar {
                millis,
                time_zone: time_zone.to_string(),
                date_only,
            })
        }
        other => {
            return Err(SparseError::Decode(format!(
                "{other:?} has no text form"
            )));
        }
    };
    Ok(value)
}
