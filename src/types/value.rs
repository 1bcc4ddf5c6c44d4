use crate::error::SparseError;
use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// One stored row: property name to typed value.
pub type PropertyMap = BTreeMap<String, Value>;

/// A point in time with the zone it was recorded in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Calendar {
    pub millis: i64,
    pub time_zone: String,
    /// Only the calendar date is meaningful.
    #[serde(default)]
    pub date_only: bool,
}

impl Calendar {
    pub fn new(millis: i64, time_zone: impl Into<String>) -> Self {
        Self {
            millis,
            time_zone: time_zone.into(),
            date_only: false,
        }
    }

    pub fn date(millis: i64, time_zone: impl Into<String>) -> Self {
        Self {
            date_only: true,
            ..Self::new(millis, time_zone)
        }
    }

    pub fn now_utc() -> Self {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64;
        Self::new(millis, "UTC")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Integer(i32),
    Long(i64),
    Boolean(bool),
    Double(f64),
    BigDecimal(BigDecimal),
    BigInteger(BigInt),
    Calendar(Calendar),
    ByteArray(Vec<u8>),
    StringArray(Vec<String>),
    IntegerArray(Vec<i32>),
    LongArray(Vec<i64>),
    BooleanArray(Vec<bool>),
    DoubleArray(Vec<f64>),
    BigDecimalArray(Vec<BigDecimal>),
    BigIntegerArray(Vec<BigInt>),
    CalendarArray(Vec<Calendar>),
    /// Deletes the property during a merge; never persisted.
    Removed,
}

impl Value {
    pub fn is_removed(&self) -> bool {
        matches!(self, Value::Removed)
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::String(_) => "string",
            Value::Integer(_) => "integer",
            Value::Long(_) => "long",
            Value::Boolean(_) => "boolean",
            Value::Double(_) => "double",
            Value::BigDecimal(_) => "big_decimal",
            Value::BigInteger(_) => "big_integer",
            Value::Calendar(_) => "calendar",
            Value::ByteArray(_) => "byte_array",
            Value::StringArray(_) => "string_array",
            Value::IntegerArray(_) => "integer_array",
            Value::LongArray(_) => "long_array",
            Value::BooleanArray(_) => "boolean_array",
            Value::DoubleArray(_) => "double_array",
            Value::BigDecimalArray(_) => "big_decimal_array",
            Value::BigIntegerArray(_) => "big_integer_array",
            Value::CalendarArray(_) => "calendar_array",
            Value::Removed => "removed",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Integral view used for permission bitmaps, which older rows may hold as longs.
    pub fn as_bitmap(&self) -> Option<i32> {
        match self {
            Value::Integer(v) => Some(*v),
            Value::Long(v) => i32::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(i64::from(*v)),
            Value::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_string_array(&self) -> Option<&[String]> {
        match self {
            Value::StringArray(v) => Some(v),
            _ => None,
        }
    }
}

macro_rules! value_from {
    ($($t:ty => $variant:ident, $array:ident;)*) => {
        $(
            impl From<$t> for Value {
                fn from(v: $t) -> Self {
                    Value::$variant(v)
                }
            }

            impl From<Vec<$t>> for Value {
                fn from(v: Vec<$t>) -> Self {
                    Value::$array(v)
                }
            }

            impl From<&[$t]> for Value {
                fn from(v: &[$t]) -> Self {
                    Value::$array(v.to_vec())
                }
            }

            /// `None` is a deletion, matching how a null property is written.
            impl From<Option<$t>> for Value {
                fn from(v: Option<$t>) -> Self {
                    v.map_or(Value::Removed, Value::$variant)
                }
            }

            /// Boxed element arrays share the plain array shape. A missing
            /// element has no wire form, so it is rejected rather than dropped.
            impl TryFrom<Vec<Option<$t>>> for Value {
                type Error = SparseError;

                fn try_from(v: Vec<Option<$t>>) -> Result<Self, Self::Error> {
                    let len = v.len();
                    let items = v
                        .into_iter()
                        .enumerate()
                        .map(|(idx, item)| {
                            item.ok_or_else(|| {
                                SparseError::Encode(format!(
                                    "{} element {idx} of {len} is missing",
                                    stringify!($array)
                                ))
                            })
                        })
                        .collect::<Result<Vec<$t>, SparseError>>()?;
                    Ok(Value::$array(items))
                }
            }
        )*
    };
}

value_from! {
    String => String, StringArray;
    i32 => Integer, IntegerArray;
    i64 => Long, LongArray;
    bool => Boolean, BooleanArray;
    f64 => Double, DoubleArray;
    BigDecimal => BigDecimal, BigDecimalArray;
    BigInt => BigInteger, BigIntegerArray;
    Calendar => Calendar, CalendarArray;
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<Option<&str>> for Value {
    fn from(v: Option<&str>) -> Self {
        v.map_or(Value::Removed, Value::from)
    }
}

impl From<&[&str]> for Value {
    fn from(v: &[&str]) -> Self {
        Value::StringArray(v.iter().map(|s| s.to_string()).collect())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::ByteArray(v)
    }
}
