use crate::codec::data::fits_utf_frame;
use crate::error::{SparseError, ValueKind};
use crate::types::value::Value;
use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::HashMap;
use tracing::warn;

/// Every persistable value shape. `Unknown` carries wire ids written by newer
/// writers that this build does not recognise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeId {
    String,
    Integer,
    Long,
    Boolean,
    Double,
    BigDecimal,
    BigInteger,
    Calendar,
    ByteArray,
    LongString,
    StringArray,
    IntegerArray,
    LongArray,
    BooleanArray,
    DoubleArray,
    BigDecimalArray,
    BigIntegerArray,
    CalendarArray,
    LongStringArray,
    Removed,
    Unknown(i32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TypeDescriptor {
    #[serde(skip)]
    pub type_id: TypeId,
    pub wire_id: i32,
    pub name: &'static str,
    /// The in-memory shape this type persists. Must be unique across the table.
    pub binding: &'static str,
}

const fn td(type_id: TypeId, wire_id: i32, name: &'static str, binding: &'static str) -> TypeDescriptor {
    TypeDescriptor {
        type_id,
        wire_id,
        name,
        binding,
    }
}

/// Wire ids are persisted; never renumber or reuse an entry.
pub static TYPE_TABLE: &[TypeDescriptor] = &[
    td(TypeId::String, 0, "string", "String"),
    td(TypeId::Integer, 1, "integer", "i32"),
    td(TypeId::Long, 2, "long", "i64"),
    td(TypeId::Boolean, 3, "boolean", "bool"),
    td(TypeId::Double, 4, "double", "f64"),
    td(TypeId::BigDecimal, 5, "big_decimal", "BigDecimal"),
    td(TypeId::BigInteger, 6, "big_integer", "BigInt"),
    td(TypeId::Calendar, 7, "calendar", "Calendar"),
    td(TypeId::ByteArray, 8, "byte_array", "Vec<u8>"),
    td(TypeId::LongString, 9, "long_string", "String>max_string_length"),
    td(TypeId::StringArray, 100, "string_array", "Vec<String>"),
    td(TypeId::IntegerArray, 101, "integer_array", "Vec<i32>"),
    td(TypeId::LongArray, 102, "long_array", "Vec<i64>"),
    td(TypeId::BooleanArray, 103, "boolean_array", "Vec<bool>"),
    td(TypeId::DoubleArray, 104, "double_array", "Vec<f64>"),
    td(TypeId::BigDecimalArray, 105, "big_decimal_array", "Vec<BigDecimal>"),
    td(TypeId::BigIntegerArray, 106, "big_integer_array", "Vec<BigInt>"),
    td(TypeId::CalendarArray, 107, "calendar_array", "Vec<Calendar>"),
    td(
        TypeId::LongStringArray,
        109,
        "long_string_array",
        "Vec<String>>max_string_length",
    ),
    td(TypeId::Removed, 127, "removed", "Removed"),
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("wire id {wire_id} registered by both '{first}' and '{second}'")]
    DuplicateWireId {
        wire_id: i32,
        first: &'static str,
        second: &'static str,
    },
    #[error("binding '{binding}' registered by both '{first}' and '{second}'")]
    DuplicateBinding {
        binding: &'static str,
        first: &'static str,
        second: &'static str,
    },
    #[error("type '{name}' registered twice")]
    DuplicateType { name: &'static str },
    #[error("type '{name}' cannot be registered as unknown")]
    UnknownInTable { name: &'static str },
}

#[derive(Debug)]
pub struct TypeRegistry {
    by_wire: HashMap<i32, TypeDescriptor>,
    by_type: HashMap<TypeId, TypeDescriptor>,
}

impl TypeRegistry {
    /// Builds and self-checks a registry from a table.
    pub fn build(table: &'static [TypeDescriptor]) -> Result<Self, RegistryError> {
        let mut by_wire: HashMap<i32, TypeDescriptor> = HashMap::with_capacity(table.len());
        let mut by_type = HashMap::with_capacity(table.len());
        let mut bindings: HashMap<&'static str, &'static str> = HashMap::with_capacity(table.len());
        for desc in table {
            if matches!(desc.type_id, TypeId::Unknown(_)) {
                return Err(RegistryError::UnknownInTable { name: desc.name });
            }
            if let Some(prev) = by_wire.get(&desc.wire_id) {
                return Err(RegistryError::DuplicateWireId {
                    wire_id: desc.wire_id,
                    first: prev.name,
                    second: desc.name,
                });
            }
            if let Some(prev) = bindings.get(desc.binding) {
                return Err(RegistryError::DuplicateBinding {
                    binding: desc.binding,
                    first: *prev,
                    second: desc.name,
                });
            }
            if by_type.insert(desc.type_id, *desc).is_some() {
                return Err(RegistryError::DuplicateType { name: desc.name });
            }
            by_wire.insert(desc.wire_id, *desc);
            bindings.insert(desc.binding, desc.name);
        }
        Ok(Self { by_wire, by_type })
    }

    pub fn global() -> &'static TypeRegistry {
        &REGISTRY
    }

    /// Resolves a wire id; ids this build does not know become `Unknown`.
    pub fn type_by_id(&self, wire_id: i32) -> TypeId {
        self.by_wire
            .get(&wire_id)
            .map_or(TypeId::Unknown(wire_id), |d| d.type_id)
    }

    pub fn wire_id(&self, type_id: TypeId) -> i32 {
        match type_id {
            TypeId::Unknown(id) => id,
            known => self.by_type.get(&known).map_or(-1, |d| d.wire_id),
        }
    }

    pub fn descriptor(&self, type_id: TypeId) -> Option<&TypeDescriptor> {
        self.by_type.get(&type_id)
    }

    pub fn descriptors(&self) -> Vec<TypeDescriptor> {
        let mut all: Vec<TypeDescriptor> = self.by_wire.values().copied().collect();
        all.sort_by_key(|d| d.wire_id);
        all
    }
}

static REGISTRY: Lazy<TypeRegistry> = Lazy::new(|| match TypeRegistry::build(TYPE_TABLE) {
    Ok(registry) => registry,
    Err(e) => panic!("type registry is misconfigured, refusing to start: {e}"),
});

/// Size limits that steer classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeLimits {
    pub max_string_length: usize,
    pub max_byte_array_bytes: usize,
}

impl TypeLimits {
    pub fn from_config(config: &crate::config::StoreConfig) -> Self {
        Self {
            max_string_length: config.max_string_length,
            max_byte_array_bytes: config.max_byte_array_bytes,
        }
    }

    fn is_inline(&self, s: &str) -> bool {
        s.chars().count() <= self.max_string_length && fits_utf_frame(s)
    }
}

impl Default for TypeLimits {
    fn default() -> Self {
        Self::from_config(&crate::config::StoreConfig::default())
    }
}

/// Picks the wire type for a value.
///
/// Strings over the length cap move out of row; byte arrays over the cap are
/// rejected outright.
pub fn type_id_of(value: &Value, limits: &TypeLimits) -> Result<TypeId, SparseError> {
    let id = match value {
        Value::String(s) if limits.is_inline(s) => TypeId::String,
        Value::String(_) => TypeId::LongString,
        Value::Integer(_) => TypeId::Integer,
        Value::Long(_) => TypeId::Long,
        Value::Boolean(_) => TypeId::Boolean,
        Value::Double(_) => TypeId::Double,
        Value::BigDecimal(_) => TypeId::BigDecimal,
        Value::BigInteger(_) => TypeId::BigInteger,
        Value::Calendar(_) => TypeId::Calendar,
        Value::ByteArray(bytes) => {
            if bytes.len() > limits.max_byte_array_bytes {
                return Err(SparseError::ValueTooLarge {
                    kind: ValueKind::ByteArray,
                    size: bytes.len(),
                    limit: limits.max_byte_array_bytes,
                });
            }
            TypeId::ByteArray
        }
        Value::StringArray(items) if items.iter().all(|s| limits.is_inline(s)) => {
            TypeId::StringArray
        }
        Value::StringArray(_) => TypeId::LongStringArray,
        Value::IntegerArray(_) => TypeId::IntegerArray,
        Value::LongArray(_) => TypeId::LongArray,
        Value::BooleanArray(_) => TypeId::BooleanArray,
        Value::DoubleArray(_) => TypeId::DoubleArray,
        Value::BigDecimalArray(_) => TypeId::BigDecimalArray,
        Value::BigIntegerArray(_) => TypeId::BigIntegerArray,
        Value::CalendarArray(_) => TypeId::CalendarArray,
        Value::Removed => TypeId::Removed,
    };
    Ok(id)
}

/// Wire id for the value under the global registry.
pub fn wire_id_of(value: &Value, limits: &TypeLimits) -> Result<i32, SparseError> {
    Ok(TypeRegistry::global().wire_id(type_id_of(value, limits)?))
}

/// Resolves a wire id under the global registry, logging ids from newer writers.
pub fn type_by_id(wire_id: i32) -> TypeId {
    let id = TypeRegistry::global().type_by_id(wire_id);
    if let TypeId::Unknown(raw) = id {
        warn!(wire_id = raw, "unknown property type id, reading as string");
    }
    id
}
