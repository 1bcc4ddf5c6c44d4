//! Persistable value shapes and their wire registry.

pub mod long_string;
pub mod payload;
pub mod registry;
pub mod text;
pub mod value;

pub use long_string::{
    FileLongStringStore, LongStringStore, MemoryLongStringStore, ReusingLongStrings,
};
pub use payload::CodecContext;
pub use registry::{TYPE_TABLE, TypeDescriptor, TypeId, TypeLimits, TypeRegistry, type_by_id, type_id_of};
pub use value::{Calendar, PropertyMap, Value};
