//! Raw row storage consumed by the access-control engine, the redo replayer
//! and migrations.

pub mod memory;
pub mod row_key;

use crate::error::SparseError;
use crate::types::value::PropertyMap;
use std::sync::Arc;

pub use memory::MemoryStorageClient;
pub use row_key::row_hash;

/// Row-level storage addressed by `(keyspace, column_family, key)`.
///
/// Every call is independent; no multi-row atomicity is implied.
pub trait StorageClient: Send + Sync {
    /// Absent rows read as an empty map.
    fn get(
        &self,
        keyspace: &str,
        column_family: &str,
        key: &str,
    ) -> Result<PropertyMap, SparseError>;

    /// Merges `values` into the row. `Value::Removed` entries delete the
    /// property. `probably_new` is a hint that the row does not exist yet.
    fn insert(
        &self,
        keyspace: &str,
        column_family: &str,
        key: &str,
        values: &PropertyMap,
        probably_new: bool,
    ) -> Result<(), SparseError>;

    fn remove(&self, keyspace: &str, column_family: &str, key: &str) -> Result<(), SparseError>;

    /// Every row in a column family as `(key, map)`, ordered by key.
    fn scan(
        &self,
        keyspace: &str,
        column_family: &str,
    ) -> Result<Vec<(String, PropertyMap)>, SparseError>;
}

impl<T: StorageClient + ?Sized> StorageClient for Arc<T> {
    fn get(
        &self,
        keyspace: &str,
        column_family: &str,
        key: &str,
    ) -> Result<PropertyMap, SparseError> {
        (**self).get(keyspace, column_family, key)
    }

    fn insert(
        &self,
        keyspace: &str,
        column_family: &str,
        key: &str,
        values: &PropertyMap,
        probably_new: bool,
    ) -> Result<(), SparseError> {
        (**self).insert(keyspace, column_family, key, values, probably_new)
    }

    fn remove(&self, keyspace: &str, column_family: &str, key: &str) -> Result<(), SparseError> {
        (**self).remove(keyspace, column_family, key)
    }

    fn scan(
        &self,
        keyspace: &str,
        column_family: &str,
    ) -> Result<Vec<(String, PropertyMap)>, SparseError> {
        (**self).scan(keyspace, column_family)
    }
}

/// Applies `update` on top of `existing`, dropping tombstoned properties.
pub fn merge_properties(existing: &mut PropertyMap, update: &PropertyMap) {
    for (name, value) in update {
        if value.is_removed() {
            existing.remove(name);
        } else {
            existing.insert(name.clone(), value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::merge_properties;
    use crate::types::value::{PropertyMap, Value};

    #[test]
    fn tombstones_delete_during_merge() {
        let mut row = PropertyMap::new();
        row.insert("a".into(), Value::Integer(1));
        row.insert("b".into(), Value::Integer(2));
        let mut update = PropertyMap::new();
        update.insert("a".into(), Value::Removed);
        update.insert("c".into(), Value::from("new"));
        update.insert("never".into(), Value::Removed);
        merge_properties(&mut row, &update);
        assert_eq!(row.keys().collect::<Vec<_>>(), vec!["b", "c"]);
    }
}
