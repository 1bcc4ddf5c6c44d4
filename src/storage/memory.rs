use crate::codec::row::{decode_row, encode_row};
use crate::config::StoreConfig;
use crate::error::SparseError;
use crate::storage::row_key::row_hash;
use crate::storage::{StorageClient, merge_properties};
use crate::types::long_string::{LongStringStore, MemoryLongStringStore, ReusingLongStrings};
use crate::types::payload::CodecContext;
use crate::types::value::PropertyMap;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone)]
struct StoredRow {
    keyspace: String,
    column_family: String,
    key: String,
    blob: Vec<u8>,
}

/// Keeps every row as an encoded blob under its hashed row key, so reads and
/// writes go through the same codec a persistent backend would use.
pub struct MemoryStorageClient {
    config: StoreConfig,
    long_strings: Arc<dyn LongStringStore>,
    rows: RwLock<HashMap<String, StoredRow>>,
}

impl std::fmt::Debug for MemoryStorageClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStorageClient")
            .field("rows", &self.rows.read().len())
            .finish()
    }
}

impl MemoryStorageClient {
    pub fn new(config: StoreConfig) -> Self {
        Self::with_long_strings(config, Arc::new(MemoryLongStringStore::new()))
    }

    pub fn with_long_strings(config: StoreConfig, long_strings: Arc<dyn LongStringStore>) -> Self {
        Self {
            config,
            long_strings,
            rows: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn len(&self) -> usize {
        self.rows.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.read().is_empty()
    }

    /// Raw stored blob, for callers that want to inspect the encoded form.
    pub fn raw_blob(&self, keyspace: &str, column_family: &str, key: &str) -> Option<Vec<u8>> {
        let hash = self.hash(keyspace, column_family, key);
        self.rows.read().get(&hash).map(|row| row.blob.clone())
    }

    fn hash(&self, keyspace: &str, column_family: &str, key: &str) -> String {
        row_hash(self.config.row_key_hash, keyspace, column_family, key)
    }

    fn ctx(&self) -> CodecContext<'_> {
        CodecContext::new(&self.config, Some(self.long_strings.as_ref()))
    }

    /// The row is already written, so a failed free only leaks the content.
    fn release(&self, locations: &[String]) {
        for location in locations {
            if let Err(e) = self.long_strings.remove(location) {
                warn!(location = %location, error = %e, "failed to free long string");
            }
        }
    }

    fn decode(&self, hash: &str, row: &StoredRow) -> Result<PropertyMap, SparseError> {
        decode_row(&self.ctx(), hash, &row.blob, Some(&row.column_family))
    }
}

impl StorageClient for MemoryStorageClient {
    fn get(
        &self,
        keyspace: &str,
        column_family: &str,
        key: &str,
    ) -> Result<PropertyMap, SparseError> {
        let hash = self.hash(keyspace, column_family, key);
        let rows = self.rows.read();
        match rows.get(&hash) {
            Some(row) => self.decode(&hash, row),
            None => Ok(PropertyMap::new()),
        }
    }

    /// Untouched long strings keep their stored location; ones the merge
    /// replaced or dropped are freed.
    fn insert(
        &self,
        keyspace: &str,
        column_family: &str,
        key: &str,
        values: &PropertyMap,
        _probably_new: bool,
    ) -> Result<(), SparseError> {
        let hash = self.hash(keyspace, column_family, key);
        let scope = ReusingLongStrings::new(self.long_strings.as_ref());
        let ctx = CodecContext::new(&self.config, Some(&scope));
        let mut rows = self.rows.write();
        let mut merged = match rows.get(&hash) {
            Some(row) => decode_row(&ctx, &hash, &row.blob, Some(&row.column_family))?,
            None => PropertyMap::new(),
        };
        merge_properties(&mut merged, values);
        if merged.is_empty() {
            rows.remove(&hash);
        } else {
            let blob = encode_row(&ctx, &hash, &merged, Some(column_family))?;
            rows.insert(
                hash,
                StoredRow {
                    keyspace: keyspace.to_string(),
                    column_family: column_family.to_string(),
                    key: key.to_string(),
                    blob,
                },
            );
        }
        drop(rows);
        self.release(&scope.orphaned());
        Ok(())
    }

    fn remove(&self, keyspace: &str, column_family: &str, key: &str) -> Result<(), SparseError> {
        let hash = self.hash(keyspace, column_family, key);
        let Some(row) = self.rows.write().remove(&hash) else {
            return Ok(());
        };
        let scope = ReusingLongStrings::new(self.long_strings.as_ref());
        let ctx = CodecContext::new(&self.config, Some(&scope));
        if let Err(e) = decode_row(&ctx, &hash, &row.blob, Some(&row.column_family)) {
            warn!(key, error = %e, "removed row did not decode, its long strings are kept");
        }
        self.release(&scope.orphaned());
        Ok(())
    }

    fn scan(
        &self,
        keyspace: &str,
        column_family: &str,
    ) -> Result<Vec<(String, PropertyMap)>, SparseError> {
        let rows = self.rows.read();
        let mut out = Vec::new();
        for (hash, row) in rows.iter() {
            if row.keyspace == keyspace && row.column_family == column_family {
                out.push((row.key.clone(), self.decode(hash, row)?));
            }
        }
        out.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryStorageClient;
    use crate::config::StoreConfig;
    use crate::storage::StorageClient;
    use crate::types::long_string::MemoryLongStringStore;
    use crate::types::value::{PropertyMap, Value};
    use std::sync::Arc;

    fn props(entries: &[(&str, Value)]) -> PropertyMap {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn absent_row_reads_empty() {
        let client = MemoryStorageClient::new(StoreConfig::default());
        assert!(client.get("n", "cn", "/nope").expect("get").is_empty());
    }

    #[test]
    fn inserts_merge_and_tombstones_delete() {
        let client = MemoryStorageClient::new(StoreConfig::default());
        client
            .insert("n", "cn", "/a", &props(&[("x", Value::Integer(1)), ("y", Value::from("y"))]), true)
            .expect("first");
        client
            .insert("n", "cn", "/a", &props(&[("x", Value::Removed), ("z", Value::Boolean(true))]), false)
            .expect("second");
        let row = client.get("n", "cn", "/a").expect("get");
        assert_eq!(row, props(&[("y", Value::from("y")), ("z", Value::Boolean(true))]));
    }

    #[test]
    fn emptied_row_is_removed() {
        let client = MemoryStorageClient::new(StoreConfig::default());
        client
            .insert("n", "cn", "/a", &props(&[("x", Value::Integer(1))]), true)
            .expect("insert");
        assert_eq!(client.len(), 1);
        client
            .insert("n", "cn", "/a", &props(&[("x", Value::Removed)]), false)
            .expect("delete");
        assert!(client.is_empty());
    }

    #[test]
    fn long_strings_are_stored_out_of_row() {
        let store = Arc::new(MemoryLongStringStore::new());
        let client = MemoryStorageClient::with_long_strings(
            StoreConfig::default().with_max_string_length(10),
            store.clone(),
        );
        let body = "abcdefghij0123456789";
        client
            .insert("n", "cn", "/a", &props(&[("body", Value::from(body))]), true)
            .expect("insert");
        assert_eq!(store.len(), 1);
        let blob = client.raw_blob("n", "cn", "/a").expect("blob");
        assert!(!blob.windows(body.len()).any(|w| w == body.as_bytes()));
        assert_eq!(client.get("n", "cn", "/a").expect("get")["body"], Value::from(body));
    }

    #[test]
    fn scan_is_scoped_and_ordered() {
        let client = MemoryStorageClient::new(StoreConfig::default());
        for key in ["/c", "/a", "/b"] {
            client
                .insert("n", "cn", key, &props(&[("k", Value::from(key))]), true)
                .expect("insert");
        }
        client
            .insert("n", "ac", "/a", &props(&[("k", Value::Integer(0))]), true)
            .expect("other cf");
        let keys: Vec<String> = client
            .scan("n", "cn")
            .expect("scan")
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec!["/a", "/b", "/c"]);
    }

    #[test]
    fn oversized_byte_array_is_rejected_on_insert() {
        let client = MemoryStorageClient::new(StoreConfig::default());
        let err = client
            .insert("n", "cn", "/a", &props(&[("blob", Value::ByteArray(vec![1; 70 * 1024]))]), true)
            .expect_err("too large");
        assert_eq!(err.code_str(), "value_too_large");
        assert!(client.is_empty());
    }

    #[test]
    fn unrelated_writes_keep_one_long_string_copy() {
        let store = Arc::new(MemoryLongStringStore::new());
        let client = MemoryStorageClient::with_long_strings(
            StoreConfig::default().with_max_string_length(10),
            store.clone(),
        );
        let body = "abcdefghij0123456789";
        client
            .insert("n", "cn", "/a", &props(&[("body", Value::from(body))]), true)
            .expect("insert");
        for i in 0..5 {
            client
                .insert("n", "cn", "/a", &props(&[("counter", Value::Integer(i))]), false)
                .expect("counter");
        }
        assert_eq!(store.len(), 1);
        let row = client.get("n", "cn", "/a").expect("get");
        assert_eq!(row["body"], Value::from(body));
        assert_eq!(row["counter"], Value::Integer(4));
    }

    #[test]
    fn replaced_and_removed_long_strings_are_freed() {
        let store = Arc::new(MemoryLongStringStore::new());
        let client = MemoryStorageClient::with_long_strings(
            StoreConfig::default().with_max_string_length(10),
            store.clone(),
        );
        client
            .insert("n", "cn", "/a", &props(&[("body", Value::from("first long body"))]), true)
            .expect("insert");
        client
            .insert("n", "cn", "/a", &props(&[("body", Value::from("second long body"))]), false)
            .expect("overwrite");
        assert_eq!(store.len(), 1);
        assert_eq!(client.get("n", "cn", "/a").expect("get")["body"], Value::from("second long body"));

        client.remove("n", "cn", "/a").expect("remove");
        assert!(store.is_empty());
        client.remove("n", "cn", "/a").expect("absent row");
    }
}
