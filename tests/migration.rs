use sparsemap::SparseStore;
use sparsemap::config::StoreConfig;
use sparsemap::error::SparseError;
use sparsemap::migration::{MIGRATION_COLUMN_FAMILY, PropertyMigrator};
use sparsemap::redo::{RedoLogReader, RedoOp, scan_logs};
use sparsemap::storage::StorageClient;
use sparsemap::types::payload::CodecContext;
use sparsemap::{PropertyMap, Value};
use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;
use tempfile::tempdir;

/// Converts `size` from an integer to a long.
struct WidenSize;

impl PropertyMigrator for WidenSize {
    fn name(&self) -> &str {
        "widen-size"
    }

    fn migrate(&self, _row_key: &str, properties: &mut PropertyMap) -> Result<bool, SparseError> {
        match properties.get("size") {
            Some(Value::Integer(v)) => {
                let widened = Value::Long(i64::from(*v));
                properties.insert("size".into(), widened);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// Drops `legacy`, after sizes are widened.
struct DropLegacy;

impl PropertyMigrator for DropLegacy {
    fn name(&self) -> &str {
        "drop-legacy"
    }

    fn dependencies(&self) -> Vec<String> {
        vec!["widen-size".into()]
    }

    fn migrate(&self, _row_key: &str, properties: &mut PropertyMap) -> Result<bool, SparseError> {
        Ok(properties.remove("legacy").is_some())
    }
}

struct NeedsGhost;

impl PropertyMigrator for NeedsGhost {
    fn name(&self) -> &str {
        "needs-ghost"
    }

    fn dependencies(&self) -> Vec<String> {
        vec!["ghost".into()]
    }

    fn migrate(&self, _row_key: &str, _properties: &mut PropertyMap) -> Result<bool, SparseError> {
        Ok(true)
    }
}

struct Broken;

impl PropertyMigrator for Broken {
    fn name(&self) -> &str {
        "broken"
    }

    fn run_once(&self) -> bool {
        false
    }

    fn migrate(&self, row_key: &str, _properties: &mut PropertyMap) -> Result<bool, SparseError> {
        Err(SparseError::Storage(format!("cannot read {row_key}")))
    }
}

fn seed(storage: &dyn StorageClient) {
    for (key, size) in [("/a", 1), ("/b", 2)] {
        let mut row = PropertyMap::new();
        row.insert("size".into(), Value::Integer(size));
        row.insert("legacy".into(), Value::Boolean(true));
        storage.insert("n", "cn", key, &row, true).expect("seed");
    }
    let mut current = PropertyMap::new();
    current.insert("size".into(), Value::Long(3));
    storage.insert("n", "cn", "/c", &current, true).expect("seed");
}

#[test]
fn migrations_run_in_order_and_journal_each_row() {
    let dir = tempdir().expect("temp dir");
    let config = StoreConfig {
        redo_log_dir: Some(dir.path().to_path_buf()),
        ..StoreConfig::development()
    };
    let mut store = SparseStore::open(config).expect("store");
    seed(store.storage().as_ref());

    let report = store
        .migrate(
            "n",
            "cn",
            vec![Arc::new(DropLegacy), Arc::new(NeedsGhost), Arc::new(WidenSize)],
        )
        .expect("migrate");
    assert_eq!(report.applied, vec!["widen-size", "drop-legacy"]);
    assert_eq!(report.unresolved.len(), 1);
    assert_eq!(report.unresolved[0].name, "needs-ghost");
    assert_eq!(report.rows_scanned, 3);
    assert_eq!(report.rows_changed, 2);

    let storage = store.storage();
    let a = storage.get("n", "cn", "/a").expect("get");
    assert_eq!(a.get("size"), Some(&Value::Long(1)));
    assert!(!a.contains_key("legacy"));
    let done: Vec<String> = storage
        .scan("n", MIGRATION_COLUMN_FAMILY)
        .expect("scan")
        .into_iter()
        .map(|(k, _)| k)
        .collect();
    assert_eq!(done, vec!["cn:drop-legacy", "cn:widen-size"]);
    store.close().expect("close");

    let logs = scan_logs(dir.path()).expect("logs");
    let ctx = CodecContext::inline_only();
    let mut reader = RedoLogReader::new(BufReader::new(File::open(&logs[0]).expect("open")));
    let mut records = Vec::new();
    while let Some(record) = reader.next_record(&ctx).expect("read") {
        records.push(record);
    }
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.committed));
    let first = &records[0];
    assert_eq!(first.entries[0].key.op, RedoOp::Before);
    assert_eq!(first.entries[0].properties.get("legacy"), Some(&Value::Boolean(true)));
    assert_eq!(first.entries[1].key.op, RedoOp::After);
    assert!(!first.entries[1].properties.contains_key("legacy"));
}

#[test]
fn completed_migrations_are_not_rerun() {
    let mut store = SparseStore::open(StoreConfig::development()).expect("store");
    seed(store.storage().as_ref());
    store
        .migrate("n", "cn", vec![Arc::new(WidenSize)])
        .expect("first run");

    let report = store
        .migrate("n", "cn", vec![Arc::new(WidenSize), Arc::new(DropLegacy)])
        .expect("second run");
    assert_eq!(report.already_applied, vec!["widen-size"]);
    assert_eq!(report.applied, vec!["drop-legacy"]);
    assert_eq!(report.rows_changed, 2);
}

#[test]
fn a_failing_migrator_stops_the_run() {
    let mut store = SparseStore::open(StoreConfig::development()).expect("store");
    seed(store.storage().as_ref());
    let err = store
        .migrate("n", "cn", vec![Arc::new(Broken)])
        .expect_err("broken migrator");
    assert_eq!(err.code_str(), "migration");
    assert!(err.to_string().contains("broken"));
    assert!(store
        .storage()
        .scan("n", MIGRATION_COLUMN_FAMILY)
        .expect("scan")
        .is_empty());
}
