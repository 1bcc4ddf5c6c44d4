pub mod acl;
pub mod codec;
pub mod config;
pub mod error;
pub mod migration;
pub mod redo;
pub mod storage;
pub mod types;

use crate::acl::{AccessControlManager, Subject};
use crate::config::StoreConfig;
use crate::error::SparseError;
use crate::migration::{MigrationReport, Migrator, PropertyMigrator};
use crate::redo::{RedoLog, ReplayReport, replay_committed};
use crate::storage::{MemoryStorageClient, StorageClient};
use crate::types::long_string::{FileLongStringStore, LongStringStore, MemoryLongStringStore};
use crate::types::payload::CodecContext;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

pub use crate::error::SparseErrorCode;
pub use crate::types::value::{Calendar, PropertyMap, Value};

/// One configured store: the row backend, its long-string store and an
/// optional redo log, all sharing a single [`StoreConfig`].
pub struct SparseStore {
    config: StoreConfig,
    storage: Arc<dyn StorageClient>,
    long_strings: Arc<dyn LongStringStore>,
    redo: Option<RedoLog>,
}

impl std::fmt::Debug for SparseStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SparseStore")
            .field("config", &self.config)
            .field("redo", &self.redo)
            .finish()
    }
}

impl SparseStore {
    /// Validates `config` and opens the in-memory row backend. Long strings
    /// go to `long_string_dir` when set, and a redo log is opened when
    /// `redo_log_dir` is set.
    pub fn open(config: StoreConfig) -> Result<Self, SparseError> {
        config.validate()?;
        let long_strings: Arc<dyn LongStringStore> = match &config.long_string_dir {
            Some(dir) => Arc::new(FileLongStringStore::open(dir)?),
            None => Arc::new(MemoryLongStringStore::new()),
        };
        let storage: Arc<dyn StorageClient> = Arc::new(MemoryStorageClient::with_long_strings(
            config.clone(),
            long_strings.clone(),
        ));
        let redo = match &config.redo_log_dir {
            Some(_) => Some(RedoLog::from_config(&config)?.with_long_strings(long_strings.clone())),
            None => None,
        };
        info!(
            redo = redo.is_some(),
            file_long_strings = config.long_string_dir.is_some(),
            "sparse store opened"
        );
        Ok(Self {
            config,
            storage,
            long_strings,
            redo,
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn storage(&self) -> Arc<dyn StorageClient> {
        self.storage.clone()
    }

    pub fn redo_log(&mut self) -> Option<&mut RedoLog> {
        self.redo.as_mut()
    }

    pub fn codec_context(&self) -> CodecContext<'_> {
        CodecContext::new(&self.config, Some(self.long_strings.as_ref()))
    }

    pub fn access_control(
        &self,
        subject: Subject,
        keyspace: impl Into<String>,
    ) -> AccessControlManager {
        AccessControlManager::new(subject, self.storage.clone(), keyspace, &self.config)
    }

    /// Runs `migrators` over one column family, journaling rewritten rows
    /// when a redo log is open.
    pub fn migrate(
        &mut self,
        keyspace: &str,
        column_family: &str,
        migrators: Vec<Arc<dyn PropertyMigrator>>,
    ) -> Result<MigrationReport, SparseError> {
        let storage = self.storage.clone();
        let mut migrator = Migrator::new(storage.as_ref(), keyspace);
        if let Some(redo) = self.redo.as_mut() {
            migrator = migrator.with_redo_log(redo);
        }
        migrator.run(column_family, migrators)
    }

    /// Re-applies committed images from the logs under `dir` to this store.
    pub fn replay(&self, dir: &Path) -> Result<ReplayReport, SparseError> {
        replay_committed(dir, &self.codec_context(), self.storage.as_ref())
    }

    /// Closes the redo log, if any.
    pub fn close(&mut self) -> Result<(), SparseError> {
        match self.redo.as_mut() {
            Some(redo) => redo.close(),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::SparseStore;
    use crate::acl::permission::{ALL, CAN_READ};
    use crate::acl::{ObjectType, Subject};
    use crate::config::StoreConfig;
    use crate::storage::StorageClient;
    use crate::types::value::{PropertyMap, Value};
    use tempfile::tempdir;

    #[test]
    fn open_rejects_invalid_config() {
        let config = StoreConfig {
            acl_recursion_limit: 0,
            ..StoreConfig::default()
        };
        let err = SparseStore::open(config).expect_err("invalid");
        assert_eq!(err.code_str(), "invalid_config");
    }

    #[test]
    fn long_strings_land_in_the_configured_dir() {
        let dir = tempdir().expect("temp dir");
        let config = StoreConfig {
            long_string_dir: Some(dir.path().join("ls")),
            ..StoreConfig::development().with_max_string_length(8)
        };
        let store = SparseStore::open(config).expect("open");
        let mut row = PropertyMap::new();
        row.insert("body".into(), Value::from("a string longer than eight"));
        let storage = store.storage();
        storage.insert("n", "cn", "/doc", &row, true).expect("insert");
        assert_eq!(storage.get("n", "cn", "/doc").expect("get"), row);
        assert!(dir.path().join("ls").read_dir().expect("ls dir").next().is_some());
    }

    #[test]
    fn managers_share_the_store_backend() {
        let store = SparseStore::open(StoreConfig::development()).expect("open");
        let admin = store.access_control(Subject::new("admin"), "n");
        assert!(admin.can(ObjectType::Content, "/any", ALL));
        let anon = store.access_control(Subject::anonymous(), "n");
        assert!(!anon.can(ObjectType::Content, "/any", CAN_READ));
    }
}
