use crate::codec::data::DataWrite;
use crate::codec::row::write_row;
use crate::config::StoreConfig;
use crate::error::SparseError;
use crate::redo::{RECORD_END, RECORD_START, RedoKey, RedoOp};
use crate::types::long_string::LongStringStore;
use crate::types::payload::CodecContext;
use crate::types::value::PropertyMap;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

pub const LOG_FILE_PREFIX: &str = "redo_";
pub const LOG_FILE_SUFFIX: &str = ".log";

struct ActiveLog {
    file: File,
    path: PathBuf,
    size_bytes: u64,
}

/// Writer side of the redo log. A transaction borrows the log mutably, so
/// batches on one log never interleave.
pub struct RedoLog {
    dir: PathBuf,
    max_bytes: u64,
    config: StoreConfig,
    long_strings: Option<Arc<dyn LongStringStore>>,
    active: Option<ActiveLog>,
    closed: bool,
}

impl std::fmt::Debug for RedoLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedoLog")
            .field("dir", &self.dir)
            .field("max_bytes", &self.max_bytes)
            .field("active", &self.active.as_ref().map(|a| &a.path))
            .field("closed", &self.closed)
            .finish()
    }
}

pub fn log_file_name(timestamp_micros: u64) -> String {
    format!("{LOG_FILE_PREFIX}{timestamp_micros:020}{LOG_FILE_SUFFIX}")
}

/// Timestamp encoded in a log file name, if it is one.
pub fn parse_log_file_name(name: &str) -> Option<u64> {
    name.strip_prefix(LOG_FILE_PREFIX)?
        .strip_suffix(LOG_FILE_SUFFIX)?
        .parse()
        .ok()
}

fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as u64
}

impl RedoLog {
    pub fn open(dir: impl Into<PathBuf>, config: &StoreConfig) -> Result<Self, SparseError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            max_bytes: config.redo_log_max_bytes,
            config: config.clone(),
            long_strings: None,
            active: None,
            closed: false,
        })
    }

    /// Opens the log under `config.redo_log_dir`.
    pub fn from_config(config: &StoreConfig) -> Result<Self, SparseError> {
        let dir = config.redo_log_dir.clone().ok_or_else(|| SparseError::InvalidConfig {
            message: "redo_log_dir is not set".into(),
        })?;
        Self::open(dir, config)
    }

    pub fn with_long_strings(mut self, long_strings: Arc<dyn LongStringStore>) -> Self {
        self.long_strings = Some(long_strings);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn active_path(&self) -> Option<&Path> {
        self.active.as_ref().map(|a| a.path.as_path())
    }

    pub fn begin(&mut self) -> Result<RedoTransaction<'_>, SparseError> {
        if self.closed {
            return Err(SparseError::LogClosed);
        }
        Ok(RedoTransaction {
            log: self,
            entries: Vec::new(),
            index: HashMap::new(),
            prepared: None,
            finished: false,
        })
    }

    /// Syncs the active file and refuses further transactions.
    pub fn close(&mut self) -> Result<(), SparseError> {
        self.closed = true;
        if let Some(mut active) = self.active.take() {
            active.file.flush()?;
            active.file.sync_data()?;
        }
        Ok(())
    }

    fn encode_entries(&self, entries: &[(RedoKey, PropertyMap)]) -> Result<Vec<u8>, SparseError> {
        let ctx = CodecContext::new(&self.config, self.long_strings.as_deref());
        let mut out = Vec::new();
        out.write_len(entries.len())?;
        for (key, map) in entries {
            let composite = key.composite();
            out.write_utf(&composite)?;
            write_row(&mut out, &ctx, &composite, map, Some(&key.column_family))?;
        }
        Ok(out)
    }

    fn write_record(&mut self, committed: bool, body: &[u8]) -> Result<(), SparseError> {
        let mut record = Vec::with_capacity(body.len() + 3);
        record.write_byte(RECORD_START)?;
        record.write_bool(committed)?;
        record.extend_from_slice(body);
        record.write_byte(RECORD_END)?;
        let active = self.writable()?;
        active.file.write_all(&record)?;
        active.file.flush()?;
        active.file.sync_data()?;
        active.size_bytes = active.size_bytes.saturating_add(record.len() as u64);
        Ok(())
    }

    /// The file to append to, rolling over once the current one is full.
    fn writable(&mut self) -> Result<&mut ActiveLog, SparseError> {
        let full = self
            .active
            .as_ref()
            .is_some_and(|a| a.size_bytes >= self.max_bytes);
        if full && let Some(old) = self.active.take() {
            old.file.sync_data()?;
            info!(path = %old.path.display(), size_bytes = old.size_bytes, "redo log rolled over");
        }
        if self.active.is_none() {
            self.active = Some(self.create_file()?);
        }
        self.active
            .as_mut()
            .ok_or_else(|| SparseError::Storage("redo log has no active file".into()))
    }

    fn create_file(&self) -> Result<ActiveLog, SparseError> {
        let mut stamp = now_micros();
        loop {
            let path = self.dir.join(log_file_name(stamp));
            match OpenOptions::new().create_new(true).append(true).open(&path) {
                Ok(file) => {
                    return Ok(ActiveLog {
                        file,
                        path,
                        size_bytes: 0,
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => stamp += 1,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// One batch of row images. Dropping it without `commit` writes the batch as
/// rolled back.
#[derive(Debug)]
pub struct RedoTransaction<'a> {
    log: &'a mut RedoLog,
    entries: Vec<(RedoKey, PropertyMap)>,
    index: HashMap<String, usize>,
    /// Encoded entries, valid until the next image is recorded.
    prepared: Option<Vec<u8>>,
    finished: bool,
}

impl RedoTransaction<'_> {
    /// Image of the row before the change.
    pub fn before(
        &mut self,
        keyspace: &str,
        column_family: &str,
        key: &str,
        map: &PropertyMap,
    ) -> Result<(), SparseError> {
        self.record(RedoOp::Before, keyspace, column_family, key, map.clone())
    }

    /// Complete image of the row after the change.
    pub fn after(
        &mut self,
        keyspace: &str,
        column_family: &str,
        key: &str,
        map: &PropertyMap,
    ) -> Result<(), SparseError> {
        self.record(RedoOp::After, keyspace, column_family, key, map.clone())
    }

    pub fn delete(&mut self, keyspace: &str, column_family: &str, key: &str) -> Result<(), SparseError> {
        self.record(RedoOp::Delete, keyspace, column_family, key, PropertyMap::new())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Encodes the batch now, so a row that cannot be journaled fails before
    /// the caller writes it anywhere. `commit` reuses the encoded bytes.
    pub fn prepare(&mut self) -> Result<(), SparseError> {
        if self.prepared.is_none() && !self.entries.is_empty() {
            self.prepared = Some(self.log.encode_entries(&self.entries)?);
        }
        Ok(())
    }

    pub fn commit(mut self) -> Result<(), SparseError> {
        self.finish(true)
    }

    pub fn rollback(mut self) -> Result<(), SparseError> {
        self.finish(false)
    }

    /// A repeated composite key replaces the earlier image in place.
    fn record(
        &mut self,
        op: RedoOp,
        keyspace: &str,
        column_family: &str,
        key: &str,
        map: PropertyMap,
    ) -> Result<(), SparseError> {
        let key = RedoKey::new(op, keyspace, column_family, key)?;
        let composite = key.composite();
        self.prepared = None;
        match self.index.get(&composite) {
            Some(&slot) => self.entries[slot] = (key, map),
            None => {
                self.index.insert(composite, self.entries.len());
                self.entries.push((key, map));
            }
        }
        Ok(())
    }

    fn finish(&mut self, committed: bool) -> Result<(), SparseError> {
        self.finished = true;
        let entries = std::mem::take(&mut self.entries);
        self.index.clear();
        if entries.is_empty() {
            return Ok(());
        }
        let body = match self.prepared.take() {
            Some(body) => body,
            None => self.log.encode_entries(&entries)?,
        };
        self.log.write_record(committed, &body)
    }
}

impl Drop for RedoTransaction<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let pending = self.entries.len();
        if let Err(e) = self.finish(false) {
            warn!(entries = pending, error = %e, "failed to record abandoned redo batch");
        }
    }
}
