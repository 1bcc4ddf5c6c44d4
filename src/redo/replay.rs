use crate::error::SparseError;
use crate::redo::RedoOp;
use crate::redo::log::parse_log_file_name;
use crate::redo::reader::{RedoLogReader, RedoReadError, RedoRecord};
use crate::storage::StorageClient;
use crate::types::payload::CodecContext;
use serde::Serialize;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Log files under `dir`, oldest first.
pub fn scan_logs(dir: &Path) -> Result<Vec<PathBuf>, SparseError> {
    let mut logs: Vec<(u64, PathBuf)> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().to_string();
            parse_log_file_name(&name).map(|stamp| (stamp, entry.path()))
        })
        .collect();
    logs.sort_by_key(|(stamp, _)| *stamp);
    Ok(logs.into_iter().map(|(_, path)| path).collect())
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReplayReport {
    pub files: usize,
    pub committed_records: usize,
    pub rolled_back_records: usize,
    /// After and delete images written to storage.
    pub applied: usize,
    /// Before images and every entry of rolled-back records.
    pub skipped: usize,
    /// Files whose last record was cut short.
    pub truncated_files: Vec<String>,
}

/// Reads every record in every log under `dir`, calling `visit` per record.
/// A truncated trailing record ends that file; corruption is an error.
fn walk<F>(dir: &Path, ctx: &CodecContext<'_>, mut visit: F) -> Result<ReplayReport, SparseError>
where
    F: FnMut(&RedoRecord, &mut ReplayReport) -> Result<(), SparseError>,
{
    let mut report = ReplayReport::default();
    for path in scan_logs(dir)? {
        report.files += 1;
        let mut reader = RedoLogReader::new(BufReader::new(File::open(&path)?));
        loop {
            let record = match reader.next_record(ctx) {
                Ok(Some(record)) => record,
                Ok(None) => break,
                Err(RedoReadError::Truncation) => {
                    warn!(path = %path.display(), "redo log ends in a truncated record");
                    report.truncated_files.push(path.display().to_string());
                    break;
                }
                Err(e) => {
                    return Err(SparseError::Decode(format!("{}: {e}", path.display())));
                }
            };
            if record.committed {
                report.committed_records += 1;
            } else {
                report.rolled_back_records += 1;
            }
            visit(&record, &mut report)?;
        }
    }
    Ok(report)
}

/// Counts records without touching storage.
pub fn inspect_logs(dir: &Path, ctx: &CodecContext<'_>) -> Result<ReplayReport, SparseError> {
    walk(dir, ctx, |record, report| {
        if !record.committed {
            report.skipped += record.entries.len();
        }
        Ok(())
    })
}

/// Re-applies committed after and delete images in log order. After images
/// replace the whole row.
pub fn replay_committed(
    dir: &Path,
    ctx: &CodecContext<'_>,
    storage: &dyn StorageClient,
) -> Result<ReplayReport, SparseError> {
    let report = walk(dir, ctx, |record, report| {
        if !record.committed {
            report.skipped += record.entries.len();
            return Ok(());
        }
        for entry in &record.entries {
            let key = &entry.key;
            match key.op {
                RedoOp::Before => {
                    report.skipped += 1;
                    continue;
                }
                RedoOp::After => {
                    storage.remove(&key.keyspace, &key.column_family, &key.key)?;
                    storage.insert(
                        &key.keyspace,
                        &key.column_family,
                        &key.key,
                        &entry.properties,
                        true,
                    )?;
                }
                RedoOp::Delete => {
                    storage.remove(&key.keyspace, &key.column_family, &key.key)?;
                }
            }
            report.applied += 1;
        }
        Ok(())
    })?;
    info!(
        files = report.files,
        applied = report.applied,
        skipped = report.skipped,
        "redo replay finished"
    );
    Ok(report)
}
