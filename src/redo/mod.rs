//! Append-only before/after row images, written per committed or abandoned
//! batch and read back for recovery and migration audits.
//!
//! Record layout: `'<'`, `bool committed`, `i32 count`, then per entry the
//! composite key as `utf` followed by a row blob keyed by that composite and
//! tagged with the column family, then `'>'`.

pub mod log;
pub mod reader;
pub mod replay;

use crate::error::SparseError;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use log::{RedoLog, RedoTransaction};
pub use reader::{RedoEntry, RedoLogReader, RedoReadError, RedoRecord};
pub use replay::{ReplayReport, inspect_logs, replay_committed, scan_logs};

pub const RECORD_START: u8 = b'<';
pub const RECORD_END: u8 = b'>';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedoOp {
    Before,
    After,
    Delete,
}

impl RedoOp {
    pub fn as_str(self) -> &'static str {
        match self {
            RedoOp::Before => "before",
            RedoOp::After => "after",
            RedoOp::Delete => "delete",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "before" => Some(RedoOp::Before),
            "after" => Some(RedoOp::After),
            "delete" => Some(RedoOp::Delete),
            _ => None,
        }
    }
}

/// `<op>:<keyspace>:<column_family>:<key>`. Only the key may contain `:`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RedoKey {
    pub op: RedoOp,
    pub keyspace: String,
    pub column_family: String,
    pub key: String,
}

impl RedoKey {
    pub fn new(op: RedoOp, keyspace: &str, column_family: &str, key: &str) -> Result<Self, SparseError> {
        for (what, part) in [("keyspace", keyspace), ("column family", column_family)] {
            if part.is_empty() || part.contains(':') {
                return Err(SparseError::Encode(format!(
                    "redo {what} '{part}' must be non-empty and free of ':'"
                )));
            }
        }
        Ok(Self {
            op,
            keyspace: keyspace.to_string(),
            column_family: column_family.to_string(),
            key: key.to_string(),
        })
    }

    pub fn composite(&self) -> String {
        self.to_string()
    }

    pub fn parse(raw: &str) -> Result<Self, SparseError> {
        let bad = || SparseError::Decode(format!("malformed redo key '{raw}'"));
        let mut parts = raw.splitn(4, ':');
        let op = parts.next().and_then(RedoOp::parse).ok_or_else(bad)?;
        let keyspace = parts.next().ok_or_else(bad)?;
        let column_family = parts.next().ok_or_else(bad)?;
        let key = parts.next().ok_or_else(bad)?;
        Self::new(op, keyspace, column_family, key).map_err(|_| bad())
    }
}

impl fmt::Display for RedoKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.op.as_str(),
            self.keyspace,
            self.column_family,
            self.key
        )
    }
}
