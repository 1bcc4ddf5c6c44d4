use crate::codec::data::{DataRead, is_eof};
use crate::codec::row::read_row;
use crate::error::SparseError;
use crate::redo::{RECORD_END, RECORD_START, RedoKey};
use crate::types::payload::CodecContext;
use crate::types::value::PropertyMap;
use std::io::{self, Read};
use thiserror::Error;

/// Upper bound on speculative allocation for a record's entry count.
const MAX_PREALLOC_ENTRIES: usize = 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RedoReadError {
    #[error("truncated redo record")]
    Truncation,
    #[error("corrupt redo record: {0}")]
    Corruption(String),
    #[error("io error: {0}")]
    Io(String),
}

impl From<SparseError> for RedoReadError {
    fn from(err: SparseError) -> Self {
        if is_eof(&err) {
            return Self::Truncation;
        }
        match err {
            SparseError::Io(e) => Self::Io(e.to_string()),
            other => Self::Corruption(other.to_string()),
        }
    }
}

impl From<io::Error> for RedoReadError {
    fn from(err: io::Error) -> Self {
        SparseError::from(err).into()
    }
}

impl From<RedoReadError> for SparseError {
    fn from(err: RedoReadError) -> Self {
        match err {
            RedoReadError::Io(message) => SparseError::Io(io::Error::other(message)),
            other => SparseError::Decode(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RedoEntry {
    pub key: RedoKey,
    pub properties: PropertyMap,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RedoRecord {
    pub committed: bool,
    pub entries: Vec<RedoEntry>,
}

pub struct RedoLogReader<R: Read> {
    inner: R,
}

impl<R: Read> RedoLogReader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    /// `Ok(None)` at a clean end of input. A record cut short by a crash is
    /// `Truncation`.
    pub fn next_record(
        &mut self,
        ctx: &CodecContext<'_>,
    ) -> Result<Option<RedoRecord>, RedoReadError> {
        let mut marker = [0u8; 1];
        if self.inner.read(&mut marker)? == 0 {
            return Ok(None);
        }
        if marker[0] != RECORD_START {
            return Err(RedoReadError::Corruption(format!(
                "expected record start, found byte {:#04x}",
                marker[0]
            )));
        }
        let committed = self.inner.read_bool()?;
        let count = self.inner.read_len()?;
        let mut entries = Vec::with_capacity(count.min(MAX_PREALLOC_ENTRIES));
        for _ in 0..count {
            let composite = self.inner.read_utf()?;
            let key = RedoKey::parse(&composite)?;
            let (properties, _) =
                read_row(&mut self.inner, ctx, &composite, Some(&key.column_family))?;
            entries.push(RedoEntry { key, properties });
        }
        let end = self.inner.read_byte()?;
        if end != RECORD_END {
            return Err(RedoReadError::Corruption(format!(
                "expected record end, found byte {end:#04x}"
            )));
        }
        Ok(Some(RedoRecord { committed, entries }))
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}
