use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    ByteArray,
}

impl std::fmt::Display for ValueKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueKind::ByteArray => write!(f, "byte array"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SparseErrorCode {
    Io,
    Encode,
    Decode,
    InvalidConfig,
    RowKeyMismatch,
    TypeTagMismatch,
    UnknownType,
    ValueTooLarge,
    AccessDenied,
    Storage,
    NotFound,
    Migration,
    LogClosed,
}

impl SparseErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            SparseErrorCode::Io => "io",
            SparseErrorCode::Encode => "encode",
            SparseErrorCode::Decode => "decode",
            SparseErrorCode::InvalidConfig => "invalid_config",
            SparseErrorCode::RowKeyMismatch => "row_key_mismatch",
            SparseErrorCode::TypeTagMismatch => "type_tag_mismatch",
            SparseErrorCode::UnknownType => "unknown_type",
            SparseErrorCode::ValueTooLarge => "value_too_large",
            SparseErrorCode::AccessDenied => "access_denied",
            SparseErrorCode::Storage => "storage",
            SparseErrorCode::NotFound => "not_found",
            SparseErrorCode::Migration => "migration",
            SparseErrorCode::LogClosed => "log_closed",
        }
    }
}

#[derive(Debug, Error)]
pub enum SparseError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("encode error: {0}")]
    Encode(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("invalid config: {message}")]
    InvalidConfig { message: String },
    #[error("row key mismatch: expected '{expected}', found '{actual}'")]
    RowKeyMismatch { expected: String, actual: String },
    #[error("type tag mismatch: expected '{expected}', found '{actual}'")]
    TypeTagMismatch { expected: String, actual: String },
    #[error("unknown wire type id {type_id}")]
    UnknownType { type_id: i32 },
    #[error("{kind} of {size} bytes exceeds limit of {limit} bytes")]
    ValueTooLarge {
        kind: ValueKind,
        size: usize,
        limit: usize,
    },
    #[error("access denied: {permission} on {object_type} '{path}'")]
    AccessDenied {
        object_type: String,
        path: String,
        permission: String,
    },
    #[error("storage error: {0}")]
    Storage(String),
    #[error("{what} '{id}' not found")]
    NotFound { what: &'static str, id: String },
    #[error("migration error: {0}")]
    Migration(String),
    #[error("redo log is closed")]
    LogClosed,
}

impl SparseError {
    pub fn code(&self) -> SparseErrorCode {
        match self {
            SparseError::Io(_) => SparseErrorCode::Io,
            SparseError::Encode(_) => SparseErrorCode::Encode,
            SparseError::Decode(_) => SparseErrorCode::Decode,
            SparseError::InvalidConfig { .. } => SparseErrorCode::InvalidConfig,
            SparseError::RowKeyMismatch { .. } => SparseErrorCode::RowKeyMismatch,
            SparseError::TypeTagMismatch { .. } => SparseErrorCode::TypeTagMismatch,
            SparseError::UnknownType { .. } => SparseErrorCode::UnknownType,
            SparseError::ValueTooLarge { .. } => SparseErrorCode::ValueTooLarge,
            SparseError::AccessDenied { .. } => SparseErrorCode::AccessDenied,
            SparseError::Storage(_) => SparseErrorCode::Storage,
            SparseError::NotFound { .. } => SparseErrorCode::NotFound,
            SparseError::Migration(_) => SparseErrorCode::Migration,
            SparseError::LogClosed => SparseErrorCode::LogClosed,
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code().as_str()
    }

    /// True for failures that mean the stored bytes cannot be trusted.
    pub fn is_integrity_failure(&self) -> bool {
        matches!(
            self.code(),
            SparseErrorCode::Decode
                | SparseErrorCode::RowKeyMismatch
                | SparseErrorCode::TypeTagMismatch
                | SparseErrorCode::UnknownType
        )
    }
}

#[cfg(test)]
mod tests {
    use super::{SparseError, SparseErrorCode, ValueKind};

    #[test]
    fn error_code_strings_are_stable() {
        assert_eq!(SparseErrorCode::AccessDenied.as_str(), "access_denied");
        assert_eq!(SparseErrorCode::RowKeyMismatch.as_str(), "row_key_mismatch");
        assert_eq!(SparseErrorCode::ValueTooLarge.as_str(), "value_too_large");
    }

    #[test]
    fn access_denied_carries_context() {
        let err = SparseError::AccessDenied {
            object_type: "CO".into(),
            path: "/a/b".into(),
            permission: "Write".into(),
        };
        assert_eq!(err.code_str(), "access_denied");
        assert_eq!(err.to_string(), "access denied: Write on CO '/a/b'");
        assert!(!err.is_integrity_failure());
    }

    #[test]
    fn size_violation_message_names_the_kind() {
        let err = SparseError::ValueTooLarge {
            kind: ValueKind::ByteArray,
            size: 70 * 1024,
            limit: 64 * 1024,
        };
        assert_eq!(
            err.to_string(),
            "byte array of 71680 bytes exceeds limit of 65536 bytes"
        );
    }

    #[test]
    fn decode_failures_are_integrity_failures() {
        let err = SparseError::RowKeyMismatch {
            expected: "a".into(),
            actual: "b".into(),
        };
        assert!(err.is_integrity_failure());
        assert_eq!(err.code(), SparseErrorCode::RowKeyMismatch);
    }
}
