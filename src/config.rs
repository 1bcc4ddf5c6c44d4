use crate::error::SparseError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Hard ceiling for inline byte arrays. Larger blobs would pollute row caches.
pub const MAX_BYTE_ARRAY_BYTES: usize = 64 * 1024;

/// Largest string (in chars) that always fits a 65 535-byte modified UTF-8 frame.
pub const MAX_INLINE_STRING_CHARS: usize = 65_535 / 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RowKeyHash {
    #[default]
    Sha1,
    Sha512,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PermissionCachePolicy {
    None,
    Memory,
    Lru { capacity: usize },
}

impl Default for PermissionCachePolicy {
    fn default() -> Self {
        Self::Lru { capacity: 1024 }
    }
}

/// Runtime configuration for a store instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Strings longer than this (in chars) are written out of row.
    pub max_string_length: usize,
    pub max_byte_array_bytes: usize,
    /// Reject unknown wire type ids instead of reading them as strings.
    pub strict_types: bool,
    pub row_key_hash: RowKeyHash,
    pub acl_recursion_limit: usize,
    pub permission_cache: PermissionCachePolicy,
    pub redo_log_dir: Option<PathBuf>,
    pub redo_log_max_bytes: u64,
    pub long_string_dir: Option<PathBuf>,
    pub admin_principals: Vec<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_string_length: 16 * 1024,
            max_byte_array_bytes: MAX_BYTE_ARRAY_BYTES,
            strict_types: false,
            row_key_hash: RowKeyHash::Sha1,
            acl_recursion_limit: 20,
            permission_cache: PermissionCachePolicy::default(),
            redo_log_dir: None,
            redo_log_max_bytes: 64 * 1024 * 1024,
            long_string_dir: None,
            admin_principals: vec!["admin".to_string()],
        }
    }
}

impl StoreConfig {
    /// Small limits and no caching, so tests see every storage round-trip.
    pub fn development() -> Self {
        Self {
            max_string_length: 1024,
            permission_cache: PermissionCachePolicy::None,
            redo_log_max_bytes: 1024 * 1024,
            ..Self::default()
        }
    }

    pub fn from_json_str(raw: &str) -> Result<Self, SparseError> {
        let config: Self = serde_json::from_str(raw).map_err(|e| SparseError::InvalidConfig {
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_json(path: &Path) -> Result<Self, SparseError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), SparseError> {
        if self.max_string_length == 0 || self.max_string_length > MAX_INLINE_STRING_CHARS {
            return Err(SparseError::InvalidConfig {
                message: format!(
                    "max_string_length must be within 1..={MAX_INLINE_STRING_CHARS}, got {}",
                    self.max_string_length
                ),
            });
        }
        if self.max_byte_array_bytes > MAX_BYTE_ARRAY_BYTES {
            return Err(SparseError::InvalidConfig {
                message: format!(
                    "max_byte_array_bytes cannot exceed {MAX_BYTE_ARRAY_BYTES}, got {}",
                    self.max_byte_array_bytes
                ),
            });
        }
        if self.acl_recursion_limit == 0 {
            return Err(SparseError::InvalidConfig {
                message: "acl_recursion_limit must be positive".into(),
            });
        }
        if let PermissionCachePolicy::Lru { capacity } = self.permission_cache
            && capacity == 0
        {
            return Err(SparseError::InvalidConfig {
                message: "lru permission cache capacity must be positive".into(),
            });
        }
        if self.redo_log_max_bytes == 0 {
            return Err(SparseError::InvalidConfig {
                message: "redo_log_max_bytes must be positive".into(),
            });
        }
        Ok(())
    }

    pub fn with_max_string_length(mut self, chars: usize) -> Self {
        self.max_string_length = chars;
        self
    }

    pub fn with_strict_types(mut self, strict: bool) -> Self {
        self.strict_types = strict;
        self
    }

    pub fn with_permission_cache(mut self, policy: PermissionCachePolicy) -> Self {
        self.permission_cache = policy;
        self
    }

    pub fn with_redo_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.redo_log_dir = Some(dir.into());
        self
    }

    pub fn with_long_string_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.long_string_dir = Some(dir.into());
        self
    }

    pub fn is_admin_principal(&self, id: &str) -> bool {
        self.admin_principals.iter().any(|p| p == id)
    }
}

#[cfg(test)]
mod tests {
    use super::{MAX_BYTE_ARRAY_BYTES, PermissionCachePolicy, RowKeyHash, StoreConfig};

    #[test]
    fn defaults_validate() {
        StoreConfig::default().validate().expect("default config");
        StoreConfig::development().validate().expect("dev config");
    }

    #[test]
    fn oversized_limits_are_rejected() {
        let err = StoreConfig::default()
            .with_max_string_length(100_000)
            .validate()
            .expect_err("too long");
        assert_eq!(err.code_str(), "invalid_config");

        let config = StoreConfig {
            max_byte_array_bytes: MAX_BYTE_ARRAY_BYTES + 1,
            ..StoreConfig::default()
        };
        assert!(config.validate().is_err());

        let config = StoreConfig::default()
            .with_permission_cache(PermissionCachePolicy::Lru { capacity: 0 });
        assert!(config.validate().is_err());
    }

    #[test]
    fn json_fills_missing_fields_from_defaults() {
        let config = StoreConfig::from_json_str(
            r#"{"max_string_length": 10, "row_key_hash": "Sha512", "permission_cache": "Memory"}"#,
        )
        .expect("parse");
        assert_eq!(config.max_string_length, 10);
        assert_eq!(config.row_key_hash, RowKeyHash::Sha512);
        assert_eq!(config.permission_cache, PermissionCachePolicy::Memory);
        assert_eq!(config.acl_recursion_limit, 20);
        assert!(config.is_admin_principal("admin"));
    }

    #[test]
    fn json_with_invalid_values_fails_validation() {
        let err = StoreConfig::from_json_str(r#"{"acl_recursion_limit": 0}"#).expect_err("invalid");
        assert_eq!(err.code_str(), "invalid_config");
    }
}
