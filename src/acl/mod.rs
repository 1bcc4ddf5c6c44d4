//! Path-hierarchical access control.

pub mod cache;
pub mod manager;
pub mod modification;
pub mod permission;
pub mod property;
pub mod subject;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use cache::{
    CompiledPermissions, LruPermissionCache, MemoryPermissionCache, NoPermissionCache,
    PermissionCache, cache_from_policy,
};
pub use manager::AccessControlManager;
pub use modification::{AclModification, Operation, modify};
pub use permission::Permission;
pub use property::PropertyAcl;
pub use subject::{NoTokens, PrincipalTokenResolver, StorageTokenResolver, Subject};

/// Column family holding ACL rows.
pub const ACL_COLUMN_FAMILY: &str = "ac";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectType {
    Content,
    Authorizables,
    Acl,
}

impl ObjectType {
    /// Stable name used in persisted ACL row keys.
    pub fn as_str(self) -> &'static str {
        match self {
            ObjectType::Content => "CO",
            ObjectType::Authorizables => "AU",
            ObjectType::Acl => "AC",
        }
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Row key of the ACL guarding `path`.
pub fn acl_row_key(object_type: ObjectType, path: &str) -> String {
    format!("{};{}", object_type.as_str(), normalize_path(path))
}

/// Drops trailing slashes; the empty path is the root.
pub fn normalize_path(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() { "/" } else { trimmed }
}

pub fn is_root(path: &str) -> bool {
    normalize_path(path) == "/"
}

/// Parent of a normalized path. The root and single-segment paths have the
/// root as parent.
pub fn parent_of(path: &str) -> &str {
    let path = normalize_path(path);
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(idx) => &path[..idx],
    }
}

#[cfg(test)]
mod tests {
    use super::{ObjectType, acl_row_key, is_root, normalize_path, parent_of};

    #[test]
    fn parents_walk_to_root() {
        assert_eq!(parent_of("/a/b/c"), "/a/b");
        assert_eq!(parent_of("/a/b/"), "/a");
        assert_eq!(parent_of("/a"), "/");
        assert_eq!(parent_of("a"), "/");
        assert_eq!(parent_of("/"), "/");
        assert!(is_root(""));
        assert!(is_root("///"));
        assert!(!is_root("/a"));
        assert_eq!(normalize_path("/x/"), "/x");
    }

    #[test]
    fn acl_rows_are_keyed_by_type_and_path() {
        assert_eq!(acl_row_key(ObjectType::Content, "/a/b/"), "CO;/a/b");
        assert_eq!(acl_row_key(ObjectType::Authorizables, ""), "AU;/");
    }
}
