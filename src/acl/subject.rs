use crate::config::StoreConfig;
use crate::error::SparseError;
use crate::storage::StorageClient;
use std::sync::Arc;

/// Principal every subject holds, including anonymous ones.
pub const EVERYONE: &str = "everyone";
pub const ANONYMOUS: &str = "anonymous";

/// The caller an access-control manager evaluates for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    id: String,
    principals: Vec<String>,
    admin: bool,
}

impl Subject {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            principals: Vec::new(),
            admin: false,
        }
    }

    pub fn anonymous() -> Self {
        Self::new(ANONYMOUS)
    }

    pub fn with_principals<I, S>(mut self, principals: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.principals.extend(principals.into_iter().map(Into::into));
        self
    }

    pub fn with_admin(mut self, admin: bool) -> Self {
        self.admin = admin;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_anonymous(&self) -> bool {
        self.id == ANONYMOUS
    }

    /// The id, then group principals, then `everyone`, without duplicates.
    pub fn roles(&self) -> Vec<&str> {
        let mut roles: Vec<&str> = Vec::with_capacity(self.principals.len() + 2);
        for role in std::iter::once(self.id.as_str())
            .chain(self.principals.iter().map(String::as_str))
            .chain(std::iter::once(EVERYONE))
        {
            if !roles.contains(&role) {
                roles.push(role);
            }
        }
        roles
    }

    pub fn has_role(&self, role: &str) -> bool {
        role == EVERYONE || self.id == role || self.principals.iter().any(|p| p == role)
    }

    pub fn is_admin(&self, config: &StoreConfig) -> bool {
        self.admin || (!self.is_anonymous() && config.is_admin_principal(&self.id))
    }
}

/// Decides which principals hold a dynamic `_tp_` token at a path.
pub trait PrincipalTokenResolver: Send + Sync {
    fn resolve(&self, token: &str) -> Result<Vec<String>, SparseError>;
}

/// Grants dynamic principals to nobody.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTokens;

impl PrincipalTokenResolver for NoTokens {
    fn resolve(&self, _token: &str) -> Result<Vec<String>, SparseError> {
        Ok(Vec::new())
    }
}

/// Resolves a token by reading the content row it names and taking its
/// `principals` string array.
pub struct StorageTokenResolver {
    storage: Arc<dyn StorageClient>,
    keyspace: String,
    column_family: String,
}

impl StorageTokenResolver {
    pub const PRINCIPALS_PROPERTY: &'static str = "principals";

    pub fn new(
        storage: Arc<dyn StorageClient>,
        keyspace: impl Into<String>,
        column_family: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            keyspace: keyspace.into(),
            column_family: column_family.into(),
        }
    }
}

impl PrincipalTokenResolver for StorageTokenResolver {
    fn resolve(&self, token: &str) -> Result<Vec<String>, SparseError> {
        let row = self.storage.get(&self.keyspace, &self.column_family, token)?;
        Ok(row
            .get(Self::PRINCIPALS_PROPERTY)
            .and_then(|v| v.as_string_array())
            .map(<[String]>::to_vec)
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::{EVERYONE, NoTokens, PrincipalTokenResolver, StorageTokenResolver, Subject};
    use crate::config::StoreConfig;
    use crate::storage::{MemoryStorageClient, StorageClient};
    use crate::types::value::{PropertyMap, Value};
    use std::sync::Arc;

    #[test]
    fn roles_include_everyone_once() {
        let subject = Subject::new("alice").with_principals(["staff", "alice", EVERYONE]);
        assert_eq!(subject.roles(), vec!["alice", "staff", EVERYONE]);
        assert!(subject.has_role("staff"));
        assert!(Subject::anonymous().has_role(EVERYONE));
        assert!(!subject.has_role("admin"));
    }

    #[test]
    fn admin_by_flag_or_config() {
        let config = StoreConfig::default();
        assert!(Subject::new("admin").is_admin(&config));
        assert!(Subject::new("ops").with_admin(true).is_admin(&config));
        assert!(!Subject::new("alice").is_admin(&config));
        assert!(!Subject::anonymous().is_admin(&config));
    }

    #[test]
    fn storage_resolver_reads_principals_array() {
        let storage = Arc::new(MemoryStorageClient::new(StoreConfig::default()));
        let mut row = PropertyMap::new();
        row.insert("principals".into(), Value::from(&["alice", "bob"][..]));
        storage.insert("n", "cn", "/tokens/t1", &row, true).expect("insert");

        let resolver = StorageTokenResolver::new(storage, "n", "cn");
        assert_eq!(resolver.resolve("/tokens/t1").expect("resolve"), vec!["alice", "bob"]);
        assert!(resolver.resolve("/tokens/none").expect("resolve").is_empty());
        assert!(NoTokens.resolve("/tokens/t1").expect("resolve").is_empty());
    }
}
