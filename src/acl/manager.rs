use crate::acl::cache::{CompiledPermissions, PermissionCache, cache_from_policy};
use crate::acl::modification::{
    AclModification, DYNAMIC_PRINCIPAL_PREFIX, PROPERTY_ACE_PREFIX, is_deny, is_grant,
    parse_property_ace, principal_of,
};
use crate::acl::permission::{ALL, CAN_READ_ACL, CAN_WRITE_ACL, Permission, describe_bitmap};
use crate::acl::property::PropertyAcl;
use crate::acl::subject::{NoTokens, PrincipalTokenResolver, Subject};
use crate::acl::{ACL_COLUMN_FAMILY, ObjectType, acl_row_key, is_root, normalize_path, parent_of};
use crate::config::StoreConfig;
use crate::error::SparseError;
use crate::storage::StorageClient;
use crate::types::value::{PropertyMap, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Evaluates permissions for one subject against ACL rows in one keyspace.
///
/// Compiled results are cached per manager and never invalidated by
/// `set_acl`; call `clear_cache` or build a new manager to observe writes.
pub struct AccessControlManager {
    subject: Subject,
    storage: Arc<dyn StorageClient>,
    keyspace: String,
    admin: bool,
    recursion_limit: usize,
    cache: Arc<dyn PermissionCache>,
    tokens: Arc<dyn PrincipalTokenResolver>,
}

impl std::fmt::Debug for AccessControlManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessControlManager")
            .field("subject", &self.subject)
            .field("keyspace", &self.keyspace)
            .field("admin", &self.admin)
            .field("recursion_limit", &self.recursion_limit)
            .finish()
    }
}

impl AccessControlManager {
    pub fn new(
        subject: Subject,
        storage: Arc<dyn StorageClient>,
        keyspace: impl Into<String>,
        config: &StoreConfig,
    ) -> Self {
        Self {
            admin: subject.is_admin(config),
            subject,
            storage,
            keyspace: keyspace.into(),
            recursion_limit: config.acl_recursion_limit,
            cache: cache_from_policy(config.permission_cache),
            tokens: Arc::new(NoTokens),
        }
    }

    pub fn with_cache(mut self, cache: Arc<dyn PermissionCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_token_resolver(mut self, tokens: Arc<dyn PrincipalTokenResolver>) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn subject(&self) -> &Subject {
        &self.subject
    }

    pub fn is_admin(&self) -> bool {
        self.admin
    }

    /// Fails with `AccessDenied` unless every bit of `permission` is granted.
    /// Administrators pass without touching storage.
    pub fn check(
        &self,
        object_type: ObjectType,
        path: &str,
        permission: Permission,
    ) -> Result<(), SparseError> {
        if self.admin {
            return Ok(());
        }
        let compiled = self.compile(object_type, path);
        if compiled.allows(permission.bitmap()) {
            return Ok(());
        }
        debug!(
            subject = self.subject.id(),
            object_type = object_type.as_str(),
            path,
            requested = permission.bitmap(),
            granted = compiled.granted,
            "access denied"
        );
        Err(SparseError::AccessDenied {
            object_type: object_type.to_string(),
            path: path.to_string(),
            permission: describe_bitmap(permission.bitmap()),
        })
    }

    pub fn can(&self, object_type: ObjectType, path: &str, permission: Permission) -> bool {
        self.check(object_type, path, permission).is_ok()
    }

    /// Compiled grant and deny bits at `path`. Administrators hold everything.
    pub fn effective_permissions(&self, object_type: ObjectType, path: &str) -> CompiledPermissions {
        if self.admin {
            return CompiledPermissions::new(ALL.bitmap(), 0);
        }
        self.compile(object_type, path)
    }

    pub fn get_acl(&self, object_type: ObjectType, path: &str) -> Result<PropertyMap, SparseError> {
        self.check(object_type, path, CAN_READ_ACL)?;
        self.read_acl(object_type, path)
    }

    /// Applies `modifications` in order against the stored bitmaps and writes
    /// back only the touched ACEs.
    pub fn set_acl(
        &self,
        object_type: ObjectType,
        path: &str,
        modifications: &[AclModification],
    ) -> Result<(), SparseError> {
        self.check(object_type, path, CAN_WRITE_ACL)?;
        let current = self.read_acl(object_type, path)?;
        let mut working: BTreeMap<&str, i32> = current
            .iter()
            .filter_map(|(k, v)| v.as_bitmap().map(|bits| (k.as_str(), bits)))
            .collect();
        let mut updates = PropertyMap::new();
        for modification in modifications {
            let key = modification.key();
            if modification.is_delete() {
                working.remove(key);
                updates.insert(key.to_string(), Value::Removed);
                continue;
            }
            let existing = working.get(key).copied().unwrap_or(0);
            let bits = modification.apply(existing);
            working.insert(key, bits);
            updates.insert(key.to_string(), Value::Integer(bits));
        }
        if updates.is_empty() {
            return Ok(());
        }
        debug!(
            subject = self.subject.id(),
            object_type = object_type.as_str(),
            path,
            changes = updates.len(),
            "writing acl"
        );
        self.storage.insert(
            &self.keyspace,
            ACL_COLUMN_FAMILY,
            &acl_row_key(object_type, path),
            &updates,
            current.is_empty(),
        )
    }

    /// Principals whose own ACE at `path` (not inherited) with the given
    /// polarity contains every bit of `bitmap`.
    pub fn find_principals(
        &self,
        object_type: ObjectType,
        path: &str,
        bitmap: i32,
        granted: bool,
    ) -> Result<Vec<String>, SparseError> {
        self.check(object_type, path, CAN_READ_ACL)?;
        let acl = self.read_acl(object_type, path)?;
        let mut principals: Vec<String> = acl
            .iter()
            .filter(|(key, _)| !key.starts_with(PROPERTY_ACE_PREFIX))
            .filter(|(key, _)| if granted { is_grant(key) } else { is_deny(key) })
            .filter(|(_, value)| value.as_bitmap().is_some_and(|v| v & bitmap == bitmap))
            .filter_map(|(key, _)| principal_of(key).map(str::to_string))
            .collect();
        principals.sort();
        principals.dedup();
        Ok(principals)
    }

    /// Property-level restrictions for this subject from the `_pp_` ACEs at
    /// `path`. Not inherited from ancestors.
    pub fn property_acl(&self, object_type: ObjectType, path: &str) -> Result<PropertyAcl, SparseError> {
        let path = normalize_path(path);
        if self.admin {
            return Ok(PropertyAcl::unrestricted(object_type, path));
        }
        let acl = self.read_acl(object_type, path)?;
        let mut bits: BTreeMap<String, (i32, i32)> = BTreeMap::new();
        for (key, value) in &acl {
            let Some(ace) = parse_property_ace(key) else {
                continue;
            };
            let Some(bitmap) = value.as_bitmap() else {
                continue;
            };
            if !self.holds(ace.principal) {
                continue;
            }
            let entry = bits.entry(ace.property.to_string()).or_default();
            if ace.grant {
                entry.0 |= bitmap;
            } else {
                entry.1 |= bitmap;
            }
        }
        Ok(PropertyAcl::from_bits(object_type, path, &bits))
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    fn read_acl(&self, object_type: ObjectType, path: &str) -> Result<PropertyMap, SparseError> {
        self.storage.get(
            &self.keyspace,
            ACL_COLUMN_FAMILY,
            &acl_row_key(object_type, path),
        )
    }

    fn holds(&self, principal: &str) -> bool {
        match principal.strip_prefix(DYNAMIC_PRINCIPAL_PREFIX) {
            Some(token) => self.holds_token(token),
            None => self.subject.has_role(principal),
        }
    }

    fn holds_token(&self, token: &str) -> bool {
        match self.tokens.resolve(token) {
            Ok(holders) => holders.iter().any(|p| self.subject.has_role(p)),
            Err(e) => {
                debug!(token, error = %e, "principal token lookup failed, ignoring ace");
                false
            }
        }
    }

    /// This level's own bits for the subject. Unreadable rows count as empty;
    /// the overall check still fails closed.
    fn own_bits(&self, object_type: ObjectType, path: &str) -> CompiledPermissions {
        let acl = match self.read_acl(object_type, path) {
            Ok(acl) => acl,
            Err(e) => {
                debug!(
                    object_type = object_type.as_str(),
                    path,
                    error = %e,
                    "acl read failed, treating as empty"
                );
                return CompiledPermissions::default();
            }
        };
        let mut own = CompiledPermissions::default();
        for (key, value) in &acl {
            if key.starts_with(PROPERTY_ACE_PREFIX) {
                continue;
            }
            let (Some(principal), Some(bitmap)) = (principal_of(key), value.as_bitmap()) else {
                continue;
            };
            if !self.holds(principal) {
                continue;
            }
            if is_grant(key) {
                own.granted |= bitmap;
            } else {
                own.denied |= bitmap;
            }
        }
        own
    }

    /// Walks from `path` towards the root until the depth limit, the root, a
    /// cached ancestor, or a level that fixes every bit either way. Results
    /// are then folded back down and cached for each visited path.
    fn compile(&self, object_type: ObjectType, path: &str) -> CompiledPermissions {
        let mut current = normalize_path(path);
        let mut chain: Vec<(&str, CompiledPermissions)> = Vec::new();
        let mut depth = 0usize;
        let mut inherited = loop {
            if let Some(hit) = self.cache.get(&(object_type, current.to_string())) {
                break Some(hit);
            }
            let own = self.own_bits(object_type, current);
            chain.push((current, own));
            let saturated = own.granted == ALL.bitmap() && own.denied == ALL.bitmap();
            if depth >= self.recursion_limit || is_root(current) || saturated {
                break None;
            }
            current = parent_of(current);
            depth += 1;
        };
        for (level, own) in chain.into_iter().rev() {
            let compiled = match inherited {
                Some(parent) => own.inherit(parent),
                None => own,
            };
            self.cache.put((object_type, level.to_string()), compiled);
            inherited = Some(compiled);
        }
        inherited.unwrap_or_default()
    }
}
