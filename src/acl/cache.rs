//! Memoized compiled permissions, keyed by object type and path.
//!
//! Entries belong to one subject's manager. Nothing here invalidates on ACL
//! writes; callers clear the cache or use a fresh manager.

use crate::acl::ObjectType;
use crate::config::PermissionCachePolicy;
use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;

pub type PermissionCacheKey = (ObjectType, String);

/// Effective bits at one path after inheritance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompiledPermissions {
    pub granted: i32,
    pub denied: i32,
}

impl CompiledPermissions {
    pub const fn new(granted: i32, denied: i32) -> Self {
        Self { granted, denied }
    }

    /// Folds a parent's compiled bits under this level's own bits. A bit set
    /// here masks the opposite polarity inherited from above.
    pub const fn inherit(self, parent: CompiledPermissions) -> Self {
        Self {
            granted: self.granted | (parent.granted & !self.denied),
            denied: self.denied | (parent.denied & !self.granted),
        }
    }

    pub const fn allows(self, bitmap: i32) -> bool {
        bitmap & self.granted == bitmap
    }
}

pub trait PermissionCache: Send + Sync {
    fn get(&self, key: &PermissionCacheKey) -> Option<CompiledPermissions>;
    fn put(&self, key: PermissionCacheKey, value: CompiledPermissions);
    fn clear(&self);
}

/// Recompiles on every check.
#[derive(Debug, Default)]
pub struct NoPermissionCache;

impl PermissionCache for NoPermissionCache {
    fn get(&self, _key: &PermissionCacheKey) -> Option<CompiledPermissions> {
        None
    }

    fn put(&self, _key: PermissionCacheKey, _value: CompiledPermissions) {}

    fn clear(&self) {}
}

/// Unbounded map, suited to short-lived request scoped managers.
#[derive(Debug, Default)]
pub struct MemoryPermissionCache {
    entries: RwLock<HashMap<PermissionCacheKey, CompiledPermissions>>,
}

impl MemoryPermissionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl PermissionCache for MemoryPermissionCache {
    fn get(&self, key: &PermissionCacheKey) -> Option<CompiledPermissions> {
        self.entries.read().get(key).copied()
    }

    fn put(&self, key: PermissionCacheKey, value: CompiledPermissions) {
        self.entries.write().insert(key, value);
    }

    fn clear(&self) {
        self.entries.write().clear();
    }
}

pub struct LruPermissionCache {
    entries: Mutex<LruCache<PermissionCacheKey, CompiledPermissions>>,
}

impl LruPermissionCache {
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(cap)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl PermissionCache for LruPermissionCache {
    fn get(&self, key: &PermissionCacheKey) -> Option<CompiledPermissions> {
        self.entries.lock().get(key).copied()
    }

    fn put(&self, key: PermissionCacheKey, value: CompiledPermissions) {
        self.entries.lock().put(key, value);
    }

    fn clear(&self) {
        self.entries.lock().clear();
    }
}

pub fn cache_from_policy(policy: PermissionCachePolicy) -> Arc<dyn PermissionCache> {
    match policy {
        PermissionCachePolicy::None => Arc::new(NoPermissionCache),
        PermissionCachePolicy::Memory => Arc::new(MemoryPermissionCache::new()),
        PermissionCachePolicy::Lru { capacity } => Arc::new(LruPermissionCache::new(capacity)),
    }
}
