use crate::error::SparseError;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Component, Path, PathBuf};
use uuid::Uuid;

/// Out-of-row storage for strings too long to keep inline. The row only keeps
/// the location token returned by `store`.
pub trait LongStringStore: Send + Sync {
    fn store(&self, content: &str) -> Result<String, SparseError>;
    fn load(&self, location: &str) -> Result<String, SparseError>;
    /// Frees a location no row refers to any more. Unknown locations are not
    /// an error.
    fn remove(&self, location: &str) -> Result<(), SparseError>;
}

#[derive(Debug, Default)]
pub struct MemoryLongStringStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryLongStringStore {
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

impl LongStringStore for MemoryLongStringStore {
    fn store(&self, content: &str) -> Result<String, SparseError> {
        let location = Uuid::new_v4().simple().to_string();
        self.entries
            .write()
            .insert(location.clone(), content.to_string());
        Ok(location)
    }

    fn load(&self, location: &str) -> Result<String, SparseError> {
        self.entries
            .read()
            .get(location)
            .cloned()
            .ok_or_else(|| SparseError::NotFound {
                what: "long string",
                id: location.to_string(),
            })
    }

    fn remove(&self, location: &str) -> Result<(), SparseError> {
        self.entries.write().remove(location);
        Ok(())
    }
}

/// Keeps each long string in its own file, sharded two levels deep by id.
#[derive(Debug, Clone)]
pub struct FileLongStringStore {
    base: PathBuf,
}

impl FileLongStringStore {
    pub fn open(base: impl Into<PathBuf>) -> Result<Self, SparseError> {
        let base = base.into();
        fs::create_dir_all(&base)?;
        Ok(Self { base })
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    fn resolve(&self, location: &str) -> Result<PathBuf, SparseError> {
        let relative = Path::new(location);
        let clean = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if location.is_empty() || !clean {
            return Err(SparseError::Decode(format!(
                "invalid long string location '{location}'"
            )));
        }
        Ok(self.base.join(relative))
    }
}

impl LongStringStore for FileLongStringStore {
    fn store(&self, content: &str) -> Result<String, SparseError> {
        let id = Uuid::new_v4().simple().to_string();
        let location = format!("{}/{}/{}", &id[0..2], &id[2..4], id);
        let path = self.base.join(&location);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, content.as_bytes())?;
        Ok(location)
    }

    fn load(&self, location: &str) -> Result<String, SparseError> {
        let path = self.resolve(location)?;
        match fs::read_to_string(&path) {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(SparseError::NotFound {
                what: "long string",
                id: location.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    fn remove(&self, location: &str) -> Result<(), SparseError> {
        let path = self.resolve(location)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Scope for rewriting one row. Content loaded through it is stored back
/// under its original location, and locations loaded but never stored back
/// are reported by `orphaned`.
pub struct ReusingLongStrings<'a> {
    inner: &'a dyn LongStringStore,
    /// Content to the location it was loaded from.
    loaded: Mutex<HashMap<String, String>>,
    locations: Mutex<HashSet<String>>,
    kept: Mutex<HashSet<String>>,
}

impl<'a> ReusingLongStrings<'a> {
    pub fn new(inner: &'a dyn LongStringStore) -> Self {
        Self {
            inner,
            loaded: Mutex::new(HashMap::new()),
            locations: Mutex::new(HashSet::new()),
            kept: Mutex::new(HashSet::new()),
        }
    }

    /// Loaded locations the rewritten row no longer refers to.
    pub fn orphaned(&self) -> Vec<String> {
        let kept = self.kept.lock();
        let mut orphaned: Vec<String> = self
            .locations
            .lock()
            .iter()
            .filter(|location| !kept.contains(*location))
            .cloned()
            .collect();
        orphaned.sort();
        orphaned
    }
}

impl LongStringStore for ReusingLongStrings<'_> {
    fn store(&self, content: &str) -> Result<String, SparseError> {
        if let Some(location) = self.loaded.lock().get(content) {
            self.kept.lock().insert(location.clone());
            return Ok(location.clone());
        }
        self.inner.store(content)
    }

    fn load(&self, location: &str) -> Result<String, SparseError> {
        let content = self.inner.load(location)?;
        self.loaded
            .lock()
            .insert(content.clone(), location.to_string());
        self.locations.lock().insert(location.to_string());
        Ok(content)
    }

    fn remove(&self, location: &str) -> Result<(), SparseError> {
        self.inner.remove(location)
    }
}

#[cfg(test)]
mod tests {
    use super::{FileLongStringStore, LongStringStore, MemoryLongStringStore, ReusingLongStrings};
    use tempfile::tempdir;

    #[test]
    fn memory_store_returns_stored_content() {
        let store = MemoryLongStringStore::new();
        let location = store.store("a long body").expect("store");
        assert_eq!(store.load(&location).expect("load"), "a long body");
        assert_eq!(store.len(), 1);
        assert_eq!(store.load("missing").expect_err("missing").code_str(), "not_found");
    }

    #[test]
    fn file_store_shards_by_id() {
        let dir = tempdir().expect("temp dir");
        let store = FileLongStringStore::open(dir.path()).expect("open");
        let body = "é".repeat(40_000);
        let location = store.store(&body).expect("store");
        assert_eq!(location.split('/').count(), 3);
        assert!(dir.path().join(&location).is_file());
        assert_eq!(store.load(&location).expect("load"), body);
    }

    #[test]
    fn file_store_rejects_escaping_locations() {
        let dir = tempdir().expect("temp dir");
        let store = FileLongStringStore::open(dir.path()).expect("open");
        assert_eq!(store.load("../etc/passwd").expect_err("escape").code_str(), "decode");
        assert_eq!(store.load("/etc/passwd").expect_err("absolute").code_str(), "decode");
        assert_eq!(store.load("ab/cd/nothing").expect_err("missing").code_str(), "not_found");
    }

    #[test]
    fn file_store_removes_content() {
        let dir = tempdir().expect("temp dir");
        let store = FileLongStringStore::open(dir.path()).expect("open");
        let location = store.store("body").expect("store");
        store.remove(&location).expect("remove");
        assert!(!dir.path().join(&location).exists());
        store.remove(&location).expect("already gone");
    }

    #[test]
    fn reusing_scope_keeps_locations_of_unchanged_content() {
        let store = MemoryLongStringStore::new();
        let kept = store.store("unchanged body").expect("store");
        let replaced = store.store("old body").expect("store");

        let scope = ReusingLongStrings::new(&store);
        scope.load(&kept).expect("load");
        scope.load(&replaced).expect("load");
        assert_eq!(scope.store("unchanged body").expect("store"), kept);
        let fresh = scope.store("new body").expect("store");
        assert_ne!(fresh, replaced);
        assert_eq!(scope.orphaned(), vec![replaced]);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn duplicate_content_frees_the_extra_location() {
        let store = MemoryLongStringStore::new();
        let first = store.store("same body").expect("store");
        let second = store.store("same body").expect("store");

        let scope = ReusingLongStrings::new(&store);
        scope.load(&first).expect("load");
        scope.load(&second).expect("load");
        let reused = scope.store("same body").expect("store");
        assert_eq!(scope.store("same body").expect("store"), reused);
        let orphaned = scope.orphaned();
        assert_eq!(orphaned.len(), 1);
        assert_ne!(orphaned[0], reused);
        assert_eq!(store.len(), 2);
    }
}
