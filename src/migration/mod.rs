//! Property migrations over whole column families.
//!
//! Migrators run in dependency order. One that depends on a name that is
//! neither in the run set nor already recorded as done is left out and
//! reported, as is anything depending on it.

use crate::error::SparseError;
use crate::redo::RedoLog;
use crate::storage::StorageClient;
use crate::types::value::{Calendar, PropertyMap, Value};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{info, warn};

/// Column family recording completed run-once migrators, one row per
/// migrated column family and migrator name.
pub const MIGRATION_COLUMN_FAMILY: &str = "mig";

/// Row key of the completion marker for `name` run over `column_family`.
pub fn migration_marker_key(column_family: &str, name: &str) -> String {
    format!("{column_family}:{name}")
}

pub trait PropertyMigrator: Send + Sync {
    /// Unique within one run. Run-once completion is recorded under this name
    /// per column family.
    fn name(&self) -> &str;

    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    /// Run-once migrators are skipped after they have completed once.
    fn run_once(&self) -> bool {
        true
    }

    /// Rewrites `properties` in place. Returns whether anything changed.
    fn migrate(&self, row_key: &str, properties: &mut PropertyMap) -> Result<bool, SparseError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnresolvedMigrator {
    pub name: String,
    pub reason: String,
}

pub struct MigrationPlan {
    ordered: Vec<Arc<dyn PropertyMigrator>>,
    already_applied: Vec<String>,
    unresolved: Vec<UnresolvedMigrator>,
}

impl std::fmt::Debug for MigrationPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationPlan")
            .field("ordered", &self.names())
            .field("already_applied", &self.already_applied)
            .field("unresolved", &self.unresolved)
            .finish()
    }
}

impl MigrationPlan {
    /// Orders `migrators` so every one runs after its dependencies. Names in
    /// `completed` count as satisfied dependencies.
    pub fn resolve(
        migrators: Vec<Arc<dyn PropertyMigrator>>,
        completed: &BTreeSet<String>,
    ) -> Self {
        let mut unresolved = Vec::new();
        let mut already_applied = Vec::new();
        let mut pending: Vec<Arc<dyn PropertyMigrator>> = Vec::new();
        let mut seen = BTreeSet::new();
        for migrator in migrators {
            let name = migrator.name().to_string();
            if !seen.insert(name.clone()) {
                unresolved.push(UnresolvedMigrator {
                    name,
                    reason: "duplicate name".into(),
                });
            } else if migrator.run_once() && completed.contains(&name) {
                already_applied.push(name);
            } else {
                pending.push(migrator);
            }
        }

        let mut satisfied: BTreeSet<String> = completed.clone();
        satisfied.extend(already_applied.iter().cloned());
        let mut ordered = Vec::with_capacity(pending.len());
        loop {
            let ready = pending.iter().position(|m| {
                m.dependencies().iter().all(|dep| satisfied.contains(dep))
            });
            let Some(idx) = ready else { break };
            let migrator = pending.remove(idx);
            satisfied.insert(migrator.name().to_string());
            ordered.push(migrator);
        }

        let stuck: BTreeSet<String> = pending.iter().map(|m| m.name().to_string()).collect();
        for migrator in pending {
            let missing: Vec<String> = migrator
                .dependencies()
                .into_iter()
                .filter(|dep| !satisfied.contains(dep))
                .collect();
            let (in_set, absent): (Vec<String>, Vec<String>) =
                missing.into_iter().partition(|dep| stuck.contains(dep));
            let reason = if absent.is_empty() {
                format!("waits on unresolved {}", in_set.join(", "))
            } else {
                format!("missing {}", absent.join(", "))
            };
            unresolved.push(UnresolvedMigrator {
                name: migrator.name().to_string(),
                reason,
            });
        }
        Self {
            ordered,
            already_applied,
            unresolved,
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.ordered.iter().map(|m| m.name()).collect()
    }

    pub fn migrators(&self) -> &[Arc<dyn PropertyMigrator>] {
        &self.ordered
    }

    pub fn already_applied(&self) -> &[String] {
        &self.already_applied
    }

    pub fn unresolved(&self) -> &[UnresolvedMigrator] {
        &self.unresolved
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MigrationReport {
    pub keyspace: String,
    pub column_family: String,
    pub rows_scanned: usize,
    pub rows_changed: usize,
    /// Migrators that ran, in run order.
    pub applied: Vec<String>,
    pub already_applied: Vec<String>,
    pub unresolved: Vec<UnresolvedMigrator>,
    /// Rows each migrator reported as changed.
    pub changed_by: BTreeMap<String, usize>,
}

/// Runs migrators over one keyspace, optionally journaling every rewritten
/// row to a redo log.
pub struct Migrator<'a> {
    storage: &'a dyn StorageClient,
    keyspace: String,
    redo: Option<&'a mut RedoLog>,
}

impl<'a> Migrator<'a> {
    pub fn new(storage: &'a dyn StorageClient, keyspace: impl Into<String>) -> Self {
        Self {
            storage,
            keyspace: keyspace.into(),
            redo: None,
        }
    }

    pub fn with_redo_log(mut self, redo: &'a mut RedoLog) -> Self {
        self.redo = Some(redo);
        self
    }

    /// Names of run-once migrators recorded as completed on `column_family`.
    pub fn completed(&self, column_family: &str) -> Result<BTreeSet<String>, SparseError> {
        let prefix = migration_marker_key(column_family, "");
        Ok(self
            .storage
            .scan(&self.keyspace, MIGRATION_COLUMN_FAMILY)?
            .into_iter()
            .filter_map(|(key, _)| key.strip_prefix(&prefix).map(str::to_string))
            .collect())
    }

    pub fn run(
        &mut self,
        column_family: &str,
        migrators: Vec<Arc<dyn PropertyMigrator>>,
    ) -> Result<MigrationReport, SparseError> {
        let plan = MigrationPlan::resolve(migrators, &self.completed(column_family)?);
        for skipped in plan.unresolved() {
            warn!(migrator = %skipped.name, reason = %skipped.reason, "migrator left out of run");
        }
        let mut report = MigrationReport {
            keyspace: self.keyspace.clone(),
            column_family: column_family.to_string(),
            applied: plan.names().into_iter().map(str::to_string).collect(),
            already_applied: plan.already_applied().to_vec(),
            unresolved: plan.unresolved().to_vec(),
            ..MigrationReport::default()
        };
        if plan.migrators().is_empty() {
            return Ok(report);
        }
        info!(
            keyspace = %self.keyspace,
            column_family,
            migrators = plan.migrators().len(),
            "migration started"
        );

        let mut changed_by: HashMap<String, usize> = HashMap::new();
        for (key, original) in self.storage.scan(&self.keyspace, column_family)? {
            report.rows_scanned += 1;
            let mut rewritten = original.clone();
            let mut changed = false;
            for migrator in plan.migrators() {
                let touched = migrator.migrate(&key, &mut rewritten).map_err(|e| {
                    SparseError::Migration(format!("{} failed on '{key}': {e}", migrator.name()))
                })?;
                if touched {
                    *changed_by.entry(migrator.name().to_string()).or_default() += 1;
                    changed = true;
                }
            }
            if !changed || rewritten == original {
                continue;
            }
            self.save(column_family, &key, &original, &rewritten)?;
            report.rows_changed += 1;
        }

        for migrator in plan.migrators().iter().filter(|m| m.run_once()) {
            let mut marker = PropertyMap::new();
            marker.insert("completed_at".into(), Value::Calendar(Calendar::now_utc()));
            marker.insert(
                "column_family".into(),
                Value::String(column_family.to_string()),
            );
            self.storage.insert(
                &self.keyspace,
                MIGRATION_COLUMN_FAMILY,
                &migration_marker_key(column_family, migrator.name()),
                &marker,
                true,
            )?;
        }
        report.changed_by = changed_by.into_iter().collect();
        info!(
            column_family,
            rows_scanned = report.rows_scanned,
            rows_changed = report.rows_changed,
            "migration finished"
        );
        Ok(report)
    }

    /// Writes the rewritten row. The before and after images are encoded
    /// ahead of the write and committed to the journal once it succeeds.
    fn save(
        &mut self,
        column_family: &str,
        key: &str,
        original: &PropertyMap,
        rewritten: &PropertyMap,
    ) -> Result<(), SparseError> {
        let mut updates = rewritten.clone();
        for name in original.keys() {
            if !rewritten.contains_key(name) {
                updates.insert(name.clone(), Value::Removed);
            }
        }
        let mut tx = match self.redo.as_deref_mut() {
            Some(redo) => Some(redo.begin()?),
            None => None,
        };
        if let Some(tx) = tx.as_mut() {
            tx.before(&self.keyspace, column_family, key, original)?;
            tx.after(&self.keyspace, column_family, key, rewritten)?;
            tx.prepare()?;
        }
        self.storage
            .insert(&self.keyspace, column_family, key, &updates, false)?;
        if let Some(tx) = tx {
            tx.commit()?;
        }
        Ok(())
    }
}
