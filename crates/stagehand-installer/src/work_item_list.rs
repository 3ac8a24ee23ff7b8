use stagehand_core::Scope;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use crate::registry::{Registry, RegistryValue};
use crate::work_item::{
    CopyPolicy, CopyTree, DeleteRegistryValue, DeleteTree, SetRegistryValue, WorkItem,
};

/// Ordered group of work items that succeeds or fails as a unit.
///
/// Items run in insertion order. When one fails, every item that already
/// succeeded is rolled back in reverse order before `execute` returns.
#[derive(Debug)]
pub struct WorkItemList {
    backup_root: PathBuf,
    items: Vec<WorkItem>,
    applied: usize,
}

impl WorkItemList {
    /// `backup_root` receives the backups that make copies and deletions
    /// reversible; it should live under the operation's temp root.
    pub fn new(backup_root: impl Into<PathBuf>) -> Self {
        Self {
            backup_root: backup_root.into(),
            items: Vec::new(),
            applied: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[WorkItem] {
        &self.items
    }

    fn next_backup_dir(&self) -> PathBuf {
        self.backup_root.join(format!("item-{}", self.items.len()))
    }

    pub fn push(&mut self, item: WorkItem) -> &mut Self {
        self.items.push(item);
        self
    }

    pub fn add_copy_tree(
        &mut self,
        source: impl AsRef<Path>,
        destination: impl AsRef<Path>,
        policy: CopyPolicy,
    ) -> &mut Self {
        let backup_dir = self.next_backup_dir();
        self.push(WorkItem::CopyTree(CopyTree::new(
            source.as_ref(),
            destination.as_ref(),
            backup_dir,
            policy,
        )))
    }

    pub fn add_delete_tree(&mut self, path: impl AsRef<Path>) -> &mut Self {
        let backup_dir = self.next_backup_dir();
        self.push(WorkItem::DeleteTree(DeleteTree::new(
            path.as_ref(),
            Some(backup_dir),
        )))
    }

    /// A deletion whose failure is logged instead of failing the list.
    pub fn add_best_effort_delete_tree(&mut self, path: impl AsRef<Path>) -> &mut Self {
        let backup_dir = self.next_backup_dir();
        self.push(WorkItem::DeleteTree(
            DeleteTree::new(path.as_ref(), Some(backup_dir)).best_effort(),
        ))
    }

    pub fn add_set_registry_value(
        &mut self,
        scope: Scope,
        key: &str,
        name: &str,
        value: RegistryValue,
        overwrite: bool,
    ) -> &mut Self {
        self.push(WorkItem::SetRegistryValue(SetRegistryValue::new(
            scope, key, name, value, overwrite,
        )))
    }

    pub fn add_delete_registry_value(&mut self, scope: Scope, key: &str, name: &str) -> &mut Self {
        self.push(WorkItem::DeleteRegistryValue(DeleteRegistryValue::new(
            scope, key, name,
        )))
    }

    /// Applies every item. Returns `false` after rolling back the applied
    /// prefix when any item fails.
    pub fn execute(&mut self, registry: &mut dyn Registry) -> bool {
        self.applied = 0;
        for index in 0..self.items.len() {
            let item = &mut self.items[index];
            debug!(step = index, item = %item.describe(), "applying work item");
            if let Err(err) = item.apply(registry) {
                error!(
                    step = index,
                    item = %item.describe(),
                    error = %format!("{err:#}"),
                    "work item failed, rolling back"
                );
                self.rollback(registry);
                return false;
            }
            self.applied = index + 1;
        }
        info!(items = self.items.len(), "work item list applied");
        true
    }

    /// Best effort: a failing rollback step is logged and the remaining
    /// steps still run.
    pub fn rollback(&mut self, registry: &mut dyn Registry) {
        for index in (0..self.applied).rev() {
            let item = &mut self.items[index];
            if let Err(err) = item.rollback(registry) {
                warn!(
                    step = index,
                    item = %item.describe(),
                    error = %format!("{err:#}"),
                    "rollback of work item failed"
                );
            }
        }
        self.applied = 0;
    }
}
