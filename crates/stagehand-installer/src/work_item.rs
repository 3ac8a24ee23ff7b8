use anyhow::{anyhow, Context, Result};
use stagehand_core::Scope;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::fs_utils::{copy_path, move_path_or_copy, path_exists, remove_path, same_content};
use crate::registry::{Registry, RegistryValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyPolicy {
    /// Always overwrite the destination.
    Always,
    /// Skip when the destination already holds the same content.
    IfDifferent,
    /// Skip when the destination exists at all.
    IfNotPresent,
}

/// One reversible filesystem or registry mutation.
///
/// `apply` records everything `rollback` needs (backup locations, prior
/// registry values) before it mutates anything; `rollback` only replays that
/// record and never inspects the current state to decide what to restore.
#[derive(Debug)]
pub enum WorkItem {
    CopyTree(CopyTree),
    DeleteTree(DeleteTree),
    SetRegistryValue(SetRegistryValue),
    DeleteRegistryValue(DeleteRegistryValue),
}

impl WorkItem {
    pub fn apply(&mut self, registry: &mut dyn Registry) -> Result<()> {
        match self {
            Self::CopyTree(item) => item.apply(),
            Self::DeleteTree(item) => item.apply(),
            Self::SetRegistryValue(item) => item.apply(registry),
            Self::DeleteRegistryValue(item) => item.apply(registry),
        }
    }

    pub fn rollback(&mut self, registry: &mut dyn Registry) -> Result<()> {
        match self {
            Self::CopyTree(item) => item.rollback(),
            Self::DeleteTree(item) => item.rollback(),
            Self::SetRegistryValue(item) => item.rollback(registry),
            Self::DeleteRegistryValue(item) => item.rollback(registry),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::CopyTree(item) => format!(
                "copy_tree {} -> {}",
                item.source.display(),
                item.destination.display()
            ),
            Self::DeleteTree(item) => format!("delete_tree {}", item.path.display()),
            Self::SetRegistryValue(item) => format!(
                "set_registry_value {}:{}\\{}",
                item.scope.as_str(),
                item.key,
                item.name
            ),
            Self::DeleteRegistryValue(item) => format!(
                "delete_registry_value {}:{}\\{}",
                item.scope.as_str(),
                item.key,
                item.name
            ),
        }
    }
}

#[derive(Debug)]
enum CopyUndo {
    Skipped,
    Copied { backup: Option<PathBuf> },
}

#[derive(Debug)]
pub struct CopyTree {
    source: PathBuf,
    destination: PathBuf,
    backup_dir: PathBuf,
    policy: CopyPolicy,
    undo: Option<CopyUndo>,
}

impl CopyTree {
    pub fn new(
        source: impl Into<PathBuf>,
        destination: impl Into<PathBuf>,
        backup_dir: impl Into<PathBuf>,
        policy: CopyPolicy,
    ) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            backup_dir: backup_dir.into(),
            policy,
            undo: None,
        }
    }

    fn apply(&mut self) -> Result<()> {
        if !path_exists(&self.source) {
            return Err(anyhow!(
                "copy source does not exist: {}",
                self.source.display()
            ));
        }

        let mut backup = None;
        if path_exists(&self.destination) {
            let skip = match self.policy {
                CopyPolicy::Always => false,
                CopyPolicy::IfNotPresent => true,
                CopyPolicy::IfDifferent => same_content(&self.source, &self.destination)?,
            };
            if skip {
                debug!(
                    destination = %self.destination.display(),
                    "copy skipped, destination already up to date"
                );
                self.undo = Some(CopyUndo::Skipped);
                return Ok(());
            }

            let backup_path = backup_path_for(&self.backup_dir, &self.destination)?;
            move_path_or_copy(&self.destination, &backup_path).with_context(|| {
                format!(
                    "failed to back up {} before overwrite",
                    self.destination.display()
                )
            })?;
            backup = Some(backup_path);
        }

        if let Err(err) = copy_path(&self.source, &self.destination) {
            if let Err(cleanup_err) = remove_path(&self.destination) {
                warn!(
                    destination = %self.destination.display(),
                    error = %cleanup_err,
                    "failed to remove partial copy"
                );
            }
            if let Some(backup_path) = &backup {
                if let Err(restore_err) = move_path_or_copy(backup_path, &self.destination) {
                    warn!(
                        destination = %self.destination.display(),
                        error = %restore_err,
                        "failed to restore destination after aborted copy"
                    );
                }
            }
            return Err(err);
        }

        self.undo = Some(CopyUndo::Copied { backup });
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        match self.undo.take() {
            None | Some(CopyUndo::Skipped) => Ok(()),
            Some(CopyUndo::Copied { backup }) => {
                remove_path(&self.destination).with_context(|| {
                    format!("failed to remove copied {}", self.destination.display())
                })?;
                if let Some(backup_path) = backup {
                    move_path_or_copy(&backup_path, &self.destination)?;
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug)]
enum DeleteUndo {
    Absent,
    Skipped,
    Moved { backup: PathBuf },
    Destroyed,
}

#[derive(Debug)]
pub struct DeleteTree {
    path: PathBuf,
    backup_dir: Option<PathBuf>,
    best_effort: bool,
    undo: Option<DeleteUndo>,
}

impl DeleteTree {
    /// Without a backup dir the deletion cannot be rolled back.
    pub fn new(path: impl Into<PathBuf>, backup_dir: Option<PathBuf>) -> Self {
        Self {
            path: path.into(),
            backup_dir,
            best_effort: false,
            undo: None,
        }
    }

    pub fn best_effort(mut self) -> Self {
        self.best_effort = true;
        self
    }

    fn apply(&mut self) -> Result<()> {
        if !path_exists(&self.path) {
            self.undo = Some(DeleteUndo::Absent);
            return Ok(());
        }

        let result = match &self.backup_dir {
            // A failed move may leave a partial copy in the backup dir; it is
            // discarded with the temp root.
            Some(backup_dir) => backup_path_for(backup_dir, &self.path).and_then(|backup| {
                move_path_or_copy(&self.path, &backup).map(|_| DeleteUndo::Moved { backup })
            }),
            None => remove_path(&self.path)
                .map(|_| DeleteUndo::Destroyed)
                .with_context(|| format!("failed to delete {}", self.path.display())),
        };

        match result {
            Ok(undo) => {
                self.undo = Some(undo);
                Ok(())
            }
            Err(err) if self.best_effort => {
                warn!(
                    path = %self.path.display(),
                    error = %err,
                    "best-effort delete failed, continuing"
                );
                self.undo = Some(DeleteUndo::Skipped);
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn rollback(&mut self) -> Result<()> {
        match self.undo.take() {
            None | Some(DeleteUndo::Absent) | Some(DeleteUndo::Skipped) => Ok(()),
            Some(DeleteUndo::Moved { backup }) => move_path_or_copy(&backup, &self.path),
            Some(DeleteUndo::Destroyed) => Err(anyhow!(
                "cannot restore {}: it was deleted without a backup",
                self.path.display()
            )),
        }
    }
}

#[derive(Debug)]
enum SetUndo {
    Skipped,
    Replaced { prior: Option<RegistryValue> },
}

#[derive(Debug)]
pub struct SetRegistryValue {
    scope: Scope,
    key: String,
    name: String,
    value: RegistryValue,
    overwrite: bool,
    undo: Option<SetUndo>,
}

impl SetRegistryValue {
    pub fn new(
        scope: Scope,
        key: impl Into<String>,
        name: impl Into<String>,
        value: RegistryValue,
        overwrite: bool,
    ) -> Self {
        Self {
            scope,
            key: key.into(),
            name: name.into(),
            value,
            overwrite,
            undo: None,
        }
    }

    fn apply(&mut self, registry: &mut dyn Registry) -> Result<()> {
        let prior = registry.read_value(self.scope, &self.key, &self.name)?;
        if prior.is_some() && !self.overwrite {
            self.undo = Some(SetUndo::Skipped);
            return Ok(());
        }

        registry.write_value(self.scope, &self.key, &self.name, self.value.clone())?;
        self.undo = Some(SetUndo::Replaced { prior });
        Ok(())
    }

    fn rollback(&mut self, registry: &mut dyn Registry) -> Result<()> {
        match self.undo.take() {
            None | Some(SetUndo::Skipped) => Ok(()),
            Some(SetUndo::Replaced { prior: Some(prior) }) => {
                registry.write_value(self.scope, &self.key, &self.name, prior)
            }
            Some(SetUndo::Replaced { prior: None }) => registry
                .delete_value(self.scope, &self.key, &self.name)
                .map(|_| ()),
        }
    }
}

#[derive(Debug)]
pub struct DeleteRegistryValue {
    scope: Scope,
    key: String,
    name: String,
    prior: Option<Option<RegistryValue>>,
}

impl DeleteRegistryValue {
    pub fn new(scope: Scope, key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            scope,
            key: key.into(),
            name: name.into(),
            prior: None,
        }
    }

    fn apply(&mut self, registry: &mut dyn Registry) -> Result<()> {
        let prior = registry.read_value(self.scope, &self.key, &self.name)?;
        if prior.is_some() {
            registry.delete_value(self.scope, &self.key, &self.name)?;
        }
        self.prior = Some(prior);
        Ok(())
    }

    fn rollback(&mut self, registry: &mut dyn Registry) -> Result<()> {
        match self.prior.take() {
            Some(Some(prior)) => registry.write_value(self.scope, &self.key, &self.name, prior),
            Some(None) | None => Ok(()),
        }
    }
}

fn backup_path_for(backup_dir: &Path, target: &Path) -> Result<PathBuf> {
    let name = target
        .file_name()
        .ok_or_else(|| anyhow!("cannot back up path without a file name: {}", target.display()))?;
    Ok(backup_dir.join(name))
}
