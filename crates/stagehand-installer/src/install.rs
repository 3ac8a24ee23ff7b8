use stagehand_core::{
    InstallStatus, Scope, Version, NAME_VALUE, OLD_VERSION_VALUE, PRODUCT_EXE, PRODUCT_NAME,
    RENAME_COMMAND_VALUE, VERSION_KEY, VERSION_VALUE,
};
use std::fs;
use std::io;
use std::path::Path;
use tracing::{info, warn};

use crate::fs_utils::{path_exists, remove_path};
use crate::registry::{Registry, RegistryValue};
use crate::staging::{version_dir_name, StagedPayload};
use crate::work_item::CopyPolicy;
use crate::work_item_list::WorkItemList;
use crate::InstallLayout;

const STATE_DIR_NAME: &str = "state";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallResult {
    FirstInstall,
    Repaired,
    Updated,
    /// The running executable could not be replaced; the new one waits as
    /// `new_app` until `rename-executables` runs.
    InUseUpdated,
    SameVersionRepairFailed,
    Failed,
}

impl InstallResult {
    pub fn status(self) -> InstallStatus {
        match self {
            Self::FirstInstall => InstallStatus::FirstInstallSuccess,
            Self::Repaired => InstallStatus::InstallRepaired,
            Self::Updated => InstallStatus::NewVersionUpdated,
            Self::InUseUpdated => InstallStatus::InUseUpdated,
            Self::SameVersionRepairFailed => InstallStatus::SameVersionRepairFailed,
            Self::Failed => InstallStatus::InstallFailed,
        }
    }
}

pub struct InstallRequest<'a> {
    pub scope: Scope,
    pub layout: &'a InstallLayout,
    pub staged: &'a StagedPayload,
    pub installed: Option<&'a Version>,
    pub product_in_use: bool,
    /// Command line that completes a deferred executable swap.
    pub rename_command: &'a str,
    pub backup_root: &'a Path,
}

impl InstallRequest<'_> {
    fn defers_exe_swap(&self) -> bool {
        self.product_in_use
            && self
                .installed
                .is_some_and(|installed| installed != &self.staged.version)
    }
}

/// A running product holds `<exe>.lock` under the install root.
pub fn product_in_use(layout: &InstallLayout) -> bool {
    path_exists(&layout.product_lock_path())
}

/// Empties an install root while keeping its state directory, which holds
/// the registry hive, the in-progress marker and the temp roots.
pub fn clear_install_dir(root: &Path) -> io::Result<()> {
    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if entry.file_name() == STATE_DIR_NAME {
            continue;
        }
        remove_path(&entry.path())?;
    }
    Ok(())
}

pub fn build_install_list(request: &InstallRequest<'_>) -> WorkItemList {
    let layout = request.layout;
    let staged = request.staged;
    let version = staged.version.to_string();
    let new_exe_source = staged.source_dir.join(PRODUCT_EXE);

    // The staged version tree already carries the cached full archive.
    let mut list = WorkItemList::new(request.backup_root);
    list.add_copy_tree(
        staged.version_source_dir(),
        layout.version_dir(&staged.version),
        CopyPolicy::IfDifferent,
    );

    match request.installed {
        Some(installed) if request.defers_exe_swap() => {
            list.add_copy_tree(&new_exe_source, layout.product_new_exe(), CopyPolicy::Always)
                .add_set_registry_value(
                    request.scope,
                    VERSION_KEY,
                    OLD_VERSION_VALUE,
                    RegistryValue::string(installed.to_string()),
                    true,
                )
                .add_set_registry_value(
                    request.scope,
                    VERSION_KEY,
                    RENAME_COMMAND_VALUE,
                    RegistryValue::string(request.rename_command),
                    true,
                );
        }
        _ => {
            list.add_copy_tree(&new_exe_source, layout.product_exe(), CopyPolicy::IfDifferent)
                .add_best_effort_delete_tree(layout.product_new_exe())
                .add_delete_registry_value(request.scope, VERSION_KEY, OLD_VERSION_VALUE)
                .add_delete_registry_value(request.scope, VERSION_KEY, RENAME_COMMAND_VALUE);
        }
    }

    list.add_set_registry_value(
        request.scope,
        VERSION_KEY,
        VERSION_VALUE,
        RegistryValue::string(version),
        true,
    )
    .add_set_registry_value(
        request.scope,
        VERSION_KEY,
        NAME_VALUE,
        RegistryValue::string(PRODUCT_NAME),
        true,
    );
    list
}

/// Copies the staged tree into place and updates the version markers as one
/// transaction.
pub fn install_or_update(registry: &mut dyn Registry, request: &InstallRequest<'_>) -> InstallResult {
    let new_version = &request.staged.version;
    let mut list = build_install_list(request);
    let deferred = request.defers_exe_swap();

    if !list.execute(registry) {
        return match request.installed {
            Some(installed) if installed == new_version => InstallResult::SameVersionRepairFailed,
            _ => InstallResult::Failed,
        };
    }

    let result = match request.installed {
        None => InstallResult::FirstInstall,
        Some(installed) if installed == new_version => InstallResult::Repaired,
        Some(_) if deferred => InstallResult::InUseUpdated,
        Some(_) => InstallResult::Updated,
    };
    info!(version = %new_version, result = ?result, "install transaction committed");

    if result == InstallResult::Updated {
        remove_old_version_dirs(request.layout, new_version);
    }
    result
}

/// Best effort: a version directory that cannot be removed is left behind.
pub fn remove_old_version_dirs(layout: &InstallLayout, keep: &Version) {
    let entries = match fs::read_dir(layout.root()) {
        Ok(entries) => entries,
        Err(err) => {
            warn!(root = %layout.root().display(), error = %err, "failed to list install root");
            return;
        }
    };

    for entry in entries.filter_map(Result::ok) {
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        let Some(version) = version_dir_name(&name) else {
            continue;
        };
        if &version == keep || !entry.path().is_dir() {
            continue;
        }
        match remove_path(&entry.path()) {
            Ok(()) => info!(version = %version, "removed old version directory"),
            Err(err) => warn!(version = %version, error = %err, "failed to remove old version directory"),
        }
    }
}
