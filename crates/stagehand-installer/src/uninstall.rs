use anyhow::{Context, Result};
use stagehand_core::{
    InstallStatus, Scope, NAME_VALUE, OLD_VERSION_VALUE, RENAME_COMMAND_VALUE, VERSION_KEY,
    VERSION_VALUE,
};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::registry::Registry;
use crate::resolver::InstalledState;
use crate::work_item_list::WorkItemList;
use crate::InstallLayout;

pub struct UninstallRequest<'a> {
    pub scope: Scope,
    pub layout: &'a InstallLayout,
    pub installed: Option<&'a InstalledState>,
    pub force: bool,
    pub product_in_use: bool,
    pub backup_root: &'a Path,
}

/// Everything under the install root except its state directory.
fn product_entries(root: &Path) -> Result<Vec<PathBuf>> {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to list {}", root.display()));
        }
    };

    let mut paths = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("failed to list {}", root.display()))?;
        if entry.file_name() == "state" {
            continue;
        }
        paths.push(entry.path());
    }
    paths.sort();
    Ok(paths)
}

pub fn build_uninstall_list(request: &UninstallRequest<'_>) -> Result<WorkItemList> {
    let mut list = WorkItemList::new(request.backup_root);
    for path in product_entries(request.layout.root())? {
        list.add_delete_tree(path);
    }
    for value in [VERSION_VALUE, OLD_VERSION_VALUE, RENAME_COMMAND_VALUE, NAME_VALUE] {
        list.add_delete_registry_value(request.scope, VERSION_KEY, value);
    }
    Ok(list)
}

pub fn uninstall(registry: &mut dyn Registry, request: &UninstallRequest<'_>) -> InstallStatus {
    match request.installed {
        None if !request.force => {
            error!(scope = request.scope.as_str(), "no installed version found");
            return InstallStatus::ProductNotInstalled;
        }
        None => warn!("no installed version found, forcing uninstall"),
        Some(installed) => info!(version = %installed.version, "uninstalling"),
    }

    if request.product_in_use && !request.force {
        error!("product is running, close it before uninstalling");
        return InstallStatus::ProductRunning;
    }

    let mut list = match build_uninstall_list(request) {
        Ok(list) => list,
        Err(err) => {
            error!(error = %format!("{err:#}"), "failed to plan uninstall");
            return InstallStatus::UninstallFailed;
        }
    };

    if list.execute(registry) {
        InstallStatus::UninstallSuccessful
    } else {
        InstallStatus::UninstallFailed
    }
}
