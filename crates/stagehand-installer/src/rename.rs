use stagehand_core::{InstallStatus, Scope, OLD_VERSION_VALUE, RENAME_COMMAND_VALUE, VERSION_KEY};
use std::path::Path;
use tracing::{error, info};

use crate::registry::Registry;
use crate::work_item::CopyPolicy;
use crate::work_item_list::WorkItemList;
use crate::InstallLayout;

pub fn build_rename_list(layout: &InstallLayout, scope: Scope, backup_root: &Path) -> WorkItemList {
    let mut list = WorkItemList::new(backup_root);
    list.add_delete_tree(layout.product_old_exe())
        .add_copy_tree(
            layout.product_new_exe(),
            layout.product_exe(),
            CopyPolicy::IfDifferent,
        )
        .add_delete_registry_value(scope, VERSION_KEY, OLD_VERSION_VALUE)
        .add_delete_tree(layout.product_new_exe())
        .add_delete_registry_value(scope, VERSION_KEY, RENAME_COMMAND_VALUE);
    list
}

/// Swaps `new_app` into place once the old executable is no longer running.
pub fn rename_executables(
    registry: &mut dyn Registry,
    layout: &InstallLayout,
    scope: Scope,
    backup_root: &Path,
) -> InstallStatus {
    let mut list = build_rename_list(layout, scope, backup_root);
    if list.execute(registry) {
        info!(root = %layout.root().display(), "executables renamed");
        InstallStatus::RenameSuccessful
    } else {
        error!(root = %layout.root().display(), "renaming executables failed");
        InstallStatus::RenameFailed
    }
}
