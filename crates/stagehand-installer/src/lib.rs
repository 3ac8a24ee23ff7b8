use stagehand_core::Scope;

mod cleanup;
mod config;
mod decision;
mod fs_utils;
mod install;
mod install_marker;
mod layout;
mod registry;
mod rename;
mod resolver;
mod result;
mod setup;
mod setup_patch;
mod staging;
mod uninstall;
mod work_item;
mod work_item_list;

pub use cleanup::{
    cleanup_temp_paths, cleanup_temp_paths_with, process_pending_deletions,
    read_pending_deletions, schedule_for_deletion,
};
pub use config::{
    load_preferences, requested_scope, resolve_roots, resolve_roots_with_env, ConfigOverrides,
    InstallerConfig, Operation, SYSTEM_ROOT_ENV, USER_ROOT_ENV,
};
pub use decision::{decide, Decision, FollowUp, PipelineOutcome};
pub use fs_utils::{make_tmp_dir, path_exists, remove_path, same_content, tree_digest};
pub use install::{
    build_install_list, clear_install_dir, install_or_update, product_in_use,
    remove_old_version_dirs, InstallRequest, InstallResult,
};
pub use install_marker::{
    claim_install_marker, holder_is_stale, read_install_marker, read_run_record,
    release_install_marker, with_install_marker, write_run_record, RunRecord, RunStatus,
    STALE_MARKER_AGE_SECS,
};
pub use layout::{default_system_root, default_user_root, InstallLayout, InstallRoots};
pub use registry::{FileRegistry, Registry, RegistryValue};
pub use rename::{build_rename_list, rename_executables};
pub use resolver::{
    check_candidate, read_installed_state, resolve, InstalledSnapshot, InstalledState, Resolution,
};
pub use result::{update_diff_install_status, write_installer_result};
pub use setup::{run, ProcessHooks, SetupHooks};
pub use setup_patch::update_setup_exe;
pub use staging::{
    apply_diff_patch, decompress_payload, stage, version_dir_name, version_from_dir, StageError,
    StagedPayload, PATCH_ERROR_APPLY_FAILED, PATCH_ERROR_BASE_UNREADABLE,
    PATCH_ERROR_OUTPUT_FAILED, PATCH_ERROR_PATCH_UNREADABLE,
};
pub use uninstall::{build_uninstall_list, uninstall, UninstallRequest};
pub use work_item::{
    CopyPolicy, CopyTree, DeleteRegistryValue, DeleteTree, SetRegistryValue, WorkItem,
};
pub use work_item_list::WorkItemList;

/// File registry over the hives of both scope roots.
pub fn file_registry(roots: &InstallRoots) -> FileRegistry {
    FileRegistry::new(
        roots.layout(Scope::System).registry_hive_path(),
        roots.layout(Scope::User).registry_hive_path(),
    )
}
