//! Runs one setup operation end to end and reduces it to one status.

use anyhow::{anyhow, Context, Result};
use stagehand_core::{
    InstallStatus, Scope, Version, FIRST_RUN_SWITCH, LEGACY_KEYS, RENAME_EXE_SWITCH,
};
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{error, info, warn};

use crate::cleanup::{cleanup_temp_paths_with, schedule_for_deletion};
use crate::config::{InstallerConfig, Operation};
use crate::decision::{decide, Decision, FollowUp, PipelineOutcome};
use crate::fs_utils::{make_tmp_dir, remove_path};
use crate::install::{self, install_or_update, InstallRequest};
use crate::install_marker::{read_install_marker, with_install_marker};
use crate::registry::Registry;
use crate::rename::rename_executables;
use crate::resolver::{check_candidate, read_installed_state, resolve, InstalledSnapshot, Resolution};
use crate::result::{update_diff_install_status, write_installer_result};
use crate::setup_patch::update_setup_exe;
use crate::staging::stage;
use crate::uninstall::{uninstall, UninstallRequest};
use crate::InstallLayout;

/// Side effects that reach outside the install root.
pub trait SetupHooks {
    fn launch_product(&mut self, exe: &Path) -> Result<()>;

    fn run_experiment(&mut self, command: &str, status: InstallStatus, version: &Version)
        -> Result<()>;

    fn clear_install_dir(&mut self, root: &Path) -> io::Result<()> {
        install::clear_install_dir(root)
    }

    fn remove_temp(&mut self, path: &Path) -> io::Result<()> {
        remove_path(path)
    }

    fn product_in_use(&mut self, layout: &InstallLayout) -> bool {
        install::product_in_use(layout)
    }
}

/// Hooks that spawn real processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessHooks;

impl SetupHooks for ProcessHooks {
    fn launch_product(&mut self, exe: &Path) -> Result<()> {
        Command::new(exe)
            .arg(FIRST_RUN_SWITCH)
            .spawn()
            .with_context(|| format!("failed to launch {}", exe.display()))?;
        Ok(())
    }

    fn run_experiment(
        &mut self,
        command: &str,
        status: InstallStatus,
        version: &Version,
    ) -> Result<()> {
        let mut parts = command.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| anyhow!("post-install hook command is empty"))?;
        let exit = Command::new(program)
            .args(parts)
            .arg("--status")
            .arg(status.code().to_string())
            .arg("--version")
            .arg(version.to_string())
            .status()
            .with_context(|| format!("failed to run post-install hook: {program}"))?;
        if !exit.success() {
            return Err(anyhow!("post-install hook exited with {exit}"));
        }
        Ok(())
    }
}

pub fn run(
    config: &InstallerConfig,
    registry: &mut dyn Registry,
    hooks: &mut dyn SetupHooks,
) -> InstallStatus {
    let layout = config.roots.layout(config.scope);
    info!(
        operation = config.operation.as_str(),
        scope = config.scope.as_str(),
        root = %layout.root().display(),
        "starting setup"
    );

    let status = match check_install_root(&layout, config.scope) {
        Some(status) => status,
        None => match &config.operation {
            Operation::Install { archive } => guarded(&layout, "install", || {
                run_install(config, &layout, archive, registry, hooks)
            }),
            Operation::Uninstall => guarded(&layout, "uninstall", || {
                run_uninstall(config, &layout, registry, hooks)
            }),
            Operation::RenameExecutables => guarded(&layout, "rename", || {
                run_rename(config.scope, &layout, registry, hooks)
            }),
            Operation::UpdateSetupExe {
                patch,
                current_setup_exe,
                new_setup_exe,
            } => run_setup_patch(
                config.scope,
                &layout,
                patch,
                current_setup_exe,
                new_setup_exe,
                registry,
                hooks,
            ),
        },
    };

    info!(status = status.as_str(), code = status.code(), "setup finished");
    status
}

/// Creating the state dirs doubles as the privilege check for the root.
fn check_install_root(layout: &InstallLayout, scope: Scope) -> Option<InstallStatus> {
    let err = layout.ensure_state_dirs().err()?;
    let denied = err
        .chain()
        .filter_map(|cause| cause.downcast_ref::<io::Error>())
        .any(|cause| cause.kind() == io::ErrorKind::PermissionDenied);
    error!(
        root = %layout.root().display(),
        error = %format!("{err:#}"),
        "install root is not writable"
    );
    Some(if denied && scope.is_system() {
        InstallStatus::InsufficientRights
    } else {
        InstallStatus::OsError
    })
}

/// Runs `operation` while holding the scope's in-progress marker. Once the
/// operation has run, its status is final.
fn guarded<F>(layout: &InstallLayout, operation: &str, run: F) -> InstallStatus
where
    F: FnOnce() -> InstallStatus,
{
    match with_install_marker(layout, operation, |_| Ok(run())) {
        Ok(status) => status,
        Err(err) => {
            error!(error = %format!("{err:#}"), "could not start {operation}");
            if read_install_marker(layout).ok().flatten().is_some() {
                InstallStatus::InstallDirInUse
            } else {
                InstallStatus::OsError
            }
        }
    }
}

struct InstallRun {
    outcome: PipelineOutcome,
    temp_root: Option<PathBuf>,
    incremental: Option<bool>,
}

impl InstallRun {
    fn rejected(status: InstallStatus, temp_root: Option<PathBuf>) -> Self {
        Self {
            outcome: PipelineOutcome::Rejected {
                status,
                message_key: status.as_str(),
            },
            temp_root,
            incremental: None,
        }
    }
}

fn run_install(
    config: &InstallerConfig,
    layout: &InstallLayout,
    archive: &Path,
    registry: &mut dyn Registry,
    hooks: &mut dyn SetupHooks,
) -> InstallStatus {
    let run = install_pipeline(config, layout, archive, registry, hooks);
    let decision = decide(&run.outcome, config);

    publish_result(registry, config.scope, &decision);
    perform_follow_ups(config, registry, hooks, &decision);
    if let Some(incremental) = run.incremental {
        if let Err(err) = update_diff_install_status(registry, config.scope, incremental, decision.status)
        {
            warn!(error = %format!("{err:#}"), "failed to update differential install status");
        }
    }

    let mut leftovers: Vec<PathBuf> = run.temp_root.into_iter().collect();
    leftovers.extend(config.installer_data.iter().cloned());
    cleanup(layout, &leftovers, hooks);
    decision.status
}

fn install_pipeline(
    config: &InstallerConfig,
    layout: &InstallLayout,
    archive: &Path,
    registry: &mut dyn Registry,
    hooks: &mut dyn SetupHooks,
) -> InstallRun {
    let scope = config.scope;
    let snapshot = match InstalledSnapshot::capture(registry, &config.roots, scope) {
        Ok(snapshot) => snapshot,
        Err(err) => {
            error!(error = %format!("{err:#}"), "failed to read installed versions");
            return InstallRun::rejected(InstallStatus::OsError, None);
        }
    };

    match resolve(&snapshot, scope, layout.root(), |root| {
        hooks.clear_install_dir(root)
    }) {
        Resolution::FreshInstall => info!("no installed version found, installing fresh"),
        Resolution::Upgrade(version) => info!(installed = %version, "found installed version"),
        Resolution::LaunchExisting { exe } => {
            return InstallRun {
                outcome: PipelineOutcome::ExistingLaunched { exe },
                temp_root: None,
                incremental: None,
            };
        }
        Resolution::ScopeConflict(status) => return InstallRun::rejected(status, None),
        Resolution::InstallDirInUse => {
            return InstallRun::rejected(InstallStatus::InstallDirInUse, None);
        }
    }

    let temp_root = match make_tmp_dir(layout, "install") {
        Ok(dir) => dir,
        Err(err) => {
            error!(error = %format!("{err:#}"), "could not create temporary path");
            return InstallRun::rejected(InstallStatus::TempDirFailed, None);
        }
    };

    let installed = snapshot.requested.as_ref();
    let staged = match stage(archive, installed, &temp_root) {
        Ok(staged) => staged,
        Err(err) => {
            error!(error = %err, "failed to stage archive");
            return InstallRun {
                outcome: PipelineOutcome::Rejected {
                    status: err.status(),
                    message_key: err.message_key(),
                },
                temp_root: Some(temp_root),
                incremental: Some(err.is_incremental()),
            };
        }
    };
    let incremental = Some(staged.is_incremental());
    let installed_version = installed.map(|state| &state.version);

    if let Some(installed) = installed_version {
        if check_candidate(Some(installed), &staged.version).is_some() {
            return InstallRun {
                outcome: PipelineOutcome::Downgrade {
                    installed: installed.clone(),
                    candidate: staged.version.clone(),
                },
                temp_root: Some(temp_root),
                incremental,
            };
        }
    }

    let rename_command = rename_command(scope);
    let backup_root = temp_root.join("backup");
    let request = InstallRequest {
        scope,
        layout,
        staged: &staged,
        installed: installed_version,
        product_in_use: hooks.product_in_use(layout),
        rename_command: &rename_command,
        backup_root: &backup_root,
    };
    let result = install_or_update(registry, &request);

    InstallRun {
        outcome: PipelineOutcome::Executed {
            result,
            version: staged.version.clone(),
            product_exe: (!layout.root().as_os_str().is_empty()).then(|| layout.product_exe()),
        },
        temp_root: Some(temp_root),
        incremental,
    }
}

fn rename_command(scope: Scope) -> String {
    let setup_exe =
        std::env::current_exe().unwrap_or_else(|_| PathBuf::from("stagehand-setup"));
    let mut command = format!("\"{}\" {RENAME_EXE_SWITCH}", setup_exe.display());
    if scope.is_system() {
        command.push_str(" --system-level");
    }
    command
}

fn publish_result(registry: &mut dyn Registry, scope: Scope, decision: &Decision) {
    if let Err(err) = write_installer_result(
        registry,
        scope,
        decision.status,
        decision.message_key,
        decision.launch_command.as_deref(),
    ) {
        warn!(error = %format!("{err:#}"), "failed to write installer result");
    }
}

fn perform_follow_ups(
    config: &InstallerConfig,
    registry: &mut dyn Registry,
    hooks: &mut dyn SetupHooks,
    decision: &Decision,
) {
    for follow_up in &decision.follow_ups {
        match follow_up {
            FollowUp::LaunchProduct { exe } => {
                if let Err(err) = hooks.launch_product(exe) {
                    warn!(error = %format!("{err:#}"), "failed to launch product");
                }
            }
            FollowUp::RemoveLegacyKeys => {
                for key in LEGACY_KEYS {
                    if let Err(err) = registry.delete_key(config.scope, key) {
                        warn!(key, error = %format!("{err:#}"), "failed to remove legacy key");
                    }
                }
            }
            FollowUp::RunExperiment { status, version } => {
                let Some(command) = config.post_install_hook.as_deref() else {
                    continue;
                };
                if let Err(err) = hooks.run_experiment(command, *status, version) {
                    warn!(error = %format!("{err:#}"), "post-install hook failed");
                }
            }
        }
    }
}

fn cleanup(layout: &InstallLayout, paths: &[PathBuf], hooks: &mut dyn SetupHooks) {
    cleanup_temp_paths_with(
        paths,
        |path| hooks.remove_temp(path),
        |path| schedule_for_deletion(layout, path),
    );
}

fn run_uninstall(
    config: &InstallerConfig,
    layout: &InstallLayout,
    registry: &mut dyn Registry,
    hooks: &mut dyn SetupHooks,
) -> InstallStatus {
    let installed = match read_installed_state(registry, config.scope, layout.root()) {
        Ok(installed) => installed,
        Err(err) => {
            error!(error = %format!("{err:#}"), "failed to read installed version");
            return InstallStatus::OsError;
        }
    };
    let temp_root = match make_tmp_dir(layout, "uninstall") {
        Ok(dir) => dir,
        Err(err) => {
            error!(error = %format!("{err:#}"), "could not create temporary path");
            return InstallStatus::TempDirFailed;
        }
    };

    let backup_root = temp_root.join("backup");
    let request = UninstallRequest {
        scope: config.scope,
        layout,
        installed: installed.as_ref(),
        force: config.force_uninstall,
        product_in_use: hooks.product_in_use(layout),
        backup_root: &backup_root,
    };
    let status = uninstall(registry, &request);
    cleanup(layout, &[temp_root], hooks);
    status
}

fn run_rename(
    scope: Scope,
    layout: &InstallLayout,
    registry: &mut dyn Registry,
    hooks: &mut dyn SetupHooks,
) -> InstallStatus {
    let temp_root = match make_tmp_dir(layout, "rename") {
        Ok(dir) => dir,
        Err(err) => {
            error!(error = %format!("{err:#}"), "could not create temporary path");
            return InstallStatus::RenameFailed;
        }
    };
    let status = rename_executables(registry, layout, scope, &temp_root.join("backup"));
    cleanup(layout, &[temp_root], hooks);
    status
}

fn run_setup_patch(
    scope: Scope,
    layout: &InstallLayout,
    patch: &Path,
    current_setup_exe: &Path,
    new_setup_exe: &Path,
    registry: &mut dyn Registry,
    hooks: &mut dyn SetupHooks,
) -> InstallStatus {
    let temp_root = match make_tmp_dir(layout, "setup-patch") {
        Ok(dir) => dir,
        Err(err) => {
            error!(error = %format!("{err:#}"), "could not create temporary path");
            return InstallStatus::TempDirFailed;
        }
    };
    let status = update_setup_exe(patch, current_setup_exe, new_setup_exe, &temp_root);
    if let Err(err) = write_installer_result(registry, scope, status, status.as_str(), None) {
        warn!(error = %format!("{err:#}"), "failed to write installer result");
    }
    cleanup(layout, &[temp_root], hooks);
    status
}
