use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use stagehand_core::{InstallStatus, InstallerPreferences, Scope, COMPRESSED_ARCHIVE};
use stagehand_installer::{
    file_registry, load_preferences, process_pending_deletions, requested_scope, resolve_roots,
    run, write_installer_result, ConfigOverrides, InstallerConfig, Operation, ProcessHooks,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::completion::write_completions_script;
use crate::render::{current_output_style, format_status_line, render_status_line};
use crate::{Cli, Commands, GlobalArgs};

/// Status for a run that failed before any setup operation could report one.
pub(crate) const EARLY_FAILURE_STATUS: InstallStatus = InstallStatus::OsError;

/// Runs the parsed command and returns the process exit code.
pub(crate) fn run_cli(cli: Cli) -> Result<i32> {
    let Cli { global, command } = cli;

    if let Commands::Completions { shell } = command {
        write_completions_script(shell, &mut std::io::stdout().lock())?;
        return Ok(0);
    }

    let (preferences, preferences_error) = match global.installer_data.as_deref() {
        Some(path) => match load_preferences(path) {
            Ok(preferences) => (preferences, None),
            Err(err) => (InstallerPreferences::default(), Some(err)),
        },
        None => (InstallerPreferences::default(), None),
    };
    let verbose =
        global.verbose_logging || preferences.distribution.verbose_logging.unwrap_or(false);
    init_tracing(verbose, global.log_file.as_deref());
    if let Some(err) = preferences_error {
        warn!(error = %format!("{err:#}"), "ignoring unreadable installer data");
    }

    let overrides = config_overrides(&global, &command);
    let operation = match operation_for(command) {
        Ok(Some(operation)) => operation,
        Ok(None) => return process_pending(&overrides),
        Err(err) => return Err(record_early_failure(err, &overrides, &preferences)),
    };

    let config = InstallerConfig::resolve(operation, &overrides, &preferences)
        .map_err(|err| record_early_failure(err, &overrides, &preferences))?;
    let mut registry = file_registry(&config.roots);
    let status = run(&config, &mut registry, &mut ProcessHooks);

    let style = current_output_style();
    let tone = if status.is_success() { "ok" } else { "err" };
    println!(
        "{}",
        render_status_line(style, tone, &format_status_line(&config, status))
    );
    Ok(status.return_code())
}

pub(crate) fn config_overrides(global: &GlobalArgs, command: &Commands) -> ConfigOverrides {
    let mut overrides = ConfigOverrides {
        system_level: global.system_level,
        verbose_logging: global.verbose_logging,
        installer_data: global.installer_data.clone(),
        system_root: global.system_root.clone(),
        user_root: global.user_root.clone(),
        ..ConfigOverrides::default()
    };
    match command {
        Commands::Install {
            do_not_launch,
            do_not_register_for_update_launch,
            ..
        } => {
            overrides.do_not_launch = *do_not_launch;
            overrides.do_not_register_for_update_launch = *do_not_register_for_update_launch;
        }
        Commands::Uninstall { force_uninstall } => overrides.force_uninstall = *force_uninstall,
        _ => {}
    }
    overrides
}

/// Publishes [`EARLY_FAILURE_STATUS`] for the requested scope when its root
/// can still be found, then hands `err` back.
pub(crate) fn record_early_failure(
    err: anyhow::Error,
    overrides: &ConfigOverrides,
    preferences: &InstallerPreferences,
) -> anyhow::Error {
    let scope = requested_scope(overrides, preferences);
    let status = EARLY_FAILURE_STATUS;
    match resolve_roots(overrides) {
        Ok(roots) => {
            let mut registry = file_registry(&roots);
            if let Err(write_err) =
                write_installer_result(&mut registry, scope, status, status.as_str(), None)
            {
                warn!(error = %format!("{write_err:#}"), "failed to write installer result");
            }
        }
        Err(roots_err) => {
            warn!(error = %format!("{roots_err:#}"), "installer result not written");
        }
    }
    err
}

/// `None` for commands that do not run a setup operation.
pub(crate) fn operation_for(command: Commands) -> Result<Option<Operation>> {
    let operation = match command {
        Commands::Install {
            install_archive, ..
        } => Operation::Install {
            archive: match install_archive {
                Some(archive) => archive,
                None => default_install_archive()?,
            },
        },
        Commands::Uninstall { .. } => Operation::Uninstall,
        Commands::RenameExecutables => Operation::RenameExecutables,
        Commands::UpdateSetupExe {
            patch,
            new_setup_exe,
        } => Operation::UpdateSetupExe {
            patch,
            current_setup_exe: std::env::current_exe()
                .context("failed to locate the running setup executable")?,
            new_setup_exe,
        },
        Commands::ProcessPendingDeletes | Commands::Completions { .. } => return Ok(None),
    };
    Ok(Some(operation))
}

/// The packed archive shipped next to the setup executable.
fn default_install_archive() -> Result<PathBuf> {
    let exe = std::env::current_exe().context("failed to locate the running setup executable")?;
    let dir = exe
        .parent()
        .context("setup executable has no parent directory")?;
    Ok(dir.join(COMPRESSED_ARCHIVE))
}

fn process_pending(overrides: &ConfigOverrides) -> Result<i32> {
    let roots = resolve_roots(overrides)?;
    let style = current_output_style();
    let mut remaining_total = 0;
    for scope in [Scope::System, Scope::User] {
        let layout = roots.layout(scope);
        let remaining = process_pending_deletions(&layout).with_context(|| {
            format!("failed to process pending deletes under {}", layout.root().display())
        })?;
        for path in &remaining {
            println!(
                "{}",
                render_status_line(style, "warn", &format!("still pending: {}", path.display()))
            );
        }
        remaining_total += remaining.len();
    }
    info!(remaining = remaining_total, "processed pending deletes");
    Ok(0)
}

fn default_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "info" } else { "warn" }))
}

fn init_tracing(verbose: bool, log_file: Option<&Path>) {
    if let Some(path) = log_file {
        match open_log_file(path) {
            Ok(file) => {
                tracing_subscriber::fmt()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file))
                    .with_env_filter(default_filter(verbose))
                    .init();
                return;
            }
            Err(err) => eprintln!("warning: logging to stderr: {err:#}"),
        }
    }

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(default_filter(verbose))
        .init();
}

fn open_log_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create log directory: {}", parent.display()))?;
    }
    File::options()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open log file: {}", path.display()))
}
