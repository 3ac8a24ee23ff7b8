use anyhow::{Context, Result};
use stagehand_core::{InstallerPreferences, Scope};
use std::fs;
use std::path::{Path, PathBuf};

use crate::{default_system_root, default_user_root, InstallRoots};

pub const SYSTEM_ROOT_ENV: &str = "STAGEHAND_SYSTEM_ROOT";
pub const USER_ROOT_ENV: &str = "STAGEHAND_USER_ROOT";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Install {
        archive: PathBuf,
    },
    Uninstall,
    RenameExecutables,
    UpdateSetupExe {
        patch: PathBuf,
        current_setup_exe: PathBuf,
        new_setup_exe: PathBuf,
    },
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Install { .. } => "install",
            Self::Uninstall => "uninstall",
            Self::RenameExecutables => "rename-executables",
            Self::UpdateSetupExe { .. } => "update-setup-exe",
        }
    }
}

/// Switches given on the command line. A flag can only switch a setting on;
/// an absent flag defers to the installer-data preferences.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub system_level: bool,
    pub do_not_launch: bool,
    pub do_not_register_for_update_launch: bool,
    pub force_uninstall: bool,
    pub verbose_logging: bool,
    pub installer_data: Option<PathBuf>,
    pub system_root: Option<PathBuf>,
    pub user_root: Option<PathBuf>,
}

/// Everything one setup invocation acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallerConfig {
    pub scope: Scope,
    pub operation: Operation,
    /// Uninstall even when no version marker exists or the product runs.
    pub force_uninstall: bool,
    /// Skip the first-run launch after a fresh user-level install.
    pub do_not_launch: bool,
    /// Do not publish the product as the updater's post-install launch command.
    pub do_not_register_for_update_launch: bool,
    /// Preferences file; removed together with the temp root afterwards.
    pub installer_data: Option<PathBuf>,
    pub verbose_logging: bool,
    pub roots: InstallRoots,
    /// Command run with the final status code and installed version.
    pub post_install_hook: Option<String>,
}

impl InstallerConfig {
    pub fn resolve(
        operation: Operation,
        overrides: &ConfigOverrides,
        preferences: &InstallerPreferences,
    ) -> Result<Self> {
        Self::resolve_with_env(operation, overrides, preferences, |name| {
            std::env::var(name).ok()
        })
    }

    /// Defaults, then preferences, then environment, then command line.
    pub fn resolve_with_env<E>(
        operation: Operation,
        overrides: &ConfigOverrides,
        preferences: &InstallerPreferences,
        env: E,
    ) -> Result<Self>
    where
        E: Fn(&str) -> Option<String>,
    {
        let distribution = &preferences.distribution;

        Ok(Self {
            scope: requested_scope(overrides, preferences),
            operation,
            force_uninstall: overrides.force_uninstall,
            do_not_launch: overrides.do_not_launch || distribution.do_not_launch.unwrap_or(false),
            do_not_register_for_update_launch: overrides.do_not_register_for_update_launch
                || distribution
                    .do_not_register_for_update_launch
                    .unwrap_or(false),
            installer_data: overrides.installer_data.clone(),
            verbose_logging: overrides.verbose_logging
                || distribution.verbose_logging.unwrap_or(false),
            roots: resolve_roots_with_env(overrides, env)?,
            post_install_hook: distribution
                .post_install_hook
                .clone()
                .filter(|hook| !hook.trim().is_empty()),
        })
    }
}

/// The scope a run targets; known even when the rest of the config is not.
pub fn requested_scope(overrides: &ConfigOverrides, preferences: &InstallerPreferences) -> Scope {
    Scope::from_system_level(
        overrides.system_level || preferences.distribution.system_level.unwrap_or(false),
    )
}

/// Install roots alone: command line, then environment, then defaults.
pub fn resolve_roots(overrides: &ConfigOverrides) -> Result<InstallRoots> {
    resolve_roots_with_env(overrides, |name| std::env::var(name).ok())
}

pub fn resolve_roots_with_env<E>(overrides: &ConfigOverrides, env: E) -> Result<InstallRoots>
where
    E: Fn(&str) -> Option<String>,
{
    let pick = |flag: &Option<PathBuf>, var: &str| -> Option<PathBuf> {
        flag.clone().or_else(|| {
            env(var)
                .filter(|value| !value.is_empty())
                .map(PathBuf::from)
        })
    };
    let system = match pick(&overrides.system_root, SYSTEM_ROOT_ENV) {
        Some(root) => root,
        None => default_system_root()?,
    };
    let user = match pick(&overrides.user_root, USER_ROOT_ENV) {
        Some(root) => root,
        None => default_user_root()?,
    };
    Ok(InstallRoots { system, user })
}

pub fn load_preferences(path: &Path) -> Result<InstallerPreferences> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read installer data: {}", path.display()))?;
    InstallerPreferences::from_toml_str(&raw)
        .with_context(|| format!("invalid installer data: {}", path.display()))
}
