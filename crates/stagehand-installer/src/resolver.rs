use anyhow::Result;
use stagehand_core::{InstallStatus, Scope, Version, VERSION_KEY, VERSION_VALUE};
use std::io;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::fs_utils::path_exists;
use crate::registry::Registry;
use crate::{InstallLayout, InstallRoots};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledState {
    pub version: Version,
    pub root: PathBuf,
}

impl InstalledState {
    pub fn layout(&self) -> InstallLayout {
        InstallLayout::new(&self.root)
    }
}

/// Installation state of both scopes, captured once before anything runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstalledSnapshot {
    pub requested: Option<InstalledState>,
    pub other: Option<InstalledState>,
}

impl InstalledSnapshot {
    pub fn capture(registry: &dyn Registry, roots: &InstallRoots, scope: Scope) -> Result<Self> {
        Ok(Self {
            requested: read_installed_state(registry, scope, roots.layout(scope).root())?,
            other: read_installed_state(registry, scope.other(), roots.layout(scope.other()).root())?,
        })
    }
}

/// Reads the `pv` marker of `scope`. An unparseable marker is treated as no
/// installation.
pub fn read_installed_state(
    registry: &dyn Registry,
    scope: Scope,
    root: &Path,
) -> Result<Option<InstalledState>> {
    let Some(value) = registry.read_value(scope, VERSION_KEY, VERSION_VALUE)? else {
        return Ok(None);
    };
    let Some(raw) = value.as_string() else {
        warn!(scope = scope.as_str(), "version marker is not a string, ignoring");
        return Ok(None);
    };
    match Version::parse(raw) {
        Ok(version) => Ok(Some(InstalledState {
            version,
            root: root.to_path_buf(),
        })),
        Err(err) => {
            warn!(scope = scope.as_str(), marker = raw, error = %err, "ignoring invalid version marker");
            Ok(None)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    FreshInstall,
    Upgrade(Version),
    /// User-level first install while a system install exists: hand over to
    /// the existing product instead of installing.
    LaunchExisting { exe: PathBuf },
    ScopeConflict(InstallStatus),
    InstallDirInUse,
}

pub fn resolve<F>(
    snapshot: &InstalledSnapshot,
    scope: Scope,
    target_dir: &Path,
    mut remove_dir: F,
) -> Resolution
where
    F: FnMut(&Path) -> io::Result<()>,
{
    let is_first_install = snapshot.requested.is_none();

    if let Some(other) = &snapshot.other {
        error!(
            version = %other.version,
            scope = scope.as_str(),
            "already installed version conflicts with the requested install scope"
        );
        if scope == Scope::User && is_first_install {
            return Resolution::LaunchExisting {
                exe: other.layout().product_exe(),
            };
        }
        return Resolution::ScopeConflict(match scope {
            Scope::System => InstallStatus::UserLevelInstallExists,
            Scope::User => InstallStatus::SystemLevelInstallExists,
        });
    }

    match &snapshot.requested {
        Some(installed) => Resolution::Upgrade(installed.version.clone()),
        None => {
            if path_exists(target_dir) {
                if let Err(err) = remove_dir(target_dir) {
                    error!(
                        path = %target_dir.display(),
                        error = %err,
                        "installation directory exists and can not be deleted"
                    );
                    return Resolution::InstallDirInUse;
                }
                info!(path = %target_dir.display(), "cleared stale installation directory");
            }
            Resolution::FreshInstall
        }
    }
}

/// Refuses any candidate older than what is installed.
pub fn check_candidate(installed: Option<&Version>, candidate: &Version) -> Option<InstallStatus> {
    let installed = installed?;
    if installed.is_higher_than(candidate) {
        error!(
            installed = %installed,
            candidate = %candidate,
            "higher version is already installed"
        );
        return Some(InstallStatus::HigherVersionExists);
    }
    None
}
