use anyhow::{Context, Result};
use stagehand_core::{
    Scope, Version, FULL_ARCHIVE, INSTALLER_DIR, PRODUCT_EXE, PRODUCT_NEW_EXE, PRODUCT_OLD_EXE,
};
use std::fs;
use std::path::{Path, PathBuf};

/// On-disk layout of one scope's installation root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallLayout {
    root: PathBuf,
}

impl InstallLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn version_dir(&self, version: &Version) -> PathBuf {
        self.root.join(version.to_string())
    }

    pub fn installer_dir(&self, version: &Version) -> PathBuf {
        self.version_dir(version).join(INSTALLER_DIR)
    }

    pub fn archive_cache_path(&self, version: &Version) -> PathBuf {
        self.installer_dir(version).join(FULL_ARCHIVE)
    }

    pub fn product_exe(&self) -> PathBuf {
        self.root.join(PRODUCT_EXE)
    }

    pub fn product_old_exe(&self) -> PathBuf {
        self.root.join(PRODUCT_OLD_EXE)
    }

    pub fn product_new_exe(&self) -> PathBuf {
        self.root.join(PRODUCT_NEW_EXE)
    }

    /// Lock file held by a running product instance.
    pub fn product_lock_path(&self) -> PathBuf {
        self.root.join(format!("{PRODUCT_EXE}.lock"))
    }

    pub fn state_dir(&self) -> PathBuf {
        self.root.join("state")
    }

    pub fn registry_hive_path(&self) -> PathBuf {
        self.state_dir().join("registry.json")
    }

    pub fn pending_deletes_path(&self) -> PathBuf {
        self.state_dir().join("pending-deletes")
    }

    pub fn tmp_state_dir(&self) -> PathBuf {
        self.state_dir().join("tmp")
    }

    pub fn install_marker_path(&self) -> PathBuf {
        self.state_dir().join("active")
    }

    pub fn run_record_path(&self, txid: &str) -> PathBuf {
        self.state_dir().join("runs").join(format!("{txid}.json"))
    }

    pub fn ensure_state_dirs(&self) -> Result<()> {
        for dir in [self.state_dir(), self.tmp_state_dir()] {
            fs::create_dir_all(&dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        Ok(())
    }
}

/// Installation roots for both scopes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallRoots {
    pub system: PathBuf,
    pub user: PathBuf,
}

impl InstallRoots {
    pub fn layout(&self, scope: Scope) -> InstallLayout {
        match scope {
            Scope::System => InstallLayout::new(&self.system),
            Scope::User => InstallLayout::new(&self.user),
        }
    }
}

pub fn default_user_root() -> Result<PathBuf> {
    if cfg!(windows) {
        let app_data = std::env::var("LOCALAPPDATA")
            .context("LOCALAPPDATA is not set; cannot resolve Windows user install root")?;
        return Ok(PathBuf::from(app_data).join("Stagehand").join("Application"));
    }

    let home = std::env::var("HOME").context("HOME is not set; cannot resolve user install root")?;
    Ok(PathBuf::from(home).join(".local").join("share").join("stagehand"))
}

pub fn default_system_root() -> Result<PathBuf> {
    if cfg!(windows) {
        let program_files = std::env::var("ProgramFiles")
            .context("ProgramFiles is not set; cannot resolve Windows system install root")?;
        return Ok(PathBuf::from(program_files)
            .join("Stagehand")
            .join("Application"));
    }

    Ok(PathBuf::from("/opt/stagehand"))
}
