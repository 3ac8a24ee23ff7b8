//! Turns an incoming payload into an unpacked product tree.
//!
//! Staging runs in three separately failing steps: decompress the outer
//! `.tar.zst`, rebuild the full archive from a differential patch when the
//! payload carries one, then unpack the full archive. The full archive is
//! then filed under the staged version's `Installer/` dir so that the staged
//! version tree matches the installed one byte for byte. Nothing outside the
//! temp root is modified.

use stagehand_core::{
    InstallStatus, PayloadKind, Version, FULL_ARCHIVE, INSTALL_SOURCE_DIR,
    INSTALL_SOURCE_PRODUCT_DIR, PATCH_ARCHIVE,
};
use std::fs;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

use crate::fs_utils::{move_path_or_copy, path_exists, remove_path};
use crate::resolver::InstalledState;
use crate::InstallLayout;

pub const PATCH_ERROR_BASE_UNREADABLE: i32 = 1;
pub const PATCH_ERROR_PATCH_UNREADABLE: i32 = 2;
pub const PATCH_ERROR_APPLY_FAILED: i32 = 3;
pub const PATCH_ERROR_OUTPUT_FAILED: i32 = 4;

#[derive(Debug, Error)]
pub enum StageError {
    #[error("failed to decompress {}: {detail}", archive.display())]
    Uncompression { archive: PathBuf, detail: String },
    #[error("cannot apply a differential patch: the product is not installed")]
    NotInstalled,
    #[error("cannot apply a differential patch: base archive missing at {}", path.display())]
    MissingBaseArchive { path: PathBuf },
    #[error("binary patching failed with error {code}: {detail}")]
    Patch { code: i32, detail: String },
    #[error("failed to unpack {}: {detail}", archive.display())]
    Unpack { archive: PathBuf, detail: String },
    #[error("no valid version found in {}", source_dir.display())]
    InvalidArchive { source_dir: PathBuf },
}

impl StageError {
    pub fn status(&self) -> InstallStatus {
        match self {
            Self::NotInstalled => InstallStatus::ProductNotInstalled,
            Self::InvalidArchive { .. } => InstallStatus::InvalidArchive,
            Self::Uncompression { .. }
            | Self::MissingBaseArchive { .. }
            | Self::Patch { .. }
            | Self::Unpack { .. } => InstallStatus::UncompressionFailed,
        }
    }

    /// Whether staging had already switched to the differential path.
    pub fn is_incremental(&self) -> bool {
        matches!(
            self,
            Self::NotInstalled | Self::MissingBaseArchive { .. } | Self::Patch { .. }
        )
    }

    /// Message key shown to the user; it separates causes that share a status.
    pub fn message_key(&self) -> &'static str {
        match self {
            Self::Uncompression { .. } | Self::Unpack { .. } => "uncompression_failed",
            Self::NotInstalled => "product_not_installed",
            Self::MissingBaseArchive { .. } => "patch_base_missing",
            Self::Patch { .. } => "patch_failed",
            Self::InvalidArchive { .. } => "invalid_archive",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedPayload {
    /// `source/App-bin` inside the temp root.
    pub source_dir: PathBuf,
    /// Full archive, already placed inside the staged version tree where
    /// the next differential update looks for its base.
    pub full_archive: PathBuf,
    pub version: Version,
    pub kind: PayloadKind,
}

impl StagedPayload {
    pub fn version_source_dir(&self) -> PathBuf {
        self.source_dir.join(self.version.to_string())
    }

    pub fn is_incremental(&self) -> bool {
        self.kind.is_incremental()
    }
}

pub fn stage(
    archive: &Path,
    installed: Option<&InstalledState>,
    temp_root: &Path,
) -> Result<StagedPayload, StageError> {
    let payload_dir = decompress_payload(archive, temp_root)?;

    let rebuilt_archive = temp_root.join(FULL_ARCHIVE);
    let shipped_full = payload_dir.join(FULL_ARCHIVE);
    let kind = if path_exists(&shipped_full) {
        move_path_or_copy(&shipped_full, &rebuilt_archive).map_err(|err| {
            StageError::Uncompression {
                archive: archive.to_path_buf(),
                detail: format!("{err:#}"),
            }
        })?;
        PayloadKind::Full
    } else {
        info!("differential patch found, applying to existing archive");
        let Some(installed) = installed else {
            warn!("cannot use a differential update when the product is not installed");
            return Err(StageError::NotInstalled);
        };
        let base = InstallLayout::new(&installed.root).archive_cache_path(&installed.version);
        if !base.is_file() {
            return Err(StageError::MissingBaseArchive { path: base });
        }
        apply_diff_patch(&base, &payload_dir.join(PATCH_ARCHIVE), &rebuilt_archive)?;
        PayloadKind::DifferentialPatch
    };

    let unpack_dir = temp_root.join(INSTALL_SOURCE_DIR);
    unpack_tar(&rebuilt_archive, &unpack_dir)?;

    let source_dir = unpack_dir.join(INSTALL_SOURCE_PRODUCT_DIR);
    let version = version_from_dir(&source_dir)
        .ok_or_else(|| StageError::InvalidArchive {
            source_dir: source_dir.clone(),
        })?;
    let full_archive = InstallLayout::new(&source_dir).archive_cache_path(&version);
    file_archive(&rebuilt_archive, &full_archive)?;
    info!(version = %version, kind = kind.as_str(), "staged payload");

    Ok(StagedPayload {
        source_dir,
        full_archive,
        version,
        kind,
    })
}

/// Decompresses a `.tar.zst` into `temp_root/payload`. On failure the
/// partial output is removed and nothing is left behind.
pub fn decompress_payload(archive: &Path, temp_root: &Path) -> Result<PathBuf, StageError> {
    let partial = temp_root.join("payload-partial");
    let done = temp_root.join("payload");
    let result = (|| -> anyhow::Result<()> {
        use anyhow::Context;
        fs::create_dir_all(&partial)
            .with_context(|| format!("failed to create {}", partial.display()))?;
        let file = fs::File::open(archive)
            .with_context(|| format!("failed to open {}", archive.display()))?;
        let decoder = zstd::Decoder::new(file).context("failed to start zstd stream")?;
        tar::Archive::new(decoder)
            .unpack(&partial)
            .context("failed to extract decompressed payload")?;
        fs::rename(&partial, &done)
            .with_context(|| format!("failed to finalize {}", done.display()))?;
        Ok(())
    })();

    if let Err(err) = result {
        let _ = remove_path(&partial);
        return Err(StageError::Uncompression {
            archive: archive.to_path_buf(),
            detail: format!("{err:#}"),
        });
    }
    Ok(done)
}

/// Rebuilds `output` from `base` plus a bsdiff delta.
pub fn apply_diff_patch(base: &Path, patch: &Path, output: &Path) -> Result<(), StageError> {
    let old = fs::read(base).map_err(|err| StageError::Patch {
        code: PATCH_ERROR_BASE_UNREADABLE,
        detail: format!("{}: {err}", base.display()),
    })?;
    let patch_file = fs::File::open(patch).map_err(|err| StageError::Patch {
        code: PATCH_ERROR_PATCH_UNREADABLE,
        detail: format!("{}: {err}", patch.display()),
    })?;

    let mut reader = BufReader::new(patch_file);
    let mut rebuilt = Vec::new();
    bsdiff::patch(&old, &mut reader, &mut rebuilt).map_err(|err| StageError::Patch {
        code: PATCH_ERROR_APPLY_FAILED,
        detail: err.to_string(),
    })?;

    fs::write(output, rebuilt).map_err(|err| {
        let _ = remove_path(output);
        StageError::Patch {
            code: PATCH_ERROR_OUTPUT_FAILED,
            detail: format!("{}: {err}", output.display()),
        }
    })
}

fn file_archive(archive: &Path, destination: &Path) -> Result<(), StageError> {
    move_path_or_copy(archive, destination).map_err(|err| StageError::Unpack {
        archive: archive.to_path_buf(),
        detail: format!("{err:#}"),
    })
}

fn unpack_tar(archive: &Path, destination: &Path) -> Result<(), StageError> {
    let result = (|| -> anyhow::Result<()> {
        use anyhow::Context;
        fs::create_dir_all(destination)
            .with_context(|| format!("failed to create {}", destination.display()))?;
        let file = fs::File::open(archive)
            .with_context(|| format!("failed to open {}", archive.display()))?;
        tar::Archive::new(file)
            .unpack(destination)
            .context("failed to extract full archive")?;
        Ok(())
    })();

    result.map_err(|err| {
        let _ = remove_path(destination);
        StageError::Unpack {
            archive: archive.to_path_buf(),
            detail: format!("{err:#}"),
        }
    })
}

/// Highest version among the version-named directories of `dir`.
pub fn version_from_dir(dir: &Path) -> Option<Version> {
    fs::read_dir(dir)
        .ok()?
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().map(|kind| kind.is_dir()).unwrap_or(false))
        .filter_map(|entry| entry.file_name().to_str().and_then(version_dir_name))
        .max()
}

/// Parses a directory name that spells a version exactly the way
/// [`InstallLayout::version_dir`] would; `1.0.0.01` or ` 1.0.0.1` do not.
pub fn version_dir_name(name: &str) -> Option<Version> {
    Version::parse(name)
        .ok()
        .filter(|version| version.to_string() == name)
}
