use stagehand_core::InstallStatus;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

use crate::staging::{apply_diff_patch, decompress_payload, StageError};

/// Rebuilds a newer setup executable from the running one plus a patch
/// archive. The decompressed patch lives under `temp_root`, which the caller
/// removes.
pub fn update_setup_exe(
    patch_archive: &Path,
    current_setup_exe: &Path,
    new_setup_exe: &Path,
    temp_root: &Path,
) -> InstallStatus {
    match patch_setup_exe(patch_archive, current_setup_exe, new_setup_exe, temp_root) {
        Ok(()) => {
            info!(path = %new_setup_exe.display(), "setup executable patched");
            InstallStatus::NewVersionUpdated
        }
        Err(err) => {
            error!(error = %err, "failed to patch setup executable");
            InstallStatus::SetupPatchFailed
        }
    }
}

fn patch_setup_exe(
    patch_archive: &Path,
    current_setup_exe: &Path,
    new_setup_exe: &Path,
    temp_root: &Path,
) -> Result<(), StageError> {
    let payload_dir = decompress_payload(patch_archive, temp_root)?;
    let patch = single_file_in(&payload_dir).ok_or_else(|| StageError::InvalidArchive {
        source_dir: payload_dir.clone(),
    })?;
    apply_diff_patch(current_setup_exe, &patch, new_setup_exe)
}

fn single_file_in(dir: &Path) -> Option<PathBuf> {
    let mut files = fs::read_dir(dir)
        .ok()?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_file());
    let first = files.next()?;
    files.next().is_none().then_some(first)
}
