use anyhow::{Context, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::fs_utils::{path_exists, remove_path};
use crate::InstallLayout;

pub fn read_pending_deletions(layout: &InstallLayout) -> Result<Vec<PathBuf>> {
    let path = layout.pending_deletes_path();
    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read pending deletes: {}", path.display()));
        }
    };
    Ok(raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(PathBuf::from)
        .collect())
}

fn write_pending_deletions(layout: &InstallLayout, paths: &[PathBuf]) -> Result<()> {
    let path = layout.pending_deletes_path();
    if paths.is_empty() {
        return match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err)
                .with_context(|| format!("failed to clear pending deletes: {}", path.display())),
        };
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let mut content = String::new();
    for entry in paths {
        content.push_str(&entry.to_string_lossy());
        content.push('\n');
    }
    fs::write(&path, content)
        .with_context(|| format!("failed to write pending deletes: {}", path.display()))
}

/// Records `target` for deletion on the next restart. Failures are logged
/// and swallowed; the caller's outcome never depends on them.
pub fn schedule_for_deletion(layout: &InstallLayout, target: &Path) -> bool {
    let result = read_pending_deletions(layout).and_then(|mut pending| {
        if !pending.iter().any(|existing| existing == target) {
            pending.push(target.to_path_buf());
            write_pending_deletions(layout, &pending)?;
        }
        Ok(())
    });

    match result {
        Ok(()) => {
            info!(path = %target.display(), "scheduled for deletion on restart");
            true
        }
        Err(err) => {
            warn!(
                path = %target.display(),
                error = %format!("{err:#}"),
                "failed to schedule path for deletion"
            );
            false
        }
    }
}

/// Deletes every scheduled path and keeps only those that still fail.
/// Returns the paths left pending.
pub fn process_pending_deletions(layout: &InstallLayout) -> Result<Vec<PathBuf>> {
    let pending = read_pending_deletions(layout)?;
    let mut remaining = Vec::new();
    for path in pending {
        if let Err(err) = remove_path(&path) {
            warn!(path = %path.display(), error = %err, "pending delete still failing");
            remaining.push(path);
        }
    }
    write_pending_deletions(layout, &remaining)?;
    Ok(remaining)
}

/// Removes each path, scheduling the ones that cannot be removed now.
/// Returns the paths that were scheduled.
pub fn cleanup_temp_paths_with<R, S>(paths: &[PathBuf], mut remove: R, mut schedule: S) -> Vec<PathBuf>
where
    R: FnMut(&Path) -> io::Result<()>,
    S: FnMut(&Path) -> bool,
{
    let mut scheduled = Vec::new();
    for path in paths {
        if !path_exists(path) {
            continue;
        }
        if let Err(err) = remove(path) {
            warn!(path = %path.display(), error = %err, "failed to delete temp path");
            schedule(path);
            scheduled.push(path.clone());
        }
    }
    scheduled
}

pub fn cleanup_temp_paths(layout: &InstallLayout, paths: &[PathBuf]) -> Vec<PathBuf> {
    cleanup_temp_paths_with(paths, remove_path, |path| {
        schedule_for_deletion(layout, path)
    })
}
