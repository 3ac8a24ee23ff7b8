use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::InstallLayout;

/// Removes a file, symlink or directory tree. A missing path is not an error.
pub fn remove_path(path: &Path) -> io::Result<()> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err),
    };
    if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

pub fn path_exists(path: &Path) -> bool {
    fs::symlink_metadata(path).is_ok()
}

/// Creates a fresh, uniquely named directory under the scope's tmp dir.
pub fn make_tmp_dir(layout: &InstallLayout, prefix: &str) -> Result<PathBuf> {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system time is before unix epoch")?
        .as_nanos();
    let dir = layout
        .tmp_state_dir()
        .join(format!("{}-{}-{}", prefix, std::process::id(), nanos));
    fs::create_dir_all(&dir)
        .with_context(|| format!("failed creating tmp dir: {}", dir.display()))?;
    Ok(dir)
}

pub(crate) fn move_path_or_copy(src: &Path, dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    match fs::rename(src, dst) {
        Ok(_) => Ok(()),
        Err(_) => {
            copy_path(src, dst)?;
            remove_path(src)
                .with_context(|| format!("failed to remove moved source: {}", src.display()))?;
            Ok(())
        }
    }
}

/// Copies a file or a directory tree to `dst`.
pub(crate) fn copy_path(src: &Path, dst: &Path) -> Result<()> {
    let metadata =
        fs::symlink_metadata(src).with_context(|| format!("failed to stat {}", src.display()))?;
    if metadata.is_dir() {
        return copy_dir_recursive(src, dst);
    }

    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    copy_entry(src, dst, &metadata)
}

pub(crate) fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst).with_context(|| format!("failed to create {}", dst.display()))?;
    for entry in fs::read_dir(src).with_context(|| format!("failed to read {}", src.display()))? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());
        let metadata = fs::symlink_metadata(&src_path)
            .with_context(|| format!("failed to stat {}", src_path.display()))?;
        if metadata.is_dir() {
            copy_dir_recursive(&src_path, &dst_path)?;
            continue;
        }
        copy_entry(&src_path, &dst_path, &metadata)?;
    }
    Ok(())
}

fn copy_entry(src: &Path, dst: &Path, metadata: &fs::Metadata) -> Result<()> {
    #[cfg(unix)]
    if metadata.file_type().is_symlink() {
        let target =
            fs::read_link(src).with_context(|| format!("failed to read symlink {}", src.display()))?;
        std::os::unix::fs::symlink(&target, dst).with_context(|| {
            format!(
                "failed to create symlink {} -> {}",
                dst.display(),
                target.display()
            )
        })?;
        return Ok(());
    }
    #[cfg(not(unix))]
    let _ = metadata;

    fs::copy(src, dst)
        .with_context(|| format!("failed to copy {} to {}", src.display(), dst.display()))?;
    Ok(())
}

/// SHA-256 over a file or tree: relative paths, entry kinds and contents.
pub fn tree_digest(path: &Path) -> Result<String> {
    let mut hasher = Sha256::new();
    let metadata =
        fs::symlink_metadata(path).with_context(|| format!("failed to stat {}", path.display()))?;
    if metadata.is_dir() {
        hasher.update(b"dir\0");
        digest_dir(path, path, &mut hasher)?;
    } else {
        digest_entry(path, Path::new(""), &metadata, &mut hasher)?;
    }
    Ok(hex::encode(hasher.finalize()))
}

fn digest_dir(root: &Path, current: &Path, hasher: &mut Sha256) -> Result<()> {
    let mut entries = fs::read_dir(current)
        .with_context(|| format!("failed to read {}", current.display()))?
        .collect::<io::Result<Vec<_>>>()
        .with_context(|| format!("failed to list {}", current.display()))?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let path = entry.path();
        let rel = path
            .strip_prefix(root)
            .with_context(|| format!("failed to relativize {}", path.display()))?;
        let metadata = fs::symlink_metadata(&path)
            .with_context(|| format!("failed to stat {}", path.display()))?;
        if metadata.is_dir() {
            hasher.update(b"dir\0");
            hasher.update(rel.to_string_lossy().as_bytes());
            hasher.update(b"\0");
            digest_dir(root, &path, hasher)?;
            continue;
        }
        digest_entry(&path, rel, &metadata, hasher)?;
    }
    Ok(())
}

fn digest_entry(path: &Path, rel: &Path, metadata: &fs::Metadata, hasher: &mut Sha256) -> Result<()> {
    if metadata.file_type().is_symlink() {
        let target =
            fs::read_link(path).with_context(|| format!("failed to read symlink {}", path.display()))?;
        hasher.update(b"link\0");
        hasher.update(rel.to_string_lossy().as_bytes());
        hasher.update(b"\0");
        hasher.update(target.to_string_lossy().as_bytes());
        hasher.update(b"\0");
        return Ok(());
    }

    let mut file =
        fs::File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    hasher.update(b"file\0");
    hasher.update(rel.to_string_lossy().as_bytes());
    hasher.update(b"\0");
    hasher.update(metadata.len().to_le_bytes());
    io::copy(&mut file, hasher).with_context(|| format!("failed to hash {}", path.display()))?;
    Ok(())
}

/// Whether two paths hold identical content. Missing paths never match.
pub fn same_content(left: &Path, right: &Path) -> Result<bool> {
    if !path_exists(left) || !path_exists(right) {
        return Ok(false);
    }
    let left_is_dir = fs::symlink_metadata(left)?.is_dir();
    let right_is_dir = fs::symlink_metadata(right)?.is_dir();
    if left_is_dir != right_is_dir {
        return Ok(false);
    }
    Ok(tree_digest(left)? == tree_digest(right)?)
}
