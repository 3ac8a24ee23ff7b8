//! Per-scope install-in-progress marker.
//!
//! The marker is a create-new file naming the run that holds it. Each run
//! also keeps a small JSON record (`state/runs/<txid>.json`) with its pid and
//! status, which lets a later run tell a live holder from one that crashed.

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

use crate::InstallLayout;

/// Age after which a marker is reclaimed even when its owner cannot be checked.
pub const STALE_MARKER_AGE_SECS: u64 = 12 * 60 * 60;

const RUN_RECORD_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Applying,
    Completed,
    Failed,
}

impl RunStatus {
    /// A finished run no longer owns its marker.
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub version: u32,
    pub txid: String,
    pub operation: String,
    pub status: RunStatus,
    pub pid: u32,
    pub started_at_unix: u64,
}

impl RunRecord {
    pub fn new(operation: &str, pid: u32, started_at_unix: u64) -> Self {
        Self {
            version: RUN_RECORD_VERSION,
            txid: format!("{operation}-{started_at_unix}-{pid}"),
            operation: operation.to_string(),
            status: RunStatus::Applying,
            pid,
            started_at_unix,
        }
    }
}

/// Claims the scope's marker for `txid`. A marker left behind by a run that
/// finished, or whose process is gone, is reclaimed first.
pub fn claim_install_marker(layout: &InstallLayout, txid: &str) -> Result<PathBuf> {
    let path = layout.install_marker_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    match create_marker(&path) {
        Ok(file) => return write_marker(file, &path, txid),
        Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {}
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to create install marker: {}", path.display()));
        }
    }

    let holder = read_install_marker(layout)?;
    let stale = match holder.as_deref() {
        Some(holder) => holder_is_stale(layout, holder),
        None => marker_age_exceeded(&path),
    };
    if !stale {
        let detail = holder
            .map(|holder| format!(" (txid={holder})"))
            .unwrap_or_default();
        return Err(anyhow!("install marker is held by another run{detail}"));
    }

    warn!(
        holder = holder.as_deref().unwrap_or("<empty>"),
        "reclaiming stale install marker"
    );
    release_install_marker(layout)?;
    let file = create_marker(&path)
        .with_context(|| format!("failed to create install marker: {}", path.display()))?;
    write_marker(file, &path, txid)
}

fn create_marker(path: &Path) -> io::Result<fs::File> {
    fs::OpenOptions::new().write(true).create_new(true).open(path)
}

fn write_marker(mut file: fs::File, path: &Path, txid: &str) -> Result<PathBuf> {
    writeln!(file, "{txid}")
        .and_then(|()| file.sync_all())
        .with_context(|| format!("failed to write install marker: {}", path.display()))?;
    Ok(path.to_path_buf())
}

/// The txid holding the marker, if any.
pub fn read_install_marker(layout: &InstallLayout) -> Result<Option<String>> {
    let path = layout.install_marker_path();
    match fs::read_to_string(&path) {
        Ok(raw) => Ok(Some(raw.trim().to_string()).filter(|txid| !txid.is_empty())),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => {
            Err(err).with_context(|| format!("failed to read install marker: {}", path.display()))
        }
    }
}

pub fn release_install_marker(layout: &InstallLayout) -> Result<()> {
    let path = layout.install_marker_path();
    match fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err)
            .with_context(|| format!("failed to release install marker: {}", path.display())),
    }
}

pub fn write_run_record(layout: &InstallLayout, record: &RunRecord) -> Result<PathBuf> {
    let path = layout.run_record_path(&record.txid);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let payload = serde_json::to_vec_pretty(record).context("failed to serialize run record")?;
    fs::write(&path, payload)
        .with_context(|| format!("failed to write run record: {}", path.display()))?;
    Ok(path)
}

pub fn read_run_record(layout: &InstallLayout, txid: &str) -> Result<Option<RunRecord>> {
    let path = layout.run_record_path(txid);
    let raw = match fs::read(&path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(err)
                .with_context(|| format!("failed to read run record: {}", path.display()));
        }
    };
    let record = serde_json::from_slice(&raw)
        .with_context(|| format!("failed to parse run record: {}", path.display()))?;
    Ok(Some(record))
}

/// Whether the run named by `txid` can no longer be holding the marker.
///
/// A finished record settles it. Otherwise the recorded pid (or the pid
/// suffix of the txid) must be alive. Where liveness cannot be checked the
/// marker is reclaimed once it is older than [`STALE_MARKER_AGE_SECS`].
pub fn holder_is_stale(layout: &InstallLayout, txid: &str) -> bool {
    let record = read_run_record(layout, txid).unwrap_or_else(|err| {
        warn!(txid, error = %format!("{err:#}"), "ignoring unreadable run record");
        None
    });
    if record.as_ref().is_some_and(|record| record.status.is_finished()) {
        return true;
    }

    let pid = record
        .as_ref()
        .map(|record| record.pid)
        .or_else(|| pid_from_txid(txid));
    if let Some(alive) = pid.and_then(process_is_alive) {
        return !alive;
    }

    match record {
        Some(record) => unix_now().saturating_sub(record.started_at_unix) >= STALE_MARKER_AGE_SECS,
        None => marker_age_exceeded(&layout.install_marker_path()),
    }
}

fn pid_from_txid(txid: &str) -> Option<u32> {
    txid.rsplit_once('-')?.1.parse().ok()
}

/// `None` when liveness cannot be determined on this platform.
fn process_is_alive(pid: u32) -> Option<bool> {
    if pid == std::process::id() {
        return Some(true);
    }
    let proc_root = Path::new("/proc");
    if cfg!(target_os = "linux") && proc_root.join("self").exists() {
        return Some(proc_root.join(pid.to_string()).exists());
    }
    None
}

fn marker_age_exceeded(path: &Path) -> bool {
    let Ok(modified) = fs::metadata(path).and_then(|metadata| metadata.modified()) else {
        return false;
    };
    SystemTime::now()
        .duration_since(modified)
        .is_ok_and(|age| age.as_secs() >= STALE_MARKER_AGE_SECS)
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or(0)
}

/// Holds the scope's marker for the duration of `run`.
///
/// The run record ends as `completed` or `failed`. Releasing the marker
/// afterwards is best effort: a marker that cannot be removed is reclaimed
/// by the next run through its finished record, so `run`'s result is
/// returned either way.
pub fn with_install_marker<T, F>(layout: &InstallLayout, operation: &str, run: F) -> Result<T>
where
    F: FnOnce(&RunRecord) -> Result<T>,
{
    let mut record = RunRecord::new(operation, std::process::id(), unix_now());
    claim_install_marker(layout, &record.txid)?;
    if let Err(err) = write_run_record(layout, &record) {
        release_or_warn(layout);
        return Err(err);
    }
    info!(txid = %record.txid, "claimed install marker");

    let result = run(&record);
    record.status = if result.is_ok() {
        RunStatus::Completed
    } else {
        RunStatus::Failed
    };
    if let Err(err) = write_run_record(layout, &record) {
        warn!(txid = %record.txid, error = %format!("{err:#}"), "failed to record run outcome");
    }
    release_or_warn(layout);
    result
}

fn release_or_warn(layout: &InstallLayout) {
    if let Err(err) = release_install_marker(layout) {
        warn!(error = %format!("{err:#}"), "failed to release install marker");
    }
}
