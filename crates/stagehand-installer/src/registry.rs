use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use stagehand_core::Scope;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum RegistryValue {
    String(String),
    Dword(u32),
}

impl RegistryValue {
    pub fn string(value: impl Into<String>) -> Self {
        Self::String(value.into())
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value),
            Self::Dword(_) => None,
        }
    }
}

impl fmt::Display for RegistryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(value) => f.write_str(value),
            Self::Dword(value) => write!(f, "{value}"),
        }
    }
}

/// Scoped key/value store that holds version markers and installer results.
pub trait Registry {
    fn read_value(&self, scope: Scope, key: &str, name: &str) -> Result<Option<RegistryValue>>;

    fn write_value(
        &mut self,
        scope: Scope,
        key: &str,
        name: &str,
        value: RegistryValue,
    ) -> Result<()>;

    /// Returns whether a value was removed.
    fn delete_value(&mut self, scope: Scope, key: &str, name: &str) -> Result<bool>;

    /// Returns whether the key existed.
    fn delete_key(&mut self, scope: Scope, key: &str) -> Result<bool>;
}

type Hive = BTreeMap<String, BTreeMap<String, RegistryValue>>;

/// Registry persisted as one JSON hive file per scope.
///
/// Every call reads the hive from disk and every mutation rewrites it through
/// a sibling temp file plus rename, so a crash never leaves a torn hive.
#[derive(Debug, Clone)]
pub struct FileRegistry {
    system_hive: PathBuf,
    user_hive: PathBuf,
}

impl FileRegistry {
    pub fn new(system_hive: impl Into<PathBuf>, user_hive: impl Into<PathBuf>) -> Self {
        Self {
            system_hive: system_hive.into(),
            user_hive: user_hive.into(),
        }
    }

    pub fn hive_path(&self, scope: Scope) -> &Path {
        match scope {
            Scope::System => &self.system_hive,
            Scope::User => &self.user_hive,
        }
    }

    fn load(&self, scope: Scope) -> Result<Hive> {
        let path = self.hive_path(scope);
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Hive::new()),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read registry hive: {}", path.display()));
            }
        };
        if raw.trim().is_empty() {
            return Ok(Hive::new());
        }
        serde_json::from_str(&raw)
            .with_context(|| format!("failed parsing registry hive: {}", path.display()))
    }

    fn store(&self, scope: Scope, hive: &Hive) -> Result<()> {
        let path = self.hive_path(scope);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let payload =
            serde_json::to_vec_pretty(hive).context("failed to serialize registry hive")?;
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, payload)
            .with_context(|| format!("failed to write registry hive: {}", tmp_path.display()))?;
        fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to replace registry hive: {}", path.display()))?;
        Ok(())
    }
}

impl Registry for FileRegistry {
    fn read_value(&self, scope: Scope, key: &str, name: &str) -> Result<Option<RegistryValue>> {
        let hive = self.load(scope)?;
        Ok(hive.get(key).and_then(|values| values.get(name)).cloned())
    }

    fn write_value(
        &mut self,
        scope: Scope,
        key: &str,
        name: &str,
        value: RegistryValue,
    ) -> Result<()> {
        let mut hive = self.load(scope)?;
        hive.entry(key.to_string())
            .or_default()
            .insert(name.to_string(), value);
        self.store(scope, &hive)
    }

    fn delete_value(&mut self, scope: Scope, key: &str, name: &str) -> Result<bool> {
        let mut hive = self.load(scope)?;
        let Some(values) = hive.get_mut(key) else {
            return Ok(false);
        };
        if values.remove(name).is_none() {
            return Ok(false);
        }
        self.store(scope, &hive)?;
        Ok(true)
    }

    fn delete_key(&mut self, scope: Scope, key: &str) -> Result<bool> {
        let mut hive = self.load(scope)?;
        if hive.remove(key).is_none() {
            return Ok(false);
        }
        self.store(scope, &hive)?;
        Ok(true)
    }
}
