use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Distribution preferences handed to setup through `--installer-data`.
///
/// Every field is optional; an absent field leaves the command-line or
/// built-in default in place.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct InstallerPreferences {
    #[serde(default)]
    pub distribution: DistributionPreferences,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DistributionPreferences {
    pub system_level: Option<bool>,
    pub do_not_launch: Option<bool>,
    pub do_not_register_for_update_launch: Option<bool>,
    pub verbose_logging: Option<bool>,
    pub post_install_hook: Option<String>,
}

impl InstallerPreferences {
    pub fn from_toml_str(input: &str) -> anyhow::Result<Self> {
        toml::from_str(input).context("failed to parse installer preferences")
    }
}
