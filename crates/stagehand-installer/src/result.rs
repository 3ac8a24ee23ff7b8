use anyhow::Result;
use stagehand_core::{
    InstallStatus, Scope, CHANNEL_VALUE, CLIENT_STATE_KEY, FULL_INSTALL_TAG,
    INSTALLER_ERROR_VALUE, INSTALLER_LAUNCH_COMMAND_VALUE, INSTALLER_RESULT_UI_STRING_VALUE,
    INSTALLER_RESULT_VALUE,
};
use tracing::debug;

use crate::registry::{Registry, RegistryValue};

const RESULT_SUCCESS: u32 = 0;
const RESULT_FAILED_CUSTOM_ERROR: u32 = 1;

/// Publishes the outcome where an external updater reads it back.
pub fn write_installer_result(
    registry: &mut dyn Registry,
    scope: Scope,
    status: InstallStatus,
    message_key: &str,
    launch_command: Option<&str>,
) -> Result<()> {
    let result = if status.is_success() {
        RESULT_SUCCESS
    } else {
        RESULT_FAILED_CUSTOM_ERROR
    };
    registry.write_value(
        scope,
        CLIENT_STATE_KEY,
        INSTALLER_RESULT_VALUE,
        RegistryValue::Dword(result),
    )?;
    registry.write_value(
        scope,
        CLIENT_STATE_KEY,
        INSTALLER_ERROR_VALUE,
        RegistryValue::Dword(status.code() as u32),
    )?;
    registry.write_value(
        scope,
        CLIENT_STATE_KEY,
        INSTALLER_RESULT_UI_STRING_VALUE,
        RegistryValue::string(message_key),
    )?;
    if let Some(command) = launch_command {
        registry.write_value(
            scope,
            CLIENT_STATE_KEY,
            INSTALLER_LAUNCH_COMMAND_VALUE,
            RegistryValue::string(command),
        )?;
    }
    debug!(status = status.as_str(), scope = scope.as_str(), "installer result written");
    Ok(())
}

/// Tags the update channel with `-full` after a failed differential install
/// so the next update ships a full archive, and clears the tag otherwise.
pub fn update_diff_install_status(
    registry: &mut dyn Registry,
    scope: Scope,
    incremental: bool,
    status: InstallStatus,
) -> Result<()> {
    let current = registry
        .read_value(scope, CLIENT_STATE_KEY, CHANNEL_VALUE)?
        .and_then(|value| value.as_string().map(str::to_string))
        .unwrap_or_default();

    let tagged = current.ends_with(FULL_INSTALL_TAG);
    let updated = if incremental && status.return_code() != 0 {
        if tagged {
            return Ok(());
        }
        format!("{current}{FULL_INSTALL_TAG}")
    } else {
        if !tagged {
            return Ok(());
        }
        current[..current.len() - FULL_INSTALL_TAG.len()].to_string()
    };

    debug!(channel = %updated, "updating differential install channel");
    registry.write_value(
        scope,
        CLIENT_STATE_KEY,
        CHANNEL_VALUE,
        RegistryValue::string(updated),
    )
}
