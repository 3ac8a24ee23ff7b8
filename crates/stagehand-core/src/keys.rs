pub const PRODUCT_NAME: &str = "Stagehand App";

pub const VERSION_KEY: &str = "Software/Stagehand/Clients/app";
pub const CLIENT_STATE_KEY: &str = "Software/Stagehand/ClientState/app";
pub const LEGACY_KEYS: &[&str] = &[
    "Software/Stagehand/Legacy/app",
    "Software/Stagehand/Legacy/app-launcher",
];

pub const VERSION_VALUE: &str = "pv";
pub const OLD_VERSION_VALUE: &str = "opv";
pub const RENAME_COMMAND_VALUE: &str = "cmd";
pub const NAME_VALUE: &str = "name";

pub const INSTALLER_RESULT_VALUE: &str = "InstallerResult";
pub const INSTALLER_ERROR_VALUE: &str = "InstallerError";
pub const INSTALLER_RESULT_UI_STRING_VALUE: &str = "InstallerResultUIString";
pub const INSTALLER_LAUNCH_COMMAND_VALUE: &str = "InstallerSuccessLaunchCmdLine";

pub const CHANNEL_VALUE: &str = "ap";
pub const FULL_INSTALL_TAG: &str = "-full";
