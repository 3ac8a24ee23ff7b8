/// Outcome of one setup invocation.
///
/// The numeric values are read back by external launchers from the process
/// exit code and from the registry, so they must never be renumbered. New
/// variants may only be appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum InstallStatus {
    FirstInstallSuccess = 0,
    InstallRepaired = 1,
    NewVersionUpdated = 2,
    ExistingVersionLaunched = 3,
    HigherVersionExists = 4,
    UserLevelInstallExists = 5,
    SystemLevelInstallExists = 6,
    InstallFailed = 7,
    SetupPatchFailed = 8,
    OsNotSupported = 9,
    OsError = 10,
    TempDirFailed = 11,
    UncompressionFailed = 12,
    InvalidArchive = 13,
    InsufficientRights = 14,
    ProductNotInstalled = 15,
    ProductRunning = 16,
    UninstallConfirmed = 17,
    UninstallDeleteProfile = 18,
    UninstallSuccessful = 19,
    UninstallFailed = 20,
    UninstallCancelled = 21,
    UnknownStatus = 22,
    RenameSuccessful = 23,
    RenameFailed = 24,
    EulaRejected = 25,
    EulaAccepted = 26,
    EulaAcceptedOptIn = 27,
    InstallDirInUse = 28,
    UninstallRequiresReboot = 29,
    InUseUpdated = 30,
    SameVersionRepairFailed = 31,
    ReentrySysUpdate = 32,
    SxsOptionNotSupported = 33,
}

impl InstallStatus {
    pub const ALL: [InstallStatus; 34] = [
        Self::FirstInstallSuccess,
        Self::InstallRepaired,
        Self::NewVersionUpdated,
        Self::ExistingVersionLaunched,
        Self::HigherVersionExists,
        Self::UserLevelInstallExists,
        Self::SystemLevelInstallExists,
        Self::InstallFailed,
        Self::SetupPatchFailed,
        Self::OsNotSupported,
        Self::OsError,
        Self::TempDirFailed,
        Self::UncompressionFailed,
        Self::InvalidArchive,
        Self::InsufficientRights,
        Self::ProductNotInstalled,
        Self::ProductRunning,
        Self::UninstallConfirmed,
        Self::UninstallDeleteProfile,
        Self::UninstallSuccessful,
        Self::UninstallFailed,
        Self::UninstallCancelled,
        Self::UnknownStatus,
        Self::RenameSuccessful,
        Self::RenameFailed,
        Self::EulaRejected,
        Self::EulaAccepted,
        Self::EulaAcceptedOptIn,
        Self::InstallDirInUse,
        Self::UninstallRequiresReboot,
        Self::InUseUpdated,
        Self::SameVersionRepairFailed,
        Self::ReentrySysUpdate,
        Self::SxsOptionNotSupported,
    ];

    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.into_iter().find(|status| status.code() == code)
    }

    /// Process exit code reported to the launcher. Successful installs,
    /// updates and renames collapse to zero.
    pub fn return_code(self) -> i32 {
        if self.is_success() {
            0
        } else {
            self.code()
        }
    }

    pub fn is_success(self) -> bool {
        matches!(
            self,
            Self::FirstInstallSuccess
                | Self::InstallRepaired
                | Self::NewVersionUpdated
                | Self::InUseUpdated
                | Self::RenameSuccessful
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::FirstInstallSuccess => "first_install_success",
            Self::InstallRepaired => "install_repaired",
            Self::NewVersionUpdated => "new_version_updated",
            Self::ExistingVersionLaunched => "existing_version_launched",
            Self::HigherVersionExists => "higher_version_exists",
            Self::UserLevelInstallExists => "user_level_install_exists",
            Self::SystemLevelInstallExists => "system_level_install_exists",
            Self::InstallFailed => "install_failed",
            Self::SetupPatchFailed => "setup_patch_failed",
            Self::OsNotSupported => "os_not_supported",
            Self::OsError => "os_error",
            Self::TempDirFailed => "temp_dir_failed",
            Self::UncompressionFailed => "uncompression_failed",
            Self::InvalidArchive => "invalid_archive",
            Self::InsufficientRights => "insufficient_rights",
            Self::ProductNotInstalled => "product_not_installed",
            Self::ProductRunning => "product_running",
            Self::UninstallConfirmed => "uninstall_confirmed",
            Self::UninstallDeleteProfile => "uninstall_delete_profile",
            Self::UninstallSuccessful => "uninstall_successful",
            Self::UninstallFailed => "uninstall_failed",
            Self::UninstallCancelled => "uninstall_cancelled",
            Self::UnknownStatus => "unknown_status",
            Self::RenameSuccessful => "rename_successful",
            Self::RenameFailed => "rename_failed",
            Self::EulaRejected => "eula_rejected",
            Self::EulaAccepted => "eula_accepted",
            Self::EulaAcceptedOptIn => "eula_accepted_opt_in",
            Self::InstallDirInUse => "install_dir_in_use",
            Self::UninstallRequiresReboot => "uninstall_requires_reboot",
            Self::InUseUpdated => "in_use_updated",
            Self::SameVersionRepairFailed => "same_version_repair_failed",
            Self::ReentrySysUpdate => "reentry_sys_update",
            Self::SxsOptionNotSupported => "sxs_option_not_supported",
        }
    }
}
