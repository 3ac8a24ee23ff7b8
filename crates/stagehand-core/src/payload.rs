pub const COMPRESSED_ARCHIVE: &str = "app.packed.tar.zst";
pub const FULL_ARCHIVE: &str = "app.tar";
pub const PATCH_ARCHIVE: &str = "app.patch";
pub const INSTALLER_DIR: &str = "Installer";
pub const INSTALL_SOURCE_DIR: &str = "source";
pub const INSTALL_SOURCE_PRODUCT_DIR: &str = "App-bin";

pub const PRODUCT_EXE: &str = if cfg!(windows) { "app.exe" } else { "app" };
pub const PRODUCT_OLD_EXE: &str = if cfg!(windows) {
    "old_app.exe"
} else {
    "old_app"
};
pub const PRODUCT_NEW_EXE: &str = if cfg!(windows) {
    "new_app.exe"
} else {
    "new_app"
};

pub const FIRST_RUN_SWITCH: &str = "--first-run";
pub const RENAME_EXE_SWITCH: &str = "rename-executables";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Full,
    DifferentialPatch,
}

impl PayloadKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::DifferentialPatch => "differential_patch",
        }
    }

    pub fn is_incremental(self) -> bool {
        self == Self::DifferentialPatch
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Scope {
    System,
    User,
}

impl Scope {
    pub fn from_system_level(system_level: bool) -> Self {
        if system_level {
            Self::System
        } else {
            Self::User
        }
    }

    pub fn other(self) -> Self {
        match self {
            Self::System => Self::User,
            Self::User => Self::System,
        }
    }

    pub fn is_system(self) -> bool {
        self == Self::System
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
        }
    }
}
