mod keys;
mod payload;
mod preferences;
mod status;
mod version;

pub use keys::*;
pub use payload::*;
pub use preferences::{DistributionPreferences, InstallerPreferences};
pub use status::InstallStatus;
pub use version::Version;
