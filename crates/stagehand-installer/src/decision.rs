//! Maps the outcome of one install pipeline to a single status and the
//! follow-up actions the caller performs. Nothing here touches the disk.

use stagehand_core::{InstallStatus, Version, FIRST_RUN_SWITCH};
use std::path::PathBuf;

use crate::config::InstallerConfig;
use crate::install::InstallResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// The resolver handed over to an install in the other scope.
    ExistingLaunched { exe: PathBuf },
    /// A precondition or staging step failed before any mutation.
    Rejected {
        status: InstallStatus,
        message_key: &'static str,
    },
    Downgrade {
        installed: Version,
        candidate: Version,
    },
    Executed {
        result: InstallResult,
        version: Version,
        /// `None` when no product path could be derived for the scope.
        product_exe: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FollowUp {
    LaunchProduct { exe: PathBuf },
    RemoveLegacyKeys,
    RunExperiment {
        status: InstallStatus,
        version: Version,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub status: InstallStatus,
    pub message_key: &'static str,
    pub launch_command: Option<String>,
    pub follow_ups: Vec<FollowUp>,
}

impl Decision {
    fn status_only(status: InstallStatus) -> Self {
        Self {
            status,
            message_key: status.as_str(),
            launch_command: None,
            follow_ups: Vec::new(),
        }
    }
}

pub fn decide(outcome: &PipelineOutcome, config: &InstallerConfig) -> Decision {
    match outcome {
        PipelineOutcome::ExistingLaunched { exe } => Decision {
            launch_command: Some(format!("\"{}\" {FIRST_RUN_SWITCH}", exe.display())),
            ..Decision::status_only(InstallStatus::ExistingVersionLaunched)
        },
        PipelineOutcome::Rejected {
            status,
            message_key,
        } => Decision {
            message_key: *message_key,
            ..Decision::status_only(*status)
        },
        PipelineOutcome::Downgrade { candidate, .. } => {
            let status = InstallStatus::HigherVersionExists;
            Decision {
                follow_ups: vec![FollowUp::RunExperiment {
                    status,
                    version: candidate.clone(),
                }],
                ..Decision::status_only(status)
            }
        }
        PipelineOutcome::Executed {
            result,
            version,
            product_exe,
        } => decide_executed(*result, version, product_exe.as_ref(), config),
    }
}

fn decide_executed(
    result: InstallResult,
    version: &Version,
    product_exe: Option<&PathBuf>,
    config: &InstallerConfig,
) -> Decision {
    let mut status = result.status();
    let mut follow_ups = Vec::new();
    let mut launch_command = None;

    if status.is_success() {
        match product_exe {
            None => status = InstallStatus::OsError,
            Some(exe) => {
                if status == InstallStatus::FirstInstallSuccess
                    && !config.scope.is_system()
                    && !config.do_not_launch
                {
                    follow_ups.push(FollowUp::LaunchProduct { exe: exe.clone() });
                }
                if matches!(
                    status,
                    InstallStatus::NewVersionUpdated | InstallStatus::InUseUpdated
                ) {
                    follow_ups.push(FollowUp::RemoveLegacyKeys);
                }
                if status != InstallStatus::InUseUpdated
                    && !config.do_not_register_for_update_launch
                {
                    launch_command = Some(format!("\"{}\"", exe.display()));
                }
            }
        }
    }

    follow_ups.push(FollowUp::RunExperiment {
        status,
        version: version.clone(),
    });
    Decision {
        status,
        message_key: status.as_str(),
        launch_command,
        follow_ups,
    }
}
