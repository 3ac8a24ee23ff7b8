use super::*;
use clap::error::ErrorKind;
use clap::CommandFactory;
use render::{format_status_line, render_status_line, resolve_output_style, OutputStyle};
use stagehand_core::{
    InstallStatus, InstallerPreferences, Scope, CLIENT_STATE_KEY, INSTALLER_ERROR_VALUE,
    INSTALLER_RESULT_UI_STRING_VALUE,
};
use stagehand_installer::{
    file_registry, InstallRoots, InstallerConfig, Operation, Registry, RegistryValue,
};

fn parse(args: &[&str]) -> Cli {
    Cli::try_parse_from(std::iter::once("stagehand-setup").chain(args.iter().copied()))
        .expect("command line must parse")
}

#[test]
fn cli_definition_is_consistent() {
    Cli::command().debug_assert();
}

#[test]
fn global_flags_are_accepted_after_the_subcommand() {
    let cli = parse(&[
        "install",
        "--install-archive",
        "payload.tar.zst",
        "--system-level",
        "--do-not-launch",
        "--user-root",
        "/tmp/user-root",
    ]);
    assert!(cli.global.system_level);
    assert_eq!(cli.global.user_root, Some(PathBuf::from("/tmp/user-root")));

    let overrides = dispatch::config_overrides(&cli.global, &cli.command);
    assert!(overrides.system_level);
    assert!(overrides.do_not_launch);
    assert!(!overrides.do_not_register_for_update_launch);
    assert!(!overrides.force_uninstall);

    let operation = dispatch::operation_for(cli.command)
        .expect("must build operation")
        .expect("install runs a setup operation");
    assert_eq!(
        operation,
        Operation::Install {
            archive: PathBuf::from("payload.tar.zst"),
        }
    );
}

#[test]
fn uninstall_force_flag_maps_to_override() {
    let cli = parse(&["uninstall", "--force-uninstall"]);
    let overrides = dispatch::config_overrides(&cli.global, &cli.command);
    assert!(overrides.force_uninstall);
    assert!(!overrides.do_not_launch);
}

#[test]
fn update_setup_exe_requires_patch_and_output() {
    let err = Cli::try_parse_from(["stagehand-setup", "update-setup-exe", "--patch", "p.tar.zst"])
        .expect_err("missing output path must be rejected");
    assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);

    let cli = parse(&[
        "update-setup-exe",
        "--patch",
        "p.tar.zst",
        "--new-setup-exe",
        "setup.new",
    ]);
    let operation = dispatch::operation_for(cli.command)
        .expect("must build operation")
        .expect("setup patching runs a setup operation");
    assert!(matches!(
        operation,
        Operation::UpdateSetupExe { ref new_setup_exe, .. } if new_setup_exe == &PathBuf::from("setup.new")
    ));
}

#[test]
fn pending_deletes_run_no_setup_operation() {
    let cli = parse(&["process-pending-deletes"]);
    assert!(dispatch::operation_for(cli.command)
        .expect("must resolve")
        .is_none());
}

#[test]
fn resolve_output_style_follows_stdout() {
    assert_eq!(resolve_output_style(true), OutputStyle::Rich);
    assert_eq!(resolve_output_style(false), OutputStyle::Plain);
}

#[test]
fn render_status_line_plain_is_unadorned() {
    assert_eq!(
        render_status_line(OutputStyle::Plain, "ok", "install (user scope): first_install_success"),
        "install (user scope): first_install_success"
    );
}

#[test]
fn render_status_line_rich_includes_badge() {
    let line = render_status_line(OutputStyle::Rich, "err", "rename failed");
    assert!(line.contains("[ERR]"));
    assert!(line.ends_with(" rename failed"));
}

#[test]
fn format_status_line_reports_status_and_exit_code() {
    let config = InstallerConfig {
        scope: Scope::System,
        operation: Operation::RenameExecutables,
        force_uninstall: false,
        do_not_launch: false,
        do_not_register_for_update_launch: false,
        installer_data: None,
        verbose_logging: false,
        roots: InstallRoots {
            system: PathBuf::from("/opt/stagehand"),
            user: PathBuf::from("/home/u/.local/share/stagehand"),
        },
        post_install_hook: None,
    };
    let status = InstallStatus::RenameFailed;
    let line = format_status_line(&config, status);
    assert!(line.starts_with("rename-executables (system scope): "));
    assert!(line.contains(status.as_str()));
    assert!(line.ends_with(&format!("exit={})", status.return_code())));
}

#[test]
fn completions_name_the_setup_binary() {
    let mut output = Vec::new();
    completion::write_completions_script(CliCompletionShell::Bash, &mut output)
        .expect("must write completions");
    let script = String::from_utf8(output).expect("completions must be utf-8");
    assert!(script.contains("stagehand-setup"));
    assert!(script.contains("rename-executables"));
}

#[test]
fn early_failures_exit_with_os_error_not_a_success_code() {
    let code = dispatch::EARLY_FAILURE_STATUS.return_code();
    assert_eq!(code, InstallStatus::OsError.code());
    assert_ne!(code, 0);
    assert!(InstallStatus::ALL
        .iter()
        .filter(|status| status.is_success())
        .all(|status| status.code() != code));
}

#[test]
fn early_failure_is_published_for_the_requested_scope() {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    let base = std::env::temp_dir().join(format!(
        "stagehand-cli-tests-{}-{nanos}",
        std::process::id()
    ));
    let cli = parse(&[
        "rename-executables",
        "--system-level",
        "--system-root",
        base.join("system").to_str().expect("utf-8 path"),
        "--user-root",
        base.join("user").to_str().expect("utf-8 path"),
    ]);
    let overrides = dispatch::config_overrides(&cli.global, &cli.command);

    let err = dispatch::record_early_failure(
        anyhow::anyhow!("current executable unavailable"),
        &overrides,
        &InstallerPreferences::default(),
    );
    assert!(err.to_string().contains("current executable unavailable"));

    let registry = file_registry(&InstallRoots {
        system: base.join("system"),
        user: base.join("user"),
    });
    assert_eq!(
        registry
            .read_value(Scope::System, CLIENT_STATE_KEY, INSTALLER_ERROR_VALUE)
            .expect("must read"),
        Some(RegistryValue::Dword(InstallStatus::OsError.code() as u32))
    );
    assert_eq!(
        registry
            .read_value(Scope::System, CLIENT_STATE_KEY, INSTALLER_RESULT_UI_STRING_VALUE)
            .expect("must read"),
        Some(RegistryValue::string("os_error"))
    );
    assert!(registry
        .read_value(Scope::User, CLIENT_STATE_KEY, INSTALLER_ERROR_VALUE)
        .expect("must read")
        .is_none());

    let _ = std::fs::remove_dir_all(&base);
}
