use std::io::IsTerminal;

use anstyle::{AnsiColor, Effects, Style};
use stagehand_core::InstallStatus;
use stagehand_installer::{InstallerConfig, Operation};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum OutputStyle {
    Plain,
    Rich,
}

pub(crate) fn resolve_output_style(stdout_is_tty: bool) -> OutputStyle {
    if stdout_is_tty {
        OutputStyle::Rich
    } else {
        OutputStyle::Plain
    }
}

pub(crate) fn current_output_style() -> OutputStyle {
    resolve_output_style(std::io::stdout().is_terminal())
}

fn status_badge(status: &str) -> &'static str {
    match status {
        "ok" => "[OK]",
        "warn" => "[WARN]",
        "err" => "[ERR]",
        _ => "[..]",
    }
}

fn badge_style(status: &str) -> Style {
    let color = match status {
        "ok" => AnsiColor::BrightGreen,
        "warn" => AnsiColor::BrightYellow,
        "err" => AnsiColor::BrightRed,
        _ => AnsiColor::BrightBlue,
    };
    Style::new().fg_color(Some(color.into())).effects(Effects::BOLD)
}

fn colorize(style: Style, text: &str) -> String {
    format!("{}{}{}", style.render(), text, style.render_reset())
}

pub(crate) fn render_status_line(style: OutputStyle, status: &str, message: &str) -> String {
    match style {
        OutputStyle::Plain => message.to_string(),
        OutputStyle::Rich => format!(
            "{} {message}",
            colorize(badge_style(status), status_badge(status))
        ),
    }
}

/// One-line summary of a finished setup run.
pub(crate) fn format_status_line(config: &InstallerConfig, status: InstallStatus) -> String {
    let operation = match &config.operation {
        Operation::Install { archive } => format!("install from {}", archive.display()),
        other => other.as_str().to_string(),
    };
    format!(
        "{operation} ({} scope): {} (status={} exit={})",
        config.scope.as_str(),
        status.as_str(),
        status.code(),
        status.return_code()
    )
}
