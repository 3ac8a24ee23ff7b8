use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

mod completion;
mod dispatch;
mod render;

use completion::CliCompletionShell;

#[derive(Parser, Debug)]
#[command(name = "stagehand-setup")]
#[command(about = "Transactional installer for the Stagehand app", long_about = None)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone, Default)]
struct GlobalArgs {
    /// Operate on the per-machine installation.
    #[arg(long, global = true)]
    system_level: bool,
    /// Distribution preferences (TOML); removed once setup finishes.
    #[arg(long, global = true, value_name = "PATH")]
    installer_data: Option<PathBuf>,
    #[arg(long, global = true)]
    verbose_logging: bool,
    #[arg(long, global = true, value_name = "PATH", env = "STAGEHAND_LOG_FILE")]
    log_file: Option<PathBuf>,
    #[arg(long, global = true, value_name = "DIR")]
    system_root: Option<PathBuf>,
    #[arg(long, global = true, value_name = "DIR")]
    user_root: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Install, update or repair the product from a packed archive.
    Install {
        /// Defaults to the packed archive next to this executable.
        #[arg(long, value_name = "PATH")]
        install_archive: Option<PathBuf>,
        #[arg(long)]
        do_not_launch: bool,
        #[arg(long)]
        do_not_register_for_update_launch: bool,
    },
    Uninstall {
        #[arg(long)]
        force_uninstall: bool,
    },
    /// Complete an executable swap deferred while the product was running.
    RenameExecutables,
    /// Rebuild a newer setup executable from this one plus a patch archive.
    UpdateSetupExe {
        #[arg(long, value_name = "PATH")]
        patch: PathBuf,
        #[arg(long, value_name = "PATH")]
        new_setup_exe: PathBuf,
    },
    /// Remove paths a previous run could not delete.
    ProcessPendingDeletes,
    Completions {
        #[arg(value_enum)]
        shell: CliCompletionShell,
    },
}

fn main() {
    let cli = Cli::parse();
    let code = match dispatch::run_cli(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!(
                "{}",
                render::render_status_line(
                    render::current_output_style(),
                    "err",
                    &format!("{err:#}")
                )
            );
            dispatch::EARLY_FAILURE_STATUS.return_code()
        }
    };
    std::process::exit(code);
}

#[cfg(test)]
mod tests;
