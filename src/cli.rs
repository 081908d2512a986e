use std::path::PathBuf;

use clap::builder::styling::{AnsiColor, Effects, Styles};
use clap::{ArgAction, Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use crate::config::ConfigOverrides;

fn cli_styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::BrightCyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::BrightYellow.on_default() | Effects::BOLD)
        .literal(AnsiColor::BrightGreen.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::BrightMagenta.on_default())
}

pub fn styled_command() -> clap::Command {
    Cli::command()
}

#[derive(Debug, Parser)]
#[command(name = "worktrees")]
#[command(bin_name = "worktrees")]
#[command(version, disable_version_flag = true)]
#[command(about = "Per-issue git worktrees with their own port, database snapshot and dev server")]
#[command(styles = cli_styles())]
pub struct Cli {
    #[arg(short = 'v', long = "version", action = ArgAction::Version, help = "Print version.")]
    pub version: (),

    #[arg(
        short = 'C',
        long,
        env = "WORKTREE_REPO_ROOT",
        default_value = ".",
        help = "Repository root that holds .worktrees/ and .worktrees.json."
    )]
    pub repo_root: PathBuf,

    #[command(flatten)]
    pub config: ConfigArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Overrides for `.worktrees.toml`; each one can also come from the environment.
#[derive(Debug, Default, Args)]
pub struct ConfigArgs {
    #[arg(
        long = "default-branch-prefix",
        env = "WORKTREE_BRANCH_PREFIX",
        help = "Branch prefix used when create gets no --branch-prefix."
    )]
    pub branch_prefix: Option<String>,

    #[arg(
        long,
        env = "WORKTREE_BASE_PORT",
        value_parser = clap::value_parser!(u16).range(1..),
        help = "First port handed out to worktree dev servers."
    )]
    pub base_port: Option<u16>,

    #[arg(
        long,
        env = "WORKTREE_MAIN_PORT",
        value_parser = clap::value_parser!(u16).range(1..),
        help = "Port of the main checkout's dev server, shown by list."
    )]
    pub main_port: Option<u16>,

    #[arg(
        long,
        env = "WORKTREE_DEV_COMMAND",
        help = "Package script that starts the dev server."
    )]
    pub dev_command: Option<String>,

    #[arg(
        long,
        env = "WORKTREE_PACKAGE_RUNNER",
        help = "Package runner used to start the dev server."
    )]
    pub package_runner: Option<String>,

    #[arg(
        long,
        env = "WORKTREE_DB_PATH",
        help = "Extra database file or directory to snapshot, relative to the repo root."
    )]
    pub db_path: Option<PathBuf>,
}

impl ConfigArgs {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            branch_prefix: self.branch_prefix.clone(),
            base_port: self.base_port,
            main_port: self.main_port,
            dev_command: self.dev_command.clone(),
            package_runner: self.package_runner.clone(),
            db_path: self.db_path.clone(),
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    #[command(about = "Create the worktree, branch, port and database snapshot for an issue.")]
    Create(CreateArgs),
    #[command(about = "Stop the dev server and remove the worktree for an issue.")]
    Delete(DeleteArgs),
    #[command(about = "List tracked worktrees by issue number.")]
    List(ListArgs),
    #[command(about = "Show one worktree by issue number.")]
    Info(InfoArgs),
    #[command(about = "Check git, metadata and ignore rules for problems.")]
    Doctor(DoctorArgs),
    #[command(about = "Print shell completions.")]
    Completions(CompletionsArgs),
}

#[derive(Debug, Args)]
pub struct CreateArgs {
    #[arg(
        value_parser = clap::value_parser!(u64).range(1..),
        help = "Issue number (positive integer)."
    )]
    pub issue: u64,

    #[arg(help = "Short branch-safe name, e.g. dark-mode.")]
    pub slug: String,

    #[arg(long, help = "Start the dev server on the allocated port.")]
    pub start_server: bool,

    #[arg(long, help = "Branch prefix for this worktree only.")]
    pub branch_prefix: Option<String>,

    #[arg(
        long,
        value_parser = clap::value_parser!(u16).range(1..),
        help = "Preferred port; the first free port at or above it is used."
    )]
    pub port: Option<u16>,

    #[arg(long, help = "Render JSON output.")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct DeleteArgs {
    #[arg(
        value_parser = clap::value_parser!(u64).range(1..),
        help = "Issue number."
    )]
    pub issue: u64,

    #[arg(
        short = 'f',
        long,
        help = "Remove the worktree even with local changes, and drop the record if git fails."
    )]
    pub force: bool,

    #[arg(long, help = "Render JSON output.")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    #[arg(long, help = "Render JSON output.")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct InfoArgs {
    #[arg(
        value_parser = clap::value_parser!(u64).range(1..),
        help = "Issue number."
    )]
    pub issue: u64,

    #[arg(long, help = "Render JSON output.")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct DoctorArgs {
    #[arg(long, help = "Render JSON output.")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    #[arg(value_enum, help = "Target shell.")]
    pub shell: Shell,
}
