use std::path::PathBuf;

use clap::builder::styling::{AnsiColor, Effects, Styles};
use clap::{ArgAction, Args, CommandFactory, Parser, Subcommand};

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
#[command(name = "pcx")]
#[command(bin_name = "pcx")]
#[command(version)]
#[command(about = "Know which project you are in before you touch it")]
#[command(styles = cli_styles())]
pub struct Cli {
    #[arg(
        long,
        global = true,
        env = "PROJCTX_HOME",
        help = "Directory holding registry.json, audit.jsonl and config.toml (default ~/.projctx)."
    )]
    pub home: Option<PathBuf>,

    #[arg(
        short = 'v',
        long = "verbose",
        global = true,
        action = ArgAction::Count,
        help = "Raise log verbosity (-v info, -vv debug); PROJCTX_LOG overrides."
    )]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    #[command(about = "Register a project.")]
    Add(AddArgs),
    #[command(about = "Edit a registered project.")]
    Update(UpdateArgs),
    #[command(about = "Remove a project from the registry.")]
    Rm(ProjectRefArgs),
    #[command(about = "List registered projects.")]
    Ls(ListArgs),
    #[command(about = "Show one project by id, name, or alias.")]
    Show(ShowArgs),
    #[command(about = "Show or clear the active project.")]
    Active(ActiveArgs),
    #[command(about = "Make a project the active one.")]
    Switch(ProjectRefArgs),
    #[command(about = "Resolve which project the current context belongs to.")]
    Resolve(ResolveArgs),
    #[command(about = "Resolve, then decide whether an operation may proceed.")]
    Check(CheckArgs),
    #[command(about = "Show recent audit entries.")]
    Audit(AuditArgs),
    #[command(about = "Check registry, config, audit log and safeguards.")]
    Doctor(DoctorArgs),
    #[command(about = "Find unregistered projects below a directory.")]
    Discover(DiscoverArgs),
    #[command(about = "Score whether a request warrants a project check.")]
    ShouldCheck(ShouldCheckArgs),
    #[command(about = "Generate or install shell completions.")]
    Completions(CompletionsArgs),
}

#[derive(Debug, Args)]
#[command(about = "Generate or install shell completions.")]
pub struct CompletionsArgs {
    #[arg(help = "Shell name (bash, zsh, fish). Auto-detected if omitted.")]
    pub shell: Option<String>,

    #[arg(
        short = 'i',
        long = "install",
        help = "Write completions to the canonical path for the shell."
    )]
    pub install: bool,
}

#[derive(Debug, Args)]
pub struct AddArgs {
    #[arg(help = "Human-readable project name.")]
    pub name: String,

    #[arg(
        short = 'r',
        long,
        default_value = ".",
        help = "Project root directory (must exist)."
    )]
    pub root: PathBuf,

    #[arg(long, help = "Explicit id; derived from the name when omitted.")]
    pub id: Option<String>,

    #[arg(short = 'a', long = "alias", help = "Alias (repeatable).")]
    pub aliases: Vec<String>,

    #[arg(short = 'd', long = "desc", help = "Optional description text.")]
    pub description: Option<String>,

    #[arg(short = 'g', long = "tag", help = "Tag (repeatable).")]
    pub tags: Vec<String>,

    #[arg(long, help = "Git remote URL; read from origin when omitted.")]
    pub remote: Option<String>,

    #[arg(long, help = "Do not read the git remote from the root.")]
    pub no_detect_remote: bool,

    #[arg(
        short = 'm',
        long = "marker",
        help = "File expected at the root (repeatable)."
    )]
    pub markers: Vec<String>,

    #[arg(short = 'j', long, help = "Render machine-readable JSON.")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct UpdateArgs {
    #[arg(help = "Project id, name, or alias.")]
    pub project: String,

    #[arg(long, help = "New display name.")]
    pub name: Option<String>,

    #[arg(short = 'r', long, help = "New root directory.")]
    pub root: Option<PathBuf>,

    #[arg(long = "add-alias", help = "Alias to add (repeatable).")]
    pub add_aliases: Vec<String>,

    #[arg(long = "remove-alias", help = "Alias to remove (repeatable).")]
    pub remove_aliases: Vec<String>,

    #[arg(short = 'd', long = "desc", help = "New description text.")]
    pub description: Option<String>,

    #[arg(long = "add-tag", help = "Tag to add (repeatable).")]
    pub add_tags: Vec<String>,

    #[arg(long = "remove-tag", help = "Tag to remove (repeatable).")]
    pub remove_tags: Vec<String>,

    #[arg(long, conflicts_with = "clear_remote", help = "New git remote URL.")]
    pub remote: Option<String>,

    #[arg(long, help = "Forget the stored git remote.")]
    pub clear_remote: bool,

    #[arg(
        short = 'm',
        long = "marker",
        help = "Replace expected marker files (repeatable)."
    )]
    pub markers: Vec<String>,

    #[arg(short = 'j', long, help = "Render machine-readable JSON.")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct ProjectRefArgs {
    #[arg(help = "Project id, name, or alias.")]
    pub project: String,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    #[arg(short = 'p', long, help = "Include project roots.")]
    pub paths: bool,

    #[arg(short = 'l', long, help = "Include descriptions.")]
    pub long: bool,

    #[arg(short = 'j', long, help = "Render machine-readable JSON.")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct ShowArgs {
    #[arg(help = "Project id, name, or alias.")]
    pub project: String,

    #[arg(short = 'j', long, help = "Render machine-readable JSON.")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct ActiveArgs {
    #[arg(long, help = "Clear the active project pointer.")]
    pub clear: bool,

    #[arg(short = 'j', long, help = "Render machine-readable JSON.")]
    pub json: bool,
}

/// Signals describing where and what the caller is working on.
#[derive(Debug, Clone, Default, Args)]
pub struct ContextArgs {
    #[arg(long, help = "Working directory to resolve from (default: current).")]
    pub cwd: Option<PathBuf>,

    #[arg(long, help = "Free text that may name the project.")]
    pub mention: Option<String>,

    #[arg(long, help = "Document whose header may declare the project.")]
    pub document: Option<PathBuf>,

    #[arg(long, help = "Project the operation is expected to target.")]
    pub expected: Option<String>,
}

#[derive(Debug, Args)]
pub struct ResolveArgs {
    #[command(flatten)]
    pub context: ContextArgs,

    #[arg(
        short = 'i',
        long,
        help = "Ask which project is meant when resolution is ambiguous."
    )]
    pub interactive: bool,

    #[arg(
        long,
        requires = "interactive",
        help = "Remember the mention (or expected label) as an alias of the chosen project."
    )]
    pub learn: bool,

    #[arg(long, help = "Fail unless exactly one project is resolved.")]
    pub require: bool,

    #[arg(short = 'j', long, help = "Render machine-readable JSON.")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct CheckArgs {
    #[command(flatten)]
    pub context: ContextArgs,

    #[arg(
        short = 'k',
        long,
        default_value = "write",
        help = "Operation kind: read, write, generate, destructive."
    )]
    pub kind: String,

    #[arg(short = 'p', long, help = "Project the operation claims to target.")]
    pub project: Option<String>,

    #[arg(
        long,
        action = ArgAction::Count,
        help = "Confirm a mismatch override (repeat when two are required)."
    )]
    pub confirm: u8,

    #[arg(
        short = 'i',
        long,
        help = "Prompt for disambiguation or override confirmation."
    )]
    pub interactive: bool,

    #[arg(short = 'j', long, help = "Render machine-readable JSON.")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct AuditArgs {
    #[arg(short = 'n', long, default_value_t = 20, help = "Number of entries.")]
    pub limit: usize,

    #[arg(
        short = 'k',
        long,
        help = "Only this event type (e.g. mismatch_warning)."
    )]
    pub kind: Option<String>,

    #[arg(short = 'j', long, help = "Render machine-readable JSON.")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct DoctorArgs {
    #[arg(short = 'j', long, help = "Render machine-readable JSON.")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct DiscoverArgs {
    #[arg(default_value = ".", help = "Directory to scan.")]
    pub base: PathBuf,

    #[arg(long, default_value_t = 3, help = "Maximum directory depth.")]
    pub depth: usize,

    #[arg(long, help = "Register every new project found.")]
    pub apply: bool,

    #[arg(short = 'j', long, help = "Render machine-readable JSON.")]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct ShouldCheckArgs {
    #[arg(
        required = true,
        trailing_var_arg = true,
        help = "Request text to score."
    )]
    pub text: Vec<String>,

    #[arg(short = 'j', long, help = "Render machine-readable JSON.")]
    pub json: bool,
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
