use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Shared application context for global flags
#[derive(Clone, Debug)]
pub struct AppContext {
    pub quiet: bool,    // global --quiet
    pub no_color: bool, // global --no-color
    pub dry_run: bool,  // global --dry-run
}

#[derive(Parser)]
#[command(name = "fln")]
#[command(about = "Extract fenced code from model replies and apply it to a workspace safely")]
#[command(version, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Suppress progress bars and non-essential output
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Show what would be done without executing
    #[arg(long, global = true)]
    pub dry_run: bool,

    /// Debug logging to stderr (overridden by FLN_LOG)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Stream-parse a message and list its code blocks
    Extract(ExtractArgs),

    /// Infer target files for the blocks in a message
    Infer(InferArgs),

    /// Build and validate the file-change proposal for a message
    Plan(PlanArgs),

    /// Apply a message's proposal to the workspace
    Apply(ApplyArgs),

    /// Inspect and maintain the backup store
    Backup(BackupArgs),

    /// Initialize a fenceline.toml config file
    Init(InitArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Message source shared by the message-driven commands
#[derive(Debug, Clone, Args)]
pub struct MessageArgs {
    /// Markdown file holding the model reply ("-" for stdin)
    pub input: PathBuf,

    /// Message id (defaults to the input file stem)
    #[arg(long)]
    pub message_id: Option<String>,
}

#[derive(Debug, Parser)]
pub struct ExtractArgs {
    #[command(flatten)]
    pub message: MessageArgs,

    /// Feed the parser N characters at a time (0 = whole text)
    #[arg(long, default_value_t = 0)]
    pub chunk: usize,

    /// Print block contents, not just the summary
    #[arg(long)]
    pub show_content: bool,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Debug, Parser)]
pub struct InferArgs {
    #[command(flatten)]
    pub message: MessageArgs,

    /// Context files known to the session
    #[arg(short, long, num_args = 1..)]
    pub context: Vec<PathBuf>,

    /// Collect context files from this directory instead
    #[arg(long, conflicts_with = "context")]
    pub context_dir: Option<PathBuf>,

    /// Pick the first candidate when several fit
    #[arg(long)]
    pub pick_first: bool,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Debug, Parser)]
pub struct PlanArgs {
    #[command(flatten)]
    pub message: MessageArgs,

    /// Workspace root the proposal targets
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Debug, Parser)]
pub struct ApplyArgs {
    #[command(flatten)]
    pub message: MessageArgs,

    /// Workspace root the proposal targets
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// Apply without asking for confirmation
    #[arg(short, long)]
    pub yes: bool,

    /// Overwrite files that changed since the proposal was built
    #[arg(long)]
    pub force: bool,

    /// Skip backups (disables undo for modified files)
    #[arg(long)]
    pub no_backup: bool,

    /// Keep going after a failed operation instead of rolling back
    #[arg(long)]
    pub no_rollback: bool,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Parser)]
pub struct BackupArgs {
    /// Workspace root holding the backup store
    #[arg(long, default_value = ".", global = true)]
    pub root: PathBuf,

    #[command(subcommand)]
    pub command: BackupSubcommand,
}

#[derive(Subcommand)]
pub enum BackupSubcommand {
    /// List backups with optional filtering
    List(BackupListArgs),

    /// Report storage health (orphans, corruption, free space)
    Health(BackupHealthArgs),

    /// Restore a backup over its original path
    Restore(BackupRestoreArgs),

    /// Remove old backups
    Cleanup(BackupCleanupArgs),
}

#[derive(Parser, Debug)]
pub struct BackupListArgs {
    /// Only backups of this workspace-relative path
    #[arg(long)]
    pub path: Option<String>,

    /// Filter by relative time (e.g., "7d", "24h")
    #[arg(long, value_name = "SPAN")]
    pub since: Option<String>,

    /// Limit result count
    #[arg(long, default_value_t = 100)]
    pub limit: usize,

    /// Sort order (desc or asc)
    #[arg(long, default_value = "desc")]
    pub sort: String,

    /// Machine-readable JSON output
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser, Debug)]
pub struct BackupHealthArgs {
    /// Machine-readable JSON output
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct BackupRestoreArgs {
    /// Backup id, unique prefix/suffix, or 'latest'
    pub id: String,

    /// Emit JSON result instead of human text
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct BackupCleanupArgs {
    /// Relative span: 7d, 24h, 90m, 45s
    #[arg(long)]
    pub older_than: Option<String>,

    /// Keep N newest backups; remove the rest
    #[arg(long)]
    pub keep_latest: Option<usize>,

    /// Emit JSON result instead of human text
    #[arg(long)]
    pub json: bool,
}

#[derive(Parser)]
pub struct InitArgs {
    /// Directory to initialize config in
    #[arg(default_value = ".")]
    pub path: PathBuf,

    /// Overwrite existing config file
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

#[derive(Parser)]
pub struct CompletionsArgs {
    /// Target shell
    #[arg(value_enum)]
    pub shell: Shell,

    /// Output directory; if omitted and --stdout not set, prints error
    #[arg(long)]
    pub out_dir: Option<PathBuf>,

    /// Print completion script to stdout instead of a file
    #[arg(long)]
    pub stdout: bool,
}
