use anyhow::Result;
use clap::Parser;
use fenceline::cli::{AppContext, Cli, Commands};
use fenceline::cli_ext::{apply_cmd, backup_cmd, extract_cmd, infer_cmd, plan_cmd};
use fenceline::infra::logging;

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    // Build a context once, pass everywhere
    let ctx = AppContext {
        quiet: cli.quiet,
        no_color: cli.no_color,
        dry_run: cli.dry_run,
    };

    match cli.command {
        Commands::Extract(args) => extract_cmd::run(args, &ctx),
        Commands::Infer(args) => infer_cmd::run(args, &ctx),
        Commands::Plan(args) => plan_cmd::run(args, &ctx),
        Commands::Apply(args) => apply_cmd::run(args, &ctx),
        Commands::Backup(args) => backup_cmd::backup_run(args, &ctx),
        Commands::Init(args) => fenceline::infra::config::init(args, &ctx),
        Commands::Completions(args) => fenceline::completion::run(args, &ctx),
    }
}
