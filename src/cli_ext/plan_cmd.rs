//! `fln plan`: build the proposal for a message and show what would change.

use std::path::Path;

use anyhow::Result;
use owo_colors::OwoColorize;
use serde_json::json;
use tabled::{Table, Tabled};
use tracing::{info, instrument};

use crate::cli::{AppContext, OutputFormat, PlanArgs};
use crate::cli_ext::common::{LoadedMessage, load_message, proposal_builder, workspace_config, workspace_context, workspace_root};
use crate::core::infer::InferenceHooks;
use crate::core::proposal::{FileOperation, IssueSeverity, MessageProposal, ProposalValidationResult};
use crate::infra::config::Config;

#[derive(Tabled)]
struct OperationRow
{
    #[tabled(rename = "#")]
    order: usize,
    #[tabled(rename = "Op")]
    kind: String,
    #[tabled(rename = "Path")]
    path: String,
    #[tabled(rename = "Detail")]
    detail: String,
}

/// Build the proposal for `msg` against the workspace at `root`.
///
/// Every text file in the workspace is offered as inference context;
/// ambiguous matches stay unresolved.
pub fn plan_message(
    root: &Path,
    cfg: &Config,
    msg: &LoadedMessage,
) -> Result<MessageProposal>
{
    let builder = proposal_builder(root, cfg)?;
    let context = workspace_context(root, cfg)?;
    let mut hooks = InferenceHooks::new();
    let proposal = builder.from_message(&msg.id, &msg.text, &context, &mut hooks);
    info!(
        message = %msg.id,
        operations = proposal.files.operations.len(),
        valid = proposal.validation.is_valid(),
        "proposal ready"
    );
    Ok(proposal)
}

fn describe(op: &FileOperation) -> String
{
    if let Some(new_path) = &op.new_path
    {
        return format!("-> {new_path}");
    }
    if let Some(range) = op.line_range
    {
        return format!("lines {}-{}", range.start, range.end);
    }
    match &op.content
    {
        Some(c) => format!("{} line(s)", c.lines().count()),
        None => String::new(),
    }
}

pub(crate) fn print_operations(ops: &[FileOperation])
{
    let rows: Vec<OperationRow> = ops
        .iter()
        .filter(|o| o.selected)
        .map(|o| OperationRow {
            order: o.order,
            kind: format!("{:?}", o.kind),
            path: o
                .path
                .clone(),
            detail: describe(o),
        })
        .collect();
    println!("{}", Table::new(rows));
}

pub(crate) fn print_issues(
    validation: &ProposalValidationResult,
    ctx: &AppContext,
)
{
    for issue in &validation.issues
    {
        let label = match issue.severity
        {
            IssueSeverity::Error => "error",
            IssueSeverity::Warning => "warning",
            IssueSeverity::Info => "info",
        };
        let target = issue
            .path
            .as_deref()
            .map(|p| format!(" {p}:"))
            .unwrap_or_default();
        if ctx.no_color
        {
            println!("{label}:{target} {}", issue.message);
            continue;
        }
        match issue.severity
        {
            IssueSeverity::Error => println!("{}{target} {}", format!("{label}:").red().bold(), issue.message),
            IssueSeverity::Warning => println!("{}{target} {}", format!("{label}:").yellow(), issue.message),
            IssueSeverity::Info => println!("{}{target} {}", format!("{label}:").dimmed(), issue.message),
        }
    }
}

#[instrument(skip_all, fields(input = %args.message.input.display()))]
pub fn run(
    args: PlanArgs,
    ctx: &AppContext,
) -> Result<()>
{
    let root = workspace_root(&args.root)?;
    let cfg = workspace_config(&root)?;
    let msg = load_message(&args.message)?;
    let proposal = plan_message(&root, &cfg, &msg)?;

    if matches!(args.format, OutputFormat::Json)
    {
        let out = json!({
            "proposal": proposal.files,
            "validation": proposal.validation,
            "tree": proposal.tree.as_ref().map(|t| t.files().map(|n| n.full_path.clone()).collect::<Vec<_>>()),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    if let Some(tree) = &proposal.tree
    {
        let label = if proposal
            .files
            .root_path
            .is_empty()
        {
            ".".to_string()
        }
        else
        {
            proposal
                .files
                .root_path
                .clone()
        };
        ptree::print_tree(&tree.to_ptree(&label, !ctx.no_color))?;
    }

    if proposal
        .files
        .operations
        .is_empty()
    {
        if !ctx.quiet
        {
            println!("No file operations proposed.");
        }
    }
    else
    {
        print_operations(&proposal.files.operations);
    }
    print_issues(&proposal.validation, ctx);

    if !ctx.quiet
    {
        let errors = proposal
            .validation
            .errors()
            .count();
        let warnings = proposal
            .validation
            .warnings()
            .count();
        println!(
            "{} operation(s), {errors} error(s), {warnings} warning(s)",
            proposal
                .files
                .operations
                .len()
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::core::proposal::OperationKind;

    #[test]
    fn plans_create_and_modify_against_workspace()
    {
        let dir = tempfile::tempdir().unwrap();
        let root = dunce::canonicalize(dir.path()).unwrap();
        std::fs::create_dir_all(root.join("src")).unwrap();
        std::fs::write(root.join("src/lib.rs"), "pub fn old() {}\n").unwrap();

        let msg = LoadedMessage {
            id: "m1".into(),
            text: "```rust:src/lib.rs\npub fn new() {}\n```\n\n```rust:src/util.rs\npub fn util() {}\n```\n".into(),
        };
        let proposal = plan_message(&root, &Config::default(), &msg).unwrap();

        let kinds: Vec<_> = proposal
            .files
            .file_operations()
            .map(|o| (o.path.as_str(), o.kind))
            .collect();
        assert!(kinds.contains(&("src/lib.rs", OperationKind::Modify)));
        assert!(kinds.contains(&("src/util.rs", OperationKind::Create)));
        assert!(proposal.validation.is_valid());
    }
}
