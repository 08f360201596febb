//! `fln infer`: run path inference over every applicable block.

use std::path::Path;

use anyhow::Result;
use owo_colors::OwoColorize;
use serde::Serialize;
use tabled::{Table, Tabled};
use tracing::instrument;

use crate::cli::{AppContext, InferArgs, OutputFormat};
use crate::cli_ext::common::{context_from_dir, context_from_paths, load_message, workspace_config, workspace_context, workspace_root};
use crate::core::fence;
use crate::core::infer::{ContextFile, InferenceEngine, InferenceHooks, InferenceStrategy, PathCandidate};
use crate::infra::config::Config;

/// Inference outcome for one block, flattened for output
#[derive(Debug, Clone, Serialize)]
pub struct InferenceRow
{
    pub block_id: String,
    pub sequence: usize,
    pub language: Option<String>,
    pub path: Option<String>,
    pub strategy: Option<InferenceStrategy>,
    pub confidence: f32,
    pub ambiguous: bool,
    pub alternatives: Vec<PathCandidate>,
    pub failure: Option<String>,
}

#[derive(Tabled)]
struct TableRow
{
    #[tabled(rename = "#")]
    sequence: usize,
    #[tabled(rename = "Path")]
    path: String,
    #[tabled(rename = "Strategy")]
    strategy: String,
    #[tabled(rename = "Confidence")]
    confidence: String,
}

/// Infer a path for each applicable block of `text`.
pub fn infer_message(
    message_id: &str,
    text: &str,
    context: &[ContextFile],
    cfg: &Config,
    pick_first: bool,
) -> Vec<InferenceRow>
{
    let engine = InferenceEngine::new(cfg.inference.clone());
    let blocks: Vec<_> = fence::parse_message(message_id, text)
        .into_iter()
        .filter(|b| {
            b.block_type
                .is_applicable()
        })
        .collect();

    let mut hooks = if pick_first { InferenceHooks::new().pick_first() } else { InferenceHooks::new() };
    let results = engine.infer_batch_with(&blocks, context, &mut hooks);

    blocks
        .iter()
        .zip(results)
        .map(|(b, r)| InferenceRow {
            block_id: b
                .id
                .clone(),
            sequence: b.sequence,
            language: b
                .language
                .clone(),
            failure: r.failure_reason(),
            path: r.path,
            strategy: r.strategy,
            confidence: r.confidence,
            ambiguous: r.is_ambiguous,
            alternatives: r.alternatives,
        })
        .collect()
}

fn gather_context(
    root: &Path,
    args: &InferArgs,
    cfg: &Config,
) -> Result<Vec<ContextFile>>
{
    if let Some(dir) = &args.context_dir
    {
        return context_from_dir(dir, cfg);
    }
    if !args
        .context
        .is_empty()
    {
        return context_from_paths(root, &args.context);
    }
    workspace_context(root, cfg)
}

#[instrument(skip_all, fields(input = %args.message.input.display()))]
pub fn run(
    args: InferArgs,
    ctx: &AppContext,
) -> Result<()>
{
    let root = workspace_root(Path::new("."))?;
    let cfg = workspace_config(&root)?;
    let msg = load_message(&args.message)?;
    let context = gather_context(&root, &args, &cfg)?;

    let rows = infer_message(&msg.id, &msg.text, &context, &cfg, args.pick_first);

    if matches!(args.format, OutputFormat::Json)
    {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    if rows.is_empty()
    {
        if !ctx.quiet
        {
            println!("No applicable code blocks found.");
        }
        return Ok(());
    }

    let table: Vec<TableRow> = rows
        .iter()
        .map(|r| TableRow {
            sequence: r.sequence,
            path: r
                .path
                .clone()
                .unwrap_or_else(|| "-".to_string()),
            strategy: r
                .strategy
                .map(|s| format!("{s:?}"))
                .unwrap_or_else(|| "-".to_string()),
            confidence: format!("{:.2}", r.confidence),
        })
        .collect();
    println!("{}", Table::new(table));

    for r in rows
        .iter()
        .filter(|r| r.ambiguous)
    {
        let line = format!("block {} is ambiguous:", r.sequence);
        if ctx.no_color
        {
            println!("{line}");
        }
        else
        {
            println!("{}", line.yellow());
        }
        for alt in &r.alternatives
        {
            println!("  - {} ({:.2})", alt.path, alt.confidence);
        }
    }
    for r in &rows
    {
        if let (None, Some(reason), false) = (&r.path, &r.failure, r.ambiguous)
        {
            if ctx.no_color
            {
                println!("block {}: {reason}", r.sequence);
            }
            else
            {
                println!("{} {reason}", format!("block {}:", r.sequence).red());
            }
        }
    }
    Ok(())
}
