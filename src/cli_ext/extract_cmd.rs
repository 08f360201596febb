//! `fln extract`: stream-parse a message and list its code blocks.
//!
//! With `--chunk N` the text is fed N characters at a time, the way a
//! model stream arrives; the blocks are the same either way.

use anyhow::Result;
use owo_colors::OwoColorize;
use serde::Serialize;
use tabled::{Table, Tabled};
use tracing::{debug, instrument};

use crate::cli::{AppContext, ExtractArgs, OutputFormat};
use crate::cli_ext::common::load_message;
use crate::core::block::CodeBlock;
use crate::core::fence::{FenceError, FenceEvent, FenceParser};

/// Everything the parser reported for one message
#[derive(Debug, Default, Serialize)]
pub struct ExtractReport
{
    pub message_id: String,
    pub characters: usize,
    pub content_events: usize,
    pub blocks: Vec<CodeBlock>,
    pub errors: Vec<String>,
    #[serde(skip)]
    pub diagnostics: Vec<FenceError>,
}

#[derive(Tabled)]
struct BlockRow
{
    #[tabled(rename = "#")]
    sequence: usize,
    #[tabled(rename = "Language")]
    language: String,
    #[tabled(rename = "Type")]
    block_type: String,
    #[tabled(rename = "Path")]
    path: String,
    #[tabled(rename = "Lines")]
    lines: usize,
    #[tabled(rename = "Truncated")]
    truncated: String,
}

/// Feed `text` through a fresh parser in `chunk`-character pieces.
pub fn extract_blocks(
    message_id: &str,
    text: &str,
    chunk: usize,
) -> ExtractReport
{
    let mut parser = FenceParser::new(message_id);
    let mut events = Vec::new();

    if chunk == 0
    {
        events.extend(parser.feed_str(text));
    }
    else
    {
        let chars: Vec<char> = text
            .chars()
            .collect();
        for piece in chars.chunks(chunk)
        {
            let s: String = piece
                .iter()
                .collect();
            events.extend(parser.feed_str(&s));
        }
    }
    events.extend(parser.complete());

    let mut report = ExtractReport {
        message_id: message_id.to_string(),
        characters: parser.total_characters_processed(),
        ..ExtractReport::default()
    };

    for event in events
    {
        match event
        {
            FenceEvent::BlockStarted { sequence, language, .. } =>
            {
                debug!(sequence, language = ?language, "block started");
            }
            FenceEvent::ContentAdded { .. } => report.content_events += 1,
            FenceEvent::BlockCompleted { block, duration, was_truncated } =>
            {
                debug!(sequence = block.sequence, ?duration, was_truncated, "block completed");
                report
                    .blocks
                    .push(block);
            }
            FenceEvent::ParseError(err) =>
            {
                report
                    .errors
                    .push(err.to_string());
                report
                    .diagnostics
                    .push(err);
            }
        }
    }
    report
}

#[instrument(skip_all, fields(input = %args.message.input.display()))]
pub fn run(
    args: ExtractArgs,
    ctx: &AppContext,
) -> Result<()>
{
    let msg = load_message(&args.message)?;
    let report = extract_blocks(&msg.id, &msg.text, args.chunk);

    if matches!(args.format, OutputFormat::Json)
    {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for diag in &report.diagnostics
    {
        let rendered = miette::Report::new(diag.clone()).with_source_code(msg.text.clone());
        eprintln!("{rendered:?}");
    }

    if report
        .blocks
        .is_empty()
    {
        if !ctx.quiet
        {
            println!("No code blocks found.");
        }
        return Ok(());
    }

    let rows: Vec<BlockRow> = report
        .blocks
        .iter()
        .map(|b| BlockRow {
            sequence: b.sequence,
            language: b
                .display_language
                .clone()
                .unwrap_or_else(|| "-".to_string()),
            block_type: format!("{:?}", b.block_type),
            path: b
                .explicit_path
                .clone()
                .unwrap_or_else(|| "-".to_string()),
            lines: b.line_count(),
            truncated: if b.was_truncated { "yes".into() } else { String::new() },
        })
        .collect();
    println!("{}", Table::new(rows));

    if args.show_content
    {
        for b in &report.blocks
        {
            let header = format!("--- block {} ---", b.sequence);
            if ctx.no_color
            {
                println!("{header}");
            }
            else
            {
                println!("{}", header.dimmed());
            }
            println!("{}", b.content);
        }
    }

    if !ctx.quiet
    {
        println!(
            "{} block(s), {} characters, {} content event(s)",
            report
                .blocks
                .len(),
            report.characters,
            report.content_events
        );
    }
    Ok(())
}
