//! Code block data model.
//!
//! A `PartialCodeBlock` is owned by the streaming parser while its fence
//! is open; closing (or truncating) the stream consumes it into an
//! immutable `CodeBlock`. Blocks from one message are grouped into a
//! `CodeProposal`.

use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::time::Instant;

/// Fence delimiter character
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FenceKind {
    Backtick,
    Tilde,
}

impl FenceKind {
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '`' => Some(FenceKind::Backtick),
            '~' => Some(FenceKind::Tilde),
            _ => None,
        }
    }

    pub fn as_char(self) -> char {
        match self {
            FenceKind::Backtick => '`',
            FenceKind::Tilde => '~',
        }
    }
}

/// Semantic role of a finished block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockType {
    CompleteFile,
    Snippet,
    Example,
    Command,
    Output,
    Config,
}

impl BlockType {
    /// Only these participate in file operations
    pub fn is_applicable(self) -> bool {
        matches!(
            self,
            BlockType::CompleteFile | BlockType::Snippet | BlockType::Config
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockStatus {
    Pending,
    Applied,
    Rejected,
    Skipped,
    Conflict,
    Error,
}

/// 1-based inclusive line span inside an existing file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineRange {
    pub start: usize,
    pub end: usize,
}

impl LineRange {
    /// Build a range; rejects zero and inverted spans.
    pub fn new(start: usize, end: usize) -> Option<Self> {
        (start >= 1 && end >= start).then_some(Self { start, end })
    }
}

/// In-progress block; the text buffer only ever grows.
#[derive(Debug, Clone)]
pub struct PartialCodeBlock {
    pub message_id: String,
    pub sequence: usize,
    pub language: Option<String>,
    pub display_language: Option<String>,
    pub target_path: Option<String>,
    pub line_range: Option<LineRange>,
    pub fence_kind: FenceKind,
    pub fence_len: usize,
    /// Char offset of the opening fence in the message
    pub start_offset: usize,
    pub started_at: Instant,
    buffer: String,
}

impl PartialCodeBlock {
    pub fn new(
        message_id: &str,
        sequence: usize,
        fence_kind: FenceKind,
        fence_len: usize,
        start_offset: usize,
    ) -> Self {
        Self {
            message_id: message_id.to_string(),
            sequence,
            language: None,
            display_language: None,
            target_path: None,
            line_range: None,
            fence_kind,
            fence_len,
            start_offset,
            started_at: Instant::now(),
            buffer: String::new(),
        }
    }

    pub fn push_str(&mut self, text: &str) {
        self.buffer.push_str(text);
    }

    pub fn content(&self) -> &str {
        &self.buffer
    }

    /// Consume the builder into an immutable, classified block.
    ///
    /// Leading blank lines and all trailing whitespace are dropped;
    /// indentation of the first code line is kept.
    pub fn finish(self, end_offset: usize, was_truncated: bool) -> CodeBlock {
        let content = trim_block_content(&self.buffer).to_string();
        let explicit_path = self
            .target_path
            .clone()
            .or_else(|| detect_content_path_hint(&content));
        let block_type = crate::core::classify::classify(
            &content,
            self.language.as_deref(),
            explicit_path.as_deref(),
        );

        CodeBlock {
            id: block_id(&self.message_id, self.sequence),
            message_id: self.message_id,
            sequence: self.sequence,
            content,
            language: self.language,
            display_language: self.display_language,
            target_path: explicit_path.clone(),
            explicit_path,
            block_type,
            line_range: self.line_range,
            source_range: self.start_offset..end_offset,
            confidence: 0.0,
            status: BlockStatus::Pending,
            was_truncated,
        }
    }
}

/// Finalized block; never mutated by the parser again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeBlock {
    pub id: String,
    pub message_id: String,
    pub sequence: usize,
    pub content: String,
    pub language: Option<String>,
    pub display_language: Option<String>,
    /// Path named on the fence line or in a `File:` comment
    pub explicit_path: Option<String>,
    /// Resolved target (explicit or inferred)
    pub target_path: Option<String>,
    pub block_type: BlockType,
    pub line_range: Option<LineRange>,
    /// Char range of the whole fenced region in the message
    pub source_range: Range<usize>,
    pub confidence: f32,
    pub status: BlockStatus,
    pub was_truncated: bool,
}

impl CodeBlock {
    pub fn line_count(&self) -> usize {
        self.content.lines().count()
    }
}

/// Deterministic block id from message id and sequence number
pub fn block_id(message_id: &str, sequence: usize) -> String {
    let key = format!("{message_id}#{sequence}");
    format!("{:016x}", xxhash_rust::xxh64::xxh64(key.as_bytes(), 0))
}

fn trim_block_content(raw: &str) -> &str {
    let trimmed_end = raw.trim_end();
    // Skip whole leading blank lines only
    let mut start = 0;
    for line in trimmed_end.split_inclusive('\n') {
        if line.trim().is_empty() {
            start += line.len();
        } else {
            break;
        }
    }
    &trimmed_end[start..]
}

/// Find `// File: path` / `# File: path` style hints in the first lines.
pub fn detect_content_path_hint(content: &str) -> Option<String> {
    use std::sync::LazyLock;
    static HINT: LazyLock<regex::Regex> = LazyLock::new(|| {
        regex::Regex::new(
            r#"(?i)^\s*(?://+|#+|--|/\*+|<!--|;+)\s*(?:file(?:name|path)?|path)\s*:\s*[`'"]?([^\s`'"*]+)"#,
        )
        .expect("valid regex")
    });

    content
        .lines()
        .filter(|l| !l.trim().is_empty())
        .take(3)
        .find_map(|line| HINT.captures(line))
        .map(|caps| crate::infra::utils::PathUtils::normalize(&caps[1]))
        .filter(|p| !p.is_empty())
}

/// Aggregate status shared by code and file-tree proposals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProposalStatus {
    Pending,
    PartiallyApplied,
    FullyApplied,
    Rejected,
}

impl ProposalStatus {
    /// Derive the aggregate from member counts.
    ///
    /// `resolved` counts members that will not change again
    /// (applied, rejected, skipped).
    pub fn from_counts(total: usize, applied: usize, rejected: usize, resolved: usize) -> Self {
        if total == 0 {
            return ProposalStatus::Pending;
        }
        if rejected == total {
            return ProposalStatus::Rejected;
        }
        match applied {
            0 => ProposalStatus::Pending,
            _ if resolved == total => ProposalStatus::FullyApplied,
            _ => ProposalStatus::PartiallyApplied,
        }
    }
}

/// All blocks extracted from one model message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeProposal {
    pub message_id: String,
    pub blocks: Vec<CodeBlock>,
    pub status: ProposalStatus,
}

impl CodeProposal {
    pub fn new(message_id: &str, blocks: Vec<CodeBlock>) -> Self {
        let mut p = Self {
            message_id: message_id.to_string(),
            blocks,
            status: ProposalStatus::Pending,
        };
        p.recompute_status();
        p
    }

    pub fn applicable(&self) -> impl Iterator<Item = &CodeBlock> {
        self.blocks.iter().filter(|b| b.block_type.is_applicable())
    }

    pub fn examples(&self) -> impl Iterator<Item = &CodeBlock> {
        self.of_type(BlockType::Example)
    }

    pub fn commands(&self) -> impl Iterator<Item = &CodeBlock> {
        self.of_type(BlockType::Command)
    }

    pub fn outputs(&self) -> impl Iterator<Item = &CodeBlock> {
        self.of_type(BlockType::Output)
    }

    fn of_type(&self, ty: BlockType) -> impl Iterator<Item = &CodeBlock> {
        self.blocks.iter().filter(move |b| b.block_type == ty)
    }

    /// Update one block's status and refresh the aggregate.
    pub fn set_block_status(&mut self, block_id: &str, status: BlockStatus) -> bool {
        let Some(block) = self.blocks.iter_mut().find(|b| b.id == block_id) else {
            return false;
        };
        block.status = status;
        self.recompute_status();
        true
    }

    /// Aggregate over applicable blocks only.
    pub fn recompute_status(&mut self) -> ProposalStatus {
        let (mut total, mut applied, mut rejected, mut resolved) = (0, 0, 0, 0);
        for b in self.applicable() {
            total += 1;
            match b.status {
                BlockStatus::Applied => {
                    applied += 1;
                    resolved += 1;
                }
                BlockStatus::Rejected => {
                    rejected += 1;
                    resolved += 1;
                }
                BlockStatus::Skipped => resolved += 1,
                _ => {}
            }
        }
        self.status = ProposalStatus::from_counts(total, applied, rejected, resolved);
        self.status
    }
}
