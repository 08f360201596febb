//! Multi-file proposals.
//!
//! Turns the classified, path-resolved blocks of one message (plus an
//! optional directory tree and prose like "rename `a` to `b`") into an
//! ordered list of `FileOperation`s and validates them as a whole.

use std::collections::HashSet;
use std::sync::LazyLock;

use aho_corasick::AhoCorasick;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::core::block::{CodeBlock, CodeProposal, LineRange, ProposalStatus};
use crate::core::conflict::{ConflictDetector, FileSnapshot};
use crate::core::fence;
use crate::core::infer::{ContextFile, InferenceEngine, InferenceHooks, InferenceResult, InferenceStrategy};
use crate::core::tree::{self, ParsedTree};
use crate::infra::config::{FileTreeParserOptions, InferenceOptions};
use crate::infra::utils::PathUtils;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    Create,
    Modify,
    Delete,
    Rename,
    Move,
    Mkdir,
    Unknown,
}

impl OperationKind {
    pub fn is_relocation(self) -> bool {
        matches!(self, OperationKind::Rename | OperationKind::Move)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationStatus {
    Pending,
    InProgress,
    Applied,
    Skipped,
    Failed,
    Conflict,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileOperation {
    /// Workspace-relative, forward-slash path
    pub path: String,
    pub kind: OperationKind,
    pub content: Option<String>,
    /// Target of a rename or move
    pub new_path: Option<String>,
    pub selected: bool,
    pub status: OperationStatus,
    /// Execution position; lower runs first
    pub order: usize,
    /// Id of the code block that produced this operation
    pub source_block: Option<String>,
    pub message_id: Option<String>,
    pub line_range: Option<LineRange>,
    pub language: Option<String>,
    /// Fingerprint taken when the proposal was built
    pub snapshot: Option<FileSnapshot>,
}

impl FileOperation {
    pub fn new(path: &str, kind: OperationKind) -> Self {
        Self {
            path: PathUtils::normalize(path),
            kind,
            content: None,
            new_path: None,
            selected: true,
            status: OperationStatus::Pending,
            order: 0,
            source_block: None,
            message_id: None,
            line_range: None,
            language: None,
            snapshot: None,
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_new_path(mut self, new_path: &str) -> Self {
        self.new_path = Some(PathUtils::normalize(new_path));
        self
    }

    pub fn with_line_range(mut self, range: LineRange) -> Self {
        self.line_range = Some(range);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum IssueSeverity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    pub severity: IssueSeverity,
    pub operation: Option<usize>,
    pub path: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProposalValidationResult {
    pub issues: Vec<ValidationIssue>,
}

impl ProposalValidationResult {
    /// Only zero-error proposals may be applied
    pub fn is_valid(&self) -> bool {
        self.errors().next().is_none()
    }

    pub fn errors(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.of(IssueSeverity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.of(IssueSeverity::Warning)
    }

    fn of(&self, severity: IssueSeverity) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(move |i| i.severity == severity)
    }

    fn push(&mut self, severity: IssueSeverity, op: Option<(usize, &str)>, message: impl Into<String>) {
        self.issues.push(ValidationIssue {
            severity,
            operation: op.map(|(i, _)| i),
            path: op.map(|(_, p)| p.to_string()),
            message: message.into(),
        });
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProposalError {
    #[error("invalid indicator phrases: {0}")]
    Phrases(#[from] aho_corasick::BuildError),

    #[error("proposal has {errors} validation error(s), first: {first}")]
    Invalid { errors: usize, first: String },

    #[error("proposal contains no file operations")]
    Empty,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileTreeProposal {
    pub message_id: String,
    /// Longest common directory of all file operations
    pub root_path: String,
    /// Tree text as the model printed it
    pub raw_tree: Option<String>,
    pub operations: Vec<FileOperation>,
    pub status: ProposalStatus,
}

impl FileTreeProposal {
    pub fn new(message_id: &str, operations: Vec<FileOperation>, raw_tree: Option<String>) -> Self {
        let mut p = Self {
            message_id: message_id.to_string(),
            root_path: String::new(),
            raw_tree,
            operations,
            status: ProposalStatus::Pending,
        };
        p.root_path = find_common_root(&p.operations);
        p.recompute_status();
        p
    }

    pub fn selected(&self) -> impl Iterator<Item = &FileOperation> {
        self.operations.iter().filter(|o| o.selected)
    }

    /// Non-directory operations
    pub fn file_operations(&self) -> impl Iterator<Item = &FileOperation> {
        self.operations.iter().filter(|o| o.kind != OperationKind::Mkdir)
    }

    pub fn set_selected(&mut self, index: usize, selected: bool) {
        if let Some(op) = self.operations.get_mut(index) {
            op.selected = selected;
        }
        self.recompute_status();
    }

    pub fn set_status(&mut self, index: usize, status: OperationStatus) {
        if let Some(op) = self.operations.get_mut(index) {
            op.status = status;
        }
        self.recompute_status();
    }

    /// Deselected operations count as rejected.
    pub fn recompute_status(&mut self) -> ProposalStatus {
        let total = self.operations.len();
        let rejected = self.operations.iter().filter(|o| !o.selected).count();
        let applied = self
            .operations
            .iter()
            .filter(|o| o.selected && o.status == OperationStatus::Applied)
            .count();
        let skipped = self
            .operations
            .iter()
            .filter(|o| o.selected && o.status == OperationStatus::Skipped)
            .count();
        self.status = ProposalStatus::from_counts(total, applied, rejected, applied + rejected + skipped);
        self.status
    }

    /// Check every operation and collect all issues.
    pub fn validate(&self, options: &FileTreeParserOptions) -> ProposalValidationResult {
        let mut result = ProposalValidationResult::default();

        if self.operations.is_empty() {
            result.push(IssueSeverity::Error, None, ProposalError::Empty.to_string());
            return result;
        }

        let mut seen: HashSet<(&str, Option<LineRange>)> = HashSet::new();
        let mut ranges: Vec<(&str, LineRange)> = Vec::new();
        let created: HashSet<&str> = self
            .operations
            .iter()
            .filter(|o| matches!(o.kind, OperationKind::Create | OperationKind::Modify))
            .map(|o| o.path.as_str())
            .collect();

        for (i, op) in self.operations.iter().enumerate() {
            let at = Some((i, op.path.as_str()));

            for p in std::iter::once(op.path.as_str()).chain(op.new_path.as_deref()) {
                if let Err(issue) = PathUtils::validate(p, options.max_path_length) {
                    result.push(IssueSeverity::Error, at, issue.to_string());
                } else if PathUtils::depth(p) > options.max_depth {
                    result.push(IssueSeverity::Error, at, format!("{p} nests deeper than {} levels", options.max_depth));
                }
            }

            match op.kind {
                OperationKind::Rename | OperationKind::Move if op.new_path.is_none() => {
                    result.push(IssueSeverity::Error, at, "rename or move without a target path");
                }
                OperationKind::Unknown => {
                    result.push(IssueSeverity::Warning, at, "operation kind could not be determined");
                }
                OperationKind::Create if op.content.is_none() => {
                    result.push(IssueSeverity::Info, at, "file will be created empty");
                }
                OperationKind::Delete if created.contains(op.path.as_str()) => {
                    result.push(IssueSeverity::Warning, at, "file is both written and deleted");
                }
                _ => {}
            }

            if !matches!(op.kind, OperationKind::Create | OperationKind::Modify) {
                continue;
            }
            if let Some(range) = op.line_range {
                if let Some((_, prev)) = ranges
                    .iter()
                    .find(|(p, r)| *p == op.path && r.start <= range.end && range.start <= r.end)
                {
                    result.push(
                        IssueSeverity::Error,
                        at,
                        format!(
                            "lines {}-{} overlap another edit to lines {}-{}",
                            range.start, range.end, prev.start, prev.end
                        ),
                    );
                }
                ranges.push((op.path.as_str(), range));
            } else if !seen.insert((op.path.as_str(), None)) {
                result.push(IssueSeverity::Warning, at, "path is written more than once");
            }
        }

        let files = self.file_operations().count();
        if self.raw_tree.is_some() && files < options.minimum_files_for_proposal {
            result.push(
                IssueSeverity::Error,
                None,
                format!(
                    "tree proposal has {files} file(s), at least {} required",
                    options.minimum_files_for_proposal
                ),
            );
        }
        result
    }

    pub fn ensure_valid(&self, options: &FileTreeParserOptions) -> Result<ProposalValidationResult, ProposalError> {
        let result = self.validate(options);
        let errors: Vec<_> = result.errors().collect();
        if let Some(first) = errors.first() {
            return Err(ProposalError::Invalid {
                errors: errors.len(),
                first: first.message.clone(),
            });
        }
        Ok(result)
    }
}

/// Longest common directory across all non-directory operations.
pub fn find_common_root(operations: &[FileOperation]) -> String {
    let paths: Vec<&str> = operations
        .iter()
        .filter(|o| o.kind != OperationKind::Mkdir)
        .map(|o| o.path.as_str())
        .collect();
    PathUtils::common_root(&paths)
}

/// Everything derived from one message
#[derive(Debug, Clone)]
pub struct MessageProposal {
    pub code: CodeProposal,
    pub files: FileTreeProposal,
    /// Inference outcome per block id, in block order
    pub inference: Vec<(String, InferenceResult)>,
    pub tree: Option<ParsedTree>,
    pub validation: ProposalValidationResult,
}

static RENAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\brename\s+`([^`\s]+)`\s+(?:to|as|into)\s+`([^`\s]+)`").expect("valid regex")
});

static MOVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bmove\s+`([^`\s]+)`\s+(?:to|into|under)\s+`([^`\s]+)`").expect("valid regex")
});

static DELETE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:delete|remove)\s+(?:the\s+)?(?:file\s+)?`([^`\s]+)`").expect("valid regex")
});

pub struct ProposalBuilder {
    options: FileTreeParserOptions,
    engine: InferenceEngine,
    phrases: AhoCorasick,
    detector: Option<ConflictDetector>,
}

impl ProposalBuilder {
    pub fn new(options: FileTreeParserOptions, inference: InferenceOptions) -> Result<Self, ProposalError> {
        let phrases = AhoCorasick::builder()
            .ascii_case_insensitive(true)
            .build(&options.indicator_phrases)?;
        Ok(Self {
            options,
            engine: InferenceEngine::new(inference),
            phrases,
            detector: None,
        })
    }

    /// Snapshot targets and detect existing files under this workspace.
    pub fn with_workspace(mut self, detector: ConflictDetector) -> Self {
        self.detector = Some(detector);
        self
    }

    pub fn options(&self) -> &FileTreeParserOptions {
        &self.options
    }

    /// First fenced tree that the surrounding prose announces.
    pub fn detect_tree<'b>(&self, message: &str, blocks: &'b [CodeBlock]) -> Option<&'b CodeBlock> {
        blocks.iter().find(|b| {
            if !tree::looks_like_tree(&b.content) {
                return false;
            }
            if !self.options.require_indicator_phrase {
                return true;
            }
            let before: String = message.chars().take(b.source_range.start).collect();
            self.phrases.is_match(&before)
        })
    }

    /// Full pipeline: parse, classify, infer, detect tree, build operations.
    #[instrument(level = "debug", skip_all, fields(message = message_id))]
    pub fn from_message(
        &self,
        message_id: &str,
        text: &str,
        context: &[ContextFile],
        hooks: &mut InferenceHooks<'_>,
    ) -> MessageProposal {
        let mut blocks = fence::parse_message(message_id, text);
        let tree_block_id = self.detect_tree(text, &blocks).map(|b| b.id.clone());

        let mut inference = Vec::new();
        for block in blocks.iter_mut() {
            if Some(&block.id) == tree_block_id.as_ref() || !block.block_type.is_applicable() {
                continue;
            }
            let result = self.engine.infer_with(block, context, hooks);
            result.apply_to(block);
            inference.push((block.id.clone(), result));
        }

        let tree_block = tree_block_id
            .as_ref()
            .and_then(|id| blocks.iter().find(|b| &b.id == id));
        let parsed = tree_block.map(|b| tree::parse_tree(&b.content, self.options.tab_width, self.options.max_depth));

        let explicit: HashSet<&str> = inference
            .iter()
            .filter(|(_, r)| r.strategy == Some(InferenceStrategy::ExplicitPath))
            .map(|(id, _)| id.as_str())
            .collect();

        let mut ops: Vec<FileOperation> = blocks
            .iter()
            .filter(|b| Some(&b.id) != tree_block_id.as_ref())
            .filter_map(|b| self.block_operation(b))
            .collect();

        if let Some(parsed) = &parsed {
            self.merge_tree(parsed, &mut ops, &explicit);
        }
        let prose = prose_outside_blocks(text, &blocks);
        ops.extend(relocations_from_prose(&prose));
        for op in ops.iter_mut() {
            op.message_id = Some(message_id.to_string());
        }

        order_operations(&mut ops);
        self.take_snapshots(&mut ops);

        let files = FileTreeProposal::new(message_id, ops, tree_block.map(|b| b.content.clone()));
        let validation = files.validate(&self.options);
        debug!(
            operations = files.operations.len(),
            errors = validation.errors().count(),
            "proposal built"
        );

        MessageProposal {
            code: CodeProposal::new(message_id, blocks),
            files,
            inference,
            tree: parsed,
            validation,
        }
    }

    fn exists(&self, rel: &str) -> bool {
        self.detector
            .as_ref()
            .and_then(|d| PathUtils::resolve_in(d.root(), rel))
            .is_some_and(|p| p.exists())
    }

    fn block_operation(&self, block: &CodeBlock) -> Option<FileOperation> {
        if !block.block_type.is_applicable() {
            return None;
        }
        let path = block.target_path.as_deref()?;
        let kind = if block.line_range.is_some() || self.exists(path) {
            OperationKind::Modify
        } else {
            OperationKind::Create
        };

        let mut op = FileOperation::new(path, kind).with_content(block.content.clone());
        op.source_block = Some(block.id.clone());
        op.line_range = block.line_range;
        op.language = block.language.clone();
        // Truncated output is kept but must be opted into
        if block.was_truncated {
            op.selected = false;
        }
        Some(op)
    }

    /// Add directories and unmatched files from the tree; align block paths.
    fn merge_tree(&self, parsed: &ParsedTree, ops: &mut Vec<FileOperation>, explicit: &HashSet<&str>) {
        let prefix = strip_prefix_for(parsed, ops);
        let rel = |full: &str| -> String {
            match &prefix {
                Some(root) => full
                    .strip_prefix(root.as_str())
                    .map(|r| r.trim_start_matches('/').to_string())
                    .unwrap_or_else(|| full.to_string()),
                None => full.to_string(),
            }
        };

        for node in parsed.directories() {
            let path = rel(&node.full_path);
            if path.is_empty() || self.exists(&path) {
                continue;
            }
            ops.push(FileOperation::new(&path, OperationKind::Mkdir));
        }

        for node in parsed.files() {
            let path = rel(&node.full_path);
            let matched = ops.iter_mut().find(|o| {
                o.kind != OperationKind::Mkdir
                    && (o.path == path || path.ends_with(&format!("/{}", o.path)) || o.path.ends_with(&format!("/{path}")))
            });
            match matched {
                Some(op) => {
                    let from_explicit = op.source_block.as_deref().is_some_and(|id| explicit.contains(id));
                    if !from_explicit && op.path != path {
                        debug!(from = %op.path, to = %path, "block path aligned with tree");
                        op.path = path.clone();
                        if op.line_range.is_none() {
                            op.kind = if self.exists(&path) {
                                OperationKind::Modify
                            } else {
                                OperationKind::Create
                            };
                        }
                    }
                }
                None if !self.exists(&path) => {
                    let mut op = FileOperation::new(&path, OperationKind::Create);
                    op.language = crate::core::language::from_path(&path).map(|l| l.name.to_string());
                    ops.push(op);
                }
                None => {}
            }
        }
    }

    fn take_snapshots(&self, ops: &mut [FileOperation]) {
        let Some(detector) = &self.detector else {
            return;
        };
        for op in ops.iter_mut().filter(|o| o.kind != OperationKind::Mkdir) {
            op.snapshot = detector.snapshot(&op.path).ok();
        }
    }
}

/// Strip a single top-level tree directory when block paths are relative
/// to the inside of it.
fn strip_prefix_for(parsed: &ParsedTree, ops: &[FileOperation]) -> Option<String> {
    let [root] = parsed.roots.as_slice() else {
        return None;
    };
    let root = parsed.node(*root);
    if !root.is_directory {
        return None;
    }
    let prefix = format!("{}/", root.full_path);
    let inner: HashSet<&str> = parsed
        .files()
        .filter_map(|n| n.full_path.strip_prefix(&prefix))
        .collect();
    let matches_inner = ops.iter().any(|o| inner.contains(o.path.as_str()));
    let matches_outer = ops.iter().any(|o| o.path.starts_with(&prefix));
    (matches_inner && !matches_outer).then(|| root.full_path.clone())
}

/// Message text with every fenced region removed
fn prose_outside_blocks(text: &str, blocks: &[CodeBlock]) -> String {
    text.chars()
        .enumerate()
        .filter(|(i, _)| !blocks.iter().any(|b| b.source_range.contains(i)))
        .map(|(_, c)| c)
        .collect()
}

/// Rename / move / delete instructions written in prose with backticked paths.
pub fn relocations_from_prose(prose: &str) -> Vec<FileOperation> {
    let mut ops = Vec::new();

    for caps in RENAME.captures_iter(prose) {
        let src = PathUtils::normalize(&caps[1]);
        let mut dst = PathUtils::normalize(&caps[2]);
        if !dst.contains('/')
            && let Some(parent) = PathUtils::parent(&src)
        {
            dst = format!("{parent}/{dst}");
        }
        let kind = if PathUtils::parent(&src) == PathUtils::parent(&dst) {
            OperationKind::Rename
        } else {
            OperationKind::Move
        };
        ops.push(FileOperation::new(&src, kind).with_new_path(&dst));
    }

    for caps in MOVE.captures_iter(prose) {
        let src = PathUtils::normalize(&caps[1]);
        let raw_dst = &caps[2];
        let dst = if raw_dst.ends_with('/') || !raw_dst.contains('.') {
            let name = src.rsplit('/').next().unwrap_or(&src);
            format!("{}/{name}", PathUtils::normalize(raw_dst))
        } else {
            PathUtils::normalize(raw_dst)
        };
        ops.push(FileOperation::new(&src, OperationKind::Move).with_new_path(&dst));
    }

    for caps in DELETE.captures_iter(prose) {
        ops.push(FileOperation::new(&caps[1], OperationKind::Delete));
    }
    ops
}

/// Dependency-safe order: directories (shallow first), relocations of
/// existing files, writes, relocations of files written in this batch,
/// then deletes.
pub fn order_operations(ops: &mut [FileOperation]) {
    let written: HashSet<String> = ops
        .iter()
        .filter(|o| matches!(o.kind, OperationKind::Create | OperationKind::Modify))
        .map(|o| o.path.clone())
        .collect();

    ops.sort_by_key(|o| {
        let group = match o.kind {
            OperationKind::Mkdir => 0,
            OperationKind::Rename | OperationKind::Move if !written.contains(&o.path) => 1,
            OperationKind::Create | OperationKind::Modify | OperationKind::Unknown => 2,
            OperationKind::Rename | OperationKind::Move => 3,
            OperationKind::Delete => 4,
        };
        let depth = if o.kind == OperationKind::Mkdir {
            PathUtils::depth(&o.path)
        } else {
            0
        };
        (group, depth, o.path.clone())
    });
    for (i, op) in ops.iter_mut().enumerate() {
        op.order = i;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> ProposalBuilder {
        ProposalBuilder::new(FileTreeParserOptions::default(), InferenceOptions::default()).unwrap()
    }

    #[test]
    fn common_root_of_operations() {
        let ops: Vec<_> = ["src/Models/User.cs", "src/Models/Product.cs", "src/Services/X.cs"]
            .iter()
            .map(|p| FileOperation::new(p, OperationKind::Create))
            .collect();
        assert_eq!(find_common_root(&ops), "src");

        let ops: Vec<_> = ["a/x.rs", "b/y.rs"]
            .iter()
            .map(|p| FileOperation::new(p, OperationKind::Create))
            .collect();
        assert_eq!(find_common_root(&ops), "");
    }

    #[test]
    fn ordering_puts_dirs_first_and_deletes_last() {
        let mut ops = vec![
            FileOperation::new("old.rs", OperationKind::Delete),
            FileOperation::new("src/new.rs", OperationKind::Create),
            FileOperation::new("src/a/b", OperationKind::Mkdir),
            FileOperation::new("src", OperationKind::Mkdir),
            FileOperation::new("src/new.rs", OperationKind::Rename).with_new_path("src/newer.rs"),
            FileOperation::new("legacy.rs", OperationKind::Move).with_new_path("src/legacy.rs"),
        ];
        order_operations(&mut ops);
        let seq: Vec<_> = ops.iter().map(|o| (o.kind, o.path.as_str())).collect();
        assert_eq!(
            seq,
            vec![
                (OperationKind::Mkdir, "src"),
                (OperationKind::Mkdir, "src/a/b"),
                (OperationKind::Move, "legacy.rs"),
                (OperationKind::Create, "src/new.rs"),
                (OperationKind::Rename, "src/new.rs"),
                (OperationKind::Delete, "old.rs"),
            ]
        );
        assert_eq!(ops.iter().map(|o| o.order).collect::<Vec<_>>(), vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn validation_collects_every_issue() {
        let ops = vec![
            FileOperation::new("ok.rs", OperationKind::Create).with_content("x"),
            FileOperation {
                path: "../escape.rs".into(),
                ..FileOperation::new("x", OperationKind::Create)
            },
            FileOperation::new("has space.rs", OperationKind::Modify),
            FileOperation::new("a.rs", OperationKind::Rename),
        ];
        let p = FileTreeProposal::new("m", ops, None);
        let v = p.validate(&FileTreeParserOptions::default());
        assert!(!v.is_valid());
        assert_eq!(v.errors().count(), 3);
        assert!(p.ensure_valid(&FileTreeParserOptions::default()).is_err());
    }

    #[test]
    fn overlapping_line_ranges_on_one_file_are_errors() {
        let range = |a, b| LineRange::new(a, b).unwrap();
        let edit = |a, b| FileOperation::new("lib.rs", OperationKind::Modify).with_line_range(range(a, b));
        let p = FileTreeProposal::new("m", vec![edit(2, 2), edit(5, 5)], None);
        assert!(p.validate(&FileTreeParserOptions::default()).is_valid());

        let p = FileTreeProposal::new("m", vec![edit(2, 4), edit(4, 6)], None);
        let v = p.validate(&FileTreeParserOptions::default());
        assert_eq!(v.errors().count(), 1);
    }

    #[test]
    fn tree_proposal_below_minimum_is_rejected() {
        let ops = vec![FileOperation::new("only.rs", OperationKind::Create).with_content("x")];
        let p = FileTreeProposal::new("m", ops, Some("only.rs".into()));
        let v = p.validate(&FileTreeParserOptions::default());
        assert!(!v.is_valid());
    }

    #[test]
    fn prose_relocations_are_found() {
        let ops = relocations_from_prose(
            "First rename `src/a.rs` to `b.rs`, then move `lib/c.rs` into `core/`. Finally delete `old/d.rs`.",
        );
        assert_eq!(ops.len(), 3);
        assert_eq!(ops[0].kind, OperationKind::Rename);
        assert_eq!(ops[0].new_path.as_deref(), Some("src/b.rs"));
        assert_eq!(ops[1].kind, OperationKind::Move);
        assert_eq!(ops[1].new_path.as_deref(), Some("core/c.rs"));
        assert_eq!(ops[2].kind, OperationKind::Delete);
    }

    #[test]
    fn tree_needs_indicator_phrase() {
        let msg = "Here you go:\n```\nsrc/\n├── a.rs\n└── b.rs\n```\n";
        let blocks = fence::parse_message("m", msg);
        assert!(builder().detect_tree(msg, &blocks).is_none());

        let msg = "Project structure:\n```\nsrc/\n├── a.rs\n└── b.rs\n```\n";
        let blocks = fence::parse_message("m", msg);
        assert!(builder().detect_tree(msg, &blocks).is_some());
    }

    #[test]
    fn status_follows_operations() {
        let ops = vec![
            FileOperation::new("a.rs", OperationKind::Create),
            FileOperation::new("b.rs", OperationKind::Create),
        ];
        let mut p = FileTreeProposal::new("m", ops, None);
        p.set_status(0, OperationStatus::Applied);
        assert_eq!(p.status, ProposalStatus::PartiallyApplied);
        p.set_selected(1, false);
        assert_eq!(p.status, ProposalStatus::FullyApplied);
        p.set_selected(0, false);
        assert_eq!(p.status, ProposalStatus::Rejected);
    }
}
