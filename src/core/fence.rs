//! Streaming fence parser.
//!
//! Character-level state machine that finds fenced code blocks while a
//! message is still arriving. Every input path (`feed_char`, `feed_str`,
//! `feed_tokens`) goes through the same per-character step, so the
//! completed blocks never depend on how the text was chunked. Only the
//! granularity of `ContentAdded` events differs: content is coalesced
//! per feed call.

use std::sync::LazyLock;
use std::time::Duration;

use miette::{Diagnostic, SourceSpan};
use regex::Regex;
use tracing::{debug, trace};

use crate::core::block::{CodeBlock, FenceKind, LineRange, PartialCodeBlock};
use crate::core::language;
use crate::infra::utils::PathUtils;

/// Minimum run of fence characters that opens a block
pub const MIN_FENCE_LEN: usize = 3;

/// Leading spaces tolerated before a fence
const MAX_FENCE_INDENT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserState {
    Text,
    FenceOpening,
    CodeContent,
    FenceClosing,
}

/// Recoverable parse problems; the stream always continues.
#[derive(Debug, Clone, PartialEq, Eq, Diagnostic, thiserror::Error)]
pub enum FenceError {
    #[error("unrecognized fence info `{info}`")]
    #[diagnostic(
        code(fenceline::fence::info),
        help("expected `lang`, `lang:path` or `lang path`")
    )]
    MalformedInfo {
        info: String,
        #[label("fence line")]
        span: SourceSpan,
    },

    #[error("code block {sequence} was not closed before the stream ended")]
    #[diagnostic(code(fenceline::fence::unterminated))]
    Unterminated {
        sequence: usize,
        #[label("opened here")]
        span: SourceSpan,
    },
}

#[derive(Debug, Clone)]
pub enum FenceEvent {
    BlockStarted {
        sequence: usize,
        language: Option<String>,
        target_path: Option<String>,
        start_offset: usize,
    },
    ContentAdded {
        sequence: usize,
        text: String,
    },
    BlockCompleted {
        block: CodeBlock,
        duration: Duration,
        was_truncated: bool,
    },
    ParseError(FenceError),
}

/// Parsed fence info string
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FenceInfo {
    pub language: Option<String>,
    /// Tag exactly as written on the fence line
    pub display_language: Option<String>,
    pub path: Option<String>,
    pub line_range: Option<LineRange>,
    pub malformed: bool,
}

/// Line-start scan while in `Text`
#[derive(Debug, Clone, Copy)]
struct LineScan {
    eligible: bool,
    indent: usize,
    run_char: Option<char>,
    run_len: usize,
    line_start: usize,
    line_start_byte: usize,
}

impl LineScan {
    fn at(line_start: usize, line_start_byte: usize) -> Self {
        Self {
            eligible: true,
            indent: 0,
            run_char: None,
            run_len: 0,
            line_start,
            line_start_byte,
        }
    }
}

#[derive(Debug)]
struct Opening {
    kind: FenceKind,
    len: usize,
    start: usize,
    start_byte: usize,
    info: String,
}

/// Candidate closing fence held back from the content buffer
#[derive(Debug, Default)]
struct Closing {
    pending: String,
    indent: usize,
    run: usize,
    trailing: bool,
}

/// Events produced by a single feed call
#[derive(Default)]
struct Batch {
    events: Vec<FenceEvent>,
    content: String,
    sequence: usize,
}

impl Batch {
    fn flush_content(&mut self) {
        if !self.content.is_empty() {
            self.events.push(FenceEvent::ContentAdded {
                sequence: self.sequence,
                text: std::mem::take(&mut self.content),
            });
        }
    }

    fn finish(mut self) -> Vec<FenceEvent> {
        self.flush_content();
        self.events
    }
}

/// One parser per in-flight message; callers serialize feeds.
#[derive(Debug)]
pub struct FenceParser {
    message_id: String,
    state: ParserState,
    scan: LineScan,
    opening: Option<Opening>,
    closing: Closing,
    at_line_start: bool,
    current: Option<PartialCodeBlock>,
    /// Byte offset of the line that opened `current`
    open_byte: usize,
    completed: Vec<CodeBlock>,
    next_sequence: usize,
    chars: usize,
    bytes: usize,
}

impl FenceParser {
    pub fn new(message_id: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            state: ParserState::Text,
            scan: LineScan::at(0, 0),
            opening: None,
            closing: Closing::default(),
            at_line_start: true,
            current: None,
            open_byte: 0,
            completed: Vec::new(),
            next_sequence: 0,
            chars: 0,
            bytes: 0,
        }
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn state(&self) -> ParserState {
        self.state
    }

    pub fn total_characters_processed(&self) -> usize {
        self.chars
    }

    pub fn completed_blocks(&self) -> &[CodeBlock] {
        &self.completed
    }

    pub fn current_block(&self) -> Option<&PartialCodeBlock> {
        self.current.as_ref()
    }

    /// Hand the finished blocks to the caller, leaving the parser running.
    pub fn take_blocks(&mut self) -> Vec<CodeBlock> {
        std::mem::take(&mut self.completed)
    }

    /// Start over for a new message.
    pub fn reset(&mut self, message_id: impl Into<String>) {
        *self = Self::new(message_id);
    }

    /// Drop every block and all scan state.
    pub fn dispose(&mut self) {
        self.reset(String::new());
    }

    pub fn feed_char(&mut self, c: char) -> Vec<FenceEvent> {
        let mut batch = self.batch();
        self.step(c, &mut batch);
        batch.finish()
    }

    pub fn feed_str(&mut self, text: &str) -> Vec<FenceEvent> {
        let mut batch = self.batch();
        for c in text.chars() {
            self.step(c, &mut batch);
        }
        batch.finish()
    }

    /// Feed a sequence of model tokens in order.
    pub fn feed_tokens<I, S>(&mut self, tokens: I) -> Vec<FenceEvent>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut batch = self.batch();
        for token in tokens {
            for c in token.as_ref().chars() {
                self.step(c, &mut batch);
            }
        }
        batch.finish()
    }

    /// Signal end of stream. An open block is kept as a truncated block.
    pub fn complete(&mut self) -> Vec<FenceEvent> {
        let mut batch = self.batch();

        match self.state {
            ParserState::Text => {
                if self.scan.run_len >= MIN_FENCE_LEN {
                    self.begin_opening();
                    self.finish_opening(&mut batch);
                }
            }
            ParserState::FenceOpening => self.finish_opening(&mut batch),
            ParserState::FenceClosing => {
                let required = self.current.as_ref().map_or(usize::MAX, |b| b.fence_len);
                if self.closing.run >= required {
                    self.close_block(&mut batch, false);
                } else {
                    self.flush_closing(&mut batch);
                }
            }
            ParserState::CodeContent => {}
        }

        if let Some(block) = self.current.as_ref() {
            let start_byte = self.open_byte;
            batch.flush_content();
            batch.events.push(FenceEvent::ParseError(FenceError::Unterminated {
                sequence: block.sequence,
                span: (start_byte, self.bytes.saturating_sub(start_byte)).into(),
            }));
            self.close_block(&mut batch, true);
        }

        self.state = ParserState::Text;
        self.scan = LineScan::at(self.chars, self.bytes);
        batch.finish()
    }

    fn batch(&self) -> Batch {
        Batch {
            sequence: self.current.as_ref().map_or(0, |b| b.sequence),
            ..Batch::default()
        }
    }

    fn step(&mut self, c: char, batch: &mut Batch) {
        match self.state {
            ParserState::Text => self.step_text(c, batch),
            ParserState::FenceOpening => self.step_opening(c, batch),
            ParserState::CodeContent => self.step_content(c, batch),
            ParserState::FenceClosing => self.step_closing(c, batch),
        }
        self.chars += 1;
        self.bytes += c.len_utf8();
    }

    fn step_text(&mut self, c: char, batch: &mut Batch) {
        if let Some(run_char) = self.scan.run_char {
            if c == run_char {
                self.scan.run_len += 1;
                return;
            }
            if self.scan.run_len >= MIN_FENCE_LEN {
                self.begin_opening();
                self.step_opening(c, batch);
                return;
            }
            self.scan.run_char = None;
            self.scan.eligible = false;
        }

        if c == '\n' {
            self.scan = LineScan::at(self.chars + 1, self.bytes + 1);
            return;
        }
        if !self.scan.eligible {
            return;
        }
        match c {
            ' ' if self.scan.indent < MAX_FENCE_INDENT => self.scan.indent += 1,
            '`' | '~' => {
                self.scan.run_char = Some(c);
                self.scan.run_len = 1;
            }
            _ => self.scan.eligible = false,
        }
    }

    fn begin_opening(&mut self) {
        let kind = self
            .scan
            .run_char
            .and_then(FenceKind::from_char)
            .unwrap_or(FenceKind::Backtick);
        self.opening = Some(Opening {
            kind,
            len: self.scan.run_len,
            start: self.scan.line_start,
            start_byte: self.scan.line_start_byte,
            info: String::new(),
        });
        self.state = ParserState::FenceOpening;
    }

    fn step_opening(&mut self, c: char, batch: &mut Batch) {
        if c == '\n' {
            self.finish_opening(batch);
            return;
        }
        if let Some(opening) = self.opening.as_mut() {
            opening.info.push(c);
        }
    }

    /// Info line done: open the block, or fall back to text for inline code.
    fn finish_opening(&mut self, batch: &mut Batch) {
        let Some(opening) = self.opening.take() else {
            self.state = ParserState::Text;
            return;
        };

        // Backtick fences cannot carry backticks in their info string
        if opening.kind == FenceKind::Backtick && opening.info.contains('`') {
            trace!(info = %opening.info, "inline code span, not a fence");
            self.state = ParserState::Text;
            self.scan = LineScan::at(self.chars + 1, self.bytes + 1);
            return;
        }

        let info = parse_info(&opening.info);
        if info.malformed {
            batch.events.push(FenceEvent::ParseError(FenceError::MalformedInfo {
                info: opening.info.trim().to_string(),
                span: (opening.start_byte, self.bytes - opening.start_byte).into(),
            }));
        }

        let sequence = self.next_sequence;
        self.next_sequence += 1;

        let mut block = PartialCodeBlock::new(
            &self.message_id,
            sequence,
            opening.kind,
            opening.len,
            opening.start,
        );
        block.language = info.language;
        block.display_language = info.display_language;
        block.target_path = info.path;
        block.line_range = info.line_range;

        debug!(
            sequence,
            language = ?block.language,
            path = ?block.target_path,
            "code block started"
        );
        batch.flush_content();
        batch.sequence = sequence;
        batch.events.push(FenceEvent::BlockStarted {
            sequence,
            language: block.language.clone(),
            target_path: block.target_path.clone(),
            start_offset: block.start_offset,
        });

        self.current = Some(block);
        self.open_byte = opening.start_byte;
        self.state = ParserState::CodeContent;
        self.at_line_start = true;
    }

    fn step_content(&mut self, c: char, batch: &mut Batch) {
        let fence_char = self.current.as_ref().map(|b| b.fence_kind.as_char());
        if self.at_line_start && (c == ' ' || Some(c) == fence_char) {
            self.closing = Closing::default();
            self.state = ParserState::FenceClosing;
            self.step_closing(c, batch);
            return;
        }
        self.append(c, batch);
        self.at_line_start = c == '\n';
    }

    fn step_closing(&mut self, c: char, batch: &mut Batch) {
        let Some((fence_char, required)) = self
            .current
            .as_ref()
            .map(|b| (b.fence_kind.as_char(), b.fence_len))
        else {
            self.state = ParserState::Text;
            return;
        };

        if c == '\n' {
            if self.closing.run >= required {
                self.close_block(batch, false);
                self.scan = LineScan::at(self.chars + 1, self.bytes + 1);
            } else {
                self.flush_closing(batch);
                self.append('\n', batch);
                self.at_line_start = true;
            }
            return;
        }

        let cl = &mut self.closing;
        let accepted = if c == ' ' && cl.run == 0 {
            if cl.indent < MAX_FENCE_INDENT {
                cl.indent += 1;
                true
            } else {
                false
            }
        } else if c == fence_char && !cl.trailing {
            cl.run += 1;
            true
        } else if (c == ' ' || c == '\t') && cl.run > 0 {
            cl.trailing = true;
            true
        } else {
            false
        };

        if accepted {
            cl.pending.push(c);
        } else {
            self.flush_closing(batch);
            self.append(c, batch);
            self.at_line_start = false;
        }
    }

    /// Give a held-back line prefix back to the block content.
    fn flush_closing(&mut self, batch: &mut Batch) {
        let pending = std::mem::take(&mut self.closing.pending);
        self.closing = Closing::default();
        if !pending.is_empty() {
            if let Some(block) = self.current.as_mut() {
                block.push_str(&pending);
            }
            batch.content.push_str(&pending);
        }
        self.state = ParserState::CodeContent;
    }

    fn append(&mut self, c: char, batch: &mut Batch) {
        if let Some(block) = self.current.as_mut() {
            let mut buf = [0u8; 4];
            block.push_str(c.encode_utf8(&mut buf));
            batch.content.push(c);
        }
    }

    fn close_block(&mut self, batch: &mut Batch, was_truncated: bool) {
        self.closing = Closing::default();
        self.state = ParserState::Text;
        let Some(partial) = self.current.take() else {
            return;
        };
        batch.flush_content();

        let duration = partial.started_at.elapsed();
        let block = partial.finish(self.chars, was_truncated);
        debug!(
            sequence = block.sequence,
            block_type = ?block.block_type,
            truncated = was_truncated,
            chars = block.content.len(),
            "code block completed"
        );
        self.completed.push(block.clone());
        batch.events.push(FenceEvent::BlockCompleted {
            block,
            duration,
            was_truncated,
        });
    }
}

/// Parse a whole message in one go.
pub fn parse_message(message_id: &str, text: &str) -> Vec<CodeBlock> {
    let mut parser = FenceParser::new(message_id);
    parser.feed_str(text);
    parser.complete();
    parser.take_blocks()
}

static LINES_HINT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\blines?\s+(\d+)(?:\s*(?:-|to|–)\s*(\d+))?").expect("valid regex")
});

static RANGE_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.+?)(?::(\d+)(?:-(\d+))?|#L(\d+)(?:-L?(\d+))?)$").expect("valid regex")
});

/// Split a fence info string into language, path and line range.
pub fn parse_info(raw: &str) -> FenceInfo {
    let info = raw.trim();
    let mut out = FenceInfo::default();
    if info.is_empty() {
        return out;
    }

    let (head, rest) = match info.find(char::is_whitespace) {
        Some(i) => (&info[..i], info[i..].trim()),
        None => (info, ""),
    };
    // `rust,ignore` style attribute lists
    let head = head.split(',').next().unwrap_or(head);

    let (tag, hint) = if looks_like_path(strip_range_suffix(head)) {
        (None, info.to_string())
    } else if let Some((lang, path)) = head.split_once(':')
        && is_lang_token(lang)
    {
        (Some(lang), format!("{path} {rest}"))
    } else if is_lang_token(head) {
        (Some(head), rest.to_string())
    } else {
        out.malformed = true;
        (None, rest.to_string())
    };

    let (path, line_range) = parse_hint(&hint);
    out.path = path;
    out.line_range = line_range;

    match tag {
        Some(tag) => {
            out.display_language = Some(tag.to_string());
            out.language = language::normalize_tag(tag);
        }
        None => {
            out.language = out
                .path
                .as_deref()
                .and_then(language::from_path)
                .map(|l| l.name.to_string());
        }
    }
    out
}

fn parse_hint(hint: &str) -> (Option<String>, Option<LineRange>) {
    let mut h = hint.trim().to_string();
    if h.is_empty() {
        return (None, None);
    }

    let mut range = None;
    if let Some(caps) = LINES_HINT.captures(&h) {
        range = numbers_to_range(caps.get(1), caps.get(2));
        let m = caps.get(0).map_or(0..0, |m| m.range());
        h.replace_range(m, " ");
    }

    let mut s = h.trim();
    for prefix in ["<!--", "//", "/*", "--", "#"] {
        if let Some(rest) = s.strip_prefix(prefix) {
            s = rest.trim_start();
            break;
        }
    }
    for suffix in ["-->", "*/"] {
        if let Some(rest) = s.strip_suffix(suffix) {
            s = rest.trim_end();
        }
    }
    let lower = s.to_ascii_lowercase();
    for key in ["filename", "filepath", "file", "path", "title"] {
        if lower.starts_with(key) {
            let after = s[key.len()..].trim_start();
            if let Some(v) = after.strip_prefix(':').or_else(|| after.strip_prefix('=')) {
                s = v.trim_start();
                break;
            }
        }
    }

    let token = match s.chars().next() {
        Some(q @ ('"' | '\'' | '`')) => s[1..].split(q).next().unwrap_or(""),
        _ => s.split_whitespace().next().unwrap_or(""),
    };

    let (path_part, suffix_range) = split_range_suffix(token);
    if !looks_like_path(path_part) {
        return (None, range);
    }
    let normalized = PathUtils::normalize(path_part);
    if normalized.is_empty() {
        return (None, range);
    }
    (Some(normalized), range.or(suffix_range))
}

fn split_range_suffix(token: &str) -> (&str, Option<LineRange>) {
    match RANGE_SUFFIX.captures(token) {
        Some(caps) => {
            let path = caps.get(1).map_or(token, |m| m.as_str());
            let range = numbers_to_range(caps.get(2), caps.get(3))
                .or_else(|| numbers_to_range(caps.get(4), caps.get(5)));
            if range.is_some() { (path, range) } else { (token, None) }
        }
        None => (token, None),
    }
}

fn strip_range_suffix(token: &str) -> &str {
    split_range_suffix(token).0
}

fn numbers_to_range(start: Option<regex::Match<'_>>, end: Option<regex::Match<'_>>) -> Option<LineRange> {
    let start: usize = start?.as_str().parse().ok()?;
    let end = match end {
        Some(m) => m.as_str().parse().ok()?,
        None => start,
    };
    LineRange::new(start, end)
}

fn is_lang_token(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '_' | '+' | '#' | '-'))
}

/// Conservative path test so attribute words like `ignore` are not paths.
fn looks_like_path(s: &str) -> bool {
    if s.is_empty() || s.contains("://") || s.chars().any(char::is_whitespace) {
        return false;
    }
    if s.contains('/') || s.contains('\\') {
        return true;
    }
    let name = s.trim_start_matches('.');
    (s.starts_with('.') && !name.is_empty() && !name.contains('.'))
        || (name.contains('.') && language::from_path(s).is_some())
        || matches!(s, "Dockerfile" | "Makefile")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::block::BlockType;

    fn completed(events: &[FenceEvent]) -> Vec<&CodeBlock> {
        events
            .iter()
            .filter_map(|e| match e {
                FenceEvent::BlockCompleted { block, .. } => Some(block),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn parses_single_block_with_language_and_path() {
        let mut p = FenceParser::new("m");
        let events = p.feed_str("Here:\n```rust:src/main.rs\nfn main() {}\n```\nDone.");
        let blocks = completed(&events);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].language.as_deref(), Some("rust"));
        assert_eq!(blocks[0].explicit_path.as_deref(), Some("src/main.rs"));
        assert_eq!(blocks[0].content, "fn main() {}");
        assert_eq!(blocks[0].sequence, 0);
        assert!(!blocks[0].was_truncated);
        assert_eq!(p.state(), ParserState::Text);
    }

    #[test]
    fn longer_fence_is_not_closed_by_shorter_run() {
        let text = "````md\n```rust\nlet x = 1;\n```\n````\n";
        let blocks = parse_message("m", text);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].content, "```rust\nlet x = 1;\n```");
    }

    #[test]
    fn tilde_fence_ignores_backticks() {
        let blocks = parse_message("m", "~~~\n```\nx\n~~~\n");
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].content, "```\nx");
    }

    #[test]
    fn fence_not_at_line_start_is_content() {
        let blocks = parse_message("m", "```js\nconst s = \"```\";\n```\n");
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].content, "const s = \"```\";");
    }

    #[test]
    fn closing_fence_with_info_does_not_close() {
        let blocks = parse_message("m", "```\na\n```python\nb\n```\n");
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].content, "a\n```python\nb");
    }

    #[test]
    fn complete_keeps_truncated_block() {
        let mut p = FenceParser::new("m");
        p.feed_str("```python\nprint('hi')\nprint('ther");
        let events = p.complete();
        assert!(events
            .iter()
            .any(|e| matches!(e, FenceEvent::ParseError(FenceError::Unterminated { .. }))));
        let blocks = completed(&events);
        assert_eq!(blocks.len(), 1);
        assert!(blocks[0].was_truncated);
        assert_eq!(blocks[0].content, "print('hi')\nprint('ther");
    }

    #[test]
    fn complete_on_bare_closing_fence_is_not_truncated() {
        let mut p = FenceParser::new("m");
        p.feed_str("```\nx\n```");
        let events = p.complete();
        let blocks = completed(&events);
        assert_eq!(blocks.len(), 1);
        assert!(!blocks[0].was_truncated);
    }

    #[test]
    fn sequences_are_gapless() {
        let text = "a\n```\n1\n```\nb\n~~~sh\n2\n~~~\n```\n3\n```\n";
        let blocks = parse_message("m", text);
        let seqs: Vec<_> = blocks.iter().map(|b| b.sequence).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
    }

    #[test]
    fn source_range_covers_fence_lines() {
        let text = "ab\n```\nx\n```\n";
        let blocks = parse_message("m", text);
        assert_eq!(blocks[0].source_range, 3..12);
        assert_eq!(&text[blocks[0].source_range.clone()], "```\nx\n```");
    }

    #[test]
    fn char_feed_counts_every_character() {
        let mut p = FenceParser::new("m");
        for c in "héllo\n```\n".chars() {
            p.feed_char(c);
        }
        assert_eq!(p.total_characters_processed(), 10);
        assert_eq!(p.state(), ParserState::CodeContent);
    }

    #[test]
    fn content_events_are_coalesced_per_feed() {
        let mut p = FenceParser::new("m");
        p.feed_str("```\n");
        let events = p.feed_str("abc\ndef");
        let added: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                FenceEvent::ContentAdded { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(added, vec!["abc\ndef"]);
    }

    #[test]
    fn inline_triple_backticks_are_text() {
        let blocks = parse_message("m", "```inline``` code\nplain\n");
        assert!(blocks.is_empty());
    }

    #[test]
    fn reset_clears_everything() {
        let mut p = FenceParser::new("m1");
        p.feed_str("```\nabc\n```\n```\nopen");
        assert_eq!(p.completed_blocks().len(), 1);
        assert!(p.current_block().is_some());
        p.reset("m2");
        assert!(p.completed_blocks().is_empty());
        assert!(p.current_block().is_none());
        assert_eq!(p.total_characters_processed(), 0);
        assert_eq!(p.message_id(), "m2");
        p.dispose();
        assert_eq!(p.message_id(), "");
    }

    #[test]
    fn info_variants() {
        let i = parse_info("python app/main.py");
        assert_eq!(i.language.as_deref(), Some("python"));
        assert_eq!(i.path.as_deref(), Some("app/main.py"));

        let i = parse_info("ts // File: \"src\\\\index.ts\"");
        assert_eq!(i.path.as_deref(), Some("src/index.ts"));

        let i = parse_info("src/lib.rs:10-20");
        assert_eq!(i.language.as_deref(), Some("rust"));
        assert_eq!(i.path.as_deref(), Some("src/lib.rs"));
        assert_eq!(i.line_range, LineRange::new(10, 20));

        let i = parse_info("rust lines 3-4");
        assert_eq!(i.path, None);
        assert_eq!(i.line_range, LineRange::new(3, 4));

        let i = parse_info("rust,ignore");
        assert_eq!(i.language.as_deref(), Some("rust"));
        assert_eq!(i.path, None);

        let i = parse_info("rust ignore");
        assert_eq!(i.path, None);

        let i = parse_info("js title=\"web/app.js\"");
        assert_eq!(i.path.as_deref(), Some("web/app.js"));

        let i = parse_info("{weird}");
        assert!(i.malformed);
    }

    #[test]
    fn malformed_info_still_opens_block() {
        let mut p = FenceParser::new("m");
        let events = p.feed_str("```{weird}\nx\n```\n");
        assert!(matches!(
            events.first(),
            Some(FenceEvent::ParseError(FenceError::MalformedInfo { .. }))
        ));
        assert_eq!(p.completed_blocks().len(), 1);
    }

    #[test]
    fn shell_block_is_classified_as_command() {
        let blocks = parse_message("m", "```bash\ncargo build\n```\n");
        assert_eq!(blocks[0].block_type, BlockType::Command);
    }
}
