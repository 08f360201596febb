//! Path inference engine.
//!
//! Decides which file a code block belongs to by running an ordered
//! cascade of strategies over the context files visible to the session.
//! Ambiguity is returned as a value; callers resolve it synchronously
//! through `InferenceHooks` instead of mutating shared event state.

use std::collections::HashSet;
use std::path::Path;
use std::sync::LazyLock;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use rayon::prelude::*;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::core::block::CodeBlock;
use crate::core::language;
use crate::infra::config::InferenceOptions;
use crate::infra::io;
use crate::infra::utils::PathUtils;
use crate::infra::walk::FileWalker;

/// Largest file read into memory as inference context
const MAX_CONTEXT_BYTES: u64 = 1024 * 1024;

/// A file already known to the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextFile {
    /// Forward-slash path relative to the workspace root
    pub path: String,
    pub language: Option<String>,
    pub content: Option<String>,
}

impl ContextFile {
    pub fn new(path: &str, content: Option<String>) -> Self {
        let path = PathUtils::normalize(path);
        let language = language::from_path(&path).map(|l| l.name.to_string());
        Self {
            path,
            language,
            content,
        }
    }

    pub fn with_language(mut self, tag: &str) -> Self {
        self.language = language::normalize_tag(tag);
        self
    }

    /// File name without extension
    pub fn stem(&self) -> &str {
        let name = self.path.rsplit('/').next().unwrap_or(&self.path);
        name.split_once('.').map_or(name, |(stem, _)| stem)
    }

    /// Collect text files under `root` as context.
    pub fn collect_from_dir(root: &Path, walker: &FileWalker) -> Result<Vec<ContextFile>> {
        let mut out = Vec::new();
        for abs in walker.walk_files(root) {
            let rel = abs.strip_prefix(root).unwrap_or(&abs);
            let rel = PathUtils::normalize(&rel.to_string_lossy());

            let meta = std::fs::metadata(&abs)
                .with_context(|| format!("stat {}", abs.display()))?;
            let content = if meta.len() <= MAX_CONTEXT_BYTES {
                let raw = io::read_file_smart(&abs)?;
                if !io::is_probably_text(raw.as_ref()) {
                    continue;
                }
                io::read_text(&abs).ok().map(|(text, _)| text)
            } else {
                None
            };
            out.push(ContextFile::new(&rel, content));
        }
        Ok(out)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum InferenceStrategy {
    ExplicitPath,
    SingleContext,
    LanguageMatch,
    TypeNameMatch,
    ContentSimilarity,
    GeneratedNew,
    Manual,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathCandidate {
    pub path: String,
    pub confidence: f32,
    pub strategy: InferenceStrategy,
}

/// Why inference produced no path
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InferenceError {
    #[error("{count} context files match language `{language}`")]
    Ambiguous { count: usize, language: String },

    #[error("block has no language to derive a file extension from")]
    UnknownLanguage,

    #[error("no type or function name found to derive a file name")]
    NoTypeName,

    #[error("no context file matched and generated paths are disabled")]
    GenerationDisabled,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InferenceResult {
    pub path: Option<String>,
    pub confidence: f32,
    pub strategy: Option<InferenceStrategy>,
    pub is_ambiguous: bool,
    pub alternatives: Vec<PathCandidate>,
    pub failure: Option<InferenceError>,
    pub duration: Duration,
}

impl InferenceResult {
    fn found(path: String, confidence: f32, strategy: InferenceStrategy) -> Self {
        Self {
            path: Some(path),
            confidence,
            strategy: Some(strategy),
            is_ambiguous: false,
            alternatives: Vec::new(),
            failure: None,
            duration: Duration::ZERO,
        }
    }

    fn failed(error: InferenceError) -> Self {
        Self {
            path: None,
            confidence: 0.0,
            strategy: None,
            is_ambiguous: false,
            alternatives: Vec::new(),
            failure: Some(error),
            duration: Duration::ZERO,
        }
    }

    pub fn is_success(&self) -> bool {
        self.path.is_some()
    }

    pub fn failure_reason(&self) -> Option<String> {
        self.failure.as_ref().map(ToString::to_string)
    }

    /// Record the chosen path on the block.
    pub fn apply_to(&self, block: &mut CodeBlock) {
        if let Some(path) = &self.path {
            block.target_path = Some(path.clone());
            block.confidence = self.confidence;
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InferenceNotice {
    Inferred {
        path: String,
        strategy: InferenceStrategy,
        confidence: f32,
        duration: Duration,
    },
    Ambiguous {
        candidates: Vec<PathCandidate>,
    },
    Failed {
        reason: String,
    },
}

pub trait InferenceObserver {
    fn notify(&mut self, block: &CodeBlock, notice: &InferenceNotice);
}

/// Observer that just records notices with the block id.
#[derive(Debug, Default)]
pub struct NoticeLog {
    pub notices: Vec<(String, InferenceNotice)>,
}

impl InferenceObserver for NoticeLog {
    fn notify(&mut self, block: &CodeBlock, notice: &InferenceNotice) {
        self.notices.push((block.id.clone(), notice.clone()));
    }
}

type Resolver<'a> = Box<dyn FnMut(&[PathCandidate]) -> Option<usize> + 'a>;
type ManualPath<'a> = Box<dyn FnMut(&CodeBlock, &str) -> Option<String> + 'a>;

/// Caller decisions for ambiguity and failure, plus an optional observer.
#[derive(Default)]
pub struct InferenceHooks<'a> {
    resolver: Option<Resolver<'a>>,
    manual_path: Option<ManualPath<'a>>,
    observer: Option<&'a mut dyn InferenceObserver>,
}

impl<'a> InferenceHooks<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pick among ambiguous candidates by index.
    pub fn resolve_with(mut self, f: impl FnMut(&[PathCandidate]) -> Option<usize> + 'a) -> Self {
        self.resolver = Some(Box::new(f));
        self
    }

    /// Resolve every ambiguity with the first candidate.
    pub fn pick_first(self) -> Self {
        self.resolve_with(|c| (!c.is_empty()).then_some(0))
    }

    /// Supply a path when every strategy failed.
    pub fn manual_path(mut self, f: impl FnMut(&CodeBlock, &str) -> Option<String> + 'a) -> Self {
        self.manual_path = Some(Box::new(f));
        self
    }

    pub fn observe(mut self, observer: &'a mut dyn InferenceObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    fn notify(&mut self, block: &CodeBlock, notice: InferenceNotice) {
        if let Some(obs) = self.observer.as_mut() {
            obs.notify(block, &notice);
        }
    }
}

static TYPE_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)^\s*(?:(?:pub(?:\([^)]*\))?|export|default|public|private|internal|protected|sealed|abstract|static|final|partial|data|open)\s+)*(?:class|struct|enum|trait|interface|record|object)\s+([A-Za-z_]\w*)",
    )
    .expect("valid regex")
});

static FN_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)^\s*(?:(?:pub(?:\([^)]*\))?|export|default|public|private|static|async)\s+)*(?:fn|func|def|function)\s+([A-Za-z_]\w*)",
    )
    .expect("valid regex")
});

static NAMESPACE_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(?:namespace|package|defmodule|module)\s+([\w.]+)").expect("valid regex")
});

static REFERENCE_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*(?:namespace|package|defmodule|module|using|use|import|from|mod)\s+([\w.:/]+)")
        .expect("valid regex")
});

/// Stateless resolver; safe to share across threads.
#[derive(Debug, Clone, Default)]
pub struct InferenceEngine {
    options: InferenceOptions,
}

impl InferenceEngine {
    pub fn new(options: InferenceOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &InferenceOptions {
        &self.options
    }

    /// Run the cascade without any caller resolution.
    pub fn infer(&self, block: &CodeBlock, context: &[ContextFile]) -> InferenceResult {
        self.infer_with(block, context, &mut InferenceHooks::default())
    }

    #[instrument(level = "debug", skip_all, fields(block = %block.id))]
    pub fn infer_with(
        &self,
        block: &CodeBlock,
        context: &[ContextFile],
        hooks: &mut InferenceHooks<'_>,
    ) -> InferenceResult {
        let started = Instant::now();
        let mut result = self.cascade(block, context, hooks);
        result.duration = started.elapsed();

        if let (Some(path), Some(strategy)) = (result.path.clone(), result.strategy) {
            debug!(%path, ?strategy, confidence = result.confidence, "path inferred");
            hooks.notify(
                block,
                InferenceNotice::Inferred {
                    path,
                    strategy,
                    confidence: result.confidence,
                    duration: result.duration,
                },
            );
        } else if !result.is_ambiguous
            && let Some(manual) = self.ask_manual(block, &result, hooks)
        {
            let duration = result.duration;
            result = InferenceResult::found(
                manual,
                self.options.confidence.manual,
                InferenceStrategy::Manual,
            );
            result.duration = duration;
        }
        result
    }

    /// Infer each block independently, preserving order.
    pub fn infer_batch(&self, blocks: &[CodeBlock], context: &[ContextFile]) -> Vec<InferenceResult> {
        blocks.par_iter().map(|b| self.infer(b, context)).collect()
    }

    /// Sequential batch that routes every block through the same hooks.
    pub fn infer_batch_with(
        &self,
        blocks: &[CodeBlock],
        context: &[ContextFile],
        hooks: &mut InferenceHooks<'_>,
    ) -> Vec<InferenceResult> {
        blocks
            .iter()
            .map(|b| self.infer_with(b, context, hooks))
            .collect()
    }

    fn ask_manual(
        &self,
        block: &CodeBlock,
        result: &InferenceResult,
        hooks: &mut InferenceHooks<'_>,
    ) -> Option<String> {
        let reason = result.failure_reason().unwrap_or_default();
        debug!(%reason, "path inference failed");
        hooks.notify(block, InferenceNotice::Failed { reason: reason.clone() });
        let ask = hooks.manual_path.as_mut()?;
        let manual = ask(block, &reason)?;
        let normalized = PathUtils::normalize(&manual);
        (!normalized.is_empty()).then_some(normalized)
    }

    fn cascade(
        &self,
        block: &CodeBlock,
        context: &[ContextFile],
        hooks: &mut InferenceHooks<'_>,
    ) -> InferenceResult {
        let conf = &self.options.confidence;

        if let Some(path) = block.explicit_path.as_deref().map(PathUtils::normalize)
            && !path.is_empty()
        {
            return InferenceResult::found(path, conf.explicit, InferenceStrategy::ExplicitPath);
        }

        if let [only] = context
            && !languages_conflict(block.language.as_deref(), only.language.as_deref())
        {
            return InferenceResult::found(
                only.path.clone(),
                conf.single_context,
                InferenceStrategy::SingleContext,
            );
        }

        let pool: Vec<&ContextFile> = context.iter().collect();

        if let Some(lang) = block.language.as_deref() {
            let matching: Vec<&ContextFile> = context
                .iter()
                .filter(|f| f.language.as_deref().is_some_and(|l| language::same_language(l, lang)))
                .collect();

            match matching.as_slice() {
                [] => {}
                [one] => {
                    return InferenceResult::found(
                        one.path.clone(),
                        conf.language_match,
                        InferenceStrategy::LanguageMatch,
                    );
                }
                many => return self.resolve_ambiguous(block, lang, many, hooks),
            }
        }

        if let Some(found) = self.by_type_name(block, &pool) {
            return found;
        }
        if let Some(found) = self.by_content(block, &pool) {
            return found;
        }
        self.generate(block)
    }

    fn resolve_ambiguous(
        &self,
        block: &CodeBlock,
        lang: &str,
        matching: &[&ContextFile],
        hooks: &mut InferenceHooks<'_>,
    ) -> InferenceResult {
        let conf = &self.options.confidence;
        let candidates: Vec<PathCandidate> = matching
            .iter()
            .map(|f| PathCandidate {
                path: f.path.clone(),
                confidence: conf.ambiguous_each,
                strategy: InferenceStrategy::LanguageMatch,
            })
            .collect();

        debug!(count = candidates.len(), "ambiguous language match");
        hooks.notify(
            block,
            InferenceNotice::Ambiguous {
                candidates: candidates.clone(),
            },
        );

        let picked = hooks
            .resolver
            .as_mut()
            .and_then(|resolve| resolve(&candidates))
            .and_then(|i| candidates.get(i));
        if let Some(choice) = picked {
            let mut result = InferenceResult::found(
                choice.path.clone(),
                conf.language_match,
                InferenceStrategy::LanguageMatch,
            );
            result.alternatives = candidates;
            return result;
        }

        // Let the finer strategies break the tie among the candidates
        let tie_break = self
            .by_type_name(block, matching)
            .or_else(|| self.by_content(block, matching));
        if let Some(mut result) = tie_break {
            result.alternatives = candidates;
            return result;
        }

        InferenceResult {
            path: None,
            confidence: conf.ambiguous_each,
            strategy: Some(InferenceStrategy::LanguageMatch),
            is_ambiguous: true,
            failure: Some(InferenceError::Ambiguous {
                count: candidates.len(),
                language: lang.to_string(),
            }),
            alternatives: candidates,
            duration: Duration::ZERO,
        }
    }

    /// Exact or partial match of the block's leading type name to a file stem.
    fn by_type_name(&self, block: &CodeBlock, pool: &[&ContextFile]) -> Option<InferenceResult> {
        let name = leading_type_name(&block.content)?;
        let key = name_key(&name);
        let conf = &self.options.confidence;

        let exact: Vec<_> = pool.iter().filter(|f| name_key(f.stem()) == key).collect();
        if let [hit] = exact.as_slice() {
            return Some(InferenceResult::found(
                hit.path.clone(),
                conf.type_name_exact,
                InferenceStrategy::TypeNameMatch,
            ));
        }
        if !exact.is_empty() {
            return None;
        }

        let partial: Vec<_> = pool
            .iter()
            .filter(|f| {
                let stem = name_key(f.stem());
                stem.len() >= 3 && key.len() >= 3 && (stem.contains(&key) || key.contains(&stem))
            })
            .collect();
        match partial.as_slice() {
            [hit] => Some(InferenceResult::found(
                hit.path.clone(),
                conf.type_name_partial,
                InferenceStrategy::TypeNameMatch,
            )),
            _ => None,
        }
    }

    /// Namespace / import token overlap with existing file content.
    fn by_content(&self, block: &CodeBlock, pool: &[&ContextFile]) -> Option<InferenceResult> {
        let wanted = reference_tokens(&block.content);
        if wanted.is_empty() {
            return None;
        }

        let mut best: Option<(&ContextFile, f32)> = None;
        let mut tied = false;
        for file in pool {
            let Some(content) = file.content.as_deref() else {
                continue;
            };
            let have = reference_tokens(content);
            let score = wanted.intersection(&have).count() as f32 / wanted.len() as f32;
            match best {
                Some((_, s)) if (score - s).abs() < f32::EPSILON => tied = true,
                Some((_, s)) if score < s => {}
                _ => {
                    best = Some((file, score));
                    tied = false;
                }
            }
        }

        let (file, score) = best?;
        if tied || score < self.options.content_similarity_threshold {
            return None;
        }
        let confidence = self.options.confidence.content_similarity * (0.5 + 0.5 * score);
        Some(InferenceResult::found(
            file.path.clone(),
            confidence,
            InferenceStrategy::ContentSimilarity,
        ))
    }

    /// Synthesize `<base>/<namespace segments>/<TypeName>.<ext>`.
    fn generate(&self, block: &CodeBlock) -> InferenceResult {
        if !self.options.allow_generated_paths {
            return InferenceResult::failed(InferenceError::GenerationDisabled);
        }
        let Some(info) = block.language.as_deref().and_then(language::lookup) else {
            return InferenceResult::failed(InferenceError::UnknownLanguage);
        };
        let Some(ext) = info.canonical_extension() else {
            return InferenceResult::failed(InferenceError::UnknownLanguage);
        };
        let Some(name) = leading_type_name(&block.content) else {
            return InferenceResult::failed(InferenceError::NoTypeName);
        };

        let file_stem = if info.pascal_case_files()
            || matches!(info.name, "javascript" | "typescript" | "jsx" | "tsx")
        {
            name
        } else {
            snake_case(&name)
        };

        let mut segments: Vec<String> = Vec::new();
        if !self.options.generated_base_dir.is_empty() {
            segments.push(self.options.generated_base_dir.clone());
        }
        if let Some(caps) = NAMESPACE_DECL.captures(&block.content) {
            segments.extend(
                caps[1]
                    .split('.')
                    .filter(|s| !s.is_empty())
                    .map(String::from),
            );
        }
        segments.push(format!("{file_stem}.{ext}"));

        let path = PathUtils::normalize(&segments.join("/"));
        InferenceResult::found(
            path,
            self.options.confidence.generated,
            InferenceStrategy::GeneratedNew,
        )
    }
}

fn languages_conflict(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => !language::same_language(a, b),
        _ => false,
    }
}

/// First declared type, falling back to the first function.
pub fn leading_type_name(content: &str) -> Option<String> {
    TYPE_DECL
        .captures(content)
        .or_else(|| FN_DECL.captures(content))
        .map(|c| c[1].to_string())
}

/// Case- and separator-insensitive comparison key
fn name_key(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

fn reference_tokens(content: &str) -> HashSet<String> {
    REFERENCE_DECL
        .captures_iter(content)
        .flat_map(|caps| {
            caps[1]
                .split(|c: char| !c.is_alphanumeric() && c != '_')
                .filter(|t| t.len() >= 2)
                .map(str::to_ascii_lowercase)
                .collect::<Vec<_>>()
        })
        .collect()
}

/// `UserService` -> `user_service`, `HTTPServer` -> `http_server`
pub fn snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            if i > 0 {
                let prev = chars[i - 1];
                let next_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
                if prev.is_lowercase() || prev.is_ascii_digit() || (prev.is_uppercase() && next_lower) {
                    out.push('_');
                }
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fence::parse_message;

    fn block(info: &str, body: &str) -> CodeBlock {
        let text = format!("```{info}\n{body}\n```\n");
        parse_message("m", &text).remove(0)
    }

    fn ctx(paths: &[&str]) -> Vec<ContextFile> {
        paths.iter().map(|p| ContextFile::new(p, None)).collect()
    }

    #[test]
    fn explicit_path_wins_regardless_of_context() {
        let engine = InferenceEngine::default();
        let b = block("rust:\\src\\lib.rs", "pub fn a() {}");
        let r = engine.infer(&b, &ctx(&["x.rs", "y.rs"]));
        assert_eq!(r.path.as_deref(), Some("src/lib.rs"));
        assert_eq!(r.strategy, Some(InferenceStrategy::ExplicitPath));
        assert_eq!(r.confidence, 1.0);
    }

    #[test]
    fn single_context_file_is_assumed() {
        let engine = InferenceEngine::default();
        let b = block("rust", "let x = 1;\nlet y = 2;\nx + y");
        let r = engine.infer(&b, &ctx(&["src/main.rs"]));
        assert_eq!(r.strategy, Some(InferenceStrategy::SingleContext));
        assert_eq!(r.confidence, 0.95);
    }

    #[test]
    fn single_context_of_other_language_is_skipped() {
        let engine = InferenceEngine::default();
        let b = block("python", "def helper():\n    return 1");
        let r = engine.infer(&b, &ctx(&["src/main.rs"]));
        assert_eq!(r.strategy, Some(InferenceStrategy::GeneratedNew));
        assert_eq!(r.path.as_deref(), Some("src/helper.py"));
    }

    #[test]
    fn same_language_pair_is_ambiguous_until_resolved() {
        let engine = InferenceEngine::default();
        let b = block("csharp", "x = 1;\ny = 2;\nz = 3;");
        let files = ctx(&["src/A.cs", "src/B.cs", "README.md"]);

        let r = engine.infer(&b, &files);
        assert!(r.is_ambiguous);
        assert!(r.path.is_none());
        let alts: Vec<_> = r.alternatives.iter().map(|c| c.path.as_str()).collect();
        assert_eq!(alts, vec!["src/A.cs", "src/B.cs"]);

        let mut hooks = InferenceHooks::new().resolve_with(|c| c.iter().position(|p| p.path == "src/B.cs"));
        let r = engine.infer_with(&b, &files, &mut hooks);
        assert!(!r.is_ambiguous);
        assert_eq!(r.path.as_deref(), Some("src/B.cs"));
    }

    #[test]
    fn type_name_breaks_language_tie() {
        let engine = InferenceEngine::default();
        let b = block("csharp", "public class UserService\n{\n}");
        let r = engine.infer(&b, &ctx(&["src/UserService.cs", "src/Other.cs"]));
        assert_eq!(r.path.as_deref(), Some("src/UserService.cs"));
        assert_eq!(r.strategy, Some(InferenceStrategy::TypeNameMatch));
        assert_eq!(r.alternatives.len(), 2);
    }

    #[test]
    fn content_similarity_uses_namespaces() {
        let engine = InferenceEngine::default();
        let b = block("", "namespace Shop.Billing\n{\n    // tweak\n}");
        let files = vec![
            ContextFile::new("a.txt", Some("namespace Shop.Billing;".into())),
            ContextFile::new("b.txt", Some("namespace Other;".into())),
        ];
        let r = engine.infer(&b, &files);
        assert_eq!(r.path.as_deref(), Some("a.txt"));
        assert_eq!(r.strategy, Some(InferenceStrategy::ContentSimilarity));
    }

    #[test]
    fn generated_path_uses_namespace_segments() {
        let engine = InferenceEngine::default();
        let b = block("csharp", "namespace App.Models\n{\n    public class User {}\n}");
        let r = engine.infer(&b, &[]);
        assert_eq!(r.path.as_deref(), Some("src/App/Models/User.cs"));
        assert_eq!(r.confidence, 0.5);
    }

    #[test]
    fn disabled_generation_fails_with_reason_and_manual_fallback() {
        let mut options = InferenceOptions::default();
        options.allow_generated_paths = false;
        let engine = InferenceEngine::new(options);
        let b = block("go", "func main() {}");

        let r = engine.infer(&b, &[]);
        assert!(r.path.is_none());
        assert!(r.failure_reason().unwrap().contains("disabled"));

        let mut log = NoticeLog::default();
        let mut hooks = InferenceHooks::new()
            .manual_path(|_, _| Some("cmd/main.go".into()))
            .observe(&mut log);
        let r = engine.infer_with(&b, &[], &mut hooks);
        drop(hooks);
        assert_eq!(r.strategy, Some(InferenceStrategy::Manual));
        assert_eq!(r.path.as_deref(), Some("cmd/main.go"));
        assert!(matches!(log.notices[0].1, InferenceNotice::Failed { .. }));
    }

    #[test]
    fn batch_preserves_order() {
        let engine = InferenceEngine::default();
        let blocks = vec![
            block("rust:a.rs", "x"),
            block("python", "import os"),
            block("rust:b.rs", "y"),
        ];
        let results = engine.infer_batch(&blocks, &[]);
        assert_eq!(results[0].path.as_deref(), Some("a.rs"));
        assert!(results[1].path.is_none());
        assert_eq!(results[2].path.as_deref(), Some("b.rs"));
    }

    #[test]
    fn snake_case_handles_acronyms() {
        assert_eq!(snake_case("UserService"), "user_service");
        assert_eq!(snake_case("HTTPServer"), "http_server");
        assert_eq!(snake_case("main"), "main");
    }
}
