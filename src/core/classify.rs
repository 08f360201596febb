//! Block classifier: (content, language tag, path hint) -> `BlockType`.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::block::BlockType;
use crate::core::language::{self, LanguageKind};

/// Namespace / package / module declarations that only appear in whole files
static FILE_DECL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)^(?:namespace\s+[\w.]+|package\s+[\w.]+;?\s*$|module\s+[\w.]+\s+(?:where|exposing)|defmodule\s+[\w.]+|<\?php|<!DOCTYPE|#!\s*/)",
    )
    .expect("valid regex")
});

/// Top-level definitions starting at column 0
static TOP_LEVEL_DEF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)^(?:(?:pub(?:\([^)]*\))?|export(?:\s+default)?|public|internal|sealed|abstract|static|final|partial|async|unsafe|data)\s+)*(?:class|struct|enum|trait|interface|record|impl|fn|func|def|function|object|type\s+\w+\s+(?:struct|interface))\b",
    )
    .expect("valid regex")
});

/// Column-0 type or module definition that owns a body
static CONTAINER_DEF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)^(?:(?:pub(?:\([^)]*\))?|export(?:\s+default)?|public|private|protected|internal|sealed|abstract|static|final|partial|data)\s+)*(?:class|struct|module|interface|enum|trait|record|object)\s+\w",
    )
    .expect("valid regex")
});

/// Import / include lines
static IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^(?:use\s+[\w:{}, *]+;|using\s+[\w.]+;|import\s+|from\s+[\w.]+\s+import\s|#include\s|require\(|const\s+\w+\s*=\s*require\()")
        .expect("valid regex")
});

/// Prompt-prefixed shell lines (`$ cargo run`)
static PROMPT_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:\$|>|PS>|PS [^>]*>)\s+\S").expect("valid regex"));

/// Decide what role a finished block plays.
pub fn classify(content: &str, language: Option<&str>, path_hint: Option<&str>) -> BlockType {
    let kind = language::kind_of(language);

    match kind {
        Some(LanguageKind::Shell) => return BlockType::Command,
        Some(LanguageKind::Output) => return BlockType::Output,
        Some(LanguageKind::Data) => return BlockType::Config,
        _ => {}
    }

    if language.is_none() && path_hint.is_none() && looks_like_session(content) {
        return BlockType::Command;
    }

    // A data file named on the fence is config even without a tag
    if kind.is_none()
        && let Some(info) = path_hint.and_then(language::from_path)
        && info.kind == LanguageKind::Data
    {
        return BlockType::Config;
    }

    if has_whole_file_signal(content) {
        return BlockType::CompleteFile;
    }

    if path_hint.is_none() && is_illustrative(content) {
        return BlockType::Example;
    }

    BlockType::Snippet
}

/// Every non-empty line is a prompt line.
fn looks_like_session(content: &str) -> bool {
    let mut lines = content.lines().filter(|l| !l.trim().is_empty()).peekable();
    lines.peek().is_some() && lines.all(|l| PROMPT_LINE.is_match(l))
}

fn has_whole_file_signal(content: &str) -> bool {
    if FILE_DECL.is_match(content) {
        return true;
    }
    if closes_container(content) {
        return true;
    }
    // Imports followed by at least one top-level definition
    match (IMPORT.find(content), TOP_LEVEL_DEF.find_iter(content).last()) {
        (Some(import), Some(def)) => import.start() < def.start(),
        _ => false,
    }
}

/// A container definition at column 0 whose body also closes at column 0.
fn closes_container(content: &str) -> bool {
    let Some(def) = CONTAINER_DEF.find(content) else {
        return false;
    };
    let Some(last) = content[def.start()..].lines().rev().find(|l| !l.trim().is_empty()) else {
        return false;
    };
    let last = last.trim_end();
    matches!(last, "}" | "};" | "end")
}

/// Very short blocks with no definitions are treated as usage examples.
fn is_illustrative(content: &str) -> bool {
    let lines = content.lines().filter(|l| !l.trim().is_empty()).count();
    lines <= 2 && !TOP_LEVEL_DEF.is_match(content)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_languages_are_commands() {
        assert_eq!(classify("ls -la", Some("bash"), None), BlockType::Command);
        assert_eq!(classify("dir", Some("powershell"), None), BlockType::Command);
        assert_eq!(classify("$ cargo test\n$ cargo run", None, None), BlockType::Command);
    }

    #[test]
    fn data_languages_are_config() {
        assert_eq!(classify("{\"a\": 1}", Some("json"), None), BlockType::Config);
        assert_eq!(classify("a = 1", None, Some("Cargo.toml")), BlockType::Config);
    }

    #[test]
    fn output_is_output() {
        assert_eq!(classify("ok: 3 passed", Some("text"), None), BlockType::Output);
    }

    #[test]
    fn whole_file_signals() {
        let cs = "using System;\n\nnamespace App.Models\n{\n    public class User {}\n}";
        assert_eq!(classify(cs, Some("csharp"), None), BlockType::CompleteFile);

        let rs = "use std::io;\n\nfn main() {\n    println!(\"hi\");\n}";
        assert_eq!(classify(rs, Some("rust"), None), BlockType::CompleteFile);

        let java = "package com.acme;\n\npublic class A {}";
        assert_eq!(classify(java, Some("java"), None), BlockType::CompleteFile);
    }

    #[test]
    fn closed_container_without_imports_is_whole_file() {
        let java = "public class Foo {\n    void bar() {}\n}\n";
        assert_eq!(classify(java, Some("java"), None), BlockType::CompleteFile);

        let rb = "class Greeter\n  def hi\n    puts 'hi'\n  end\nend\n";
        assert_eq!(classify(rb, Some("ruby"), None), BlockType::CompleteFile);

        let rs = "pub struct Point {\n    x: i32,\n}\n";
        assert_eq!(classify(rs, Some("rust"), None), BlockType::CompleteFile);

        // Indented definitions live inside something else
        let inner = "    class Foo {\n        void bar() {}\n    }\n";
        assert_eq!(classify(inner, Some("java"), None), BlockType::Snippet);

        let fn_only = "fn helper() {\n    todo!()\n}\n";
        assert_eq!(classify(fn_only, Some("rust"), None), BlockType::Snippet);
    }

    #[test]
    fn snippets_and_examples() {
        let body = "    let x = compute();\n    x.save()?;\n    Ok(())";
        assert_eq!(classify(body, Some("rust"), None), BlockType::Snippet);
        assert_eq!(classify("foo(1)", Some("python"), None), BlockType::Example);
        assert_eq!(classify("foo(1)", Some("python"), Some("a.py")), BlockType::Snippet);
    }
}
