//! Filepath: src/infra/utils.rs
//! Path helpers organized by small, focused structs.
//! All functions are associated fns to keep call sites
//! ergonomic, testable, and discoverable.

use std::path::{Component, Path, PathBuf};

/// Characters that are never valid inside a workspace path segment
const INVALID_PATH_CHARS: &[char] = &['<', '>', '"', '|', '?', '*', '\0'];

/// Why a workspace-relative path was rejected
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathIssue
{
    #[error("path is empty")]
    Empty,
    #[error("absolute paths are not allowed: {0}")]
    Absolute(String),
    #[error("path escapes the workspace: {0}")]
    Traversal(String),
    #[error("path contains whitespace: {0}")]
    Whitespace(String),
    #[error("path exceeds {max} characters: {path}")]
    TooLong
    {
        path: String, max: usize
    },
    #[error("path contains invalid characters: {0}")]
    InvalidChars(String),
}

/// Forward-slash, workspace-relative path helpers
pub struct PathUtils;

impl PathUtils
{
    /// Normalize separators to `/`, strip leading `/` and `./`,
    /// and collapse duplicate or `.` segments
    pub fn normalize(raw: &str) -> String
    {
        // Unify separators first so the segment split is uniform
        let unified = raw
            .trim()
            .replace('\\', "/");

        // Drop empty and `.` segments (handles `//`, leading `/`, `./`)
        unified
            .split('/')
            .filter(|seg| !seg.is_empty() && *seg != ".")
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Validate a normalized workspace-relative path
    pub fn validate(
        path: &str,
        max_len: usize,
    ) -> Result<(), PathIssue>
    {
        if path
            .trim()
            .is_empty()
        {
            return Err(PathIssue::Empty);
        }

        // Drive letters and UNC prefixes count as absolute too
        let looks_absolute = path.starts_with('/')
            || path.starts_with('\\')
            || path
                .chars()
                .nth(1)
                == Some(':');
        if looks_absolute
        {
            return Err(PathIssue::Absolute(path.to_string()));
        }

        if path
            .split(['/', '\\'])
            .any(|seg| seg == "..")
        {
            return Err(PathIssue::Traversal(path.to_string()));
        }

        if path
            .chars()
            .any(char::is_whitespace)
        {
            return Err(PathIssue::Whitespace(path.to_string()));
        }

        if path
            .chars()
            .count()
            > max_len
        {
            return Err(PathIssue::TooLong { path: path.to_string(), max: max_len });
        }

        if path.contains(INVALID_PATH_CHARS)
        {
            return Err(PathIssue::InvalidChars(path.to_string()));
        }

        Ok(())
    }

    /// Longest common directory prefix of a set of file paths.
    /// Each entry is treated as a file, so its last segment never
    /// participates. Returns an empty string when nothing is shared.
    pub fn common_root<S: AsRef<str>>(paths: &[S]) -> String
    {
        let mut iter = paths.iter();

        // Seed with the directory segments of the first path
        let Some(first) = iter.next()
        else
        {
            return String::new();
        };
        let mut prefix: Vec<&str> = Self::dir_segments(first.as_ref());

        // Shrink the prefix against every other path
        for p in iter
        {
            let segs = Self::dir_segments(p.as_ref());
            let shared = prefix
                .iter()
                .zip(segs.iter())
                .take_while(|(a, b)| a == b)
                .count();
            prefix.truncate(shared);

            if prefix.is_empty()
            {
                break;
            }
        }

        prefix.join("/")
    }

    /// Directory segments of a forward-slash path (drops the file name)
    fn dir_segments(path: &str) -> Vec<&str>
    {
        let mut segs: Vec<&str> = path
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();
        segs.pop();
        segs
    }

    /// Parent directory of a forward-slash path, if any
    pub fn parent(path: &str) -> Option<&str>
    {
        path.rfind('/')
            .map(|idx| &path[..idx])
    }

    /// Number of directory levels in a forward-slash path
    pub fn depth(path: &str) -> usize
    {
        path.matches('/')
            .count()
    }

    /// Join a workspace root with a forward-slash relative path,
    /// refusing anything that would land outside the root
    pub fn resolve_in(
        root: &Path,
        rel: &str,
    ) -> Option<PathBuf>
    {
        let mut out = root.to_path_buf();

        for comp in Path::new(rel).components()
        {
            match comp
            {
                Component::Normal(seg) => out.push(seg),
                Component::CurDir =>
                {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => return None,
            }
        }

        // Empty relative path means the root itself, which is not a file target
        if out == root
        {
            return None;
        }

        Some(out)
    }
}
