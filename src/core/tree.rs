//! Filepath: src/core/tree.rs
//! Parser for directory trees printed by a model, e.g.
//!
//! ```text
//! project/
//! ├── src/
//! │   └── main.rs   # entry point
//! └── Cargo.toml
//! ```
//!
//! Handles Unicode box drawing, ASCII connectors (`|-- +-- \`--`) and plain
//! indentation. Nodes live in an arena; parents are indices, never owners.

use anyhow::Result;
use owo_colors::OwoColorize;
use ptree::TreeBuilder;
use ptree::item::StringItem;
use tracing::debug;

pub type NodeId = usize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTreeNode {
    pub name: String,
    /// Forward-slash path from the tree's top level
    pub full_path: String,
    pub is_directory: bool,
    pub depth: usize,
    pub children: Vec<NodeId>,
    pub parent: Option<NodeId>,
    pub comment: Option<String>,
    /// 1-based line in the tree text
    pub line: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ParsedTree {
    pub nodes: Vec<ParsedTreeNode>,
    pub roots: Vec<NodeId>,
}

/// Prefix glyphs that only express nesting
const GLYPHS: &[char] = &[
    '│', '├', '└', '─', '┬', '┼', '┃', '┣', '┗', '━', '╰', '╭', '|', '+', '\\', '`', '-', '*', ' ',
];

impl ParsedTree {
    pub fn node(&self, id: NodeId) -> &ParsedTreeNode {
        &self.nodes[id]
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// File nodes in source order
    pub fn files(&self) -> impl Iterator<Item = &ParsedTreeNode> {
        self.nodes.iter().filter(|n| !n.is_directory)
    }

    pub fn directories(&self) -> impl Iterator<Item = &ParsedTreeNode> {
        self.nodes.iter().filter(|n| n.is_directory)
    }

    /// Walk up the parent chain
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = &ParsedTreeNode> {
        std::iter::successors(self.nodes[id].parent, |&p| self.nodes[p].parent).map(|p| &self.nodes[p])
    }

    /// Build a ptree item; directories get a trailing `/`.
    pub fn to_ptree(&self, label: &str, colored: bool) -> StringItem {
        let mut builder = TreeBuilder::new(label.to_string());
        for &root in &self.roots {
            self.add_to_builder(&mut builder, root, colored);
        }
        builder.build()
    }

    fn add_to_builder(&self, builder: &mut TreeBuilder, id: NodeId, colored: bool) {
        let node = &self.nodes[id];
        let mut label = if node.is_directory {
            if colored {
                format!("{}/", node.name.blue())
            } else {
                format!("{}/", node.name)
            }
        } else {
            node.name.clone()
        };
        if let Some(comment) = &node.comment {
            label.push_str(&format!("  # {comment}"));
        }

        if node.children.is_empty() {
            builder.add_empty_child(label);
        } else {
            builder.begin_child(label);
            for &child in &node.children {
                self.add_to_builder(builder, child, colored);
            }
            builder.end_child();
        }
    }

    /// Render to a plain string.
    pub fn render(&self, label: &str) -> Result<String> {
        let item = self.to_ptree(label, false);
        let mut out = Vec::new();
        ptree::write_tree(&item, &mut out)?;
        Ok(String::from_utf8_lossy(&out).into_owned())
    }
}

/// Parse tree text into an arena.
///
/// `tab_width` expands tabs before measuring columns; lines nested deeper
/// than `max_depth` are dropped.
pub fn parse_tree(text: &str, tab_width: usize, max_depth: usize) -> ParsedTree {
    let mut tree = ParsedTree::default();
    // (name column, node) for the current ancestry
    let mut stack: Vec<(usize, NodeId)> = Vec::new();

    for (idx, raw) in text.lines().enumerate() {
        let line = expand_tabs(raw, tab_width);
        let Some((column, entry)) = split_prefix(&line) else {
            continue;
        };
        let (name, comment) = split_comment(entry);
        let Some(name) = clean_name(name) else {
            continue;
        };

        while stack.last().is_some_and(|&(col, _)| col >= column) {
            stack.pop();
        }
        let depth = stack.len();
        if depth > max_depth {
            debug!(line = idx + 1, depth, "tree entry deeper than limit, skipped");
            continue;
        }

        let parent = stack.last().map(|&(_, id)| id);
        let is_dir = name.ends_with('/');
        let bare = name.trim_end_matches('/').to_string();
        let full_path = match parent {
            Some(p) => format!("{}/{}", tree.nodes[p].full_path, bare),
            None => bare.clone(),
        };

        let id = tree.nodes.len();
        tree.nodes.push(ParsedTreeNode {
            name: bare,
            full_path,
            is_directory: is_dir,
            depth,
            children: Vec::new(),
            parent,
            comment,
            line: idx + 1,
        });
        match parent {
            Some(p) => tree.nodes[p].children.push(id),
            None => tree.roots.push(id),
        }
        stack.push((column, id));
    }

    // Anything with children is a directory even without the slash
    for i in 0..tree.nodes.len() {
        if !tree.nodes[i].children.is_empty() {
            tree.nodes[i].is_directory = true;
        }
    }
    tree
}

/// Quick check used before treating a fenced block as a tree.
pub fn looks_like_tree(text: &str) -> bool {
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.len() < 2 {
        return false;
    }

    let connectors = lines
        .iter()
        .filter(|l| {
            l.contains(['├', '└', '│'])
                || l.contains("|--")
                || l.contains("+--")
                || l.contains("`--")
                || l.contains("\\--")
        })
        .count();
    if connectors > 0 {
        return lines.iter().all(|l| {
            split_prefix(l)
                .map(|(_, entry)| split_comment(entry).0)
                .is_none_or(is_entry_like)
        });
    }

    // Plain indentation: every line an entry, some nesting, some directory
    let all_entries = lines.iter().all(|l| {
        split_prefix(l).is_some_and(|(_, entry)| is_entry_like(split_comment(entry).0))
    });
    all_entries
        && lines.iter().any(|l| l.starts_with(' '))
        && lines.iter().any(|l| split_comment(l.trim()).0.ends_with('/'))
}

fn expand_tabs(line: &str, tab_width: usize) -> String {
    let mut out = String::with_capacity(line.len());
    let mut col = 0;
    for c in line.chars() {
        if c == '\t' {
            let n = tab_width.max(1) - (col % tab_width.max(1));
            out.extend(std::iter::repeat_n(' ', n));
            col += n;
        } else {
            out.push(c);
            col += 1;
        }
    }
    out
}

/// Column (in chars) where the entry name starts, and the rest of the line.
fn split_prefix(line: &str) -> Option<(usize, &str)> {
    let mut column = 0;
    for (byte, c) in line.char_indices() {
        if GLYPHS.contains(&c) {
            column += 1;
            continue;
        }
        return Some((column, line[byte..].trim_end()));
    }
    None
}

/// Separate trailing `# note`, `// note`, `<-- note` or `← note`.
fn split_comment(entry: &str) -> (&str, Option<String>) {
    let markers = [" #", " //", " <--", " <-", " ←", "\t#"];
    let cut = markers.iter().filter_map(|m| entry.find(m)).min();
    let (name, comment) = match cut {
        Some(i) => (&entry[..i], Some(&entry[i..])),
        None => (entry, None),
    };

    // `main.rs (entry point)`
    let (name, paren) = match name.find(" (") {
        Some(i) if name.trim_end().ends_with(')') => (&name[..i], Some(&name[i..])),
        _ => (name, None),
    };

    let comment = comment.or(paren).map(|c| {
        c.trim()
            .trim_start_matches(['#', '/', '<', '-', '←', '('])
            .trim_end_matches(')')
            .trim()
            .to_string()
    });
    (name.trim(), comment.filter(|c| !c.is_empty()))
}

/// Drop ellipses and placeholders; strip quoting and list bullets.
fn clean_name(name: &str) -> Option<String> {
    let name = name.trim().trim_matches(['`', '"', '\'']).trim();
    if name.is_empty()
        || name == "..."
        || name == "…"
        || name.starts_with("...")
        || name.starts_with('(')
    {
        return None;
    }
    Some(name.replace('\\', "/"))
}

fn is_entry_like(name: &str) -> bool {
    let name = name.trim();
    !name.is_empty()
        && !name.contains(char::is_whitespace)
        && !name.contains([';', '(', ')', '{', '}', '=', '<', '>', '"'])
}
