//! Shared plumbing for the message-driven commands.

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::cli::MessageArgs;
use crate::core::conflict::ConflictDetector;
use crate::core::infer::ContextFile;
use crate::core::proposal::ProposalBuilder;
use crate::infra::config::{Config, load_config_from};
use crate::infra::walk::FileWalker;

/// A model reply loaded from disk or stdin
#[derive(Debug, Clone)]
pub struct LoadedMessage
{
    pub id: String,
    pub text: String,
}

/// Read the message text; `-` reads stdin.
pub fn load_message(args: &MessageArgs) -> Result<LoadedMessage>
{
    let text = if args.input.as_os_str() == "-"
    {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read message from stdin")?;
        buf
    }
    else
    {
        let path = expand(&args.input);
        std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read message {}", path.display()))?
    };

    let id = match &args.message_id
    {
        Some(id) => id.clone(),
        None => args
            .input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .filter(|s| s != "-")
            .unwrap_or_else(|| "stdin".to_string()),
    };

    Ok(LoadedMessage { id, text })
}

/// Expand `~` and `$VAR` in a user-supplied path.
pub fn expand(path: &Path) -> PathBuf
{
    let raw = path.to_string_lossy();
    match shellexpand::full(&raw)
    {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => path.to_path_buf(),
    }
}

/// Canonical workspace root; must be an existing directory.
pub fn workspace_root(root: &Path) -> Result<PathBuf>
{
    let root = expand(root);
    dunce::canonicalize(&root).with_context(|| format!("Workspace root {} not found", root.display()))
}

/// Config layered from the workspace root.
pub fn workspace_config(root: &Path) -> Result<Config>
{
    load_config_from(root)
}

/// Proposal builder bound to the workspace so targets get snapshotted.
pub fn proposal_builder(
    root: &Path,
    cfg: &Config,
) -> Result<ProposalBuilder>
{
    let builder = ProposalBuilder::new(cfg.tree.clone(), cfg.inference.clone())?;
    Ok(builder.with_workspace(ConflictDetector::new(root)))
}

/// Context files named on the command line, paths kept relative to `root`.
pub fn context_from_paths(
    root: &Path,
    paths: &[PathBuf],
) -> Result<Vec<ContextFile>>
{
    let mut out = Vec::with_capacity(paths.len());
    for p in paths
    {
        let p = expand(p);
        let abs = if p.is_absolute() { p.clone() } else { root.join(&p) };
        let content = std::fs::read_to_string(&abs).ok();
        let rel = abs
            .strip_prefix(root)
            .unwrap_or(&p)
            .to_string_lossy()
            .into_owned();
        out.push(ContextFile::new(&rel, content));
    }
    Ok(out)
}

/// Gitignore-aware scan of a directory for context files.
pub fn context_from_dir(
    dir: &Path,
    cfg: &Config,
) -> Result<Vec<ContextFile>>
{
    let dir = workspace_root(dir)?;
    let walker = FileWalker::new(&cfg.ignore_patterns)?;
    ContextFile::collect_from_dir(&dir, &walker)
}

/// Every text file in the workspace, used when no explicit context is given.
pub fn workspace_context(
    root: &Path,
    cfg: &Config,
) -> Result<Vec<ContextFile>>
{
    let walker = FileWalker::new(&cfg.ignore_patterns)?;
    ContextFile::collect_from_dir(root, &walker)
}
