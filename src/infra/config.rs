use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::cli::{AppContext, InitArgs};

/// Serialize `std::time::Duration` as whole seconds in config files
pub mod duration_secs
{
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(
        d: &Duration,
        s: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D>(d: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config
{
    /// Extra ignore globs used when collecting context files
    pub ignore_patterns: Vec<String>,

    /// Safety gates for applying file operations
    pub apply: ApplyOptions,

    /// Backup store location and retention ceilings
    pub backup: BackupOptions,

    /// Undo window and tick intervals
    pub undo: UndoOptions,

    /// ASCII tree detection and proposal thresholds
    pub tree: FileTreeParserOptions,

    /// Path inference cascade tuning
    pub inference: InferenceOptions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplyOptions
{
    pub create_backup: bool,
    pub check_for_conflicts: bool,
    pub allow_conflict_overwrite: bool,
    pub create_parent_directories: bool,
    pub preserve_encoding: bool,
    pub preserve_line_endings: bool,
    pub validate_text_file: bool,
    pub max_file_size_bytes: u64,
    pub verify_after_write: bool,
    pub track_for_undo: bool,
    pub rollback_on_failure: bool,
}

impl Default for ApplyOptions
{
    fn default() -> Self
    {
        Self {
            create_backup: true,
            check_for_conflicts: true,
            allow_conflict_overwrite: false,
            create_parent_directories: true,
            preserve_encoding: true,
            preserve_line_endings: true,
            validate_text_file: true,
            max_file_size_bytes: 10 * 1024 * 1024,
            verify_after_write: true,
            track_for_undo: true,
            rollback_on_failure: true,
        }
    }
}

impl ApplyOptions
{
    /// Quiet single-file applies: skip verification and text sniffing,
    /// still back up and still refuse to clobber external edits
    pub fn silent() -> Self
    {
        Self { verify_after_write: false, validate_text_file: false, ..Self::default() }
    }

    /// Multi-file proposals: everything on, rollback guaranteed
    pub fn batch() -> Self
    {
        Self {
            rollback_on_failure: true,
            track_for_undo: true,
            check_for_conflicts: true,
            create_backup: true,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupOptions
{
    /// Store directory, relative to the workspace root unless absolute
    pub backup_dir: PathBuf,
    pub compute_hash: bool,
    pub verify_after_write: bool,
    pub max_backups_per_file: usize,
    pub max_total_storage_bytes: u64,
    #[serde(with = "duration_secs")]
    pub max_backup_age: Duration,
    pub warning_free_space_bytes: u64,
    pub critical_free_space_bytes: u64,
}

impl Default for BackupOptions
{
    fn default() -> Self
    {
        Self {
            backup_dir: PathBuf::from(".fln/backups"),
            compute_hash: true,
            verify_after_write: true,
            max_backups_per_file: 10,
            max_total_storage_bytes: 500 * 1000 * 1000,
            max_backup_age: Duration::from_secs(30 * 24 * 60 * 60),
            warning_free_space_bytes: 1024 * 1024 * 1024,
            critical_free_space_bytes: 100 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UndoOptions
{
    #[serde(with = "duration_secs")]
    pub undo_window: Duration,
    pub max_undo_per_file: usize,
    #[serde(with = "duration_secs")]
    pub cleanup_interval: Duration,
    #[serde(with = "duration_secs")]
    pub update_interval: Duration,
    pub allow_extend_time: bool,
    #[serde(with = "duration_secs")]
    pub max_extension: Duration,
    pub verify_restoration: bool,
}

impl Default for UndoOptions
{
    fn default() -> Self
    {
        Self {
            undo_window: Duration::from_secs(30 * 60),
            max_undo_per_file: 10,
            cleanup_interval: Duration::from_secs(60),
            update_interval: Duration::from_secs(1),
            allow_extend_time: true,
            max_extension: Duration::from_secs(30 * 60),
            verify_restoration: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileTreeParserOptions
{
    pub require_indicator_phrase: bool,
    pub indicator_phrases: Vec<String>,
    pub minimum_files_for_proposal: usize,
    pub max_path_length: usize,
    pub max_depth: usize,
    /// Columns a tab counts for when measuring indentation
    pub tab_width: usize,
}

impl Default for FileTreeParserOptions
{
    fn default() -> Self
    {
        Self {
            require_indicator_phrase: true,
            indicator_phrases: [
                "project structure",
                "directory structure",
                "folder structure",
                "file structure",
                "create these files",
                "create the following files",
                "following structure",
                "file tree",
                "project layout",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            minimum_files_for_proposal: 2,
            max_path_length: 260,
            max_depth: 32,
            tab_width: 4,
        }
    }
}

/// Fixed confidence constants for each inference strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceTable
{
    pub explicit: f32,
    pub single_context: f32,
    pub language_match: f32,
    pub ambiguous_each: f32,
    pub type_name_exact: f32,
    pub type_name_partial: f32,
    pub content_similarity: f32,
    pub generated: f32,
    pub manual: f32,
}

impl Default for ConfidenceTable
{
    fn default() -> Self
    {
        Self {
            explicit: 1.0,
            single_context: 0.95,
            language_match: 0.85,
            ambiguous_each: 0.5,
            type_name_exact: 0.90,
            type_name_partial: 0.75,
            content_similarity: 0.60,
            generated: 0.50,
            manual: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceOptions
{
    /// Fall back to synthesizing a brand-new path
    pub allow_generated_paths: bool,
    /// Root directory for synthesized paths
    pub generated_base_dir: String,
    /// Minimum token overlap for content similarity
    pub content_similarity_threshold: f32,
    pub confidence: ConfidenceTable,
}

impl Default for InferenceOptions
{
    fn default() -> Self
    {
        Self {
            allow_generated_paths: true,
            generated_base_dir: "src".to_string(),
            content_similarity_threshold: 0.3,
            confidence: ConfidenceTable::default(),
        }
    }
}

pub fn load_config() -> Result<Config>
{
    load_config_from(Path::new("."))
}

/// Load layered config: first config file found under `dir`, then env
pub fn load_config_from(dir: &Path) -> Result<Config>
{
    let mut builder = config::Config::builder();

    // Load from config files in priority order
    let config_paths = ["fenceline.toml", "fenceline.yaml", "fenceline.json", ".fenceline.toml"];

    for name in &config_paths
    {
        let path = dir.join(name);
        if path.exists()
        {
            builder = builder.add_source(config::File::from(path));
            break;
        }
    }

    // Environment overrides like FENCELINE__APPLY__CREATE_BACKUP=false
    builder = builder.add_source(
        config::Environment::with_prefix("FENCELINE")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    );

    let cfg = builder
        .build()
        .context("Failed to load configuration")?;
    let parsed: Config = cfg
        .try_deserialize()
        .context("Failed to parse configuration")?;

    Ok(parsed)
}

pub fn init(
    args: InitArgs,
    ctx: &AppContext,
) -> Result<()>
{
    let config_path = args
        .path
        .join("fenceline.toml");

    if config_path.exists() && !args.force
    {
        anyhow::bail!(
            "Config file already exists at {}. Use --force to overwrite.",
            config_path.display()
        );
    }

    let config = Config::default();
    let toml_string =
        toml::to_string_pretty(&config).context("Failed to serialize default config")?;

    if ctx.dry_run
    {
        println!("{toml_string}");
        return Ok(());
    }

    std::fs::write(&config_path, toml_string).context("Failed to write config file")?;

    if !ctx.quiet
    {
        println!("Created config file at {}", config_path.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn defaults_match_documented_values()
    {
        let cfg = Config::default();
        assert!(cfg.apply.create_backup);
        assert!(cfg.apply.check_for_conflicts);
        assert_eq!(cfg.undo.undo_window, Duration::from_secs(1800));
        assert_eq!(cfg.backup.max_backups_per_file, 10);
        assert_eq!(cfg.backup.max_total_storage_bytes, 500_000_000);
        assert_eq!(cfg.tree.minimum_files_for_proposal, 2);
        assert_eq!(cfg.inference.confidence.single_context, 0.95);
    }

    #[test]
    fn presets_toggle_independent_gates()
    {
        let silent = ApplyOptions::silent();
        assert!(!silent.verify_after_write);
        assert!(!silent.validate_text_file);
        assert!(silent.check_for_conflicts);

        let batch = ApplyOptions::batch();
        assert!(batch.rollback_on_failure);
        assert!(batch.track_for_undo);
    }

    #[test]
    fn toml_round_trip_keeps_durations_in_seconds()
    {
        let text = toml::to_string_pretty(&Config::default()).unwrap();
        assert!(text.contains("undo_window = 1800"));

        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back.undo.undo_window, Duration::from_secs(1800));
    }

    #[test]
    fn file_overrides_defaults()
    {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(
            tmp.path()
                .join("fenceline.toml"),
            "[undo]\nundo_window = 60\n\n[apply]\ncreate_backup = false\n",
        )
        .unwrap();

        let cfg = load_config_from(tmp.path()).unwrap();
        assert_eq!(cfg.undo.undo_window, Duration::from_secs(60));
        assert!(!cfg.apply.create_backup);
        assert!(cfg.apply.check_for_conflicts);
    }
}
