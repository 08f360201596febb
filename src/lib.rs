//! **fenceline** - Streams LLM replies, extracts fenced code blocks, infers
//! their target files and applies them to a workspace with backup, conflict
//! detection and time-windowed undo.
//!
//! The fence parser behaves identically whether fed a character at a time or
//! as one buffer; every file mutation is backed up and can be rolled back.

/// Command-line interface with clap integration
pub mod cli;

/// Shell completion generation
pub mod completion;

/// Extraction, inference, proposals and the file-mutation pipeline
pub mod core {
    /// Code block data model and per-message proposals
    pub mod block;
    pub use block::{BlockStatus, BlockType, CodeBlock, CodeProposal, LineRange, ProposalStatus};

    /// Character-level streaming fence parser
    pub mod fence;
    pub use fence::{FenceError, FenceEvent, FenceParser, parse_message};

    /// Fence tag normalization and extension lookup
    pub mod language;

    /// Block role classification
    pub mod classify;
    pub use classify::classify;

    /// Cascading path inference
    pub mod infer;
    pub use infer::{ContextFile, InferenceEngine, InferenceHooks, InferenceResult, InferenceStrategy};

    /// ASCII directory tree parsing
    pub mod tree;
    pub use tree::{ParsedTree, ParsedTreeNode, parse_tree};

    /// File operations, tree proposals and validation
    pub mod proposal;
    pub use proposal::{FileOperation, FileTreeProposal, MessageProposal, OperationKind, ProposalBuilder};

    /// Snapshot-and-compare external edit detection
    pub mod conflict;
    pub use conflict::{ConflictDetector, ConflictInfo, ConflictReason, FileSnapshot};

    /// Hash-verified backup store
    pub mod backup;
    pub use backup::{BackupInfo, BackupManager};

    /// Retention, health, listing and cleanup over the backup store
    pub mod backup_ops;

    /// Phased batch apply with rollback
    pub mod apply_engine;
    pub use apply_engine::{ApplyEngine, ApplyObserver, ApplyResult, ApplyResultType, BatchApplyResult};

    /// Pausable undo windows over applied changes
    pub mod undo;
    pub use undo::{FileChangeRecord, UndoManager, UndoState};

    /// Wall clock abstraction (manual clock for tests)
    pub mod clock;
    pub use clock::{Clock, ManualClock, SystemClock};
}

/// Infrastructure - Configuration, I/O, walking and logging
pub mod infra {
    /// Layered configuration with TOML support
    pub mod config;
    pub use config::{Config, init as config_init, load_config, load_config_from};

    /// Hashing, text layout detection and atomic writes
    pub mod io;

    /// Gitignore-aware directory walking
    pub mod walk;
    pub use walk::FileWalker;

    /// tracing-subscriber setup
    pub mod logging;

    /// Workspace-relative path helpers
    pub mod utils;
}

/// Subcommand handlers
pub mod cli_ext {
    pub mod common;
    pub mod extract_cmd;
    pub mod infer_cmd;
    pub mod plan_cmd;
    pub mod apply_cmd;
    pub mod backup_cmd;
}

pub use cli::{AppContext, Cli, Commands};
pub use infra::{Config, FileWalker, load_config};
