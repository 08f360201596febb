//! Message to multi-file proposal: tree detection, path alignment,
//! prose relocations and ordering.

use fenceline::core::conflict::ConflictDetector;
use fenceline::core::infer::{ContextFile, InferenceHooks};
use fenceline::core::proposal::{OperationKind, ProposalBuilder};
use fenceline::infra::config::{FileTreeParserOptions, InferenceOptions};
use tempfile::TempDir;

const TREE_MESSAGE: &str = "Here is the project structure:

```
my-app/
├── src/
│   ├── main.rs
│   └── util.rs
└── Cargo.toml
```

```rust:src/main.rs
fn main() {}
```

```toml:Cargo.toml
[package]
name = \"my-app\"
```
";

fn builder() -> ProposalBuilder {
    ProposalBuilder::new(FileTreeParserOptions::default(), InferenceOptions::default()).unwrap()
}

#[test]
fn tree_message_becomes_ordered_operations() {
    let tmp = TempDir::new().unwrap();
    let b = builder().with_workspace(ConflictDetector::new(tmp.path()));
    let proposal = b.from_message("m1", TREE_MESSAGE, &[], &mut InferenceHooks::new());

    assert!(proposal.tree.is_some());
    let ops: Vec<(&str, OperationKind)> = proposal
        .files
        .operations
        .iter()
        .map(|o| (o.path.as_str(), o.kind))
        .collect();
    assert_eq!(
        ops,
        vec![
            ("src", OperationKind::Mkdir),
            ("Cargo.toml", OperationKind::Create),
            ("src/main.rs", OperationKind::Create),
            ("src/util.rs", OperationKind::Create),
        ]
    );
    assert!(proposal.validation.is_valid());

    let util = &proposal.files.operations[3];
    assert!(util.content.is_none());
    assert!(proposal.files.operations[2].snapshot.as_ref().is_some_and(|s| !s.existed));
}

#[test]
fn tree_without_indicator_phrase_is_just_a_block() {
    let text = TREE_MESSAGE.replace("Here is the project structure:", "Look:");
    let proposal = builder().from_message("m1", &text, &[], &mut InferenceHooks::new());

    assert!(proposal.tree.is_none());
    assert!(proposal.files.operations.iter().all(|o| o.kind != OperationKind::Mkdir));
}

#[test]
fn prose_relocations_run_after_writes_of_other_files() {
    let text = "Please rename `src/old.rs` to `new.rs` and delete `src/legacy.rs`.\n\n```rust:src/lib.rs\npub mod new;\n```\n";
    let proposal = builder().from_message("m2", text, &[], &mut InferenceHooks::new());

    let ops: Vec<(&str, OperationKind, Option<&str>)> = proposal
        .files
        .operations
        .iter()
        .map(|o| (o.path.as_str(), o.kind, o.new_path.as_deref()))
        .collect();
    assert_eq!(
        ops,
        vec![
            ("src/old.rs", OperationKind::Rename, Some("src/new.rs")),
            ("src/lib.rs", OperationKind::Create, None),
            ("src/legacy.rs", OperationKind::Delete, None),
        ]
    );
}

#[test]
fn single_context_file_receives_unnamed_block() {
    let context = vec![ContextFile::new("app/models/user.py", Some("class User:\n    pass\n".into()))];
    let text = "Updated:\n\n```python\nclass User:\n    name: str\n```\n";
    let proposal = builder().from_message("m3", text, &context, &mut InferenceHooks::new());

    let op = &proposal.files.operations[0];
    assert_eq!(op.path, "app/models/user.py");
    assert_eq!(proposal.code.blocks[0].target_path.as_deref(), Some("app/models/user.py"));
}

#[test]
fn duplicate_writes_are_flagged() {
    let text = "```rust:src/a.rs\nfn a() {}\n```\n\n```rust:src/a.rs\nfn b() {}\n```\n";
    let proposal = builder().from_message("m4", text, &[], &mut InferenceHooks::new());

    assert!(proposal.validation.is_valid());
    assert_eq!(proposal.validation.warnings().count(), 1);
}
