//! Library-level scenarios over the in-memory store.

use std::path::Path;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use vault_linker::annotate::{run_annotate, run_clean};
use vault_linker::batch::{RunOptions, Scope};
use vault_linker::config::Config;
use vault_linker::error::LinkerError;
use vault_linker::fingerprint::fingerprint;
use vault_linker::hash_cmd::{run_add_boundaries, run_fingerprint};
use vault_linker::ids_cmd::run_ids;
use vault_linker::ledger::Ledger;
use vault_linker::models::ScoringMode;
use vault_linker::store::fs::FsStore;
use vault_linker::store::memory::MemoryStore;

const B: &str = "<!-- HASH_BOUNDARY -->";

fn setup(scores: &str) -> (TempDir, Config) {
    let tmp = TempDir::new().unwrap();
    let mut config = Config::for_root(tmp.path());
    config.scoring.scores_file = tmp.path().join("scores.json");
    std::fs::write(&config.scoring.scores_file, scores).unwrap();
    (tmp, config)
}

const SCORES: &str = r#"{
  "scores_by_source_path": {
    "Notes/a.md": [["Notes/b.md", 8.0, 0.7]]
  }
}"#;

async fn ledger_at(path: &Path) -> Ledger {
    Ledger::load(path).await.unwrap()
}

#[tokio::test]
async fn end_to_end_single_candidate() {
    let (_tmp, config) = setup(SCORES);
    let store = MemoryStore::new();
    let original = "---\nid: x\n---\nHello\n<!-- HASH_BOUNDARY -->\n";
    store.insert("Notes/a.md", original);
    store.insert("Notes/b.md", "B\n");

    let opts = RunOptions::default();
    let summary = run_annotate(&config, &store, &opts, ScoringMode::Smart)
        .await
        .unwrap();
    assert_eq!(summary.report.modified, 1);

    let out = store.text_of("Notes/a.md").unwrap();
    assert!(out.starts_with("---\nid: x\n---\nHello\n<!-- HASH_BOUNDARY -->"));
    assert_eq!(out.matches("<!-- LINKS_START -->").count(), 1);
    assert_eq!(out.matches("\n- ").count(), 1);
    assert!(out.contains("- [[Notes/b]]"));

    let again = run_annotate(&config, &store, &opts, ScoringMode::Smart)
        .await
        .unwrap();
    assert_eq!(again.report.modified, 0);
    assert_eq!(store.text_of("Notes/a.md").unwrap(), out);
    assert_eq!(store.write_count("Notes/a.md"), 1);
}

#[tokio::test]
async fn target_outside_vault_only_drops_that_link() {
    let (tmp, config) = setup(
        r#"{"scores_by_source_path": {"Notes/a.md": [["../outside.md", 9.5], ["Notes/b.md", 9.0]]}}"#,
    );
    std::fs::create_dir_all(tmp.path().join("Notes")).unwrap();
    std::fs::write(tmp.path().join("Notes/a.md"), "Hello\n<!-- HASH_BOUNDARY -->\n").unwrap();
    std::fs::write(tmp.path().join("Notes/b.md"), "B\n").unwrap();
    let store = FsStore::new(&config.vault).unwrap();

    let summary = run_annotate(&config, &store, &RunOptions::default(), ScoringMode::Skip)
        .await
        .unwrap();
    assert_eq!(summary.report.failed, 0);
    assert_eq!(summary.report.modified, 1);

    let out = std::fs::read_to_string(tmp.path().join("Notes/a.md")).unwrap();
    assert!(out.contains("<!-- LINKS_START -->\n- [[Notes/b]]\n<!-- LINKS_END -->"));
    assert!(!out.contains("outside"));
}

#[tokio::test]
async fn duplicate_sections_collapse() {
    let (_tmp, config) = setup(SCORES);
    let store = MemoryStore::new();
    let stray = "## Suggested Links\n<!-- LINKS_START -->\n- [[Old]]\n<!-- LINKS_END -->";
    store.insert(
        "Notes/a.md",
        &format!("Body\n{}\n{}\n\n{}\n\nuser tail\n", B, stray, stray),
    );
    store.insert("Notes/b.md", "B\n");

    run_annotate(&config, &store, &RunOptions::default(), ScoringMode::Skip)
        .await
        .unwrap();

    let out = store.text_of("Notes/a.md").unwrap();
    assert_eq!(out.matches("<!-- LINKS_START -->").count(), 1);
    assert!(!out.contains("[[Old]]"));
    assert!(out.ends_with("<!-- LINKS_END -->\n\nuser tail\n"));
}

#[tokio::test]
async fn missing_scores_abort_before_any_write() {
    let tmp = TempDir::new().unwrap();
    let config = Config::for_root(tmp.path());
    let store = MemoryStore::new();
    store.insert("Notes/a.md", "Hello\n<!-- HASH_BOUNDARY -->\n");

    let err = run_annotate(&config, &store, &RunOptions::default(), ScoringMode::Smart)
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<LinkerError>(),
        Some(LinkerError::UpstreamDataMissing { .. })
    ));
    assert_eq!(store.write_count("Notes/a.md"), 0);
    assert_eq!(store.read_count("Notes/a.md"), 0);
}

#[tokio::test]
async fn scoring_modes_drive_the_ledger() {
    let (_tmp, config) = setup(SCORES);
    let store = MemoryStore::new();
    store.insert("Notes/a.md", "Hello\n<!-- HASH_BOUNDARY -->\n");
    store.insert("Notes/b.md", "B\n<!-- HASH_BOUNDARY -->\n");
    let opts = RunOptions::default();

    run_annotate(&config, &store, &opts, ScoringMode::Skip).await.unwrap();
    assert!(!config.fingerprints_path().exists());

    let smart = run_annotate(&config, &store, &opts, ScoringMode::Smart).await.unwrap();
    assert_eq!(smart.ledger.unwrap().new, 2);
    let ledger = ledger_at(&config.fingerprints_path()).await;
    assert!(!ledger.metadata().force_rescore);
    assert_eq!(
        ledger.get("Notes/a.md").unwrap().hash,
        fingerprint("Hello\n<!-- HASH_BOUNDARY -->\n", B).unwrap()
    );

    let smart = run_annotate(&config, &store, &opts, ScoringMode::Smart).await.unwrap();
    assert_eq!(smart.ledger.unwrap().unchanged, 2);

    run_annotate(&config, &store, &opts, ScoringMode::Force).await.unwrap();
    assert!(ledger_at(&config.fingerprints_path()).await.metadata().force_rescore);
}

#[tokio::test]
async fn ledger_keeps_read_mtime_across_annotation_rewrite() {
    let (_tmp, config) = setup(SCORES);
    let store = MemoryStore::new();
    store.insert("Notes/a.md", "Hello\n<!-- HASH_BOUNDARY -->\n");
    store.insert("Notes/b.md", "B\n");
    let read_mtime = store.mtime_of("Notes/a.md").unwrap();
    let opts = RunOptions::default();

    run_annotate(&config, &store, &opts, ScoringMode::Smart).await.unwrap();
    let entry = ledger_at(&config.fingerprints_path())
        .await
        .get("Notes/a.md")
        .unwrap()
        .clone();
    assert_eq!(entry.mtime, read_mtime);
    assert!(store.mtime_of("Notes/a.md").unwrap() > read_mtime);

    let again = run_annotate(&config, &store, &opts, ScoringMode::Smart).await.unwrap();
    assert_eq!(again.ledger.unwrap().unchanged, 1);
}

#[tokio::test]
async fn ledger_pruned_only_for_full_runs() {
    let (_tmp, config) = setup(SCORES);
    let store = MemoryStore::new();
    store.insert("Notes/a.md", "A\n<!-- HASH_BOUNDARY -->\n");
    store.insert("Journal/j.md", "J\n<!-- HASH_BOUNDARY -->\n");
    run_fingerprint(&config, &store, &RunOptions::default(), false)
        .await
        .unwrap();
    assert_eq!(ledger_at(&config.fingerprints_path()).await.len(), 2);

    // A store that no longer has the journal note, scoped run: nothing pruned.
    let smaller = MemoryStore::new();
    smaller.insert("Notes/a.md", "A\n<!-- HASH_BOUNDARY -->\n");
    let scoped = RunOptions {
        scope: Scope::folders(&["Notes"]),
        ..RunOptions::default()
    };
    let summary = run_fingerprint(&config, &smaller, &scoped, false).await.unwrap();
    assert_eq!(summary.ledger.pruned, 0);

    let summary = run_fingerprint(&config, &smaller, &RunOptions::default(), false)
        .await
        .unwrap();
    assert_eq!(summary.ledger.pruned, 1);
    assert!(ledger_at(&config.fingerprints_path()).await.get("Journal/j.md").is_none());
}

#[tokio::test]
async fn cancelled_before_start_does_nothing() {
    let (_tmp, config) = setup(SCORES);
    let store = MemoryStore::new();
    store.insert("Notes/a.md", "no marker\n");

    let cancel = CancellationToken::new();
    cancel.cancel();
    let opts = RunOptions {
        cancel,
        ..RunOptions::default()
    };
    let report = run_add_boundaries(&config, &store, &opts).await.unwrap();
    assert!(report.cancelled);
    assert_eq!(report.examined, 0);
    assert_eq!(store.text_of("Notes/a.md").unwrap(), "no marker\n");
}

#[tokio::test]
async fn identifiers_assigned_and_duplicates_reported() {
    let (_tmp, config) = setup(SCORES);
    let store = MemoryStore::new();
    let shared = "---\nid: 0b6f1c52-7d1e-4c4a-9f3e-5a6b7c8d9e0f\n---\n";
    store.insert("a.md", shared);
    store.insert("b.md", shared);
    store.insert("c.md", "---\nid: 00000000-0000-0000-0000-000000000000\n---\n");

    let summary = run_ids(&config, &store, &RunOptions::default()).await.unwrap();
    assert_eq!(summary.assigned, 1);
    assert_eq!(summary.duplicates.len(), 1);
    assert_eq!(store.text_of("a.md").unwrap(), shared);
    assert_eq!(store.text_of("b.md").unwrap(), shared);
    assert!(!store.text_of("c.md").unwrap().contains("00000000-0000"));

    let again = run_ids(&config, &store, &RunOptions::default()).await.unwrap();
    assert_eq!(again.assigned, 0);
    assert_eq!(again.report.modified, 0);
}

#[tokio::test]
async fn exclusions_apply_to_every_command() {
    let (_tmp, mut config) = setup(SCORES);
    config.exclude.folders = vec!["Scripts".to_string()];
    config.exclude.files = vec!["^index$".to_string()];
    let store = MemoryStore::new();
    store.insert("Scripts/x.md", "x\n");
    store.insert("index.md", "x\n");
    store.insert("myindex.md", "x\n");

    let report = run_add_boundaries(&config, &store, &RunOptions::default())
        .await
        .unwrap();
    assert_eq!(report.excluded, 2);
    assert_eq!(report.modified, 1);
    assert_eq!(store.text_of("Scripts/x.md").unwrap(), "x\n");
    assert_eq!(store.text_of("index.md").unwrap(), "x\n");
    assert!(store.text_of("myindex.md").unwrap().contains(B));
}

#[tokio::test]
async fn clean_then_annotate_round_trip() {
    let (_tmp, config) = setup(SCORES);
    let store = MemoryStore::new();
    let original = "Hello\n<!-- HASH_BOUNDARY -->\n";
    store.insert("Notes/a.md", original);
    store.insert("Notes/b.md", "B\n");

    let opts = RunOptions::default();
    run_annotate(&config, &store, &opts, ScoringMode::Skip).await.unwrap();
    let annotated = store.text_of("Notes/a.md").unwrap();

    let report = run_clean(&config, &store, &opts, false).await.unwrap();
    assert_eq!(report.modified, 1);
    assert_eq!(store.text_of("Notes/a.md").unwrap(), original);

    run_annotate(&config, &store, &opts, ScoringMode::Skip).await.unwrap();
    assert_eq!(store.text_of("Notes/a.md").unwrap(), annotated);
}
