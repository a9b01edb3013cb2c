mod common;

use std::collections::HashSet;
use std::fs;

use media_dedup_core::indexer::{HashIndexer, IndexOptions, IndexOutcome};
use media_dedup_core::processing::compute_digest;
use media_dedup_core::plan::{PlanBuilder, PlanOutputs};
use media_dedup_core::store::{FileStore, RowLayout, Store};
use tempfile::tempdir;

use common::{create_file, create_library, read_lines, test_options};

#[test]
fn test_full_run_appends_every_file() {
    let library = tempdir().unwrap();
    let state = tempdir().unwrap();
    let files = create_library(library.path(), 7);
    let store_path = state.path().join("external_hashes.tsv");

    let mut store = FileStore::new(&store_path, RowLayout::External);
    let summary = HashIndexer::new(test_options())
        .run(library.path(), &mut store)
        .unwrap();

    assert_eq!(summary.outcome, IndexOutcome::Completed);
    assert_eq!(summary.hashed, files.len());
    assert_eq!(read_lines(&store_path).len(), files.len());
}

#[test]
fn test_second_run_is_idempotent() {
    let library = tempdir().unwrap();
    let state = tempdir().unwrap();
    create_library(library.path(), 5);
    let store_path = state.path().join("external_hashes.tsv");

    let indexer = HashIndexer::new(test_options());
    indexer
        .run(library.path(), &mut FileStore::new(&store_path, RowLayout::External))
        .unwrap();
    let before = fs::read(&store_path).unwrap();

    let summary = indexer
        .run(library.path(), &mut FileStore::new(&store_path, RowLayout::External))
        .unwrap();

    assert_eq!(summary.outcome, IndexOutcome::NoNewFiles);
    assert_eq!(summary.hashed, 0);
    assert_eq!(summary.already_indexed, 5);
    assert_eq!(fs::read(&store_path).unwrap(), before);
}

#[test]
fn test_limit_then_continuation_covers_everything() {
    let library = tempdir().unwrap();
    let state = tempdir().unwrap();
    create_library(library.path(), 10);
    let store_path = state.path().join("external_hashes.tsv");

    let capped = HashIndexer::new(test_options().with_limit(Some(4)));
    let summary = capped
        .run(library.path(), &mut FileStore::new(&store_path, RowLayout::External))
        .unwrap();
    assert_eq!(summary.outcome, IndexOutcome::LimitReached);
    assert_eq!(summary.hashed, 4);
    assert_eq!(read_lines(&store_path).len(), 4);

    let summary = HashIndexer::new(test_options())
        .run(library.path(), &mut FileStore::new(&store_path, RowLayout::External))
        .unwrap();
    assert_eq!(summary.outcome, IndexOutcome::Completed);
    assert_eq!(summary.hashed, 6);

    let lines = read_lines(&store_path);
    assert_eq!(lines.len(), 10);
    let paths: HashSet<&str> = lines.iter().map(|l| l.split_once('\t').unwrap().1).collect();
    assert_eq!(paths.len(), 10);
}

#[test]
fn test_capped_run_takes_files_in_walk_order() {
    let library = tempdir().unwrap();
    let state = tempdir().unwrap();
    let files = create_library(library.path(), 6);
    let store_path = state.path().join("external_hashes.tsv");

    HashIndexer::new(test_options().with_limit(Some(3)))
        .run(library.path(), &mut FileStore::new(&store_path, RowLayout::External))
        .unwrap();

    let recorded: Vec<String> = read_lines(&store_path)
        .iter()
        .map(|l| l.split_once('\t').unwrap().1.to_string())
        .collect();
    let expected: Vec<String> = files[..3]
        .iter()
        .map(|p| fs::canonicalize(p).unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(recorded, expected);
}

#[test]
fn test_rows_carry_sha256_of_content() {
    let library = tempdir().unwrap();
    let state = tempdir().unwrap();
    let track = create_file(library.path(), "single.wav", b"hello world");
    let store_path = state.path().join("external_hashes.tsv");

    let mut store = FileStore::new(&store_path, RowLayout::External);
    HashIndexer::new(test_options())
        .run(library.path(), &mut store)
        .unwrap();

    let rows = store.load().unwrap();
    assert_eq!(rows.len(), 1);
    let expected = compute_digest(&track, 4096).unwrap();
    assert_eq!(
        read_lines(&store_path)[0],
        format!("{}\t{}", expected, fs::canonicalize(&track).unwrap().display())
    );
    assert_eq!(
        expected.as_str(),
        "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
    );
}

#[test]
fn test_identical_content_gets_identical_digest() {
    let library = tempdir().unwrap();
    let state = tempdir().unwrap();
    create_file(library.path(), "a/original.flac", b"same bytes");
    create_file(library.path(), "b/copy.flac", b"same bytes");
    let store_path = state.path().join("external_hashes.tsv");

    HashIndexer::new(test_options())
        .run(library.path(), &mut FileStore::new(&store_path, RowLayout::External))
        .unwrap();

    let digests: HashSet<String> = read_lines(&store_path)
        .iter()
        .map(|l| l.split_once('\t').unwrap().0.to_string())
        .collect();
    assert_eq!(digests.len(), 1);
}

#[test]
fn test_invalid_root_does_not_create_store() {
    let state = tempdir().unwrap();
    let store_path = state.path().join("external_hashes.tsv");

    let result = HashIndexer::new(test_options()).run(
        &state.path().join("no_such_root"),
        &mut FileStore::new(&store_path, RowLayout::External),
    );

    assert!(matches!(result, Err(media_dedup_core::Error::InvalidRoot(_))));
    assert!(!store_path.exists());
}

#[test]
fn test_malformed_store_rows_do_not_stop_indexing() {
    let library = tempdir().unwrap();
    let state = tempdir().unwrap();
    create_library(library.path(), 2);
    let store_path = state.path().join("external_hashes.tsv");
    fs::write(&store_path, "this line is garbage\n").unwrap();

    let summary = HashIndexer::new(test_options())
        .run(library.path(), &mut FileStore::new(&store_path, RowLayout::External))
        .unwrap();

    assert_eq!(summary.malformed_rows, 1);
    assert_eq!(summary.hashed, 2);
    assert_eq!(read_lines(&store_path).len(), 3);
}

#[test]
fn test_respelled_root_is_already_indexed() {
    let library = tempdir().unwrap();
    let state = tempdir().unwrap();
    create_library(library.path(), 4);
    fs::create_dir(library.path().join("sub")).unwrap();
    let store_path = state.path().join("external_hashes.tsv");

    let indexer = HashIndexer::new(test_options());
    let first = indexer
        .run(library.path(), &mut FileStore::new(&store_path, RowLayout::External))
        .unwrap();
    assert_eq!(first.outcome, IndexOutcome::Completed);

    let second = indexer
        .run(
            &library.path().join("sub").join(".."),
            &mut FileStore::new(&store_path, RowLayout::External),
        )
        .unwrap();
    assert_eq!(second.outcome, IndexOutcome::NoNewFiles);
    assert_eq!(second.already_indexed, 4);

    // No file may end up both kept and quarantined
    let primary = state.path().join("hash_index.tsv");
    fs::write(&primary, "").unwrap();
    let outputs = PlanOutputs {
        plan: state.path().join("plan.tsv"),
        tmp: state.path().join("tmp.tsv"),
        report: state.path().join("report.txt"),
    };
    PlanBuilder::default()
        .build(
            &FileStore::new(&primary, RowLayout::Primary),
            &FileStore::new(&store_path, RowLayout::External),
            &store_path,
            &outputs,
        )
        .unwrap();
    assert!(read_lines(&outputs.plan).is_empty());
}

#[test]
fn test_unreadable_file_is_skipped_and_run_completes() {
    let library = tempdir().unwrap();
    let state = tempdir().unwrap();
    for name in ["a.mp3", "b.mp3", "c.mp3", "d.mp3"] {
        create_file(library.path(), name, name.as_bytes());
    }
    let doomed = library.path().join("d.mp3");
    let store_path = state.path().join("external_hashes.tsv");

    // One worker and a one-slot queue: when a.mp3 is appended only a and b
    // have been handed out, so d.mp3 is opened after it is removed
    let options = IndexOptions {
        threads: 1,
        queue_depth: 1,
        buffer_size: 8,
        ..Default::default()
    };
    let summary = HashIndexer::new(options)
        .run_with(
            library.path(),
            &mut FileStore::new(&store_path, RowLayout::External),
            |entry| {
                if entry.path.ends_with("a.mp3") {
                    fs::remove_file(&doomed).unwrap();
                }
            },
        )
        .unwrap();

    assert_eq!(summary.outcome, IndexOutcome::Completed);
    assert_eq!(summary.hashed, 3);
    assert_eq!(summary.skipped, 1);
    let lines = read_lines(&store_path);
    assert_eq!(lines.len(), 3);
    assert!(lines.iter().all(|l| !l.ends_with("d.mp3")));
}
