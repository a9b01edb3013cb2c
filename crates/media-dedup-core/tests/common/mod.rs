#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use media_dedup_core::indexer::IndexOptions;

/// Create a file with the given content, creating parent directories
pub fn create_file(dir: &Path, relative: &str, content: &[u8]) -> PathBuf {
    let path = dir.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, content).unwrap();
    path
}

/// Build a small library tree of `count` distinct tracks
///
/// Layout:
///   root/
///     album_0/track_00.mp3
///     album_0/track_01.mp3
///     album_1/track_02.mp3
///     ...
pub fn create_library(root: &Path, count: usize) -> Vec<PathBuf> {
    (0..count)
        .map(|i| {
            create_file(
                root,
                &format!("album_{}/track_{:02}.mp3", i / 2, i),
                format!("audio payload {}", i).as_bytes(),
            )
        })
        .collect()
}

/// Indexer options small enough to exercise the queue
pub fn test_options() -> IndexOptions {
    IndexOptions {
        threads: 3,
        queue_depth: 2,
        buffer_size: 8,
        ..Default::default()
    }
}

/// Non-blank lines of a text file
pub fn read_lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

/// A 64-character digest made of one repeated hex digit
pub fn fake_digest(c: char) -> String {
    std::iter::repeat(c).take(64).collect()
}
