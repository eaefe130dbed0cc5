//! File-system behavior of diff accept/reject.

use std::path::{Path, PathBuf};

use ember_agent::diff::{DiffService, MarkerSurface, compute_hunks};
use ember_rpc::{PreviewMark, StagedDiff};

struct NoopSurface;

impl MarkerSurface for NoopSurface {
    fn line_count(&self, _path: &Path) -> Option<usize> {
        None
    }
    fn add_marks(&self, _path: &Path, _marks: &[PreviewMark]) {}
    fn clear_marks(&self, _path: &Path) {}
}

fn stage_replacement(service: &DiffService, path: PathBuf, replacement: &str) {
    let original = std::fs::read_to_string(&path).unwrap_or_default();
    let hunks = compute_hunks(&original, replacement);
    service.stage(StagedDiff::new(path, replacement.to_string(), hunks));
}

#[test]
fn accept_creates_a_new_file_with_parents() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("src").join("deeply").join("new.rs");
    let service = DiffService::new();

    stage_replacement(&service, path.clone(), "fn main() {}\n");
    assert!(service.has_pending(&path));

    assert!(service.accept(&NoopSurface, &path));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "fn main() {}\n");
    assert!(!service.has_pending(&path));
}

#[test]
fn accept_replaces_existing_content() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lib.rs");
    std::fs::write(&path, "old content\nline two\n").unwrap();
    let service = DiffService::new();

    stage_replacement(&service, path.clone(), "brand new\n");

    assert!(service.accept(&NoopSurface, &path));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "brand new\n");
}

#[test]
fn empty_replacement_deletes_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("doomed.rs");
    std::fs::write(&path, "about to go\n").unwrap();
    let service = DiffService::new();

    stage_replacement(&service, path.clone(), "");

    assert!(service.accept(&NoopSurface, &path));
    assert!(!path.exists());
    assert!(!service.has_pending(&path));
}

#[test]
fn empty_replacement_for_missing_file_is_a_clean_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("never-existed.rs");
    let service = DiffService::new();

    stage_replacement(&service, path.clone(), "");

    assert!(service.accept(&NoopSurface, &path));
    assert!(!path.exists());
}

#[test]
fn accept_without_staged_diff_returns_false() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("untouched.rs");
    std::fs::write(&path, "stays\n").unwrap();
    let service = DiffService::new();

    assert!(!service.accept(&NoopSurface, &path));
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "stays\n");
}

#[test]
fn reject_leaves_the_file_alone() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("kept.rs");
    std::fs::write(&path, "original\n").unwrap();
    let service = DiffService::new();

    stage_replacement(&service, path.clone(), "proposed\n");
    assert!(service.reject(&NoopSurface, &path));

    assert_eq!(std::fs::read_to_string(&path).unwrap(), "original\n");
    assert!(!service.has_pending(&path));
    // The staged entry is gone, so a later accept does nothing.
    assert!(!service.accept(&NoopSurface, &path));
}

#[test]
fn failed_accept_keeps_the_diff_staged() {
    let dir = tempfile::tempdir().unwrap();
    // A regular file where a parent directory is needed.
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, "i am a file\n").unwrap();

    let path = blocker.join("cannot.rs");
    let service = DiffService::new();
    service.stage(StagedDiff::new(path.clone(), "nope\n".to_string(), Vec::new()));

    assert!(!service.accept(&NoopSurface, &path));
    assert!(!path.exists());
    // The proposal survives the failure; the caller may retry or reject.
    assert!(service.has_pending(&path));
    assert_eq!(service.pending(&path).unwrap().replacement, "nope\n");
    assert!(service.reject(&NoopSurface, &path));
    assert!(!service.has_pending(&path));
}

#[test]
fn staged_paths_are_tracked_independently() {
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("a.rs");
    let second = dir.path().join("b.rs");
    let service = DiffService::new();

    stage_replacement(&service, first.clone(), "a\n");
    stage_replacement(&service, second.clone(), "b\n");

    let mut paths = service.pending_paths();
    paths.sort();
    assert_eq!(paths, vec![first.clone(), second.clone()]);

    assert!(service.accept(&NoopSurface, &first));
    assert!(!service.has_pending(&first));
    assert!(service.has_pending(&second));
}
