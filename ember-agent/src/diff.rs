//! Diff staging and reconciliation.
//!
//! The backend proposes whole-file replacements; this module stages them,
//! paints preview markers into the host editor, and commits or discards them
//! on the operator's decision. Hunks are computed for display only: the
//! accepted artifact is always the full replacement text, so preview
//! rendering cannot drift from what lands on disk.

use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use similar::{DiffTag, TextDiff};

use ember_rpc::{ChangeKind, DiffHunk, PreviewMark, StagedDiff};

/// Host-editor surface the preview markers are painted onto.
///
/// The service never touches buffer content; it only asks the host to
/// decorate line ranges and to report how many lines the live buffer has
/// right now (the buffer may have been edited since the diff was staged).
pub trait MarkerSurface {
    /// Current line count of the buffer for `path`, or `None` when the file
    /// is not open in the editor.
    fn line_count(&self, path: &Path) -> Option<usize>;

    fn add_marks(&self, path: &Path, marks: &[PreviewMark]);

    fn clear_marks(&self, path: &Path);
}

/// Stages proposed file replacements and applies or discards them.
///
/// At most one staged diff per path; staging again replaces. Accept and
/// reject resolve the staged entry under one lock acquisition, so concurrent
/// decisions on the same path cannot both win.
#[derive(Default)]
pub struct DiffService {
    pending: Mutex<HashMap<PathBuf, StagedDiff>>,
}

impl DiffService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a proposed replacement. Last writer wins; no file I/O.
    pub fn stage(&self, diff: StagedDiff) {
        self.pending.lock().unwrap().insert(diff.path.clone(), diff);
    }

    /// Paint preview markers for the staged diff on `path`.
    ///
    /// Prior marks for the path are cleared first. Hunk ranges are clamped
    /// to the buffer's current line count; a hunk entirely past the end of
    /// the buffer is skipped rather than painted out of bounds.
    pub fn preview(&self, surface: &dyn MarkerSurface, path: &Path) {
        let pending = self.pending.lock().unwrap();
        let Some(diff) = pending.get(path) else { return };

        surface.clear_marks(path);

        let Some(line_count) = surface.line_count(path) else {
            return;
        };
        if line_count == 0 {
            return;
        }

        let marks: Vec<PreviewMark> = diff
            .hunks
            .iter()
            .filter(|hunk| hunk.start_line <= line_count)
            .map(|hunk| {
                // Insertions keep their empty range (end = start - 1); the
                // host renders them as an anchor between lines, not a span.
                let end_line = match hunk.kind {
                    ChangeKind::Add => hunk.end_line,
                    _ => hunk.end_line.min(line_count).max(hunk.start_line),
                };
                PreviewMark { start_line: hunk.start_line, end_line, kind: hunk.kind }
            })
            .collect();

        if !marks.is_empty() {
            surface.add_marks(path, &marks);
        }
    }

    /// Commit the staged replacement for `path` to disk.
    ///
    /// Creates parent directories for new files, replaces existing files
    /// atomically (write-then-rename in the target directory), and deletes
    /// the file when the replacement is empty. Returns `false` when nothing
    /// is staged or the file system refuses; failures are logged, never
    /// raised. The entry and its marks are cleared only on success, so a
    /// failed accept can be retried or rejected.
    pub fn accept(&self, surface: &dyn MarkerSurface, path: &Path) -> bool {
        let Some(diff) = self.pending.lock().unwrap().remove(path) else {
            return false;
        };

        match apply_replacement(&diff.path, &diff.replacement) {
            Ok(()) => {
                surface.clear_marks(path);
                true
            }
            Err(err) => {
                tracing::error!(path = %diff.path.display(), "failed to apply diff: {err}");
                // Restore the proposal unless a newer one was staged while
                // the write was in flight.
                self.pending.lock().unwrap().entry(diff.path.clone()).or_insert(diff);
                false
            }
        }
    }

    /// Discard the staged diff for `path`. No file I/O.
    pub fn reject(&self, surface: &dyn MarkerSurface, path: &Path) -> bool {
        let removed = self.pending.lock().unwrap().remove(path).is_some();
        if removed {
            surface.clear_marks(path);
        }
        removed
    }

    pub fn has_pending(&self, path: &Path) -> bool {
        self.pending.lock().unwrap().contains_key(path)
    }

    pub fn pending(&self, path: &Path) -> Option<StagedDiff> {
        self.pending.lock().unwrap().get(path).cloned()
    }

    pub fn pending_paths(&self) -> Vec<PathBuf> {
        self.pending.lock().unwrap().keys().cloned().collect()
    }
}

/// Write `replacement` to `path`: create with parents, atomic overwrite, or
/// delete when the replacement is empty.
fn apply_replacement(path: &Path, replacement: &str) -> std::io::Result<()> {
    if replacement.is_empty() {
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        return Ok(());
    }

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            std::fs::create_dir_all(parent)?;
            parent
        }
        _ => Path::new("."),
    };

    // Temp file in the target directory so the rename stays on one
    // filesystem and readers never observe a half-written file.
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(replacement.as_bytes())?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

// ── Hunk computation ─────────────────────────────────────────────

/// Derive display hunks from original and replacement content.
///
/// Line numbers are 1-indexed against the ORIGINAL content; `end_line` is
/// inclusive. A pure insertion reports `end_line = start_line - 1` (an empty
/// original range at the insertion point), matching how the host anchors
/// insert markers between lines.
pub fn compute_hunks(original: &str, replacement: &str) -> Vec<DiffHunk> {
    let diff = TextDiff::from_lines(original, replacement);
    let old_lines: Vec<&str> = original.split_inclusive('\n').collect();
    let new_lines: Vec<&str> = replacement.split_inclusive('\n').collect();

    let mut hunks = Vec::new();
    for op in diff.ops() {
        let (tag, old_range, new_range) = op.as_tag_tuple();
        let kind = match tag {
            DiffTag::Equal => continue,
            DiffTag::Insert => ChangeKind::Add,
            DiffTag::Delete => ChangeKind::Delete,
            DiffTag::Replace => ChangeKind::Modify,
        };
        hunks.push(DiffHunk {
            start_line: old_range.start + 1,
            end_line: old_range.end,
            original: old_lines[old_range.clone()].concat(),
            new: new_lines[new_range.clone()].concat(),
            kind,
        });
    }
    hunks
}

/// Render a unified diff for display, `a/{path}` / `b/{path}` style.
pub fn unified_diff(original: &str, replacement: &str, path: &str) -> String {
    TextDiff::from_lines(original, replacement)
        .unified_diff()
        .context_radius(3)
        .header(&format!("a/{path}"), &format!("b/{path}"))
        .to_string()
}
