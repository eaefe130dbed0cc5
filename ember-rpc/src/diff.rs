use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Add,
    Delete,
    Modify,
}

/// A single change hunk. Line numbers are 1-indexed against the original
/// file, matching editor gutters; `end_line` is inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffHunk {
    pub start_line: usize,
    pub end_line: usize,
    pub original: String,
    pub new: String,
    pub kind: ChangeKind,
}

/// A proposed whole-file replacement held in memory pending accept/reject.
///
/// `hunks` exist for display only; applying the diff always writes
/// `replacement` verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedDiff {
    pub path: PathBuf,
    pub replacement: String,
    #[serde(default)]
    pub hunks: Vec<DiffHunk>,
}

impl StagedDiff {
    pub fn new(path: impl Into<PathBuf>, replacement: impl Into<String>, hunks: Vec<DiffHunk>) -> Self {
        Self {
            path: path.into(),
            replacement: replacement.into(),
            hunks,
        }
    }
}

/// A visual line-range marker the host renders over a live buffer. Purely
/// decorative; never mutates buffer content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewMark {
    pub start_line: usize,
    pub end_line: usize,
    pub kind: ChangeKind,
}
