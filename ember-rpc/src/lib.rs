pub mod diff;
pub mod event;

pub use diff::{ChangeKind, DiffHunk, PreviewMark, StagedDiff};
pub use event::{CodeBlock, InterruptRequest, StreamEvent, TodoItem, TodoStatus};
