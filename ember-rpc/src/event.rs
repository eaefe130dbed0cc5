use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TodoStatus {
    Pending,
    InProgress,
    Completed,
}

/// One entry in the agent's working todo list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TodoItem {
    pub text: String,
    pub status: TodoStatus,
}

/// A fenced code block the backend extracted from a chat response, offered
/// as a proposed change. `file_hint` is the suggested target path, when the
/// backend could infer one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeBlock {
    pub language: String,
    pub code: String,
    #[serde(default)]
    pub file_hint: Option<String>,
}

/// A human-in-the-loop pause point: the remote agent wants the operator to
/// approve, edit, or reject an action before it continues. The exchange that
/// produced it is over; a later resume call picks the session back up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterruptRequest {
    pub session_id: String,
    pub action: String,
    #[serde(default)]
    pub args: Value,
    #[serde(default)]
    pub description: String,
}

/// One decoded event from a streaming exchange.
///
/// Events are delivered strictly in arrival order for a given exchange. The
/// sequence ends on `Completed`, on `Error`, or on `Interrupt`.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Incremental response text.
    Content { text: String },
    /// A proposed code change extracted from the response; feeds the diff
    /// staging flow.
    CodeBlock(CodeBlock),
    /// Progress / debug line from the backend.
    Status { message: String },
    /// The agent invoked a tool on the backend side.
    ToolCall { name: String, args: Value },
    /// Full replacement of the agent's todo list.
    TodoUpdate(Vec<TodoItem>),
    /// The exchange paused for a human decision.
    Interrupt(InterruptRequest),
    /// The exchange finished. Chat streams may complete without a session id.
    Completed { session_id: Option<String> },
    /// Terminal error. `rate_limited` errors are handled by key rotation and
    /// never reach event consumers.
    Error { message: String, rate_limited: bool },
}
