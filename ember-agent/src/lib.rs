pub mod api;
pub mod config;
pub mod diff;
pub mod error;
pub mod keys;

// Re-export the client surface
pub use api::{
    AgentClient, AgentRequest, ChatRequest, EventReceiver, EventSender, Outcome, ResumeDecision,
    ResumeRequest, StopHandle, create_stream,
};

pub use config::{Config, ProviderConfig, mask_key};
pub use diff::{DiffService, MarkerSurface, compute_hunks, unified_diff};
pub use error::ClientError;
pub use keys::KeyRotation;
