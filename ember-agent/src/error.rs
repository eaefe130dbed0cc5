//! Error taxonomy for the streaming client.
//!
//! Rate-limit signals are handled inside the client by key rotation and only
//! surface as [`ClientError::AllKeysExhausted`] once every configured key is
//! throttled. Everything else is terminal on first occurrence.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// Every configured credential is currently rate limited. User-actionable:
    /// wait for quota to recover and retry.
    #[error("all configured API keys are rate limited; wait and retry")]
    AllKeysExhausted,

    /// No non-blank credential is configured for the active provider.
    #[error("no API key configured for provider '{0}'")]
    NoCredentials(String),

    /// Connection, timeout, or protocol failure unrelated to rate limiting.
    /// Never retried via rotation.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-success HTTP status that is not a rate-limit signal.
    #[error("backend error {status}: {message}")]
    Api { status: u16, message: String },

    /// Terminal `error` event emitted inside an otherwise healthy stream.
    #[error("exchange failed: {0}")]
    Exchange(String),

    /// The response could not be interpreted as an exchange at all.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("payload encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

impl ClientError {
    /// True when the underlying failure was a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Transport(e) if e.is_timeout())
    }
}
