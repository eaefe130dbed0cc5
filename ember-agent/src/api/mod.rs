//! HTTP/SSE client for the local assistant backend.
//!
//! Executes chat and agent exchanges, decodes the stream event vocabulary,
//! and transparently rotates API keys when the provider signals quota
//! exhaustion. Rotation never surfaces to the caller unless every key is
//! throttled; all other failures are terminal on first occurrence.

pub mod sse;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Client;
use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::{Notify, mpsc};

use ember_rpc::{InterruptRequest, StreamEvent};

use crate::config::{Config, TimeoutConfig, mask_key};
use crate::error::ClientError;
use crate::keys::KeyRotation;
use sse::SseDecoder;

/// Rotation retry ceiling per exchange, independent of key count.
pub const DEFAULT_MAX_ATTEMPTS: usize = 10;

const EVENT_CHANNEL_CAPACITY: usize = 100;

/// Events are delivered over a bounded channel, strictly in arrival order.
pub type EventSender = mpsc::Sender<StreamEvent>;
pub type EventReceiver = mpsc::Receiver<StreamEvent>;

pub fn create_stream() -> (EventSender, EventReceiver) {
    mpsc::channel(EVENT_CHANNEL_CAPACITY)
}

// ── Request payloads ─────────────────────────────────────────────

/// A chat exchange: one prompt, streamed content back.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    /// Optional file context from the editor.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            conversation_id: Some(uuid::Uuid::new_v4().to_string()),
            context: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }
}

/// An agent exchange: a task request plus opaque project context the backend
/// interprets; the client does not look inside it.
#[derive(Debug, Clone, Serialize)]
pub struct AgentRequest {
    pub request: String,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub project_context: Value,
}

impl AgentRequest {
    pub fn new(request: impl Into<String>) -> Self {
        Self {
            request: request.into(),
            project_context: Value::Null,
        }
    }

    pub fn with_project_context(mut self, context: Value) -> Self {
        self.project_context = context;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResumeDecision {
    Approve,
    Reject,
    Edit,
}

/// Continues an interrupted agent exchange with the operator's decision.
#[derive(Debug, Clone, Serialize)]
pub struct ResumeRequest {
    pub session_id: String,
    pub decision: ResumeDecision,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

// ── Outcomes and cancellation ────────────────────────────────────

/// Terminal state of a streaming exchange.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// The stream reached `complete` / `done`.
    Completed { session_id: Option<String> },
    /// The backend paused for a human decision; continue with
    /// [`AgentClient::resume`] using the same session id.
    Interrupted(InterruptRequest),
    /// Cancelled via [`StopHandle`]. No further events were delivered, the
    /// active key was not marked, and rotation did not advance.
    Stopped,
}

#[derive(Debug, Default)]
struct StopInner {
    notify: Notify,
    stopped: AtomicBool,
}

/// Cancels an in-flight exchange. Cloneable; stopping is sticky.
#[derive(Debug, Clone, Default)]
pub struct StopHandle {
    inner: Arc<StopInner>,
}

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.inner.stopped.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    async fn wait(&self) {
        // Register before checking the flag so a concurrent stop() cannot
        // slip between the check and the await.
        let notified = self.inner.notify.notified();
        if self.is_stopped() {
            return;
        }
        notified.await;
    }
}

// ── Client ───────────────────────────────────────────────────────

struct ExchangeSpec {
    path: &'static str,
    payload: Value,
    timeout: Duration,
}

enum AttemptError {
    /// The provider signaled throttling; rotate and retry.
    RateLimited(String),
    /// Terminal; propagate as-is.
    Fatal(ClientError),
}

/// Streaming client with credential rotation.
///
/// One instance per provider; clone the rotation handle into further clients
/// (one per open session) so a rate limit seen by any exchange steers key
/// choice for all of them.
pub struct AgentClient {
    http: Client,
    base_url: String,
    provider: String,
    model: String,
    rotation: Arc<KeyRotation>,
    timeouts: TimeoutConfig,
    rate_limit_markers: Vec<String>,
}

impl AgentClient {
    pub fn new(config: &Config) -> Self {
        let provider = config.provider_config();
        Self::with_rotation(config, Arc::new(KeyRotation::new(provider.api_keys.clone())))
    }

    /// Build a client sharing an existing rotation state.
    pub fn with_rotation(config: &Config, rotation: Arc<KeyRotation>) -> Self {
        let provider = config.provider_config();
        Self {
            http: Client::builder()
                .connect_timeout(config.timeouts.connect())
                .build()
                .unwrap_or_default(),
            base_url: config.backend_url.trim_end_matches('/').to_string(),
            provider: config.provider.clone(),
            model: provider.model.clone(),
            rotation,
            timeouts: config.timeouts,
            rate_limit_markers: provider.rate_limit_markers.clone(),
        }
    }

    /// Shared rotation state, for wiring further session clients.
    pub fn rotation(&self) -> Arc<KeyRotation> {
        Arc::clone(&self.rotation)
    }

    // ── Streaming exchanges ──────────────────────────────────────

    /// Run a chat exchange, delivering events over `events` until terminal.
    pub async fn chat(
        &self,
        request: &ChatRequest,
        events: EventSender,
        stop: Option<&StopHandle>,
    ) -> Result<Outcome, ClientError> {
        let spec = ExchangeSpec {
            path: "/api/chat/stream",
            payload: serde_json::to_value(request)?,
            timeout: self.timeouts.chat(),
        };
        self.execute(spec, events, stop, DEFAULT_MAX_ATTEMPTS).await
    }

    /// Run an agent exchange. May terminate in an interrupt, which the
    /// caller resolves later with [`Self::resume`].
    pub async fn agent(
        &self,
        request: &AgentRequest,
        events: EventSender,
        stop: Option<&StopHandle>,
    ) -> Result<Outcome, ClientError> {
        let spec = ExchangeSpec {
            path: "/api/agent/stream",
            payload: serde_json::to_value(request)?,
            timeout: self.timeouts.agent(),
        };
        self.execute(spec, events, stop, DEFAULT_MAX_ATTEMPTS).await
    }

    /// Continue an interrupted agent exchange. Same machinery, same rotation
    /// policy; may yield further interrupts.
    pub async fn resume(
        &self,
        request: &ResumeRequest,
        events: EventSender,
        stop: Option<&StopHandle>,
    ) -> Result<Outcome, ClientError> {
        let spec = ExchangeSpec {
            path: "/api/agent/resume",
            payload: serde_json::to_value(request)?,
            timeout: self.timeouts.agent(),
        };
        self.execute(spec, events, stop, DEFAULT_MAX_ATTEMPTS).await
    }

    // ── Plain request/response calls ─────────────────────────────

    /// Liveness probe.
    pub async fn health(&self) -> Result<Value, ClientError> {
        self.get("/health").await
    }

    /// Fetch the backend's configuration blob, verbatim.
    pub async fn fetch_config(&self) -> Result<Value, ClientError> {
        self.get("/api/config").await
    }

    /// Push a (partial) configuration blob to the backend, verbatim.
    pub async fn push_config(&self, blob: &Value) -> Result<Value, ClientError> {
        let response = self
            .http
            .post(format!("{}/api/config", self.base_url))
            .timeout(self.timeouts.request())
            .json(blob)
            .send()
            .await?;
        Self::into_json(response).await
    }

    async fn get(&self, path: &str) -> Result<Value, ClientError> {
        let response = self
            .http
            .get(format!("{}{}", self.base_url, path))
            .timeout(self.timeouts.request())
            .send()
            .await?;
        Self::into_json(response).await
    }

    async fn into_json(response: reqwest::Response) -> Result<Value, ClientError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Api {
                status: status.as_u16(),
                message: truncate(&body, 500),
            });
        }
        Ok(response.json().await?)
    }

    // ── Exchange machinery ───────────────────────────────────────

    /// Run one exchange to a terminal state, rotating keys on rate limits.
    async fn execute(
        &self,
        spec: ExchangeSpec,
        events: EventSender,
        stop: Option<&StopHandle>,
        max_attempts: usize,
    ) -> Result<Outcome, ClientError> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let Some((index, key)) = self.rotation.current() else {
                return Err(ClientError::NoCredentials(self.provider.clone()));
            };

            // Exactly one credential per request; the backend never sees the
            // full list. Rotation happens here, not remotely.
            let mut payload = spec.payload.clone();
            payload["credential"] = json!({
                "provider": &self.provider,
                "api_key": &key,
                "model": &self.model,
            });

            match self.attempt(&spec, &payload, &events, stop).await {
                Ok(outcome) => {
                    // A stop is neither success nor failure; leave the
                    // rotation state for the next exchange to judge.
                    if !matches!(outcome, Outcome::Stopped) {
                        self.rotation.reset();
                    }
                    return Ok(outcome);
                }
                Err(AttemptError::RateLimited(message)) => {
                    tracing::warn!(
                        key = %mask_key(&key),
                        attempt = attempts,
                        "rate limited: {}",
                        truncate(&message, 200)
                    );
                    self.rotation.mark_rate_limited(index);
                    if attempts >= max_attempts || self.rotation.advance().is_none() {
                        return Err(ClientError::AllKeysExhausted);
                    }
                }
                Err(AttemptError::Fatal(err)) => return Err(err),
            }
        }
    }

    /// One attempt: send the request and pump the stream until terminal.
    async fn attempt(
        &self,
        spec: &ExchangeSpec,
        payload: &Value,
        events: &EventSender,
        stop: Option<&StopHandle>,
    ) -> Result<Outcome, AttemptError> {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, spec.path))
            .timeout(spec.timeout)
            .json(payload)
            .send()
            .await
            .map_err(|e| AttemptError::Fatal(ClientError::Transport(e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if status.as_u16() == 429 || sse::is_rate_limit_message(&body, &self.rate_limit_markers) {
                return Err(AttemptError::RateLimited(body));
            }
            return Err(AttemptError::Fatal(ClientError::Api {
                status: status.as_u16(),
                message: truncate(&body, 500),
            }));
        }

        let mut stream = response.bytes_stream();
        let mut decoder = SseDecoder::default();

        loop {
            let chunk = match stop {
                Some(stop) => tokio::select! {
                    _ = stop.wait() => {
                        tracing::debug!("exchange stopped by caller");
                        return Ok(Outcome::Stopped);
                    }
                    chunk = stream.next() => chunk,
                },
                None => stream.next().await,
            };
            let Some(chunk) = chunk else { break };
            let chunk = chunk.map_err(|e| AttemptError::Fatal(ClientError::Transport(e)))?;

            for frame in decoder.feed(&chunk) {
                if let Some(outcome) = self.dispatch(&frame, events, stop).await? {
                    return Ok(outcome);
                }
            }
        }

        if let Some(frame) = decoder.finish() {
            if let Some(outcome) = self.dispatch(&frame, events, stop).await? {
                return Ok(outcome);
            }
        }

        Err(AttemptError::Fatal(ClientError::InvalidResponse(
            "stream ended without a terminal event".to_string(),
        )))
    }

    /// Deliver one decoded frame; returns the outcome when it is terminal.
    async fn dispatch(
        &self,
        frame: &sse::SseFrame,
        events: &EventSender,
        stop: Option<&StopHandle>,
    ) -> Result<Option<Outcome>, AttemptError> {
        if stop.is_some_and(StopHandle::is_stopped) {
            return Ok(Some(Outcome::Stopped));
        }
        let Some(event) = sse::decode_frame(frame, &self.rate_limit_markers) else {
            return Ok(None);
        };
        match event {
            StreamEvent::Completed { session_id } => {
                let _ = events
                    .send(StreamEvent::Completed { session_id: session_id.clone() })
                    .await;
                Ok(Some(Outcome::Completed { session_id }))
            }
            StreamEvent::Interrupt(request) => {
                let _ = events.send(StreamEvent::Interrupt(request.clone())).await;
                Ok(Some(Outcome::Interrupted(request)))
            }
            // Throttling is rotation's problem; consumers never see it.
            StreamEvent::Error { message, rate_limited: true } => {
                Err(AttemptError::RateLimited(message))
            }
            StreamEvent::Error { message, rate_limited: false } => {
                let _ = events
                    .send(StreamEvent::Error { message: message.clone(), rate_limited: false })
                    .await;
                Err(AttemptError::Fatal(ClientError::Exchange(message)))
            }
            other => {
                let _ = events.send(other).await;
                Ok(None)
            }
        }
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut cut = max;
    while !text.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...", &text[..cut])
}
