//! Upstream chat-completion service.
//!
//! - [`types`]: OpenAI-compatible request/response wire types
//! - [`openai`]: HTTP client for an OpenAI-compatible API
//! - [`mock`]: Scripted in-process client for tests and local runs

pub mod mock;
pub mod openai;
pub mod types;

use async_trait::async_trait;
use eventsource_stream::EventStreamError;
use futures::stream::BoxStream;
use thiserror::Error;

use crate::upstream::types::ChatCompletionRequest;

#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Upstream returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed upstream payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Upstream returned no choices")]
    EmptyResponse,

    #[error("Malformed event stream: {0}")]
    EventStream(String),

    #[error("Upstream stream interrupted: {0}")]
    Interrupted(String),
}

impl From<EventStreamError<reqwest::Error>> for UpstreamError {
    fn from(err: EventStreamError<reqwest::Error>) -> Self {
        match err {
            EventStreamError::Transport(e) => UpstreamError::Http(e),
            other => UpstreamError::EventStream(other.to_string()),
        }
    }
}

/// Ordered content fragments of one streamed completion.
///
/// An `Err` item ends the stream; nothing follows it.
pub type ChunkStream = BoxStream<'static, Result<String, UpstreamError>>;

/// A chat-completion backend.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Run a completion and return the whole message content.
    async fn complete(&self, request: ChatCompletionRequest) -> Result<String, UpstreamError>;

    /// Start a streamed completion.
    ///
    /// Resolves once the upstream accepted the request; content then arrives
    /// through the returned stream. Dropping the stream releases the
    /// underlying connection.
    async fn stream(&self, request: ChatCompletionRequest) -> Result<ChunkStream, UpstreamError>;
}
