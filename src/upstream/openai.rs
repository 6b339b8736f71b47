//! HTTP client for an OpenAI-compatible `/chat/completions` endpoint.

use async_stream::stream;
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use tracing::{debug, trace};

use crate::config::UpstreamConfig;
use crate::upstream::types::{ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse};
use crate::upstream::{ChunkStream, CompletionClient, UpstreamError};

/// Sentinel `data` payload closing an OpenAI stream.
const DONE_SENTINEL: &str = "[DONE]";

#[derive(Clone, Debug)]
pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    request_timeout: std::time::Duration,
}

impl OpenAiClient {
    pub fn new(config: &UpstreamConfig, api_key: Option<String>) -> Result<Self, UpstreamError> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            request_timeout: config.request_timeout(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn post(&self, body: &ChatCompletionRequest) -> reqwest::RequestBuilder {
        let builder = self.http.post(self.endpoint()).json(body);
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    /// Map non-2xx responses to [`UpstreamError::Status`].
    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, UpstreamError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(UpstreamError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

/// What one upstream event means to the chunk stream.
#[derive(Debug, PartialEq, Eq)]
enum Decoded {
    Fragment(String),
    /// Role announcement, finish marker or usage report.
    NoContent,
    Done,
}

fn decode_event(data: &str) -> Result<Decoded, UpstreamError> {
    if data.trim() == DONE_SENTINEL {
        return Ok(Decoded::Done);
    }
    let chunk: ChatCompletionChunk = serde_json::from_str(data)?;
    Ok(chunk.into_content().map_or(Decoded::NoContent, Decoded::Fragment))
}

#[async_trait]
impl CompletionClient for OpenAiClient {
    async fn complete(&self, request: ChatCompletionRequest) -> Result<String, UpstreamError> {
        let body = request.streaming(false);
        debug!(model = %body.model, messages = body.messages.len(), "Buffered completion");

        let response = self.post(&body).timeout(self.request_timeout).send().await?;
        let response = Self::check_status(response).await?;
        let parsed: ChatCompletionResponse = serde_json::from_slice(&response.bytes().await?)?;

        parsed.into_content().ok_or(UpstreamError::EmptyResponse)
    }

    async fn stream(&self, request: ChatCompletionRequest) -> Result<ChunkStream, UpstreamError> {
        let body = request.streaming(true);
        debug!(model = %body.model, messages = body.messages.len(), "Streaming completion");

        let response = self.post(&body).send().await?;
        let response = Self::check_status(response).await?;
        let mut events = Box::pin(response.bytes_stream().eventsource());

        let out = stream! {
            while let Some(event) = events.next().await {
                let event = match event {
                    Ok(event) => event,
                    Err(e) => {
                        yield Err(UpstreamError::from(e));
                        return;
                    }
                };
                match decode_event(&event.data) {
                    Ok(Decoded::Fragment(content)) => {
                        trace!(fragment = %content, "Upstream fragment");
                        yield Ok(content);
                    }
                    Ok(Decoded::NoContent) => {}
                    Ok(Decoded::Done) => return,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                }
            }
        };

        Ok(Box::pin(out))
    }
}
