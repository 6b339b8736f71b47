//! Scripted completion client.
//!
//! Replays a fixed list of fragments instead of calling a real service.
//! Used by the integration tests and by `--mock-upstream` for running the
//! relay without network access.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_stream::stream;
use async_trait::async_trait;
use tracing::debug;

use crate::upstream::types::ChatCompletionRequest;
use crate::upstream::{ChunkStream, CompletionClient, UpstreamError};

#[derive(Debug, Default)]
pub struct ScriptedClient {
    fragments: Vec<String>,
    delay: Option<Duration>,
    fail_setup: bool,
    fail_after: Option<usize>,
    hold_open: bool,
    calls: AtomicUsize,
    last_request: Mutex<Option<ChatCompletionRequest>>,
}

impl ScriptedClient {
    pub fn new<I, S>(fragments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fragments: fragments.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Sleep before each fragment.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Reject every call before any content is produced.
    pub fn failing(mut self) -> Self {
        self.fail_setup = true;
        self
    }

    /// Break the stream after `n` fragments have been delivered.
    pub fn interrupted_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    /// Never end the stream after the scripted fragments.
    pub fn held_open(mut self) -> Self {
        self.hold_open = true;
        self
    }

    /// Number of upstream calls made so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<ChatCompletionRequest> {
        self.last_request
            .lock()
            .map(|req| req.clone())
            .unwrap_or_default()
    }

    fn record(&self, request: ChatCompletionRequest) -> Result<(), UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_request.lock() {
            *last = Some(request);
        }
        if self.fail_setup {
            return Err(UpstreamError::Status {
                status: 503,
                body: "scripted failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    async fn complete(&self, request: ChatCompletionRequest) -> Result<String, UpstreamError> {
        self.record(request)?;
        Ok(self.fragments.concat())
    }

    async fn stream(&self, request: ChatCompletionRequest) -> Result<ChunkStream, UpstreamError> {
        self.record(request)?;
        debug!(fragments = self.fragments.len(), "Scripted stream");

        let fragments = self.fragments.clone();
        let delay = self.delay;
        let fail_after = self.fail_after;
        let hold_open = self.hold_open;

        let out = stream! {
            for (i, fragment) in fragments.into_iter().enumerate() {
                if fail_after == Some(i) {
                    yield Err(UpstreamError::Interrupted("scripted interruption".to_string()));
                    return;
                }
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                yield Ok(fragment);
            }
            if hold_open {
                std::future::pending::<()>().await;
            }
        };

        Ok(Box::pin(out))
    }
}
