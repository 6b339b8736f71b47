//! SSE (Server-Sent Events) relay for streamed completions.
//!
//! Drives one upstream chunk stream to exhaustion or cancellation and turns
//! it into the event protocol seen by clients:
//!
//! ```text
//! event: session        (once, first)
//! data: <session id>
//!
//! data: <fragment>      (zero or more, upstream order)
//!
//! event: done           (once, last)
//! data: complete | stopped
//! ```

use std::borrow::Cow;
use std::sync::Arc;

use async_stream::stream;
use axum::response::sse::Event;
use futures::stream::Stream;
use tokio_stream::StreamExt;
use tracing::{info, warn};

use crate::server::metrics::{RelayMetrics, UpstreamPhase};
use crate::session::{SessionGuard, SessionId};
use crate::upstream::ChunkStream;

/// How a relayed stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Upstream was exhausted (or broke off mid-stream).
    Complete,
    /// The session was cancelled.
    Stopped,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Complete => "complete",
            Outcome::Stopped => "stopped",
        }
    }
}

/// One event of the client-facing protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    Session(SessionId),
    Content(String),
    Done(Outcome),
}

impl RelayEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RelayEvent::Done(_))
    }

    pub fn into_sse(self) -> Event {
        match self {
            RelayEvent::Session(id) => Event::default().event("session").data(id.to_string()),
            RelayEvent::Content(text) => Event::default().data(normalize_line_breaks(&text)),
            RelayEvent::Done(outcome) => Event::default().event("done").data(outcome.as_str()),
        }
    }
}

/// Rewrite `\r\n` and lone `\r` as `\n`.
///
/// Clients split `data` on all three line terminators, so only `\n` may
/// reach [`Event::data`], which turns each line into its own `data:` field.
fn normalize_line_breaks(text: &str) -> Cow<'_, str> {
    if text.contains('\r') {
        Cow::Owned(text.replace("\r\n", "\n").replace('\r', "\n"))
    } else {
        Cow::Borrowed(text)
    }
}

/// Relay `chunks` for the session held by `session`.
///
/// The returned stream owns both the session guard and the upstream stream.
/// Both are released before the terminal event is yielded, or whenever the
/// stream is dropped early (client disconnect).
pub fn relay(
    session: SessionGuard,
    chunks: ChunkStream,
    metrics: Arc<RelayMetrics>,
) -> impl Stream<Item = RelayEvent> {
    stream! {
        let mut chunks = chunks;
        let session_id = session.id();
        let token = session.token().clone();

        yield RelayEvent::Session(session_id);

        let mut forwarded = 0usize;
        let outcome = loop {
            if token.is_cancelled() {
                break Outcome::Stopped;
            }

            let next = tokio::select! {
                biased;
                _ = token.cancelled() => break Outcome::Stopped,
                next = chunks.next() => next,
            };

            match next {
                Some(Ok(fragment)) => {
                    if !fragment.is_empty() {
                        forwarded += 1;
                        yield RelayEvent::Content(fragment);
                    }
                }
                Some(Err(e)) => {
                    warn!(session_id = %session_id, error = %e, "Upstream stream broke off");
                    metrics.upstream_error(UpstreamPhase::Stream);
                    break Outcome::Complete;
                }
                None => break Outcome::Complete,
            }
        };

        drop(chunks);
        drop(session);

        metrics.stream_finished(outcome);
        info!(
            session_id = %session_id,
            outcome = outcome.as_str(),
            fragments = forwarded,
            "Stream finished"
        );

        yield RelayEvent::Done(outcome);
    }
}

/// Convert relay events into axum SSE events.
pub fn relay_to_sse_stream(
    events: impl Stream<Item = RelayEvent>,
) -> impl Stream<Item = Result<Event, std::convert::Infallible>> {
    events.map(|event| Ok(event.into_sse()))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::session::SessionRegistry;
    use crate::upstream::UpstreamError;

    fn chunk_stream(items: Vec<Result<String, UpstreamError>>) -> ChunkStream {
        Box::pin(futures::stream::iter(items))
    }

    fn metrics() -> Arc<RelayMetrics> {
        Arc::new(RelayMetrics::new().unwrap())
    }

    #[test]
    fn test_normalize_line_breaks() {
        assert_eq!(normalize_line_breaks("plain"), "plain");
        assert!(matches!(normalize_line_breaks("a\nb"), Cow::Borrowed(_)));
        assert_eq!(normalize_line_breaks("a\r\nb"), "a\nb");
        assert_eq!(normalize_line_breaks("a\rb\r\n\rc"), "a\nb\n\nc");
    }

    #[tokio::test]
    async fn test_relay_event_order() {
        let registry = SessionRegistry::shared();
        let session = registry.open();
        let id = session.id();

        let chunks = chunk_stream(vec![Ok("Hel".into()), Ok(String::new()), Ok("lo".into())]);
        let events: Vec<_> = relay(session, chunks, metrics()).collect().await;

        assert_eq!(
            events,
            vec![
                RelayEvent::Session(id),
                RelayEvent::Content("Hel".into()),
                RelayEvent::Content("lo".into()),
                RelayEvent::Done(Outcome::Complete),
            ]
        );
        assert!(!registry.contains(&id));
    }

    #[tokio::test]
    async fn test_mid_stream_error_completes() {
        let registry = SessionRegistry::shared();
        let session = registry.open();

        let chunks = chunk_stream(vec![
            Ok("a".into()),
            Err(UpstreamError::Interrupted("reset".into())),
            Ok("never".into()),
        ]);
        let events: Vec<_> = relay(session, chunks, metrics()).collect().await;

        assert_eq!(events.len(), 3);
        assert_eq!(events[1], RelayEvent::Content("a".into()));
        assert_eq!(events[2], RelayEvent::Done(Outcome::Complete));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_while_waiting_for_upstream() {
        let registry = SessionRegistry::shared();
        let session = registry.open();
        let id = session.id();

        let chunks: ChunkStream = Box::pin(
            futures::stream::iter(vec![Ok("first".to_string())])
                .chain(futures::stream::pending::<Result<String, UpstreamError>>()),
        );
        let mut events = Box::pin(relay(session, chunks, metrics()));

        assert_eq!(events.next().await, Some(RelayEvent::Session(id)));
        assert_eq!(events.next().await, Some(RelayEvent::Content("first".into())));

        let canceller = {
            let registry = registry.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                registry.cancel(&id)
            })
        };

        assert_eq!(events.next().await, Some(RelayEvent::Done(Outcome::Stopped)));
        assert_eq!(events.next().await, None);
        assert!(canceller.await.unwrap());
        assert!(!registry.contains(&id));
        assert!(!registry.cancel(&id));
    }

    #[tokio::test]
    async fn test_cancel_before_first_chunk_skips_upstream() {
        let registry = SessionRegistry::shared();
        let session = registry.open();
        let id = session.id();

        let mut events = Box::pin(relay(
            session,
            chunk_stream(vec![Ok("unseen".into())]),
            metrics(),
        ));
        assert_eq!(events.next().await, Some(RelayEvent::Session(id)));

        assert!(registry.cancel(&id));
        let rest: Vec<_> = events.collect().await;
        assert_eq!(rest, vec![RelayEvent::Done(Outcome::Stopped)]);
    }

    #[tokio::test]
    async fn test_dropping_stream_releases_session() {
        let registry = SessionRegistry::shared();
        let session = registry.open();
        let id = session.id();

        let mut events = Box::pin(relay(
            session,
            Box::pin(futures::stream::pending::<Result<String, UpstreamError>>()),
            metrics(),
        ));
        assert_eq!(events.next().await, Some(RelayEvent::Session(id)));
        assert!(registry.contains(&id));

        drop(events);
        assert!(!registry.contains(&id));
    }

    #[test]
    fn test_terminal_detection() {
        assert!(RelayEvent::Done(Outcome::Stopped).is_terminal());
        assert!(!RelayEvent::Content("x".into()).is_terminal());
        assert!(!RelayEvent::Session(SessionId::new()).is_terminal());
    }
}
