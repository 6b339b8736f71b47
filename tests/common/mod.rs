#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request};
use axum::response::Response;
use axum::Router;
use eventsource_stream::{Event, EventStreamError, Eventsource};
use futures::stream::BoxStream;
use futures::StreamExt;
use tower::ServiceExt;

use llm_relay::config::Config;
use llm_relay::server::api::{build_router, AppState};
use llm_relay::upstream::CompletionClient;

pub const FRAME_TIMEOUT: Duration = Duration::from_secs(5);

pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
}

impl TestApp {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self::with_config(client, Config::default())
    }

    pub fn with_config(client: Arc<dyn CompletionClient>, config: Config) -> Self {
        let state = Arc::new(AppState::new(client, Arc::new(config)).unwrap());
        Self {
            router: build_router(state.clone()),
            state,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router.clone().oneshot(request).await.unwrap()
    }

    pub async fn post(&self, path: &str, body: impl Into<Body>) -> Response {
        self.send(
            Request::builder()
                .method(Method::POST)
                .uri(path)
                .header("content-type", "text/plain")
                .body(body.into())
                .unwrap(),
        )
        .await
    }

    pub async fn get(&self, uri: &str) -> Response {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn stop(&self, session_id: &str) -> (u16, String) {
        let response = self.get(&format!("/stop?sessionID={session_id}")).await;
        let status = response.status().as_u16();
        (status, body_text(response).await)
    }
}

pub async fn body_text(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Reads SSE events off a response body as they arrive.
pub struct EventReader {
    events: BoxStream<'static, Result<Event, EventStreamError<axum::Error>>>,
}

impl EventReader {
    pub fn new(response: Response) -> Self {
        Self {
            events: response.into_body().into_data_stream().eventsource().boxed(),
        }
    }

    pub async fn next_frame(&mut self) -> Option<Event> {
        let next = tokio::time::timeout(FRAME_TIMEOUT, self.events.next())
            .await
            .expect("timed out waiting for an SSE event");
        next.map(|event| event.expect("malformed SSE body"))
    }

    pub async fn rest(mut self) -> Vec<Event> {
        let mut frames = Vec::new();
        while let Some(frame) = self.next_frame().await {
            frames.push(frame);
        }
        frames
    }
}

/// Assert the session / content* / done shape and return (session id, fragments, outcome).
pub fn split_protocol(frames: &[Event]) -> (String, Vec<String>, String) {
    assert!(frames.len() >= 2, "expected at least session and done, got {frames:?}");

    let first = &frames[0];
    assert_eq!(first.event, "session");

    let last = &frames[frames.len() - 1];
    assert_eq!(last.event, "done");

    let middle = &frames[1..frames.len() - 1];
    for frame in middle {
        assert_eq!(frame.event, "message", "unexpected named event {frame:?}");
        assert!(!frame.data.is_empty());
    }

    (
        first.data.clone(),
        middle.iter().map(|f| f.data.clone()).collect(),
        last.data.clone(),
    )
}
