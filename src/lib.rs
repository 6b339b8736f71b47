//! llm-relay: streaming LLM relay with out-of-band cancellation.
//!
//! Forwards user text to an OpenAI-compatible chat-completion service and
//! returns either the buffered JSON result or a live SSE token stream. Every
//! stream is registered as a session that a second request can stop.

pub mod config;
pub mod error;
pub mod server;
pub mod session;
pub mod upstream;
