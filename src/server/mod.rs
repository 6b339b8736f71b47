//! HTTP server relaying prompts to the upstream completion service.
//!
//! - [`api`]: Router, shared state and route handlers
//! - [`streaming`]: SSE relay with session cancellation
//! - [`tasks`]: Endpoint catalogue and prompt recipes
//! - [`metrics`]: Prometheus counters

pub mod api;
pub mod metrics;
pub mod streaming;
pub mod tasks;
