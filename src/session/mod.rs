//! Cancellable streaming sessions.
//!
//! - [`registry`]: SessionRegistry and the RAII SessionGuard owned by each relay
//!
//! A session lives exactly as long as one streaming response. Its identifier
//! is the only handle a client gets for cancelling the stream out of band.

pub mod registry;

use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

pub use registry::{SessionGuard, SessionRegistry, SharedRegistry};

/// Opaque identifier of one streaming session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Generate a fresh random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}
