//! # Cache Coordination Error Types
//!
//! Nothing in this crate is fatal to the host application. Most errors are
//! absorbed by the coordinator facade and turned into a default value; see
//! [`CacheError::is_degradable`].

use bridge_traits::BridgeError;
use thiserror::Error;

use crate::protocol::CommandKind;

/// Errors that can occur while talking to the cache worker.
#[derive(Error, Debug)]
pub enum CacheError {
    /// The platform has no worker, discovery failed, or the worker hung up.
    #[error("Cache worker unavailable: {0}")]
    WorkerUnavailable(String),

    /// A correlated query got no reply before its deadline.
    #[error("{kind} timed out after {timeout_ms} ms")]
    TimedOut { kind: CommandKind, timeout_ms: u64 },

    /// A reply arrived but lacked the expected fields.
    #[error("Malformed reply: {0}")]
    MalformedReply(String),

    /// Cache statistics could not be obtained.
    #[error("Cache statistics unavailable: {0}")]
    StatsUnavailable(String),

    /// The worker reported that clearing did not succeed.
    #[error("Clearing cache failed: {0}")]
    ClearFailed(String),

    /// A preload batch is already running and the policy refuses overlap.
    #[error("A preload batch is already running")]
    Busy,

    /// Transport-level failure from the host bridge.
    #[error("Transport error: {0}")]
    Transport(#[from] BridgeError),

    /// A command could not be encoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CacheError {
    /// Returns `true` for errors the coordinator facade turns into a default
    /// (`None`, `false` or a logged no-op) instead of surfacing.
    pub fn is_degradable(&self) -> bool {
        matches!(
            self,
            CacheError::WorkerUnavailable(_)
                | CacheError::TimedOut { .. }
                | CacheError::MalformedReply(_)
                | CacheError::Transport(_)
        )
    }

    /// Returns `true` if the query ran out of time.
    pub fn is_timeout(&self) -> bool {
        matches!(self, CacheError::TimedOut { .. })
    }
}

/// Result type for cache coordination operations.
pub type Result<T> = std::result::Result<T, CacheError>;
