//! # Host Bridge Traits
//!
//! Platform abstraction traits that must be implemented by each host platform.
//!
//! ## Overview
//!
//! This crate defines the contract between the cache coordination core and
//! platform-specific implementations. Each trait represents a capability the
//! core requires but that must be implemented differently per platform
//! (browser service worker, desktop in-process worker).
//!
//! ## Traits
//!
//! ### Worker Messaging
//! - [`WorkerHost`](worker::WorkerHost) - Worker discovery, activation and lifecycle
//! - [`WorkerHandle`](worker::WorkerHandle) - Fire-and-forget message delivery
//! - [`ReplyPort`](worker::ReplyPort) - Call-scoped reply sub-channel
//!
//! ### Platform Integration
//! - [`NetworkMonitor`](network::NetworkMonitor) - Reachability signal
//!
//! ### Utilities
//! - [`LoggerSink`](logging::LoggerSink) - Forward structured logs to host logging
//!
//! ## Platform Requirements
//!
//! | Platform | Implementation Crate | Status |
//! |----------|---------------------|--------|
//! | Desktop  | `bridge-desktop`    | ✅ In Progress |
//! | Web      | TBD                 | 📋 Planned |
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type.
//! Platform implementations should convert platform-specific failures to
//! `BridgeError` with an actionable message.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so a single handle can be shared
//! across async tasks.

pub mod error;
pub mod logging;
pub mod network;
pub mod worker;

pub use error::BridgeError;

// Re-export commonly used types
pub use logging::{LogEntry, LogLevel, LoggerSink, StderrLogger};
pub use network::{NetworkMonitor, NetworkStatus};
pub use worker::{
    reply_channel, ReplyPort, ReplyReceiver, WorkerHandle, WorkerHost, WorkerLifecycle,
    WorkerMessage,
};
