//! # Cache Coordination Module
//!
//! Coordinates with the long-lived background worker that owns persistent
//! storage for audio, images, static assets and API responses.
//!
//! ## Overview
//!
//! This module handles:
//! - Discovering the worker once per process (`readiness`)
//! - Request/response over a fire-and-forget transport with deadlines (`correlator`)
//! - The application-facing cache facade (`coordinator`)
//! - Paced batch preloading with progress reporting (`preload`)
//!
//! ```text
//! caller ─> CacheCoordinator ─> Correlator ─> WorkerHandle ─> worker
//!                 ▲                  ▲                          │
//!          PreloadScheduler          └──────── reply port ◄─────┘
//! ```

pub mod category;
pub mod coordinator;
pub mod correlator;
pub mod error;
pub mod global;
pub mod preload;
pub mod protocol;
pub mod readiness;

pub use category::CacheCategory;
pub use coordinator::CacheCoordinator;
pub use correlator::{Correlator, PendingRequest};
pub use error::{CacheError, Result};
pub use preload::{
    stream_url_for, PreloadProgress, PreloadReport, PreloadScheduler, PreloadState, PreloadTask,
    Preloader,
};
pub use protocol::{CacheCommand, CacheStatsReport, CacheStatusReport, CommandKind};
pub use readiness::{GateState, Readiness, ReadinessGate};
