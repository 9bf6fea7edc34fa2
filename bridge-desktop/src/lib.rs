//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! Desktop has no service worker, so this crate provides the native stand-ins:
//! - `WorkerHost` / `WorkerHandle` using an in-process tokio task that owns the
//!   cache stores and answers the cache message protocol
//! - `NetworkMonitor` using a periodic TCP reachability probe
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{DesktopNetworkMonitor, InProcessWorkerHost};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let host = Arc::new(InProcessWorkerHost::start());
//!     let monitor = Arc::new(DesktopNetworkMonitor::new());
//!
//!     // Use in core configuration
//! }
//! ```

mod network;
mod worker;

pub use network::DesktopNetworkMonitor;
pub use worker::{classify, InProcessWorker, InProcessWorkerHost, Store};
