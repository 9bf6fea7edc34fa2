//! Background Worker Messaging
//!
//! Raw duplex messaging between the application and the long-lived background
//! worker that owns persistent cache storage.
//!
//! The transport has no call/return semantics: a message is handed to the
//! worker and the call returns. A caller that wants an answer attaches a
//! [`ReplyPort`], a private sub-channel the worker answers on directly instead
//! of broadcasting. Matching answers to calls is the caller's job.
//!
//! # Platform Support
//!
//! - **Web**: Service worker registration, `postMessage` + `MessageChannel`
//! - **Desktop**: In-process worker task (`bridge-desktop`)
//!
//! # Example
//!
//! ```ignore
//! use bridge_traits::worker::{reply_channel, WorkerHost};
//! use serde_json::json;
//!
//! async fn ask_status(host: &dyn WorkerHost) -> Option<serde_json::Value> {
//!     let worker = host.wait_until_active().await.ok()?;
//!     let (port, mut replies) = reply_channel();
//!     worker.post_message(json!({ "type": "GET_CACHE_STATUS" }), Some(port)).ok()?;
//!     replies.recv().await
//! }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};

use crate::error::{BridgeError, Result};

/// Structured message payload exchanged with the worker.
pub type WorkerMessage = serde_json::Value;

/// Creates a fresh reply sub-channel.
///
/// The [`ReplyPort`] travels with an outgoing message to the worker; the
/// [`ReplyReceiver`] stays with the caller. Dropping the receiver closes the
/// channel, after which [`ReplyPort::post`] fails.
pub fn reply_channel() -> (ReplyPort, ReplyReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ReplyPort { tx }, ReplyReceiver { rx })
}

/// Worker-side end of a reply sub-channel.
#[derive(Debug, Clone)]
pub struct ReplyPort {
    tx: mpsc::UnboundedSender<WorkerMessage>,
}

impl ReplyPort {
    /// Send a reply to whoever holds the matching receiver.
    pub fn post(&self, message: WorkerMessage) -> Result<()> {
        self.tx.send(message).map_err(|_| BridgeError::ChannelClosed)
    }

    /// Returns `true` once the caller stopped listening.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Caller-side end of a reply sub-channel.
#[derive(Debug)]
pub struct ReplyReceiver {
    rx: mpsc::UnboundedReceiver<WorkerMessage>,
}

impl ReplyReceiver {
    /// Wait for the next reply.
    ///
    /// Returns `None` when every [`ReplyPort`] clone has been dropped without
    /// sending anything further.
    pub async fn recv(&mut self) -> Option<WorkerMessage> {
        self.rx.recv().await
    }

    /// Stop accepting replies. Pending and future posts fail.
    pub fn close(&mut self) {
        self.rx.close();
    }
}

/// Lifecycle notifications published by the host environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerLifecycle {
    /// A worker finished activation.
    Activated { worker_id: String },
    /// A different worker took control of this session.
    ControllerChanged { worker_id: Option<String> },
    /// A new worker version was installed and is waiting to take over.
    UpdateAvailable { version: Option<String> },
}

/// A live worker that accepts messages.
pub trait WorkerHandle: Send + Sync {
    /// Stable identifier for logging.
    fn id(&self) -> &str;

    /// Hand a message to the worker, optionally with a reply port.
    ///
    /// Returns once the message is queued; it says nothing about whether the
    /// worker acted on it.
    fn post_message(&self, message: WorkerMessage, reply_port: Option<ReplyPort>) -> Result<()>;
}

/// Host environment's view of worker registration.
///
/// # Platform Notes
///
/// - Web: `navigator.serviceWorker` (`ready`, `controller`, `updatefound`)
/// - Desktop: `bridge_desktop::InProcessWorkerHost`
#[async_trait]
pub trait WorkerHost: Send + Sync {
    /// Whether the platform can run a background worker at all.
    fn is_supported(&self) -> bool;

    /// Resolves once a worker is fully activated.
    ///
    /// May never resolve when no worker is ever installed; callers are
    /// expected to bound the wait.
    async fn wait_until_active(&self) -> Result<Arc<dyn WorkerHandle>>;

    /// Worker currently controlling this session, if any.
    fn controller(&self) -> Option<Arc<dyn WorkerHandle>>;

    /// Subscribe to lifecycle notifications. `None` when the host has none.
    fn subscribe_lifecycle(&self) -> Option<broadcast::Receiver<WorkerLifecycle>> {
        None
    }
}
