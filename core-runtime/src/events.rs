//! # Event Bus System
//!
//! Provides an event-driven channel for the cache coordination core using
//! `tokio::sync::broadcast`. Hosts subscribe to follow worker lifecycle, query
//! outcomes and batch preload progress without polling.
//!
//! ## Overview
//!
//! The event bus system consists of:
//! - **Event Types**: Strongly-typed enum hierarchies per domain
//! - **EventBus**: Central broadcast channel for publishing events
//! - **EventStream**: Wrapper for consuming events with filtering
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────┐   emit    ┌───────────┐
//! │ Readiness Gate ├──────────>│           │
//! └────────────────┘           │           │   subscribe   ┌────────────┐
//! ┌────────────────┐   emit    │ EventBus  ├──────────────>│ Subscriber │
//! │  Coordinator   ├──────────>│ (broadcast│               └────────────┘
//! └────────────────┘           │  channel) │
//! ┌────────────────┐   emit    │           │   subscribe   ┌────────────┐
//! │Preload Scheduler├─────────>│           ├──────────────>│ Subscriber │
//! └────────────────┘           └───────────┘               └────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, WorkerEvent};
//!
//! let event_bus = EventBus::new(100);
//! let mut subscriber = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::Worker(WorkerEvent::Ready {
//!         worker_id: "in-process-1".to_string(),
//!     }))
//!     .ok();
//!
//! assert!(subscriber.try_recv().is_ok());
//! ```
//!
//! ## Error Handling
//!
//! - **`RecvError::Lagged(n)`**: Subscriber was too slow and missed `n` events.
//!   Non-fatal; the subscriber keeps receiving new events.
//! - **`RecvError::Closed`**: All senders have been dropped. Treat as shutdown.
//!
//! Emitting with no subscribers returns an error; producers ignore it with
//! `.ok()`.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for the event bus channel.
///
/// Subscribers that can't keep up will receive `RecvError::Lagged`.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    /// Background worker lifecycle
    Worker(WorkerEvent),
    /// Cache command and query outcomes
    Cache(CacheEvent),
    /// Batch preload progress
    Preload(PreloadEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Worker(e) => e.description(),
            CoreEvent::Cache(e) => e.description(),
            CoreEvent::Preload(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Worker(WorkerEvent::Unavailable { .. }) => EventSeverity::Warning,
            CoreEvent::Cache(CacheEvent::QueryTimedOut { .. }) => EventSeverity::Warning,
            CoreEvent::Preload(PreloadEvent::ItemFailed { .. }) => EventSeverity::Warning,
            CoreEvent::Worker(WorkerEvent::Ready { .. }) => EventSeverity::Info,
            CoreEvent::Worker(WorkerEvent::UpdateAvailable { .. }) => EventSeverity::Info,
            CoreEvent::Cache(CacheEvent::Cleared { .. }) => EventSeverity::Info,
            CoreEvent::Preload(PreloadEvent::Completed { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    /// Debug-level events (verbose)
    Debug,
    /// Informational events
    Info,
    /// Warning events
    Warning,
    /// Error events
    Error,
}

// ============================================================================
// Worker Events
// ============================================================================

/// Events related to background worker discovery.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum WorkerEvent {
    /// Discovery finished with an active worker.
    Ready { worker_id: String },
    /// Discovery concluded that no worker will be available.
    Unavailable { reason: String },
    /// The host installed a newer worker version that is waiting to activate.
    UpdateAvailable { version: Option<String> },
}

impl WorkerEvent {
    fn description(&self) -> &str {
        match self {
            WorkerEvent::Ready { .. } => "Cache worker ready",
            WorkerEvent::Unavailable { .. } => "Cache worker unavailable",
            WorkerEvent::UpdateAvailable { .. } => "Cache worker update available",
        }
    }
}

// ============================================================================
// Cache Events
// ============================================================================

/// Events related to commands sent to the worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum CacheEvent {
    /// A command was handed to the worker.
    CommandDispatched {
        /// Wire tag of the command (e.g. `CACHE_AUDIO`)
        kind: String,
    },
    /// A correlated query was abandoned at its deadline.
    QueryTimedOut { kind: String, timeout_ms: u64 },
    /// A clear command was sent. `None` means every category.
    Cleared { category: Option<String> },
}

impl CacheEvent {
    fn description(&self) -> &str {
        match self {
            CacheEvent::CommandDispatched { .. } => "Cache command dispatched",
            CacheEvent::QueryTimedOut { .. } => "Cache query timed out",
            CacheEvent::Cleared { .. } => "Cache cleared",
        }
    }
}

// ============================================================================
// Preload Events
// ============================================================================

/// Events related to batch preloading.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum PreloadEvent {
    /// A batch started.
    Started { batch_id: String, total: usize },
    /// An item finished (successfully or not).
    Progress {
        batch_id: String,
        completed: usize,
        total: usize,
    },
    /// An item failed; the batch continues.
    ItemFailed {
        batch_id: String,
        item_id: String,
        message: String,
    },
    /// Every item of the batch was attempted.
    Completed {
        batch_id: String,
        succeeded: usize,
        failed: usize,
        total: usize,
    },
}

impl PreloadEvent {
    fn description(&self) -> &str {
        match self {
            PreloadEvent::Started { .. } => "Preload batch started",
            PreloadEvent::Progress { .. } => "Preload progress",
            PreloadEvent::ItemFailed { .. } => "Preload item failed",
            PreloadEvent::Completed { .. } => "Preload batch completed",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central event bus for publishing and subscribing to core events.
///
/// Cloning the bus shares the underlying channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum number of events to buffer per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an
    /// error if there are no active subscribers.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A wrapper around `broadcast::Receiver` with filtering.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream};
///
/// let event_bus = EventBus::default();
/// let preload_only = EventStream::new(event_bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Preload(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    /// Creates a new event stream from a receiver.
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` are returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn matches(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter.
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged(n)` if the subscriber fell behind by `n` events.
    /// Returns `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.matches(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive a matching event without blocking.
    ///
    /// Returns `None` if no matching events are currently available.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.matches(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(completed: usize) -> CoreEvent {
        CoreEvent::Preload(PreloadEvent::Progress {
            batch_id: "batch-1".to_string(),
            completed,
            total: 5,
        })
    }

    #[tokio::test]
    async fn test_event_emission_no_subscribers() {
        let event_bus = EventBus::new(10);
        assert!(event_bus.emit(progress(1)).is_err());
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let event_bus = EventBus::new(10);
        let mut first = event_bus.subscribe();
        let mut second = event_bus.subscribe();
        assert_eq!(event_bus.subscriber_count(), 2);

        let event = CoreEvent::Cache(CacheEvent::Cleared {
            category: Some("audio".to_string()),
        });
        assert_eq!(event_bus.emit(event.clone()).unwrap(), 2);

        assert_eq!(first.recv().await.unwrap(), event);
        assert_eq!(second.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_event_stream_with_filter() {
        let event_bus = EventBus::new(10);
        let mut stream = EventStream::new(event_bus.subscribe())
            .filter(|event| matches!(event, CoreEvent::Preload(_)));

        event_bus
            .emit(CoreEvent::Worker(WorkerEvent::Ready {
                worker_id: "w1".to_string(),
            }))
            .unwrap();
        event_bus.emit(progress(2)).unwrap();

        assert_eq!(stream.recv().await.unwrap(), progress(2));
        assert!(stream.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_lagged_subscriber() {
        let event_bus = EventBus::new(2);
        let mut subscriber = event_bus.subscribe();

        for completed in 0..5 {
            event_bus.emit(progress(completed)).unwrap();
        }

        assert!(matches!(subscriber.recv().await, Err(RecvError::Lagged(_))));
        assert!(subscriber.recv().await.is_ok());
    }

    #[test]
    fn test_event_severity() {
        let timed_out = CoreEvent::Cache(CacheEvent::QueryTimedOut {
            kind: "GET_CACHE_STATUS".to_string(),
            timeout_ms: 5000,
        });
        assert_eq!(timed_out.severity(), EventSeverity::Warning);

        let completed = CoreEvent::Preload(PreloadEvent::Completed {
            batch_id: "b".to_string(),
            succeeded: 4,
            failed: 1,
            total: 5,
        });
        assert_eq!(completed.severity(), EventSeverity::Info);
        assert_eq!(progress(1).severity(), EventSeverity::Debug);
    }

    #[test]
    fn test_event_description_and_serialization() {
        let event = CoreEvent::Worker(WorkerEvent::UpdateAvailable {
            version: Some("2".to_string()),
        });
        assert_eq!(event.description(), "Cache worker update available");

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "Worker");
        assert_eq!(json["payload"]["event"], "UpdateAvailable");

        let back: CoreEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }
}
