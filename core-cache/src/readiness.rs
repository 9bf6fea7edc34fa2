//! # Worker Readiness Gate
//!
//! Resolves, once per process, whether a cache worker is available and hands
//! out its handle.
//!
//! The first call to [`ReadinessGate::ready`] starts discovery on a background
//! task. Every caller, including those arriving while discovery is still in
//! flight, awaits that same attempt. A caller that stops waiting (its query
//! deadline passed) leaves discovery running. Once discovery concludes, the
//! result is never re-evaluated.

use std::fmt;
use std::sync::{Arc, OnceLock};

use bridge_traits::{WorkerHandle, WorkerHost, WorkerLifecycle};
use core_runtime::events::{CoreEvent, EventBus, WorkerEvent};
use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Conclusive outcome of worker discovery.
#[derive(Clone)]
pub enum Readiness {
    Ready(Arc<dyn WorkerHandle>),
    Unavailable(String),
}

impl fmt::Debug for Readiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Readiness::Ready(handle) => f.debug_tuple("Ready").field(&handle.id()).finish(),
            Readiness::Unavailable(reason) => f.debug_tuple("Unavailable").field(reason).finish(),
        }
    }
}

/// Non-blocking view of the gate.
#[derive(Debug, Clone)]
pub enum GateState {
    /// Discovery not started or still running.
    Pending,
    /// Discovery concluded.
    Resolved(Readiness),
}

type Discovery = Shared<BoxFuture<'static, Readiness>>;

/// Lazily discovers the cache worker and memoizes the result.
pub struct ReadinessGate {
    host: Arc<dyn WorkerHost>,
    event_bus: Option<Arc<EventBus>>,
    discovery: OnceLock<Discovery>,
}

impl ReadinessGate {
    pub fn new(host: Arc<dyn WorkerHost>) -> Self {
        Self {
            host,
            event_bus: None,
            discovery: OnceLock::new(),
        }
    }

    /// Set event bus for lifecycle events.
    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Wait for discovery and return the active worker, if any.
    ///
    /// Must be called from within a tokio runtime; the first call spawns the
    /// discovery task.
    pub async fn ready(&self) -> Option<Arc<dyn WorkerHandle>> {
        match self.resolve().await {
            Readiness::Ready(handle) => Some(handle),
            Readiness::Unavailable(_) => None,
        }
    }

    /// Wait for discovery and return its full outcome.
    pub async fn resolve(&self) -> Readiness {
        self.discovery().await
    }

    /// Current state without waiting.
    pub fn state(&self) -> GateState {
        match self.discovery.get().and_then(|shared| shared.peek()) {
            Some(readiness) => GateState::Resolved(readiness.clone()),
            None => GateState::Pending,
        }
    }

    /// `true` once discovery concluded with an active worker.
    pub fn is_ready(&self) -> bool {
        matches!(self.state(), GateState::Resolved(Readiness::Ready(_)))
    }

    /// Worker currently controlling this session, straight from the host.
    pub fn controller(&self) -> Option<Arc<dyn WorkerHandle>> {
        self.host.controller()
    }

    /// Forward host lifecycle notifications to the log and event bus.
    ///
    /// Returns `None` when the host publishes no lifecycle stream. The gate
    /// does not act on notifications; in particular an available update does
    /// not reset discovery.
    pub fn watch_lifecycle(&self) -> Option<JoinHandle<()>> {
        let mut lifecycle = self.host.subscribe_lifecycle()?;
        let event_bus = self.event_bus.clone();

        Some(tokio::spawn(async move {
            loop {
                match lifecycle.recv().await {
                    Ok(WorkerLifecycle::UpdateAvailable { version }) => {
                        info!(version = ?version, "New cache worker version available");
                        if let Some(bus) = &event_bus {
                            bus.emit(CoreEvent::Worker(WorkerEvent::UpdateAvailable { version }))
                                .ok();
                        }
                    }
                    Ok(WorkerLifecycle::ControllerChanged { worker_id }) => {
                        debug!(worker_id = ?worker_id, "Cache worker controller changed");
                    }
                    Ok(WorkerLifecycle::Activated { worker_id }) => {
                        debug!(worker_id = %worker_id, "Cache worker activated");
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Missed worker lifecycle notifications");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }))
    }

    fn discovery(&self) -> Discovery {
        self.discovery
            .get_or_init(|| {
                let host = Arc::clone(&self.host);
                let event_bus = self.event_bus.clone();
                let task = tokio::spawn(discover(host, event_bus));

                async move {
                    task.await.unwrap_or_else(|e| {
                        Readiness::Unavailable(format!("discovery task failed: {}", e))
                    })
                }
                .boxed()
                .shared()
            })
            .clone()
    }
}

impl fmt::Debug for ReadinessGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadinessGate")
            .field("state", &self.state())
            .finish()
    }
}

async fn discover(host: Arc<dyn WorkerHost>, event_bus: Option<Arc<EventBus>>) -> Readiness {
    let readiness = if !host.is_supported() {
        Readiness::Unavailable("background workers are not supported on this platform".to_string())
    } else {
        match host.wait_until_active().await {
            Ok(handle) => Readiness::Ready(handle),
            Err(e) => Readiness::Unavailable(e.to_string()),
        }
    };

    let event = match &readiness {
        Readiness::Ready(handle) => {
            info!(worker_id = %handle.id(), "Cache worker ready");
            WorkerEvent::Ready {
                worker_id: handle.id().to_string(),
            }
        }
        Readiness::Unavailable(reason) => {
            warn!(reason = %reason, "Cache worker unavailable; caching disabled");
            WorkerEvent::Unavailable {
                reason: reason.clone(),
            }
        }
    };

    if let Some(bus) = event_bus {
        bus.emit(CoreEvent::Worker(event)).ok();
    }

    readiness
}
