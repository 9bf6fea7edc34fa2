//! # Request/Response Correlator
//!
//! Turns the worker's one-way message transport into bounded request/response
//! calls.
//!
//! Each query gets a private reply channel that no other call shares, so
//! replies cannot be confused even when concurrent queries are answered out of
//! order. The first message on the channel settles the call; a deadline
//! settles it otherwise. Settling consumes the [`PendingRequest`] and drops the
//! receiving end, so a reply arriving after the deadline is refused by the
//! transport instead of reaching a finished call.
//!
//! A timeout only abandons the local wait. The worker is not told to stop and
//! may still finish the work it was asked to do.

use std::sync::Arc;
use std::time::Duration;

use bridge_traits::{reply_channel, ReplyReceiver, WorkerHandle, WorkerMessage};
use core_runtime::events::{CacheEvent, CoreEvent, EventBus};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{CacheError, Result};
use crate::protocol::{CacheCommand, CommandKind};
use crate::readiness::{Readiness, ReadinessGate};

/// Stand-in deadline for timeouts too large to add to the clock.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// `now + timeout`, saturating at [`FAR_FUTURE`] instead of overflowing.
fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout).unwrap_or(now + FAR_FUTURE)
}

/// A query waiting for its reply.
///
/// Lives for exactly one call and is consumed by [`PendingRequest::settle`].
#[derive(Debug)]
pub struct PendingRequest {
    id: Uuid,
    kind: CommandKind,
    receiver: ReplyReceiver,
    deadline: Instant,
    timeout: Duration,
}

impl PendingRequest {
    /// Request id, used only to tie log lines together.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Wait for the first reply or the deadline, whichever comes first.
    pub async fn settle(mut self) -> Result<WorkerMessage> {
        match timeout_at(self.deadline, self.receiver.recv()).await {
            Ok(Some(reply)) => {
                debug!(request_id = %self.id, kind = %self.kind, "Reply received");
                Ok(reply)
            }
            Ok(None) => Err(CacheError::WorkerUnavailable(format!(
                "worker dropped the reply channel for {}",
                self.kind
            ))),
            Err(_) => Err(CacheError::TimedOut {
                kind: self.kind,
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        }
    }
}

/// Issues commands to the worker behind a [`ReadinessGate`].
#[derive(Debug, Clone)]
pub struct Correlator {
    gate: Arc<ReadinessGate>,
    event_bus: Option<Arc<EventBus>>,
}

impl Correlator {
    pub fn new(gate: Arc<ReadinessGate>) -> Self {
        Self {
            gate,
            event_bus: None,
        }
    }

    /// Set event bus for dispatch and timeout events.
    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn gate(&self) -> &Arc<ReadinessGate> {
        &self.gate
    }

    /// Send a query to the active worker and wait for its reply.
    ///
    /// `timeout` covers waiting for the worker to become ready as well as
    /// waiting for the reply.
    pub async fn request(&self, command: CacheCommand, timeout: Duration) -> Result<WorkerMessage> {
        let deadline = deadline_after(timeout);
        let kind = command.kind();

        let handle = match timeout_at(deadline, self.gate.resolve()).await {
            Ok(Readiness::Ready(handle)) => handle,
            Ok(Readiness::Unavailable(reason)) => return Err(CacheError::WorkerUnavailable(reason)),
            Err(_) => {
                debug!(kind = %kind, "Worker not ready before deadline");
                return Err(self.timed_out(kind, timeout));
            }
        };

        let pending = self.send(handle.as_ref(), &command, deadline, timeout)?;
        self.finish(pending).await
    }

    /// Send a query to a specific worker and wait for its reply.
    pub async fn request_on(
        &self,
        handle: &dyn WorkerHandle,
        command: CacheCommand,
        timeout: Duration,
    ) -> Result<WorkerMessage> {
        let deadline = deadline_after(timeout);
        let pending = self.send(handle, &command, deadline, timeout)?;
        self.finish(pending).await
    }

    /// Hand a command to the active worker without waiting for any answer.
    ///
    /// Waits up to `readiness_timeout` for the worker to become ready; returns
    /// as soon as the message is posted.
    pub async fn dispatch(&self, command: CacheCommand, readiness_timeout: Duration) -> Result<()> {
        let kind = command.kind();
        let deadline = deadline_after(readiness_timeout);
        let handle = match timeout_at(deadline, self.gate.resolve()).await {
            Ok(Readiness::Ready(handle)) => handle,
            Ok(Readiness::Unavailable(reason)) => return Err(CacheError::WorkerUnavailable(reason)),
            Err(_) => {
                debug!(kind = %kind, "Worker not ready; command dropped");
                return Err(self.timed_out(kind, readiness_timeout));
            }
        };

        handle.post_message(command.to_message()?, None)?;
        debug!(kind = %kind, worker_id = %handle.id(), "Command dispatched");

        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Cache(CacheEvent::CommandDispatched {
                kind: kind.as_str().to_string(),
            }))
            .ok();
        }

        Ok(())
    }

    fn send(
        &self,
        handle: &dyn WorkerHandle,
        command: &CacheCommand,
        deadline: Instant,
        timeout: Duration,
    ) -> Result<PendingRequest> {
        let (port, receiver) = reply_channel();
        let pending = PendingRequest {
            id: Uuid::new_v4(),
            kind: command.kind(),
            receiver,
            deadline,
            timeout,
        };

        handle.post_message(command.to_message()?, Some(port))?;
        debug!(
            request_id = %pending.id,
            kind = %pending.kind,
            worker_id = %handle.id(),
            "Query sent"
        );

        Ok(pending)
    }

    async fn finish(&self, pending: PendingRequest) -> Result<WorkerMessage> {
        let request_id = pending.id();
        let kind = pending.kind();
        let timeout = pending.timeout;

        match pending.settle().await {
            Err(CacheError::TimedOut { .. }) => {
                warn!(
                    request_id = %request_id,
                    kind = %kind,
                    timeout_ms = timeout.as_millis() as u64,
                    "Query timed out"
                );
                Err(self.timed_out(kind, timeout))
            }
            other => other,
        }
    }

    fn timed_out(&self, kind: CommandKind, timeout: Duration) -> CacheError {
        let timeout_ms = timeout.as_millis() as u64;
        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Cache(CacheEvent::QueryTimedOut {
                kind: kind.as_str().to_string(),
                timeout_ms,
            }))
            .ok();
        }
        CacheError::TimedOut { kind, timeout_ms }
    }
}
