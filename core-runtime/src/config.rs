//! # Core Configuration Module
//!
//! Provides configuration management for the cache coordination core.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct a `CoreConfig`
//! instance that holds the host bridges and the timing/preload policy. It
//! enforces fail-fast validation so a missing worker bridge is reported at
//! startup instead of surfacing as silently skipped caching later.
//!
//! ## Required Dependencies
//!
//! - `WorkerHost` - Worker discovery and messaging
//!
//! ## Optional Dependencies
//!
//! - `NetworkMonitor` - Reachability signal (without one the core reports online)
//! - `EventBus` - Lifecycle and preload progress events
//!
//! When the `desktop-shims` feature is enabled, the desktop network monitor is
//! injected automatically if none is provided.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::{CoreConfig, BatchPolicy};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let config = CoreConfig::builder()
//!     .worker_host(Arc::new(host))
//!     .status_timeout(Duration::from_secs(3))
//!     .batch_policy(BatchPolicy::Reject)
//!     .build()
//!     .expect("Failed to build config");
//! ```

use crate::error::{Error, Result};
use crate::events::EventBus;
use bridge_traits::{NetworkMonitor, WorkerHost};
use std::sync::Arc;
use std::time::Duration;

/// Default deadline for correlated worker queries.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_millis(5000);

/// Upper bound accepted for any worker deadline.
pub const MAX_QUERY_TIMEOUT: Duration = Duration::from_secs(600);

/// Default number of leading playlist items that get preloaded.
pub const DEFAULT_PLAYLIST_PRELOAD_LIMIT: usize = 5;

/// Default pause between two preloaded items.
pub const DEFAULT_PACING_DELAY: Duration = Duration::from_millis(100);

/// Core configuration for the cache coordination core.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Worker discovery and messaging (required)
    pub worker_host: Arc<dyn WorkerHost>,

    /// Reachability signal (optional)
    pub network_monitor: Option<Arc<dyn NetworkMonitor>>,

    /// Event bus for lifecycle and progress events (optional)
    pub event_bus: Option<Arc<EventBus>>,

    /// Query deadlines and playlist prefix used by the coordinator
    pub coordinator: CoordinatorSettings,

    /// Batch preload policy
    pub preload: PreloadSettings,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("worker_host", &"WorkerHost { ... }")
            .field(
                "network_monitor",
                &self
                    .network_monitor
                    .as_ref()
                    .map(|_| "NetworkMonitor { ... }"),
            )
            .field("event_bus", &self.event_bus.as_ref().map(|_| "EventBus"))
            .field("coordinator", &self.coordinator)
            .field("preload", &self.preload)
            .finish()
    }
}

impl CoreConfig {
    /// Creates a new builder.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validate timing and preload settings.
    pub fn validate(&self) -> Result<()> {
        self.coordinator.validate()?;
        self.preload.validate()
    }
}

/// Timing policy for the coordinator facade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorSettings {
    /// Deadline for `GET_CACHE_STATUS`, readiness wait included
    pub status_timeout: Duration,

    /// Deadline for `GET_CACHE_STATS`
    pub stats_timeout: Duration,

    /// Deadline for `CLEAR_MUSIC_CACHE`
    pub clear_timeout: Duration,

    /// How long fire-and-forget commands wait for the worker to become ready
    pub dispatch_timeout: Duration,

    /// Number of leading items `preload_playlist` touches
    pub playlist_preload_limit: usize,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            status_timeout: DEFAULT_QUERY_TIMEOUT,
            stats_timeout: DEFAULT_QUERY_TIMEOUT,
            clear_timeout: DEFAULT_QUERY_TIMEOUT,
            dispatch_timeout: DEFAULT_QUERY_TIMEOUT,
            playlist_preload_limit: DEFAULT_PLAYLIST_PRELOAD_LIMIT,
        }
    }
}

impl CoordinatorSettings {
    fn validate(&self) -> Result<()> {
        let timeouts = [
            self.status_timeout,
            self.stats_timeout,
            self.clear_timeout,
            self.dispatch_timeout,
        ];

        if timeouts.iter().any(Duration::is_zero) {
            return Err(Error::Config(
                "query timeouts must be greater than zero".to_string(),
            ));
        }

        if timeouts.iter().any(|timeout| *timeout > MAX_QUERY_TIMEOUT) {
            return Err(Error::Config(format!(
                "query timeouts must not exceed {} s",
                MAX_QUERY_TIMEOUT.as_secs()
            )));
        }

        if self.playlist_preload_limit == 0 {
            return Err(Error::Config(
                "playlist_preload_limit must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

/// What to do when a preload batch is started while another one runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchPolicy {
    /// Queue the new batch behind the running one.
    #[default]
    Serialize,
    /// Refuse the new batch with a busy error.
    Reject,
}

/// Batch preload policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreloadSettings {
    /// Pause between two items
    pub pacing_delay: Duration,

    /// Prefix length used by playlist batches
    pub playlist_limit: usize,

    /// Overlapping batch handling
    pub batch_policy: BatchPolicy,
}

impl Default for PreloadSettings {
    fn default() -> Self {
        Self {
            pacing_delay: DEFAULT_PACING_DELAY,
            playlist_limit: DEFAULT_PLAYLIST_PRELOAD_LIMIT,
            batch_policy: BatchPolicy::default(),
        }
    }
}

impl PreloadSettings {
    fn validate(&self) -> Result<()> {
        if self.playlist_limit == 0 {
            return Err(Error::Config(
                "playlist_limit must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for [`CoreConfig`].
#[derive(Default)]
pub struct CoreConfigBuilder {
    worker_host: Option<Arc<dyn WorkerHost>>,
    network_monitor: Option<Arc<dyn NetworkMonitor>>,
    event_bus: Option<Arc<EventBus>>,
    coordinator: CoordinatorSettings,
    preload: PreloadSettings,
}

impl CoreConfigBuilder {
    /// Set the worker host bridge (required).
    pub fn worker_host(mut self, host: Arc<dyn WorkerHost>) -> Self {
        self.worker_host = Some(host);
        self
    }

    /// Set the network monitor.
    pub fn network_monitor(mut self, monitor: Arc<dyn NetworkMonitor>) -> Self {
        self.network_monitor = Some(monitor);
        self
    }

    /// Set the event bus.
    pub fn event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Deadline for cache status queries.
    pub fn status_timeout(mut self, timeout: Duration) -> Self {
        self.coordinator.status_timeout = timeout;
        self
    }

    /// Deadline for cache stats queries.
    pub fn stats_timeout(mut self, timeout: Duration) -> Self {
        self.coordinator.stats_timeout = timeout;
        self
    }

    /// Deadline for clearing the music cache.
    pub fn clear_timeout(mut self, timeout: Duration) -> Self {
        self.coordinator.clear_timeout = timeout;
        self
    }

    /// How long fire-and-forget commands wait for an active worker.
    pub fn dispatch_timeout(mut self, timeout: Duration) -> Self {
        self.coordinator.dispatch_timeout = timeout;
        self
    }

    /// Number of leading items preloaded for a playlist, used by both the
    /// coordinator and playlist batches.
    pub fn playlist_preload_limit(mut self, limit: usize) -> Self {
        self.coordinator.playlist_preload_limit = limit;
        self.preload.playlist_limit = limit;
        self
    }

    /// Pause between two preloaded items.
    pub fn pacing_delay(mut self, delay: Duration) -> Self {
        self.preload.pacing_delay = delay;
        self
    }

    /// Overlapping batch handling.
    pub fn batch_policy(mut self, policy: BatchPolicy) -> Self {
        self.preload.batch_policy = policy;
        self
    }

    /// Build the configuration.
    ///
    /// # Errors
    ///
    /// - [`Error::CapabilityMissing`] when no worker host was provided
    /// - [`Error::Config`] when a timing value is invalid
    pub fn build(self) -> Result<CoreConfig> {
        let worker_host = self.worker_host.ok_or_else(|| Error::CapabilityMissing {
            capability: "WorkerHost".to_string(),
            message: "No worker host provided. \
                      Web: pass the service worker bridge. \
                      Desktop: pass bridge_desktop::InProcessWorkerHost."
                .to_string(),
        })?;

        #[cfg(feature = "desktop-shims")]
        let network_monitor = self.network_monitor.or_else(|| {
            Some(Arc::new(bridge_desktop::DesktopNetworkMonitor::new()) as Arc<dyn NetworkMonitor>)
        });

        #[cfg(not(feature = "desktop-shims"))]
        let network_monitor = self.network_monitor;

        let config = CoreConfig {
            worker_host,
            network_monitor,
            event_bus: self.event_bus,
            coordinator: self.coordinator,
            preload: self.preload,
        };

        config.validate()?;
        Ok(config)
    }
}
