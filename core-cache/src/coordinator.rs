//! # Cache Coordinator
//!
//! Application-facing facade over the cache worker.
//!
//! ## Overview
//!
//! The `CacheCoordinator` turns cache intents into worker commands:
//! - Fire-and-forget commands (cache a resource, clear a store) wait a bounded
//!   time for the worker to be ready, post the command and return without
//!   confirmation
//! - Queries (status, stats, clearing the music store) are correlated with
//!   their reply and bounded by a deadline
//! - Preloading resolves a song's resources and caches them
//!
//! Nothing here fails loudly. Fire-and-forget commands log and return `()`,
//! status queries degrade to `None`, and only the stats and clear-music
//! queries surface an error, because their callers show it to the user. The
//! `try_*` variants return the dispatch result for callers that want it.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_cache::{CacheCoordinator, PreloadTask};
//! use std::sync::Arc;
//!
//! let coordinator = Arc::new(CacheCoordinator::from_config(&config));
//!
//! coordinator.preload_song(&PreloadTask::new("42")).await;
//!
//! if let Some(status) = coordinator.get_status().await {
//!     println!("{} audio entries", status.audio);
//! }
//! ```

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bridge_traits::{NetworkMonitor, WorkerHost};
use core_runtime::config::{CoordinatorSettings, CoreConfig};
use core_runtime::events::{CacheEvent, CoreEvent, EventBus};
use core_runtime::logging::redact_url;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::category::CacheCategory;
use crate::correlator::Correlator;
use crate::error::{CacheError, Result};
use crate::preload::{PreloadTask, Preloader};
use crate::protocol::{CacheCommand, CacheStatsReport, CacheStatusReport, ClearMusicCacheReply};
use crate::readiness::ReadinessGate;

/// Facade over the cache worker.
pub struct CacheCoordinator {
    gate: Arc<ReadinessGate>,
    correlator: Correlator,
    network_monitor: Option<Arc<dyn NetworkMonitor>>,
    event_bus: Option<Arc<EventBus>>,
    settings: CoordinatorSettings,
}

impl CacheCoordinator {
    /// Create a coordinator with default settings and no event bus.
    pub fn new(host: Arc<dyn WorkerHost>) -> Self {
        Self::assemble(host, None, None, CoordinatorSettings::default())
    }

    /// Create a coordinator from the core configuration.
    pub fn from_config(config: &CoreConfig) -> Self {
        Self::assemble(
            Arc::clone(&config.worker_host),
            config.network_monitor.clone(),
            config.event_bus.clone(),
            config.coordinator,
        )
    }

    fn assemble(
        host: Arc<dyn WorkerHost>,
        network_monitor: Option<Arc<dyn NetworkMonitor>>,
        event_bus: Option<Arc<EventBus>>,
        settings: CoordinatorSettings,
    ) -> Self {
        let mut gate = ReadinessGate::new(host);
        if let Some(bus) = &event_bus {
            gate = gate.with_event_bus(Arc::clone(bus));
        }
        let gate = Arc::new(gate);

        let mut correlator = Correlator::new(Arc::clone(&gate));
        if let Some(bus) = &event_bus {
            correlator = correlator.with_event_bus(Arc::clone(bus));
        }

        Self {
            gate,
            correlator,
            network_monitor,
            event_bus,
            settings,
        }
    }

    /// Set the reachability signal.
    pub fn with_network_monitor(mut self, monitor: Arc<dyn NetworkMonitor>) -> Self {
        self.network_monitor = Some(monitor);
        self
    }

    /// Override deadlines and the playlist prefix.
    pub fn with_settings(mut self, settings: CoordinatorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &CoordinatorSettings {
        &self.settings
    }

    pub fn readiness(&self) -> &Arc<ReadinessGate> {
        &self.gate
    }

    /// Start forwarding worker lifecycle notifications (update available).
    pub fn watch_lifecycle(&self) -> Option<JoinHandle<()>> {
        self.gate.watch_lifecycle()
    }

    // ========================================================================
    // Fire-and-forget commands
    // ========================================================================

    /// Ask the worker to cache an audio resource.
    pub async fn try_cache_audio(&self, url: &str) -> Result<()> {
        self.dispatch(CacheCommand::CacheAudio {
            url: url.to_string(),
        })
        .await
    }

    /// Ask the worker to cache an audio resource; failures are logged.
    #[instrument(skip(self), fields(url = %redact_url(url)))]
    pub async fn cache_audio(&self, url: &str) {
        if let Err(e) = self.try_cache_audio(url).await {
            warn!(error = %e, "Failed to cache audio");
        }
    }

    /// Ask the worker to cache an image resource.
    pub async fn try_cache_image(&self, url: &str) -> Result<()> {
        self.dispatch(CacheCommand::CacheImage {
            url: url.to_string(),
        })
        .await
    }

    /// Ask the worker to cache an image resource; failures are logged.
    #[instrument(skip(self), fields(url = %redact_url(url)))]
    pub async fn cache_image(&self, url: &str) {
        if let Err(e) = self.try_cache_image(url).await {
            warn!(error = %e, "Failed to cache image");
        }
    }

    /// Ask the worker to drop one category store.
    pub async fn try_clear_category(&self, category: CacheCategory) -> Result<()> {
        self.dispatch(CacheCommand::ClearCache {
            cache_name: category,
        })
        .await?;
        self.emit(CacheEvent::Cleared {
            category: Some(category.as_str().to_string()),
        });
        Ok(())
    }

    /// Ask the worker to drop one category store; failures are logged.
    #[instrument(skip(self))]
    pub async fn clear_category(&self, category: CacheCategory) {
        if let Err(e) = self.try_clear_category(category).await {
            warn!(error = %e, "Failed to clear cache");
        }
    }

    /// Ask the worker to drop every store.
    pub async fn try_clear_all(&self) -> Result<()> {
        self.dispatch(CacheCommand::ClearAllCaches).await?;
        self.emit(CacheEvent::Cleared { category: None });
        Ok(())
    }

    /// Ask the worker to drop every store; failures are logged.
    #[instrument(skip(self))]
    pub async fn clear_all(&self) {
        if let Err(e) = self.try_clear_all().await {
            warn!(error = %e, "Failed to clear all caches");
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Per-category entry counts.
    ///
    /// # Errors
    ///
    /// Any [`CacheError`] from readiness, the deadline or reply parsing.
    pub async fn try_get_status(&self) -> Result<CacheStatusReport> {
        let reply = self
            .correlator
            .request(CacheCommand::GetCacheStatus, self.settings.status_timeout)
            .await?;
        CacheStatusReport::from_reply(reply)
    }

    /// Per-category entry counts, or `None` when the worker is unavailable,
    /// does not answer before the status deadline, or answers garbage.
    #[instrument(skip(self))]
    pub async fn get_status(&self) -> Option<CacheStatusReport> {
        match self.try_get_status().await {
            Ok(report) => {
                debug!(total = report.total(), "Cache status received");
                Some(report)
            }
            Err(e) => {
                warn!(error = %e, "Failed to get cache status");
                None
            }
        }
    }

    /// Cached audio entries from the worker controlling this session.
    ///
    /// # Errors
    ///
    /// Always [`CacheError::StatsUnavailable`]: no controlling worker, a
    /// worker-reported error, a missed deadline or a malformed reply.
    #[instrument(skip(self))]
    pub async fn get_stats(&self) -> Result<CacheStatsReport> {
        let controller = self
            .gate
            .controller()
            .ok_or_else(|| CacheError::StatsUnavailable("no active cache worker".to_string()))?;

        let reply = self
            .correlator
            .request_on(
                controller.as_ref(),
                CacheCommand::GetCacheStats,
                self.settings.stats_timeout,
            )
            .await
            .map_err(into_stats_unavailable)?;

        CacheStatsReport::from_reply(reply).map_err(into_stats_unavailable)
    }

    /// Whether some cached entry contains `url`. `false` when stats fail.
    #[instrument(skip(self), fields(url = %redact_url(url)))]
    pub async fn is_resource_cached(&self, url: &str) -> bool {
        match self.get_stats().await {
            Ok(stats) => stats.contains(url),
            Err(e) => {
                warn!(error = %e, "Failed to check cache state");
                false
            }
        }
    }

    /// Drop the music store and wait for the worker to confirm.
    ///
    /// # Errors
    ///
    /// - [`CacheError::StatsUnavailable`] when no worker answers
    /// - [`CacheError::ClearFailed`] when the worker reports failure
    #[instrument(skip(self))]
    pub async fn clear_music_cache(&self) -> Result<bool> {
        let controller = self
            .gate
            .controller()
            .ok_or_else(|| CacheError::StatsUnavailable("no active cache worker".to_string()))?;

        let reply = self
            .correlator
            .request_on(
                controller.as_ref(),
                CacheCommand::ClearMusicCache,
                self.settings.clear_timeout,
            )
            .await
            .map_err(into_stats_unavailable)?;

        let reply = ClearMusicCacheReply::from_reply(reply).map_err(into_stats_unavailable)?;
        if !reply.success {
            return Err(CacheError::ClearFailed(
                "worker could not clear the music cache".to_string(),
            ));
        }

        info!("Music cache cleared");
        self.emit(CacheEvent::Cleared {
            category: Some(CacheCategory::Audio.as_str().to_string()),
        });
        Ok(true)
    }

    // ========================================================================
    // Signals
    // ========================================================================

    /// Whether the host reports no connectivity. Without a network monitor
    /// the coordinator assumes it is online.
    pub fn is_offline(&self) -> bool {
        self.network_monitor
            .as_ref()
            .map_or(false, |monitor| !monitor.is_online())
    }

    /// Whether worker discovery has concluded with an active worker.
    pub fn is_worker_ready(&self) -> bool {
        self.gate.is_ready()
    }

    // ========================================================================
    // Preloading
    // ========================================================================

    /// Cache a song's audio and, when present, its cover. Failures are logged.
    #[instrument(skip(self, task), fields(song_id = %task.id))]
    pub async fn preload_song(&self, task: &PreloadTask) {
        if let Err(e) = self.preload_resources(task).await {
            warn!(error = %e, "Failed to preload song");
        }
    }

    /// Preload the leading songs of a playlist, one after the other.
    #[instrument(skip(self, tasks), fields(total = tasks.len()))]
    pub async fn preload_playlist(&self, tasks: &[PreloadTask]) {
        let limit = self.settings.playlist_preload_limit;
        for task in tasks.iter().take(limit) {
            self.preload_song(task).await;
        }
        debug!(preloaded = tasks.len().min(limit), "Playlist preload finished");
    }

    async fn preload_resources(&self, task: &PreloadTask) -> Result<()> {
        let audio = self.try_cache_audio(&task.resolved_audio_url()).await;

        let cover = match task.cover() {
            Some(url) => self.try_cache_image(url).await,
            None => Ok(()),
        };

        audio.and(cover)
    }

    async fn dispatch(&self, command: CacheCommand) -> Result<()> {
        self.correlator
            .dispatch(command, self.settings.dispatch_timeout)
            .await
    }

    fn emit(&self, event: CacheEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Cache(event)).ok();
        }
    }
}

#[async_trait]
impl Preloader for CacheCoordinator {
    async fn preload(&self, task: &PreloadTask) -> Result<()> {
        self.preload_resources(task).await
    }
}

impl fmt::Debug for CacheCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheCoordinator")
            .field("gate", &self.gate)
            .field("settings", &self.settings)
            .field("has_network_monitor", &self.network_monitor.is_some())
            .finish()
    }
}

fn into_stats_unavailable(error: CacheError) -> CacheError {
    match error {
        CacheError::StatsUnavailable(_) => error,
        other => CacheError::StatsUnavailable(other.to_string()),
    }
}
