//! # Preload Scheduler
//!
//! Warms the cache for a list of songs ahead of playback.
//!
//! ## Overview
//!
//! A batch walks its items strictly in order, waiting for each item to finish
//! before starting the next, with a short pause in between so the worker's
//! fetches do not saturate the network. A failing item is counted and logged;
//! it never stops the batch. After the last item the completion callback runs
//! exactly once.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_cache::preload::{PreloadScheduler, PreloadTask};
//! use std::sync::Arc;
//!
//! let scheduler = PreloadScheduler::new(coordinator.clone(), config.preload)
//!     .on_progress(|p| println!("{}/{}", p.completed, p.total))
//!     .on_complete(|report| println!("done: {} ok", report.succeeded));
//!
//! let report = scheduler.run_all(&songs).await?;
//! ```

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use core_runtime::config::{BatchPolicy, PreloadSettings};
use core_runtime::events::{CoreEvent, EventBus, PreloadEvent};
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::error::{CacheError, Result};

/// Audio location used when a song carries no explicit stream URL.
pub fn stream_url_for(id: &str) -> String {
    format!("/api/songs/{}/stream", id)
}

/// A song to warm in the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreloadTask {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub audio_url: Option<String>,
    #[serde(default)]
    pub cover_url: Option<String>,
}

impl PreloadTask {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: None,
            audio_url: None,
            cover_url: None,
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_audio_url(mut self, url: impl Into<String>) -> Self {
        self.audio_url = Some(url.into());
        self
    }

    pub fn with_cover_url(mut self, url: impl Into<String>) -> Self {
        self.cover_url = Some(url.into());
        self
    }

    /// Explicit audio URL, or the song's stream endpoint when none is set.
    pub fn resolved_audio_url(&self) -> String {
        match self.audio_url.as_deref() {
            Some(url) if !url.is_empty() => url.to_string(),
            _ => stream_url_for(&self.id),
        }
    }

    /// Cover URL, if the song has one.
    pub fn cover(&self) -> Option<&str> {
        self.cover_url.as_deref().filter(|url| !url.is_empty())
    }
}

/// Something that can warm the cache for one song.
#[async_trait]
pub trait Preloader: Send + Sync {
    /// Attempt every resource of `task`; return the first failure, if any.
    async fn preload(&self, task: &PreloadTask) -> Result<()>;
}

/// Lifecycle of the most recent batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PreloadState {
    Idle,
    Running {
        batch_id: Uuid,
        completed: usize,
        total: usize,
    },
    Completed {
        batch_id: Uuid,
        succeeded: usize,
        failed: usize,
        total: usize,
    },
}

impl PreloadState {
    pub fn is_running(&self) -> bool {
        matches!(self, PreloadState::Running { .. })
    }
}

/// Progress snapshot passed to the progress callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreloadProgress {
    pub completed: usize,
    pub total: usize,
}

impl PreloadProgress {
    /// Completion percentage (0-100)
    pub fn percent(&self) -> u8 {
        if self.total == 0 {
            return 100;
        }
        ((self.completed * 100) / self.total).min(100) as u8
    }
}

/// Outcome of one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreloadReport {
    pub batch_id: Uuid,
    pub total: usize,
    pub succeeded: usize,
    /// Ids of the items whose preload failed, in input order
    pub failed: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl PreloadReport {
    pub fn is_complete_success(&self) -> bool {
        self.failed.is_empty()
    }
}

type ProgressCallback = Arc<dyn Fn(PreloadProgress) + Send + Sync>;
type CompletionCallback = Arc<dyn Fn(&PreloadReport) + Send + Sync>;

/// Drives batch preloads through a [`Preloader`].
pub struct PreloadScheduler {
    preloader: Arc<dyn Preloader>,
    settings: PreloadSettings,
    event_bus: Option<Arc<EventBus>>,
    on_progress: Option<ProgressCallback>,
    on_complete: Option<CompletionCallback>,
    state: watch::Sender<PreloadState>,
    batch_lock: Mutex<()>,
}

impl PreloadScheduler {
    pub fn new(preloader: Arc<dyn Preloader>, settings: PreloadSettings) -> Self {
        let (state, _) = watch::channel(PreloadState::Idle);
        Self {
            preloader,
            settings,
            event_bus: None,
            on_progress: None,
            on_complete: None,
            state,
            batch_lock: Mutex::new(()),
        }
    }

    /// Set event bus for progress events.
    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Called after every item with the running count.
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(PreloadProgress) + Send + Sync + 'static,
    {
        self.on_progress = Some(Arc::new(callback));
        self
    }

    /// Called once after the last item of each batch.
    pub fn on_complete<F>(mut self, callback: F) -> Self
    where
        F: Fn(&PreloadReport) + Send + Sync + 'static,
    {
        self.on_complete = Some(Arc::new(callback));
        self
    }

    /// Current batch state.
    pub fn state(&self) -> PreloadState {
        self.state.borrow().clone()
    }

    /// Watch batch state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<PreloadState> {
        self.state.subscribe()
    }

    /// Preload every task.
    pub async fn run_all(&self, tasks: &[PreloadTask]) -> Result<PreloadReport> {
        self.run_batch(tasks).await
    }

    /// Preload the leading tasks of a playlist.
    pub async fn run_playlist(&self, tasks: &[PreloadTask]) -> Result<PreloadReport> {
        let limit = self.settings.playlist_limit.min(tasks.len());
        self.run_batch(&tasks[..limit]).await
    }

    /// Preload `tasks` in order as one batch.
    ///
    /// Dropping the returned future mid-batch puts the state back to
    /// [`PreloadState::Idle`] and releases the batch slot.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Busy`] when another batch is running and the
    /// policy is [`BatchPolicy::Reject`]. Item failures are never returned;
    /// they are listed in the report.
    #[instrument(skip(self, tasks), fields(total = tasks.len()))]
    pub async fn run_batch(&self, tasks: &[PreloadTask]) -> Result<PreloadReport> {
        let _batch = match self.settings.batch_policy {
            BatchPolicy::Serialize => self.batch_lock.lock().await,
            BatchPolicy::Reject => self.batch_lock.try_lock().map_err(|_| CacheError::Busy)?,
        };

        let batch_id = Uuid::new_v4();
        let total = tasks.len();
        let started_at = Utc::now();

        if tasks.is_empty() {
            debug!("Nothing to preload");
            return Ok(PreloadReport {
                batch_id,
                total,
                succeeded: 0,
                failed: Vec::new(),
                started_at,
                finished_at: started_at,
            });
        }

        info!(batch_id = %batch_id, total, "Starting preload batch");
        self.state.send_replace(PreloadState::Running {
            batch_id,
            completed: 0,
            total,
        });
        let mut running = RunningBatch {
            state: &self.state,
            batch_id,
            finished: false,
        };
        self.emit(PreloadEvent::Started {
            batch_id: batch_id.to_string(),
            total,
        });

        let mut failed = Vec::new();

        for (index, task) in tasks.iter().enumerate() {
            if let Err(e) = self.preloader.preload(task).await {
                warn!(batch_id = %batch_id, item_id = %task.id, error = %e, "Preload item failed");
                self.emit(PreloadEvent::ItemFailed {
                    batch_id: batch_id.to_string(),
                    item_id: task.id.clone(),
                    message: e.to_string(),
                });
                failed.push(task.id.clone());
            }

            let completed = index + 1;
            self.report_progress(batch_id, completed, total);

            if completed < total && !self.settings.pacing_delay.is_zero() {
                sleep(self.settings.pacing_delay).await;
            }
        }

        let report = PreloadReport {
            batch_id,
            total,
            succeeded: total - failed.len(),
            failed,
            started_at,
            finished_at: Utc::now(),
        };

        self.state.send_replace(PreloadState::Completed {
            batch_id,
            succeeded: report.succeeded,
            failed: report.failed.len(),
            total,
        });
        running.finished = true;
        self.emit(PreloadEvent::Completed {
            batch_id: batch_id.to_string(),
            succeeded: report.succeeded,
            failed: report.failed.len(),
            total,
        });
        info!(
            batch_id = %batch_id,
            succeeded = report.succeeded,
            failed = report.failed.len(),
            "Preload batch completed"
        );

        if let Some(callback) = &self.on_complete {
            callback(&report);
        }

        Ok(report)
    }

    fn report_progress(&self, batch_id: Uuid, completed: usize, total: usize) {
        self.state.send_replace(PreloadState::Running {
            batch_id,
            completed,
            total,
        });

        if let Some(callback) = &self.on_progress {
            callback(PreloadProgress { completed, total });
        }

        self.emit(PreloadEvent::Progress {
            batch_id: batch_id.to_string(),
            completed,
            total,
        });
    }

    fn emit(&self, event: PreloadEvent) {
        if let Some(bus) = &self.event_bus {
            bus.emit(CoreEvent::Preload(event)).ok();
        }
    }
}

/// Puts the state back to `Idle` when a batch future is dropped mid-run.
struct RunningBatch<'a> {
    state: &'a watch::Sender<PreloadState>,
    batch_id: Uuid,
    finished: bool,
}

impl Drop for RunningBatch<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let batch_id = self.batch_id;
        let reset = self.state.send_if_modified(|state| {
            let abandoned =
                matches!(state, PreloadState::Running { batch_id: id, .. } if *id == batch_id);
            if abandoned {
                *state = PreloadState::Idle;
            }
            abandoned
        });
        if reset {
            debug!(batch_id = %batch_id, "Preload batch abandoned");
        }
    }
}

impl fmt::Debug for PreloadScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreloadScheduler")
            .field("settings", &self.settings)
            .field("state", &*self.state.borrow())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_stream_url_is_exact() {
        assert_eq!(stream_url_for("42"), "/api/songs/42/stream");
        assert_eq!(PreloadTask::new("42").resolved_audio_url(), "/api/songs/42/stream");
        assert_eq!(
            PreloadTask::new("a b").resolved_audio_url(),
            "/api/songs/a b/stream"
        );
    }

    #[test]
    fn test_explicit_urls_win() {
        let task = PreloadTask::new("7")
            .with_audio_url("https://cdn/7.mp3")
            .with_cover_url("https://cdn/7.jpg");
        assert_eq!(task.resolved_audio_url(), "https://cdn/7.mp3");
        assert_eq!(task.cover(), Some("https://cdn/7.jpg"));
    }

    #[test]
    fn test_empty_urls_count_as_missing() {
        let task = PreloadTask::new("9").with_audio_url("").with_cover_url("");
        assert_eq!(task.resolved_audio_url(), "/api/songs/9/stream");
        assert_eq!(task.cover(), None);
    }

    #[test]
    fn test_task_deserializes_from_camel_case() {
        let task: PreloadTask = serde_json::from_value(serde_json::json!({
            "id": "3",
            "title": "Song",
            "coverUrl": "/covers/3.jpg"
        }))
        .unwrap();
        assert_eq!(task.cover(), Some("/covers/3.jpg"));
        assert!(task.audio_url.is_none());
    }

    #[test]
    fn test_progress_percent() {
        assert_eq!(PreloadProgress { completed: 2, total: 5 }.percent(), 40);
        assert_eq!(PreloadProgress { completed: 5, total: 5 }.percent(), 100);
        assert_eq!(PreloadProgress { completed: 0, total: 0 }.percent(), 100);
    }
}
