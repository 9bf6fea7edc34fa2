//! In-Process Cache Worker
//!
//! Native stand-in for the browser's service worker. A tokio task owns an
//! in-memory entry set per cache store and answers the cache message protocol;
//! the host side mimics service worker registration (activation, control of
//! the session, update notifications).
//!
//! Entries are URLs only. Nothing is downloaded, expired or evicted.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result};
use bridge_traits::worker::{ReplyPort, WorkerHandle, WorkerHost, WorkerLifecycle, WorkerMessage};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, warn};

const AUDIO_EXTENSIONS: &[&str] = &["mp3", "m4a", "wav", "ogg", "webm", "flac", "aac"];
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif", "svg", "ico"];

static NEXT_WORKER: AtomicUsize = AtomicUsize::new(1);

/// Store a URL lands in when fetched through the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Store {
    Static,
    Audio,
    Images,
    Api,
}

impl Store {
    pub const ALL: [Store; 4] = [Store::Static, Store::Audio, Store::Images, Store::Api];

    pub fn as_str(&self) -> &'static str {
        match self {
            Store::Static => "static",
            Store::Audio => "audio",
            Store::Images => "images",
            Store::Api => "api",
        }
    }

    fn from_tag(tag: &str) -> Option<Store> {
        Store::ALL.into_iter().find(|store| store.as_str() == tag)
    }
}

/// Pick the store for a fetched URL.
///
/// Audio file extensions and song stream endpoints go to `audio`; API cover or
/// image endpoints and image file extensions go to `images`; any other `/api/`
/// URL goes to `api`; everything else is a static asset.
pub fn classify(url: &str) -> Store {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let extension = path
        .rsplit('/')
        .next()
        .and_then(|segment| segment.rsplit_once('.'))
        .map(|(_, ext)| ext.to_ascii_lowercase());
    let has_extension = |known: &[&str]| {
        extension
            .as_deref()
            .is_some_and(|ext| known.contains(&ext))
    };

    if has_extension(AUDIO_EXTENSIONS) || (url.contains("/api/songs/") && url.contains("/stream")) {
        Store::Audio
    } else if (url.contains("/api/") && (url.contains("cover") || url.contains("image")))
        || has_extension(IMAGE_EXTENSIONS)
    {
        Store::Images
    } else if url.contains("/api/") {
        Store::Api
    } else {
        Store::Static
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
enum Command {
    CacheAudio {
        url: String,
    },
    CacheImage {
        url: String,
    },
    ClearCache {
        #[serde(rename = "cacheName")]
        cache_name: Option<String>,
    },
    ClearAllCaches,
    GetCacheStatus,
    GetCacheStats,
    ClearMusicCache,
}

struct Envelope {
    message: WorkerMessage,
    reply_port: Option<ReplyPort>,
}

#[derive(Debug, Default)]
struct Behavior {
    reply_delay: Duration,
    stats_error: Option<String>,
    fail_clear: bool,
}

#[derive(Debug)]
struct WorkerState {
    origin: String,
    stores: Mutex<BTreeMap<Store, BTreeSet<String>>>,
    behavior: Mutex<Behavior>,
    handled: AtomicUsize,
}

impl WorkerState {
    fn stores(&self) -> MutexGuard<'_, BTreeMap<Store, BTreeSet<String>>> {
        self.stores.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn behavior(&self) -> MutexGuard<'_, Behavior> {
        self.behavior.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn absolute(&self, url: &str) -> String {
        if url.starts_with('/') {
            format!("{}{}", self.origin, url)
        } else {
            url.to_string()
        }
    }

    fn insert(&self, store: Store, url: &str) {
        let url = self.absolute(url);
        self.stores().entry(store).or_default().insert(url);
    }

    fn count(&self, store: Store) -> usize {
        self.stores().get(&store).map_or(0, BTreeSet::len)
    }

    fn handle(&self, envelope: Envelope) {
        self.handled.fetch_add(1, Ordering::SeqCst);

        let command = match serde_json::from_value::<Command>(envelope.message) {
            Ok(command) => command,
            Err(e) => {
                debug!(error = %e, "Ignoring unrecognized worker message");
                return;
            }
        };

        let reply = match command {
            Command::CacheAudio { url } => {
                self.insert(Store::Audio, &url);
                None
            }
            Command::CacheImage { url } => {
                self.insert(Store::Images, &url);
                None
            }
            Command::ClearCache { cache_name } => {
                match cache_name.as_deref().and_then(Store::from_tag) {
                    Some(store) => {
                        self.stores().remove(&store);
                    }
                    None => debug!(cache_name = ?cache_name, "Ignoring clear for unknown store"),
                }
                None
            }
            Command::ClearAllCaches => {
                self.stores().clear();
                None
            }
            Command::GetCacheStatus => Some(json!({
                "type": "CACHE_STATUS",
                "static": self.count(Store::Static),
                "audio": self.count(Store::Audio),
                "images": self.count(Store::Images),
                "api": self.count(Store::Api),
            })),
            Command::GetCacheStats => {
                let stats_error = self.behavior().stats_error.clone();
                Some(match stats_error {
                    Some(error) => json!({ "error": error }),
                    None => {
                        let entries: Vec<String> = self
                            .stores()
                            .get(&Store::Audio)
                            .map(|set| set.iter().cloned().collect())
                            .unwrap_or_default();
                        json!({ "musicCacheSize": entries.len(), "cacheEntries": entries })
                    }
                })
            }
            Command::ClearMusicCache => {
                let success = !self.behavior().fail_clear;
                if success {
                    self.stores().remove(&Store::Audio);
                }
                Some(json!({ "success": success }))
            }
        };

        if let (Some(reply), Some(port)) = (reply, envelope.reply_port) {
            let delay = self.behavior().reply_delay;
            if delay.is_zero() {
                if port.post(reply).is_err() {
                    debug!("Caller stopped listening before the reply");
                }
            } else {
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    if port.post(reply).is_err() {
                        debug!("Caller stopped listening before the delayed reply");
                    }
                });
            }
        }
    }
}

/// Handle to the in-process worker task.
#[derive(Debug)]
pub struct InProcessWorker {
    id: String,
    inbox: mpsc::UnboundedSender<Envelope>,
    state: Arc<WorkerState>,
}

impl std::fmt::Debug for Envelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Envelope")
            .field("message", &self.message)
            .field("has_reply_port", &self.reply_port.is_some())
            .finish()
    }
}

impl InProcessWorker {
    /// Spawn the worker task. Must be called within a tokio runtime.
    pub fn spawn(origin: impl Into<String>) -> Arc<Self> {
        let id = format!("in-process-{}", NEXT_WORKER.fetch_add(1, Ordering::Relaxed));
        let state = Arc::new(WorkerState {
            origin: origin.into(),
            stores: Mutex::new(BTreeMap::new()),
            behavior: Mutex::new(Behavior::default()),
            handled: AtomicUsize::new(0),
        });

        let (inbox, mut receiver) = mpsc::unbounded_channel::<Envelope>();
        let task_state = Arc::clone(&state);
        let task_id = id.clone();
        tokio::spawn(async move {
            while let Some(envelope) = receiver.recv().await {
                task_state.handle(envelope);
            }
            debug!(worker_id = %task_id, "Cache worker stopped");
        });

        Arc::new(Self { id, inbox, state })
    }

    /// Record a URL as if the worker had intercepted its fetch.
    pub fn record_fetch(&self, url: &str) -> Store {
        let store = classify(url);
        self.state.insert(store, url);
        store
    }

    /// Entries in `store`, sorted.
    pub fn entries(&self, store: Store) -> Vec<String> {
        self.state
            .stores()
            .get(&store)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn count(&self, store: Store) -> usize {
        self.state.count(store)
    }

    /// Number of messages the task has processed.
    pub fn handled(&self) -> usize {
        self.state.handled.load(Ordering::SeqCst)
    }

    /// Delay every reply by `delay`.
    pub fn set_reply_delay(&self, delay: Duration) {
        self.state.behavior().reply_delay = delay;
    }

    /// Answer stats queries with `{ "error": message }` while set.
    pub fn fail_stats(&self, message: Option<String>) {
        self.state.behavior().stats_error = message;
    }

    /// Answer `CLEAR_MUSIC_CACHE` with `{ "success": false }` while set.
    pub fn fail_clear(&self, fail: bool) {
        self.state.behavior().fail_clear = fail;
    }
}

impl WorkerHandle for InProcessWorker {
    fn id(&self) -> &str {
        &self.id
    }

    fn post_message(&self, message: WorkerMessage, reply_port: Option<ReplyPort>) -> Result<()> {
        self.inbox
            .send(Envelope {
                message,
                reply_port,
            })
            .map_err(|_| BridgeError::ChannelClosed)
    }
}

/// Registration side of the in-process worker.
#[derive(Debug)]
pub struct InProcessWorkerHost {
    worker: Arc<InProcessWorker>,
    active: watch::Sender<bool>,
    controlling: AtomicBool,
    lifecycle: broadcast::Sender<WorkerLifecycle>,
}

impl InProcessWorkerHost {
    /// Spawn an active worker that controls the session.
    ///
    /// Must be called within a tokio runtime.
    pub fn start() -> Self {
        let host = Self::start_inactive();
        host.activate();
        host
    }

    /// Spawn a worker whose activation waits for [`InProcessWorkerHost::activate`].
    pub fn start_inactive() -> Self {
        Self::with_worker(InProcessWorker::spawn("http://localhost"))
    }

    /// Wrap an already spawned worker. Starts inactive.
    pub fn with_worker(worker: Arc<InProcessWorker>) -> Self {
        let (active, _) = watch::channel(false);
        let (lifecycle, _) = broadcast::channel(16);
        Self {
            worker,
            active,
            controlling: AtomicBool::new(false),
            lifecycle,
        }
    }

    pub fn worker(&self) -> &Arc<InProcessWorker> {
        &self.worker
    }

    /// Finish activation; the worker also takes control of the session.
    pub fn activate(&self) {
        self.active.send_replace(true);
        self.lifecycle
            .send(WorkerLifecycle::Activated {
                worker_id: self.worker.id.clone(),
            })
            .ok();
        self.set_controlling(true);
    }

    /// Give up or take control of the session without changing activation.
    pub fn set_controlling(&self, controlling: bool) {
        let previous = self.controlling.swap(controlling, Ordering::SeqCst);
        if previous != controlling {
            self.lifecycle
                .send(WorkerLifecycle::ControllerChanged {
                    worker_id: controlling.then(|| self.worker.id.clone()),
                })
                .ok();
        }
    }

    /// Tell subscribers a newer worker is waiting to take over.
    pub fn announce_update(&self, version: Option<String>) {
        if self
            .lifecycle
            .send(WorkerLifecycle::UpdateAvailable { version })
            .is_err()
        {
            warn!("Worker update announced with no lifecycle subscribers");
        }
    }
}

#[async_trait]
impl WorkerHost for InProcessWorkerHost {
    fn is_supported(&self) -> bool {
        true
    }

    async fn wait_until_active(&self) -> Result<Arc<dyn WorkerHandle>> {
        let mut active = self.active.subscribe();
        active
            .wait_for(|active| *active)
            .await
            .map_err(|_| BridgeError::ChannelClosed)?;
        Ok(Arc::clone(&self.worker) as Arc<dyn WorkerHandle>)
    }

    fn controller(&self) -> Option<Arc<dyn WorkerHandle>> {
        if *self.active.borrow() && self.controlling.load(Ordering::SeqCst) {
            Some(Arc::clone(&self.worker) as Arc<dyn WorkerHandle>)
        } else {
            None
        }
    }

    fn subscribe_lifecycle(&self) -> Option<broadcast::Receiver<WorkerLifecycle>> {
        Some(self.lifecycle.subscribe())
    }
}
