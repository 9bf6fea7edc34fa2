//! Integration tests for the cache coordinator

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bridge_desktop::{InProcessWorkerHost, Store};
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::{NetworkMonitor, NetworkStatus, ReplyPort, WorkerHandle, WorkerHost, WorkerMessage};
use core_cache::{
    CacheCategory, CacheCoordinator, CacheError, CacheStatusReport, PreloadTask, Preloader,
};
use core_runtime::config::{CoordinatorSettings, CoreConfig};
use core_runtime::events::{CacheEvent, CoreEvent, EventBus, WorkerEvent};
use mockall::mock;
use serde_json::json;
use tokio::sync::mpsc;

mock! {
    pub Network {}

    impl NetworkMonitor for Network {
        fn current_status(&self) -> NetworkStatus;
    }
}

/// Worker that records every message and lets the test answer by hand.
struct ScriptedWorker {
    outbox: mpsc::UnboundedSender<(WorkerMessage, Option<ReplyPort>)>,
    log: Mutex<Vec<WorkerMessage>>,
}

impl ScriptedWorker {
    fn sent(&self) -> Vec<WorkerMessage> {
        self.log.lock().unwrap().clone()
    }
}

impl WorkerHandle for ScriptedWorker {
    fn id(&self) -> &str {
        "scripted"
    }

    fn post_message(&self, message: WorkerMessage, reply_port: Option<ReplyPort>) -> BridgeResult<()> {
        self.log.lock().unwrap().push(message.clone());
        self.outbox.send((message, reply_port)).ok();
        Ok(())
    }
}

/// Worker whose transport refuses audio commands and records the rest.
#[derive(Default)]
struct AudioRefusingWorker {
    log: Mutex<Vec<WorkerMessage>>,
}

impl WorkerHandle for AudioRefusingWorker {
    fn id(&self) -> &str {
        "audio-refusing"
    }

    fn post_message(&self, message: WorkerMessage, _reply_port: Option<ReplyPort>) -> BridgeResult<()> {
        if message["type"] == "CACHE_AUDIO" {
            return Err(BridgeError::ChannelClosed);
        }
        self.log.lock().unwrap().push(message);
        Ok(())
    }
}

struct ScriptedHost {
    worker: Arc<dyn WorkerHandle>,
    active: bool,
    controlling: bool,
}

#[async_trait]
impl WorkerHost for ScriptedHost {
    fn is_supported(&self) -> bool {
        true
    }

    async fn wait_until_active(&self) -> BridgeResult<Arc<dyn WorkerHandle>> {
        if !self.active {
            std::future::pending::<()>().await;
        }
        Ok(self.worker.clone())
    }

    fn controller(&self) -> Option<Arc<dyn WorkerHandle>> {
        self.controlling.then(|| self.worker.clone())
    }
}

type Inbox = mpsc::UnboundedReceiver<(WorkerMessage, Option<ReplyPort>)>;

fn scripted(active: bool, controlling: bool) -> (Arc<CacheCoordinator>, Arc<ScriptedWorker>, Inbox) {
    let (outbox, inbox) = mpsc::unbounded_channel();
    let worker = Arc::new(ScriptedWorker {
        outbox,
        log: Mutex::new(Vec::new()),
    });
    let host = Arc::new(ScriptedHost {
        worker: worker.clone(),
        active,
        controlling,
    });
    (Arc::new(CacheCoordinator::new(host)), worker, inbox)
}

fn status_reply(static_assets: u64, audio: u64, images: u64, api: u64) -> WorkerMessage {
    json!({
        "type": "CACHE_STATUS",
        "static": static_assets,
        "audio": audio,
        "images": images,
        "api": api,
    })
}

#[tokio::test]
async fn test_clear_category_sends_one_command_and_returns() {
    let (coordinator, worker, mut inbox) = scripted(true, true);

    for category in CacheCategory::ALL {
        coordinator.clear_category(category).await;
    }

    assert_eq!(
        worker.sent(),
        vec![
            json!({ "type": "CLEAR_CACHE", "cacheName": "static" }),
            json!({ "type": "CLEAR_CACHE", "cacheName": "audio" }),
            json!({ "type": "CLEAR_CACHE", "cacheName": "images" }),
            json!({ "type": "CLEAR_CACHE", "cacheName": "api" }),
        ]
    );
    while let Ok((_, port)) = inbox.try_recv() {
        assert!(port.is_none());
    }
}

#[tokio::test]
async fn test_clear_all_sends_single_command() {
    let (coordinator, worker, _inbox) = scripted(true, true);

    coordinator.clear_all().await;

    assert_eq!(worker.sent(), vec![json!({ "type": "CLEAR_ALL_CACHES" })]);
}

#[tokio::test(start_paused = true)]
async fn test_status_gives_up_after_deadline_when_worker_is_silent() {
    let (coordinator, worker, _inbox) = scripted(true, true);

    let started = tokio::time::Instant::now();
    assert!(coordinator.get_status().await.is_none());
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_millis(5000));
    assert!(elapsed < Duration::from_millis(5050));
    assert_eq!(worker.sent(), vec![json!({ "type": "GET_CACHE_STATUS" })]);
}

#[tokio::test(start_paused = true)]
async fn test_status_gives_up_when_worker_never_activates() {
    let (coordinator, worker, _inbox) = scripted(false, false);

    let started = tokio::time::Instant::now();
    assert!(coordinator.get_status().await.is_none());

    assert!(started.elapsed() >= Duration::from_millis(5000));
    assert!(worker.sent().is_empty());
    assert!(!coordinator.is_worker_ready());
}

#[tokio::test]
async fn test_status_round_trip() {
    let (coordinator, _worker, mut inbox) = scripted(true, true);

    let query = tokio::spawn({
        let coordinator = coordinator.clone();
        async move { coordinator.get_status().await }
    });

    let (message, port) = inbox.recv().await.unwrap();
    assert_eq!(message, json!({ "type": "GET_CACHE_STATUS" }));
    port.expect("status query carries a reply port")
        .post(status_reply(3, 7, 2, 1))
        .unwrap();

    let status = query.await.unwrap().unwrap();
    assert_eq!(
        status,
        CacheStatusReport {
            static_assets: 3,
            audio: 7,
            images: 2,
            api: 1,
        }
    );
    assert_eq!(status.total(), 13);
}

#[tokio::test]
async fn test_concurrent_queries_receive_their_own_replies() {
    let (coordinator, _worker, mut inbox) = scripted(true, true);

    let first = tokio::spawn({
        let coordinator = coordinator.clone();
        async move { coordinator.get_status().await }
    });
    let (_, first_port) = inbox.recv().await.unwrap();

    let second = tokio::spawn({
        let coordinator = coordinator.clone();
        async move { coordinator.get_status().await }
    });
    let (_, second_port) = inbox.recv().await.unwrap();

    // Answer in reverse order.
    second_port.unwrap().post(status_reply(0, 2, 0, 0)).unwrap();
    first_port.unwrap().post(status_reply(0, 1, 0, 0)).unwrap();

    assert_eq!(first.await.unwrap().unwrap().audio, 1);
    assert_eq!(second.await.unwrap().unwrap().audio, 2);
}

#[tokio::test]
async fn test_status_with_wrong_reply_type_is_none() {
    let (coordinator, _worker, mut inbox) = scripted(true, true);

    let query = tokio::spawn({
        let coordinator = coordinator.clone();
        async move { coordinator.get_status().await }
    });

    let (_, port) = inbox.recv().await.unwrap();
    port.unwrap()
        .post(json!({ "type": "SOMETHING_ELSE", "static": 1, "audio": 1, "images": 1, "api": 1 }))
        .unwrap();

    assert!(query.await.unwrap().is_none());
}

#[tokio::test]
async fn test_stats_without_controller_fails_without_messaging() {
    let (coordinator, worker, _inbox) = scripted(true, false);

    let err = coordinator.get_stats().await.unwrap_err();
    assert!(matches!(err, CacheError::StatsUnavailable(_)));
    assert!(!coordinator.is_resource_cached("/api/songs/1/stream").await);
    assert!(matches!(
        coordinator.clear_music_cache().await,
        Err(CacheError::StatsUnavailable(_))
    ));
    assert!(worker.sent().is_empty());
}

#[tokio::test]
async fn test_is_resource_cached_matches_substring() {
    let (coordinator, _worker, mut inbox) = scripted(true, true);

    let responder = tokio::spawn(async move {
        while let Some((message, port)) = inbox.recv().await {
            assert_eq!(message, json!({ "type": "GET_CACHE_STATS" }));
            port.unwrap()
                .post(json!({
                    "musicCacheSize": 1,
                    "cacheEntries": ["https://music.example.com/api/songs/1/stream"],
                }))
                .ok();
        }
    });

    assert!(coordinator.is_resource_cached("/api/songs/1/stream").await);
    assert!(!coordinator.is_resource_cached("/api/songs/2/stream").await);

    let stats = coordinator.get_stats().await.unwrap();
    assert_eq!(stats.size_label(), "1 song");

    responder.abort();
}

#[tokio::test]
async fn test_worker_reported_stats_error_is_unavailable() {
    let (coordinator, _worker, mut inbox) = scripted(true, true);

    let query = tokio::spawn({
        let coordinator = coordinator.clone();
        async move { coordinator.get_stats().await }
    });

    let (_, port) = inbox.recv().await.unwrap();
    port.unwrap().post(json!({ "error": "quota exceeded" })).unwrap();

    let err = query.await.unwrap().unwrap_err();
    assert!(matches!(err, CacheError::StatsUnavailable(reason) if reason.contains("quota exceeded")));
}

#[tokio::test(start_paused = true)]
async fn test_stats_time_out_as_unavailable() {
    let (coordinator, _worker, _inbox) = scripted(true, true);

    let err = coordinator.get_stats().await.unwrap_err();
    assert!(matches!(err, CacheError::StatsUnavailable(_)));
}

#[tokio::test]
async fn test_clear_music_cache_reports_worker_outcome() {
    let (coordinator, _worker, mut inbox) = scripted(true, true);

    let responder = tokio::spawn(async move {
        let mut outcomes = vec![false, true].into_iter();
        while let Some((message, port)) = inbox.recv().await {
            assert_eq!(message, json!({ "type": "CLEAR_MUSIC_CACHE" }));
            let success = outcomes.next().unwrap_or(true);
            port.unwrap().post(json!({ "success": success })).ok();
        }
    });

    assert!(matches!(
        coordinator.clear_music_cache().await,
        Err(CacheError::ClearFailed(_))
    ));
    assert!(coordinator.clear_music_cache().await.unwrap());

    responder.abort();
}

#[tokio::test]
async fn test_preload_song_uses_stream_fallback_and_skips_missing_cover() {
    let (coordinator, worker, _inbox) = scripted(true, true);

    coordinator.preload_song(&PreloadTask::new("42")).await;

    assert_eq!(
        worker.sent(),
        vec![json!({ "type": "CACHE_AUDIO", "url": "/api/songs/42/stream" })]
    );
}

#[tokio::test]
async fn test_preload_song_caches_explicit_audio_and_cover() {
    let (coordinator, worker, _inbox) = scripted(true, true);

    let task = PreloadTask::new("7")
        .with_audio_url("https://cdn.example.com/7.mp3")
        .with_cover_url("/api/albums/3/cover");
    coordinator.preload_song(&task).await;

    assert_eq!(
        worker.sent(),
        vec![
            json!({ "type": "CACHE_AUDIO", "url": "https://cdn.example.com/7.mp3" }),
            json!({ "type": "CACHE_IMAGE", "url": "/api/albums/3/cover" }),
        ]
    );
}

#[tokio::test]
async fn test_refused_audio_does_not_stop_cover() {
    let worker = Arc::new(AudioRefusingWorker::default());
    let host = Arc::new(ScriptedHost {
        worker: worker.clone(),
        active: true,
        controlling: true,
    });
    let coordinator = CacheCoordinator::new(host);
    let task = PreloadTask::new("42").with_cover_url("/api/albums/4/cover");

    let result = Preloader::preload(&coordinator, &task).await;
    assert!(matches!(
        result,
        Err(CacheError::Transport(BridgeError::ChannelClosed))
    ));

    coordinator.preload_song(&task).await;

    let cover = json!({ "type": "CACHE_IMAGE", "url": "/api/albums/4/cover" });
    assert_eq!(*worker.log.lock().unwrap(), vec![cover.clone(), cover]);
}

#[tokio::test(start_paused = true)]
async fn test_fire_and_forget_gives_up_when_worker_never_activates() {
    let (coordinator, worker, _inbox) = scripted(false, false);

    let started = tokio::time::Instant::now();
    coordinator.cache_audio("/x.mp3").await;
    assert!(started.elapsed() >= Duration::from_millis(5000));

    assert!(matches!(
        coordinator.try_clear_all().await,
        Err(CacheError::TimedOut { .. })
    ));
    coordinator.preload_playlist(&[PreloadTask::new("1"), PreloadTask::new("2")]).await;
    assert!(worker.sent().is_empty());
}

#[tokio::test]
async fn test_preload_playlist_takes_leading_five() {
    let (coordinator, worker, _inbox) = scripted(true, true);

    let songs: Vec<PreloadTask> = (0..8).map(|i| PreloadTask::new(i.to_string())).collect();
    coordinator.preload_playlist(&songs).await;

    let expected: Vec<WorkerMessage> = (0..5)
        .map(|i| json!({ "type": "CACHE_AUDIO", "url": format!("/api/songs/{}/stream", i) }))
        .collect();
    assert_eq!(worker.sent(), expected);
}

#[tokio::test]
async fn test_preload_playlist_shorter_than_limit() {
    let (coordinator, worker, _inbox) = scripted(true, true);

    let songs = vec![PreloadTask::new("a"), PreloadTask::new("b")];
    coordinator.preload_playlist(&songs).await;

    assert_eq!(worker.sent().len(), 2);
}

#[tokio::test]
async fn test_events_for_discovery_and_clearing() {
    let (outbox, _inbox) = mpsc::unbounded_channel();
    let worker = Arc::new(ScriptedWorker {
        outbox,
        log: Mutex::new(Vec::new()),
    });
    let host = Arc::new(ScriptedHost {
        worker,
        active: true,
        controlling: true,
    });

    let bus = Arc::new(EventBus::new(32));
    let mut events = bus.subscribe();
    let config = CoreConfig::builder()
        .worker_host(host)
        .event_bus(bus.clone())
        .build()
        .unwrap();
    let coordinator = CacheCoordinator::from_config(&config);

    coordinator.clear_category(CacheCategory::Images).await;

    assert_eq!(
        events.recv().await.unwrap(),
        CoreEvent::Worker(WorkerEvent::Ready {
            worker_id: "scripted".to_string()
        })
    );
    assert_eq!(
        events.recv().await.unwrap(),
        CoreEvent::Cache(CacheEvent::CommandDispatched {
            kind: "CLEAR_CACHE".to_string()
        })
    );
    assert_eq!(
        events.recv().await.unwrap(),
        CoreEvent::Cache(CacheEvent::Cleared {
            category: Some("images".to_string())
        })
    );
}

#[tokio::test]
async fn test_offline_signal_follows_monitor() {
    let mut network = MockNetwork::new();
    let mut answers = vec![
        NetworkStatus::Connected,
        NetworkStatus::Disconnected,
        NetworkStatus::Indeterminate,
    ]
    .into_iter();
    network
        .expect_current_status()
        .times(3)
        .returning(move || answers.next().unwrap_or(NetworkStatus::Indeterminate));

    let (coordinator, _worker, _inbox) = scripted(true, true);
    let coordinator = Arc::try_unwrap(coordinator)
        .unwrap()
        .with_network_monitor(Arc::new(network));

    assert!(!coordinator.is_offline());
    assert!(coordinator.is_offline());
    assert!(!coordinator.is_offline());
}

// ============================================================================
// End to end against the in-process worker
// ============================================================================

#[tokio::test]
async fn test_in_process_worker_end_to_end() {
    let host = Arc::new(InProcessWorkerHost::start());
    let worker = host.worker().clone();
    worker.record_fetch("/_next/static/app.js");
    worker.record_fetch("/api/songs?page=1");

    let coordinator = CacheCoordinator::new(host.clone());

    coordinator
        .preload_song(&PreloadTask::new("42").with_cover_url("/api/albums/9/cover"))
        .await;

    let status = coordinator.get_status().await.unwrap();
    assert_eq!(
        status,
        CacheStatusReport {
            static_assets: 1,
            audio: 1,
            images: 1,
            api: 1,
        }
    );
    assert!(coordinator.is_worker_ready());

    let stats = coordinator.get_stats().await.unwrap();
    assert_eq!(stats.music_cache_size, 1);
    assert!(coordinator.is_resource_cached("/api/songs/42/stream").await);
    assert!(!coordinator.is_resource_cached("/api/songs/43/stream").await);

    assert!(coordinator.clear_music_cache().await.unwrap());
    assert_eq!(worker.count(Store::Audio), 0);

    coordinator.clear_category(CacheCategory::Static).await;
    let status = coordinator.get_status().await.unwrap();
    assert_eq!(status.static_assets, 0);
    assert_eq!(status.images, 1);

    coordinator.clear_all().await;
    assert_eq!(coordinator.get_status().await.unwrap().total(), 0);
}

#[tokio::test]
async fn test_in_process_worker_waits_for_activation() {
    let host = Arc::new(InProcessWorkerHost::start_inactive());
    let coordinator = Arc::new(CacheCoordinator::new(host.clone()));

    let caching = tokio::spawn({
        let coordinator = coordinator.clone();
        async move { coordinator.try_cache_audio("/a.mp3").await }
    });
    tokio::task::yield_now().await;
    assert!(!coordinator.is_worker_ready());

    host.activate();
    caching.await.unwrap().unwrap();

    assert!(coordinator.is_worker_ready());
    assert_eq!(coordinator.get_status().await.unwrap().audio, 1);
}

#[tokio::test]
async fn test_in_process_worker_stats_error_and_withheld_control() {
    let host = Arc::new(InProcessWorkerHost::start());
    let coordinator = CacheCoordinator::new(host.clone());

    host.worker().fail_stats(Some("storage locked".to_string()));
    assert!(matches!(
        coordinator.get_stats().await,
        Err(CacheError::StatsUnavailable(reason)) if reason.contains("storage locked")
    ));

    host.worker().fail_stats(None);
    host.set_controlling(false);
    assert!(matches!(
        coordinator.get_stats().await,
        Err(CacheError::StatsUnavailable(_))
    ));

    // Fire-and-forget commands only need an active worker.
    coordinator.cache_image("/covers/1.jpg").await;
    assert_eq!(coordinator.get_status().await.unwrap().images, 1);
}

#[tokio::test]
async fn test_unbounded_query_timeouts_do_not_panic() {
    let host = Arc::new(InProcessWorkerHost::start());
    let settings = CoordinatorSettings {
        status_timeout: Duration::MAX,
        stats_timeout: Duration::MAX,
        clear_timeout: Duration::MAX,
        dispatch_timeout: Duration::MAX,
        ..CoordinatorSettings::default()
    };
    let coordinator = CacheCoordinator::new(host).with_settings(settings);

    coordinator.cache_audio("/api/songs/1/stream").await;
    assert_eq!(coordinator.get_status().await.unwrap().audio, 1);
    assert_eq!(coordinator.get_stats().await.unwrap().music_cache_size, 1);
    assert!(coordinator.clear_music_cache().await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_in_process_worker_slow_replies_hit_deadline() {
    let host = Arc::new(InProcessWorkerHost::start());
    let coordinator = CacheCoordinator::new(host.clone());

    host.worker().set_reply_delay(Duration::from_secs(6));
    assert!(coordinator.get_status().await.is_none());

    host.worker().set_reply_delay(Duration::from_secs(1));
    assert!(coordinator.get_status().await.is_some());
}

#[tokio::test]
async fn test_update_notification_reaches_event_bus() {
    let host = Arc::new(InProcessWorkerHost::start());
    let bus = Arc::new(EventBus::new(16));
    let mut events = bus.subscribe();

    let config = CoreConfig::builder()
        .worker_host(host.clone())
        .event_bus(bus.clone())
        .build()
        .unwrap();
    let coordinator = CacheCoordinator::from_config(&config);
    let watcher = coordinator.watch_lifecycle().unwrap();

    host.announce_update(Some("2.1.0".to_string()));

    let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        event,
        CoreEvent::Worker(WorkerEvent::UpdateAvailable {
            version: Some("2.1.0".to_string())
        })
    );

    watcher.abort();
}
