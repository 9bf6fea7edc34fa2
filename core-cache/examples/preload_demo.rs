//! # Preload Example
//!
//! Preloads a short playlist through the in-process worker, then prints what
//! the worker holds.
//!
//! Run with: `cargo run --example preload_demo --package core-cache`

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use bridge_desktop::{DesktopNetworkMonitor, InProcessWorkerHost};
use bridge_traits::LogLevel;
use core_cache::{CacheCoordinator, PreloadScheduler, PreloadTask};
use core_runtime::config::CoreConfig;
use core_runtime::events::{EventBus, EventStream};
use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging(
        LoggingConfig::default()
            .with_format(LogFormat::Compact)
            .with_level(LogLevel::Debug),
    )?;

    let host = Arc::new(InProcessWorkerHost::start());
    let bus = Arc::new(EventBus::default());
    let config = CoreConfig::builder()
        .worker_host(host.clone())
        .network_monitor(Arc::new(DesktopNetworkMonitor::new()))
        .event_bus(bus.clone())
        .pacing_delay(Duration::from_millis(50))
        .build()
        .context("invalid cache configuration")?;

    let mut events = EventStream::new(bus.subscribe());
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            println!("[{:?}] {}", event.severity(), event.description());
        }
    });

    let coordinator = Arc::new(CacheCoordinator::from_config(&config));
    let scheduler = PreloadScheduler::new(coordinator.clone(), config.preload)
        .with_event_bus(bus.clone())
        .on_progress(|p| println!("preloaded {}/{} ({}%)", p.completed, p.total, p.percent()));

    let playlist: Vec<PreloadTask> = (1..=8)
        .map(|i| {
            PreloadTask::new(i.to_string())
                .with_title(format!("Track {}", i))
                .with_cover_url(format!("/api/albums/{}/cover", i))
        })
        .collect();

    let report = scheduler.run_playlist(&playlist).await?;
    println!(
        "batch {}: {} of {} succeeded",
        report.batch_id, report.succeeded, report.total
    );

    if let Some(status) = coordinator.get_status().await {
        for (category, count) in status.iter() {
            println!("{:>8}: {}", category, count);
        }
    }

    let stats = coordinator.get_stats().await?;
    println!("music cache: {}", stats.size_label());
    println!(
        "song 3 cached: {}",
        coordinator.is_resource_cached("/api/songs/3/stream").await
    );
    println!("offline: {}", coordinator.is_offline());

    coordinator.clear_music_cache().await?;
    println!("music cache cleared");

    printer.abort();
    Ok(())
}
