//! Network Monitoring Implementation

use bridge_traits::network::{NetworkMonitor, NetworkStatus};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

const DEFAULT_PROBE_TARGET: &str = "8.8.8.8:53";
const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Desktop network monitor implementation
///
/// Keeps the last known status in an atomic so reads never block. The status
/// starts out `Indeterminate` and is updated by [`DesktopNetworkMonitor::refresh`],
/// which attempts a TCP connection to a well-known endpoint.
///
/// Note: Platform-specific implementations (Linux netlink, macOS SystemConfiguration,
/// Windows WinAPI) would be more robust but require additional dependencies.
#[derive(Debug, Clone)]
pub struct DesktopNetworkMonitor {
    status: Arc<AtomicU8>,
    probe_target: String,
    probe_timeout: Duration,
}

impl DesktopNetworkMonitor {
    /// Create a new network monitor
    pub fn new() -> Self {
        Self {
            status: Arc::new(AtomicU8::new(encode(NetworkStatus::Indeterminate))),
            probe_target: DEFAULT_PROBE_TARGET.to_string(),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
        }
    }

    /// Probe a different `host:port`.
    pub fn with_probe_target(mut self, target: impl Into<String>) -> Self {
        self.probe_target = target.into();
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Record a status observed elsewhere.
    pub fn set_status(&self, status: NetworkStatus) {
        self.status.store(encode(status), Ordering::Release);
    }

    /// Probe connectivity and store the result.
    pub async fn refresh(&self) -> NetworkStatus {
        let status = match tokio::time::timeout(
            self.probe_timeout,
            tokio::net::TcpStream::connect(self.probe_target.as_str()),
        )
        .await
        {
            Ok(Ok(_)) => NetworkStatus::Connected,
            Ok(Err(_)) => NetworkStatus::Disconnected,
            Err(_) => NetworkStatus::Disconnected,
        };

        self.set_status(status);
        debug!(status = ?status, "Network status updated");
        status
    }

    /// Refresh the status every `interval` until the handle is aborted.
    ///
    /// Intervals shorter than 100 ms are raised to 100 ms.
    pub fn spawn_polling(&self, interval: Duration) -> JoinHandle<()> {
        let monitor = self.clone();
        let interval = interval.max(MIN_POLL_INTERVAL);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                monitor.refresh().await;
            }
        })
    }
}

impl Default for DesktopNetworkMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkMonitor for DesktopNetworkMonitor {
    fn current_status(&self) -> NetworkStatus {
        decode(self.status.load(Ordering::Acquire))
    }
}

fn encode(status: NetworkStatus) -> u8 {
    match status {
        NetworkStatus::Connected => 1,
        NetworkStatus::Disconnected => 2,
        NetworkStatus::Indeterminate => 0,
    }
}

fn decode(value: u8) -> NetworkStatus {
    match value {
        1 => NetworkStatus::Connected,
        2 => NetworkStatus::Disconnected,
        _ => NetworkStatus::Indeterminate,
    }
}
