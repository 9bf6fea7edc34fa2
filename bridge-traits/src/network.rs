//! Network Reachability Signal
//!
//! Exposes the host's view of connectivity as a plain read so status displays
//! can decide whether to fall back to cached media.

/// Network connection status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkStatus {
    /// Connected to network
    Connected,
    /// Not connected to any network
    Disconnected,
    /// Connection status unknown or indeterminate
    Indeterminate,
}

/// Network monitor trait
///
/// Implementations keep the last known status; reading it must not block or
/// perform I/O.
///
/// # Platform Support
///
/// - **Web**: `navigator.onLine`
/// - **Desktop**: periodic TCP probe (`bridge_desktop::DesktopNetworkMonitor`)
///
/// # Example
///
/// ```ignore
/// use bridge_traits::network::NetworkMonitor;
///
/// fn banner(monitor: &dyn NetworkMonitor) -> &'static str {
///     if monitor.is_online() { "" } else { "Offline: playing from cache" }
/// }
/// ```
pub trait NetworkMonitor: Send + Sync {
    /// Last known connectivity status.
    fn current_status(&self) -> NetworkStatus;

    /// Whether the host believes it can reach the network.
    ///
    /// `Indeterminate` counts as online, matching browsers that only report
    /// offline when they are sure.
    fn is_online(&self) -> bool {
        !matches!(self.current_status(), NetworkStatus::Disconnected)
    }
}
