//! Process-wide coordinator.
//!
//! One coordinator per process means one readiness handshake with the worker.
//! The first installed coordinator wins; later installs get the existing one.

use std::sync::{Arc, OnceLock};

use core_runtime::config::CoreConfig;
use tracing::debug;

use crate::coordinator::CacheCoordinator;

static SHARED: OnceLock<Arc<CacheCoordinator>> = OnceLock::new();

/// Install `coordinator` as the shared instance and return the shared instance.
pub fn install(coordinator: CacheCoordinator) -> Arc<CacheCoordinator> {
    let mut installed = false;
    let shared = SHARED.get_or_init(|| {
        installed = true;
        Arc::new(coordinator)
    });

    if !installed {
        debug!("Shared cache coordinator already installed; keeping the existing one");
    }

    Arc::clone(shared)
}

/// Build a coordinator from `config` and install it.
pub fn install_from_config(config: &CoreConfig) -> Arc<CacheCoordinator> {
    if let Some(existing) = SHARED.get() {
        return Arc::clone(existing);
    }
    install(CacheCoordinator::from_config(config))
}

/// The shared coordinator, if one was installed.
pub fn shared() -> Option<Arc<CacheCoordinator>> {
    SHARED.get().cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bridge_traits::error::Result as BridgeResult;
    use bridge_traits::{WorkerHandle, WorkerHost};
    use core_runtime::config::CoordinatorSettings;
    use std::time::Duration;

    struct NoWorker;

    #[async_trait]
    impl WorkerHost for NoWorker {
        fn is_supported(&self) -> bool {
            false
        }

        async fn wait_until_active(&self) -> BridgeResult<Arc<dyn WorkerHandle>> {
            std::future::pending().await
        }

        fn controller(&self) -> Option<Arc<dyn WorkerHandle>> {
            None
        }
    }

    #[test]
    fn test_first_install_wins() {
        let first = install(CacheCoordinator::new(Arc::new(NoWorker)));

        let settings = CoordinatorSettings {
            status_timeout: Duration::from_millis(1),
            ..CoordinatorSettings::default()
        };
        let second = install(CacheCoordinator::new(Arc::new(NoWorker)).with_settings(settings));

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.settings().status_timeout, Duration::from_millis(5000));
        assert!(shared().is_some_and(|s| Arc::ptr_eq(&s, &first)));
    }
}
