//! Shard Health Monitor
//!
//! One monitor per shard probes it on a fixed cadence and owns the shard's
//! liveness flag. Data-path outcomes never touch the flag.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::domain::ports::{Liveness, Probe};
use crate::metrics::SHARD_ALIVE;
use crate::task::TaskHandle;

/// Default pause between probes
pub const DEFAULT_HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(5);

/// Periodic prober of one shard
pub struct HealthMonitor {
    probe: Arc<dyn Probe>,
    liveness: Liveness,
    interval: Duration,
}

impl std::fmt::Debug for HealthMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthMonitor")
            .field("addr", &self.probe.addr())
            .field("alive", &self.liveness.is_alive())
            .field("interval", &self.interval)
            .finish()
    }
}

impl HealthMonitor {
    /// Create a monitor writing probe outcomes into `liveness`
    pub fn new(probe: Arc<dyn Probe>, liveness: Liveness, interval: Duration) -> Self {
        Self {
            probe,
            liveness,
            interval,
        }
    }

    /// Probed shard address
    pub fn addr(&self) -> &str {
        self.probe.addr()
    }

    /// Probe once and store the outcome, logging transitions
    pub async fn probe_once(&self) -> bool {
        let alive = self.probe.probe().await;
        let was_alive = self.liveness.set(alive);

        if was_alive && !alive {
            error!("storage {:?} is not alive anymore", self.addr());
        } else if !was_alive && alive {
            info!("storage {:?} is alive", self.addr());
        }

        SHARD_ALIVE
            .with_label_values(&[self.addr()])
            .set(i64::from(alive));
        alive
    }

    /// Probe once, then keep probing every interval in the background.
    ///
    /// The flag holds a real probe result when this returns.
    pub async fn start(self, parent: &CancellationToken) -> TaskHandle {
        let alive = self.probe_once().await;
        info!("health check status {:?} is alive: {}", self.addr(), alive);

        let name = format!("health-monitor {}", self.addr());
        TaskHandle::spawn(name, parent, move |cancel| async move {
            self.run(cancel).await;
        })
    }

    async fn run(&self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Health monitor for {:?} shutting down", self.addr());
                    break;
                }
                _ = tokio::time::sleep(self.interval) => {
                    self.probe_once().await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;

    struct ScriptedProbe {
        up: AtomicBool,
        calls: AtomicUsize,
    }

    impl ScriptedProbe {
        fn new(up: bool) -> Arc<Self> {
            Arc::new(Self {
                up: AtomicBool::new(up),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Probe for ScriptedProbe {
        async fn probe(&self) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.up.load(Ordering::SeqCst)
        }

        fn addr(&self) -> &str {
            "scripted"
        }
    }

    #[tokio::test]
    async fn test_probe_once_updates_flag() {
        let probe = ScriptedProbe::new(true);
        let flag = Liveness::new();
        let monitor = HealthMonitor::new(probe.clone(), flag.clone(), Duration::from_secs(60));

        assert!(monitor.probe_once().await);
        assert!(flag.is_alive());

        probe.up.store(false, Ordering::SeqCst);
        assert!(!monitor.probe_once().await);
        assert!(!flag.is_alive());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_probes_before_returning() {
        let probe = ScriptedProbe::new(true);
        let flag = Liveness::new();
        let root = CancellationToken::new();

        let handle = HealthMonitor::new(probe.clone(), flag.clone(), Duration::from_secs(5))
            .start(&root)
            .await;

        assert!(flag.is_alive());
        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_follows_transitions() {
        let probe = ScriptedProbe::new(true);
        let flag = Liveness::new();
        let root = CancellationToken::new();

        let handle = HealthMonitor::new(probe.clone(), flag.clone(), Duration::from_secs(5))
            .start(&root)
            .await;

        probe.up.store(false, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5_500)).await;
        assert!(!flag.is_alive());

        probe.up.store(true, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(flag.is_alive());
        assert_eq!(probe.calls.load(Ordering::SeqCst), 3);

        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_ends_probing() {
        let probe = ScriptedProbe::new(true);
        let root = CancellationToken::new();

        let handle = HealthMonitor::new(probe.clone(), Liveness::new(), Duration::from_secs(1))
            .start(&root)
            .await;
        handle.stop().await;

        let calls = probe.calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(probe.calls.load(Ordering::SeqCst), calls);
    }
}
