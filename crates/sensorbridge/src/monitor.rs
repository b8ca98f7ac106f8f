//! Pipeline lifecycle.
//!
//! Each pipeline runs its own poll-process-transmit loop. A [`PipelineHandle`]
//! is the only thing shared with the outside: a stop signal the loop checks
//! between iterations (and while sleeping) plus a few counters for status
//! reporting.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;

/// The three acquisition pipelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineKind {
    /// DHT22 humidity/temperature poller.
    Climate,
    /// MAVLink telemetry bridge.
    Telemetry,
    /// AMG88xx fire detection.
    Thermal,
}

impl std::fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Climate => write!(f, "climate"),
            Self::Telemetry => write!(f, "telemetry"),
            Self::Thermal => write!(f, "thermal"),
        }
    }
}

/// Point-in-time status of a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineStatus {
    /// Which pipeline.
    pub kind: PipelineKind,
    /// Whether a stop has been requested.
    pub stopping: bool,
    /// Loop iterations completed.
    pub iterations: u64,
    /// Records or images successfully sent.
    pub transmitted: u64,
    /// Iterations that ended in an error.
    pub failures: u64,
}

#[derive(Debug, Default)]
struct Counters {
    iterations: AtomicU64,
    transmitted: AtomicU64,
    failures: AtomicU64,
}

/// A handle to control a running pipeline.
///
/// This is a lightweight, cloneable handle that can be used to stop a
/// pipeline from another task and to read its counters.
#[derive(Debug, Clone)]
pub struct PipelineHandle {
    kind: PipelineKind,
    stop_signal: Arc<watch::Sender<bool>>,
    counters: Arc<Counters>,
}

impl PipelineHandle {
    /// Create a new pipeline handle.
    #[must_use]
    pub fn new(kind: PipelineKind) -> Self {
        let (stop_signal, _) = watch::channel(false);
        Self {
            kind,
            stop_signal: Arc::new(stop_signal),
            counters: Arc::new(Counters::default()),
        }
    }

    /// Get the pipeline kind.
    #[must_use]
    pub fn kind(&self) -> PipelineKind {
        self.kind
    }

    /// Signal the pipeline to stop.
    pub fn stop(&self) {
        self.stop_signal.send_replace(true);
    }

    /// Check if the stop signal has been sent.
    #[must_use]
    pub fn should_stop(&self) -> bool {
        *self.stop_signal.borrow()
    }

    /// Sleep for `duration` unless a stop is requested first.
    ///
    /// Returns `true` if the full duration elapsed and the loop should go on.
    pub async fn sleep(&self, duration: Duration) -> bool {
        let mut rx = self.stop_signal.subscribe();
        if *rx.borrow_and_update() {
            return false;
        }
        tokio::select! {
            () = tokio::time::sleep(duration) => !self.should_stop(),
            _ = rx.wait_for(|stop| *stop) => false,
        }
    }

    /// Wait until a stop is requested.
    pub async fn stopped(&self) {
        let mut rx = self.stop_signal.subscribe();
        let _ = rx.wait_for(|stop| *stop).await;
    }

    /// Count one completed loop iteration.
    pub fn record_iteration(&self) {
        self.counters.iterations.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one successful transmission.
    pub fn record_transmitted(&self) {
        self.counters.transmitted.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one failed iteration.
    pub fn record_failure(&self) {
        self.counters.failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Get the current status.
    #[must_use]
    pub fn status(&self) -> PipelineStatus {
        PipelineStatus {
            kind: self.kind,
            stopping: self.should_stop(),
            iterations: self.counters.iterations.load(Ordering::Relaxed),
            transmitted: self.counters.transmitted.load(Ordering::Relaxed),
            failures: self.counters.failures.load(Ordering::Relaxed),
        }
    }
}

/// A collection of pipelines that can be stopped together.
#[derive(Debug, Default)]
pub struct PipelineManager {
    handles: Vec<PipelineHandle>,
}

impl PipelineManager {
    /// Create a new pipeline manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a handle for `kind` and manage it.
    pub fn register(&mut self, kind: PipelineKind) -> PipelineHandle {
        let handle = PipelineHandle::new(kind);
        self.handles.push(handle.clone());
        handle
    }

    /// Stop all pipelines.
    pub fn stop_all(&self) {
        for handle in &self.handles {
            handle.stop();
        }
    }

    /// Status of every managed pipeline.
    #[must_use]
    pub fn statuses(&self) -> Vec<PipelineStatus> {
        self.handles.iter().map(PipelineHandle::status).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_kind_display() {
        assert_eq!(PipelineKind::Climate.to_string(), "climate");
        assert_eq!(PipelineKind::Telemetry.to_string(), "telemetry");
        assert_eq!(PipelineKind::Thermal.to_string(), "thermal");
    }

    #[test]
    fn test_handle_new() {
        let handle = PipelineHandle::new(PipelineKind::Climate);
        assert_eq!(handle.kind(), PipelineKind::Climate);
        assert!(!handle.should_stop());
    }

    #[test]
    fn test_handle_stop() {
        let handle = PipelineHandle::new(PipelineKind::Thermal);
        handle.stop();
        assert!(handle.should_stop());
        assert!(handle.status().stopping);
    }

    #[test]
    fn test_handle_clone_shares_signal() {
        let handle1 = PipelineHandle::new(PipelineKind::Telemetry);
        let handle2 = handle1.clone();

        handle1.stop();
        assert!(handle2.should_stop());
    }

    #[test]
    fn test_handle_counters() {
        let handle = PipelineHandle::new(PipelineKind::Climate);
        handle.record_iteration();
        handle.record_iteration();
        handle.record_transmitted();
        handle.record_failure();

        let status = handle.clone().status();
        assert_eq!(status.iterations, 2);
        assert_eq!(status.transmitted, 1);
        assert_eq!(status.failures, 1);
        assert!(!status.stopping);
    }

    #[tokio::test]
    async fn test_sleep_completes() {
        let handle = PipelineHandle::new(PipelineKind::Climate);
        assert!(handle.sleep(Duration::from_millis(5)).await);
    }

    #[tokio::test]
    async fn test_sleep_returns_early_when_stopped() {
        let handle = PipelineHandle::new(PipelineKind::Climate);
        let stopper = handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            stopper.stop();
        });

        let started = std::time::Instant::now();
        assert!(!handle.sleep(Duration::from_secs(30)).await);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_sleep_after_stop_is_immediate() {
        let handle = PipelineHandle::new(PipelineKind::Thermal);
        handle.stop();
        assert!(!handle.sleep(Duration::from_secs(30)).await);
    }

    #[tokio::test]
    async fn test_stopped_resolves() {
        let handle = PipelineHandle::new(PipelineKind::Telemetry);
        let waiter = handle.clone();
        let task = tokio::spawn(async move { waiter.stopped().await });
        handle.stop();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_manager_register_and_stop_all() {
        let mut manager = PipelineManager::new();
        let climate = manager.register(PipelineKind::Climate);
        let thermal = manager.register(PipelineKind::Thermal);
        assert!(!climate.should_stop());

        manager.stop_all();
        assert!(climate.should_stop());
        assert!(thermal.should_stop());
        assert!(manager.statuses().iter().all(|s| s.stopping));
    }

    #[test]
    fn test_manager_statuses() {
        let mut manager = PipelineManager::new();
        let handle = manager.register(PipelineKind::Thermal);
        handle.record_transmitted();

        let statuses = manager.statuses();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].kind, PipelineKind::Thermal);
        assert_eq!(statuses[0].transmitted, 1);
    }
}
