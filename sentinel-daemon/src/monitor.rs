//! Polling view of an active run.
//!
//! `sentinel watch` reads the coordinator through [`RunMonitor`] while the run
//! is in progress. Every accessor is a cheap snapshot and never blocks workers
//! for longer than a counter load or a short buffer lock.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tokio::sync::watch;

use sentinel_alert_sink::RecentAlerts;
use sentinel_capture::FlowExtractor;
use sentinel_core::types::{AggregateStats, AlertRecord};
use sentinel_detector::DetectionEngine;

use crate::coordinator::RunState;

/// Cloneable read-only handle onto a [`ScanCoordinator`](crate::coordinator::ScanCoordinator).
#[derive(Clone)]
pub struct RunMonitor {
    state: watch::Receiver<RunState>,
    engine: Arc<DetectionEngine>,
    extractor: FlowExtractor,
    recent: RecentAlerts,
    emitted: Arc<AtomicU64>,
}

impl RunMonitor {
    pub(crate) fn new(
        state: watch::Receiver<RunState>,
        engine: Arc<DetectionEngine>,
        extractor: FlowExtractor,
        recent: RecentAlerts,
        emitted: Arc<AtomicU64>,
    ) -> Self {
        Self {
            state,
            engine,
            extractor,
            recent,
            emitted,
        }
    }

    pub fn state(&self) -> RunState {
        *self.state.borrow()
    }

    pub fn stats(&self) -> AggregateStats {
        self.engine.stats()
    }

    /// Newest first, at most `n`.
    pub fn recent_alerts(&self, n: usize) -> Vec<AlertRecord> {
        self.recent.latest(n)
    }

    /// Alerts handed to the sink in the current run.
    pub fn alert_count(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }

    pub fn dropped_frames(&self) -> u64 {
        self.extractor.dropped()
    }

    pub fn tracked_sources(&self) -> usize {
        self.engine.store().tracked_sources()
    }

    pub fn status(&self, recent: usize) -> RunStatus {
        RunStatus {
            state: self.state(),
            stats: self.stats(),
            alerts: self.alert_count(),
            dropped_frames: self.dropped_frames(),
            tracked_sources: self.tracked_sources(),
            recent_alerts: self.recent_alerts(recent),
        }
    }

    /// Waits until the coordinator reaches `target`.
    ///
    /// Returns `false` if the coordinator was dropped first.
    pub async fn wait_for(&mut self, target: RunState) -> bool {
        self.state.wait_for(|state| *state == target).await.is_ok()
    }
}

/// Point-in-time status of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunStatus {
    pub state: RunState,
    pub stats: AggregateStats,
    pub alerts: u64,
    pub dropped_frames: u64,
    pub tracked_sources: usize,
    pub recent_alerts: Vec<AlertRecord>,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "state={} {} alerts={} dropped={} sources={}",
            self.state, self.stats, self.alerts, self.dropped_frames, self.tracked_sources
        )
    }
}
