//! Scan coordinator -- run lifecycle, capture task and worker pool.
//!
//! One run moves through `Idle -> Running -> Draining -> Finalized`, or ends
//! in `Failed`. The current state is published on a `watch` channel so a
//! [`RunMonitor`] can poll it while the run is in progress.
//!
//! ```text
//!  FrameSource --(blocking thread)--> mpsc(queue_capacity) --> worker x N --> AlertEmitter
//!       ^                                                          |
//!       +-- stop token <-- deadline / cancel / exhaustion          +--> DetectionEngine
//! ```
//!
//! The capture thread uses `blocking_send`: when workers fall behind, a full
//! queue blocks capture instead of growing memory. Frames then back up in the
//! kernel buffer and may be dropped there.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use sentinel_alert_sink::{AlertEmitter, AlertSink, CollectionStore, JsonFileStore, RecentAlerts};
use sentinel_capture::{FlowExtractor, FrameSource, RawFrame, open_source};
use sentinel_core::config::{CaptureConfig, SentinelConfig};
use sentinel_core::error::{CaptureError, SinkError};
use sentinel_core::metrics as m;
use sentinel_core::types::AggregateStats;
use sentinel_detector::DetectionEngine;

use crate::error::RunError;
use crate::monitor::RunMonitor;

/// Lifecycle state of the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Idle,
    Running,
    Draining,
    Finalized,
    Failed,
}

impl RunState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Finalized => "finalized",
            Self::Failed => "failed",
        }
    }

    /// `Finalized` or `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finalized | Self::Failed)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the `Running` phase ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// The scan duration elapsed.
    Deadline,
    /// External cancellation (signal or [`ScanCoordinator::cancel_token`]).
    Cancelled,
    /// An offline source reached its end.
    SourceExhausted,
}

impl fmt::Display for EndReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Deadline => "deadline",
            Self::Cancelled => "cancelled",
            Self::SourceExhausted => "source_exhausted",
        })
    }
}

/// Opens the packet source at the start of each run.
pub trait SourceFactory: Send + Sync {
    fn open(&self, config: &CaptureConfig) -> Result<Box<dyn FrameSource>, CaptureError>;
}

impl<F> SourceFactory for F
where
    F: Fn(&CaptureConfig) -> Result<Box<dyn FrameSource>, CaptureError> + Send + Sync,
{
    fn open(&self, config: &CaptureConfig) -> Result<Box<dyn FrameSource>, CaptureError> {
        self(config)
    }
}

/// Summary of a finalized run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub end_reason: EndReason,
    /// Alerts in the persisted collection
    pub alert_count: usize,
    pub stats: AggregateStats,
    /// Frames handed from the source to the worker queue
    pub frames_captured: u64,
    /// Frames the extractor could not turn into a flow
    pub dropped_frames: u64,
    #[serde(rename = "elapsed_secs", serialize_with = "serialize_secs")]
    pub elapsed: Duration,
    /// Where the collection was written
    pub output: String,
}

fn serialize_secs<S: serde::Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_f64(value.as_secs_f64())
}

#[derive(Debug, Clone, Copy)]
struct CaptureSummary {
    frames: u64,
    exhausted: bool,
}

type CaptureResult = Result<Result<CaptureSummary, CaptureError>, JoinError>;

/// Owns the detection engine and runs scans against it.
///
/// Runs take `&mut self`, so at most one run is active per coordinator.
/// Engine state, drop counters and the recent-alert buffer are reset at the
/// start of every run.
pub struct ScanCoordinator {
    config: SentinelConfig,
    factory: Arc<dyn SourceFactory>,
    store: Arc<dyn CollectionStore>,
    engine: Arc<DetectionEngine>,
    extractor: FlowExtractor,
    recent: RecentAlerts,
    emitted: Arc<AtomicU64>,
    state: watch::Sender<RunState>,
    cancel: CancellationToken,
}

impl ScanCoordinator {
    pub fn new(
        config: SentinelConfig,
        factory: Arc<dyn SourceFactory>,
        store: Arc<dyn CollectionStore>,
    ) -> Self {
        let engine = Arc::new(DetectionEngine::new(&config.detection));
        let recent = RecentAlerts::new(config.sink.recent_capacity);
        let (state, _) = watch::channel(RunState::Idle);

        Self {
            config,
            factory,
            store,
            engine,
            extractor: FlowExtractor::new(),
            recent,
            emitted: Arc::new(AtomicU64::new(0)),
            state,
            cancel: CancellationToken::new(),
        }
    }

    /// Live or offline libpcap source and a JSON file at `sink.output_path`.
    pub fn from_config(config: SentinelConfig) -> Self {
        let store = Arc::new(JsonFileStore::new(&config.sink.output_path));
        Self::new(config, Arc::new(open_source), store)
    }

    /// Read-only view for polling while a run is active.
    pub fn monitor(&self) -> RunMonitor {
        RunMonitor::new(
            self.state.subscribe(),
            Arc::clone(&self.engine),
            self.extractor.clone(),
            self.recent.clone(),
            Arc::clone(&self.emitted),
        )
    }

    /// Token that ends the current run early. Cancellation also applies to later runs.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> RunState {
        *self.state.borrow()
    }

    pub fn config(&self) -> &SentinelConfig {
        &self.config
    }

    /// Runs one scan.
    ///
    /// With `Some(duration)` the run stops at the deadline; with `None` it runs
    /// until cancelled or until an offline source is exhausted.
    pub async fn run(&mut self, duration: Option<Duration>) -> Result<RunReport, RunError> {
        let run_id = Uuid::new_v4();
        let started = Instant::now();

        let result = self.execute(run_id, duration, started).await;

        let (state, label) = match &result {
            Ok(_) => (RunState::Finalized, "finalized"),
            Err(_) => (RunState::Failed, "failed"),
        };
        self.state.send_replace(state);
        metrics::counter!(m::SCAN_RUNS_TOTAL, m::LABEL_RESULT => label).increment(1);
        metrics::histogram!(m::SCAN_DURATION_SECONDS).record(started.elapsed().as_secs_f64());

        match &result {
            Ok(report) => info!(
                run_id = %run_id,
                end_reason = %report.end_reason,
                alerts = report.alert_count,
                stats = %report.stats,
                dropped_frames = report.dropped_frames,
                elapsed_ms = report.elapsed.as_millis() as u64,
                output = %report.output,
                "scan run finalized"
            ),
            Err(e) => error!(run_id = %run_id, error = %e, "scan run failed"),
        }

        result
    }

    async fn execute(
        &self,
        run_id: Uuid,
        duration: Option<Duration>,
        started: Instant,
    ) -> Result<RunReport, RunError> {
        let source = self.factory.open(&self.config.capture)?;
        let workers = self.config.scan.workers.max(1);
        let queue_capacity = self.config.capture.queue_capacity.max(1);

        info!(
            run_id = %run_id,
            source = %source.describe(),
            workers,
            queue_capacity,
            duration = ?duration,
            "starting scan run"
        );
        info!(
            queue_capacity,
            "capture blocks when the frame queue is full; sustained overload drops frames in the kernel"
        );

        self.engine.reset();
        self.extractor.reset();
        self.recent.clear();
        self.emitted.store(0, Ordering::Relaxed);

        let (sink, emitter) = AlertSink::spawn_with_recent(
            &self.config.sink,
            Arc::clone(&self.store),
            self.recent.clone(),
        );

        let stop = CancellationToken::new();
        let (frame_tx, frame_rx) = mpsc::channel(queue_capacity);
        let mut capture = {
            let stop = stop.clone();
            tokio::task::spawn_blocking(move || capture_loop(source, frame_tx, stop))
        };

        let frame_rx = Arc::new(Mutex::new(frame_rx));
        let mut worker_tasks: Vec<JoinHandle<Result<u64, SinkError>>> = (0..workers)
            .map(|id| {
                tokio::spawn(worker_loop(
                    id,
                    Arc::clone(&frame_rx),
                    self.extractor.clone(),
                    Arc::clone(&self.engine),
                    emitter.clone(),
                    Arc::clone(&self.emitted),
                ))
            })
            .collect();
        drop(frame_rx);
        drop(emitter);

        self.state.send_replace(RunState::Running);

        let (end_reason, mut captured) = self.wait_for_end(duration, &mut capture).await;

        self.state.send_replace(RunState::Draining);
        info!(run_id = %run_id, end_reason = %end_reason, "stopping capture, draining workers");
        stop.cancel();

        let grace = self.config.scan.grace_period();
        let drained = tokio::time::timeout(grace, async {
            let capture_result = match captured.take() {
                Some(result) => result,
                None => (&mut capture).await,
            };
            let mut worker_results = Vec::with_capacity(worker_tasks.len());
            for task in worker_tasks.iter_mut() {
                worker_results.push(task.await);
            }
            (capture_result, worker_results)
        })
        .await;

        let Ok((capture_result, worker_results)) = drained else {
            for task in &worker_tasks {
                task.abort();
            }
            self.salvage(&sink).await;
            return Err(RunError::GraceTimeout(grace));
        };

        let summary = match check_tasks(capture_result, worker_results) {
            Ok(summary) => summary,
            Err(e) => {
                self.salvage(&sink).await;
                return Err(e);
            }
        };

        let written = sink.finalize().await?;
        sink.shutdown().await?;

        Ok(RunReport {
            run_id,
            end_reason,
            alert_count: written.alert_count,
            stats: self.engine.stats(),
            frames_captured: summary.frames,
            dropped_frames: self.extractor.dropped(),
            elapsed: started.elapsed(),
            output: written.location,
        })
    }

    /// Waits for the deadline, cancellation or the capture task ending on its own.
    ///
    /// Idle sources are evicted periodically so unbounded runs keep bounded state.
    async fn wait_for_end(
        &self,
        duration: Option<Duration>,
        capture: &mut JoinHandle<Result<CaptureSummary, CaptureError>>,
    ) -> (EndReason, Option<CaptureResult>) {
        let deadline = async {
            match duration {
                Some(d) => tokio::time::sleep(d).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(deadline);

        let period = self.eviction_period();
        let mut eviction = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        eviction.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = &mut deadline => return (EndReason::Deadline, None),
                _ = self.cancel.cancelled() => return (EndReason::Cancelled, None),
                joined = &mut *capture => return (EndReason::SourceExhausted, Some(joined)),
                _ = eviction.tick() => {
                    let evicted = self.engine.cleanup_stale();
                    if evicted > 0 {
                        debug!(evicted, "evicted idle detection state");
                    }
                }
            }
        }
    }

    fn eviction_period(&self) -> Duration {
        let detection = &self.config.detection;
        let secs = detection
            .port_scan
            .window_secs
            .max(detection.rate_limit.window_secs)
            .max(1);
        Duration::from_secs(secs)
    }

    /// Best-effort write of the alerts gathered so far before reporting a failure.
    async fn salvage(&self, sink: &AlertSink) {
        match sink.finalize().await {
            Ok(report) => warn!(
                alerts = report.alert_count,
                location = %report.location,
                "wrote partial alert collection for failed run"
            ),
            Err(e) => warn!(error = %e, "could not write partial alert collection"),
        }
    }
}

fn check_tasks(
    capture: CaptureResult,
    workers: Vec<Result<Result<u64, SinkError>, JoinError>>,
) -> Result<CaptureSummary, RunError> {
    let summary = match capture {
        Ok(Ok(summary)) => summary,
        Ok(Err(e)) => return Err(e.into()),
        Err(e) => return Err(RunError::WorkerPanic(format!("capture task: {e}"))),
    };

    for (id, result) in workers.into_iter().enumerate() {
        match result {
            Ok(Ok(flows)) => debug!(worker = id, flows, "worker joined"),
            Ok(Err(e)) => return Err(e.into()),
            Err(e) => return Err(RunError::WorkerPanic(format!("worker {id}: {e}"))),
        }
    }

    Ok(summary)
}

// =============================================================================
// Capture thread
// =============================================================================

/// Reads frames until stopped, exhausted, or the workers are gone.
///
/// The stop token is checked after every read, so a live source stops within
/// one read timeout.
fn capture_loop(
    mut source: Box<dyn FrameSource>,
    frames: mpsc::Sender<RawFrame>,
    stop: CancellationToken,
) -> Result<CaptureSummary, CaptureError> {
    let mut summary = CaptureSummary {
        frames: 0,
        exhausted: false,
    };
    let mut backpressure_logged = false;

    while !stop.is_cancelled() {
        let frame = match source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => continue,
            Err(CaptureError::Exhausted) => {
                summary.exhausted = true;
                info!(frames = summary.frames, source = %source.describe(), "capture source exhausted");
                break;
            }
            Err(e) => {
                error!(error = %e, source = %source.describe(), "capture read failed");
                return Err(e);
            }
        };

        match frames.try_send(frame) {
            Ok(()) => {}
            Err(TrySendError::Full(frame)) => {
                if !backpressure_logged {
                    warn!("frame queue full, capture is waiting on workers");
                    backpressure_logged = true;
                }
                if frames.blocking_send(frame).is_err() {
                    break;
                }
            }
            Err(TrySendError::Closed(_)) => break,
        }
        summary.frames += 1;
        let depth = frames.max_capacity() - frames.capacity();
        metrics::gauge!(m::CAPTURE_QUEUE_DEPTH).set(depth as f64);
    }

    debug!(frames = summary.frames, exhausted = summary.exhausted, "capture loop stopped");
    Ok(summary)
}

// =============================================================================
// Workers
// =============================================================================

async fn worker_loop(
    id: usize,
    frames: Arc<Mutex<mpsc::Receiver<RawFrame>>>,
    extractor: FlowExtractor,
    engine: Arc<DetectionEngine>,
    emitter: AlertEmitter,
    emitted: Arc<AtomicU64>,
) -> Result<u64, SinkError> {
    metrics::gauge!(m::SCAN_ACTIVE_WORKERS).increment(1.0);
    let result = process_frames(&frames, &extractor, &engine, &emitter, &emitted).await;
    metrics::gauge!(m::SCAN_ACTIVE_WORKERS).decrement(1.0);

    if let Err(e) = &result {
        warn!(worker = id, error = %e, "worker stopped early");
    }
    result
}

/// Drains the queue until the capture side closes it.
async fn process_frames(
    frames: &Mutex<mpsc::Receiver<RawFrame>>,
    extractor: &FlowExtractor,
    engine: &DetectionEngine,
    emitter: &AlertEmitter,
    emitted: &AtomicU64,
) -> Result<u64, SinkError> {
    let mut flows = 0u64;
    loop {
        let next = frames.lock().await.recv().await;
        let Some(frame) = next else {
            return Ok(flows);
        };
        let Some(flow) = extractor.process(&frame) else {
            continue;
        };
        flows += 1;

        for alert in engine.evaluate(&flow) {
            info!(
                rule = %alert.rule,
                severity = %alert.severity,
                source_ip = %alert.source_ip,
                dest_ip = %alert.dest_ip,
                dest_port = alert.dest_port,
                protocol = %alert.protocol,
                "{}",
                alert.message
            );
            emitter.emit(alert).await?;
            emitted.fetch_add(1, Ordering::Relaxed);
        }
    }
}
