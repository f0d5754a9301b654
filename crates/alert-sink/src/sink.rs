//! 알림 기록 태스크
//!
//! 워커는 [`AlertEmitter`]로 알림을 넘기고, 전용 기록 태스크 하나만 컬렉션과
//! 저장 대상을 소유합니다. 파일 핸들은 태스크 밖으로 공유되지 않습니다.
//!
//! ```text
//! worker ─┐
//! worker ─┼─▶ AlertEmitter ──(mpsc)──▶ writer task ──▶ CollectionStore
//! worker ─┘                                 │
//!                                           └──▶ RecentAlerts
//! ```
//!
//! 명령 채널은 FIFO이므로 `finalize()` 이전에 `emit()`이 완료된 알림은 모두
//! 최종 컬렉션에 포함됩니다.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use sentinel_core::config::SinkConfig;
use sentinel_core::error::SinkError;
use sentinel_core::metrics as m;
use sentinel_core::types::AlertRecord;

use crate::recent::RecentAlerts;
use crate::store::CollectionStore;

/// 기록 실패 시 총 시도 횟수
const MAX_WRITE_ATTEMPTS: u32 = 2;

enum Command {
    Alert(AlertRecord),
    Finalize(oneshot::Sender<Result<FinalizeReport, SinkError>>),
    Shutdown,
}

/// 최종 기록 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizeReport {
    /// 기록된 알림 수
    pub alert_count: usize,
    /// 저장 위치
    pub location: String,
    /// 성공까지 걸린 시도 횟수
    pub attempts: u32,
}

/// 워커가 복제해서 쓰는 알림 전달 핸들
#[derive(Clone)]
pub struct AlertEmitter {
    tx: mpsc::Sender<Command>,
}

impl AlertEmitter {
    /// 알림을 기록 태스크로 넘깁니다.
    ///
    /// 채널이 가득 차면 대기하며, 기록 태스크가 종료되었으면 `ChannelClosed`를 반환합니다.
    pub async fn emit(&self, alert: AlertRecord) -> Result<(), SinkError> {
        self.tx
            .send(Command::Alert(alert))
            .await
            .map_err(|_| SinkError::ChannelClosed)
    }
}

/// 알림 기록기 제어 핸들
pub struct AlertSink {
    tx: mpsc::Sender<Command>,
    task: Option<JoinHandle<()>>,
    recent: RecentAlerts,
    received: Arc<AtomicU64>,
    location: String,
}

impl AlertSink {
    /// 기록 태스크를 시작합니다. tokio 런타임 안에서 호출해야 합니다.
    pub fn spawn(config: &SinkConfig, store: Arc<dyn CollectionStore>) -> (Self, AlertEmitter) {
        Self::spawn_with_recent(config, store, RecentAlerts::new(config.recent_capacity))
    }

    /// 외부에서 만든 최근 알림 버퍼를 공유하며 기록 태스크를 시작합니다.
    ///
    /// 실행이 바뀌어도 같은 버퍼를 조회하는 모니터가 있을 때 사용합니다.
    pub fn spawn_with_recent(
        config: &SinkConfig,
        store: Arc<dyn CollectionStore>,
        recent: RecentAlerts,
    ) -> (Self, AlertEmitter) {
        let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
        let received = Arc::new(AtomicU64::new(0));
        let location = store.location();
        let flush_interval =
            (config.flush_interval_secs > 0).then(|| Duration::from_secs(config.flush_interval_secs));

        let writer = Writer {
            store,
            alerts: Vec::new(),
            recent: recent.clone(),
            received: Arc::clone(&received),
            dirty: false,
        };
        let task = tokio::spawn(writer.run(rx, flush_interval));

        info!(location = %location, flush_interval = ?flush_interval, "alert sink started");

        let sink = Self {
            tx: tx.clone(),
            task: Some(task),
            recent,
            received,
            location,
        };
        (sink, AlertEmitter { tx })
    }

    /// 현재까지 받은 전체 컬렉션을 원자적으로 기록합니다.
    ///
    /// 실패 시 한 번 재시도하며 두 번째 실패는 `WriteFailed`입니다.
    /// 새 알림 없이 다시 호출하면 같은 내용을 다시 씁니다.
    pub async fn finalize(&self) -> Result<FinalizeReport, SinkError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Command::Finalize(reply_tx))
            .await
            .map_err(|_| SinkError::ChannelClosed)?;
        reply_rx.await.map_err(|_| SinkError::ChannelClosed)?
    }

    /// 기록 태스크를 종료하고 합류합니다. 기록되지 않은 알림은 버려집니다.
    pub async fn shutdown(mut self) -> Result<(), SinkError> {
        // 태스크가 이미 끝났으면 전송 실패는 무시
        let _ = self.tx.send(Command::Shutdown).await;
        match self.task.take() {
            Some(task) => task.await.map_err(|e| SinkError::TaskJoin(e.to_string())),
            None => Ok(()),
        }
    }

    /// 기록 태스크가 받은 알림 수
    pub fn alert_count(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    pub fn recent(&self) -> &RecentAlerts {
        &self.recent
    }

    pub fn location(&self) -> &str {
        &self.location
    }
}

impl Drop for AlertSink {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// =============================================================================
// 기록 태스크
// =============================================================================

struct Writer {
    store: Arc<dyn CollectionStore>,
    alerts: Vec<AlertRecord>,
    recent: RecentAlerts,
    received: Arc<AtomicU64>,
    /// 마지막 기록 이후 새 알림이 있음
    dirty: bool,
}

impl Writer {
    async fn run(mut self, mut rx: mpsc::Receiver<Command>, flush_interval: Option<Duration>) {
        let mut ticker = flush_interval.map(|period| {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        loop {
            tokio::select! {
                command = rx.recv() => match command {
                    Some(Command::Alert(alert)) => self.accept(alert),
                    Some(Command::Finalize(reply)) => {
                        let result = self.write_with_retry().await;
                        if reply.send(result).is_err() {
                            debug!("finalize requester dropped before reply");
                        }
                    }
                    Some(Command::Shutdown) | None => break,
                },
                _ = next_tick(&mut ticker), if self.dirty => {
                    if let Err(e) = self.write_with_retry().await {
                        warn!(error = %e, "periodic alert checkpoint failed");
                    }
                }
            }
        }

        debug!(alerts = self.alerts.len(), "alert sink writer stopped");
    }

    fn accept(&mut self, alert: AlertRecord) {
        metrics::counter!(m::SINK_ALERTS_RECEIVED_TOTAL, m::LABEL_RULE => alert.rule.as_str())
            .increment(1);
        self.received.fetch_add(1, Ordering::Relaxed);
        self.recent.push(alert.clone());
        self.alerts.push(alert);
        self.dirty = true;
    }

    async fn write_with_retry(&mut self) -> Result<FinalizeReport, SinkError> {
        let mut attempt = 1;
        loop {
            match self.write_once().await {
                Ok(()) => {
                    self.dirty = false;
                    info!(
                        alerts = self.alerts.len(),
                        location = %self.store.location(),
                        attempts = attempt,
                        "alert collection written"
                    );
                    return Ok(FinalizeReport {
                        alert_count: self.alerts.len(),
                        location: self.store.location(),
                        attempts: attempt,
                    });
                }
                Err(SinkError::WriteFailed { reason, .. }) if attempt < MAX_WRITE_ATTEMPTS => {
                    warn!(
                        location = %self.store.location(),
                        attempt,
                        reason = %reason,
                        "alert collection write failed, retrying"
                    );
                    attempt += 1;
                }
                Err(SinkError::WriteFailed { path, reason, .. }) => {
                    return Err(SinkError::WriteFailed {
                        path,
                        attempts: attempt,
                        reason,
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn write_once(&self) -> Result<(), SinkError> {
        let store = Arc::clone(&self.store);
        let alerts = self.alerts.clone();
        let started = Instant::now();

        let result = tokio::task::spawn_blocking(move || store.persist(&alerts))
            .await
            .unwrap_or_else(|e| Err(SinkError::TaskJoin(e.to_string())));

        let label = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(m::SINK_WRITES_TOTAL, m::LABEL_RESULT => label).increment(1);
        metrics::histogram!(m::SINK_WRITE_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
        result
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
