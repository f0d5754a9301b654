//! 상태 저장소 — 출발지별 윈도우와 집계 카운터
//!
//! [`StateStore`]는 모든 워커가 공유합니다. 출발지 맵은 `DashMap`으로 샤딩되어
//! 서로 다른 출발지를 처리하는 워커가 같은 락을 두고 경합하지 않습니다.
//! 집계 카운터는 `AtomicU64`이며, `total_packets`는 별도로 저장하지 않고
//! 스냅샷 시점에 `tcp + udp + other`로 계산합니다.

use std::net::IpAddr;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::debug;

use sentinel_core::config::DetectionConfig;
use sentinel_core::metrics as m;
use sentinel_core::types::{AggregateStats, FlowRecord, Protocol};

use crate::window::{ConnectionState, RateWindow};

/// 출발지별 윈도우 크기
#[derive(Debug, Clone, Copy)]
pub struct WindowConfig {
    /// 고유 포트 추적 윈도우
    pub port_window: Duration,
    /// 패킷 속도 윈도우
    pub rate_window: Duration,
}

impl WindowConfig {
    pub fn from_detection(config: &DetectionConfig) -> Self {
        Self {
            port_window: config.port_scan.window(),
            rate_window: config.rate_limit.window(),
        }
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self::from_detection(&DetectionConfig::default())
    }
}

/// 플로우를 기록한 직후의 출발지 상태
///
/// 규칙 평가기의 입력이며, 방금 기록한 플로우가 포함되어 있습니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceSnapshot {
    pub source: IpAddr,
    /// 포트 윈도우 내 고유 목적지 포트 수
    pub distinct_ports: usize,
    /// 속도 윈도우 내 패킷 수
    pub packets_in_window: usize,
}

#[derive(Debug, Default)]
struct SourceState {
    ports: ConnectionState,
    rate: RateWindow,
}

impl SourceState {
    fn latest(&self) -> Option<DateTime<Utc>> {
        match (self.ports.latest(), self.rate.latest()) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }

    fn snapshot(&self, source: IpAddr) -> SourceSnapshot {
        SourceSnapshot {
            source,
            distinct_ports: self.ports.distinct_ports(),
            packets_in_window: self.rate.count(),
        }
    }
}

/// 공유 상태 저장소
#[derive(Debug)]
pub struct StateStore {
    sources: DashMap<IpAddr, SourceState>,
    tcp: AtomicU64,
    udp: AtomicU64,
    other: AtomicU64,
    /// 실행 시작 시각 (UNIX epoch 마이크로초)
    run_start_micros: AtomicI64,
    /// 지금까지 기록된 가장 늦은 플로우 시각 (없으면 `i64::MIN`)
    latest_micros: AtomicI64,
    port_window: chrono::Duration,
    rate_window: chrono::Duration,
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}

impl StateStore {
    pub fn new(windows: WindowConfig) -> Self {
        Self {
            sources: DashMap::new(),
            tcp: AtomicU64::new(0),
            udp: AtomicU64::new(0),
            other: AtomicU64::new(0),
            run_start_micros: AtomicI64::new(Utc::now().timestamp_micros()),
            latest_micros: AtomicI64::new(i64::MIN),
            port_window: to_chrono(windows.port_window),
            rate_window: to_chrono(windows.rate_window),
        }
    }

    /// 플로우를 기록합니다.
    ///
    /// 프로토콜 카운터는 항상 증가합니다. TCP/UDP는 출발지 샤드 락 아래에서
    /// 포트/속도 윈도우를 갱신하고 스냅샷을 반환하며, `Other`는 규칙 대상이
    /// 아니므로 `None`을 반환합니다.
    pub fn record_flow(&self, flow: &FlowRecord) -> Option<SourceSnapshot> {
        let counter = match flow.protocol {
            Protocol::Tcp => &self.tcp,
            Protocol::Udp => &self.udp,
            Protocol::Other => &self.other,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(m::DETECTOR_FLOWS_TOTAL, m::LABEL_PROTOCOL => flow.protocol.as_str())
            .increment(1);

        self.latest_micros
            .fetch_max(flow.timestamp.timestamp_micros(), Ordering::Relaxed);

        if !flow.protocol.is_rule_eligible() {
            return None;
        }

        let mut state = self.sources.entry(flow.src_ip).or_default();
        state
            .ports
            .record(flow.dst_port, flow.timestamp, self.port_window);
        state.rate.record(flow.timestamp, self.rate_window);
        Some(state.snapshot(flow.src_ip))
    }

    /// 집계 통계 스냅샷
    pub fn stats(&self) -> AggregateStats {
        let tcp_packets = self.tcp.load(Ordering::Relaxed);
        let udp_packets = self.udp.load(Ordering::Relaxed);
        let other_packets = self.other.load(Ordering::Relaxed);
        AggregateStats {
            total_packets: tcp_packets + udp_packets + other_packets,
            tcp_packets,
            udp_packets,
            other_packets,
            run_start_time: self.run_start_time(),
        }
    }

    pub fn run_start_time(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_micros(self.run_start_micros.load(Ordering::Relaxed))
            .unwrap_or_default()
    }

    /// 지금까지 기록된 가장 늦은 플로우 시각
    pub fn latest_seen(&self) -> Option<DateTime<Utc>> {
        match self.latest_micros.load(Ordering::Relaxed) {
            i64::MIN => None,
            micros => DateTime::from_timestamp_micros(micros),
        }
    }

    /// 추적 중인 출발지 수
    pub fn tracked_sources(&self) -> usize {
        self.sources.len()
    }

    /// 출발지 하나의 현재 상태 (기록 없이 조회)
    pub fn source_snapshot(&self, source: IpAddr) -> Option<SourceSnapshot> {
        self.sources.get(&source).map(|state| state.snapshot(source))
    }

    /// 모든 상태를 비우고 새 실행 시작 시각을 기록합니다.
    ///
    /// 워커가 실행 중일 때 호출하면 안 됩니다.
    pub fn reset(&self) {
        self.sources.clear();
        self.tcp.store(0, Ordering::Relaxed);
        self.udp.store(0, Ordering::Relaxed);
        self.other.store(0, Ordering::Relaxed);
        self.latest_micros.store(i64::MIN, Ordering::Relaxed);
        self.run_start_micros
            .store(Utc::now().timestamp_micros(), Ordering::Relaxed);
        metrics::gauge!(m::DETECTOR_TRACKED_SOURCES).set(0.0);
    }

    /// 두 윈도우가 모두 비었을 출발지를 제거합니다.
    ///
    /// `now`는 플로우 시각 기준입니다 (재생 시 벽시계가 아님).
    /// 제거된 출발지 수를 반환합니다.
    pub fn evict_idle(&self, now: DateTime<Utc>) -> usize {
        let horizon = self.port_window.max(self.rate_window);
        let before = self.sources.len();
        self.sources.retain(|_, state| match state.latest() {
            Some(latest) => now - latest < horizon,
            None => false,
        });
        let remaining = self.sources.len();
        let evicted = before.saturating_sub(remaining);

        metrics::gauge!(m::DETECTOR_TRACKED_SOURCES).set(remaining as f64);
        if evicted > 0 {
            debug!(evicted, remaining, "idle sources evicted");
        }
        evicted
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new(WindowConfig::default())
    }
}
