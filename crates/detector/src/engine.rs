//! 탐지 엔진 — 상태 기록, 규칙 평가, 중복 제거
//!
//! # 처리 순서
//! ```text
//! FlowRecord ──▶ StateStore::record_flow ──▶ SourceSnapshot
//!                                               │
//!                           ┌───────────────────┼───────────────────┐
//!                           ▼                   ▼                   ▼
//!                     PortScanRule    SuspiciousProtocolRule   RateLimitRule
//!                           └───────────────────┼───────────────────┘
//!                                               ▼
//!                                 DedupTracker::admit ──▶ Vec<AlertRecord>
//! ```
//!
//! 엔진은 `Arc`로 워커 전체가 공유하며, `evaluate`는 실패하지 않습니다.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::debug;

use sentinel_core::config::DetectionConfig;
use sentinel_core::metrics as m;
use sentinel_core::types::{AggregateStats, AlertRecord, FlowRecord};

use crate::dedup::DedupTracker;
use crate::rules::{Rule, default_rules};
use crate::state::{StateStore, WindowConfig};

/// 탐지 엔진
pub struct DetectionEngine {
    store: Arc<StateStore>,
    rules: Vec<Box<dyn Rule>>,
    dedup: DedupTracker,
}

impl DetectionEngine {
    /// 설정의 기본 규칙 세트로 엔진을 생성합니다.
    pub fn new(config: &DetectionConfig) -> Self {
        Self::with_rules(
            Arc::new(StateStore::new(WindowConfig::from_detection(config))),
            default_rules(config),
        )
    }

    /// 상태 저장소와 규칙을 직접 지정합니다.
    pub fn with_rules(store: Arc<StateStore>, rules: Vec<Box<dyn Rule>>) -> Self {
        Self {
            store,
            rules,
            dedup: DedupTracker::new(),
        }
    }

    /// 플로우 하나를 평가하고 허용된 알림을 반환합니다.
    pub fn evaluate(&self, flow: &FlowRecord) -> Vec<AlertRecord> {
        let Some(snapshot) = self.store.record_flow(flow) else {
            return Vec::new();
        };

        let mut alerts = Vec::new();
        for rule in &self.rules {
            let Some(verdict) = rule.evaluate(flow, &snapshot) else {
                continue;
            };

            if self
                .dedup
                .admit(verdict.rule, flow.src_ip, flow.timestamp, rule.window())
            {
                metrics::counter!(m::DETECTOR_ALERTS_TOTAL, m::LABEL_RULE => verdict.rule.as_str())
                    .increment(1);
                debug!(
                    rule = %verdict.rule,
                    severity = %verdict.severity(),
                    source = %flow.src_ip,
                    dest_port = flow.dst_port,
                    distinct_ports = snapshot.distinct_ports,
                    packets_in_window = snapshot.packets_in_window,
                    "alert raised"
                );
                alerts.push(AlertRecord::from_flow(verdict.rule, flow));
            } else {
                metrics::counter!(m::DETECTOR_SUPPRESSED_TOTAL, m::LABEL_RULE => verdict.rule.as_str())
                    .increment(1);
                debug!(rule = %verdict.rule, source = %flow.src_ip, "alert suppressed by dedup window");
            }
        }
        alerts
    }

    /// 새 실행을 위해 상태와 중복 제거 기록을 비웁니다.
    pub fn reset(&self) {
        self.store.reset();
        self.dedup.clear();
    }

    /// 유휴 출발지와 만료된 중복 제거 항목을 정리합니다.
    ///
    /// 기준 시각은 마지막으로 관찰된 플로우 시각이며, 아직 플로우가 없으면
    /// 아무것도 하지 않습니다. 중복 제거 항목은 가장 긴 규칙 윈도우만큼
    /// 유예한 뒤 제거합니다. 제거된 출발지 수를 반환합니다.
    pub fn cleanup_stale(&self) -> usize {
        let Some(now) = self.store.latest_seen() else {
            return 0;
        };
        self.cleanup_before(now)
    }

    fn cleanup_before(&self, now: DateTime<Utc>) -> usize {
        let grace = self
            .rules
            .iter()
            .map(|rule| rule.window())
            .max()
            .unwrap_or_default();
        let expired = self.dedup.cleanup_expired(now, grace);
        if expired > 0 {
            debug!(expired, "expired dedup entries removed");
        }
        self.store.evict_idle(now)
    }

    pub fn stats(&self) -> AggregateStats {
        self.store.stats()
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    /// 중복 제거로 억제된 판정 수
    pub fn suppressed(&self) -> u64 {
        self.dedup.suppressed()
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

impl Default for DetectionEngine {
    fn default() -> Self {
        Self::new(&DetectionConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use sentinel_core::types::{Protocol, RuleId, Severity};

    fn t(secs: f64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap()
            + chrono::Duration::microseconds((secs * 1_000_000.0) as i64)
    }

    fn tcp(src: &str, dport: u16, secs: f64) -> FlowRecord {
        FlowRecord {
            timestamp: t(secs),
            src_ip: src.parse().unwrap(),
            dst_ip: "192.168.1.10".parse().unwrap(),
            src_port: 40000,
            dst_port: dport,
            protocol: Protocol::Tcp,
            size: 60,
        }
    }

    #[test]
    fn test_engine_default_has_three_rules() {
        assert_eq!(DetectionEngine::default().rule_count(), 3);
    }

    #[test]
    fn test_other_protocol_never_alerts() {
        let engine = DetectionEngine::default();
        for i in 0..500 {
            let mut flow = tcp("10.0.0.5", 0, f64::from(i) * 0.001);
            flow.protocol = Protocol::Other;
            flow.src_port = 0;
            assert!(engine.evaluate(&flow).is_empty());
        }
        assert_eq!(engine.stats().other_packets, 500);
    }

    #[test]
    fn test_port_scan_alert_carries_trigger_flow() {
        let engine = DetectionEngine::default();
        let mut raised = Vec::new();
        for (i, port) in (1000..1010).enumerate() {
            raised.extend(engine.evaluate(&tcp("10.0.0.5", port, i as f64 * 0.1)));
        }
        assert_eq!(raised.len(), 1);
        let alert = &raised[0];
        assert_eq!(alert.rule, RuleId::PortScan);
        assert_eq!(alert.severity, Severity::High);
        assert_eq!(alert.dest_port, 1009);
        assert_eq!(alert.timestamp, t(0.9));
    }

    #[test]
    fn test_suspicious_port_alerts_once_per_window() {
        let engine = DetectionEngine::default();
        let first = engine.evaluate(&tcp("10.0.0.7", 3389, 0.0));
        let second = engine.evaluate(&tcp("10.0.0.7", 3389, 1.0));
        let later = engine.evaluate(&tcp("10.0.0.7", 3389, 10.5));

        assert_eq!(first.len(), 1);
        assert_eq!(first[0].message, "Suspicious protocol usage");
        assert!(second.is_empty());
        assert_eq!(later.len(), 1);
        assert_eq!(engine.suppressed(), 1);
    }

    #[test]
    fn test_reset_forgets_dedup_and_state() {
        let engine = DetectionEngine::default();
        assert_eq!(engine.evaluate(&tcp("10.0.0.7", 23, 0.0)).len(), 1);
        engine.reset();
        assert_eq!(engine.stats().total_packets, 0);
        assert_eq!(engine.evaluate(&tcp("10.0.0.7", 23, 0.5)).len(), 1);
    }

    #[test]
    fn test_cleanup_stale_uses_latest_flow_time() {
        let engine = DetectionEngine::default();
        assert_eq!(engine.cleanup_stale(), 0);

        engine.evaluate(&tcp("10.0.0.1", 80, 0.0));
        engine.evaluate(&tcp("10.0.0.2", 80, 30.0));
        assert_eq!(engine.cleanup_stale(), 1);
        assert_eq!(engine.store().tracked_sources(), 1);
    }

    #[test]
    fn test_late_flow_after_cleanup_does_not_realert() {
        let engine = DetectionEngine::default();
        assert_eq!(engine.evaluate(&tcp("10.0.0.7", 3389, 0.0)).len(), 1);

        // 다른 출발지가 기준 시각을 앞으로 밀고 정리가 실행됨
        engine.evaluate(&tcp("10.0.0.8", 80, 25.0));
        engine.cleanup_stale();

        // 이미 알림을 낸 윈도우 안의 늦은 플로우
        assert!(engine.evaluate(&tcp("10.0.0.7", 3389, 5.0)).is_empty());
        assert_eq!(engine.evaluate(&tcp("10.0.0.7", 3389, 26.0)).len(), 1);
    }
}
