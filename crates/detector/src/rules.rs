//! 탐지 규칙 — 출발지 스냅샷 기반 판정
//!
//! 모든 규칙은 순수 함수입니다. 입력은 방금 기록한 플로우와 그 출발지의
//! [`SourceSnapshot`], 그리고 규칙 자신의 설정뿐이며 상태를 변경하지 않습니다.
//! 규칙끼리는 서로 억제하지 않으므로 한 플로우가 여러 판정을 낼 수 있습니다.
//!
//! # 규칙
//! | 규칙 | 조건 | 심각도 |
//! |------|------|--------|
//! | [`PortScanRule`] | 윈도우 내 고유 포트 수 `>=` 임계값 | High |
//! | [`SuspiciousProtocolRule`] | `(프로토콜, 목적지 포트)`가 금지 목록에 있음 | Medium |
//! | [`RateLimitRule`] | 윈도우 내 패킷 수 `>` 임계값 | Low |

use std::collections::HashSet;
use std::time::Duration;

use sentinel_core::config::{DetectionConfig, PortScanConfig, RateLimitConfig, SuspiciousConfig};
use sentinel_core::types::{FlowRecord, Protocol, RuleId, Severity};

use crate::state::SourceSnapshot;

/// 규칙 판정 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub rule: RuleId,
}

impl Verdict {
    pub fn new(rule: RuleId) -> Self {
        Self { rule }
    }

    pub fn severity(&self) -> Severity {
        self.rule.severity()
    }
}

/// 탐지 규칙 인터페이스
///
/// 엔진은 규칙을 `Arc`로 공유된 상태에서 여러 워커가 동시에 호출합니다.
pub trait Rule: Send + Sync {
    fn id(&self) -> RuleId;

    /// 같은 출발지에 대해 알림을 한 번만 낼 중복 제거 윈도우
    fn window(&self) -> Duration;

    fn evaluate(&self, flow: &FlowRecord, snapshot: &SourceSnapshot) -> Option<Verdict>;
}

/// 설정에서 기본 규칙 세트를 만듭니다.
///
/// 의심 포트 규칙은 비활성화되어 있거나 목록이 비어 있으면 제외합니다.
pub fn default_rules(config: &DetectionConfig) -> Vec<Box<dyn Rule>> {
    let mut rules: Vec<Box<dyn Rule>> = vec![Box::new(PortScanRule::new(&config.port_scan))];
    if config.suspicious.enabled && !config.suspicious.entries.is_empty() {
        rules.push(Box::new(SuspiciousProtocolRule::new(&config.suspicious)));
    }
    rules.push(Box::new(RateLimitRule::new(&config.rate_limit)));
    rules
}

// =============================================================================
// 포트 스캔
// =============================================================================

/// 포트 스캔 규칙
#[derive(Debug, Clone)]
pub struct PortScanRule {
    threshold: usize,
    window: Duration,
}

impl PortScanRule {
    pub fn new(config: &PortScanConfig) -> Self {
        Self {
            threshold: config.threshold,
            window: config.window(),
        }
    }
}

impl Rule for PortScanRule {
    fn id(&self) -> RuleId {
        RuleId::PortScan
    }

    fn window(&self) -> Duration {
        self.window
    }

    fn evaluate(&self, _flow: &FlowRecord, snapshot: &SourceSnapshot) -> Option<Verdict> {
        (snapshot.distinct_ports >= self.threshold).then(|| Verdict::new(self.id()))
    }
}

// =============================================================================
// 의심 프로토콜/포트
// =============================================================================

/// 금지된 `(프로토콜, 목적지 포트)` 조합 규칙
#[derive(Debug, Clone)]
pub struct SuspiciousProtocolRule {
    table: HashSet<(Protocol, u16)>,
    window: Duration,
}

impl SuspiciousProtocolRule {
    pub fn new(config: &SuspiciousConfig) -> Self {
        Self {
            table: config
                .entries
                .iter()
                .map(|entry| (entry.protocol, entry.port))
                .collect(),
            window: config.window(),
        }
    }

    pub fn is_listed(&self, protocol: Protocol, port: u16) -> bool {
        self.table.contains(&(protocol, port))
    }
}

impl Rule for SuspiciousProtocolRule {
    fn id(&self) -> RuleId {
        RuleId::SuspiciousProtocol
    }

    fn window(&self) -> Duration {
        self.window
    }

    fn evaluate(&self, flow: &FlowRecord, _snapshot: &SourceSnapshot) -> Option<Verdict> {
        self.is_listed(flow.protocol, flow.dst_port)
            .then(|| Verdict::new(self.id()))
    }
}

// =============================================================================
// 속도 제한
// =============================================================================

/// 패킷 속도 규칙
#[derive(Debug, Clone)]
pub struct RateLimitRule {
    threshold: usize,
    window: Duration,
}

impl RateLimitRule {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self {
            threshold: config.threshold,
            window: config.window(),
        }
    }
}

impl Rule for RateLimitRule {
    fn id(&self) -> RuleId {
        RuleId::RateLimit
    }

    fn window(&self) -> Duration {
        self.window
    }

    fn evaluate(&self, _flow: &FlowRecord, snapshot: &SourceSnapshot) -> Option<Verdict> {
        (snapshot.packets_in_window > self.threshold).then(|| Verdict::new(self.id()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sentinel_core::config::SuspiciousPortEntry;

    fn flow(protocol: Protocol, dport: u16) -> FlowRecord {
        FlowRecord {
            timestamp: Utc::now(),
            src_ip: "10.0.0.5".parse().unwrap(),
            dst_ip: "192.168.1.10".parse().unwrap(),
            src_port: 40000,
            dst_port: dport,
            protocol,
            size: 60,
        }
    }

    fn snapshot(distinct_ports: usize, packets_in_window: usize) -> SourceSnapshot {
        SourceSnapshot {
            source: "10.0.0.5".parse().unwrap(),
            distinct_ports,
            packets_in_window,
        }
    }

    #[test]
    fn test_port_scan_fires_at_threshold() {
        let rule = PortScanRule::new(&PortScanConfig::default());
        let f = flow(Protocol::Tcp, 30);
        assert!(rule.evaluate(&f, &snapshot(9, 9)).is_none());

        let verdict = rule.evaluate(&f, &snapshot(10, 10)).unwrap();
        assert_eq!(verdict.rule, RuleId::PortScan);
        assert_eq!(verdict.severity(), Severity::High);
    }

    #[test]
    fn test_rate_limit_fires_only_above_threshold() {
        let rule = RateLimitRule::new(&RateLimitConfig::default());
        let f = flow(Protocol::Udp, 53);
        assert!(rule.evaluate(&f, &snapshot(1, 100)).is_none());

        let verdict = rule.evaluate(&f, &snapshot(1, 101)).unwrap();
        assert_eq!(verdict.rule, RuleId::RateLimit);
        assert_eq!(verdict.severity(), Severity::Low);
    }

    #[test]
    fn test_suspicious_matches_protocol_and_port() {
        let rule = SuspiciousProtocolRule::new(&SuspiciousConfig::default());
        assert!(rule.evaluate(&flow(Protocol::Tcp, 23), &snapshot(1, 1)).is_some());
        assert!(rule.evaluate(&flow(Protocol::Udp, 69), &snapshot(1, 1)).is_some());
        // telnet은 TCP만 등록됨
        assert!(rule.evaluate(&flow(Protocol::Udp, 23), &snapshot(1, 1)).is_none());
        assert!(rule.evaluate(&flow(Protocol::Tcp, 443), &snapshot(1, 1)).is_none());
    }

    #[test]
    fn test_suspicious_uses_configured_table() {
        let config = SuspiciousConfig {
            entries: vec![SuspiciousPortEntry {
                protocol: Protocol::Tcp,
                port: 8080,
                label: "proxy".to_owned(),
            }],
            ..SuspiciousConfig::default()
        };
        let rule = SuspiciousProtocolRule::new(&config);
        assert!(rule.is_listed(Protocol::Tcp, 8080));
        assert!(!rule.is_listed(Protocol::Tcp, 23));
        assert_eq!(
            rule.evaluate(&flow(Protocol::Tcp, 8080), &snapshot(1, 1))
                .map(|v| v.severity()),
            Some(Severity::Medium)
        );
    }

    #[test]
    fn test_default_rules_respects_disabled_suspicious() {
        let mut config = DetectionConfig::default();
        let ids: Vec<_> = default_rules(&config).iter().map(|r| r.id()).collect();
        assert_eq!(
            ids,
            vec![RuleId::PortScan, RuleId::SuspiciousProtocol, RuleId::RateLimit]
        );

        config.suspicious.enabled = false;
        let ids: Vec<_> = default_rules(&config).iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec![RuleId::PortScan, RuleId::RateLimit]);
    }

    #[test]
    fn test_rules_are_independent() {
        let config = DetectionConfig::default();
        let rules = default_rules(&config);
        // 고유 포트 10개, 패킷 101개, telnet 포트: 세 규칙 모두 판정
        let f = flow(Protocol::Tcp, 23);
        let fired: Vec<_> = rules
            .iter()
            .filter_map(|r| r.evaluate(&f, &snapshot(10, 101)))
            .map(|v| v.rule)
            .collect();
        assert_eq!(fired.len(), 3);
    }
}
