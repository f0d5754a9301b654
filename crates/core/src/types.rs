//! 도메인 타입 — 시스템 전역에서 사용되는 공통 타입
//!
//! 플로우 추출기, 탐지 엔진, 알림 저장소가 이 타입들로 데이터를 교환합니다.
//! 프로토콜, 심각도, 규칙 ID는 모두 닫힌 열거형입니다.

use std::fmt;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 전송 계층 프로토콜 태그
///
/// TCP/UDP만 탐지 규칙 대상입니다. 그 외 IP 트래픽은 `Other`로 집계만 됩니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Protocol {
    #[serde(rename = "TCP", alias = "tcp")]
    Tcp,
    #[serde(rename = "UDP", alias = "udp")]
    Udp,
    #[serde(rename = "Other", alias = "other")]
    Other,
}

impl Protocol {
    /// 탐지 규칙 평가 대상인지 확인합니다.
    pub fn is_rule_eligible(self) -> bool {
        matches!(self, Self::Tcp | Self::Udp)
    }

    /// 직렬화 형식과 동일한 문자열 표현
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tcp => "TCP",
            Self::Udp => "UDP",
            Self::Other => "Other",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 심각도 레벨
///
/// `Ord` 구현으로 비교가 가능합니다 (`Low < Medium < High`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// 낮은 심각도
    Low,
    /// 중간 심각도
    Medium,
    /// 높은 심각도
    High,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 탐지 규칙 식별자
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleId {
    /// 짧은 시간에 많은 목적지 포트 접근
    PortScan,
    /// 금지된 (프로토콜, 포트) 조합 사용
    SuspiciousProtocol,
    /// 윈도우 내 패킷 수 초과
    RateLimit,
}

impl RuleId {
    /// 모든 규칙 (평가 순서)
    pub const ALL: [RuleId; 3] = [Self::PortScan, Self::SuspiciousProtocol, Self::RateLimit];

    /// 규칙의 고정 심각도
    pub fn severity(self) -> Severity {
        match self {
            Self::PortScan => Severity::High,
            Self::SuspiciousProtocol => Severity::Medium,
            Self::RateLimit => Severity::Low,
        }
    }

    /// 알림 메시지
    pub fn message(self) -> &'static str {
        match self {
            Self::PortScan => "Port scan detected",
            Self::SuspiciousProtocol => "Suspicious protocol usage",
            Self::RateLimit => "Rate limit exceeded",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::PortScan => "port_scan",
            Self::SuspiciousProtocol => "suspicious_protocol",
            Self::RateLimit => "rate_limit",
        }
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 플로우 레코드
///
/// 관찰된 패킷 하나를 주소/프로토콜 메타데이터로 축약한 것입니다.
/// 플로우 추출기가 생성한 뒤에는 변경되지 않습니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowRecord {
    /// 캡처 시각 (마이크로초 정밀도)
    pub timestamp: DateTime<Utc>,
    /// 출발지 IP
    pub src_ip: IpAddr,
    /// 목적지 IP
    pub dst_ip: IpAddr,
    /// 출발지 포트 (`Other`는 0)
    pub src_port: u16,
    /// 목적지 포트 (`Other`는 0)
    pub dst_port: u16,
    /// 프로토콜 태그
    pub protocol: Protocol,
    /// 와이어 상의 프레임 길이 (바이트)
    pub size: usize,
}

impl fmt::Display for FlowRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}:{} -> {}:{} ({} bytes)",
            self.protocol, self.src_ip, self.src_port, self.dst_ip, self.dst_port, self.size,
        )
    }
}

/// 보안 알림 레코드
///
/// 직렬화된 필드 이름(`source_ip`, `dest_ip`, `alert` 등)은 외부 리포팅 계층이
/// 읽는 컬렉션 형식입니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertRecord {
    /// 트리거한 플로우의 시각 (UTC, 고정 폭 RFC 3339)
    #[serde(with = "timestamp_micros")]
    pub timestamp: DateTime<Utc>,
    pub source_ip: IpAddr,
    pub dest_ip: IpAddr,
    pub source_port: u16,
    pub dest_port: u16,
    pub protocol: Protocol,
    /// 사람이 읽는 알림 메시지
    #[serde(rename = "alert")]
    pub message: String,
    pub severity: Severity,
    pub rule: RuleId,
}

impl AlertRecord {
    /// 규칙과 트리거 플로우로부터 알림을 생성합니다.
    pub fn from_flow(rule: RuleId, flow: &FlowRecord) -> Self {
        Self {
            timestamp: flow.timestamp,
            source_ip: flow.src_ip,
            dest_ip: flow.dst_ip,
            source_port: flow.src_port,
            dest_port: flow.dst_port,
            protocol: flow.protocol,
            message: rule.message().to_owned(),
            severity: rule.severity(),
            rule,
        }
    }
}

impl fmt::Display for AlertRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {}:{} -> {}:{} (rule: {})",
            self.severity,
            self.message,
            self.source_ip,
            self.source_port,
            self.dest_ip,
            self.dest_port,
            self.rule,
        )
    }
}

/// 집계 통계 스냅샷
///
/// `total_packets`는 항상 `tcp + udp + other`로 계산됩니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateStats {
    pub total_packets: u64,
    pub tcp_packets: u64,
    pub udp_packets: u64,
    pub other_packets: u64,
    /// 현재 실행의 시작 시각
    pub run_start_time: DateTime<Utc>,
}

impl fmt::Display for AggregateStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "total={} tcp={} udp={} other={}",
            self.total_packets, self.tcp_packets, self.udp_packets, self.other_packets,
        )
    }
}

/// 알림 타임스탬프 직렬화
///
/// 항상 마이크로초 6자리와 `Z` 접미사를 사용하므로 문자열 정렬이 시간 정렬과 같습니다.
pub mod timestamp_micros {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn format(ts: &DateTime<Utc>) -> String {
        ts.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}
