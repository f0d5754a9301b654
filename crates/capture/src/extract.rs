//! 플로우 추출기 — 원시 프레임을 [`FlowRecord`]로 변환
//!
//! 최소 길이를 먼저 검증한 뒤 etherparse로 링크/네트워크/전송 계층을 슬라이스합니다.
//! TCP/UDP만 포트를 분류하고, 그 외 IP 트래픽은 `Protocol::Other`(포트 0)로
//! 태그하여 집계만 되도록 합니다.
//!
//! 파싱 실패는 치명적이지 않습니다. [`FlowExtractor::process`]는 실패한 프레임을
//! 건너뛰고 사유별 드롭 카운터를 증가시키며, 에러를 호출자에게 전파하지 않습니다.

use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use etherparse::{NetSlice, SlicedPacket, TransportSlice};
use tracing::debug;

use sentinel_core::error::ParseError;
use sentinel_core::metrics as m;
use sentinel_core::types::{FlowRecord, Protocol};

use crate::frame::{LinkType, RawFrame};

/// 프레임 하나를 플로우 레코드로 변환합니다.
pub fn extract(frame: &RawFrame) -> Result<FlowRecord, ParseError> {
    if let LinkType::Unsupported(dlt) = frame.link {
        return Err(ParseError::UnsupportedLinkType(dlt));
    }

    let min = frame.link.min_frame_len();
    if frame.data.len() < min {
        return Err(ParseError::Truncated {
            len: frame.data.len(),
            min,
        });
    }

    let sliced = match frame.link {
        LinkType::Ethernet => SlicedPacket::from_ethernet(&frame.data).map_err(malformed)?,
        LinkType::LinuxSll => SlicedPacket::from_linux_sll(&frame.data).map_err(malformed)?,
        LinkType::RawIp => SlicedPacket::from_ip(&frame.data).map_err(malformed)?,
        LinkType::Unsupported(dlt) => return Err(ParseError::UnsupportedLinkType(dlt)),
    };

    let (src_ip, dst_ip) = match &sliced.net {
        Some(NetSlice::Ipv4(ipv4)) => (
            IpAddr::V4(ipv4.header().source_addr()),
            IpAddr::V4(ipv4.header().destination_addr()),
        ),
        Some(NetSlice::Ipv6(ipv6)) => (
            IpAddr::V6(ipv6.header().source_addr()),
            IpAddr::V6(ipv6.header().destination_addr()),
        ),
        _ => return Err(ParseError::NotIp),
    };

    // 비첫 조각(fragment)은 전송 헤더가 없으므로 Other로 분류됨
    let (src_port, dst_port, protocol) = match &sliced.transport {
        Some(TransportSlice::Tcp(tcp)) => (tcp.source_port(), tcp.destination_port(), Protocol::Tcp),
        Some(TransportSlice::Udp(udp)) => (udp.source_port(), udp.destination_port(), Protocol::Udp),
        _ => (0, 0, Protocol::Other),
    };

    Ok(FlowRecord {
        timestamp: frame.timestamp,
        src_ip,
        dst_ip,
        src_port,
        dst_port,
        protocol,
        size: frame.wire_len,
    })
}

fn malformed(err: impl std::fmt::Display) -> ParseError {
    ParseError::Malformed(err.to_string())
}

/// 드롭 사유별 카운터
///
/// 워커들이 `FlowExtractor`를 복제해 공유하므로 원자적 카운터를 사용합니다.
#[derive(Debug, Default)]
struct DropCounters {
    truncated: AtomicU64,
    unsupported_link: AtomicU64,
    not_ip: AtomicU64,
    malformed: AtomicU64,
}

/// 사유별 드롭 수 스냅샷
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DropCounts {
    pub truncated: u64,
    pub unsupported_link: u64,
    pub not_ip: u64,
    pub malformed: u64,
}

impl DropCounts {
    pub fn total(&self) -> u64 {
        self.truncated + self.unsupported_link + self.not_ip + self.malformed
    }
}

/// 실행 단위 플로우 추출기
///
/// 복제본은 같은 드롭 카운터를 공유합니다. 실행 시작 시 [`FlowExtractor::reset`]으로 초기화합니다.
#[derive(Debug, Clone, Default)]
pub struct FlowExtractor {
    drops: Arc<DropCounters>,
}

impl FlowExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 프레임을 변환합니다. 실패하면 드롭을 기록하고 `None`을 반환합니다.
    pub fn process(&self, frame: &RawFrame) -> Option<FlowRecord> {
        match extract(frame) {
            Ok(flow) => Some(flow),
            Err(err) => {
                self.record_drop(&err);
                None
            }
        }
    }

    fn record_drop(&self, err: &ParseError) {
        let (counter, reason) = match err {
            ParseError::Truncated { .. } => (&self.drops.truncated, "truncated"),
            ParseError::UnsupportedLinkType(_) => (&self.drops.unsupported_link, "link_type"),
            ParseError::NotIp => (&self.drops.not_ip, "not_ip"),
            ParseError::Malformed(_) => (&self.drops.malformed, "malformed"),
        };
        counter.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(m::CAPTURE_FRAMES_DROPPED_TOTAL, m::LABEL_REASON => reason).increment(1);
        debug!(reason, error = %err, "dropping frame");
    }

    /// 사유별 드롭 수 스냅샷
    pub fn drops(&self) -> DropCounts {
        DropCounts {
            truncated: self.drops.truncated.load(Ordering::Relaxed),
            unsupported_link: self.drops.unsupported_link.load(Ordering::Relaxed),
            not_ip: self.drops.not_ip.load(Ordering::Relaxed),
            malformed: self.drops.malformed.load(Ordering::Relaxed),
        }
    }

    /// 전체 드롭 수
    pub fn dropped(&self) -> u64 {
        self.drops().total()
    }

    /// 드롭 카운터를 0으로 되돌립니다. 복제본에도 반영됩니다.
    pub fn reset(&self) {
        for counter in [
            &self.drops.truncated,
            &self.drops.unsupported_link,
            &self.drops.not_ip,
            &self.drops.malformed,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
