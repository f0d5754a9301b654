//! 원시 프레임과 링크 계층 타입

use bytes::Bytes;
use chrono::{DateTime, Utc};

/// 캡처된 링크 계층 프레임
///
/// 패킷 소스가 생성하여 큐를 통해 워커로 소유권이 이동합니다.
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// 캡처 시각 (pcap 헤더 기준)
    pub timestamp: DateTime<Utc>,
    /// 링크 계층 타입
    pub link: LinkType,
    /// 캡처된 바이트 (snaplen 이하)
    pub data: Bytes,
    /// 와이어 상의 원래 길이
    pub wire_len: usize,
}

impl RawFrame {
    /// 캡처 길이와 와이어 길이가 같은 프레임을 생성합니다.
    pub fn new(timestamp: DateTime<Utc>, link: LinkType, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let wire_len = data.len();
        Self {
            timestamp,
            link,
            data,
            wire_len,
        }
    }
}

/// 지원하는 링크 계층 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkType {
    /// DLT_EN10MB
    Ethernet,
    /// DLT_LINUX_SLL (`any` 디바이스)
    LinuxSll,
    /// IP 헤더로 바로 시작 (DLT_RAW, LINKTYPE_IPV4/IPV6)
    RawIp,
    /// 그 외 (프레임은 파싱 단계에서 버려짐)
    Unsupported(i32),
}

impl LinkType {
    /// libpcap 데이터링크 번호에서 변환합니다.
    pub fn from_dlt(dlt: i32) -> Self {
        match dlt {
            1 => Self::Ethernet,
            113 => Self::LinuxSll,
            // DLT_RAW는 플랫폼에 따라 12 또는 14, 파일 헤더에서는 101
            12 | 14 | 101 | 228 | 229 => Self::RawIp,
            other => Self::Unsupported(other),
        }
    }

    /// 필드 접근 전 검증할 최소 프레임 길이 (링크 헤더 + IPv4 최소 헤더)
    pub fn min_frame_len(self) -> usize {
        const IPV4_MIN_HEADER: usize = 20;
        match self {
            Self::Ethernet => 14 + IPV4_MIN_HEADER,
            Self::LinuxSll => 16 + IPV4_MIN_HEADER,
            Self::RawIp => IPV4_MIN_HEADER,
            Self::Unsupported(_) => 0,
        }
    }
}
