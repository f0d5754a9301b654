//! 테스트 지원 — 합성 프레임과 메모리 소스
//!
//! `test-util` 기능으로 노출되며, 라이브 인터페이스 없이 파이프라인 전체를
//! 결정적으로 구동할 때 사용합니다.

use std::collections::VecDeque;
use std::net::IpAddr;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use etherparse::{IpHeaders, PacketBuilder, PacketBuilderStep};

use sentinel_core::error::CaptureError;

use crate::frame::{LinkType, RawFrame};
use crate::source::FrameSource;

const SRC_MAC: [u8; 6] = [0x02, 0x00, 0x00, 0x00, 0x00, 0x01];
const DST_MAC: [u8; 6] = [0x02, 0x00, 0x00, 0x00, 0x00, 0x02];

/// 기준 시각(2026-03-01T00:00:00Z)에서 `secs`초 뒤의 시각
pub fn at_secs(secs: f64) -> DateTime<Utc> {
    let base = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
    base + chrono::Duration::microseconds((secs * 1_000_000.0).round() as i64)
}

#[derive(Debug, Clone, Copy)]
enum Transport {
    Tcp { sport: u16, dport: u16 },
    Udp { sport: u16, dport: u16 },
    Icmp,
}

/// 합성 프레임 명세
#[derive(Debug, Clone)]
pub struct FrameSpec {
    src: IpAddr,
    dst: IpAddr,
    transport: Transport,
    timestamp: DateTime<Utc>,
    raw_ip: bool,
}

impl FrameSpec {
    fn new(src: &str, dst: &str, transport: Transport) -> Self {
        Self {
            src: src.parse().expect("valid source address"),
            dst: dst.parse().expect("valid destination address"),
            transport,
            timestamp: at_secs(0.0),
            raw_ip: false,
        }
    }

    /// TCP SYN 프레임
    pub fn tcp(src: &str, dst: &str, sport: u16, dport: u16) -> Self {
        Self::new(src, dst, Transport::Tcp { sport, dport })
    }

    /// UDP 프레임
    pub fn udp(src: &str, dst: &str, sport: u16, dport: u16) -> Self {
        Self::new(src, dst, Transport::Udp { sport, dport })
    }

    /// ICMP echo request 프레임
    pub fn icmp(src: &str, dst: &str) -> Self {
        Self::new(src, dst, Transport::Icmp)
    }

    /// 캡처 시각 지정
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// 이더넷 헤더 없이 IP 헤더로 시작
    pub fn raw_ip(mut self) -> Self {
        self.raw_ip = true;
        self
    }

    fn ip_step(&self) -> PacketBuilderStep<IpHeaders> {
        match (self.src, self.dst, self.raw_ip) {
            (IpAddr::V4(s), IpAddr::V4(d), false) => {
                PacketBuilder::ethernet2(SRC_MAC, DST_MAC).ipv4(s.octets(), d.octets(), 64)
            }
            (IpAddr::V4(s), IpAddr::V4(d), true) => PacketBuilder::ipv4(s.octets(), d.octets(), 64),
            (IpAddr::V6(s), IpAddr::V6(d), false) => {
                PacketBuilder::ethernet2(SRC_MAC, DST_MAC).ipv6(s.octets(), d.octets(), 64)
            }
            (IpAddr::V6(s), IpAddr::V6(d), true) => PacketBuilder::ipv6(s.octets(), d.octets(), 64),
            _ => panic!("source and destination must share an address family"),
        }
    }

    pub fn build(&self) -> RawFrame {
        let mut buf = Vec::new();
        let step = self.ip_step();
        let written = match self.transport {
            Transport::Tcp { sport, dport } => step.tcp(sport, dport, 1, 1024).syn().write(&mut buf, &[]),
            Transport::Udp { sport, dport } => step.udp(sport, dport).write(&mut buf, &[]),
            Transport::Icmp if self.src.is_ipv4() => step.icmpv4_echo_request(1, 1).write(&mut buf, &[]),
            Transport::Icmp => step.icmpv6_echo_request(1, 1).write(&mut buf, &[]),
        };
        written.expect("writing into a Vec");

        let link = if self.raw_ip {
            LinkType::RawIp
        } else {
            LinkType::Ethernet
        };
        RawFrame::new(self.timestamp, link, buf)
    }
}

/// 메모리 소스가 준비된 프레임을 모두 내보낸 뒤의 동작
#[derive(Debug, Clone)]
pub enum AfterEnd {
    /// 오프라인 파일처럼 `Exhausted` 반환
    Exhausted,
    /// 유휴 라이브 인터페이스처럼 대기 후 타임아웃 반환
    Idle(Duration),
    /// 같은 프레임을 끝없이 반복 (지속 트래픽)
    Repeat,
    /// 읽기 에러 반환
    Fail(String),
}

/// 미리 준비한 프레임을 내보내는 소스
#[derive(Debug)]
pub struct MemorySource {
    pending: VecDeque<RawFrame>,
    template: Vec<RawFrame>,
    after_end: AfterEnd,
}

impl MemorySource {
    pub fn new(frames: Vec<RawFrame>, after_end: AfterEnd) -> Self {
        Self {
            pending: frames.iter().cloned().collect(),
            template: frames,
            after_end,
        }
    }
}

impl FrameSource for MemorySource {
    fn next_frame(&mut self) -> Result<Option<RawFrame>, CaptureError> {
        if let Some(frame) = self.pending.pop_front() {
            return Ok(Some(frame));
        }
        match &self.after_end {
            AfterEnd::Exhausted => Err(CaptureError::Exhausted),
            AfterEnd::Idle(wait) => {
                std::thread::sleep(*wait);
                Ok(None)
            }
            AfterEnd::Repeat if self.template.is_empty() => Ok(None),
            AfterEnd::Repeat => {
                self.pending.extend(self.template.iter().cloned());
                Ok(self.pending.pop_front())
            }
            AfterEnd::Fail(reason) => Err(CaptureError::Read(reason.clone())),
        }
    }

    fn describe(&self) -> String {
        format!("memory ({} frames)", self.template.len())
    }
}
