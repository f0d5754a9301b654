#![no_main]

use std::net::{IpAddr, Ipv4Addr};

use arbitrary::Arbitrary;
use chrono::{TimeZone, Utc};
use libfuzzer_sys::fuzz_target;

use sentinel_core::types::{FlowRecord, Protocol};
use sentinel_detector::DetectionEngine;

/// 퍼저용 플로우 (출발지는 작은 범위로 제한해 상태가 겹치도록 함)
#[derive(Arbitrary, Debug)]
struct FuzzFlow {
    source: u8,
    dest_port: u16,
    protocol: u8,
    /// 기준 시각으로부터의 밀리초 (음수면 순서가 뒤바뀐 플로우)
    offset_ms: i32,
}

fuzz_target!(|flows: Vec<FuzzFlow>| {
    let engine = DetectionEngine::default();
    let base = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();

    for f in &flows {
        let protocol = match f.protocol % 3 {
            0 => Protocol::Tcp,
            1 => Protocol::Udp,
            _ => Protocol::Other,
        };
        let flow = FlowRecord {
            timestamp: base + chrono::Duration::milliseconds(i64::from(f.offset_ms)),
            src_ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, f.source % 8)),
            dst_ip: IpAddr::V4(Ipv4Addr::new(192, 168, 1, 10)),
            src_port: 40000,
            dst_port: f.dest_port,
            protocol,
            size: 60,
        };
        let _ = engine.evaluate(&flow);
    }

    // 집계 항등식은 어떤 입력에서도 유지되어야 한다
    let stats = engine.stats();
    assert_eq!(stats.total_packets, flows.len() as u64);
    assert_eq!(
        stats.total_packets,
        stats.tcp_packets + stats.udp_packets + stats.other_packets
    );
});
