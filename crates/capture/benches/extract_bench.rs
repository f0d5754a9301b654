//! 플로우 추출기 벤치마크
//!
//! 프레임 종류별 extract() 처리 비용을 측정합니다.

use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use sentinel_capture::extract;
use sentinel_capture::testing::FrameSpec;

fn bench_extract(c: &mut Criterion) {
    let tcp_v4 = FrameSpec::tcp("10.0.0.5", "192.168.1.10", 40000, 443).build();
    let udp_v4 = FrameSpec::udp("10.0.0.5", "192.168.1.1", 5353, 53).build();
    let tcp_v6 = FrameSpec::tcp("2001:db8::1", "2001:db8::2", 40000, 443).build();
    let raw_ip = FrameSpec::udp("10.0.0.5", "10.0.0.6", 1000, 2000).raw_ip().build();

    let mut group = c.benchmark_group("extract");
    group.throughput(Throughput::Elements(1));

    group.bench_function("ethernet_ipv4_tcp", |b| b.iter(|| extract(black_box(&tcp_v4))));
    group.bench_function("ethernet_ipv4_udp", |b| b.iter(|| extract(black_box(&udp_v4))));
    group.bench_function("ethernet_ipv6_tcp", |b| b.iter(|| extract(black_box(&tcp_v6))));
    group.bench_function("raw_ipv4_udp", |b| b.iter(|| extract(black_box(&raw_ip))));

    group.finish();
}

criterion_group!(benches, bench_extract);
criterion_main!(benches);
