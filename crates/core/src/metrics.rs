//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 크레이트는 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`,
//! `metrics::histogram!()` 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `sentinel_`
//! - 구성 요소: `capture_`, `detector_`, `sink_`, `scan_`
//! - 접미어: `_total` (counter), `_seconds` (histogram), 없음 (gauge)

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 프로토콜 레이블 키 (TCP, UDP, Other)
pub const LABEL_PROTOCOL: &str = "protocol";

/// 규칙 레이블 키 (port_scan, suspicious_protocol, rate_limit)
pub const LABEL_RULE: &str = "rule";

/// 드롭 사유 레이블 키 (truncated, not_ip, malformed, link_type)
pub const LABEL_REASON: &str = "reason";

/// 결과 레이블 키 (finalized, failed)
pub const LABEL_RESULT: &str = "result";

// ─── Capture 메트릭 ────────────────────────────────────────────────

/// Capture: 수신한 프레임 수 (counter)
pub const CAPTURE_FRAMES_TOTAL: &str = "sentinel_capture_frames_total";

/// Capture: 파싱 실패로 버린 프레임 수 (counter, label: reason)
pub const CAPTURE_FRAMES_DROPPED_TOTAL: &str = "sentinel_capture_frames_dropped_total";

/// Capture: 처리 대기 중인 프레임 수 (gauge)
pub const CAPTURE_QUEUE_DEPTH: &str = "sentinel_capture_queue_depth";

// ─── Detector 메트릭 ───────────────────────────────────────────────

/// Detector: 프로토콜별 처리된 플로우 수 (counter, label: protocol)
pub const DETECTOR_FLOWS_TOTAL: &str = "sentinel_detector_flows_total";

/// Detector: 추적 중인 출발지 수 (gauge)
pub const DETECTOR_TRACKED_SOURCES: &str = "sentinel_detector_tracked_sources";

/// Detector: 중복 제거 후 발생한 알림 수 (counter, label: rule)
pub const DETECTOR_ALERTS_TOTAL: &str = "sentinel_detector_alerts_total";

/// Detector: 같은 윈도우라서 억제된 판정 수 (counter, label: rule)
pub const DETECTOR_SUPPRESSED_TOTAL: &str = "sentinel_detector_suppressed_total";

// ─── Sink 메트릭 ───────────────────────────────────────────────────

/// Sink: 수신한 알림 수 (counter)
pub const SINK_ALERTS_RECEIVED_TOTAL: &str = "sentinel_sink_alerts_received_total";

/// Sink: 컬렉션 기록 횟수 (counter, label: result)
pub const SINK_WRITES_TOTAL: &str = "sentinel_sink_writes_total";

/// Sink: 컬렉션 기록 소요 시간 (histogram, 초)
pub const SINK_WRITE_DURATION_SECONDS: &str = "sentinel_sink_write_duration_seconds";

// ─── Scan 메트릭 ───────────────────────────────────────────────────

/// Scan: 종료된 실행 수 (counter, label: result)
pub const SCAN_RUNS_TOTAL: &str = "sentinel_scan_runs_total";

/// Scan: 실행 소요 시간 (histogram, 초)
pub const SCAN_DURATION_SECONDS: &str = "sentinel_scan_duration_seconds";

/// Scan: 활성 워커 수 (gauge)
pub const SCAN_ACTIVE_WORKERS: &str = "sentinel_scan_active_workers";

// ─── 히스토그램 버킷 정의 ────────────────────────────────────────────

/// 컬렉션 기록 시간 히스토그램 버킷 (초)
pub const WRITE_DURATION_BUCKETS: [f64; 8] = [0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0];

/// 실행 시간 히스토그램 버킷 (초)
pub const SCAN_DURATION_BUCKETS: [f64; 8] = [1.0, 5.0, 10.0, 30.0, 60.0, 300.0, 900.0, 3600.0];

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    describe_counter!(CAPTURE_FRAMES_TOTAL, "Total number of frames read from the capture source");
    describe_counter!(
        CAPTURE_FRAMES_DROPPED_TOTAL,
        "Frames skipped because they could not be parsed into a flow"
    );
    describe_gauge!(
        CAPTURE_QUEUE_DEPTH,
        "Frames waiting in the bounded queue between capture and workers"
    );

    describe_counter!(DETECTOR_FLOWS_TOTAL, "Flows recorded per protocol (TCP, UDP, Other)");
    describe_gauge!(
        DETECTOR_TRACKED_SOURCES,
        "Source addresses with per-source window state"
    );
    describe_counter!(DETECTOR_ALERTS_TOTAL, "Alerts emitted per detection rule");
    describe_counter!(
        DETECTOR_SUPPRESSED_TOTAL,
        "Rule verdicts suppressed because the rule already fired in the window"
    );

    describe_counter!(SINK_ALERTS_RECEIVED_TOTAL, "Alerts received by the sink writer");
    describe_counter!(SINK_WRITES_TOTAL, "Alert collection writes by result");
    describe_histogram!(
        SINK_WRITE_DURATION_SECONDS,
        "Time to atomically write the alert collection in seconds"
    );

    describe_counter!(SCAN_RUNS_TOTAL, "Completed scan runs by result");
    describe_histogram!(SCAN_DURATION_SECONDS, "Wall-clock duration of a scan run in seconds");
    describe_gauge!(SCAN_ACTIVE_WORKERS, "Worker tasks currently consuming frames");
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_METRIC_NAMES: &[&str] = &[
        CAPTURE_FRAMES_TOTAL,
        CAPTURE_FRAMES_DROPPED_TOTAL,
        CAPTURE_QUEUE_DEPTH,
        DETECTOR_FLOWS_TOTAL,
        DETECTOR_TRACKED_SOURCES,
        DETECTOR_ALERTS_TOTAL,
        DETECTOR_SUPPRESSED_TOTAL,
        SINK_ALERTS_RECEIVED_TOTAL,
        SINK_WRITES_TOTAL,
        SINK_WRITE_DURATION_SECONDS,
        SCAN_RUNS_TOTAL,
        SCAN_DURATION_SECONDS,
        SCAN_ACTIVE_WORKERS,
    ];

    #[test]
    fn all_metrics_start_with_sentinel_prefix() {
        for name in ALL_METRIC_NAMES {
            assert!(
                name.starts_with("sentinel_"),
                "Metric '{}' does not start with 'sentinel_' prefix",
                name
            );
        }
    }

    #[test]
    fn metric_names_are_unique() {
        let mut names = ALL_METRIC_NAMES.to_vec();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), ALL_METRIC_NAMES.len());
    }

    #[test]
    fn describe_all_does_not_panic() {
        // 레코더가 없어도 패닉하지 않아야 함
        describe_all();
    }

    #[test]
    fn buckets_are_sorted() {
        for buckets in [&WRITE_DURATION_BUCKETS[..], &SCAN_DURATION_BUCKETS[..]] {
            for i in 1..buckets.len() {
                assert!(buckets[i] > buckets[i - 1], "Bucket values must be ascending");
            }
        }
    }
}
