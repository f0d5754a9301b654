//! 알림 기록기 통합 테스트
//!
//! 실제 파일 저장소와 실패를 주입하는 메모리 저장소로 기록 태스크를 검증합니다.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{TimeZone, Utc};

use sentinel_alert_sink::{AlertSink, CollectionStore, JsonFileStore, RecentAlerts, load_collection};
use sentinel_core::config::SinkConfig;
use sentinel_core::error::SinkError;
use sentinel_core::types::{AlertRecord, FlowRecord, Protocol, RuleId};

fn alert(rule: RuleId, dport: u16, secs: i64) -> AlertRecord {
    let flow = FlowRecord {
        timestamp: Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap() + chrono::Duration::seconds(secs),
        src_ip: "10.0.0.5".parse().unwrap(),
        dst_ip: "192.168.1.10".parse().unwrap(),
        src_port: 40000,
        dst_port: dport,
        protocol: Protocol::Tcp,
        size: 60,
    };
    AlertRecord::from_flow(rule, &flow)
}

/// 기록 내용을 메모리에 남기고, 처음 `fail_times`번은 실패하는 저장소
#[derive(Default)]
struct MemoryStore {
    writes: Mutex<Vec<Vec<AlertRecord>>>,
    fail_times: AtomicU32,
    attempts: AtomicU32,
}

impl MemoryStore {
    fn failing(times: u32) -> Self {
        Self {
            fail_times: AtomicU32::new(times),
            ..Self::default()
        }
    }

    fn writes(&self) -> Vec<Vec<AlertRecord>> {
        self.writes.lock().unwrap().clone()
    }
}

impl CollectionStore for MemoryStore {
    fn persist(&self, alerts: &[AlertRecord]) -> Result<(), SinkError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let remaining = self.fail_times.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_times.store(remaining - 1, Ordering::SeqCst);
            return Err(SinkError::WriteFailed {
                path: self.location(),
                attempts: 1,
                reason: "disk full".to_owned(),
            });
        }
        self.writes.lock().unwrap().push(alerts.to_vec());
        Ok(())
    }

    fn location(&self) -> String {
        "memory".to_owned()
    }
}

fn config() -> SinkConfig {
    SinkConfig {
        flush_interval_secs: 0,
        recent_capacity: 3,
        channel_capacity: 8,
        ..SinkConfig::default()
    }
}

#[tokio::test]
async fn finalize_writes_every_emitted_alert_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("alerts.json");
    let (sink, emitter) = AlertSink::spawn(&config(), Arc::new(JsonFileStore::new(&path)));

    // 채널 용량보다 많은 알림을 여러 emitter로 전달
    let mut handles = Vec::new();
    for worker in 0..4u16 {
        let emitter = emitter.clone();
        handles.push(tokio::spawn(async move {
            for i in 0..5u16 {
                emitter
                    .emit(alert(RuleId::PortScan, worker * 100 + i, i64::from(i)))
                    .await
                    .unwrap();
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let report = sink.finalize().await.unwrap();
    assert_eq!(report.alert_count, 20);
    assert_eq!(report.attempts, 1);
    assert_eq!(sink.alert_count(), 20);

    let loaded = load_collection(&path).unwrap();
    assert_eq!(loaded.len(), 20);
    // 같은 emitter의 알림은 보낸 순서대로 기록
    let worker_two: Vec<_> = loaded
        .iter()
        .filter(|a| (200..300).contains(&a.dest_port))
        .map(|a| a.dest_port)
        .collect();
    assert_eq!(worker_two, vec![200, 201, 202, 203, 204]);

    sink.shutdown().await.unwrap();
}

#[tokio::test]
async fn finalize_without_alerts_writes_empty_array() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("alerts.json");
    let (sink, _emitter) = AlertSink::spawn(&config(), Arc::new(JsonFileStore::new(&path)));

    let report = sink.finalize().await.unwrap();
    assert_eq!(report.alert_count, 0);
    assert_eq!(std::fs::read_to_string(&path).unwrap().trim(), "[]");
}

#[tokio::test]
async fn finalize_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("alerts.json");
    let (sink, emitter) = AlertSink::spawn(&config(), Arc::new(JsonFileStore::new(&path)));

    emitter.emit(alert(RuleId::RateLimit, 53, 1)).await.unwrap();
    emitter.emit(alert(RuleId::SuspiciousProtocol, 23, 2)).await.unwrap();

    sink.finalize().await.unwrap();
    let first = std::fs::read(&path).unwrap();
    sink.finalize().await.unwrap();
    let second = std::fs::read(&path).unwrap();

    assert_eq!(first, second);
}

#[tokio::test]
async fn finalize_retries_once_after_failure() {
    let store = Arc::new(MemoryStore::failing(1));
    let (sink, emitter) = AlertSink::spawn(&config(), store.clone());
    emitter.emit(alert(RuleId::PortScan, 29, 0)).await.unwrap();

    let report = sink.finalize().await.unwrap();
    assert_eq!(report.attempts, 2);
    assert_eq!(store.attempts.load(Ordering::SeqCst), 2);
    assert_eq!(store.writes().len(), 1);
}

#[tokio::test]
async fn finalize_fails_after_second_failure() {
    let store = Arc::new(MemoryStore::failing(u32::MAX));
    let (sink, emitter) = AlertSink::spawn(&config(), store.clone());
    emitter.emit(alert(RuleId::PortScan, 29, 0)).await.unwrap();

    let err = sink.finalize().await.unwrap_err();
    match err {
        SinkError::WriteFailed { attempts, reason, .. } => {
            assert_eq!(attempts, 2);
            assert_eq!(reason, "disk full");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(store.attempts.load(Ordering::SeqCst), 2);
    assert!(store.writes().is_empty());
}

#[tokio::test]
async fn recent_alerts_are_bounded_and_newest_first() {
    let store = Arc::new(MemoryStore::default());
    let (sink, emitter) = AlertSink::spawn(&config(), store);
    for port in 1..=5 {
        emitter.emit(alert(RuleId::PortScan, port, 0)).await.unwrap();
    }
    // finalize 응답 시점에는 앞선 알림이 모두 처리됨
    sink.finalize().await.unwrap();

    let ports: Vec<_> = sink.recent().latest(10).iter().map(|a| a.dest_port).collect();
    assert_eq!(ports, vec![5, 4, 3]);
}

#[tokio::test]
async fn shared_recent_buffer_outlives_the_sink() {
    let recent = RecentAlerts::new(4);
    let (sink, emitter) =
        AlertSink::spawn_with_recent(&config(), Arc::new(MemoryStore::default()), recent.clone());
    emitter.emit(alert(RuleId::RateLimit, 53, 0)).await.unwrap();
    sink.finalize().await.unwrap();
    sink.shutdown().await.unwrap();

    assert_eq!(recent.len(), 1);
    assert_eq!(recent.latest(1)[0].rule, RuleId::RateLimit);
}

#[tokio::test]
async fn emit_after_shutdown_reports_closed_channel() {
    let store = Arc::new(MemoryStore::default());
    let (sink, emitter) = AlertSink::spawn(&config(), store);
    sink.shutdown().await.unwrap();

    let err = emitter.emit(alert(RuleId::PortScan, 1, 0)).await.unwrap_err();
    assert!(matches!(err, SinkError::ChannelClosed));
}

#[tokio::test(start_paused = true)]
async fn periodic_checkpoint_writes_new_alerts() {
    let store = Arc::new(MemoryStore::default());
    let config = SinkConfig {
        flush_interval_secs: 5,
        ..config()
    };
    let (sink, emitter) = AlertSink::spawn(&config, store.clone());
    emitter.emit(alert(RuleId::RateLimit, 53, 0)).await.unwrap();

    for _ in 0..100 {
        if !store.writes().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }

    let writes = store.writes();
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0].len(), 1);

    // 새 알림이 없으면 다음 주기에 다시 쓰지 않음
    tokio::time::sleep(Duration::from_secs(12)).await;
    assert_eq!(store.writes().len(), 1);

    sink.shutdown().await.unwrap();
}
