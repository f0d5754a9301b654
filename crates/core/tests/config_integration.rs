//! sentinel.toml 통합 설정 테스트
//!
//! - sentinel.toml.example 파싱 테스트
//! - 부분 설정 로딩 테스트
//! - 환경변수 우선순위 테스트
//! - 잘못된 형식 에러 테스트

use sentinel_core::config::SentinelConfig;
use sentinel_core::error::{ConfigError, SentinelError};
use sentinel_core::types::Protocol;
use serial_test::serial;

const EXAMPLE: &str = include_str!("../../../sentinel.toml.example");

// =============================================================================
// sentinel.toml.example 파싱 테스트
// =============================================================================

#[test]
fn example_config_parses_successfully() {
    let config = SentinelConfig::parse(EXAMPLE).expect("example config should parse");
    assert_eq!(config.general.log_level, "info");
    assert_eq!(config.general.log_format, "pretty");
}

#[test]
fn example_config_passes_validation() {
    let config = SentinelConfig::parse(EXAMPLE).expect("should parse");
    config
        .validate()
        .expect("example config should pass validation");
}

#[test]
fn example_config_matches_defaults() {
    let example = SentinelConfig::parse(EXAMPLE).expect("should parse");
    let defaults = SentinelConfig::default();

    assert_eq!(example.capture.filter, defaults.capture.filter);
    assert_eq!(example.capture.queue_capacity, defaults.capture.queue_capacity);
    assert_eq!(
        example.detection.port_scan.threshold,
        defaults.detection.port_scan.threshold
    );
    assert_eq!(
        example.detection.rate_limit.threshold,
        defaults.detection.rate_limit.threshold
    );
    assert_eq!(
        example.detection.suspicious.entries,
        defaults.detection.suspicious.entries
    );
    assert_eq!(example.scan.duration_secs, defaults.scan.duration_secs);
    assert_eq!(example.sink.output_path, defaults.sink.output_path);
}

#[test]
fn example_config_suspicious_table_uses_transport_protocols() {
    let config = SentinelConfig::parse(EXAMPLE).expect("should parse");
    assert!(
        config
            .detection
            .suspicious
            .entries
            .iter()
            .all(|e| e.protocol != Protocol::Other)
    );
}

// =============================================================================
// 부분 설정 / 에러
// =============================================================================

#[test]
fn only_scan_section_keeps_other_defaults() {
    let config = SentinelConfig::parse("[scan]\nduration_secs = 120\nworkers = 8\n").unwrap();
    assert_eq!(config.scan.duration_secs, 120);
    assert_eq!(config.scan.workers, 8);
    assert_eq!(config.detection.port_scan.window_secs, 10);
    assert_eq!(config.sink.output_path, "alerts.json");
}

#[test]
fn wrong_type_is_parse_error() {
    let err = SentinelConfig::parse("[scan]\nduration_secs = \"thirty\"\n").unwrap_err();
    assert!(matches!(
        err,
        SentinelError::Config(ConfigError::ParseFailed { .. })
    ));
}

#[test]
fn unknown_protocol_in_suspicious_table_is_parse_error() {
    let toml = r#"
[detection.suspicious]
entries = [{ protocol = "SCTP", port = 9 }]
"#;
    assert!(SentinelConfig::parse(toml).is_err());
}

// =============================================================================
// 환경변수 우선순위
// =============================================================================

#[tokio::test]
#[serial]
async fn env_overrides_file_values() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sentinel.toml");
    tokio::fs::write(&path, "[capture]\ninterface = \"eth0\"\n")
        .await
        .unwrap();

    // SAFETY: serial 테스트이므로 환경변수 조작이 다른 테스트와 겹치지 않습니다.
    unsafe { std::env::set_var("SENTINEL_CAPTURE_INTERFACE", "eth1") };
    let result = SentinelConfig::load(&path).await;
    unsafe { std::env::remove_var("SENTINEL_CAPTURE_INTERFACE") };

    let config = result.unwrap();
    assert_eq!(config.capture.interface, "eth1");
}

#[tokio::test]
#[serial]
async fn env_override_is_validated() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sentinel.toml");
    tokio::fs::write(&path, "").await.unwrap();

    // SAFETY: serial 테스트이므로 환경변수 조작이 다른 테스트와 겹치지 않습니다.
    unsafe { std::env::set_var("SENTINEL_SCAN_WORKERS", "0") };
    let result = SentinelConfig::load(&path).await;
    unsafe { std::env::remove_var("SENTINEL_SCAN_WORKERS") };

    let err = result.unwrap_err();
    assert!(err.to_string().contains("scan.workers"));
}
