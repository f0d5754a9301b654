//! Integration tests for metrics server installation.

use sentinel_core::config::MetricsConfig;
use sentinel_daemon::metrics_server;
use serial_test::serial;

#[test]
#[serial]
fn test_install_metrics_recorder_rejects_invalid_address() {
    // Given: An invalid listen address
    let config = MetricsConfig {
        enabled: true,
        listen_addr: "999.999.999.999".to_string(),
        port: 9100,
        endpoint: "/metrics".to_string(),
    };

    // When/Then: Installation fails before binding
    let result = metrics_server::install_metrics_recorder(&config);
    assert!(result.is_err(), "invalid address should be rejected");
}

#[test]
#[serial]
fn test_install_metrics_recorder_rejects_unsupported_endpoint() {
    // Given: A custom endpoint path
    let config = MetricsConfig {
        enabled: true,
        listen_addr: "127.0.0.1".to_string(),
        port: 19101,
        endpoint: "/custom".to_string(),
    };

    // When
    let result = metrics_server::install_metrics_recorder(&config);

    // Then
    let err = result.expect_err("custom endpoint should be rejected");
    assert!(err.to_string().contains("unsupported metrics endpoint"));
}

#[test]
#[serial]
fn test_install_metrics_recorder_succeeds_with_valid_config() {
    // Given: A valid loopback configuration on a non-standard port
    let config = MetricsConfig {
        enabled: true,
        listen_addr: "127.0.0.1".to_string(),
        port: 19100,
        endpoint: "/metrics".to_string(),
    };

    // When: Installing the recorder
    let result = metrics_server::install_metrics_recorder(&config);

    // Then
    assert!(
        result.is_ok(),
        "install should succeed with valid config: {:?}",
        result.err()
    );
}
