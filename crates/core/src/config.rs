//! 설정 관리 — sentinel.toml 파싱 및 런타임 설정
//!
//! [`SentinelConfig`]는 모든 구성 요소의 설정을 담는 최상위 구조체입니다.
//! 임계값, 윈도우, 인터페이스, 필터, 실행 시간 중 어느 것도 핵심 로직에
//! 하드코딩되지 않습니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`SENTINEL_CAPTURE_INTERFACE=eth0` 형식)
//! 3. 설정 파일 (`sentinel.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), sentinel_core::error::SentinelError> {
//! use sentinel_core::config::SentinelConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = SentinelConfig::load("sentinel.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = SentinelConfig::parse("[scan]\nduration_secs = 60")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, SentinelError};
use crate::types::Protocol;

/// Sentinel 통합 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SentinelConfig {
    /// 일반 설정 (로깅)
    #[serde(default)]
    pub general: GeneralConfig,
    /// 패킷 소스 설정
    #[serde(default)]
    pub capture: CaptureConfig,
    /// 탐지 규칙 설정
    #[serde(default)]
    pub detection: DetectionConfig,
    /// 스캔 실행 설정
    #[serde(default)]
    pub scan: ScanConfig,
    /// 알림 저장소 설정
    #[serde(default)]
    pub sink: SinkConfig,
    /// 대화형(watch) 모드 설정
    #[serde(default)]
    pub watch: WatchConfig,
    /// Prometheus 메트릭 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl SentinelConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, SentinelError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, SentinelError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SentinelError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                SentinelError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, SentinelError> {
        toml::from_str(toml_str).map_err(|e| {
            SentinelError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `SENTINEL_{SECTION}_{FIELD}`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "SENTINEL_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "SENTINEL_GENERAL_LOG_FORMAT");

        // Capture
        override_string(&mut self.capture.interface, "SENTINEL_CAPTURE_INTERFACE");
        override_string(&mut self.capture.filter, "SENTINEL_CAPTURE_FILTER");
        override_string(&mut self.capture.pcap_file, "SENTINEL_CAPTURE_PCAP_FILE");
        override_bool(
            &mut self.capture.promiscuous,
            "SENTINEL_CAPTURE_PROMISCUOUS",
        );
        override_u32(&mut self.capture.snaplen, "SENTINEL_CAPTURE_SNAPLEN");
        override_u64(
            &mut self.capture.read_timeout_ms,
            "SENTINEL_CAPTURE_READ_TIMEOUT_MS",
        );
        override_usize(
            &mut self.capture.queue_capacity,
            "SENTINEL_CAPTURE_QUEUE_CAPACITY",
        );

        // Detection
        override_usize(
            &mut self.detection.port_scan.threshold,
            "SENTINEL_DETECTION_PORT_SCAN_THRESHOLD",
        );
        override_u64(
            &mut self.detection.port_scan.window_secs,
            "SENTINEL_DETECTION_PORT_SCAN_WINDOW_SECS",
        );
        override_usize(
            &mut self.detection.rate_limit.threshold,
            "SENTINEL_DETECTION_RATE_LIMIT_THRESHOLD",
        );
        override_u64(
            &mut self.detection.rate_limit.window_secs,
            "SENTINEL_DETECTION_RATE_LIMIT_WINDOW_SECS",
        );
        override_bool(
            &mut self.detection.suspicious.enabled,
            "SENTINEL_DETECTION_SUSPICIOUS_ENABLED",
        );

        // Scan
        override_u64(&mut self.scan.duration_secs, "SENTINEL_SCAN_DURATION_SECS");
        override_usize(&mut self.scan.workers, "SENTINEL_SCAN_WORKERS");
        override_u64(
            &mut self.scan.grace_period_secs,
            "SENTINEL_SCAN_GRACE_PERIOD_SECS",
        );

        // Sink
        override_string(&mut self.sink.output_path, "SENTINEL_SINK_OUTPUT_PATH");
        override_u64(
            &mut self.sink.flush_interval_secs,
            "SENTINEL_SINK_FLUSH_INTERVAL_SECS",
        );

        // Metrics
        override_bool(&mut self.metrics.enabled, "SENTINEL_METRICS_ENABLED");
        override_string(&mut self.metrics.listen_addr, "SENTINEL_METRICS_LISTEN_ADDR");
        override_u16(&mut self.metrics.port, "SENTINEL_METRICS_PORT");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), SentinelError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        if self.capture.snaplen == 0 {
            return Err(invalid("capture.snaplen", "must be greater than 0"));
        }
        if self.capture.read_timeout_ms == 0 {
            return Err(invalid("capture.read_timeout_ms", "must be greater than 0"));
        }
        if self.capture.queue_capacity == 0 {
            return Err(invalid("capture.queue_capacity", "must be greater than 0"));
        }

        if self.detection.port_scan.threshold == 0 {
            return Err(invalid(
                "detection.port_scan.threshold",
                "must be greater than 0",
            ));
        }
        if self.detection.port_scan.window_secs == 0 {
            return Err(invalid(
                "detection.port_scan.window_secs",
                "must be greater than 0",
            ));
        }
        if self.detection.rate_limit.threshold == 0 {
            return Err(invalid(
                "detection.rate_limit.threshold",
                "must be greater than 0",
            ));
        }
        if self.detection.rate_limit.window_secs == 0 {
            return Err(invalid(
                "detection.rate_limit.window_secs",
                "must be greater than 0",
            ));
        }
        if self.detection.suspicious.window_secs == 0 {
            return Err(invalid(
                "detection.suspicious.window_secs",
                "must be greater than 0",
            ));
        }
        if let Some(entry) = self
            .detection
            .suspicious
            .entries
            .iter()
            .find(|e| e.protocol == Protocol::Other)
        {
            return Err(invalid(
                "detection.suspicious.entries",
                format!("port {} must use protocol TCP or UDP", entry.port),
            ));
        }

        if self.scan.duration_secs == 0 {
            return Err(invalid("scan.duration_secs", "must be greater than 0"));
        }
        if self.scan.workers == 0 {
            return Err(invalid("scan.workers", "must be greater than 0"));
        }
        if self.scan.grace_period_secs == 0 {
            return Err(invalid("scan.grace_period_secs", "must be greater than 0"));
        }
        // 캡처 스레드는 읽기 타임아웃마다 중지 플래그를 확인함
        if self.scan.grace_period() <= self.capture.read_timeout() {
            return Err(invalid(
                "scan.grace_period_secs",
                format!(
                    "must be longer than capture.read_timeout_ms ({} ms)",
                    self.capture.read_timeout_ms
                ),
            ));
        }

        if self.sink.output_path.is_empty() {
            return Err(invalid("sink.output_path", "must not be empty"));
        }
        if self.sink.channel_capacity == 0 {
            return Err(invalid("sink.channel_capacity", "must be greater than 0"));
        }

        if self.watch.refresh_secs == 0 {
            return Err(invalid("watch.refresh_secs", "must be greater than 0"));
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> SentinelError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason: reason.into(),
    }
    .into()
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "pretty".to_owned(),
        }
    }
}

/// 패킷 소스 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// 캡처 인터페이스 (빈 문자열이면 기본 디바이스 조회)
    pub interface: String,
    /// 커널 레벨 BPF 필터 식
    pub filter: String,
    /// 프레임당 최대 캡처 길이
    pub snaplen: u32,
    /// 무차별 모드
    pub promiscuous: bool,
    /// 읽기 타임아웃 (밀리초). 캡처 루프가 중지 플래그를 확인하는 주기입니다.
    pub read_timeout_ms: u64,
    /// 캡처와 워커 사이 큐 용량
    pub queue_capacity: usize,
    /// 오프라인 재생할 pcap 파일 (빈 문자열이면 라이브 캡처)
    pub pcap_file: String,
}

impl CaptureConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            interface: String::new(),
            filter: "tcp or udp or icmp or icmp6".to_owned(),
            snaplen: 65535,
            promiscuous: true,
            read_timeout_ms: 200,
            queue_capacity: 4096,
            pcap_file: String::new(),
        }
    }
}

/// 탐지 규칙 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub port_scan: PortScanConfig,
    pub rate_limit: RateLimitConfig,
    pub suspicious: SuspiciousConfig,
}

/// 포트 스캔 규칙 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortScanConfig {
    /// 윈도우 내 고유 목적지 포트 수 임계값 (이상이면 탐지)
    pub threshold: usize,
    /// 윈도우 크기 (초)
    pub window_secs: u64,
}

impl PortScanConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl Default for PortScanConfig {
    fn default() -> Self {
        Self {
            threshold: 10,
            window_secs: 10,
        }
    }
}

/// 속도 제한 규칙 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// 윈도우 내 패킷 수 임계값 (초과하면 탐지)
    pub threshold: usize,
    /// 윈도우 크기 (초)
    pub window_secs: u64,
}

impl RateLimitConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            threshold: 100,
            window_secs: 10,
        }
    }
}

/// 의심 프로토콜/포트 규칙 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SuspiciousConfig {
    pub enabled: bool,
    /// 같은 출발지에 대해 다시 알림을 낼 수 있는 간격 (초)
    pub window_secs: u64,
    /// 금지된 (프로토콜, 포트) 목록
    pub entries: Vec<SuspiciousPortEntry>,
}

impl SuspiciousConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl Default for SuspiciousConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_secs: 10,
            entries: SuspiciousPortEntry::defaults(),
        }
    }
}

/// 금지된 (프로토콜, 목적지 포트) 조합
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuspiciousPortEntry {
    pub protocol: Protocol,
    pub port: u16,
    /// 사람이 읽는 서비스 이름
    #[serde(default)]
    pub label: String,
}

impl SuspiciousPortEntry {
    fn new(protocol: Protocol, port: u16, label: &str) -> Self {
        Self {
            protocol,
            port,
            label: label.to_owned(),
        }
    }

    /// 평문 관리 프로토콜과 잘 알려진 백도어 포트
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new(Protocol::Tcp, 21, "ftp"),
            Self::new(Protocol::Tcp, 23, "telnet"),
            Self::new(Protocol::Udp, 69, "tftp"),
            Self::new(Protocol::Tcp, 445, "smb"),
            Self::new(Protocol::Tcp, 513, "rlogin"),
            Self::new(Protocol::Tcp, 514, "rsh"),
            Self::new(Protocol::Tcp, 1433, "mssql"),
            Self::new(Protocol::Tcp, 3389, "rdp"),
            Self::new(Protocol::Tcp, 31337, "back-orifice"),
        ]
    }
}

/// 스캔 실행 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// 스캔 모드 실행 시간 (초)
    pub duration_secs: u64,
    /// 워커 태스크 수
    pub workers: usize,
    /// 중지 후 워커 종료 대기 한도 (초)
    pub grace_period_secs: u64,
}

impl ScanConfig {
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            duration_secs: 30,
            workers: 4,
            grace_period_secs: 5,
        }
    }
}

/// 알림 저장소 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// 최종 알림 컬렉션 경로
    pub output_path: String,
    /// 실행 중 중간 체크포인트 주기 (초, 0이면 종료 시에만 기록)
    pub flush_interval_secs: u64,
    /// 폴링 인터페이스용 최근 알림 보관 수
    pub recent_capacity: usize,
    /// 워커에서 기록 태스크로 가는 채널 용량
    pub channel_capacity: usize,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            output_path: "alerts.json".to_owned(),
            flush_interval_secs: 0,
            recent_capacity: 100,
            channel_capacity: 1024,
        }
    }
}

/// 대화형 모드 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// 상태 출력 주기 (초)
    pub refresh_secs: u64,
    /// 상태 출력에 포함할 최근 알림 수
    pub recent_alerts: usize,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            refresh_secs: 2,
            recent_alerts: 5,
        }
    }
}

/// Prometheus 메트릭 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub listen_addr: String,
    pub port: u16,
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9100,
            endpoint: "/metrics".to_owned(),
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    override_parsed(target, env_key, "bool");
}

fn override_usize(target: &mut usize, env_key: &str) {
    override_parsed(target, env_key, "usize");
}

fn override_u16(target: &mut u16, env_key: &str) {
    override_parsed(target, env_key, "u16");
}

fn override_u32(target: &mut u32, env_key: &str) {
    override_parsed(target, env_key, "u32");
}

fn override_u64(target: &mut u64, env_key: &str) {
    override_parsed(target, env_key, "u64");
}

fn override_parsed<T: std::str::FromStr>(target: &mut T, env_key: &str, type_name: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<T>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                expected = type_name,
                "failed to parse env var override, ignoring"
            ),
        }
    }
}
