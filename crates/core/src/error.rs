//! 에러 타입 — 도메인별 에러 정의
//!
//! 프레임 단위 에러([`ParseError`])는 플로우 추출기 밖으로 전파되지 않습니다.
//! 실행 단위 에러([`CaptureError`], [`SinkError`])는 스캔 코디네이터까지 전파되어
//! 실행 실패 여부를 결정합니다.

/// Sentinel 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum SentinelError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 패킷 소스 에러
    #[error("capture error: {0}")]
    Capture(#[from] CaptureError),

    /// 프레임 파싱 에러
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// 알림 저장 에러
    #[error("sink error: {0}")]
    Sink(#[from] SinkError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 패킷 소스 에러
///
/// `DeviceNotFound`와 `PermissionDenied`는 실행 시작 전에 발생하며 치명적입니다.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    /// 인터페이스(또는 캡처 파일)를 찾을 수 없음
    #[error("capture device not found: {0}")]
    DeviceNotFound(String),

    /// 캡처 권한 없음
    #[error("permission denied opening '{device}': {reason}")]
    PermissionDenied { device: String, reason: String },

    /// BPF 필터 컴파일/적용 실패
    #[error("invalid capture filter '{filter}': {reason}")]
    Filter { filter: String, reason: String },

    /// 디바이스 활성화 실패
    #[error("failed to open capture on '{device}': {reason}")]
    Open { device: String, reason: String },

    /// 캡처 도중 읽기 실패
    #[error("capture read failed: {0}")]
    Read(String),

    /// 오프라인 소스의 끝에 도달
    #[error("capture source exhausted")]
    Exhausted,
}

impl CaptureError {
    /// 실행을 시작하기 전에 발생하는 치명적 에러인지 확인합니다.
    pub fn is_fatal_on_open(&self) -> bool {
        matches!(
            self,
            Self::DeviceNotFound(_) | Self::PermissionDenied { .. } | Self::Filter { .. }
        )
    }
}

/// 프레임 파싱 에러
///
/// 치명적이지 않습니다. 해당 프레임을 건너뛰고 드롭 카운터를 증가시킵니다.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// 최소 길이 미달
    #[error("frame too short: {len} bytes (min: {min})")]
    Truncated { len: usize, min: usize },

    /// 지원하지 않는 링크 계층 타입
    #[error("unsupported link type: {0}")]
    UnsupportedLinkType(i32),

    /// IP 패킷이 아님 (ARP 등)
    #[error("frame does not carry an IP packet")]
    NotIp,

    /// 헤더 파싱 실패
    #[error("malformed frame: {0}")]
    Malformed(String),
}

/// 알림 저장 에러
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// 재시도 후에도 컬렉션 기록 실패 (치명적)
    #[error("failed to write alert collection to {path} after {attempts} attempts: {reason}")]
    WriteFailed {
        path: String,
        attempts: u32,
        reason: String,
    },

    /// 직렬화 실패
    #[error("failed to serialize alerts: {0}")]
    Serialize(String),

    /// 기록 태스크 채널이 닫힘
    #[error("alert sink channel closed")]
    ChannelClosed,

    /// 기록 태스크 종료 대기 실패
    #[error("alert sink writer task failed: {0}")]
    TaskJoin(String),
}
