//! Run failures and exit code mapping

use std::time::Duration;

use sentinel_core::error::{CaptureError, SentinelError, SinkError};

/// Reason a scan run ended in the `Failed` state.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// The packet source could not be opened or failed while reading.
    #[error("capture failed: {0}")]
    Capture(#[from] CaptureError),

    /// The alert collection could not be persisted.
    #[error("alert sink failed: {0}")]
    Sink(SinkError),

    /// An internal channel closed while the run still needed it.
    #[error("internal channel closed: {0}")]
    ChannelClosed(String),

    /// A capture or worker task panicked.
    #[error("task panicked: {0}")]
    WorkerPanic(String),

    /// Tasks did not stop within the grace period after the stop signal.
    #[error("tasks did not stop within the {0:?} grace period")]
    GraceTimeout(Duration),

    /// Invalid or unreadable configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<SinkError> for RunError {
    fn from(e: SinkError) -> Self {
        match e {
            SinkError::ChannelClosed => Self::ChannelClosed("alert sink writer stopped".to_owned()),
            other => Self::Sink(other),
        }
    }
}

impl From<SentinelError> for RunError {
    fn from(e: SentinelError) -> Self {
        match e {
            SentinelError::Capture(e) => Self::Capture(e),
            SentinelError::Sink(e) => e.into(),
            other => Self::Config(other.to_string()),
        }
    }
}

impl RunError {
    /// Map the failure to a process exit code.
    ///
    /// | Code | Meaning                                  |
    /// |------|------------------------------------------|
    /// | 1    | Other failure                            |
    /// | 2    | Configuration error                      |
    /// | 3    | Capture device missing or not permitted  |
    /// | 4    | Alert collection write failure           |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            Self::Capture(e) if e.is_fatal_on_open() => 3,
            Self::Sink(SinkError::WriteFailed { .. }) => 4,
            _ => 1,
        }
    }
}

/// CLI-level error: a failed run or a failure around it.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// The scan run ended in the `Failed` state.
    #[error(transparent)]
    Run(#[from] RunError),

    /// A subcommand-specific operation failed.
    #[error("{0}")]
    Command(String),

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<SentinelError> for CliError {
    fn from(e: SentinelError) -> Self {
        match e {
            SentinelError::Config(e) => Self::Config(e.to_string()),
            other => Self::Run(other.into()),
        }
    }
}

impl CliError {
    /// Map the error to a process exit code. Run failures keep their own code.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) => 2,
            Self::Run(e) => e.exit_code(),
            Self::Command(_) | Self::JsonSerialize(_) | Self::Io(_) => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_core::error::ConfigError;

    #[test]
    fn capture_open_failures_exit_3() {
        let not_found = RunError::Capture(CaptureError::DeviceNotFound("eth9".to_owned()));
        assert_eq!(not_found.exit_code(), 3);

        let denied = RunError::Capture(CaptureError::PermissionDenied {
            device: "eth0".to_owned(),
            reason: "Operation not permitted".to_owned(),
        });
        assert_eq!(denied.exit_code(), 3);
    }

    #[test]
    fn mid_run_read_failure_exits_1() {
        let err = RunError::Capture(CaptureError::Read("interface went down".to_owned()));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn sink_write_failure_exits_4() {
        let err: RunError = SinkError::WriteFailed {
            path: "alerts.json".to_owned(),
            attempts: 2,
            reason: "disk full".to_owned(),
        }
        .into();
        assert_eq!(err.exit_code(), 4);
    }

    #[test]
    fn closed_sink_channel_becomes_channel_closed() {
        let err: RunError = SinkError::ChannelClosed.into();
        assert!(matches!(err, RunError::ChannelClosed(_)));
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn config_errors_exit_2() {
        let err: CliError = SentinelError::Config(ConfigError::InvalidValue {
            field: "scan.workers".to_owned(),
            reason: "must be greater than 0".to_owned(),
        })
        .into();
        assert!(matches!(err, CliError::Config(_)));
        assert_eq!(err.exit_code(), 2);
        assert_eq!(CliError::Run(RunError::Config("bad".to_owned())).exit_code(), 2);
    }

    #[test]
    fn grace_timeout_message_names_period() {
        let err = RunError::GraceTimeout(Duration::from_secs(5));
        assert_eq!(err.to_string(), "tasks did not stop within the 5s grace period");
    }
}
