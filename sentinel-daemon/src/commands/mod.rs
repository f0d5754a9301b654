//! Command handlers -- one module per subcommand, plus the setup they share

pub mod config;
pub mod scan;
pub mod watch;

use std::path::Path;

use tracing::info;

use sentinel_core::config::SentinelConfig;
use sentinel_core::error::{ConfigError, SentinelError};

use crate::error::CliError;
use crate::{logging, metrics_server};

/// Configuration for a run, before CLI overrides are applied.
#[derive(Debug)]
pub struct LoadedConfig {
    pub config: SentinelConfig,
    /// `false` when the file did not exist and defaults were used
    pub from_file: bool,
}

/// Reads the file (or falls back to defaults) and applies environment overrides.
///
/// Validation is left to the caller so CLI flags can still correct values.
pub async fn load_config(path: &Path) -> Result<LoadedConfig, CliError> {
    let (mut config, from_file) = match SentinelConfig::from_file(path).await {
        Ok(config) => (config, true),
        Err(SentinelError::Config(ConfigError::FileNotFound { .. })) => {
            (SentinelConfig::default(), false)
        }
        Err(e) => return Err(e.into()),
    };
    config.apply_env_overrides();
    Ok(LoadedConfig { config, from_file })
}

/// Validates the final configuration, then installs logging and the optional exporter.
pub fn init_runtime(
    config: &mut SentinelConfig,
    log_level: Option<&str>,
    config_path: &Path,
    from_file: bool,
) -> Result<(), CliError> {
    if let Some(level) = log_level {
        config.general.log_level = level.to_owned();
    }
    config.validate()?;

    logging::init_tracing(&config.general).map_err(|e| CliError::Config(e.to_string()))?;
    if !from_file {
        info!(path = %config_path.display(), "config file not found, using defaults");
    }

    if config.metrics.enabled {
        metrics_server::install_metrics_recorder(&config.metrics)
            .map_err(|e| CliError::Command(e.to_string()))?;
    }
    Ok(())
}

/// Wait for SIGTERM or SIGINT, returning the signal name.
#[cfg(unix)]
pub async fn wait_for_shutdown_signal() -> anyhow::Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("failed to install SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("failed to install SIGINT handler: {}", e))?;

    tokio::select! {
        _ = sigterm.recv() => Ok("SIGTERM"),
        _ = sigint.recv() => Ok("SIGINT"),
    }
}

/// Wait for Ctrl-C, returning the signal name.
#[cfg(not(unix))]
pub async fn wait_for_shutdown_signal() -> anyhow::Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("failed to install Ctrl-C handler: {}", e))?;
    Ok("ctrl-c")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = load_config(&dir.path().join("absent.toml")).await.unwrap();

        assert!(!loaded.from_file);
        assert_eq!(loaded.config.scan.duration_secs, 30);
    }

    #[tokio::test]
    async fn malformed_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[capture\ninterface = 1").unwrap();

        let err = load_config(&path).await.unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
