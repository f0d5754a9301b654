//! `sentinel config` command handler

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use sentinel_core::config::SentinelConfig;

use crate::cli::{ConfigAction, ConfigArgs};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

const SECTIONS: &str = "general, capture, detection, scan, sink, watch, metrics";

/// Execute the `config` command.
pub async fn execute(
    args: ConfigArgs,
    config_path: &Path,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    match args.action {
        ConfigAction::Validate => {
            let report = validate_report(config_path).await;
            writer.render(&report)?;
            if !report.valid {
                return Err(CliError::Config("configuration is invalid".to_owned()));
            }
            Ok(())
        }
        ConfigAction::Show { section } => {
            let report = show_report(config_path, section.as_deref()).await?;
            writer.render(&report)
        }
    }
}

/// Load and validate the file, collecting the error instead of returning it.
///
/// Unlike `scan`, a missing file is reported as invalid here.
pub async fn validate_report(config_path: &Path) -> ConfigValidationReport {
    info!(path = %config_path.display(), "validating configuration");

    let errors = match SentinelConfig::load(config_path).await {
        Ok(_) => Vec::new(),
        Err(e) => vec![e.to_string()],
    };

    ConfigValidationReport {
        source: config_path.display().to_string(),
        valid: errors.is_empty(),
        errors,
    }
}

/// Effective configuration (file + env overrides + defaults), optionally one section.
pub async fn show_report(
    config_path: &Path,
    section: Option<&str>,
) -> Result<ConfigReport, CliError> {
    info!(path = %config_path.display(), "loading configuration");

    let config = SentinelConfig::load(config_path).await?;

    let config_toml = match section {
        None => toml::to_string_pretty(&config),
        Some("general") => toml::to_string_pretty(&config.general),
        Some("capture") => toml::to_string_pretty(&config.capture),
        Some("detection") => toml::to_string_pretty(&config.detection),
        Some("scan") => toml::to_string_pretty(&config.scan),
        Some("sink") => toml::to_string_pretty(&config.sink),
        Some("watch") => toml::to_string_pretty(&config.watch),
        Some("metrics") => toml::to_string_pretty(&config.metrics),
        Some(other) => {
            return Err(CliError::Command(format!(
                "unknown section: {} (expected: {})",
                other, SECTIONS
            )));
        }
    }
    .map_err(|e| CliError::Command(format!("failed to serialize configuration: {}", e)))?;

    Ok(ConfigReport {
        source: config_path.display().to_string(),
        section: section.map(str::to_owned),
        config_toml,
    })
}

/// Configuration display report.
///
/// `config_toml` is only used for text rendering.
#[derive(Debug, Serialize)]
pub struct ConfigReport {
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
    #[serde(skip)]
    pub config_toml: String,
}

impl Render for ConfigReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        match &self.section {
            Some(section) => writeln!(
                w,
                "Configuration {} (source: {})",
                format!("[{}]", section).bold(),
                self.source
            )?,
            None => writeln!(w, "Configuration (source: {})", self.source.bold())?,
        }
        writeln!(w)?;
        write!(w, "{}", self.config_toml)
    }
}

/// Configuration validation report.
#[derive(Debug, Serialize)]
pub struct ConfigValidationReport {
    pub source: String,
    pub valid: bool,
    /// Empty when valid
    pub errors: Vec<String>,
}

impl Render for ConfigValidationReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Config Validation: {}", self.source.bold())?;
        if self.valid {
            writeln!(w, "  Result: {}", "VALID".green().bold())?;
        } else {
            writeln!(w, "  Result: {}", "INVALID".red().bold())?;
            for err in &self.errors {
                writeln!(w, "  Error: {}", err.red())?;
            }
        }
        Ok(())
    }
}
