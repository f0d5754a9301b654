//! CLI argument parsing using clap derive API
//!
//! Purely declarative: no side effects or I/O. Flags override both the
//! configuration file and `SENTINEL_*` environment variables.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use sentinel_core::config::SentinelConfig;

/// Sentinel -- real-time network intrusion and anomaly detection.
///
/// Use `sentinel <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "sentinel", version, about, long_about = None)]
pub struct Cli {
    /// Path to the sentinel.toml configuration file.
    #[arg(short, long, global = true, default_value = "sentinel.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Report format.
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Capture for a fixed duration, then write the alert collection.
    Scan(ScanArgs),

    /// Capture until interrupted, printing a status line periodically.
    Watch(WatchArgs),

    /// Manage configuration.
    Config(ConfigArgs),
}

// ---- shared capture flags ----

/// Capture and output overrides shared by `scan` and `watch`.
#[derive(Args, Debug, Default)]
pub struct CaptureArgs {
    /// Interface to capture on (default: first capture device).
    #[arg(short, long)]
    pub interface: Option<String>,

    /// BPF filter expression applied in the kernel.
    #[arg(short, long)]
    pub filter: Option<String>,

    /// Path of the alert collection.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Replay a saved pcap file instead of capturing live.
    #[arg(short, long, value_name = "PCAP")]
    pub read: Option<PathBuf>,

    /// Number of worker tasks.
    #[arg(short, long)]
    pub workers: Option<usize>,
}

impl CaptureArgs {
    pub fn apply(&self, config: &mut SentinelConfig) {
        if let Some(interface) = &self.interface {
            config.capture.interface = interface.clone();
        }
        if let Some(filter) = &self.filter {
            config.capture.filter = filter.clone();
        }
        if let Some(output) = &self.output {
            config.sink.output_path = output.display().to_string();
        }
        if let Some(read) = &self.read {
            config.capture.pcap_file = read.display().to_string();
        }
        if let Some(workers) = self.workers {
            config.scan.workers = workers;
        }
    }
}

// ---- scan ----

/// Run a bounded scan.
#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Scan duration in seconds.
    #[arg(short, long)]
    pub duration: Option<u64>,

    #[command(flatten)]
    pub capture: CaptureArgs,
}

impl ScanArgs {
    pub fn apply(&self, config: &mut SentinelConfig) {
        self.capture.apply(config);
        if let Some(duration) = self.duration {
            config.scan.duration_secs = duration;
        }
    }
}

// ---- watch ----

/// Run until Ctrl-C or SIGTERM.
#[derive(Args, Debug)]
pub struct WatchArgs {
    /// Seconds between status lines.
    #[arg(long)]
    pub refresh: Option<u64>,

    #[command(flatten)]
    pub capture: CaptureArgs,
}

impl WatchArgs {
    pub fn apply(&self, config: &mut SentinelConfig) {
        self.capture.apply(config);
        if let Some(refresh) = self.refresh {
            config.watch.refresh_secs = refresh;
        }
    }
}

// ---- config ----

/// Manage sentinel configuration.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors.
    Validate,
    /// Show the effective configuration (file + env overrides + defaults).
    Show {
        /// Show only one section (general, capture, detection, scan, sink, watch, metrics).
        #[arg(long)]
        section: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_parses_capture_overrides() {
        let cli = Cli::try_parse_from([
            "sentinel",
            "scan",
            "--duration",
            "60",
            "--interface",
            "eth1",
            "--filter",
            "tcp",
            "--output",
            "/tmp/out.json",
        ])
        .expect("scan args should parse");

        let Commands::Scan(args) = cli.command else {
            panic!("expected scan command");
        };
        assert_eq!(args.duration, Some(60));
        assert_eq!(args.capture.interface.as_deref(), Some("eth1"));
        assert_eq!(args.capture.filter.as_deref(), Some("tcp"));
        assert_eq!(args.capture.output, Some(PathBuf::from("/tmp/out.json")));
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "sentinel",
            "watch",
            "--config",
            "/etc/sentinel.toml",
            "--format",
            "json",
            "--log-level",
            "debug",
        ])
        .expect("global flags should parse after the subcommand");

        assert_eq!(cli.config, PathBuf::from("/etc/sentinel.toml"));
        assert_eq!(cli.format, OutputFormat::Json);
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert!(matches!(cli.command, Commands::Watch(_)));
    }

    #[test]
    fn defaults_without_flags() {
        let cli = Cli::try_parse_from(["sentinel", "scan"]).expect("bare scan should parse");
        assert_eq!(cli.config, PathBuf::from("sentinel.toml"));
        assert_eq!(cli.format, OutputFormat::Text);
        assert!(cli.log_level.is_none());
    }

    #[test]
    fn config_show_section() {
        let cli = Cli::try_parse_from(["sentinel", "config", "show", "--section", "capture"])
            .expect("config show should parse");
        let Commands::Config(ConfigArgs {
            action: ConfigAction::Show { section },
        }) = cli.command
        else {
            panic!("expected config show");
        };
        assert_eq!(section.as_deref(), Some("capture"));
    }

    #[test]
    fn unknown_format_is_rejected() {
        assert!(Cli::try_parse_from(["sentinel", "--format", "xml", "scan"]).is_err());
    }

    #[test]
    fn missing_subcommand_is_rejected() {
        assert!(Cli::try_parse_from(["sentinel"]).is_err());
    }

    #[test]
    fn apply_overrides_config_fields() {
        let args = ScanArgs {
            duration: Some(5),
            capture: CaptureArgs {
                read: Some(PathBuf::from("trace.pcap")),
                workers: Some(8),
                ..CaptureArgs::default()
            },
        };
        let mut config = SentinelConfig::default();
        args.apply(&mut config);

        assert_eq!(config.scan.duration_secs, 5);
        assert_eq!(config.scan.workers, 8);
        assert_eq!(config.capture.pcap_file, "trace.pcap");
        // untouched fields keep their defaults
        assert_eq!(config.sink.output_path, "alerts.json");
    }
}
