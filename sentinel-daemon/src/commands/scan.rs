//! `sentinel scan` command handler

use std::io::Write;
use std::path::Path;

use tracing::info;

use crate::cli::ScanArgs;
use crate::commands::{init_runtime, load_config, wait_for_shutdown_signal};
use crate::coordinator::{RunReport, ScanCoordinator};
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute a bounded scan and print its report.
///
/// A signal ends the scan early; the collection is still finalized.
pub async fn execute(
    args: ScanArgs,
    config_path: &Path,
    log_level: Option<&str>,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let loaded = load_config(config_path).await?;
    let mut config = loaded.config;
    args.apply(&mut config);
    init_runtime(&mut config, log_level, config_path, loaded.from_file)?;

    let duration = config.scan.duration();
    let mut coordinator = ScanCoordinator::from_config(config);

    let cancel = coordinator.cancel_token();
    let signals = tokio::spawn(async move {
        match wait_for_shutdown_signal().await {
            Ok(signal) => {
                info!(signal, "shutdown signal received, ending scan early");
                cancel.cancel();
            }
            Err(e) => tracing::warn!(error = %e, "signal handling unavailable"),
        }
    });

    let result = coordinator.run(Some(duration)).await;
    signals.abort();

    writer.render(&result?)?;
    Ok(())
}

impl Render for RunReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        use colored::Colorize;

        writeln!(w, "Scan {} ({})", self.run_id.to_string().bold(), self.end_reason)?;
        writeln!(w, "  Elapsed:  {:.2}s", self.elapsed.as_secs_f64())?;
        writeln!(
            w,
            "  Packets:  {} total ({} TCP, {} UDP, {} other)",
            self.stats.total_packets,
            self.stats.tcp_packets,
            self.stats.udp_packets,
            self.stats.other_packets
        )?;
        writeln!(
            w,
            "  Frames:   {} captured, {} dropped",
            self.frames_captured, self.dropped_frames
        )?;

        let alerts = self.alert_count.to_string();
        let alerts = if self.alert_count > 0 {
            alerts.red().bold()
        } else {
            alerts.green().bold()
        };
        writeln!(w, "  Alerts:   {} written to {}", alerts, self.output)?;
        Ok(())
    }
}
