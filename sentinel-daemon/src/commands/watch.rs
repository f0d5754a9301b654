//! `sentinel watch` command handler

use std::path::Path;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::cli::WatchArgs;
use crate::commands::{init_runtime, load_config, wait_for_shutdown_signal};
use crate::coordinator::ScanCoordinator;
use crate::error::CliError;
use crate::monitor::RunMonitor;
use crate::output::OutputWriter;

/// Run until interrupted, logging a status line every `watch.refresh_secs`.
pub async fn execute(
    args: WatchArgs,
    config_path: &Path,
    log_level: Option<&str>,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let loaded = load_config(config_path).await?;
    let mut config = loaded.config;
    args.apply(&mut config);
    init_runtime(&mut config, log_level, config_path, loaded.from_file)?;

    let refresh = Duration::from_secs(config.watch.refresh_secs.max(1));
    let recent = config.watch.recent_alerts;
    let mut coordinator = ScanCoordinator::from_config(config);

    let cancel = coordinator.cancel_token();
    let signals = tokio::spawn(async move {
        match wait_for_shutdown_signal().await {
            Ok(signal) => info!(signal, "shutdown signal received"),
            Err(e) => warn!(error = %e, "signal handling unavailable, stopping"),
        }
        cancel.cancel();
    });
    let status = spawn_status_reporter(coordinator.monitor(), refresh, recent);

    let result = coordinator.run(None).await;
    signals.abort();
    status.abort();

    writer.render(&result?)?;
    Ok(())
}

/// Logs the monitor's status until the run reaches a terminal state.
pub fn spawn_status_reporter(monitor: RunMonitor, every: Duration, recent: usize) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            let status = monitor.status(recent);
            if status.state.is_terminal() {
                break;
            }
            info!(
                state = %status.state,
                total = status.stats.total_packets,
                tcp = status.stats.tcp_packets,
                udp = status.stats.udp_packets,
                other = status.stats.other_packets,
                alerts = status.alerts,
                dropped = status.dropped_frames,
                sources = status.tracked_sources,
                "status"
            );
            for alert in &status.recent_alerts {
                info!(alert = %alert, "recent alert");
            }
        }
    })
}
