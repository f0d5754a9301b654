//! Sentinel daemon library.
//!
//! Exposes the scan coordinator and command handlers for integration testing.
//! In production the crate is used through the `sentinel` binary (main.rs).

pub mod cli;
pub mod commands;
pub mod coordinator;
pub mod error;
pub mod logging;
pub mod metrics_server;
pub mod monitor;
pub mod output;

pub use coordinator::{EndReason, RunReport, RunState, ScanCoordinator, SourceFactory};
pub use error::{CliError, RunError};
pub use monitor::{RunMonitor, RunStatus};
