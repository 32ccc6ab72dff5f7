//! # gaugewatch
//!
//! Periodically runs data-producing shell commands, parses their output into
//! named tables of rows and publishes selected cells as labeled gauges.
//!
//! ## Features
//!
//! - **Delimited and markup parsers**: colon separated text or HTML tables
//! - **scanf-style extraction**: pull a number out of `"-3.2 dBmV"`
//! - **Staleness gate**: a slow cycle never overwrites a newer one
//! - **Prometheus exposition**: `/metrics` next to a small JSON API
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gaugewatch::{load_config, MemoryGauge, WatchService};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> gaugewatch::Result<()> {
//!     let config = load_config("gaugewatch.yaml".as_ref())?;
//!     config.validate()?;
//!
//!     let service = WatchService::from_config(&config, |_| Arc::new(MemoryGauge::new()));
//!     let (snapshot, _) = service.refresh_once().await;
//!     println!("{} sources answered", snapshot.len());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod watch;
pub mod web;

// Re-export public API
pub use config::{load_config, parse_duration, AppConfig, DEFAULT_COMMAND_TIMEOUT};
pub use error::{CommandError, ParseError, Result, WatchError};
pub use watch::{
    Admission, CommandRunner, GaugeSink, MemoryGauge, Monitor, PrometheusGauge, ShellCommand,
    Snapshot, Source, WatchService,
};
pub use web::{start_web_server, AppState, WebConfig};

/// The default refresh period in milliseconds
pub const DEFAULT_REFRESH_MS: u64 = 1000;

/// The default web server port
pub const DEFAULT_WEB_PORT: u16 = 8081;

/// The default web server bind address
pub const DEFAULT_HOST: &str = "127.0.0.1";
