//! Kotoba Telemetry - `tracing` subscriber setup.
//!
//! Installs one global subscriber with an env filter and a formatter chosen
//! from [`LogFormat`], writing to stdout, stderr or a rolling file.
//!
//! # Example
//!
//! ```rust,no_run
//! use kotoba_telemetry::{LogConfig, LogFormat, setup_logging};
//!
//! # fn main() -> Result<(), kotoba_telemetry::TelemetryError> {
//! let config = LogConfig::new("info")
//!     .with_format(LogFormat::Compact)
//!     .with_directive("kotoba::guest=debug");
//! setup_logging(&config)?;
//! tracing::info!("ready");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

mod error;
mod logging;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{
    FileLogConfig, FileRotation, LogConfig, LogFormat, LogTarget, setup_default_logging,
    setup_logging,
};
