//! Logging setup for librarian.
//!
//! # Example
//!
//! ```rust,no_run
//! use librarian_telemetry::{LogConfig, LogFormat, setup_logging};
//!
//! # fn main() -> Result<(), librarian_telemetry::TelemetryError> {
//! let config = LogConfig::new("debug")
//!     .with_format(LogFormat::Compact)
//!     .with_directive("librarian_registry=trace");
//!
//! setup_logging(&config)?;
//! tracing::info!("catalog scan starting");
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

mod error;
mod logging;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::{LogConfig, LogFormat, LogTarget, setup_default_logging, setup_logging};
