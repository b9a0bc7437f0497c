//! Shared code of the `validate-ids` and `fetch-coords` binaries.
//!
//! - [`config`]: command-line arguments and their validation.
//! - [`run`]: the end-to-end drivers.
//! - [`output`]: report, clean list and coordinate table rendering.
//! - [`telemetry`]: logging and optional OpenTelemetry export.

pub mod config;
pub mod output;
pub mod run;
pub mod telemetry;
