//! Metric names and recorder setup for switchboard.
//!
//! Crates record through the `metrics` facade macros re-exported here, using
//! the names in [`definitions`]. Without an installed recorder every call is a
//! no-op. With the `prometheus` feature, [`init_metrics`] installs an exporter
//! whose [`MetricsHandle::render`] output can back a `/metrics` endpoint.
//!
//! ```rust,ignore
//! use switchboard_metrics::{counter, transport};
//!
//! counter!(transport::ADMISSIONS_TOTAL, "scope" => "global").increment(1);
//! ```

mod definitions;
mod error;
mod recorder;

pub use {
    definitions::*,
    error::{Error, Result},
    recorder::{MetricsHandle, MetricsRecorderConfig, init_metrics},
};

pub use metrics::{counter, gauge, histogram};
