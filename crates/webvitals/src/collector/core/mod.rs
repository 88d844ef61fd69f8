//! Core types used throughout the collector
//!
//! This module contains the fundamental types that all other modules depend on:
//! errors, the metric classifier, the aggregate status rule, result records and
//! progress events.

pub mod error;
pub mod metrics;
pub mod progress;
pub mod result;
pub mod status;

// Re-export main types for convenience
pub use error::{CollectorError, ErrorSeverity, FileOperation, Result};
pub use metrics::{
    classify, classify_score, classify_value, parse_numeric, Distribution, MetricKind, MetricSample,
    MetricVerdict, Thresholds,
};
pub use progress::{
    ConsoleProgressReporter, IntoProgressCallback, NullProgressReporter, ProgressCallback, ProgressEvent,
    ProgressReporter,
};
pub use result::{
    Device, Failure, FormFactor, Measurement, MetricReading, Outcome, ReadingSlot, ReportLayout, Source,
    Strategy, UrlResult,
};
pub use status::{aggregate_status, CoreWebVitalsPolicy, CoreWebVitalsStatus};
