//! Collector module
//!
//! This module contains all the collection functionality including
//! core types, configuration, rate limiting, the upstream APIs and batch runs.

pub mod api;
pub mod batch;
pub mod config;
pub mod core;
pub mod fetcher;
pub mod rate_limit;
pub mod sources;
pub mod r#lib;

// Re-export main types for convenience
pub use r#lib::Collector;
pub use api::{CruxApi, MeasurementApi, PsiApi};
pub use batch::{dedupe_urls, BatchCoordinator, BatchMetrics, BatchMetricsSnapshot, BatchResults};
pub use config::{CollectorConfig, CollectorConfigBuilder, RateLimitConfig, ThrottleRetryConfig, API_KEY_ENV};
pub use core::{
    aggregate_status, classify, classify_score, classify_value, CollectorError, ConsoleProgressReporter,
    CoreWebVitalsPolicy, CoreWebVitalsStatus, Device, Distribution, ErrorSeverity, Failure, FileOperation,
    FormFactor, IntoProgressCallback, Measurement, MetricKind, MetricReading, MetricSample, MetricVerdict,
    NullProgressReporter, Outcome, ProgressCallback, ProgressEvent, ProgressReporter, ReadingSlot,
    ReportLayout, Result, Source, Strategy, Thresholds, UrlResult,
};
pub use fetcher::{AbsentReason, FetchOutcome, Fetcher};
pub use rate_limit::RateLimiter;
pub use sources::{cap_urls, UrlSource};
