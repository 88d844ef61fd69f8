//! Web Vitals Collector Library
//!
//! This library collects Core Web Vitals and Lighthouse lab metrics for a
//! batch of URLs from the Chrome UX Report and PageSpeed Insights APIs,
//! classifies every metric against fixed thresholds and assembles a flat
//! report with one row per URL.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use webvitals::{
//!     Collector, CollectorConfig, CollectorConfigBuilder, FormFactor, ProgressEvent,
//!     Report, Summary,
//! };
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> webvitals::Result<()> {
//! // Start from the record-query preset and supply the key
//! let config = CollectorConfigBuilder::crux()
//!     .api_key(CollectorConfig::api_key_from_env()?)
//!     .build();
//! let policy = config.policy;
//!
//! // Configuration errors surface here, before any request is sent
//! let collector = Collector::crux(config, FormFactor::Phone)?;
//!
//! let urls = vec!["https://example.com/", "https://example.com/about"];
//!
//! // Set up progress callback (optional)
//! let progress_callback = Arc::new(|event: ProgressEvent| {
//!     if let ProgressEvent::UrlCompleted { url, status } = event {
//!         println!("{}: {}", url, status);
//!     }
//! });
//!
//! let results = collector
//!     .collect(&urls, &CancellationToken::new(), Some(progress_callback))
//!     .await?;
//!
//! let report = Report::assemble(&urls, &results);
//! println!("{}", report.to_csv());
//! println!("{}", Summary::from_results(&results, &policy));
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Sliding-window rate limiting**: one limiter shared by every worker of a batch
//! - **Bounded throttle retry**: HTTP 429 is retried with a fixed backoff up to an attempt budget
//! - **Failure isolation**: every input URL yields exactly one result, whatever happens to it
//! - **Configurable pass/fail policy**: LCP, CLS and a selectable third metric
//! - **Cancellation**: a token checked before each admission and during every backoff
//! - **Progress tracking**: per-URL events and built-in batch metrics

pub mod collector;
pub mod report;

// Re-export commonly used types for convenience
pub use collector::{
    aggregate_status, cap_urls, classify, classify_score, AbsentReason, BatchCoordinator, BatchMetrics,
    BatchMetricsSnapshot, BatchResults, Collector, CollectorConfig, CollectorConfigBuilder, CollectorError,
    ConsoleProgressReporter, CoreWebVitalsPolicy, CoreWebVitalsStatus, CruxApi, Device, ErrorSeverity,
    Failure, FetchOutcome, Fetcher, FormFactor, IntoProgressCallback, MeasurementApi, MetricKind,
    MetricReading, MetricSample, MetricVerdict, NullProgressReporter, ProgressCallback, ProgressEvent,
    ProgressReporter, PsiApi, RateLimitConfig, RateLimiter, Result, Source, Strategy,
    ThrottleRetryConfig, UrlResult, UrlSource,
};
pub use report::{report_file_name, site_label, MetricCounts, Report, Summary};
