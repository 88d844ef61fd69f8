//! Batch collection with bounded concurrency and per-URL failure isolation

use futures::stream::{self, StreamExt};
use reqwest::Client;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::collector::{
    api::MeasurementApi,
    config::CollectorConfig,
    core::{
        CollectorError, CoreWebVitalsStatus, Device, Failure, Outcome, ProgressCallback, ProgressEvent,
        ReportLayout, Result, UrlResult,
    },
    fetcher::{FetchOutcome, Fetcher},
    rate_limit::RateLimiter,
};

/// Counters for one batch run
#[derive(Debug, Default)]
pub struct BatchMetrics {
    pub dispatched: AtomicU64,
    pub measured: AtomicU64,
    pub no_data: AtomicU64,
    pub errored: AtomicU64,
    pub throttle_retries: AtomicU64,
    pub rate_limit_waits: AtomicU64,
}

impl BatchMetrics {
    pub fn record_dispatched(&self) {
        self.dispatched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_result(&self, result: &UrlResult) {
        let counter = if result.is_measured() {
            &self.measured
        } else if result.status == CoreWebVitalsStatus::NoData {
            &self.no_data
        } else {
            &self.errored
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_throttle_retry(&self) {
        self.throttle_retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rate_limit_waits(&self, waits: u64) {
        self.rate_limit_waits.fetch_add(waits, Ordering::Relaxed);
    }

    /// Get metrics snapshot
    pub fn snapshot(&self) -> BatchMetricsSnapshot {
        BatchMetricsSnapshot {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            measured: self.measured.load(Ordering::Relaxed),
            no_data: self.no_data.load(Ordering::Relaxed),
            errored: self.errored.load(Ordering::Relaxed),
            throttle_retries: self.throttle_retries.load(Ordering::Relaxed),
            rate_limit_waits: self.rate_limit_waits.load(Ordering::Relaxed),
        }
    }
}

/// Immutable snapshot of metrics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchMetricsSnapshot {
    pub dispatched: u64,
    pub measured: u64,
    pub no_data: u64,
    pub errored: u64,
    pub throttle_retries: u64,
    pub rate_limit_waits: u64,
}

impl BatchMetricsSnapshot {
    pub fn success_rate(&self) -> f64 {
        if self.dispatched == 0 {
            0.0
        } else {
            self.measured as f64 / self.dispatched as f64
        }
    }
}

/// Every URL of a batch mapped to its single result
#[derive(Debug, Clone)]
pub struct BatchResults {
    pub results: HashMap<String, UrlResult>,
    /// Distinct input URLs in first-occurrence order
    pub order: Vec<String>,
    pub layout: ReportLayout,
    pub device: Device,
    pub api: &'static str,
    pub metrics: BatchMetricsSnapshot,
    pub elapsed: Duration,
}

impl BatchResults {
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn get(&self, url: &str) -> Option<&UrlResult> {
        self.results.get(url)
    }

    /// Results in input order
    pub fn ordered(&self) -> Vec<&UrlResult> {
        self.order.iter().filter_map(|url| self.results.get(url)).collect()
    }

    pub fn count(&self, status: CoreWebVitalsStatus) -> usize {
        self.results.values().filter(|r| r.status == status).count()
    }
}

/// Drop repeated URLs, keeping first-occurrence order
pub fn dedupe_urls<I, S>(urls: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    urls.into_iter()
        .map(|u| u.as_ref().trim().to_string())
        .filter(|u| !u.is_empty() && seen.insert(u.clone()))
        .collect()
}

/// Runs one API over a list of URLs
///
/// A batch always yields exactly one [`UrlResult`] per distinct input URL. The
/// only error `run` can return is a configuration error raised before any
/// request is sent, such as a blank entry in the URL list.
pub struct BatchCoordinator {
    api: Arc<dyn MeasurementApi>,
    client: Client,
    config: CollectorConfig,
}

impl BatchCoordinator {
    /// Validate the configuration and build the shared HTTP client
    pub fn new(api: Arc<dyn MeasurementApi>, config: CollectorConfig) -> Result<Self> {
        config.validate()?;

        let client = Client::builder()
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| CollectorError::Configuration {
                message: format!("Failed to create HTTP client: {}", e),
                field: None,
                suggestion: None,
            })?;

        Ok(Self { api, client, config })
    }

    pub fn config(&self) -> &CollectorConfig {
        &self.config
    }

    pub fn api(&self) -> &Arc<dyn MeasurementApi> {
        &self.api
    }

    /// The HTTP client shared by every request of this coordinator
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Collect every URL, honoring both the concurrency and the rate ceiling
    pub async fn run<S: AsRef<str>>(
        &self,
        urls: &[S],
        cancel: &CancellationToken,
        progress_callback: Option<ProgressCallback>,
    ) -> Result<BatchResults> {
        let started = Instant::now();
        if let Some(index) = urls.iter().position(|u| u.as_ref().trim().is_empty()) {
            return Err(CollectorError::Configuration {
                message: format!("URL list entry {} is blank", index + 1),
                field: Some("urls".to_string()),
                suggestion: Some("Remove empty entries from the URL list".to_string()),
            });
        }
        let order = dedupe_urls(urls);

        // A fresh window per batch
        let limiter = Arc::new(RateLimiter::from_config(&self.config.rate_limit)?);
        let fetcher = Arc::new(
            Fetcher::new(self.client.clone(), Arc::clone(&limiter), self.config.throttle_retry)
                .with_timeout(self.config.timeout),
        );
        let metrics = Arc::new(BatchMetrics::default());
        let layout = self.api.layout();
        let device = self.api.device();

        info!(
            "Collecting {} URLs ({} unique) from {} with concurrency {} and {} queries per {:?}",
            urls.len(),
            order.len(),
            self.api.name(),
            self.config.concurrency,
            self.config.rate_limit.max_queries,
            self.config.rate_limit.window
        );

        let results: HashMap<String, UrlResult> = stream::iter(order.iter().cloned())
            .map(|url| {
                let api = Arc::clone(&self.api);
                let fetcher = Arc::clone(&fetcher);
                let metrics = Arc::clone(&metrics);
                let cancel = cancel.clone();
                let progress_cb = progress_callback.clone();
                let layout = &layout;
                async move {
                    metrics.record_dispatched();

                    let task_url = url.clone();
                    let task_metrics = Arc::clone(&metrics);
                    let task_progress = progress_cb.clone();
                    let handle = tokio::spawn(async move {
                        collect_url(api, fetcher, task_url, cancel, task_metrics, task_progress).await
                    });

                    let outcome = match handle.await {
                        Ok(outcome) => outcome,
                        Err(e) => {
                            let message = panic_message(e);
                            warn!("Worker for {} crashed: {}", url, message);
                            if let Some(ref callback) = progress_cb {
                                callback(ProgressEvent::Error {
                                    url: url.clone(),
                                    error: message.clone(),
                                });
                            }
                            Outcome::Failed(Failure::Panicked(message))
                        }
                    };

                    let result = UrlResult::new(url.clone(), device, layout, outcome);
                    metrics.record_result(&result);
                    if let Some(ref callback) = progress_cb {
                        callback(ProgressEvent::UrlCompleted {
                            url: url.clone(),
                            status: result.status,
                        });
                    }
                    (url, result)
                }
            })
            .buffer_unordered(self.config.concurrency)
            .collect()
            .await;

        metrics.record_rate_limit_waits(limiter.waits());
        let snapshot = metrics.snapshot();
        let elapsed = started.elapsed();

        info!(
            "Batch finished in {:.1}s: {} measured, {} no data, {} errors, {} throttle retries",
            elapsed.as_secs_f64(),
            snapshot.measured,
            snapshot.no_data,
            snapshot.errored,
            snapshot.throttle_retries
        );

        Ok(BatchResults {
            results,
            order,
            layout,
            device,
            api: self.api.name(),
            metrics: snapshot,
            elapsed,
        })
    }
}

/// Fetch and interpret one URL; never fails, every error becomes a `Failure`
async fn collect_url(
    api: Arc<dyn MeasurementApi>,
    fetcher: Arc<Fetcher>,
    url: String,
    cancel: CancellationToken,
    metrics: Arc<BatchMetrics>,
    progress_callback: Option<ProgressCallback>,
) -> Outcome {
    if cancel.is_cancelled() {
        return Outcome::Failed(Failure::Cancelled);
    }

    if let Some(ref callback) = progress_callback {
        callback(ProgressEvent::UrlStarted { url: url.clone() });
    }

    let result = match fetcher
        .fetch(api.as_ref(), &url, &cancel, &metrics, progress_callback.as_ref())
        .await
    {
        Ok(FetchOutcome::Payload(payload)) => api.interpret(&url, &payload),
        Ok(FetchOutcome::Absent(reason)) => {
            debug!("No payload for {}: {:?}", url, reason);
            return Outcome::Failed(reason.into());
        }
        Err(e) => Err(e),
    };

    match result {
        Ok(measurement) => Outcome::Measured(measurement),
        Err(e) => {
            let failure = Failure::from(&e);
            if failure.status() == CoreWebVitalsStatus::Error {
                warn!("Failed to collect {}: {}", url, e);
                if let Some(ref callback) = progress_callback {
                    callback(ProgressEvent::Error {
                        url: url.clone(),
                        error: e.to_string(),
                    });
                }
            } else {
                debug!("No data for {}: {}", url, e);
            }
            Outcome::Failed(failure)
        }
    }
}

fn panic_message(error: tokio::task::JoinError) -> String {
    if !error.is_panic() {
        return error.to_string();
    }
    let payload = error.into_panic();
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "worker panicked".to_string()
    }
}
