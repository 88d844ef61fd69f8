//! Main entry point for batch collection
//!
//! The call chain flows as follows:
//!
//! User Code
//! ↓
//! Collector (this file)
//! ↓
//! BatchCoordinator (batch.rs)
//! ↓
//! Fetcher (fetcher.rs) gated by RateLimiter (rate_limit.rs)
//! ↓
//! MeasurementApi (api/*)
//! ↓
//! Core types (core/*)

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::collector::{
    api::{CruxApi, MeasurementApi, PsiApi},
    batch::{BatchCoordinator, BatchResults},
    config::CollectorConfig,
    core::{FormFactor, ProgressCallback, Result, Strategy},
    sources::{cap_urls, UrlSource},
};

/// Collector bound to one measurement API and one configuration
pub struct Collector {
    coordinator: BatchCoordinator,
}

impl Collector {
    /// Field data from the record-query API; the policy must name record metrics
    pub fn crux(config: CollectorConfig, form_factor: FormFactor) -> Result<Self> {
        let api = CruxApi::new(config.api_key.clone(), form_factor, &config.metrics, config.policy)?;
        Self::with_api(Arc::new(api), config)
    }

    /// Lab and field data from the page-analysis API
    pub fn psi(config: CollectorConfig, strategy: Strategy) -> Result<Self> {
        let api = PsiApi::new(config.api_key.clone(), strategy, config.policy)?;
        Self::with_api(Arc::new(api), config)
    }

    /// Create a collector for a custom API implementation
    pub fn with_api(api: Arc<dyn MeasurementApi>, config: CollectorConfig) -> Result<Self> {
        Ok(Self {
            coordinator: BatchCoordinator::new(api, config)?,
        })
    }

    pub fn api_name(&self) -> &'static str {
        self.coordinator.api().name()
    }

    pub fn config(&self) -> &CollectorConfig {
        self.coordinator.config()
    }

    /// Load and cap the URL list of a source
    pub async fn load_urls(&self, source: &UrlSource, max_urls: Option<usize>) -> Result<Vec<String>> {
        let urls = source.load(self.coordinator.client()).await?;
        Ok(cap_urls(urls, max_urls))
    }

    /// Collect every URL; see [`BatchCoordinator::run`]
    pub async fn collect<S: AsRef<str>>(
        &self,
        urls: &[S],
        cancel: &CancellationToken,
        progress_callback: Option<ProgressCallback>,
    ) -> Result<BatchResults> {
        self.coordinator.run(urls, cancel, progress_callback).await
    }
}
