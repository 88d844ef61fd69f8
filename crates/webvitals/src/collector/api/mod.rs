//! Upstream measurement APIs
//!
//! Each API knows how to build its request and how to turn a decoded payload
//! into a [`Measurement`]. Rate limiting, throttle retries and failure
//! conversion are handled once in the fetcher and the batch coordinator.

pub mod crux;
pub mod psi;

pub use crux::CruxApi;
pub use psi::PsiApi;

use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use std::time::Duration;

use crate::collector::core::{Device, Measurement, ReportLayout, Result};

/// One upstream measurement endpoint
pub trait MeasurementApi: Send + Sync {
    /// Short identifier used in file names and logs, e.g. `crux`
    fn name(&self) -> &'static str;

    /// Device selector sent with every request
    fn device(&self) -> Device;

    /// Shape of the rows this API produces
    fn layout(&self) -> ReportLayout;

    /// Default per-request timeout
    fn timeout(&self) -> Duration;

    /// Build the request for `url`, without sending it
    fn request(&self, client: &Client, url: &str) -> RequestBuilder;

    /// Interpret a decoded 200 payload
    ///
    /// Returns `EmptyRecord` when the upstream has nothing for the URL and
    /// `MalformedPayload` when the payload does not have the expected shape.
    fn interpret(&self, url: &str, payload: &Value) -> Result<Measurement>;
}
