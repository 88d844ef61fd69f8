//! Chrome UX Report record-query API

use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use super::MeasurementApi;
use crate::collector::core::{
    parse_numeric, CollectorError, CoreWebVitalsPolicy, Device, Distribution, FormFactor, Measurement,
    MetricKind, MetricReading, MetricSample, MetricVerdict, ReadingSlot, ReportLayout, Result, Source,
};

pub const CRUX_API_URL: &str = "https://chromeuxreport.googleapis.com/v1/records:queryRecord";

#[derive(Debug, Deserialize)]
struct QueryResponse {
    record: Option<Record>,
}

#[derive(Debug, Deserialize)]
struct Record {
    #[serde(default)]
    key: RecordKey,
    #[serde(default)]
    metrics: HashMap<String, RecordMetric>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordKey {
    form_factor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RecordMetric {
    #[serde(default)]
    histogram: Vec<HistogramBin>,
    percentiles: Option<Percentiles>,
}

#[derive(Debug, Deserialize)]
struct HistogramBin {
    density: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Percentiles {
    p75: Option<Value>,
}

/// Metric name used by the record API
fn api_metric_name(kind: MetricKind) -> Option<&'static str> {
    match kind {
        MetricKind::Lcp => Some("largest_contentful_paint"),
        MetricKind::Cls => Some("cumulative_layout_shift"),
        MetricKind::Fcp => Some("first_contentful_paint"),
        MetricKind::Fid => Some("first_input_delay"),
        MetricKind::Inp => Some("interaction_to_next_paint"),
        MetricKind::Ttfb => Some("experimental_time_to_first_byte"),
        MetricKind::Tbt | MetricKind::Tti | MetricKind::SpeedIndex => None,
    }
}

/// Field-data client for the record-query endpoint
#[derive(Debug, Clone)]
pub struct CruxApi {
    api_key: String,
    endpoint: String,
    form_factor: FormFactor,
    metrics: Vec<MetricKind>,
    policy: CoreWebVitalsPolicy,
}

impl CruxApi {
    /// Track `metrics` for `form_factor`; the policy's own metrics are always
    /// requested so the aggregate can be computed. Lab-only kinds are dropped.
    pub fn new<S: Into<String>>(
        api_key: S,
        form_factor: FormFactor,
        metrics: &[MetricKind],
        policy: CoreWebVitalsPolicy,
    ) -> Result<Self> {
        if let Some(kind) = policy.metrics.iter().find(|kind| api_metric_name(**kind).is_none()) {
            return Err(CollectorError::Configuration {
                message: format!(
                    "policy '{}' needs {}, which the record API does not report",
                    policy.name, kind
                ),
                field: Some("policy".to_string()),
                suggestion: Some("Use the inp, fid or fcp policy with the record API".to_string()),
            });
        }

        let mut tracked: Vec<MetricKind> = Vec::new();
        for kind in metrics.iter().chain(policy.metrics.iter()) {
            if api_metric_name(*kind).is_some() && !tracked.contains(kind) {
                tracked.push(*kind);
            }
        }

        Ok(Self {
            api_key: api_key.into(),
            endpoint: CRUX_API_URL.to_string(),
            form_factor,
            metrics: tracked,
            policy,
        })
    }

    /// Point the client at another endpoint (mock servers, proxies)
    pub fn with_endpoint<S: Into<String>>(mut self, endpoint: S) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn metrics(&self) -> &[MetricKind] {
        &self.metrics
    }

    fn request_body(&self, url: &str) -> Value {
        let names: Vec<&str> = self.metrics.iter().filter_map(|k| api_metric_name(*k)).collect();
        let mut body = json!({
            "url": url,
            "metrics": names,
        });
        if let Some(form_factor) = self.form_factor.api_value() {
            body["formFactor"] = json!(form_factor);
        }
        body
    }

    fn reading(kind: MetricKind, metric: &RecordMetric) -> MetricReading {
        let p75 = metric.percentiles.as_ref().map(|p| parse_numeric(p.p75.as_ref()));
        let value = match p75 {
            Some(Ok(value)) => value,
            _ => None,
        };

        let density = |i: usize| {
            metric
                .histogram
                .get(i)
                .and_then(|bin| parse_numeric(bin.density.as_ref()).ok().flatten())
                .map(|d| d * 100.0)
        };
        let distribution = (!metric.histogram.is_empty()).then(|| Distribution {
            good_pct: density(0),
            needs_improvement_pct: density(1),
            poor_pct: density(2),
        });

        let sample = MetricSample::new(kind, value, distribution);
        if matches!(p75, Some(Err(()))) {
            MetricReading::with_verdict(Source::Field, sample, MetricVerdict::Unknown)
        } else {
            MetricReading::classified(Source::Field, sample)
        }
    }
}

impl MeasurementApi for CruxApi {
    fn name(&self) -> &'static str {
        "crux"
    }

    fn device(&self) -> Device {
        Device::FormFactor(self.form_factor)
    }

    fn layout(&self) -> ReportLayout {
        ReportLayout {
            slots: self.metrics.iter().copied().map(ReadingSlot::field).collect(),
            distributions: true,
            performance_score: false,
            field_status: false,
        }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(30)
    }

    fn request(&self, client: &Client, url: &str) -> RequestBuilder {
        client
            .post(&self.endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(&self.request_body(url))
    }

    fn interpret(&self, url: &str, payload: &Value) -> Result<Measurement> {
        let response: QueryResponse = serde_json::from_value(payload.clone()).map_err(|e| {
            CollectorError::MalformedPayload {
                url: url.to_string(),
                reason: e.to_string(),
            }
        })?;

        let record = response.record.ok_or_else(|| CollectorError::EmptyRecord { url: url.to_string() })?;
        debug!("CrUX record for {} carries {} metrics", url, record.metrics.len());

        let readings: Vec<MetricReading> = self
            .metrics
            .iter()
            .map(|kind| {
                api_metric_name(*kind)
                    .and_then(|name| record.metrics.get(name))
                    .map(|metric| Self::reading(*kind, metric))
                    .unwrap_or_else(|| {
                        MetricReading::classified(Source::Field, MetricSample::new(*kind, None, None))
                    })
            })
            .collect();

        let status = self.policy.evaluate(|kind| {
            readings
                .iter()
                .find(|r| r.kind == kind)
                .map_or(MetricVerdict::NoData, |r| r.verdict)
        });

        let form_factor = record
            .key
            .form_factor
            .as_deref()
            .and_then(|f| f.parse::<FormFactor>().ok())
            .unwrap_or(FormFactor::All);

        Ok(Measurement {
            device: Device::FormFactor(form_factor),
            status,
            field_status: None,
            performance_score: None,
            readings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::core::CoreWebVitalsStatus;

    fn api() -> CruxApi {
        CruxApi::new("k", FormFactor::Phone, &MetricKind::FIELD, CoreWebVitalsPolicy::CURRENT).unwrap()
    }

    fn metric(p75: Value, densities: [f64; 3]) -> Value {
        json!({
            "histogram": [
                {"start": 0, "density": densities[0]},
                {"start": 1, "density": densities[1]},
                {"start": 2, "density": densities[2]}
            ],
            "percentiles": {"p75": p75}
        })
    }

    #[test]
    fn test_request_body_names_metrics_and_form_factor() {
        let body = api().request_body("https://a.example/");
        assert_eq!(body["url"], "https://a.example/");
        assert_eq!(body["formFactor"], "PHONE");
        assert!(body["metrics"].as_array().unwrap().contains(&json!("interaction_to_next_paint")));

        let all = CruxApi::new("k", FormFactor::All, &[MetricKind::Lcp], CoreWebVitalsPolicy::CURRENT).unwrap();
        let body = all.request_body("https://a.example/");
        assert!(body.get("formFactor").is_none());
        // Policy metrics are always requested
        assert_eq!(all.metrics(), &[MetricKind::Lcp, MetricKind::Cls, MetricKind::Inp]);
    }

    #[test]
    fn test_lab_policy_is_rejected() {
        let err = CruxApi::new("k", FormFactor::All, &MetricKind::FIELD, CoreWebVitalsPolicy::LAB).unwrap_err();
        assert_eq!(err.category(), "configuration");
        assert!(err.to_string().contains("TBT"));

        for policy in [CoreWebVitalsPolicy::LEGACY_FID, CoreWebVitalsPolicy::LEGACY_FCP] {
            assert!(CruxApi::new("k", FormFactor::All, &[], policy).is_ok());
        }
    }

    #[test]
    fn test_interpret_all_good_record_passes() {
        let payload = json!({
            "record": {
                "key": {"url": "https://a.example/", "formFactor": "PHONE"},
                "metrics": {
                    "largest_contentful_paint": metric(json!(2000), [0.8, 0.15, 0.05]),
                    "cumulative_layout_shift": metric(json!("0.05"), [0.9, 0.05, 0.05]),
                    "interaction_to_next_paint": metric(json!(150), [0.85, 0.1, 0.05])
                }
            }
        });

        let m = api().interpret("https://a.example/", &payload).unwrap();
        assert_eq!(m.status, CoreWebVitalsStatus::Passed);
        assert_eq!(m.device, Device::FormFactor(FormFactor::Phone));

        let cls = m.readings.iter().find(|r| r.kind == MetricKind::Cls).unwrap();
        assert_eq!(cls.value, Some(0.05));
        assert_eq!(cls.verdict, MetricVerdict::Good);
        let dist = cls.distribution.unwrap();
        assert_eq!(dist.good_pct, Some(90.0));

        let fid = m.readings.iter().find(|r| r.kind == MetricKind::Fid).unwrap();
        assert_eq!(fid.verdict, MetricVerdict::NoData);
    }

    #[test]
    fn test_missing_policy_metric_is_insufficient() {
        let payload = json!({
            "record": {
                "key": {},
                "metrics": {
                    "largest_contentful_paint": metric(json!(2000), [0.8, 0.15, 0.05]),
                    "cumulative_layout_shift": metric(json!("0.05"), [0.9, 0.05, 0.05])
                }
            }
        });
        let m = api().interpret("https://a.example/", &payload).unwrap();
        assert_eq!(m.status, CoreWebVitalsStatus::InsufficientData);
        assert_eq!(m.device, Device::FormFactor(FormFactor::All));
    }

    #[test]
    fn test_non_numeric_percentile_is_unknown() {
        let payload = json!({
            "record": {
                "metrics": {
                    "largest_contentful_paint": {"percentiles": {"p75": "fast"}}
                }
            }
        });
        let m = api().interpret("https://a.example/", &payload).unwrap();
        let lcp = m.readings.iter().find(|r| r.kind == MetricKind::Lcp).unwrap();
        assert_eq!(lcp.verdict, MetricVerdict::Unknown);
        assert!(lcp.distribution.is_none());
    }

    #[test]
    fn test_missing_record_is_empty() {
        let err = api().interpret("https://a.example/", &json!({})).unwrap_err();
        assert_eq!(err.category(), "empty_record");
    }

    #[test]
    fn test_wrong_shape_is_malformed() {
        let err = api()
            .interpret("https://a.example/", &json!({"record": {"metrics": []}}))
            .unwrap_err();
        assert_eq!(err.category(), "malformed_payload");
    }
}
