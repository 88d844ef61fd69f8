//! PageSpeed Insights page-analysis API
//!
//! One response carries both a synthetic lab run and, when the page has enough
//! traffic, a field-data section. Lab verdicts come from the audit scores and
//! are aggregated with the lab policy; field verdicts come from the upstream
//! category labels and are aggregated with the configured policy.

use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use super::MeasurementApi;
use crate::collector::core::{
    classify_score, parse_numeric, CollectorError, CoreWebVitalsPolicy, Device, Measurement, MetricKind,
    MetricReading, MetricSample, MetricVerdict, ReadingSlot, ReportLayout, Result, Source, Strategy,
};

pub const PSI_API_URL: &str = "https://www.googleapis.com/pagespeedonline/v5/runPagespeed";

/// Lab metrics in report order
pub const LAB_METRICS: [MetricKind; 6] = [
    MetricKind::Lcp,
    MetricKind::Cls,
    MetricKind::Fcp,
    MetricKind::Tbt,
    MetricKind::Tti,
    MetricKind::SpeedIndex,
];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalysisResponse {
    lighthouse_result: Option<LighthouseResult>,
    loading_experience: Option<LoadingExperience>,
}

#[derive(Debug, Deserialize)]
struct LighthouseResult {
    #[serde(default)]
    categories: HashMap<String, Category>,
    #[serde(default)]
    audits: HashMap<String, Audit>,
}

#[derive(Debug, Deserialize)]
struct Category {
    score: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Audit {
    numeric_value: Option<f64>,
    score: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct LoadingExperience {
    #[serde(default)]
    metrics: HashMap<String, FieldMetric>,
}

#[derive(Debug, Deserialize)]
struct FieldMetric {
    percentile: Option<Value>,
    category: Option<String>,
}

fn audit_id(kind: MetricKind) -> Option<&'static str> {
    match kind {
        MetricKind::Lcp => Some("largest-contentful-paint"),
        MetricKind::Cls => Some("cumulative-layout-shift"),
        MetricKind::Fcp => Some("first-contentful-paint"),
        MetricKind::Tbt => Some("total-blocking-time"),
        MetricKind::Tti => Some("interactive"),
        MetricKind::SpeedIndex => Some("speed-index"),
        MetricKind::Fid | MetricKind::Inp | MetricKind::Ttfb => None,
    }
}

fn field_key(kind: MetricKind) -> Option<&'static str> {
    match kind {
        MetricKind::Lcp => Some("LARGEST_CONTENTFUL_PAINT_MS"),
        MetricKind::Cls => Some("CUMULATIVE_LAYOUT_SHIFT_SCORE"),
        MetricKind::Fcp => Some("FIRST_CONTENTFUL_PAINT_MS"),
        MetricKind::Fid => Some("FIRST_INPUT_DELAY_MS"),
        MetricKind::Inp => Some("INTERACTION_TO_NEXT_PAINT"),
        MetricKind::Ttfb => Some("EXPERIMENTAL_TIME_TO_FIRST_BYTE"),
        MetricKind::Tbt | MetricKind::Tti | MetricKind::SpeedIndex => None,
    }
}

/// Lab and field client for the page-analysis endpoint
#[derive(Debug, Clone)]
pub struct PsiApi {
    api_key: String,
    endpoint: String,
    strategy: Strategy,
    policy: CoreWebVitalsPolicy,
}

impl PsiApi {
    /// The policy aggregates the field section, so each of its metrics must
    /// be one the field data reports
    pub fn new<S: Into<String>>(api_key: S, strategy: Strategy, policy: CoreWebVitalsPolicy) -> Result<Self> {
        if let Some(kind) = policy.metrics.iter().find(|kind| field_key(**kind).is_none()) {
            return Err(CollectorError::Configuration {
                message: format!(
                    "policy '{}' needs {}, which page-analysis field data does not report",
                    policy.name, kind
                ),
                field: Some("policy".to_string()),
                suggestion: Some("Use the inp, fid or fcp policy; lab data is always judged on LCP, CLS and TBT".into()),
            });
        }

        Ok(Self {
            api_key: api_key.into(),
            endpoint: PSI_API_URL.to_string(),
            strategy,
            policy,
        })
    }

    /// Point the client at another endpoint (mock servers, proxies)
    pub fn with_endpoint<S: Into<String>>(mut self, endpoint: S) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Field metrics reported next to the lab ones: the policy's three
    fn field_metrics(&self) -> [MetricKind; 3] {
        self.policy.metrics
    }

    fn lab_reading(kind: MetricKind, audits: &HashMap<String, Audit>) -> MetricReading {
        let audit = audit_id(kind).and_then(|id| audits.get(id));
        let sample = MetricSample::new(kind, audit.and_then(|a| a.numeric_value), None);
        MetricReading::with_verdict(Source::Lab, sample, classify_score(audit.and_then(|a| a.score)))
    }

    fn field_reading(kind: MetricKind, metrics: Option<&HashMap<String, FieldMetric>>) -> MetricReading {
        let metric = field_key(kind).and_then(|key| metrics.and_then(|m| m.get(key)));
        let value = metric
            .and_then(|m| parse_numeric(m.percentile.as_ref()).ok().flatten())
            // The field CLS percentile is reported multiplied by 100
            .map(|v| if kind == MetricKind::Cls { v / 100.0 } else { v });

        let verdict = MetricVerdict::from_category(metric.and_then(|m| m.category.as_deref()));
        MetricReading::with_verdict(Source::Field, MetricSample::new(kind, value, None), verdict)
    }
}

impl MeasurementApi for PsiApi {
    fn name(&self) -> &'static str {
        "psi"
    }

    fn device(&self) -> Device {
        Device::Strategy(self.strategy)
    }

    fn layout(&self) -> ReportLayout {
        let lab = LAB_METRICS.iter().copied().map(ReadingSlot::lab);
        let field = self.field_metrics().into_iter().map(ReadingSlot::field);
        ReportLayout {
            slots: lab.chain(field).collect(),
            distributions: false,
            performance_score: true,
            field_status: true,
        }
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(60)
    }

    fn request(&self, client: &Client, url: &str) -> RequestBuilder {
        client.get(&self.endpoint).query(&[
            ("url", url),
            ("key", self.api_key.as_str()),
            ("strategy", self.strategy.as_str()),
            ("category", "performance"),
        ])
    }

    fn interpret(&self, url: &str, payload: &Value) -> Result<Measurement> {
        let response: AnalysisResponse = serde_json::from_value(payload.clone()).map_err(|e| {
            CollectorError::MalformedPayload {
                url: url.to_string(),
                reason: e.to_string(),
            }
        })?;

        let lighthouse = response
            .lighthouse_result
            .ok_or_else(|| CollectorError::EmptyRecord { url: url.to_string() })?;

        let performance_score = lighthouse
            .categories
            .get("performance")
            .and_then(|c| c.score)
            .map(|s| s * 100.0);

        let field_metrics = response.loading_experience.as_ref().map(|le| &le.metrics);
        debug!(
            "PSI result for {}: {} audits, field data {}",
            url,
            lighthouse.audits.len(),
            if field_metrics.is_some_and(|m| !m.is_empty()) { "present" } else { "absent" }
        );

        let mut readings: Vec<MetricReading> = LAB_METRICS
            .iter()
            .map(|kind| Self::lab_reading(*kind, &lighthouse.audits))
            .collect();
        readings.extend(
            self.field_metrics()
                .into_iter()
                .map(|kind| Self::field_reading(kind, field_metrics)),
        );

        let verdict_of = |source: Source, kind: MetricKind| {
            readings
                .iter()
                .find(|r| r.source == source && r.kind == kind)
                .map_or(MetricVerdict::NoData, |r| r.verdict)
        };
        let status = CoreWebVitalsPolicy::LAB.evaluate(|kind| verdict_of(Source::Lab, kind));
        let field_status = self.policy.evaluate(|kind| verdict_of(Source::Field, kind));

        Ok(Measurement {
            device: Device::Strategy(self.strategy),
            status,
            field_status: Some(field_status),
            performance_score,
            readings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::core::CoreWebVitalsStatus;
    use serde_json::json;

    fn payload() -> Value {
        json!({
            "lighthouseResult": {
                "categories": {"performance": {"score": 0.93}},
                "audits": {
                    "largest-contentful-paint": {"numericValue": 1850.4, "score": 0.95},
                    "cumulative-layout-shift": {"numericValue": 0.012, "score": 1.0},
                    "first-contentful-paint": {"numericValue": 900.0, "score": 0.99},
                    "total-blocking-time": {"numericValue": 120.0, "score": 0.92},
                    "interactive": {"numericValue": 3000.0, "score": 0.7},
                    "speed-index": {"numericValue": 2100.0, "score": 0.4}
                }
            },
            "loadingExperience": {
                "metrics": {
                    "LARGEST_CONTENTFUL_PAINT_MS": {"percentile": 2100, "category": "FAST"},
                    "CUMULATIVE_LAYOUT_SHIFT_SCORE": {"percentile": 5, "category": "FAST"},
                    "INTERACTION_TO_NEXT_PAINT": {"percentile": 350, "category": "AVERAGE"}
                }
            }
        })
    }

    #[test]
    fn test_lab_policy_cannot_judge_field_data() {
        let err = PsiApi::new("k", Strategy::Mobile, CoreWebVitalsPolicy::LAB).unwrap_err();
        assert_eq!(err.category(), "configuration");
        assert_eq!(err.severity(), crate::collector::core::ErrorSeverity::Critical);
    }

    #[test]
    fn test_lab_and_field_aggregates_are_separate() {
        let api = PsiApi::new("k", Strategy::Mobile, CoreWebVitalsPolicy::CURRENT).unwrap();
        let m = api.interpret("https://a.example/", &payload()).unwrap();

        assert_eq!(m.status, CoreWebVitalsStatus::Passed);
        assert_eq!(m.field_status, Some(CoreWebVitalsStatus::Failed));
        assert_eq!(m.performance_score, Some(93.0));

        let si = m.readings.iter().find(|r| r.kind == MetricKind::SpeedIndex).unwrap();
        assert_eq!(si.verdict, MetricVerdict::Poor);
        assert_eq!(si.value, Some(2100.0));

        let field_cls = m
            .readings
            .iter()
            .find(|r| r.source == Source::Field && r.kind == MetricKind::Cls)
            .unwrap();
        assert_eq!(field_cls.value, Some(0.05));
    }

    #[test]
    fn test_missing_field_section_is_insufficient() {
        let mut body = payload();
        body.as_object_mut().unwrap().remove("loadingExperience");
        let api = PsiApi::new("k", Strategy::Desktop, CoreWebVitalsPolicy::CURRENT).unwrap();
        let m = api.interpret("https://a.example/", &body).unwrap();
        assert_eq!(m.field_status, Some(CoreWebVitalsStatus::InsufficientData));
        assert_eq!(m.device, Device::Strategy(Strategy::Desktop));
    }

    #[test]
    fn test_layout_lists_lab_then_policy_field_metrics() {
        let api = PsiApi::new("k", Strategy::Mobile, CoreWebVitalsPolicy::LEGACY_FID).unwrap();
        let layout = api.layout();
        assert_eq!(layout.slots.len(), 9);
        assert_eq!(layout.slots[0], ReadingSlot::lab(MetricKind::Lcp));
        assert_eq!(layout.slots[8], ReadingSlot::field(MetricKind::Fid));
        assert!(layout.field_status);
    }

    #[test]
    fn test_missing_lighthouse_result_is_empty() {
        let api = PsiApi::new("k", Strategy::Mobile, CoreWebVitalsPolicy::CURRENT).unwrap();
        let err = api.interpret("https://a.example/", &json!({"id": "x"})).unwrap_err();
        assert_eq!(err.category(), "empty_record");
    }
}
