//! Per-URL result records
//!
//! A [`UrlResult`] is produced exactly once per input URL through
//! [`UrlResult::new`], whether the URL was measured or failed. Failed rows are
//! padded out to the same reading slots as measured rows so every row of a
//! report has the same shape.

use super::error::CollectorError;
use super::metrics::{Distribution, MetricKind, MetricSample, MetricVerdict};
use super::status::CoreWebVitalsStatus;
use serde::Serialize;

/// Device population queried from the record API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Default)]
pub enum FormFactor {
    /// All form factors combined (no `formFactor` sent)
    #[default]
    All,
    Phone,
    Desktop,
    Tablet,
}

impl FormFactor {
    pub fn as_str(self) -> &'static str {
        match self {
            FormFactor::All => "ALL",
            FormFactor::Phone => "PHONE",
            FormFactor::Desktop => "DESKTOP",
            FormFactor::Tablet => "TABLET",
        }
    }

    /// The value sent upstream; `None` means "do not filter"
    pub fn api_value(self) -> Option<&'static str> {
        match self {
            FormFactor::All => None,
            other => Some(other.as_str()),
        }
    }
}

impl std::str::FromStr for FormFactor {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ALL" | "ALL_FORM_FACTORS" => Ok(FormFactor::All),
            "PHONE" | "MOBILE" => Ok(FormFactor::Phone),
            "DESKTOP" => Ok(FormFactor::Desktop),
            "TABLET" => Ok(FormFactor::Tablet),
            other => Err(format!("unknown form factor '{}'", other)),
        }
    }
}

/// Device simulation used by the page-analysis API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Default)]
pub enum Strategy {
    #[default]
    Mobile,
    Desktop,
}

impl Strategy {
    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::Mobile => "mobile",
            Strategy::Desktop => "desktop",
        }
    }
}

impl std::str::FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mobile" => Ok(Strategy::Mobile),
            "desktop" => Ok(Strategy::Desktop),
            other => Err(format!("unknown strategy '{}'", other)),
        }
    }
}

/// Device selector of a row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Device {
    FormFactor(FormFactor),
    Strategy(Strategy),
}

impl Device {
    /// Column header for this selector
    pub fn column(self) -> &'static str {
        match self {
            Device::FormFactor(_) => "form_factor",
            Device::Strategy(_) => "strategy",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Device::FormFactor(f) => f.as_str(),
            Device::Strategy(s) => s.as_str(),
        }
    }
}

/// Where a reading came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Source {
    /// Real-user data (record API, or field section of a page analysis)
    Field,
    /// Synthetic page analysis
    Lab,
}

/// One column group of a report: a metric from a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReadingSlot {
    pub source: Source,
    pub kind: MetricKind,
}

impl ReadingSlot {
    pub fn field(kind: MetricKind) -> Self {
        Self { source: Source::Field, kind }
    }

    pub fn lab(kind: MetricKind) -> Self {
        Self { source: Source::Lab, kind }
    }
}

/// Shape of the rows an API produces
#[derive(Debug, Clone, PartialEq)]
pub struct ReportLayout {
    pub slots: Vec<ReadingSlot>,
    /// Rows carry good/needs-improvement/poor percentages
    pub distributions: bool,
    /// Rows carry a 0-100 lab performance score
    pub performance_score: bool,
    /// Rows carry a separate field-data aggregate next to the lab one
    pub field_status: bool,
}

/// A classified metric of one URL
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricReading {
    pub kind: MetricKind,
    pub source: Source,
    pub value: Option<f64>,
    pub verdict: MetricVerdict,
    pub distribution: Option<Distribution>,
}

impl MetricReading {
    /// Classify a sample against the thresholds of its kind
    pub fn classified(source: Source, sample: MetricSample) -> Self {
        let verdict = sample.verdict();
        Self::with_verdict(source, sample, verdict)
    }

    /// Keep a verdict decided upstream, such as a lab score or a field category
    pub fn with_verdict(source: Source, sample: MetricSample, verdict: MetricVerdict) -> Self {
        Self {
            kind: sample.kind,
            source,
            value: sample.value,
            verdict,
            distribution: sample.distribution,
        }
    }

    fn placeholder(slot: ReadingSlot, verdict: MetricVerdict) -> Self {
        Self {
            kind: slot.kind,
            source: slot.source,
            value: None,
            verdict,
            distribution: None,
        }
    }
}

/// Everything an API extracted from a successful payload
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    pub device: Device,
    pub status: CoreWebVitalsStatus,
    pub field_status: Option<CoreWebVitalsStatus>,
    pub performance_score: Option<f64>,
    pub readings: Vec<MetricReading>,
}

/// Why a URL produced no measurement
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Failure {
    /// The upstream answered but had no record for the URL
    NoRecord,
    /// Non-success, non-throttle HTTP status
    Http { status: u16 },
    Timeout,
    Transport(String),
    /// Still throttled after the retry budget
    Throttled { attempts: u32 },
    MalformedPayload(String),
    Cancelled,
    /// The worker handling the URL crashed
    Panicked(String),
}

impl Failure {
    /// Aggregate status a row with this failure carries
    pub fn status(&self) -> CoreWebVitalsStatus {
        match self {
            Failure::NoRecord | Failure::Http { .. } | Failure::Timeout | Failure::Transport(_) => {
                CoreWebVitalsStatus::NoData
            }
            Failure::Throttled { .. }
            | Failure::MalformedPayload(_)
            | Failure::Cancelled
            | Failure::Panicked(_) => CoreWebVitalsStatus::Error,
        }
    }

    /// Verdict placed in every metric column of a failed row
    pub fn verdict(&self) -> MetricVerdict {
        match self.status() {
            CoreWebVitalsStatus::NoData => MetricVerdict::NoData,
            _ => MetricVerdict::Error,
        }
    }
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Failure::NoRecord => write!(f, "no record"),
            Failure::Http { status } => write!(f, "http {}", status),
            Failure::Timeout => write!(f, "timeout"),
            Failure::Transport(msg) => write!(f, "transport: {}", msg),
            Failure::Throttled { attempts } => write!(f, "throttled after {} attempts", attempts),
            Failure::MalformedPayload(msg) => write!(f, "malformed payload: {}", msg),
            Failure::Cancelled => write!(f, "cancelled"),
            Failure::Panicked(msg) => write!(f, "worker panicked: {}", msg),
        }
    }
}

impl From<&CollectorError> for Failure {
    fn from(error: &CollectorError) -> Self {
        match error {
            CollectorError::EmptyRecord { .. } => Failure::NoRecord,
            CollectorError::HttpStatus { status, .. } => Failure::Http { status: *status },
            CollectorError::NetworkTimeout { .. } => Failure::Timeout,
            CollectorError::HttpRequest { source, .. } => Failure::Transport(source.to_string()),
            CollectorError::ThrottleRetriesExhausted { attempts, .. } => {
                Failure::Throttled { attempts: *attempts }
            }
            CollectorError::Cancelled { .. } => Failure::Cancelled,
            other => Failure::MalformedPayload(other.to_string()),
        }
    }
}

/// How one URL turned out
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Measured(Measurement),
    Failed(Failure),
}

/// The immutable result row of one URL
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UrlResult {
    pub url: String,
    pub device: Device,
    pub status: CoreWebVitalsStatus,
    pub field_status: Option<CoreWebVitalsStatus>,
    pub performance_score: Option<f64>,
    pub readings: Vec<MetricReading>,
    pub failure: Option<Failure>,
}

impl UrlResult {
    /// Build the row for `url`, aligning readings to the layout's slots
    pub fn new<S: Into<String>>(url: S, device: Device, layout: &ReportLayout, outcome: Outcome) -> Self {
        let url = url.into();
        match outcome {
            Outcome::Measured(measurement) => {
                let readings = layout
                    .slots
                    .iter()
                    .map(|slot| {
                        measurement
                            .readings
                            .iter()
                            .find(|r| r.kind == slot.kind && r.source == slot.source)
                            .cloned()
                            .unwrap_or_else(|| MetricReading::placeholder(*slot, MetricVerdict::NoData))
                    })
                    .collect();

                Self {
                    url,
                    device: measurement.device,
                    status: measurement.status,
                    field_status: if layout.field_status { measurement.field_status } else { None },
                    performance_score: measurement.performance_score,
                    readings,
                    failure: None,
                }
            }
            Outcome::Failed(failure) => {
                let verdict = failure.verdict();
                let status = failure.status();
                Self {
                    url,
                    device,
                    status,
                    field_status: layout.field_status.then_some(status),
                    performance_score: None,
                    readings: layout
                        .slots
                        .iter()
                        .map(|slot| MetricReading::placeholder(*slot, verdict))
                        .collect(),
                    failure: Some(failure),
                }
            }
        }
    }

    pub fn reading(&self, source: Source, kind: MetricKind) -> Option<&MetricReading> {
        self.readings.iter().find(|r| r.source == source && r.kind == kind)
    }

    pub fn verdict(&self, source: Source, kind: MetricKind) -> MetricVerdict {
        self.reading(source, kind).map_or(MetricVerdict::NoData, |r| r.verdict)
    }

    pub fn is_measured(&self) -> bool {
        self.failure.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> ReportLayout {
        ReportLayout {
            slots: vec![ReadingSlot::field(MetricKind::Lcp), ReadingSlot::field(MetricKind::Cls)],
            distributions: true,
            performance_score: false,
            field_status: false,
        }
    }

    #[test]
    fn test_classified_reading_takes_the_sample_verdict() {
        let dist = Distribution {
            good_pct: Some(70.0),
            needs_improvement_pct: Some(20.0),
            poor_pct: Some(10.0),
        };
        let sample = MetricSample::new(MetricKind::Lcp, Some(3100.0), Some(dist));
        let reading = MetricReading::classified(Source::Field, sample);
        assert_eq!(reading.verdict, MetricVerdict::NeedsImprovement);
        assert_eq!(reading.value, Some(3100.0));
        assert_eq!(reading.distribution, Some(dist));

        let missing = MetricReading::classified(Source::Field, MetricSample::new(MetricKind::Cls, None, None));
        assert_eq!(missing.verdict, MetricVerdict::NoData);
    }

    #[test]
    fn test_upstream_verdict_overrides_thresholds() {
        let sample = MetricSample::new(MetricKind::Tbt, Some(900.0), None);
        let reading = MetricReading::with_verdict(Source::Lab, sample, MetricVerdict::Good);
        assert_eq!(reading.verdict, MetricVerdict::Good);
        assert_eq!(reading.source, Source::Lab);
        assert_eq!(reading.value, Some(900.0));
    }

    #[test]
    fn test_failed_row_is_padded_to_layout() {
        let result = UrlResult::new(
            "https://b.example/",
            Device::FormFactor(FormFactor::All),
            &layout(),
            Outcome::Failed(Failure::Http { status: 500 }),
        );
        assert_eq!(result.status, CoreWebVitalsStatus::NoData);
        assert_eq!(result.readings.len(), 2);
        assert!(result.readings.iter().all(|r| r.verdict == MetricVerdict::NoData));
        assert!(!result.is_measured());
    }

    #[test]
    fn test_error_failures_mark_metrics_as_error() {
        let result = UrlResult::new(
            "https://b.example/",
            Device::Strategy(Strategy::Mobile),
            &layout(),
            Outcome::Failed(Failure::Throttled { attempts: 5 }),
        );
        assert_eq!(result.status, CoreWebVitalsStatus::Error);
        assert_eq!(result.verdict(Source::Field, MetricKind::Lcp), MetricVerdict::Error);
    }

    #[test]
    fn test_measured_row_fills_missing_slots_with_no_data() {
        let measurement = Measurement {
            device: Device::FormFactor(FormFactor::Phone),
            status: CoreWebVitalsStatus::InsufficientData,
            field_status: None,
            performance_score: None,
            readings: vec![MetricReading {
                kind: MetricKind::Lcp,
                source: Source::Field,
                value: Some(2000.0),
                verdict: MetricVerdict::Good,
                distribution: None,
            }],
        };
        let result = UrlResult::new(
            "https://a.example/",
            Device::FormFactor(FormFactor::All),
            &layout(),
            Outcome::Measured(measurement),
        );
        assert_eq!(result.device, Device::FormFactor(FormFactor::Phone));
        assert_eq!(result.verdict(Source::Field, MetricKind::Lcp), MetricVerdict::Good);
        assert_eq!(result.verdict(Source::Field, MetricKind::Cls), MetricVerdict::NoData);
    }

    #[test]
    fn test_failure_from_collector_error() {
        let err = CollectorError::ThrottleRetriesExhausted { url: "u".into(), attempts: 3 };
        assert_eq!(Failure::from(&err), Failure::Throttled { attempts: 3 });
        let err = CollectorError::EmptyRecord { url: "u".into() };
        assert_eq!(Failure::from(&err).status(), CoreWebVitalsStatus::NoData);
    }
}
