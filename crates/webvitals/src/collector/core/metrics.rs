//! Metric kinds, verdicts and the threshold classifier
//!
//! Classification is a pure, total function of `(kind, value)`. Thresholds are
//! closed on the upper side: a value equal to the "good" bound is good, a value
//! equal to the "needs improvement" bound still needs improvement.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tracked web-performance metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetricKind {
    /// Largest Contentful Paint (ms)
    Lcp,
    /// Cumulative Layout Shift (unitless)
    Cls,
    /// First Contentful Paint (ms)
    Fcp,
    /// First Input Delay (ms)
    Fid,
    /// Interaction to Next Paint (ms)
    Inp,
    /// Time to First Byte (ms)
    Ttfb,
    /// Total Blocking Time (ms, lab only)
    Tbt,
    /// Time to Interactive (ms, lab only)
    Tti,
    /// Speed Index (ms, lab only)
    SpeedIndex,
}

/// Inclusive upper bounds for the good and needs-improvement bands
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub good: f64,
    pub needs_improvement: f64,
}

impl MetricKind {
    /// Kinds reported by real-user field data
    pub const FIELD: [MetricKind; 6] = [
        MetricKind::Lcp,
        MetricKind::Cls,
        MetricKind::Fcp,
        MetricKind::Fid,
        MetricKind::Inp,
        MetricKind::Ttfb,
    ];

    pub fn thresholds(self) -> Thresholds {
        let (good, needs_improvement) = match self {
            MetricKind::Lcp => (2500.0, 4000.0),
            MetricKind::Cls => (0.10, 0.25),
            MetricKind::Fcp => (1800.0, 3000.0),
            MetricKind::Fid => (100.0, 300.0),
            MetricKind::Inp => (200.0, 500.0),
            MetricKind::Ttfb => (800.0, 1800.0),
            MetricKind::Tbt => (200.0, 600.0),
            MetricKind::Tti => (3800.0, 7300.0),
            MetricKind::SpeedIndex => (3400.0, 5800.0),
        };
        Thresholds { good, needs_improvement }
    }

    /// Short column label, e.g. `lcp`
    pub fn label(self) -> &'static str {
        match self {
            MetricKind::Lcp => "lcp",
            MetricKind::Cls => "cls",
            MetricKind::Fcp => "fcp",
            MetricKind::Fid => "fid",
            MetricKind::Inp => "inp",
            MetricKind::Ttfb => "ttfb",
            MetricKind::Tbt => "tbt",
            MetricKind::Tti => "tti",
            MetricKind::SpeedIndex => "si",
        }
    }

    /// CLS is the only unitless metric; everything else is milliseconds
    pub fn is_unitless(self) -> bool {
        matches!(self, MetricKind::Cls)
    }

    pub fn is_lab_only(self) -> bool {
        matches!(self, MetricKind::Tbt | MetricKind::Tti | MetricKind::SpeedIndex)
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label().to_uppercase())
    }
}

impl std::str::FromStr for MetricKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lcp" => Ok(MetricKind::Lcp),
            "cls" => Ok(MetricKind::Cls),
            "fcp" => Ok(MetricKind::Fcp),
            "fid" => Ok(MetricKind::Fid),
            "inp" => Ok(MetricKind::Inp),
            "ttfb" => Ok(MetricKind::Ttfb),
            "tbt" => Ok(MetricKind::Tbt),
            "tti" => Ok(MetricKind::Tti),
            "si" | "speed_index" => Ok(MetricKind::SpeedIndex),
            other => Err(format!("unknown metric kind '{}'", other)),
        }
    }
}

/// Category assigned to a single metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricVerdict {
    Good,
    NeedsImprovement,
    Poor,
    /// The metric was absent. This is the one canonical "missing" verdict.
    NoData,
    /// A value was present but was not a finite number
    Unknown,
    /// The row's fetch or parse failed; never produced by [`classify`]
    Error,
}

impl MetricVerdict {
    pub fn as_str(self) -> &'static str {
        match self {
            MetricVerdict::Good => "good",
            MetricVerdict::NeedsImprovement => "needs_improvement",
            MetricVerdict::Poor => "poor",
            MetricVerdict::NoData => "no_data",
            MetricVerdict::Unknown => "unknown",
            MetricVerdict::Error => "error",
        }
    }

    /// Map an upstream field-data category label
    pub fn from_category(category: Option<&str>) -> Self {
        match category {
            None => MetricVerdict::NoData,
            Some("GOOD") | Some("FAST") => MetricVerdict::Good,
            Some("NEEDS_IMPROVEMENT") | Some("AVERAGE") => MetricVerdict::NeedsImprovement,
            Some("POOR") | Some("SLOW") => MetricVerdict::Poor,
            Some("NONE") | Some("") => MetricVerdict::NoData,
            Some(_) => MetricVerdict::Unknown,
        }
    }
}

impl std::fmt::Display for MetricVerdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Share of page loads in each band, as percentages
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Distribution {
    pub good_pct: Option<f64>,
    pub needs_improvement_pct: Option<f64>,
    pub poor_pct: Option<f64>,
}

/// A raw metric as read from a response
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub kind: MetricKind,
    pub value: Option<f64>,
    pub distribution: Option<Distribution>,
}

impl MetricSample {
    pub fn new(kind: MetricKind, value: Option<f64>, distribution: Option<Distribution>) -> Self {
        Self { kind, value, distribution }
    }

    pub fn verdict(&self) -> MetricVerdict {
        classify(self.kind, self.value)
    }
}

/// Classify a metric value against the fixed per-kind thresholds
pub fn classify(kind: MetricKind, value: Option<f64>) -> MetricVerdict {
    let Some(value) = value else {
        return MetricVerdict::NoData;
    };
    if !value.is_finite() {
        return MetricVerdict::Unknown;
    }

    let thresholds = kind.thresholds();
    if value <= thresholds.good {
        MetricVerdict::Good
    } else if value <= thresholds.needs_improvement {
        MetricVerdict::NeedsImprovement
    } else {
        MetricVerdict::Poor
    }
}

/// Parse a JSON value that may carry a number or a numeric string
///
/// Returns `Ok(None)` for an absent or null value and `Err(())` for one that
/// is present but not numeric.
pub fn parse_numeric(raw: Option<&Value>) -> std::result::Result<Option<f64>, ()> {
    match raw {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n.as_f64().map(Some).ok_or(()),
        Some(Value::String(s)) => s.trim().parse::<f64>().map(Some).map_err(|_| ()),
        Some(_) => Err(()),
    }
}

/// Classify a raw JSON value, mapping unparseable input to `Unknown`
pub fn classify_value(kind: MetricKind, raw: Option<&Value>) -> MetricVerdict {
    match parse_numeric(raw) {
        Ok(value) => classify(kind, value),
        Err(()) => MetricVerdict::Unknown,
    }
}

/// Classify a 0-1 lab score (>= 0.9 good, >= 0.5 needs improvement)
pub fn classify_score(score: Option<f64>) -> MetricVerdict {
    match score {
        None => MetricVerdict::NoData,
        Some(s) if !s.is_finite() => MetricVerdict::Unknown,
        Some(s) if s >= 0.9 => MetricVerdict::Good,
        Some(s) if s >= 0.5 => MetricVerdict::NeedsImprovement,
        Some(_) => MetricVerdict::Poor,
    }
}
