//! Core Web Vitals pass/fail aggregation

use super::metrics::{MetricKind, MetricVerdict};
use serde::{Deserialize, Serialize};

/// Aggregate Core Web Vitals status of one URL
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoreWebVitalsStatus {
    Passed,
    Failed,
    InsufficientData,
    Error,
    NoData,
}

impl CoreWebVitalsStatus {
    pub const ALL: [CoreWebVitalsStatus; 5] = [
        CoreWebVitalsStatus::Passed,
        CoreWebVitalsStatus::Failed,
        CoreWebVitalsStatus::InsufficientData,
        CoreWebVitalsStatus::Error,
        CoreWebVitalsStatus::NoData,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CoreWebVitalsStatus::Passed => "passed",
            CoreWebVitalsStatus::Failed => "failed",
            CoreWebVitalsStatus::InsufficientData => "insufficient_data",
            CoreWebVitalsStatus::Error => "error",
            CoreWebVitalsStatus::NoData => "no_data",
        }
    }
}

impl std::fmt::Display for CoreWebVitalsStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named rule choosing which three metrics make up the pass/fail bar
///
/// The third metric changed over time (FID was replaced by INP in 2024) and lab
/// data uses TBT as its interactivity proxy, so the triple is never hardcoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreWebVitalsPolicy {
    pub name: &'static str,
    pub metrics: [MetricKind; 3],
}

impl CoreWebVitalsPolicy {
    /// LCP, CLS and INP
    pub const CURRENT: CoreWebVitalsPolicy = CoreWebVitalsPolicy {
        name: "inp",
        metrics: [MetricKind::Lcp, MetricKind::Cls, MetricKind::Inp],
    };

    /// LCP, CLS and FID, the pre-2024 definition
    pub const LEGACY_FID: CoreWebVitalsPolicy = CoreWebVitalsPolicy {
        name: "fid",
        metrics: [MetricKind::Lcp, MetricKind::Cls, MetricKind::Fid],
    };

    /// LCP, CLS and FCP
    pub const LEGACY_FCP: CoreWebVitalsPolicy = CoreWebVitalsPolicy {
        name: "fcp",
        metrics: [MetricKind::Lcp, MetricKind::Cls, MetricKind::Fcp],
    };

    /// LCP, CLS and TBT for lab runs
    pub const LAB: CoreWebVitalsPolicy = CoreWebVitalsPolicy {
        name: "lab",
        metrics: [MetricKind::Lcp, MetricKind::Cls, MetricKind::Tbt],
    };

    pub fn third(&self) -> MetricKind {
        self.metrics[2]
    }

    /// Aggregate the verdicts of this policy's metrics
    ///
    /// `verdict_of` is asked once per policy metric; kinds it cannot supply
    /// should come back as `NoData`.
    pub fn evaluate<F>(&self, mut verdict_of: F) -> CoreWebVitalsStatus
    where
        F: FnMut(MetricKind) -> MetricVerdict,
    {
        let [lcp, cls, third] = self.metrics.map(|kind| verdict_of(kind));
        aggregate_status(lcp, cls, third)
    }
}

impl Default for CoreWebVitalsPolicy {
    fn default() -> Self {
        Self::CURRENT
    }
}

impl std::str::FromStr for CoreWebVitalsPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "inp" | "current" => Ok(Self::CURRENT),
            "fid" => Ok(Self::LEGACY_FID),
            "fcp" => Ok(Self::LEGACY_FCP),
            "lab" | "tbt" => Ok(Self::LAB),
            other => Err(format!("unknown Core Web Vitals policy '{}' (expected inp, fid, fcp or lab)", other)),
        }
    }
}

/// `Passed` iff all three are good; `InsufficientData` if any is missing;
/// otherwise `Failed`
pub fn aggregate_status(
    lcp: MetricVerdict,
    cls: MetricVerdict,
    third: MetricVerdict,
) -> CoreWebVitalsStatus {
    let verdicts = [lcp, cls, third];
    if verdicts.iter().all(|v| *v == MetricVerdict::Good) {
        CoreWebVitalsStatus::Passed
    } else if verdicts.contains(&MetricVerdict::NoData) {
        CoreWebVitalsStatus::InsufficientData
    } else {
        CoreWebVitalsStatus::Failed
    }
}
