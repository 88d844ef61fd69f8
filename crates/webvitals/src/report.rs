//! Tabular report and summary statistics for a finished batch
//!
//! Rows follow the input order, never completion order. Column names depend
//! on the API's [`ReportLayout`]: rows with a separate field aggregate prefix
//! every metric with its source (`lab_lcp_status`, `field_lcp_status`).

use chrono::NaiveDateTime;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use crate::collector::{
    dedupe_urls, BatchResults, CollectorError, CoreWebVitalsPolicy, CoreWebVitalsStatus, FileOperation,
    MetricReading, MetricVerdict, ReadingSlot, ReportLayout, Result, Source, UrlResult,
};

/// Flat table with one row per input URL
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Report {
    /// Build the table for `inputs` from a batch's result set
    pub fn assemble<S: AsRef<str>>(inputs: &[S], results: &BatchResults) -> Self {
        let layout = &results.layout;
        let columns = columns(layout, results.device.column());
        let rows = dedupe_urls(inputs)
            .iter()
            .filter_map(|url| results.get(url))
            .map(|result| row(layout, result))
            .collect();

        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Value of `column` in row `index`
    pub fn cell(&self, index: usize, column: &str) -> Option<&str> {
        let position = self.columns.iter().position(|c| c == column)?;
        self.rows.get(index)?.get(position).map(String::as_str)
    }

    /// Render as RFC 4180 CSV with a header line
    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        push_record(&mut out, &self.columns);
        for row in &self.rows {
            push_record(&mut out, row);
        }
        out
    }

    /// Write the CSV to `path`, creating parent directories
    pub async fn write_csv(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| CollectorError::FileSystem {
                path: parent.to_path_buf(),
                operation: FileOperation::CreateDir,
                source: e,
            })?;
        }

        tokio::fs::write(path, self.to_csv()).await.map_err(|e| CollectorError::FileSystem {
            path: path.to_path_buf(),
            operation: FileOperation::Write,
            source: e,
        })
    }
}

fn slot_prefix(layout: &ReportLayout, slot: ReadingSlot) -> String {
    if layout.field_status {
        let source = match slot.source {
            Source::Lab => "lab",
            Source::Field => "field",
        };
        format!("{}_{}", source, slot.kind.label())
    } else {
        slot.kind.label().to_string()
    }
}

fn columns(layout: &ReportLayout, device_column: &str) -> Vec<String> {
    let mut columns = vec!["url".to_string(), device_column.to_string()];
    if layout.performance_score {
        columns.push("performance_score".to_string());
    }
    if layout.field_status {
        columns.push("lab_cwv_status".to_string());
        columns.push("field_cwv_status".to_string());
    } else {
        columns.push("core_web_vitals_status".to_string());
    }

    for slot in &layout.slots {
        let prefix = slot_prefix(layout, *slot);
        columns.push(format!("{}_status", prefix));
        columns.push(format!("{}_value", prefix));
        if layout.distributions {
            columns.push(format!("{}_good_pct", prefix));
            columns.push(format!("{}_ni_pct", prefix));
            columns.push(format!("{}_poor_pct", prefix));
        }
    }

    columns.push("failure".to_string());
    columns
}

fn row(layout: &ReportLayout, result: &UrlResult) -> Vec<String> {
    let mut cells = vec![result.url.clone(), result.device.as_str().to_string()];
    if layout.performance_score {
        cells.push(format_optional(result.performance_score, 1));
    }
    cells.push(result.status.to_string());
    if layout.field_status {
        cells.push(result.field_status.map(|s| s.to_string()).unwrap_or_default());
    }

    for slot in &layout.slots {
        let reading = result.reading(slot.source, slot.kind);
        cells.push(reading.map_or(MetricVerdict::NoData, |r| r.verdict).to_string());
        cells.push(reading.map(format_reading_value).unwrap_or_default());
        if layout.distributions {
            let distribution = reading.and_then(|r| r.distribution);
            cells.push(format_optional(distribution.and_then(|d| d.good_pct), 1));
            cells.push(format_optional(distribution.and_then(|d| d.needs_improvement_pct), 1));
            cells.push(format_optional(distribution.and_then(|d| d.poor_pct), 1));
        }
    }

    cells.push(result.failure.as_ref().map(|f| f.to_string()).unwrap_or_default());
    cells
}

/// Milliseconds as integers, CLS with two decimals
fn format_reading_value(reading: &MetricReading) -> String {
    let decimals = if reading.kind.is_unitless() { 2 } else { 0 };
    format_optional(reading.value, decimals)
}

fn format_optional(value: Option<f64>, decimals: usize) -> String {
    match value {
        Some(v) if v.is_finite() => format!("{:.*}", decimals, v),
        _ => String::new(),
    }
}

fn push_record(out: &mut String, fields: &[String]) {
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        if field.contains([',', '"', '\n', '\r']) {
            out.push('"');
            out.push_str(&field.replace('"', "\"\""));
            out.push('"');
        } else {
            out.push_str(field);
        }
    }
    out.push_str("\r\n");
}

/// Good / needs-improvement / poor / no-data tally of one report column
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricCounts {
    pub slot: ReadingSlot,
    pub good: usize,
    pub needs_improvement: usize,
    pub poor: usize,
    pub no_data: usize,
}

/// Aggregate statistics of a batch
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub api: &'static str,
    pub device: String,
    pub total: usize,
    pub status_counts: Vec<(CoreWebVitalsStatus, usize)>,
    /// Field aggregate tally when the API reports one separately
    pub field_status_counts: Option<Vec<(CoreWebVitalsStatus, usize)>>,
    pub metric_counts: Vec<MetricCounts>,
    pub average_performance_score: Option<f64>,
    pub elapsed: Duration,
}

impl Summary {
    /// Summarize `results`, tallying the metrics named by `policy`
    pub fn from_results(results: &BatchResults, policy: &CoreWebVitalsPolicy) -> Self {
        let rows: Vec<&UrlResult> = results.ordered();

        let tally = |status_of: &dyn Fn(&UrlResult) -> Option<CoreWebVitalsStatus>| {
            CoreWebVitalsStatus::ALL
                .iter()
                .map(|status| (*status, rows.iter().filter(|r| status_of(**r) == Some(*status)).count()))
                .collect::<Vec<_>>()
        };

        let status_counts = tally(&|r| Some(r.status));
        let field_status_counts = results.layout.field_status.then(|| tally(&|r| r.field_status));

        let metric_counts = results
            .layout
            .slots
            .iter()
            .filter(|slot| policy.metrics.contains(&slot.kind))
            .map(|slot| {
                let mut counts = MetricCounts {
                    slot: *slot,
                    good: 0,
                    needs_improvement: 0,
                    poor: 0,
                    no_data: 0,
                };
                for row in &rows {
                    match row.verdict(slot.source, slot.kind) {
                        MetricVerdict::Good => counts.good += 1,
                        MetricVerdict::NeedsImprovement => counts.needs_improvement += 1,
                        MetricVerdict::Poor => counts.poor += 1,
                        MetricVerdict::NoData => counts.no_data += 1,
                        MetricVerdict::Unknown | MetricVerdict::Error => {}
                    }
                }
                counts
            })
            .collect();

        let scores: Vec<f64> = rows.iter().filter_map(|r| r.performance_score).collect();
        let average_performance_score =
            (!scores.is_empty()).then(|| scores.iter().sum::<f64>() / scores.len() as f64);

        Self {
            api: results.api,
            device: results.device.as_str().to_string(),
            total: rows.len(),
            status_counts,
            field_status_counts,
            metric_counts,
            average_performance_score,
            elapsed: results.elapsed,
        }
    }

    pub fn count(&self, status: CoreWebVitalsStatus) -> usize {
        self.status_counts
            .iter()
            .find(|(s, _)| *s == status)
            .map_or(0, |(_, n)| *n)
    }

    fn percent(&self, count: usize) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            count as f64 / self.total as f64 * 100.0
        }
    }

    fn write_status_counts(
        &self,
        f: &mut fmt::Formatter<'_>,
        counts: &[(CoreWebVitalsStatus, usize)],
    ) -> fmt::Result {
        for (status, count) in counts {
            writeln!(f, "  {:<18} {} ({:.1}%)", status.as_str(), count, self.percent(*count))?;
        }
        Ok(())
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "===== {} Analysis Results =====", self.api.to_uppercase())?;
        writeln!(f, "Total URLs processed: {}", self.total)?;
        writeln!(f, "Device: {}", self.device)?;

        if let Some(score) = self.average_performance_score {
            writeln!(f, "Average performance score: {:.1}", score)?;
        }

        let heading = if self.field_status_counts.is_some() { "Lab Core Web Vitals status:" } else { "Core Web Vitals status:" };
        writeln!(f, "\n{}", heading)?;
        self.write_status_counts(f, &self.status_counts)?;

        if let Some(ref field) = self.field_status_counts {
            writeln!(f, "\nField Core Web Vitals status:")?;
            self.write_status_counts(f, field)?;
        }

        writeln!(f, "\nIndividual metrics (good/needs improvement/poor/no data):")?;
        for counts in &self.metric_counts {
            let name = match counts.slot.source {
                Source::Lab if self.field_status_counts.is_some() => format!("lab {}", counts.slot.kind),
                Source::Field if self.field_status_counts.is_some() => format!("field {}", counts.slot.kind),
                _ => counts.slot.kind.to_string(),
            };
            writeln!(
                f,
                "  {}: {}/{}/{}/{} ({:.1}%/{:.1}%/{:.1}%/{:.1}%)",
                name,
                counts.good,
                counts.needs_improvement,
                counts.poor,
                counts.no_data,
                self.percent(counts.good),
                self.percent(counts.needs_improvement),
                self.percent(counts.poor),
                self.percent(counts.no_data)
            )?;
        }

        let secs = self.elapsed.as_secs_f64();
        writeln!(f, "\nProcessing time: {:.1} seconds ({:.1} minutes)", secs, secs / 60.0)
    }
}

/// Site part of a report file name: the bare host of a domain or URL, or
/// `custom` when the URLs came from a file
pub fn site_label(target: Option<&str>) -> String {
    let Some(target) = target else {
        return "custom".to_string();
    };
    let host = target
        .trim()
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_start_matches("www.")
        .split('/')
        .next()
        .unwrap_or_default();

    if host.is_empty() { "custom".to_string() } else { host.to_string() }
}

/// `<api>_results_<site>_<device>_<YYYYmmdd_HHMMSS>.csv`
pub fn report_file_name(api: &str, site: &str, device: &str, now: NaiveDateTime) -> String {
    format!("{}_results_{}_{}_{}.csv", api, site, device, now.format("%Y%m%d_%H%M%S"))
}
