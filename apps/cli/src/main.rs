//! Command line front end for the web vitals collector
//!
//! Loads URLs from a sitemap or a file, collects one API's measurements for
//! all of them, writes a CSV report and prints the run summary.

use anyhow::{Context, bail};
use chrono::Local;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use webvitals::{
    Collector, CollectorConfig, CollectorConfigBuilder, ConsoleProgressReporter, CoreWebVitalsPolicy, FormFactor,
    IntoProgressCallback, Report, Strategy, Summary, UrlSource, report_file_name, site_label,
};

#[derive(Parser, Debug)]
#[command(name = "webvitals", version, about = "Collect Core Web Vitals for a batch of URLs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Field data from the Chrome UX Report
    Crux {
        #[command(flatten)]
        common: CommonArgs,

        /// all, phone, desktop or tablet
        #[arg(long, default_value = "all")]
        form_factor: FormFactor,
    },
    /// Lab and field data from PageSpeed Insights
    Psi {
        #[command(flatten)]
        common: CommonArgs,

        /// mobile or desktop
        #[arg(long, default_value = "mobile")]
        strategy: Strategy,
    },
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Domain or sitemap URL to read `<loc>` entries from
    #[arg(long, conflicts_with = "urls_file", required_unless_present = "urls_file")]
    sitemap: Option<String>,

    /// File with one URL per line
    #[arg(long)]
    urls_file: Option<PathBuf>,

    /// Only collect the first N URLs
    #[arg(long)]
    max_urls: Option<usize>,

    /// Simultaneous in-flight requests
    #[arg(long)]
    concurrency: Option<usize>,

    /// Requests admitted per window
    #[arg(long)]
    rate_limit: Option<usize>,

    /// Rate limit window in seconds
    #[arg(long)]
    window_secs: Option<u64>,

    /// Total attempts per URL, the first included, while the server answers 429
    #[arg(long)]
    max_throttle_attempts: Option<u32>,

    /// Third pass/fail metric: inp, fid or fcp
    #[arg(long, default_value = "inp")]
    policy: CoreWebVitalsPolicy,

    /// API key; falls back to PAGESPEED_API_KEY
    #[arg(long)]
    api_key: Option<String>,

    /// Directory the CSV report is written to
    #[arg(long, default_value = ".")]
    output: PathBuf,

    #[arg(short, long)]
    verbose: bool,
}

impl CommonArgs {
    fn source(&self) -> anyhow::Result<UrlSource> {
        match (&self.sitemap, &self.urls_file) {
            (Some(sitemap), None) => Ok(UrlSource::Sitemap(sitemap.clone())),
            (None, Some(path)) => Ok(UrlSource::File(path.clone())),
            _ => bail!("exactly one of --sitemap or --urls-file is required"),
        }
    }

    /// Apply the overrides on top of an API preset
    fn config(&self, preset: CollectorConfigBuilder) -> anyhow::Result<CollectorConfig> {
        let api_key = match &self.api_key {
            Some(key) => key.clone(),
            None => CollectorConfig::api_key_from_env()?,
        };

        let defaults = preset.clone().build();
        let mut builder = preset.api_key(api_key).policy(self.policy);

        if let Some(concurrency) = self.concurrency {
            builder = builder.concurrency(concurrency);
        }
        if self.rate_limit.is_some() || self.window_secs.is_some() {
            let max_queries = self.rate_limit.unwrap_or(defaults.rate_limit.max_queries);
            let window = self
                .window_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.rate_limit.window);
            builder = builder.rate_limit(max_queries, window);
        }
        if let Some(attempts) = self.max_throttle_attempts {
            builder = builder.max_throttle_attempts(attempts);
        }

        Ok(builder.build())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (collector, common) = match &cli.command {
        Command::Crux { common, form_factor } => {
            init_tracing(common.verbose);
            let config = common.config(CollectorConfigBuilder::crux())?;
            (Collector::crux(config, *form_factor)?, common)
        }
        Command::Psi { common, strategy } => {
            init_tracing(common.verbose);
            let config = common.config(CollectorConfigBuilder::psi())?;
            (Collector::psi(config, *strategy)?, common)
        }
    };

    let source = common.source()?;
    let urls = collector
        .load_urls(&source, common.max_urls)
        .await
        .context("failed to load URLs")?;
    if urls.is_empty() {
        bail!("no URLs found");
    }
    info!("Loaded {} URLs for {}", urls.len(), collector.api_name());

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling remaining URLs");
            signal_token.cancel();
        }
    });

    let progress = ConsoleProgressReporter::new(urls.len(), common.verbose).into_callback();
    let results = collector.collect(&urls, &cancel, Some(progress)).await?;

    let report = Report::assemble(&urls, &results);
    let file_name = report_file_name(
        results.api,
        &site_label(common.sitemap.as_deref()),
        results.device.as_str(),
        Local::now().naive_local(),
    );
    let path = common.output.join(file_name);
    report.write_csv(&path).await?;

    println!("{}", Summary::from_results(&results, &collector.config().policy));
    println!("Results saved to: {}", path.display());

    Ok(())
}

fn init_tracing(verbose: bool) {
    let level = if verbose { tracing::Level::DEBUG } else { tracing::Level::INFO };
    tracing_subscriber::fmt().with_max_level(level).init();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn common(args: &[&str]) -> CommonArgs {
        let argv = ["webvitals", "crux", "--sitemap", "example.com", "--api-key", "k"]
            .into_iter()
            .chain(args.iter().copied());
        match Cli::try_parse_from(argv).unwrap().command {
            Command::Crux { common, .. } => common,
            Command::Psi { .. } => unreachable!(),
        }
    }

    #[test]
    fn test_throttle_attempts_flag_sets_total_attempts() {
        let config = common(&["--max-throttle-attempts", "5"])
            .config(CollectorConfigBuilder::crux())
            .unwrap();
        assert_eq!(config.throttle_retry.max_attempts, 5);
        let renamed = ["webvitals", "crux", "--sitemap", "a.com", "--max-throttle-retries", "5"];
        assert!(Cli::try_parse_from(renamed).is_err());
    }

    #[test]
    fn test_rate_limit_overrides_keep_preset_window() {
        let config = common(&["--rate-limit", "10"]).config(CollectorConfigBuilder::crux()).unwrap();
        assert_eq!(config.rate_limit.max_queries, 10);
        assert_eq!(config.rate_limit.window, Duration::from_secs(60));
        assert_eq!(config.api_key, "k");
    }

    #[test]
    fn test_source_flags_are_exclusive() {
        assert!(Cli::try_parse_from(["webvitals", "psi"]).is_err());
        assert!(
            Cli::try_parse_from(["webvitals", "psi", "--sitemap", "a.com", "--urls-file", "urls.txt"]).is_err()
        );
    }
}
