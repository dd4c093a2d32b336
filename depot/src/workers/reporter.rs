//! Metrics reporter worker

use std::future::Future;
use std::num::NonZeroUsize;
use std::pin::Pin;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::errors::DepotError;
use crate::filesys::file::File;
use crate::metrics::{MetricsAggregator, MetricsReport};

/// Reporter worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Reporting interval
    pub interval: Duration,

    /// Initial delay before the first report
    pub initial_delay: Duration,

    /// Number of recent builds included in each report
    pub window: NonZeroUsize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            initial_delay: Duration::from_secs(1),
            window: NonZeroUsize::new(10).unwrap_or(NonZeroUsize::MIN),
        }
    }
}

/// Compute a report and replace the metrics file with it
pub async fn write_report(
    aggregator: &MetricsAggregator,
    metrics_file: &File,
    window: NonZeroUsize,
) -> Result<MetricsReport, DepotError> {
    aggregator.refresh().await?;
    let report = aggregator.report(window);
    metrics_file.write_json(&report).await?;
    Ok(report)
}

/// Run the reporter worker
pub async fn run<S, F>(
    options: &Options,
    aggregator: &MetricsAggregator,
    metrics_file: &File,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!("Reporter worker starting...");

    let mut wait = options.initial_delay;
    loop {
        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Reporter worker shutting down...");
                return;
            }
            _ = sleep_fn(wait) => {}
        }
        wait = options.interval;

        match write_report(aggregator, metrics_file, options.window).await {
            Ok(report) => debug!(
                "Wrote metrics report: {} builds, {:.1}% success",
                report.total_builds, report.success_rate
            ),
            Err(e) => error!("Unable to write metrics report: {}", e),
        }
    }
}
