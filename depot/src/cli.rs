//! Command line parsing and terminal output

use std::collections::HashMap;
use std::num::NonZeroUsize;

use chrono::Utc;
use colored::*;

use crate::errors::DepotError;
use crate::metrics::MetricsReport;
use crate::models::build::{BuildRecord, BuildStatus};
use crate::models::deployment::{DeploymentRecord, DeploymentStatus};

/// Builds listed by `--metrics` without a count
pub const DEFAULT_METRICS_WINDOW: usize = 10;

/// Parse `--key=value` and bare `--flag` arguments
pub fn parse_args<I>(args: I) -> HashMap<String, String>
where
    I: IntoIterator<Item = String>,
{
    let mut cli_args = HashMap::new();
    for arg in args {
        if let Some((key, value)) = arg.split_once('=') {
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }
    cli_args
}

/// Look up a required flag
pub fn required<'a>(cli_args: &'a HashMap<String, String>, key: &str) -> Result<&'a str, DepotError> {
    cli_args
        .get(key)
        .map(String::as_str)
        .filter(|v| !v.is_empty() && *v != "true")
        .ok_or_else(|| DepotError::ValidationError(format!("--{}=<value> is required", key)))
}

fn parse_number<T: std::str::FromStr>(
    cli_args: &HashMap<String, String>,
    key: &str,
    default: Option<T>,
) -> Result<T, DepotError> {
    match cli_args.get(key) {
        Some(raw) => raw
            .parse()
            .map_err(|_| DepotError::ValidationError(format!("--{} must be a number, got {}", key, raw))),
        None => default
            .ok_or_else(|| DepotError::ValidationError(format!("--{}=<number> is required", key))),
    }
}

/// Window requested by `--metrics[=N]`
pub fn metrics_window(value: &str) -> Result<NonZeroUsize, DepotError> {
    if value == "true" {
        return NonZeroUsize::new(DEFAULT_METRICS_WINDOW)
            .ok_or_else(|| DepotError::Internal("metrics window is zero".to_string()));
    }
    value
        .parse::<NonZeroUsize>()
        .map_err(|_| DepotError::ValidationError(format!("--metrics expects a positive count, got {}", value)))
}

/// Build record described by `--job`, `--build`, `--duration`, `--status` and
/// the optional test and coverage flags
pub fn build_record_from_args(cli_args: &HashMap<String, String>) -> Result<BuildRecord, DepotError> {
    let status = required(cli_args, "status")?.parse::<BuildStatus>()?;
    let record = BuildRecord {
        timestamp: Utc::now(),
        job_name: required(cli_args, "job")?.to_string(),
        build_number: parse_number(cli_args, "build", None)?,
        duration_seconds: parse_number(cli_args, "duration", None)?,
        status,
        tests_total: parse_number(cli_args, "tests-total", Some(0))?,
        tests_passed: parse_number(cli_args, "tests-passed", Some(0))?,
        tests_failed: parse_number(cli_args, "tests-failed", Some(0))?,
        coverage_percent: parse_number(cli_args, "coverage", Some(0.0))?,
    };
    record.validate()?;
    Ok(record)
}

fn colorize_build_status(status: BuildStatus) -> ColoredString {
    match status {
        BuildStatus::Success => status.as_str().green(),
        BuildStatus::Failure => status.as_str().red(),
        BuildStatus::Unstable => status.as_str().yellow(),
        BuildStatus::Unknown => status.as_str().dimmed(),
    }
}

/// Print a metrics report
pub fn print_metrics(report: &MetricsReport) {
    println!("{}", "Build Metrics".bold());
    println!("-------------");
    println!("Total builds:     {}", report.total_builds);
    println!(
        "Success rate:     {}",
        format!("{:.1}%", report.success_rate).bold()
    );
    println!("Average duration: {}s", report.average_duration_secs);
    println!("Average coverage: {:.1}%", report.average_coverage);
    println!("Test pass rate:   {:.1}%", report.test_pass_rate);

    if report.recent.is_empty() {
        return;
    }
    println!("\nRecent builds:");
    for build in &report.recent {
        println!(
            "  {} #{} {} {}s tests {}",
            build.job_name,
            build.build_number,
            colorize_build_status(build.status),
            build.duration_seconds,
            build.tests_ratio()
        );
    }
}

/// Print the outcome of a deploy or rollback
pub fn print_deployment(record: &DeploymentRecord) {
    let status = match record.status {
        DeploymentStatus::Success => "✓".green(),
        DeploymentStatus::Failed => "✗".red(),
    };
    print!(
        "{} {} {} to {} ({})",
        status, record.action, record.version, record.environment, record.status
    );
    if let Some(message) = &record.message {
        print!(" - {}", message.dimmed());
    }
    println!();
    if let Some(backup) = &record.backup_path {
        println!("  backup: {}", backup.display());
    }
}
