//! cidepot - Entry Point
//!
//! Records CI build outcomes and promotes releases between environments.

use std::collections::HashMap;
use std::env;
use std::process::ExitCode;
use std::sync::Arc;

use cidepot::app::options::AppOptions;
use cidepot::app::run::run;
use cidepot::app::state::AppState;
use cidepot::cli::{
    build_record_from_args, metrics_window, parse_args, print_deployment, print_metrics, required,
};
use cidepot::errors::DepotError;
use cidepot::ledger::BuildLedger;
use cidepot::logs::{init_logging, LogOptions};
use cidepot::metrics::MetricsAggregator;
use cidepot::models::deployment::{DeploymentRecord, Environment};
use cidepot::storage::layout::StorageLayout;
use cidepot::storage::settings::Settings;
use cidepot::utils::version_info;

use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    let cli_args = parse_args(env::args().skip(1));

    // Print version and exit
    let version = version_info();
    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version) {
            Ok(json) => println!("{}", json),
            Err(_) => println!("{}", version.version),
        }
        return ExitCode::SUCCESS;
    }

    let layout = match cli_args.get("base-dir") {
        Some(base_dir) => StorageLayout::new(base_dir),
        None => StorageLayout::default(),
    };

    // Retrieve the settings file
    let settings = match Settings::load(&layout.settings_file()).await {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Unable to read settings file: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let is_service = !["metrics", "record", "deploy", "blue-green", "rollback"]
        .iter()
        .any(|command| cli_args.contains_key(*command));

    // Initialize logging; one-shot commands log to stdout only
    let log_options = LogOptions {
        log_level: settings.log_level.clone(),
        json_format: settings.json_logs,
        log_dir: (is_service && settings.log_to_file).then(|| layout.logs_dir().path().to_path_buf()),
        ..Default::default()
    };
    if let Err(e) = init_logging(log_options) {
        println!("Failed to initialize logging: {e}");
    }

    let result = if is_service {
        let options = AppOptions::from_settings(layout, settings);
        info!("Running cidepot {} with options: {:?}", version.version, options);
        run(options, await_shutdown_signal()).await
    } else {
        run_command(&cli_args, &layout, &settings).await
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("Error ({}): {}", e.kind(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run_command(
    cli_args: &HashMap<String, String>,
    layout: &StorageLayout,
    settings: &Settings,
) -> Result<(), DepotError> {
    // Metrics only need the build ledger
    if let Some(value) = cli_args.get("metrics") {
        let window = metrics_window(value)?;
        let builds = Arc::new(BuildLedger::open("builds", layout.builds_ledger_file()).await?);
        print_metrics(&MetricsAggregator::new(builds).report(window));
        return Ok(());
    }

    let state = AppState::init(layout, settings).await?;

    if cli_args.contains_key("record") {
        let record = build_record_from_args(cli_args)?;
        let id = state.record_build(record).await?;
        println!("Recorded build as entry {}", id);
        return Ok(());
    }

    if let Some(environment) = cli_args.get("rollback") {
        let environment = environment.parse::<Environment>()?;
        let record = state.rollback.rollback(environment).await?;
        return report_outcome(&record);
    }

    let content = required(cli_args, "content")?;
    let release = required(cli_args, "release")?;

    let record = if cli_args.contains_key("blue-green") {
        state.deployments.deploy_blue_green(content, release).await?
    } else {
        let environment = required(cli_args, "deploy")?.parse::<Environment>()?;
        state.deployments.deploy(environment, content, release).await?
    };
    report_outcome(&record)
}

fn report_outcome(record: &DeploymentRecord) -> Result<(), DepotError> {
    print_deployment(record);
    if record.is_success() {
        return Ok(());
    }
    Err(DepotError::HealthCheckFailed {
        environment: record.environment.to_string(),
        reason: record
            .message
            .clone()
            .unwrap_or_else(|| format!("{} failed", record.action)),
    })
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let (mut sigterm, mut sigint) = match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(sigterm), Ok(sigint)) => (sigterm, sigint),
            _ => {
                error!("Unable to install signal handlers, waiting for Ctrl+C");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = sigint.recv() => {
                info!("SIGINT received, shutting down...");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
        }
        info!("Ctrl+C received, shutting down...");
    }
}
