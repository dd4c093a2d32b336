//! HTTP request handlers

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use openapi_server::models::{
    BackupSummary, BuildAccepted, BuildSubmission, BuildSummaryResponse, DeployRequest,
    DeploymentListResponse, DeploymentResponse, EnvironmentResponse, ErrorResponse,
    HealthResponse, MetricsResponse, RecentBuildsResponse, VersionResponse,
};
use serde::Deserialize;

use crate::errors::DepotError;
use crate::metrics::BuildSummary;
use crate::models::build::{BuildRecord, BuildStatus};
use crate::models::deployment::{DeploymentRecord, Environment};
use crate::server::state::ServerState;
use crate::utils::version_info;

/// Error returned by handlers, rendered as an [`ErrorResponse`]
#[derive(Debug)]
pub struct ApiError(pub DepotError);

impl From<DepotError> for ApiError {
    fn from(err: DepotError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match &self.0 {
            DepotError::ValidationError(_) => StatusCode::BAD_REQUEST,
            DepotError::InvalidEnvironment(_) => StatusCode::NOT_FOUND,
            DepotError::HealthCheckFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            DepotError::NoBackupAvailable(_) => StatusCode::CONFLICT,
            DepotError::EnvironmentBusy(_) => StatusCode::LOCKED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            kind: self.0.kind().to_string(),
            error: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Health check handler
pub async fn health_handler() -> impl IntoResponse {
    let version = version_info();
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "cidepot".to_string(),
        version: version.version,
    })
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    let version = version_info();
    Json(VersionResponse {
        version: version.version,
        git_hash: version.git_hash,
        build_time: version.build_time,
    })
}

/// Build metrics handler
pub async fn metrics_handler(
    State(state): State<Arc<ServerState>>,
) -> Result<impl IntoResponse, ApiError> {
    state.app_state.metrics.refresh().await?;
    let report = state.app_state.metrics.report(NonZeroUsize::MIN);

    Ok(Json(MetricsResponse {
        total_builds: report.total_builds,
        successful_builds: report.successful_builds,
        failed_builds: report.failed_builds,
        unstable_builds: report.unstable_builds,
        success_rate: report.success_rate,
        average_duration_secs: report.average_duration_secs,
        average_coverage: report.average_coverage,
        test_pass_rate: report.test_pass_rate,
    }))
}

/// Optional `n` query parameter
#[derive(Debug, Deserialize)]
pub struct CountQuery {
    pub n: Option<usize>,
}

impl CountQuery {
    fn window(&self, default: usize) -> Result<NonZeroUsize, DepotError> {
        let n = self.n.unwrap_or(default);
        NonZeroUsize::new(n)
            .ok_or_else(|| DepotError::ValidationError("n must be at least 1".to_string()))
    }
}

/// Recent builds handler
pub async fn recent_builds_handler(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<CountQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let window = query.window(state.default_window)?;
    state.app_state.metrics.refresh().await?;
    let builds: Vec<BuildSummaryResponse> = state
        .app_state
        .metrics
        .recent_summary(window)
        .iter()
        .map(build_summary_response)
        .collect();

    Ok(Json(RecentBuildsResponse {
        total: state.app_state.builds.len(),
        builds,
    }))
}

/// Build submission handler
pub async fn submit_build_handler(
    State(state): State<Arc<ServerState>>,
    Json(submission): Json<BuildSubmission>,
) -> Result<impl IntoResponse, ApiError> {
    let status = submission.status.parse::<BuildStatus>()?;
    let record = BuildRecord {
        timestamp: submission.timestamp.unwrap_or_else(Utc::now),
        job_name: submission.job_name,
        build_number: submission.build_number,
        duration_seconds: submission.duration_seconds,
        status,
        tests_total: submission.tests_total,
        tests_passed: submission.tests_passed,
        tests_failed: submission.tests_failed,
        coverage_percent: submission.coverage_percent,
    };

    let record_id = state.app_state.record_build(record).await?;
    Ok((StatusCode::CREATED, Json(BuildAccepted { record_id })))
}

/// Deploy handler
pub async fn deploy_handler(
    State(state): State<Arc<ServerState>>,
    Path(environment): Path<String>,
    Json(request): Json<DeployRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let environment = environment.parse::<Environment>()?;
    let record = state
        .app_state
        .deployments
        .deploy(environment, PathBuf::from(request.content_path), &request.version)
        .await?;
    Ok(Json(deployment_response(&record)))
}

/// Blue-green deploy handler
pub async fn blue_green_handler(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<DeployRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state
        .app_state
        .deployments
        .deploy_blue_green(PathBuf::from(request.content_path), &request.version)
        .await?;
    Ok(Json(deployment_response(&record)))
}

/// Rollback handler
pub async fn rollback_handler(
    State(state): State<Arc<ServerState>>,
    Path(environment): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let environment = environment.parse::<Environment>()?;
    let record = state.app_state.rollback.rollback(environment).await?;
    Ok(Json(deployment_response(&record)))
}

/// Environment status handler
pub async fn environment_handler(
    State(state): State<Arc<ServerState>>,
    Path(environment): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let environment = environment.parse::<Environment>()?;
    let deployments = &state.app_state.deployments;

    let location = deployments.location(environment).await?;
    let fsm_state = deployments.state(environment).await?;
    let active = deployments.active(environment).await?;
    let backups = deployments
        .backups(environment)
        .await?
        .into_iter()
        .map(|b| BackupSummary {
            created_at: b.created_at,
            content_ref: b.content_ref.display().to_string(),
            version: b.version,
        })
        .collect();
    let live = deployments.live_slot().await == Some(environment);

    Ok(Json(EnvironmentResponse {
        environment: environment.to_string(),
        state: fsm_state.as_str().to_string(),
        location: location.display().to_string(),
        version: active.as_ref().map(|a| a.version.clone()),
        deployed_at: active.as_ref().map(|a| a.deployed_at),
        digest: active.and_then(|a| a.digest),
        live,
        backups,
    }))
}

/// Deployment history handler; without `n` the whole history is returned
pub async fn deployments_handler(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<CountQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let history = state.app_state.deployments.history();
    history.sync().await?;
    let deployments: Vec<DeploymentResponse> = match query.n {
        Some(_) => history
            .list_recent(query.window(state.default_window)?)
            .iter()
            .map(deployment_response)
            .collect(),
        None => history.all().iter().map(deployment_response).collect(),
    };

    Ok(Json(DeploymentListResponse {
        total: history.len(),
        deployments,
    }))
}

fn build_summary_response(summary: &BuildSummary) -> BuildSummaryResponse {
    BuildSummaryResponse {
        job_name: summary.job_name.clone(),
        build_number: summary.build_number,
        status: summary.status.to_string(),
        duration_seconds: summary.duration_seconds,
        tests: summary.tests_ratio(),
    }
}

fn deployment_response(record: &DeploymentRecord) -> DeploymentResponse {
    DeploymentResponse {
        environment: record.environment.to_string(),
        timestamp: record.timestamp,
        version: record.version.clone(),
        status: record.status.to_string(),
        action: record.action.to_string(),
        backup_path: record
            .backup_path
            .as_ref()
            .map(|p| p.display().to_string()),
        message: record.message.clone(),
    }
}
