use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Deserialize;
use subscout_core::{domain::normalize_domain, tools::probe_tools};
use subscout_model::{NewScan, Scan, ScanId, ScanListQuery, ScanStatus};
use tracing::{info, warn};

use crate::{
    api::{
        ApiResponse, ScanCommandAccepted, ScanListView, ScanResultsView,
        ScanStatusView, ScanView,
    },
    infra::{
        app_state::AppState,
        errors::{AppError, AppResult},
    },
};

/// Audit name for writes made through the API.
pub const API_ACTOR: &str = "api_user";

#[derive(Debug, Default, Deserialize)]
pub struct StatsQuery {
    pub user_id: Option<i64>,
}

/// Active scan or 404. Soft-deleted scans are treated as missing.
async fn load_active_scan(state: &AppState, scan_id: ScanId) -> AppResult<Scan> {
    state
        .repository()
        .get_scan_by_id(scan_id)
        .await?
        .filter(|scan| scan.is_active)
        .ok_or_else(|| AppError::not_found(format!("Scan {scan_id} not found")))
}

pub async fn create_scan_handler(
    State(state): State<AppState>,
    Json(request): Json<NewScan>,
) -> AppResult<impl IntoResponse> {
    let domain = normalize_domain(&request.domain)?;
    state
        .config()
        .orchestrator
        .validate_options(&request.scan_options)?;
    let scan = state
        .repository()
        .create_scan(NewScan { domain, ..request }, Some(API_ACTOR))
        .await?;
    info!(scan_id = %scan.id, domain = %scan.domain, "Scan created");

    if let Err(err) = state.scan_control().start(scan.id).await {
        warn!(scan_id = %scan.id, "Scan could not be started: {}", err);
        return Err(err.into());
    }

    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::success(ScanView::from(scan))),
    ))
}

pub async fn list_scans_handler(
    State(state): State<AppState>,
    Query(query): Query<ScanListQuery>,
) -> AppResult<impl IntoResponse> {
    let scans = state.repository().list_scans(&query).await?;
    let scans: Vec<ScanView> = scans.into_iter().map(ScanView::from).collect();

    Ok(Json(ApiResponse::success(ScanListView {
        count: scans.len(),
        scans,
        skip: query.skip,
        limit: query.effective_limit(),
    })))
}

pub async fn get_scan_handler(
    State(state): State<AppState>,
    Path(scan_id): Path<ScanId>,
) -> AppResult<impl IntoResponse> {
    let scan = load_active_scan(&state, scan_id).await?;
    Ok(Json(ApiResponse::success(ScanView::from(scan))))
}

pub async fn scan_status_handler(
    State(state): State<AppState>,
    Path(scan_id): Path<ScanId>,
) -> AppResult<impl IntoResponse> {
    let scan = load_active_scan(&state, scan_id).await?;
    Ok(Json(ApiResponse::success(ScanStatusView::from(&scan))))
}

pub async fn scan_results_handler(
    State(state): State<AppState>,
    Path(scan_id): Path<ScanId>,
) -> AppResult<impl IntoResponse> {
    let scan = load_active_scan(&state, scan_id).await?;
    let finished = scan.status == ScanStatus::Finished;
    let response = ApiResponse::success(ScanResultsView::from(scan));
    Ok(Json(if finished {
        response
    } else {
        response.with_message("Results are available once the scan has finished")
    }))
}

pub async fn cancel_scan_handler(
    State(state): State<AppState>,
    Path(scan_id): Path<ScanId>,
) -> AppResult<impl IntoResponse> {
    let scan = load_active_scan(&state, scan_id).await?;
    state.scan_control().cancel(scan_id).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::success(ScanCommandAccepted {
            scan_id,
            status: scan.status,
        })),
    ))
}

pub async fn delete_scan_handler(
    State(state): State<AppState>,
    Path(scan_id): Path<ScanId>,
) -> AppResult<StatusCode> {
    if !state
        .repository()
        .soft_delete_scan(scan_id, API_ACTOR)
        .await?
    {
        return Err(AppError::not_found(format!("Scan {scan_id} not found")));
    }
    // Deleting a running scan also stops it.
    if state.scan_control().cancel(scan_id).await.is_ok() {
        info!(scan_id = %scan_id, "Cancelled running scan on delete");
    }
    info!(scan_id = %scan_id, "Scan deleted");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn scan_stats_handler(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> AppResult<impl IntoResponse> {
    let stats = state.repository().scan_stats(query.user_id).await?;
    Ok(Json(ApiResponse::success(stats)))
}

pub async fn tools_health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let report = probe_tools(&state.config().orchestrator).await;
    let status = if report.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}
