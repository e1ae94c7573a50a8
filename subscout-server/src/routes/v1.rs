use axum::{
    Router,
    routing::{get, post},
};

use crate::{
    AppState,
    handlers::scan::handle_scan::{
        cancel_scan_handler, create_scan_handler, delete_scan_handler,
        get_scan_handler, list_scans_handler, scan_results_handler,
        scan_stats_handler, scan_status_handler, tools_health_handler,
    },
};

/// Create all v1 API routes
pub fn create_v1_router() -> Router<AppState> {
    Router::new()
        .route("/scans", post(create_scan_handler).get(list_scans_handler))
        .route("/scans/stats", get(scan_stats_handler))
        .route("/scans/tools/health", get(tools_health_handler))
        .route(
            "/scans/{id}",
            get(get_scan_handler).delete(delete_scan_handler),
        )
        .route("/scans/{id}/status", get(scan_status_handler))
        .route("/scans/{id}/results", get(scan_results_handler))
        .route("/scans/{id}/cancel", post(cancel_scan_handler))
}
