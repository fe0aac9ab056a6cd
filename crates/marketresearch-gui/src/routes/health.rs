use axum::{Json, Router, extract::State, http::StatusCode, routing::get};
use serde::Serialize;

use crate::state::{AppState, ReportMetrics};

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    gui_enabled: bool,
    /// Whether a report submitted now would start generating immediately.
    accepting_immediately: bool,
    metrics: ReportMetrics,
}

pub fn health_router() -> Router<AppState> {
    Router::new()
        .route("/live", get(live))
        .route("/ready", get(ready))
}

async fn live(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(build_response(&state.metrics(), state.gui_enabled()))
}

/// Ready while the GUI is on. A saturated service is still ready; new reports
/// queue behind the running ones and the response says how many are waiting.
async fn ready(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let response = build_response(&state.metrics(), state.gui_enabled());
    let code = if response.gui_enabled {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(response))
}

fn build_response(metrics: &ReportMetrics, gui_enabled: bool) -> HealthResponse {
    let status = if !gui_enabled {
        "disabled"
    } else if metrics.queued_reports > 0 {
        "queueing"
    } else if metrics.available_permits == 0 {
        "saturated"
    } else {
        "ok"
    };

    HealthResponse {
        status,
        gui_enabled,
        accepting_immediately: gui_enabled && metrics.available_permits > 0,
        metrics: *metrics,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(available_permits: usize, running_reports: usize) -> ReportMetrics {
        let generating_reports = 2 - available_permits;
        ReportMetrics {
            max_concurrency: 2,
            available_permits,
            running_reports,
            generating_reports,
            queued_reports: running_reports - generating_reports,
            total_reports: running_reports,
            max_reports: 100,
        }
    }

    #[test]
    fn status_tracks_queue_depth() {
        assert_eq!(build_response(&metrics(2, 0), true).status, "ok");
        assert_eq!(build_response(&metrics(0, 2), true).status, "saturated");

        let queueing = build_response(&metrics(0, 5), true);
        assert_eq!(queueing.status, "queueing");
        assert_eq!(queueing.metrics.queued_reports, 3);
        assert!(!queueing.accepting_immediately);
    }

    #[test]
    fn disabled_gui_wins() {
        let response = build_response(&metrics(2, 0), false);
        assert_eq!(response.status, "disabled");
        assert!(!response.accepting_immediately);
    }
}
