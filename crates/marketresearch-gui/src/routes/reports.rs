use async_trait::async_trait;
use axum::{
    Json, Router,
    extract::{FromRequestParts, Path, Query},
    http::{HeaderValue, StatusCode, header, request::Parts},
    response::{
        Html, IntoResponse, Response,
        sse::{KeepAlive, Sse},
    },
    routing::{get, post},
};
use marketresearch_core::{Report, ReportView, render_html};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::instrument;
use url::form_urlencoded;

use crate::error::AppError;
use crate::state::{
    AppState, ReportMetrics, ReportRequest, ReportState, ReportStatus, SseStream,
};

const DOCX_MIME: &str = "application/vnd.openxmlformats-officedocument.wordprocessingml.document";
const TOKEN_PARAM: &str = "access_token";

#[derive(Debug, Deserialize)]
pub struct StartReportRequest {
    pub query: String,
    #[serde(default)]
    pub company: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StartReportResponse {
    pub report_id: String,
    pub state: ReportState,
    pub capacity: CapacitySnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CapacitySnapshot {
    pub max_concurrency: usize,
    pub available_permits: usize,
    pub running_reports: usize,
    pub queued_reports: usize,
    pub total_reports: usize,
}

impl From<ReportMetrics> for CapacitySnapshot {
    fn from(value: ReportMetrics) -> Self {
        Self {
            max_concurrency: value.max_concurrency,
            available_permits: value.available_permits,
            running_reports: value.running_reports,
            queued_reports: value.queued_reports,
            total_reports: value.total_reports,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ListReportsResponse {
    pub reports: Vec<ReportStatus>,
    pub capacity: CapacitySnapshot,
}

pub fn report_router() -> Router<AppState> {
    Router::new()
        .route("/reports", post(start_report).get(list_reports))
        .route("/reports/:id", get(get_report))
        .route("/reports/:id/view", get(view_report))
        .route("/reports/:id/download", get(download_report))
        .route("/reports/:id/stream", get(stream_report))
}

#[instrument(skip_all, fields(company = %payload.company.as_deref().unwrap_or("auto")))]
async fn start_report(
    GuardedState { state, .. }: GuardedState,
    Json(payload): Json<StartReportRequest>,
) -> Result<(StatusCode, Json<StartReportResponse>), AppError> {
    if payload.query.trim().is_empty() {
        return Err(AppError::new(
            StatusCode::BAD_REQUEST,
            "query must not be empty",
        ));
    }

    let request = ReportRequest::new(payload.query.trim()).with_company(payload.company);

    let service = state.report_service();
    let report_id = service.start_report(request);

    let report_state = service
        .status(&report_id)
        .map(|status| status.state)
        .unwrap_or(ReportState::Running);

    let metrics_snapshot = service.metrics();
    crate::metrics::report_started(
        &report_id,
        metrics_snapshot.running_reports,
        metrics_snapshot.available_permits,
    );

    let response = StartReportResponse {
        report_id,
        state: report_state,
        capacity: metrics_snapshot.into(),
        message: Some("report started".into()),
    };

    Ok((StatusCode::ACCEPTED, Json(response)))
}

async fn list_reports(
    GuardedState { state, .. }: GuardedState,
) -> Result<Json<ListReportsResponse>, AppError> {
    let service = state.report_service();
    let reports = service.list();
    let capacity = service.metrics().into();
    Ok(Json(ListReportsResponse { reports, capacity }))
}

async fn get_report(
    GuardedState { state, .. }: GuardedState,
    Path(report_id): Path<String>,
) -> Result<Json<ReportStatus>, AppError> {
    state
        .report_service()
        .status(&report_id)
        .map(Json)
        .ok_or_else(AppError::not_found)
}

async fn view_report(
    GuardedState { state, token }: GuardedState,
    Path(report_id): Path<String>,
) -> Result<Html<String>, AppError> {
    let service = state.report_service();
    let outcome = match service.outcome(&report_id) {
        Some(outcome) => outcome,
        None => return Err(unfinished(&state, &report_id)),
    };

    let view = ReportView::from_report(&Report::parse(&outcome.content), service.title());
    let download_url = download_url(&report_id, token.as_deref());

    let html = render_html(&view, Some(download_url.as_str()), Some("/"))?;
    Ok(Html(html))
}

async fn download_report(
    GuardedState { state, .. }: GuardedState,
    Path(report_id): Path<String>,
) -> Result<Response, AppError> {
    let outcome = match state.report_service().outcome(&report_id) {
        Some(outcome) => outcome,
        None => return Err(unfinished(&state, &report_id)),
    };

    let bytes = tokio::fs::read(&outcome.path)
        .await
        .map_err(|err| AppError::internal(format!("failed to read report file: {err}")))?;
    crate::metrics::report_downloaded(&report_id, bytes.len());

    let disposition = HeaderValue::from_str(&format!(
        "attachment; filename=\"{}\"",
        outcome.filename.replace(['"', '\\'], "_")
    ))
    .unwrap_or_else(|_| HeaderValue::from_static("attachment; filename=\"report.docx\""));

    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(DOCX_MIME)),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

async fn stream_report(
    GuardedState { state, .. }: GuardedState,
    Path(report_id): Path<String>,
) -> Result<Sse<SseStream>, AppError> {
    match state.report_service().event_stream(&report_id) {
        Some(stream) => Ok(Sse::new(stream).keep_alive(KeepAlive::new())),
        None => Err(AppError::not_found()),
    }
}

/// Download link for the view page, carrying the caller's query token forward.
fn download_url(report_id: &str, token: Option<&str>) -> String {
    let mut url = format!("/api/reports/{report_id}/download");
    if let Some(token) = token {
        let query = form_urlencoded::Serializer::new(String::new())
            .append_pair(TOKEN_PARAM, token)
            .finish();
        url.push('?');
        url.push_str(&query);
    }
    url
}

/// 409 while the report is still being generated, 404 otherwise.
fn unfinished(state: &AppState, report_id: &str) -> AppError {
    match state.report_service().status(report_id) {
        Some(status) if status.state == ReportState::Running => {
            AppError::new(StatusCode::CONFLICT, "report is still running")
        }
        Some(status) => AppError::new(
            StatusCode::CONFLICT,
            status
                .error
                .unwrap_or_else(|| "report did not complete".to_string()),
        ),
        None => AppError::not_found(),
    }
}

/// App state plus the query-string token the caller authenticated with, if
/// any, so browser links can carry it forward.
pub struct GuardedState {
    pub state: AppState,
    pub token: Option<String>,
}

#[async_trait]
impl FromRequestParts<AppState> for GuardedState {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let app_state = state.clone();

        if !app_state.gui_enabled() {
            return Err(AppError::new(StatusCode::FORBIDDEN, "GUI disabled"));
        }

        let mut query_token = None;
        if let Some(expected) = app_state.auth_token() {
            let header_token = parts
                .headers
                .get(header::AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.strip_prefix("Bearer "))
                .map(str::trim);

            if header_token != Some(expected.as_str()) {
                query_token = token_from_query(parts);
                if query_token.as_deref() != Some(expected.as_str()) {
                    return Err(AppError::new(
                        StatusCode::UNAUTHORIZED,
                        "invalid auth token",
                    ));
                }
            }
        }

        Ok(GuardedState {
            state: app_state,
            token: query_token,
        })
    }
}

fn token_from_query(parts: &Parts) -> Option<String> {
    let Query(params) = Query::<HashMap<String, String>>::try_from_uri(&parts.uri).ok()?;
    params
        .get(TOKEN_PARAM)
        .filter(|value| !value.is_empty())
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(uri: &str) -> Parts {
        let (parts, ()) = Request::builder().uri(uri).body(()).unwrap().into_parts();
        parts
    }

    #[test]
    fn token_is_read_from_query_string() {
        assert_eq!(
            token_from_query(&parts("/api/reports?a=1&access_token=secret")),
            Some("secret".to_string())
        );
        assert_eq!(token_from_query(&parts("/api/reports?access_token=")), None);
        assert_eq!(token_from_query(&parts("/api/reports")), None);
    }

    #[test]
    fn query_token_is_percent_decoded() {
        assert_eq!(
            token_from_query(&parts("/api/reports?access_token=a%2Bb%2Fc%3D")),
            Some("a+b/c=".to_string())
        );
    }

    #[test]
    fn download_link_encodes_token() {
        assert_eq!(
            download_url("r1", Some("a+b/c=")),
            "/api/reports/r1/download?access_token=a%2Bb%2Fc%3D"
        );
        assert_eq!(download_url("r1", None), "/api/reports/r1/download");
    }
}
