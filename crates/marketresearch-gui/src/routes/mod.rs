mod health;
mod reports;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
};
use health::health_router;
use reports::report_router;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub use reports::GuardedState;

const INDEX_PAGE: &str = include_str!("../../templates/index.html");

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .nest("/health", health_router())
        .nest("/api", report_router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn index(State(state): State<AppState>) -> Response {
    if !state.gui_enabled() {
        return StatusCode::NOT_FOUND.into_response();
    }
    Html(INDEX_PAGE).into_response()
}
