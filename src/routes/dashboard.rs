use axum::{routing::get, Router};
use crate::state::AppState;
use crate::handlers::dashboard::{get_dashboard, export_dashboard};
use crate::middleware::auth::require_auth;

pub fn routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/dashboard", get(get_dashboard))
        .route("/dashboard/export", get(export_dashboard))
        .route_layer(axum::middleware::from_fn_with_state(state.clone(), require_auth))
}
