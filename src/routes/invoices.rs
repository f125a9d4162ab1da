use axum::{
    routing::{delete, get, patch, post},
    Router,
};
use crate::state::AppState;
use crate::handlers::invoice;
use crate::middleware::auth::require_auth;

pub fn routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/invoices", get(invoice::list_invoices).post(invoice::create_invoice))
        .route(
            "/invoices/{id}",
            get(invoice::get_invoice).put(invoice::update_invoice).delete(invoice::delete_invoice),
        )
        .route("/invoices/{id}/items", post(invoice::add_item))
        .route("/invoices/{id}/items/{index}", delete(invoice::remove_item))
        .route("/invoices/{id}/status", patch(invoice::update_status))
        .route_layer(axum::middleware::from_fn_with_state(state.clone(), require_auth))
}
