use axum::{
    routing::{get, post},
    Router,
};
use crate::handlers::product::{
    get_products, get_categories, get_product, create_product, update_product, mark_product_used, delete_product
};
use crate::middleware::auth::require_auth;
use crate::state::AppState;

pub fn routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/products", get(get_products).post(create_product))
        .route("/products/categories", get(get_categories))
        .route("/products/{id}", get(get_product).put(update_product).delete(delete_product))
        .route("/products/{id}/use", post(mark_product_used))
        .route_layer(axum::middleware::from_fn_with_state(state.clone(), require_auth))
}
