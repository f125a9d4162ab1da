// src/handlers/product.rs
use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use tracing::{info, instrument};

use crate::dtos::product::{
    CreateProductRequest, DeleteProductResponse, ProductQuery, ProductResponse, UpdateProductRequest,
};
use crate::error::AppError;
use crate::middleware::auth::AuthContext;
use crate::models::amount;
use crate::models::product::{NewProduct, ProductChanges};
use crate::store::ProductRemoval;
use crate::services::product_filter::{category_counts, CategoryCount, ProductFilter};
use crate::state::AppState;

fn validate_name(name: &str) -> Result<(), AppError> {
    if name.trim().is_empty() {
        return Err(AppError::validation("Product name required"));
    }
    Ok(())
}

fn validate_unit(unit: &str) -> Result<(), AppError> {
    if unit.trim().is_empty() {
        return Err(AppError::validation("Unit required"));
    }
    Ok(())
}

// GET /products - Filtered product list
#[instrument(skip(state, auth), fields(owner = auth.user_id))]
pub async fn get_products(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<ProductQuery>,
) -> Result<Json<Vec<ProductResponse>>, AppError> {
    let products = state.store.load_products(auth.user_id).await?;
    let filter = ProductFilter::new(query.search, query.category, query.active_only.unwrap_or(true));

    let response = filter.apply(products).into_iter().map(ProductResponse::from).collect();
    Ok(Json(response))
}

// GET /products/categories - Product counts per category
pub async fn get_categories(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<ProductQuery>,
) -> Result<Json<Vec<CategoryCount>>, AppError> {
    let products = state.store.load_products(auth.user_id).await?;
    Ok(Json(category_counts(&products, query.active_only.unwrap_or(true))))
}

// GET /products/:id - Get single product
pub async fn get_product(
    Path(id): Path<i64>,
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<ProductResponse>, AppError> {
    let product = state.store
        .get_product(auth.user_id, id)
        .await?
        .ok_or_else(|| AppError::not_found("Product not found"))?;

    Ok(Json(ProductResponse::from(product)))
}

// POST /products - Create new product
#[instrument(skip(state, auth, payload), fields(owner = auth.user_id))]
pub async fn create_product(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(payload): Json<CreateProductRequest>,
) -> Result<(StatusCode, Json<ProductResponse>), AppError> {
    validate_name(&payload.name)?;
    validate_unit(&payload.unit)?;
    amount::UNIT_PRICE.check(payload.unit_price)?;

    let product = state.store
        .insert_product(auth.user_id, NewProduct {
            name: payload.name.trim().to_string(),
            description: payload.description.trim().to_string(),
            unit_price: payload.unit_price,
            unit: payload.unit.trim().to_string(),
            category: payload.category,
        })
        .await?;

    info!(product_id = product.id, "Product created");
    Ok((StatusCode::CREATED, Json(ProductResponse::from(product))))
}

// PUT /products/:id - Update product
#[instrument(skip(state, auth, payload), fields(owner = auth.user_id))]
pub async fn update_product(
    Path(id): Path<i64>,
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(payload): Json<UpdateProductRequest>,
) -> Result<Json<ProductResponse>, AppError> {
    if let Some(name) = &payload.name {
        validate_name(name)?;
    }
    if let Some(unit) = &payload.unit {
        validate_unit(unit)?;
    }
    if let Some(price) = payload.unit_price {
        amount::UNIT_PRICE.check(price)?;
    }

    let changes = ProductChanges {
        name: payload.name.map(|s| s.trim().to_string()),
        description: payload.description.map(|s| s.trim().to_string()),
        unit_price: payload.unit_price,
        unit: payload.unit.map(|s| s.trim().to_string()),
        category: payload.category,
        is_active: payload.is_active,
    };

    let product = state.store
        .update_product(auth.user_id, id, changes)
        .await?
        .ok_or_else(|| AppError::not_found("Product not found"))?;

    Ok(Json(ProductResponse::from(product)))
}

// POST /products/:id/use - Mark product as used
pub async fn mark_product_used(
    Path(id): Path<i64>,
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<ProductResponse>, AppError> {
    let product = state.store
        .mark_product_used(auth.user_id, id, Utc::now())
        .await?
        .ok_or_else(|| AppError::not_found("Product not found"))?;

    Ok(Json(ProductResponse::from(product)))
}

// DELETE /products/:id - Delete product, or deactivate it when invoices reference it
#[instrument(skip(state, auth), fields(owner = auth.user_id))]
pub async fn delete_product(
    Path(id): Path<i64>,
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<DeleteProductResponse>, AppError> {
    let removal = state.store
        .remove_product(auth.user_id, id)
        .await?
        .ok_or_else(|| AppError::not_found("Product not found"))?;

    let deleted = removal == ProductRemoval::Deleted;
    if !deleted {
        info!(product_id = id, "Product referenced by invoices, deactivated instead of deleted");
    }
    Ok(Json(DeleteProductResponse { id, deleted, deactivated: !deleted }))
}
