// src/dtos/product.rs
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::product::{Product, ProductCategory};

#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub unit_price: Decimal,
    pub unit: String,
    pub category: ProductCategory,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProductRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub unit_price: Option<Decimal>,
    pub unit: Option<String>,
    pub category: Option<ProductCategory>,
    pub is_active: Option<bool>,
}

/// Query string of `GET /products`.
#[derive(Debug, Default, Deserialize)]
pub struct ProductQuery {
    pub search: Option<String>,
    pub category: Option<ProductCategory>,
    pub active_only: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct ProductResponse {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub unit_price: Decimal,
    pub unit: String,
    pub category: ProductCategory,
    pub is_active: bool,
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// Convert from Model to Response DTO
impl From<Product> for ProductResponse {
    fn from(product: Product) -> Self {
        Self {
            id: product.id,
            name: product.name,
            description: product.description,
            unit_price: product.unit_price,
            unit: product.unit,
            category: product.category,
            is_active: product.is_active,
            last_used_at: product.last_used_at,
            created_at: product.created_at,
            updated_at: product.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DeleteProductResponse {
    pub id: i64,
    /// Removed from the catalog.
    pub deleted: bool,
    /// Kept but marked inactive because invoices still reference it.
    pub deactivated: bool,
}
