//! Persistence for accounts, the product catalog and invoices.
//!
//! Every collection is returned fully materialized; callers filter and
//! aggregate in memory.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::invoice::{Invoice, NewInvoice};
use crate::models::product::{NewProduct, Product, ProductChanges};
use crate::models::user::{NewUser, User};

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("{0}")]
    Conflict(String),
    #[error("Invalid stored row: {0}")]
    InvalidRow(String),
}

/// Outcome of removing a catalog product.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductRemoval {
    Deleted,
    /// Invoice lines still reference the product, so it was only
    /// deactivated.
    Deactivated,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn create_user(&self, user: NewUser) -> Result<User, StoreError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    async fn find_user(&self, id: i64) -> Result<Option<User>, StoreError>;

    /// Products of one owner ordered by case-insensitive name, then id.
    async fn load_products(&self, owner_id: i64) -> Result<Vec<Product>, StoreError>;
    async fn get_product(&self, owner_id: i64, id: i64) -> Result<Option<Product>, StoreError>;
    async fn insert_product(&self, owner_id: i64, product: NewProduct) -> Result<Product, StoreError>;
    async fn update_product(
        &self,
        owner_id: i64,
        id: i64,
        changes: ProductChanges,
    ) -> Result<Option<Product>, StoreError>;
    async fn mark_product_used(&self, owner_id: i64, id: i64, at: DateTime<Utc>) -> Result<Option<Product>, StoreError>;
    /// Deletes the product, or deactivates it when an invoice line of the
    /// owner references it, as one operation. `None` if there is no such
    /// product.
    async fn remove_product(&self, owner_id: i64, id: i64) -> Result<Option<ProductRemoval>, StoreError>;

    /// Invoices of one owner, newest issue date first, then id descending.
    async fn load_invoices(&self, owner_id: i64) -> Result<Vec<Invoice>, StoreError>;
    async fn get_invoice(&self, owner_id: i64, id: i64) -> Result<Option<Invoice>, StoreError>;
    /// Stores a draft and assigns the owner's next invoice number.
    async fn insert_invoice(&self, owner_id: i64, invoice: NewInvoice) -> Result<Invoice, StoreError>;
    /// Replaces header fields and items of an existing invoice.
    async fn save_invoice(&self, invoice: &Invoice) -> Result<Option<Invoice>, StoreError>;
    async fn delete_invoice(&self, owner_id: i64, id: i64) -> Result<bool, StoreError>;
}
