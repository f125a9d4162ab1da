use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{Error as SqlxError, FromRow, PgPool, Postgres, Transaction};
use tracing::{error, instrument};

use super::{ProductRemoval, Store, StoreError};
use crate::models::invoice::{invoice_number, Invoice, InvoiceItem, InvoiceStatus, NewInvoice};
use crate::models::product::{NewProduct, Product, ProductCategory, ProductChanges};
use crate::models::user::{NewUser, User};

const USER_COLUMNS: &str = "id, email, password_hash, business_name, is_active, created_at";

const PRODUCT_COLUMNS: &str = "id, owner_id, name, description, unit_price, unit, category,
                               is_active, last_used_at, created_at, updated_at";

const INVOICE_COLUMNS: &str = "id, owner_id, number, client_name, client_email, notes, status,
                               issue_date, due_date, sent_at, paid_at, created_at, updated_at";

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn map_unique_violation(err: SqlxError, message: &str) -> StoreError {
    match err {
        SqlxError::Database(db_err) if db_err.code().as_deref() == Some("23505") => {
            StoreError::Conflict(message.to_string())
        }
        other => other.into(),
    }
}

#[derive(FromRow)]
struct UserRow {
    id: i64,
    email: String,
    password_hash: String,
    business_name: String,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            email: row.email,
            password_hash: row.password_hash,
            business_name: row.business_name,
            is_active: row.is_active,
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
struct ProductRow {
    id: i64,
    owner_id: i64,
    name: String,
    description: String,
    unit_price: Decimal,
    unit: String,
    category: String,
    is_active: bool,
    last_used_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for Product {
    type Error = StoreError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        let category: ProductCategory = row.category.parse().map_err(StoreError::InvalidRow)?;
        Ok(Self {
            id: row.id,
            owner_id: row.owner_id,
            name: row.name,
            description: row.description,
            unit_price: row.unit_price,
            unit: row.unit,
            category,
            is_active: row.is_active,
            last_used_at: row.last_used_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct InvoiceRow {
    id: i64,
    owner_id: i64,
    number: String,
    client_name: String,
    client_email: Option<String>,
    notes: Option<String>,
    status: String,
    issue_date: DateTime<Utc>,
    due_date: Option<DateTime<Utc>>,
    sent_at: Option<DateTime<Utc>>,
    paid_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl InvoiceRow {
    fn into_invoice(self, items: Vec<InvoiceItem>) -> Result<Invoice, StoreError> {
        let status: InvoiceStatus = self.status.parse().map_err(StoreError::InvalidRow)?;
        Ok(Invoice {
            id: self.id,
            owner_id: self.owner_id,
            number: self.number,
            client_name: self.client_name,
            client_email: self.client_email,
            notes: self.notes,
            status,
            items,
            issue_date: self.issue_date,
            due_date: self.due_date,
            sent_at: self.sent_at,
            paid_at: self.paid_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(FromRow)]
struct InvoiceItemRow {
    invoice_id: i64,
    product_id: Option<i64>,
    description: String,
    quantity: Decimal,
    unit: String,
    unit_price: Decimal,
    vat_rate: Decimal,
}

impl From<InvoiceItemRow> for InvoiceItem {
    fn from(row: InvoiceItemRow) -> Self {
        Self {
            product_id: row.product_id,
            description: row.description,
            quantity: row.quantity,
            unit: row.unit,
            unit_price: row.unit_price,
            vat_rate: row.vat_rate,
        }
    }
}

impl PgStore {
    /// Loads items for the given invoices and attaches them in position order.
    async fn attach_items(&self, rows: Vec<InvoiceRow>) -> Result<Vec<Invoice>, StoreError> {
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        let item_rows = sqlx::query_as::<_, InvoiceItemRow>(
            "SELECT invoice_id, product_id, description, quantity, unit, unit_price, vat_rate
             FROM invoice_items WHERE invoice_id = ANY($1)
             ORDER BY invoice_id, position",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut by_invoice: HashMap<i64, Vec<InvoiceItem>> = HashMap::new();
        for row in item_rows {
            by_invoice.entry(row.invoice_id).or_default().push(row.into());
        }

        rows.into_iter()
            .map(|row| {
                let items = by_invoice.remove(&row.id).unwrap_or_default();
                row.into_invoice(items)
            })
            .collect()
    }

    async fn insert_items(
        tx: &mut Transaction<'_, Postgres>,
        invoice_id: i64,
        items: &[InvoiceItem],
    ) -> Result<(), StoreError> {
        for (position, item) in items.iter().enumerate() {
            sqlx::query(
                "INSERT INTO invoice_items
                 (invoice_id, position, product_id, description, quantity, unit, unit_price, vat_rate)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(invoice_id)
            .bind(position as i32)
            .bind(item.product_id)
            .bind(&item.description)
            .bind(item.quantity)
            .bind(&item.unit)
            .bind(item.unit_price)
            .bind(item.vat_rate)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    #[instrument(skip(self, user), fields(email = %user.email))]
    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "INSERT INTO users (email, password_hash, business_name)
             VALUES ($1, $2, $3) RETURNING {USER_COLUMNS}"
        ))
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.business_name)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, "Email already registered"))?;

        Ok(row.into())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE lower(email) = lower($1)"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(User::from))
    }

    async fn find_user(&self, id: i64) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(User::from))
    }

    #[instrument(skip(self))]
    async fn load_products(&self, owner_id: i64) -> Result<Vec<Product>, StoreError> {
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE owner_id = $1 ORDER BY lower(name), id"
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .inspect_err(|e| error!(?e, "Failed to load products"))?;

        rows.into_iter().map(Product::try_from).collect()
    }

    async fn get_product(&self, owner_id: i64, id: i64) -> Result<Option<Product>, StoreError> {
        sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE owner_id = $1 AND id = $2"
        ))
        .bind(owner_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(Product::try_from)
        .transpose()
    }

    async fn insert_product(&self, owner_id: i64, product: NewProduct) -> Result<Product, StoreError> {
        let row = sqlx::query_as::<_, ProductRow>(&format!(
            "INSERT INTO products (owner_id, name, description, unit_price, unit, category)
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(owner_id)
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.unit_price)
        .bind(&product.unit)
        .bind(product.category.as_str())
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn update_product(
        &self,
        owner_id: i64,
        id: i64,
        changes: ProductChanges,
    ) -> Result<Option<Product>, StoreError> {
        sqlx::query_as::<_, ProductRow>(&format!(
            "UPDATE products SET
             name = COALESCE($3, name),
             description = COALESCE($4, description),
             unit_price = COALESCE($5, unit_price),
             unit = COALESCE($6, unit),
             category = COALESCE($7, category),
             is_active = COALESCE($8, is_active),
             updated_at = NOW()
             WHERE owner_id = $1 AND id = $2 RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(owner_id)
        .bind(id)
        .bind(changes.name)
        .bind(changes.description)
        .bind(changes.unit_price)
        .bind(changes.unit)
        .bind(changes.category.map(|c| c.as_str()))
        .bind(changes.is_active)
        .fetch_optional(&self.pool)
        .await?
        .map(Product::try_from)
        .transpose()
    }

    async fn mark_product_used(&self, owner_id: i64, id: i64, at: DateTime<Utc>) -> Result<Option<Product>, StoreError> {
        sqlx::query_as::<_, ProductRow>(&format!(
            "UPDATE products SET last_used_at = $3, updated_at = $3
             WHERE owner_id = $1 AND id = $2 RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(owner_id)
        .bind(id)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?
        .map(Product::try_from)
        .transpose()
    }

    #[instrument(skip(self))]
    async fn remove_product(&self, owner_id: i64, id: i64) -> Result<Option<ProductRemoval>, StoreError> {
        let mut tx = self.pool.begin().await?;

        // row lock keeps the reference check and the delete together
        let exists = sqlx::query_scalar::<_, i64>(
            "SELECT id FROM products WHERE owner_id = $1 AND id = $2 FOR UPDATE",
        )
        .bind(owner_id)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .is_some();
        if !exists {
            return Ok(None);
        }

        let in_use = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(
                SELECT 1 FROM invoice_items ii
                JOIN invoices i ON i.id = ii.invoice_id
                WHERE i.owner_id = $1 AND ii.product_id = $2)",
        )
        .bind(owner_id)
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        let removal = if in_use {
            sqlx::query("UPDATE products SET is_active = FALSE, updated_at = NOW() WHERE id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            ProductRemoval::Deactivated
        } else {
            sqlx::query("DELETE FROM products WHERE id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await?;
            ProductRemoval::Deleted
        };

        tx.commit().await?;
        Ok(Some(removal))
    }

    #[instrument(skip(self))]
    async fn load_invoices(&self, owner_id: i64) -> Result<Vec<Invoice>, StoreError> {
        let rows = sqlx::query_as::<_, InvoiceRow>(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices WHERE owner_id = $1
             ORDER BY issue_date DESC, id DESC"
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .inspect_err(|e| error!(?e, "Failed to load invoices"))?;

        self.attach_items(rows).await
    }

    async fn get_invoice(&self, owner_id: i64, id: i64) -> Result<Option<Invoice>, StoreError> {
        let row = sqlx::query_as::<_, InvoiceRow>(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices WHERE owner_id = $1 AND id = $2"
        ))
        .bind(owner_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(self.attach_items(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    #[instrument(skip(self, invoice), fields(items = invoice.items.len()))]
    async fn insert_invoice(&self, owner_id: i64, invoice: NewInvoice) -> Result<Invoice, StoreError> {
        let mut tx = self.pool.begin().await?;

        let sequence = sqlx::query_scalar::<_, i64>(
            "INSERT INTO invoice_sequences (owner_id, last_value) VALUES ($1, 1)
             ON CONFLICT (owner_id) DO UPDATE SET last_value = invoice_sequences.last_value + 1
             RETURNING last_value",
        )
        .bind(owner_id)
        .fetch_one(&mut *tx)
        .await?;

        let row = sqlx::query_as::<_, InvoiceRow>(&format!(
            "INSERT INTO invoices (owner_id, number, client_name, client_email, notes, status, issue_date, due_date)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {INVOICE_COLUMNS}"
        ))
        .bind(owner_id)
        .bind(invoice_number(sequence))
        .bind(&invoice.client_name)
        .bind(&invoice.client_email)
        .bind(&invoice.notes)
        .bind(InvoiceStatus::Draft.as_str())
        .bind(invoice.issue_date)
        .bind(invoice.due_date)
        .fetch_one(&mut *tx)
        .await?;

        Self::insert_items(&mut tx, row.id, &invoice.items).await?;
        tx.commit().await?;

        // answer with what the NUMERIC columns actually hold
        self.get_invoice(owner_id, row.id)
            .await?
            .ok_or_else(|| StoreError::InvalidRow(format!("invoice {} missing after insert", row.id)))
    }

    #[instrument(skip(self, invoice), fields(id = invoice.id))]
    async fn save_invoice(&self, invoice: &Invoice) -> Result<Option<Invoice>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query_scalar::<_, i64>(
            "UPDATE invoices SET
             client_name = $3, client_email = $4, notes = $5, status = $6,
             issue_date = $7, due_date = $8, sent_at = $9, paid_at = $10, updated_at = $11
             WHERE owner_id = $1 AND id = $2 RETURNING id",
        )
        .bind(invoice.owner_id)
        .bind(invoice.id)
        .bind(&invoice.client_name)
        .bind(&invoice.client_email)
        .bind(&invoice.notes)
        .bind(invoice.status.as_str())
        .bind(invoice.issue_date)
        .bind(invoice.due_date)
        .bind(invoice.sent_at)
        .bind(invoice.paid_at)
        .bind(invoice.updated_at)
        .fetch_optional(&mut *tx)
        .await?;

        if updated.is_none() {
            tx.rollback().await?;
            return Ok(None);
        }

        sqlx::query("DELETE FROM invoice_items WHERE invoice_id = $1")
            .bind(invoice.id)
            .execute(&mut *tx)
            .await?;
        Self::insert_items(&mut tx, invoice.id, &invoice.items).await?;
        tx.commit().await?;

        self.get_invoice(invoice.owner_id, invoice.id).await
    }

    async fn delete_invoice(&self, owner_id: i64, id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM invoices WHERE owner_id = $1 AND id = $2")
            .bind(owner_id)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
