//! In-memory store used when no database is configured, and by tests.
//!
//! Uses DashMap for concurrent access; ids come from per-collection atomic
//! counters so they keep insertion order.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::{ProductRemoval, Store, StoreError};
use crate::models::invoice::{invoice_number, Invoice, InvoiceStatus, NewInvoice};
use crate::models::product::{NewProduct, Product, ProductChanges};
use crate::models::user::{NewUser, User};

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    users: DashMap<i64, User>,
    emails: DashMap<String, i64>,
    products: DashMap<i64, Product>,
    invoices: DashMap<i64, Invoice>,
    invoice_sequences: DashMap<i64, i64>,
    next_user_id: AtomicI64,
    next_product_id: AtomicI64,
    next_invoice_id: AtomicI64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn next_id(counter: &AtomicI64) -> i64 {
    counter.fetch_add(1, Ordering::SeqCst) + 1
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        let key = user.email.to_lowercase();
        match self.inner.emails.entry(key) {
            Entry::Occupied(_) => Err(StoreError::Conflict("Email already registered".to_string())),
            Entry::Vacant(slot) => {
                let record = User {
                    id: next_id(&self.inner.next_user_id),
                    email: user.email,
                    password_hash: user.password_hash,
                    business_name: user.business_name,
                    is_active: true,
                    created_at: Utc::now(),
                };
                slot.insert(record.id);
                self.inner.users.insert(record.id, record.clone());
                Ok(record)
            }
        }
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let id = self.inner.emails.get(&email.to_lowercase()).map(|id| *id);
        Ok(id.and_then(|id| self.inner.users.get(&id).map(|u| u.clone())))
    }

    async fn find_user(&self, id: i64) -> Result<Option<User>, StoreError> {
        Ok(self.inner.users.get(&id).map(|u| u.clone()))
    }

    async fn load_products(&self, owner_id: i64) -> Result<Vec<Product>, StoreError> {
        let mut products: Vec<Product> = self
            .inner
            .products
            .iter()
            .filter(|p| p.owner_id == owner_id)
            .map(|p| p.clone())
            .collect();
        products.sort_by(|a, b| {
            a.name
                .to_lowercase()
                .cmp(&b.name.to_lowercase())
                .then(a.id.cmp(&b.id))
        });
        Ok(products)
    }

    async fn get_product(&self, owner_id: i64, id: i64) -> Result<Option<Product>, StoreError> {
        Ok(self
            .inner
            .products
            .get(&id)
            .filter(|p| p.owner_id == owner_id)
            .map(|p| p.clone()))
    }

    async fn insert_product(&self, owner_id: i64, product: NewProduct) -> Result<Product, StoreError> {
        let now = Utc::now();
        let record = Product {
            id: next_id(&self.inner.next_product_id),
            owner_id,
            name: product.name,
            description: product.description,
            unit_price: product.unit_price,
            unit: product.unit,
            category: product.category,
            is_active: true,
            last_used_at: None,
            created_at: now,
            updated_at: now,
        };
        self.inner.products.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_product(
        &self,
        owner_id: i64,
        id: i64,
        changes: ProductChanges,
    ) -> Result<Option<Product>, StoreError> {
        let Some(mut product) = self.inner.products.get_mut(&id).filter(|p| p.owner_id == owner_id) else {
            return Ok(None);
        };
        changes.apply(&mut product);
        product.updated_at = Utc::now();
        Ok(Some(product.clone()))
    }

    async fn mark_product_used(&self, owner_id: i64, id: i64, at: DateTime<Utc>) -> Result<Option<Product>, StoreError> {
        let Some(mut product) = self.inner.products.get_mut(&id).filter(|p| p.owner_id == owner_id) else {
            return Ok(None);
        };
        product.last_used_at = Some(at);
        product.updated_at = at;
        Ok(Some(product.clone()))
    }

    async fn remove_product(&self, owner_id: i64, id: i64) -> Result<Option<ProductRemoval>, StoreError> {
        // The product entry stays locked while the invoices are scanned.
        let Entry::Occupied(mut entry) = self.inner.products.entry(id) else {
            return Ok(None);
        };
        if entry.get().owner_id != owner_id {
            return Ok(None);
        }

        let in_use = self.inner.invoices.iter().any(|invoice| {
            invoice.owner_id == owner_id && invoice.items.iter().any(|item| item.product_id == Some(id))
        });
        if !in_use {
            entry.remove();
            return Ok(Some(ProductRemoval::Deleted));
        }

        let product = entry.get_mut();
        product.is_active = false;
        product.updated_at = Utc::now();
        Ok(Some(ProductRemoval::Deactivated))
    }

    async fn load_invoices(&self, owner_id: i64) -> Result<Vec<Invoice>, StoreError> {
        let mut invoices: Vec<Invoice> = self
            .inner
            .invoices
            .iter()
            .filter(|i| i.owner_id == owner_id)
            .map(|i| i.clone())
            .collect();
        invoices.sort_by(|a, b| b.issue_date.cmp(&a.issue_date).then(b.id.cmp(&a.id)));
        Ok(invoices)
    }

    async fn get_invoice(&self, owner_id: i64, id: i64) -> Result<Option<Invoice>, StoreError> {
        Ok(self
            .inner
            .invoices
            .get(&id)
            .filter(|i| i.owner_id == owner_id)
            .map(|i| i.clone()))
    }

    async fn insert_invoice(&self, owner_id: i64, invoice: NewInvoice) -> Result<Invoice, StoreError> {
        let sequence = {
            let mut seq = self.inner.invoice_sequences.entry(owner_id).or_insert(0);
            *seq += 1;
            *seq
        };
        let now = Utc::now();
        let record = Invoice {
            id: next_id(&self.inner.next_invoice_id),
            owner_id,
            number: invoice_number(sequence),
            client_name: invoice.client_name,
            client_email: invoice.client_email,
            notes: invoice.notes,
            status: InvoiceStatus::Draft,
            items: invoice.items,
            issue_date: invoice.issue_date,
            due_date: invoice.due_date,
            sent_at: None,
            paid_at: None,
            created_at: now,
            updated_at: now,
        };
        self.inner.invoices.insert(record.id, record.clone());
        Ok(record)
    }

    async fn save_invoice(&self, invoice: &Invoice) -> Result<Option<Invoice>, StoreError> {
        let Some(mut stored) = self
            .inner
            .invoices
            .get_mut(&invoice.id)
            .filter(|i| i.owner_id == invoice.owner_id)
        else {
            return Ok(None);
        };
        // id, owner, number and creation time are fixed once stored
        let (number, created_at) = (stored.number.clone(), stored.created_at);
        *stored = Invoice { number, created_at, ..invoice.clone() };
        Ok(Some(stored.clone()))
    }

    async fn delete_invoice(&self, owner_id: i64, id: i64) -> Result<bool, StoreError> {
        Ok(self
            .inner
            .invoices
            .remove_if(&id, |_, i| i.owner_id == owner_id)
            .is_some())
    }
}
