use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::invoice::{Invoice, InvoiceItem, InvoiceStatus};

#[derive(Debug, Deserialize)]
pub struct CreateInvoiceRequest {
    pub client_name: String,
    pub client_email: Option<String>,
    pub notes: Option<String>,
    pub issue_date: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub items: Vec<InvoiceLineRequest>,
}

/// A line either taken from the catalog (`product_id`) or typed in freely.
#[derive(Debug, Deserialize)]
pub struct InvoiceLineRequest {
    pub product_id: Option<i64>,
    pub quantity: Decimal,
    pub vat_rate: Option<Decimal>,
    pub description: Option<String>,
    pub unit: Option<String>,
    pub unit_price: Option<Decimal>, // Optional for catalog lines - uses the product price if not provided
}

#[derive(Debug, Deserialize)]
pub struct UpdateInvoiceRequest {
    pub client_name: Option<String>,
    pub client_email: Option<String>,
    pub notes: Option<String>,
    pub issue_date: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: InvoiceStatus,
}

/// Query string of `GET /invoices`.
#[derive(Debug, Default, Deserialize)]
pub struct InvoiceQuery {
    pub status: Option<InvoiceStatus>,
    pub search: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct InvoiceItemResponse {
    pub position: usize,
    pub product_id: Option<i64>,
    pub description: String,
    pub quantity: Decimal,
    pub unit: String,
    pub unit_price: Decimal,
    pub vat_rate: Decimal,
    pub subtotal: Decimal,
    pub vat_amount: Decimal,
    pub total: Decimal,
}

impl InvoiceItemResponse {
    fn new(position: usize, item: InvoiceItem) -> Self {
        Self {
            position,
            subtotal: item.subtotal().round_dp(2),
            vat_amount: item.vat_amount().round_dp(2),
            total: item.total().round_dp(2),
            product_id: item.product_id,
            description: item.description,
            quantity: item.quantity,
            unit: item.unit,
            unit_price: item.unit_price,
            vat_rate: item.vat_rate,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InvoiceResponse {
    pub id: i64,
    pub number: String,
    pub client_name: String,
    pub client_email: Option<String>,
    pub notes: Option<String>,
    pub status: InvoiceStatus,
    pub effective_status: InvoiceStatus,
    pub items: Vec<InvoiceItemResponse>,
    pub subtotal: Decimal,
    pub vat_total: Decimal,
    pub total: Decimal,
    pub issue_date: DateTime<Utc>,
    pub due_date: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InvoiceResponse {
    pub fn new(invoice: Invoice, now: DateTime<Utc>) -> Self {
        let effective_status = invoice.effective_status(now);
        let (subtotal, vat_total, total) = (invoice.subtotal(), invoice.vat_total(), invoice.total());
        Self {
            id: invoice.id,
            number: invoice.number,
            client_name: invoice.client_name,
            client_email: invoice.client_email,
            notes: invoice.notes,
            status: invoice.status,
            effective_status,
            items: invoice
                .items
                .into_iter()
                .enumerate()
                .map(|(position, item)| InvoiceItemResponse::new(position, item))
                .collect(),
            subtotal,
            vat_total,
            total,
            issue_date: invoice.issue_date,
            due_date: invoice.due_date,
            sent_at: invoice.sent_at,
            paid_at: invoice.paid_at,
            created_at: invoice.created_at,
            updated_at: invoice.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InvoiceListItem {
    pub id: i64,
    pub number: String,
    pub client_name: String,
    pub status: InvoiceStatus,
    pub effective_status: InvoiceStatus,
    pub total: Decimal,
    pub item_count: usize,
    pub issue_date: DateTime<Utc>,
    pub due_date: Option<DateTime<Utc>>,
}

impl InvoiceListItem {
    pub fn new(invoice: &Invoice, now: DateTime<Utc>) -> Self {
        Self {
            id: invoice.id,
            number: invoice.number.clone(),
            client_name: invoice.client_name.clone(),
            status: invoice.status,
            effective_status: invoice.effective_status(now),
            total: invoice.total(),
            item_count: invoice.items.len(),
            issue_date: invoice.issue_date,
            due_date: invoice.due_date,
        }
    }
}
