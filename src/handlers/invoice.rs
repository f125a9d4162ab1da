use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{info, instrument};

use crate::dtos::invoice::{
    CreateInvoiceRequest, InvoiceLineRequest, InvoiceListItem, InvoiceQuery, InvoiceResponse,
    UpdateInvoiceRequest, UpdateStatusRequest,
};
use crate::error::AppError;
use crate::middleware::auth::AuthContext;
use crate::models::amount;
use crate::models::invoice::{Invoice, InvoiceItem, NewInvoice};
use crate::state::AppState;

const DEFAULT_UNIT: &str = "unit";

fn require_draft(invoice: &Invoice) -> Result<(), AppError> {
    if !invoice.is_draft() {
        return Err(AppError::conflict(format!(
            "Invoice {} is {} and can no longer be changed",
            invoice.number, invoice.status
        )));
    }
    Ok(())
}

fn validate_dates(issue_date: DateTime<Utc>, due_date: Option<DateTime<Utc>>) -> Result<(), AppError> {
    if due_date.is_some_and(|due| due < issue_date) {
        return Err(AppError::validation("Due date cannot be before the issue date"));
    }
    Ok(())
}

/// Turns a requested line into an invoice item. Catalog lines copy the
/// product; nothing is written until the whole request is valid.
async fn build_line(state: &AppState, owner_id: i64, line: InvoiceLineRequest) -> Result<InvoiceItem, AppError> {
    amount::QUANTITY.check(line.quantity)?;

    let vat_rate = line.vat_rate.unwrap_or(state.config.default_vat_rate);
    if vat_rate < Decimal::ZERO || vat_rate > Decimal::ONE_HUNDRED {
        return Err(AppError::validation("VAT rate must be between 0 and 100"));
    }
    amount::VAT_RATE.check(vat_rate)?;

    if let Some(unit_price) = line.unit_price {
        amount::UNIT_PRICE.check(unit_price)?;
    }

    let Some(product_id) = line.product_id else {
        let description = line
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty())
            .ok_or_else(|| AppError::validation("Description required for custom lines"))?;
        let unit_price = line
            .unit_price
            .ok_or_else(|| AppError::validation("Unit price required for custom lines"))?;

        return Ok(InvoiceItem {
            product_id: None,
            description,
            quantity: line.quantity,
            unit: line.unit.unwrap_or_else(|| DEFAULT_UNIT.to_string()),
            unit_price,
            vat_rate,
        });
    };

    let product = state
        .store
        .get_product(owner_id, product_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("Product {product_id} not found")))?;

    if !product.is_active {
        return Err(AppError::validation(format!("Product '{}' is inactive", product.name)));
    }

    let mut item = InvoiceItem::from_product(&product, line.quantity, vat_rate);
    if let Some(unit_price) = line.unit_price {
        item.unit_price = unit_price;
    }
    Ok(item)
}

/// Stamps `last_used_at` on the catalog products of lines that were just
/// stored.
async fn mark_used(state: &AppState, owner_id: i64, items: &[InvoiceItem], now: DateTime<Utc>) -> Result<(), AppError> {
    let mut product_ids: Vec<i64> = items.iter().filter_map(|item| item.product_id).collect();
    product_ids.sort_unstable();
    product_ids.dedup();

    for product_id in product_ids {
        state.store.mark_product_used(owner_id, product_id, now).await?;
    }
    Ok(())
}

async fn load_invoice(state: &AppState, owner_id: i64, id: i64) -> Result<Invoice, AppError> {
    state
        .store
        .get_invoice(owner_id, id)
        .await?
        .ok_or_else(|| AppError::not_found("Invoice not found"))
}

async fn save(state: &AppState, invoice: &Invoice, now: DateTime<Utc>) -> Result<Json<InvoiceResponse>, AppError> {
    let saved = state
        .store
        .save_invoice(invoice)
        .await?
        .ok_or_else(|| AppError::not_found("Invoice not found"))?;

    Ok(Json(InvoiceResponse::new(saved, now)))
}

// GET /invoices - Invoice history
#[instrument(skip(state, auth), fields(owner = auth.user_id))]
pub async fn list_invoices(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<InvoiceQuery>,
) -> Result<Json<Vec<InvoiceListItem>>, AppError> {
    let now = Utc::now();
    let needle = query
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase);

    let invoices = state.store.load_invoices(auth.user_id).await?;

    Ok(Json(
        invoices
            .iter()
            .filter(|i| query.status.map_or(true, |st| i.effective_status(now) == st))
            .filter(|i| match &needle {
                Some(n) => i.number.to_lowercase().contains(n) || i.client_name.to_lowercase().contains(n),
                None => true,
            })
            .map(|i| InvoiceListItem::new(i, now))
            .collect(),
    ))
}

// GET /invoices/:id
pub async fn get_invoice(
    Path(id): Path<i64>,
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<InvoiceResponse>, AppError> {
    let invoice = load_invoice(&state, auth.user_id, id).await?;
    Ok(Json(InvoiceResponse::new(invoice, Utc::now())))
}

// POST /invoices - Create a draft
#[instrument(skip(state, auth, req), fields(owner = auth.user_id, items = req.items.len()))]
pub async fn create_invoice(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<CreateInvoiceRequest>,
) -> Result<(StatusCode, Json<InvoiceResponse>), AppError> {
    if req.client_name.trim().is_empty() {
        return Err(AppError::validation("Client name required"));
    }

    let now = Utc::now();
    let issue_date = req.issue_date.unwrap_or(now);
    validate_dates(issue_date, req.due_date)?;

    let mut items = Vec::with_capacity(req.items.len());
    for line in req.items {
        items.push(build_line(&state, auth.user_id, line).await?);
    }

    let invoice = state
        .store
        .insert_invoice(auth.user_id, NewInvoice {
            client_name: req.client_name.trim().to_string(),
            client_email: req.client_email,
            notes: req.notes,
            issue_date,
            due_date: req.due_date,
            items,
        })
        .await?;
    mark_used(&state, auth.user_id, &invoice.items, now).await?;

    info!(invoice_id = invoice.id, number = %invoice.number, "Draft invoice created");
    Ok((StatusCode::CREATED, Json(InvoiceResponse::new(invoice, now))))
}

// PUT /invoices/:id - Edit the header of a draft
pub async fn update_invoice(
    Path(id): Path<i64>,
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<UpdateInvoiceRequest>,
) -> Result<Json<InvoiceResponse>, AppError> {
    let mut invoice = load_invoice(&state, auth.user_id, id).await?;
    require_draft(&invoice)?;

    if let Some(client_name) = req.client_name {
        if client_name.trim().is_empty() {
            return Err(AppError::validation("Client name required"));
        }
        invoice.client_name = client_name.trim().to_string();
    }
    if req.client_email.is_some() {
        invoice.client_email = req.client_email;
    }
    if req.notes.is_some() {
        invoice.notes = req.notes;
    }
    if let Some(issue_date) = req.issue_date {
        invoice.issue_date = issue_date;
    }
    if req.due_date.is_some() {
        invoice.due_date = req.due_date;
    }
    validate_dates(invoice.issue_date, invoice.due_date)?;

    let now = Utc::now();
    invoice.updated_at = now;
    save(&state, &invoice, now).await
}

// POST /invoices/:id/items - Add a line to a draft
#[instrument(skip(state, auth, line), fields(owner = auth.user_id))]
pub async fn add_item(
    Path(id): Path<i64>,
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(line): Json<InvoiceLineRequest>,
) -> Result<Json<InvoiceResponse>, AppError> {
    let mut invoice = load_invoice(&state, auth.user_id, id).await?;
    require_draft(&invoice)?;

    let now = Utc::now();
    let item = build_line(&state, auth.user_id, line).await?;
    invoice.items.push(item.clone());
    invoice.updated_at = now;

    let saved = save(&state, &invoice, now).await?;
    mark_used(&state, auth.user_id, std::slice::from_ref(&item), now).await?;
    Ok(saved)
}

// DELETE /invoices/:id/items/:index - Remove a line from a draft
pub async fn remove_item(
    Path((id, index)): Path<(i64, usize)>,
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<Json<InvoiceResponse>, AppError> {
    let mut invoice = load_invoice(&state, auth.user_id, id).await?;
    require_draft(&invoice)?;

    if index >= invoice.items.len() {
        return Err(AppError::not_found(format!("Invoice has no item at position {index}")));
    }
    invoice.items.remove(index);

    let now = Utc::now();
    invoice.updated_at = now;
    save(&state, &invoice, now).await
}

// PATCH /invoices/:id/status
#[instrument(skip(state, auth, req), fields(owner = auth.user_id, to = %req.status))]
pub async fn update_status(
    Path(id): Path<i64>,
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<InvoiceResponse>, AppError> {
    let mut invoice = load_invoice(&state, auth.user_id, id).await?;

    if invoice.is_draft() && invoice.items.is_empty() {
        return Err(AppError::validation("Invoice must contain at least one item"));
    }

    let now = Utc::now();
    invoice.transition(req.status, now)?;

    info!(invoice_id = id, status = %invoice.status, "Invoice status changed");
    save(&state, &invoice, now).await
}

// DELETE /invoices/:id - Only drafts can be deleted
pub async fn delete_invoice(
    Path(id): Path<i64>,
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> Result<StatusCode, AppError> {
    let invoice = load_invoice(&state, auth.user_id, id).await?;
    require_draft(&invoice)?;

    if !state.store.delete_invoice(auth.user_id, id).await? {
        return Err(AppError::not_found("Invoice not found"));
    }

    Ok(StatusCode::NO_CONTENT)
}
