use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::product::Product;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Draft,
    Sent,
    Paid,
    Overdue,
}

impl InvoiceStatus {
    pub const ALL: [InvoiceStatus; 4] = [
        InvoiceStatus::Draft,
        InvoiceStatus::Sent,
        InvoiceStatus::Paid,
        InvoiceStatus::Overdue,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Draft => "draft",
            InvoiceStatus::Sent => "sent",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::Overdue => "overdue",
        }
    }

    pub fn can_transition_to(self, next: InvoiceStatus) -> bool {
        use InvoiceStatus::*;
        matches!(
            (self, next),
            (Draft, Sent) | (Sent, Paid) | (Sent, Overdue) | (Overdue, Paid)
        )
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InvoiceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        InvoiceStatus::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| format!("Unknown invoice status '{s}'"))
    }
}

#[derive(Debug, Error, PartialEq)]
#[error("Cannot change invoice status from {from} to {to}")]
pub struct InvalidTransition {
    pub from: InvoiceStatus,
    pub to: InvoiceStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceItem {
    pub product_id: Option<i64>,
    pub description: String,
    pub quantity: Decimal,
    pub unit: String,
    pub unit_price: Decimal,
    /// Percent, e.g. `19` for 19 %.
    pub vat_rate: Decimal,
}

impl InvoiceItem {
    /// Line built when a catalog product is added to a draft.
    pub fn from_product(product: &Product, quantity: Decimal, vat_rate: Decimal) -> Self {
        Self {
            product_id: Some(product.id),
            description: product.name.clone(),
            quantity,
            unit: product.unit.clone(),
            unit_price: product.unit_price,
            vat_rate,
        }
    }

    // Line math saturates at `Decimal::MAX` instead of panicking. Bounded
    // input (see `models::amount`) never gets close.
    pub fn subtotal(&self) -> Decimal {
        self.quantity.saturating_mul(self.unit_price)
    }

    pub fn vat_amount(&self) -> Decimal {
        self.subtotal().saturating_mul(self.vat_rate) / Decimal::ONE_HUNDRED
    }

    pub fn total(&self) -> Decimal {
        self.subtotal().saturating_add(self.vat_amount())
    }
}

/// Overflow-free sum of amounts.
pub fn sum_amounts(amounts: impl IntoIterator<Item = Decimal>) -> Decimal {
    amounts.into_iter().fold(Decimal::ZERO, Decimal::saturating_add)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Invoice {
    pub id: i64,
    pub owner_id: i64,
    pub number: String,
    pub client_name: String,
    pub client_email: Option<String>,
    pub notes: Option<String>,
    pub status: InvoiceStatus,
    pub items: Vec<InvoiceItem>,
    pub issue_date: DateTime<Utc>,
    pub due_date: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    pub fn subtotal(&self) -> Decimal {
        sum_amounts(self.items.iter().map(InvoiceItem::subtotal)).round_dp(2)
    }

    pub fn vat_total(&self) -> Decimal {
        sum_amounts(self.items.iter().map(InvoiceItem::vat_amount)).round_dp(2)
    }

    pub fn total(&self) -> Decimal {
        self.subtotal().saturating_add(self.vat_total())
    }

    /// A sent invoice past its due date counts as overdue even if nobody
    /// has moved it there yet.
    pub fn effective_status(&self, now: DateTime<Utc>) -> InvoiceStatus {
        match (self.status, self.due_date) {
            (InvoiceStatus::Sent, Some(due)) if due < now => InvoiceStatus::Overdue,
            (status, _) => status,
        }
    }

    pub fn is_draft(&self) -> bool {
        self.status == InvoiceStatus::Draft
    }

    pub fn transition(&mut self, next: InvoiceStatus, now: DateTime<Utc>) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(next) {
            return Err(InvalidTransition { from: self.status, to: next });
        }

        match next {
            InvoiceStatus::Sent => self.sent_at = Some(now),
            InvoiceStatus::Paid => self.paid_at = Some(now),
            InvoiceStatus::Draft | InvoiceStatus::Overdue => {}
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }
}

/// Header and initial lines of a draft. The store assigns id and number.
#[derive(Debug, Clone)]
pub struct NewInvoice {
    pub client_name: String,
    pub client_email: Option<String>,
    pub notes: Option<String>,
    pub issue_date: DateTime<Utc>,
    pub due_date: Option<DateTime<Utc>>,
    pub items: Vec<InvoiceItem>,
}

pub fn invoice_number(sequence: i64) -> String {
    format!("INV-{sequence:05}")
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal::Decimal;

    pub(crate) fn item(quantity: i64, unit_price: &str, vat_rate: i64) -> InvoiceItem {
        InvoiceItem {
            product_id: None,
            description: "Line".to_string(),
            quantity: Decimal::from(quantity),
            unit: "piece".to_string(),
            unit_price: unit_price.parse().unwrap(),
            vat_rate: Decimal::from(vat_rate),
        }
    }

    pub(crate) fn invoice(id: i64, status: InvoiceStatus, issue_date: DateTime<Utc>, items: Vec<InvoiceItem>) -> Invoice {
        Invoice {
            id,
            owner_id: 1,
            number: invoice_number(id),
            client_name: format!("Client {id}"),
            client_email: None,
            notes: None,
            status,
            items,
            issue_date,
            due_date: None,
            sent_at: None,
            paid_at: None,
            created_at: issue_date,
            updated_at: issue_date,
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 15, 12, 0, 0).unwrap()
    }

    #[test]
    fn totals_include_vat() {
        let inv = invoice(
            1,
            InvoiceStatus::Draft,
            now(),
            vec![item(2, "50.00", 20), item(3, "9.99", 0)],
        );

        assert_eq!(inv.subtotal(), "129.97".parse::<Decimal>().unwrap());
        assert_eq!(inv.vat_total(), "20.00".parse::<Decimal>().unwrap());
        assert_eq!(inv.total(), "149.97".parse::<Decimal>().unwrap());
    }

    #[test]
    fn oversized_lines_saturate_instead_of_overflowing() {
        let mut huge = item(1, "10", 20);
        huge.quantity = Decimal::MAX;
        let inv = invoice(1, InvoiceStatus::Sent, now(), vec![huge.clone(), huge]);

        assert_eq!(inv.items[0].subtotal(), Decimal::MAX);
        assert_eq!(inv.subtotal(), Decimal::MAX);
        assert_eq!(inv.total(), Decimal::MAX);
    }

    #[test]
    fn empty_invoice_totals_zero() {
        let inv = invoice(1, InvoiceStatus::Draft, now(), vec![]);
        assert_eq!(inv.total(), Decimal::ZERO);
    }

    #[test]
    fn sent_invoice_past_due_is_overdue() {
        let mut inv = invoice(1, InvoiceStatus::Sent, now() - Duration::days(40), vec![]);
        inv.due_date = Some(now() - Duration::days(10));
        assert_eq!(inv.effective_status(now()), InvoiceStatus::Overdue);

        inv.due_date = Some(now() + Duration::days(10));
        assert_eq!(inv.effective_status(now()), InvoiceStatus::Sent);

        inv.status = InvoiceStatus::Paid;
        inv.due_date = Some(now() - Duration::days(10));
        assert_eq!(inv.effective_status(now()), InvoiceStatus::Paid);
    }

    #[test]
    fn transitions_follow_lifecycle() {
        let mut inv = invoice(1, InvoiceStatus::Draft, now(), vec![]);

        assert!(inv.transition(InvoiceStatus::Paid, now()).is_err());
        inv.transition(InvoiceStatus::Sent, now()).unwrap();
        assert_eq!(inv.sent_at, Some(now()));

        inv.transition(InvoiceStatus::Overdue, now()).unwrap();
        inv.transition(InvoiceStatus::Paid, now()).unwrap();
        assert_eq!(inv.paid_at, Some(now()));

        let err = inv.transition(InvoiceStatus::Draft, now()).unwrap_err();
        assert_eq!(err, InvalidTransition { from: InvoiceStatus::Paid, to: InvoiceStatus::Draft });
    }

    #[test]
    fn item_from_product_copies_price_and_unit() {
        let product = Product {
            id: 7,
            owner_id: 1,
            name: "Consulting".to_string(),
            description: "Hourly consulting".to_string(),
            unit_price: "85.00".parse().unwrap(),
            unit: "hour".to_string(),
            category: crate::models::product::ProductCategory::Service,
            is_active: true,
            last_used_at: None,
            created_at: now(),
            updated_at: now(),
        };

        let line = InvoiceItem::from_product(&product, Decimal::from(4), Decimal::from(19));
        assert_eq!(line.product_id, Some(7));
        assert_eq!(line.description, "Consulting");
        assert_eq!(line.unit, "hour");
        assert_eq!(line.total(), "404.60".parse::<Decimal>().unwrap());
    }

    #[test]
    fn numbers_are_zero_padded() {
        assert_eq!(invoice_number(42), "INV-00042");
    }
}
