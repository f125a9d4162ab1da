use std::collections::HashMap;
use std::io::Write;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::models::invoice::{Invoice, InvoiceStatus};
use crate::models::product::Product;

const ACTIVITY_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeFrame {
    Day,
    Week,
    #[default]
    Month,
    Year,
}

impl TimeFrame {
    pub fn bucket_width(&self) -> Duration {
        match self {
            TimeFrame::Day => Duration::hours(1),
            TimeFrame::Week | TimeFrame::Month => Duration::days(1),
            TimeFrame::Year => Duration::days(7),
        }
    }

    pub fn bucket_count(&self) -> i32 {
        match self {
            TimeFrame::Day => 24,
            TimeFrame::Week => 7,
            TimeFrame::Month => 30,
            TimeFrame::Year => 52,
        }
    }

    pub fn span(&self) -> Duration {
        self.bucket_width() * self.bucket_count()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeFrame::Day => "day",
            TimeFrame::Week => "week",
            TimeFrame::Month => "month",
            TimeFrame::Year => "year",
        }
    }
}

/// Half-open `[start, end)` interval of issue dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Window {
    pub fn current(time_frame: TimeFrame, now: DateTime<Utc>) -> Self {
        Self { start: now - time_frame.span(), end: now }
    }

    /// The window of equal length right before this one.
    pub fn previous(&self) -> Self {
        let len = self.end - self.start;
        Self { start: self.start - len, end: self.start }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at < self.end
    }
}

/// `(current - previous) / previous * 100`, or `None` when there is nothing
/// to compare against (or the ratio does not fit a `Decimal`).
pub fn percent_change(current: Decimal, previous: Decimal) -> Option<f64> {
    if previous.is_zero() {
        return None;
    }
    current
        .checked_sub(previous)
        .and_then(|diff| diff.checked_div(previous))
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))?
        .round_dp(2)
        .to_f64()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricDelta<T> {
    pub current: T,
    pub previous: T,
    pub change_percent: Option<f64>,
}

impl MetricDelta<Decimal> {
    fn amounts(current: Decimal, previous: Decimal) -> Self {
        Self { current, previous, change_percent: percent_change(current, previous) }
    }
}

impl MetricDelta<i64> {
    fn counts(current: i64, previous: i64) -> Self {
        Self {
            current,
            previous,
            change_percent: percent_change(Decimal::from(current), Decimal::from(previous)),
        }
    }
}

impl MetricDelta<Option<Decimal>> {
    fn averages(current: Option<Decimal>, previous: Option<Decimal>) -> Self {
        Self {
            current,
            previous,
            change_percent: percent_change(
                current.unwrap_or(Decimal::ZERO),
                previous.unwrap_or(Decimal::ZERO),
            ),
        }
    }
}

/// Sums for one window. Every invoice lands in exactly one of the
/// draft/outstanding/overdue/paid buckets by its effective status.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PeriodTotals {
    pub revenue: Decimal,
    pub outstanding: Decimal,
    pub overdue: Decimal,
    pub active_invoices: i64,
    pub overdue_invoices: i64,
    pub drafts: i64,
    pub billed_invoices: i64,
    pub billed_total: Decimal,
}

impl PeriodTotals {
    pub fn average_invoice_value(&self) -> Option<Decimal> {
        if self.billed_invoices == 0 {
            None
        } else {
            Some((self.billed_total / Decimal::from(self.billed_invoices)).round_dp(2))
        }
    }
}

pub fn period_totals(invoices: &[Invoice], window: Window, now: DateTime<Utc>) -> PeriodTotals {
    let mut totals = PeriodTotals::default();

    for invoice in invoices.iter().filter(|i| window.contains(i.issue_date)) {
        let amount = invoice.total();
        match invoice.effective_status(now) {
            InvoiceStatus::Draft => {
                totals.drafts += 1;
                continue;
            }
            InvoiceStatus::Sent => {
                totals.outstanding = totals.outstanding.saturating_add(amount);
                totals.active_invoices += 1;
            }
            InvoiceStatus::Overdue => {
                totals.overdue = totals.overdue.saturating_add(amount);
                totals.active_invoices += 1;
                totals.overdue_invoices += 1;
            }
            InvoiceStatus::Paid => totals.revenue = totals.revenue.saturating_add(amount),
        }
        totals.billed_invoices += 1;
        totals.billed_total = totals.billed_total.saturating_add(amount);
    }

    totals
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardMetrics {
    pub total_revenue: MetricDelta<Decimal>,
    pub active_invoices: MetricDelta<i64>,
    pub outstanding_amount: MetricDelta<Decimal>,
    pub overdue_amount: MetricDelta<Decimal>,
    pub average_invoice_value: MetricDelta<Option<Decimal>>,
}

impl DashboardMetrics {
    fn compare(current: &PeriodTotals, previous: &PeriodTotals) -> Self {
        Self {
            total_revenue: MetricDelta::amounts(current.revenue, previous.revenue),
            active_invoices: MetricDelta::counts(current.active_invoices, previous.active_invoices),
            outstanding_amount: MetricDelta::amounts(current.outstanding, previous.outstanding),
            overdue_amount: MetricDelta::amounts(current.overdue, previous.overdue),
            average_invoice_value: MetricDelta::averages(
                current.average_invoice_value(),
                previous.average_invoice_value(),
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    pub bucket_start: DateTime<Utc>,
    pub invoice_count: i64,
    pub invoiced: Decimal,
    pub revenue: Decimal,
}

/// One point per bucket of the current window, oldest first. Drafts are not
/// billed and are left out.
pub fn time_series(invoices: &[Invoice], time_frame: TimeFrame, now: DateTime<Utc>) -> Vec<SeriesPoint> {
    let window = Window::current(time_frame, now);
    let width = time_frame.bucket_width();

    let mut points: Vec<SeriesPoint> = (0..time_frame.bucket_count())
        .map(|i| SeriesPoint {
            bucket_start: window.start + width * i,
            invoice_count: 0,
            invoiced: Decimal::ZERO,
            revenue: Decimal::ZERO,
        })
        .collect();

    for invoice in invoices.iter().filter(|i| window.contains(i.issue_date)) {
        let status = invoice.effective_status(now);
        if status == InvoiceStatus::Draft {
            continue;
        }
        let offset = (invoice.issue_date - window.start).num_seconds() / width.num_seconds();
        let Some(point) = usize::try_from(offset).ok().and_then(|idx| points.get_mut(idx)) else {
            continue;
        };
        let amount = invoice.total();
        point.invoice_count += 1;
        point.invoiced = point.invoiced.saturating_add(amount);
        if status == InvoiceStatus::Paid {
            point.revenue = point.revenue.saturating_add(amount);
        }
    }

    points
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Created,
    Sent,
    Paid,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityEntry {
    pub invoice_id: i64,
    pub invoice_number: String,
    pub client_name: String,
    pub kind: ActivityKind,
    pub amount: Decimal,
    pub at: DateTime<Utc>,
}

/// Most recent invoice events, newest first.
pub fn recent_activity(invoices: &[Invoice], limit: usize) -> Vec<ActivityEntry> {
    let mut entries: Vec<ActivityEntry> = invoices
        .iter()
        .flat_map(|invoice| {
            [
                Some((ActivityKind::Created, invoice.created_at)),
                invoice.sent_at.map(|at| (ActivityKind::Sent, at)),
                invoice.paid_at.map(|at| (ActivityKind::Paid, at)),
            ]
            .into_iter()
            .flatten()
            .map(move |(kind, at)| ActivityEntry {
                invoice_id: invoice.id,
                invoice_number: invoice.number.clone(),
                client_name: invoice.client_name.clone(),
                kind,
                amount: invoice.total(),
                at,
            })
        })
        .collect();

    entries.sort_by(|a, b| b.at.cmp(&a.at).then(b.invoice_id.cmp(&a.invoice_id)));
    entries.truncate(limit);
    entries
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InsightKind {
    Overdue,
    RevenueTrend,
    UnsentDrafts,
    TopProduct,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Insight {
    pub kind: InsightKind,
    pub message: String,
}

fn insights(
    current: &PeriodTotals,
    metrics: &DashboardMetrics,
    invoices: &[Invoice],
    products: &[Product],
    window: Window,
    time_frame: TimeFrame,
) -> Vec<Insight> {
    let mut out = Vec::new();

    if current.overdue_invoices > 0 {
        out.push(Insight {
            kind: InsightKind::Overdue,
            message: format!(
                "{} overdue invoice(s) totaling {}",
                current.overdue_invoices,
                current.overdue.round_dp(2)
            ),
        });
    }

    if let Some(change) = metrics.total_revenue.change_percent {
        let direction = if change >= 0.0 { "up" } else { "down" };
        out.push(Insight {
            kind: InsightKind::RevenueTrend,
            message: format!(
                "Revenue {direction} {:.1}% compared to the previous {}",
                change.abs(),
                time_frame.as_str()
            ),
        });
    }

    if current.drafts > 0 {
        out.push(Insight {
            kind: InsightKind::UnsentDrafts,
            message: format!("{} draft invoice(s) not sent yet", current.drafts),
        });
    }

    if let Some((product, count)) = top_product(invoices, products, window) {
        out.push(Insight {
            kind: InsightKind::TopProduct,
            message: format!("{} appears on {count} invoice(s) this {}", product.name, time_frame.as_str()),
        });
    }

    out
}

/// Catalog product billed on the most invoices in the window; ties go to the
/// lower id.
fn top_product<'a>(invoices: &[Invoice], products: &'a [Product], window: Window) -> Option<(&'a Product, usize)> {
    let mut usage: HashMap<i64, usize> = HashMap::new();

    for invoice in invoices.iter().filter(|i| !i.is_draft() && window.contains(i.issue_date)) {
        let mut seen: Vec<i64> = invoice.items.iter().filter_map(|item| item.product_id).collect();
        seen.sort_unstable();
        seen.dedup();
        for id in seen {
            *usage.entry(id).or_default() += 1;
        }
    }

    usage
        .into_iter()
        .filter_map(|(id, count)| products.iter().find(|p| p.id == id).map(|p| (p, count)))
        .max_by(|(pa, ca), (pb, cb)| ca.cmp(cb).then(pb.id.cmp(&pa.id)))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductStats {
    pub total: usize,
    pub active: usize,
    pub inactive: usize,
}

impl ProductStats {
    fn from_products(products: &[Product]) -> Self {
        let active = products.iter().filter(|p| p.is_active).count();
        Self { total: products.len(), active, inactive: products.len() - active }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardData {
    pub time_frame: TimeFrame,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub generated_at: DateTime<Utc>,
    pub metrics: DashboardMetrics,
    pub series: Vec<SeriesPoint>,
    pub activity: Vec<ActivityEntry>,
    pub insights: Vec<Insight>,
    pub products: ProductStats,
}

/// Recomputes the whole aggregate from a snapshot of the owner's data.
pub fn compute(invoices: &[Invoice], products: &[Product], time_frame: TimeFrame, now: DateTime<Utc>) -> DashboardData {
    let window = Window::current(time_frame, now);
    let current = period_totals(invoices, window, now);
    let previous = period_totals(invoices, window.previous(), now);
    let metrics = DashboardMetrics::compare(&current, &previous);
    let insights = insights(&current, &metrics, invoices, products, window, time_frame);

    DashboardData {
        time_frame,
        period_start: window.start,
        period_end: window.end,
        generated_at: now,
        series: time_series(invoices, time_frame, now),
        activity: recent_activity(invoices, ACTIVITY_LIMIT),
        insights,
        products: ProductStats::from_products(products),
        metrics,
    }
}

fn change_cell(change: Option<f64>) -> String {
    change.map(|c| format!("{c:.2}")).unwrap_or_default()
}

fn metric_row<T: std::fmt::Display>(name: &str, delta: &MetricDelta<T>) -> String {
    format!("{name},{},{},{}", delta.current, delta.previous, change_cell(delta.change_percent))
}

fn optional_cell(value: Option<Decimal>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Writes the metrics followed by the time series as CSV. A line the sink
/// rejects is logged and skipped; returns the number of lines written.
pub fn export_csv<W: Write>(data: &DashboardData, out: &mut W) -> usize {
    let m = &data.metrics;
    let average = &m.average_invoice_value;

    let mut lines = vec![
        "metric,current,previous,change_percent".to_string(),
        metric_row("total_revenue", &m.total_revenue),
        metric_row("active_invoices", &m.active_invoices),
        metric_row("outstanding_amount", &m.outstanding_amount),
        metric_row("overdue_amount", &m.overdue_amount),
        format!(
            "average_invoice_value,{},{},{}",
            optional_cell(average.current),
            optional_cell(average.previous),
            change_cell(average.change_percent)
        ),
        String::new(),
        "bucket_start,invoice_count,invoiced,revenue".to_string(),
    ];
    lines.extend(data.series.iter().map(|p| {
        format!("{},{},{},{}", p.bucket_start.to_rfc3339(), p.invoice_count, p.invoiced, p.revenue)
    }));

    let mut written = 0;
    for (index, line) in lines.iter().enumerate() {
        match writeln!(out, "{line}") {
            Ok(()) => written += 1,
            Err(e) => warn!(error = %e, line = index, time_frame = data.time_frame.as_str(), "Skipping report line"),
        }
    }
    written
}
