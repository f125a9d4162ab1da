use axum::{
    extract::{Extension, Query, State},
    http::header,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use tracing::{debug, instrument};

use crate::dtos::dashboard::DashboardQuery;
use crate::error::AppError;
use crate::middleware::auth::AuthContext;
use crate::services::dashboard::{self, DashboardData, TimeFrame};
use crate::state::AppState;

async fn snapshot(state: &AppState, owner_id: i64, time_frame: TimeFrame) -> Result<DashboardData, AppError> {
    let (invoices, products) = tokio::try_join!(
        state.store.load_invoices(owner_id),
        state.store.load_products(owner_id),
    )?;

    debug!(invoices = invoices.len(), products = products.len(), "Computing dashboard");
    Ok(dashboard::compute(&invoices, &products, time_frame, Utc::now()))
}

// GET /dashboard?time_frame=
#[instrument(skip(state, auth), fields(owner = auth.user_id))]
pub async fn get_dashboard(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<DashboardQuery>,
) -> Result<Json<DashboardData>, AppError> {
    let data = snapshot(&state, auth.user_id, query.time_frame.unwrap_or_default()).await?;
    Ok(Json(data))
}

// GET /dashboard/export?time_frame= - CSV report
#[instrument(skip(state, auth), fields(owner = auth.user_id))]
pub async fn export_dashboard(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    Query(query): Query<DashboardQuery>,
) -> Result<impl IntoResponse, AppError> {
    let time_frame = query.time_frame.unwrap_or_default();
    let data = snapshot(&state, auth.user_id, time_frame).await?;
    let filename = format!("attachment; filename=\"dashboard-{}.csv\"", time_frame.as_str());

    let mut body = Vec::new();
    let lines = dashboard::export_csv(&data, &mut body);
    debug!(lines, "Report rendered");

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, filename),
        ],
        body,
    ))
}
