use serde::Deserialize;

use crate::services::dashboard::TimeFrame;

#[derive(Debug, Default, Deserialize)]
pub struct DashboardQuery {
    pub time_frame: Option<TimeFrame>,
}
