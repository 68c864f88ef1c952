use chrono::Utc;

use crate::error::Result;
use crate::router::{AppState, Request};
use crate::stats::DashboardStats;
use crate::views::{base_context, View};

pub const TEMPLATE: &str = "resourcehub/dashboard.html";

/// Home page with the four collection counters.
pub async fn home(_request: Request, state: AppState) -> Result<View> {
    let stats = DashboardStats::compute(&state.db, Utc::now()).await?;

    let mut context = base_context(&state, "dashboard")?;
    for (key, value) in [
        ("total_resources", stats.total_resources),
        ("total_technologies", stats.total_technologies),
        ("total_categories", stats.total_categories),
        ("new_resources_last_30_days", stats.new_resources_last_30_days),
    ] {
        context.insert(key.to_string(), value.into());
    }
    Ok(View::render(TEMPLATE, context))
}
