use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::error::Result;
use crate::models::{Category, Resource, Taxonomy, Technology};
use crate::orm::Db;

pub const NEW_RESOURCE_WINDOW_DAYS: i64 = 30;

/// Dashboard counters, computed fresh on every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DashboardStats {
    pub total_resources: i64,
    pub total_technologies: i64,
    pub total_categories: i64,
    pub new_resources_last_30_days: i64,
}

impl DashboardStats {
    /// `new_resources_last_30_days` counts resources created at or after `now - 30 days`.
    pub async fn compute(db: &Db, now: DateTime<Utc>) -> Result<Self> {
        let since = now - Duration::days(NEW_RESOURCE_WINDOW_DAYS);
        Ok(DashboardStats {
            total_resources: Resource::count(db).await?,
            total_technologies: Technology::count(db).await?,
            total_categories: Category::count(db).await?,
            new_resources_last_30_days: Resource::count_created_since(db, since).await?,
        })
    }
}
