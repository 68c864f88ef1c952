use std::sync::Arc;

use serde::Serialize;
use sqlx::FromRow;

use crate::models::Taxonomy;
use crate::orm::{BoxFuture, Db, Migration, Model};

/// A technology a resource is about, e.g. "Python" or "Docker".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct Technology {
    pub id: i64,
    pub name: String,
}

impl Model for Technology {
    fn table_name() -> &'static str {
        "technologies"
    }

    fn create_table_sql() -> String {
        "CREATE TABLE technologies (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name VARCHAR(100) NOT NULL UNIQUE
        )"
        .to_string()
    }

    fn columns() -> Vec<(String, String)> {
        vec![
            ("id".into(), "INTEGER".into()),
            ("name".into(), "VARCHAR(100)".into()),
        ]
    }
}

impl Taxonomy for Technology {
    const VERBOSE_NAME: &'static str = "Technology";
    const DETACH_SQL: &'static str =
        "UPDATE resources SET technology_id = NULL WHERE technology_id = ?";

    fn id(&self) -> i64 {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn migrate_technologies(db: Arc<Db>) -> BoxFuture<'static, Result<(), sqlx::Error>> {
    Technology::migrate(db)
}

inventory::submit! { Migration(migrate_technologies) }
