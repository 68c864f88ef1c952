use std::sync::Arc;

use serde::Serialize;
use sqlx::FromRow;

use crate::models::Taxonomy;
use crate::orm::{BoxFuture, Db, Migration, Model};

/// A classification like "Tutorial" or "Tool". Resources can carry several.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct Category {
    pub id: i64,
    pub name: String,
}

impl Model for Category {
    fn table_name() -> &'static str {
        "categories"
    }

    fn create_table_sql() -> String {
        "CREATE TABLE categories (
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

impl Taxonomy for Category {
    const VERBOSE_NAME: &'static str = "Category";
    const DETACH_SQL: &'static str = "DELETE FROM resource_categories WHERE category_id = ?";

    fn id(&self) -> i64 {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn migrate_categories(db: Arc<Db>) -> BoxFuture<'static, Result<(), sqlx::Error>> {
    Category::migrate(db)
}

inventory::submit! { Migration(migrate_categories) }
