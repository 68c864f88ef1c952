use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, QueryBuilder, Sqlite, SqliteConnection};

use crate::error::{AppError, Result};
use crate::models::{Category, Technology};
use crate::orm::{BoxFuture, Db, Migration, Model};

/// A saved link, article or tool.
///
/// `created_at` is fixed at insert time. `technology` becomes `None` when its
/// technology is deleted; `categories` is sorted by name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resource {
    pub id: i64,
    pub title: String,
    pub url: Option<String>,
    pub description: String,
    pub technology: Option<Technology>,
    pub categories: Vec<Category>,
    pub created_at: DateTime<Utc>,
}

/// Lowercased copy of `text`, as stored in the `search_*` columns that text search runs against.
pub fn fold_case(text: &str) -> String {
    text.to_lowercase()
}

/// Cleaned, editable fields of a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceInput {
    pub title: String,
    pub url: Option<String>,
    pub description: String,
    pub technology_id: Option<i64>,
    pub category_ids: Vec<i64>,
}

/// One `resources` row joined with its technology name.
#[derive(Debug, FromRow)]
pub(crate) struct ResourceRow {
    id: i64,
    title: String,
    url: Option<String>,
    description: String,
    technology_id: Option<i64>,
    technology_name: Option<String>,
    created_at: DateTime<Utc>,
}

pub(crate) const SELECT_RESOURCES: &str = "SELECT r.id, r.title, r.url, r.description, \
     r.technology_id, t.name AS technology_name, r.created_at \
     FROM resources r LEFT JOIN technologies t ON t.id = r.technology_id";

impl Model for Resource {
    fn table_name() -> &'static str {
        "resources"
    }

    fn create_table_sql() -> String {
        "CREATE TABLE resources (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            title VARCHAR(200) NOT NULL,
            url VARCHAR(2000) NULL,
            description TEXT NOT NULL,
            technology_id INTEGER NULL REFERENCES technologies(id) ON DELETE SET NULL,
            created_at DATETIME NOT NULL,
            search_title TEXT NOT NULL DEFAULT '',
            search_description TEXT NOT NULL DEFAULT ''
        );
        CREATE INDEX IF NOT EXISTS resources_created_at ON resources(created_at);
        CREATE INDEX IF NOT EXISTS resources_technology_id ON resources(technology_id)"
            .to_string()
    }

    fn columns() -> Vec<(String, String)> {
        vec![
            ("id".into(), "INTEGER".into()),
            ("title".into(), "VARCHAR(200)".into()),
            ("url".into(), "VARCHAR(2000) NULL".into()),
            ("description".into(), "TEXT".into()),
            ("technology_id".into(), "INTEGER NULL".into()),
            ("created_at".into(), "DATETIME".into()),
            ("search_title".into(), "TEXT NOT NULL DEFAULT ''".into()),
            ("search_description".into(), "TEXT NOT NULL DEFAULT ''".into()),
        ]
    }
}

/// The resource/category association table.
pub struct ResourceCategory;

impl Model for ResourceCategory {
    fn table_name() -> &'static str {
        "resource_categories"
    }

    fn create_table_sql() -> String {
        "CREATE TABLE resource_categories (
            resource_id INTEGER NOT NULL REFERENCES resources(id) ON DELETE CASCADE,
            category_id INTEGER NOT NULL REFERENCES categories(id) ON DELETE CASCADE,
            PRIMARY KEY (resource_id, category_id)
        );
        CREATE INDEX IF NOT EXISTS resource_categories_category_id
            ON resource_categories(category_id)"
            .to_string()
    }

    fn columns() -> Vec<(String, String)> {
        vec![
            ("resource_id".into(), "INTEGER".into()),
            ("category_id".into(), "INTEGER".into()),
        ]
    }
}

async fn replace_categories(
    conn: &mut SqliteConnection,
    resource_id: i64,
    category_ids: &[i64],
) -> Result<()> {
    sqlx::query("DELETE FROM resource_categories WHERE resource_id = ?")
        .bind(resource_id)
        .execute(&mut *conn)
        .await?;
    if category_ids.is_empty() {
        return Ok(());
    }
    let mut insert: QueryBuilder<Sqlite> =
        QueryBuilder::new("INSERT INTO resource_categories (resource_id, category_id) ");
    insert.push_values(category_ids, |mut row, category_id| {
        row.push_bind(resource_id).push_bind(*category_id);
    });
    insert.build().execute(&mut *conn).await?;
    Ok(())
}

impl Resource {
    pub fn category_ids(&self) -> Vec<i64> {
        self.categories.iter().map(|c| c.id).collect()
    }

    pub async fn get(db: &Db, id: i64) -> Result<Resource> {
        let sql = format!("{} WHERE r.id = ?", SELECT_RESOURCES);
        let row: ResourceRow = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(db.pool())
            .await?
            .ok_or_else(|| AppError::not_found(format!("Resource {}", id)))?;
        let mut hydrated = Self::hydrate(db, vec![row]).await?;
        hydrated
            .pop()
            .ok_or_else(|| AppError::not_found(format!("Resource {}", id)))
    }

    /// Insert a resource and its category links in one transaction.
    pub async fn create(
        db: &Db,
        input: &ResourceInput,
        created_at: DateTime<Utc>,
    ) -> Result<Resource> {
        let mut tx = db.begin().await?;
        let (id,): (i64,) = sqlx::query_as(
            "INSERT INTO resources \
             (title, url, description, technology_id, created_at, search_title, search_description) \
             VALUES (?, ?, ?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(&input.title)
        .bind(&input.url)
        .bind(&input.description)
        .bind(input.technology_id)
        .bind(created_at)
        .bind(fold_case(&input.title))
        .bind(fold_case(&input.description))
        .fetch_one(&mut *tx)
        .await?;
        replace_categories(&mut tx, id, &input.category_ids).await?;
        tx.commit().await?;
        log::info!("Created resource #{} `{}`", id, input.title);
        Self::get(db, id).await
    }

    /// Overwrite the editable fields. `id` and `created_at` never change.
    pub async fn update(db: &Db, id: i64, input: &ResourceInput) -> Result<Resource> {
        let mut tx = db.begin().await?;
        let done = sqlx::query(
            "UPDATE resources SET title = ?, url = ?, description = ?, technology_id = ?, \
             search_title = ?, search_description = ? WHERE id = ?",
        )
        .bind(&input.title)
        .bind(&input.url)
        .bind(&input.description)
        .bind(input.technology_id)
        .bind(fold_case(&input.title))
        .bind(fold_case(&input.description))
        .bind(id)
        .execute(&mut *tx)
        .await?;
        if done.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(AppError::not_found(format!("Resource {}", id)));
        }
        replace_categories(&mut tx, id, &input.category_ids).await?;
        tx.commit().await?;
        log::info!("Updated resource #{}", id);
        Self::get(db, id).await
    }

    pub async fn delete(db: &Db, id: i64) -> Result<()> {
        let mut tx = db.begin().await?;
        sqlx::query("DELETE FROM resource_categories WHERE resource_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let done = sqlx::query("DELETE FROM resources WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if done.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(AppError::not_found(format!("Resource {}", id)));
        }
        tx.commit().await?;
        log::info!("Deleted resource #{}", id);
        Ok(())
    }

    pub async fn count(db: &Db) -> Result<i64> {
        Ok(db.count(Self::table_name()).await?)
    }

    /// Resources with `created_at >= since`.
    pub async fn count_created_since(db: &Db, since: DateTime<Utc>) -> Result<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM resources WHERE created_at >= ?")
                .bind(since)
                .fetch_one(db.pool())
                .await?;
        Ok(count)
    }

    /// Attach technologies and categories to raw rows, keeping row order.
    pub(crate) async fn hydrate(db: &Db, rows: Vec<ResourceRow>) -> Result<Vec<Resource>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let mut links: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT rc.resource_id, c.id, c.name FROM resource_categories rc \
             JOIN categories c ON c.id = rc.category_id WHERE rc.resource_id IN (",
        );
        let mut ids = links.separated(", ");
        for row in &rows {
            ids.push_bind(row.id);
        }
        links.push(") ORDER BY c.name, c.id");
        let linked: Vec<(i64, i64, String)> = links.build_query_as().fetch_all(db.pool()).await?;

        let mut by_resource: HashMap<i64, Vec<Category>> = HashMap::new();
        for (resource_id, id, name) in linked {
            by_resource
                .entry(resource_id)
                .or_default()
                .push(Category { id, name });
        }

        Ok(rows
            .into_iter()
            .map(|row| {
                let technology = match (row.technology_id, row.technology_name) {
                    (Some(id), Some(name)) => Some(Technology { id, name }),
                    _ => None,
                };
                Resource {
                    categories: by_resource.remove(&row.id).unwrap_or_default(),
                    id: row.id,
                    title: row.title,
                    url: row.url,
                    description: row.description,
                    technology,
                    created_at: row.created_at,
                }
            })
            .collect())
    }
}

fn migrate_resources(db: Arc<Db>) -> BoxFuture<'static, Result<(), sqlx::Error>> {
    Resource::migrate(db)
}

fn migrate_resource_categories(db: Arc<Db>) -> BoxFuture<'static, Result<(), sqlx::Error>> {
    ResourceCategory::migrate(db)
}

inventory::submit! { Migration(migrate_resources) }
inventory::submit! { Migration(migrate_resource_categories) }
