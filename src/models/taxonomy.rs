use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::FromRow;

use crate::error::{AppError, Result};
use crate::orm::{Db, Model};

/// A named tag table (technologies, categories): unique `name`, surrogate `id`.
///
/// Deleting a row never deletes resources. `DETACH_SQL` runs first, inside the same
/// transaction, to release every resource row that points at the deleted id.
#[async_trait::async_trait]
pub trait Taxonomy:
    Model + Serialize + for<'r> FromRow<'r, SqliteRow> + Clone + Send + Sync + Unpin + 'static
{
    const VERBOSE_NAME: &'static str;
    const DETACH_SQL: &'static str;

    fn id(&self) -> i64;
    fn name(&self) -> &str;

    fn unique_message() -> String {
        format!("{} with this Name already exists.", Self::VERBOSE_NAME)
    }

    async fn all(db: &Db) -> Result<Vec<Self>> {
        let sql = format!(
            "SELECT id, name FROM {} ORDER BY name, id",
            Self::table_name()
        );
        Ok(sqlx::query_as::<_, Self>(&sql).fetch_all(db.pool()).await?)
    }

    async fn page(db: &Db, offset: i64, limit: i64) -> Result<Vec<Self>> {
        let sql = format!(
            "SELECT id, name FROM {} ORDER BY name, id LIMIT ? OFFSET ?",
            Self::table_name()
        );
        Ok(sqlx::query_as::<_, Self>(&sql)
            .bind(limit)
            .bind(offset)
            .fetch_all(db.pool())
            .await?)
    }

    async fn get(db: &Db, id: i64) -> Result<Self> {
        let sql = format!("SELECT id, name FROM {} WHERE id = ?", Self::table_name());
        sqlx::query_as::<_, Self>(&sql)
            .bind(id)
            .fetch_optional(db.pool())
            .await?
            .ok_or_else(|| AppError::not_found(format!("{} {}", Self::VERBOSE_NAME, id)))
    }

    async fn exists(db: &Db, id: i64) -> Result<bool> {
        let sql = format!("SELECT COUNT(*) FROM {} WHERE id = ?", Self::table_name());
        let (count,): (i64,) = sqlx::query_as(&sql).bind(id).fetch_one(db.pool()).await?;
        Ok(count > 0)
    }

    async fn count(db: &Db) -> Result<i64> {
        Ok(db.count(Self::table_name()).await?)
    }

    /// Whether another row already uses `name`. `exclude` is the row being edited.
    async fn name_taken(db: &Db, name: &str, exclude: Option<i64>) -> Result<bool> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE name = ? AND id IS NOT ?",
            Self::table_name()
        );
        let (count,): (i64,) = sqlx::query_as(&sql)
            .bind(name)
            .bind(exclude)
            .fetch_one(db.pool())
            .await?;
        Ok(count > 0)
    }

    async fn create(db: &Db, name: &str) -> Result<Self> {
        let sql = format!(
            "INSERT INTO {} (name) VALUES (?) RETURNING id, name",
            Self::table_name()
        );
        let row = sqlx::query_as::<_, Self>(&sql)
            .bind(name)
            .fetch_one(db.pool())
            .await
            .map_err(|e| AppError::from_unique_violation(e, "name", &Self::unique_message()))?;
        log::info!("Created {} #{} `{}`", Self::VERBOSE_NAME, row.id(), row.name());
        Ok(row)
    }

    async fn update(db: &Db, id: i64, name: &str) -> Result<Self> {
        let sql = format!(
            "UPDATE {} SET name = ? WHERE id = ? RETURNING id, name",
            Self::table_name()
        );
        let row = sqlx::query_as::<_, Self>(&sql)
            .bind(name)
            .bind(id)
            .fetch_optional(db.pool())
            .await
            .map_err(|e| AppError::from_unique_violation(e, "name", &Self::unique_message()))?
            .ok_or_else(|| AppError::not_found(format!("{} {}", Self::VERBOSE_NAME, id)))?;
        log::info!("Updated {} #{}", Self::VERBOSE_NAME, id);
        Ok(row)
    }

    async fn delete(db: &Db, id: i64) -> Result<()> {
        let mut tx = db.begin().await?;
        sqlx::query(Self::DETACH_SQL)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        let sql = format!("DELETE FROM {} WHERE id = ?", Self::table_name());
        let done = sqlx::query(&sql).bind(id).execute(&mut *tx).await?;
        if done.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(AppError::not_found(format!(
                "{} {}",
                Self::VERBOSE_NAME,
                id
            )));
        }
        tx.commit().await?;
        log::info!("Deleted {} #{}", Self::VERBOSE_NAME, id);
        Ok(())
    }
}
