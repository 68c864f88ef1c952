//! Thin async persistence layer over sqlx + SQLite.
//!
//! Usage:
//! let db = Db::connect("sqlite::memory:").await?;
//! auto_migrate(Arc::new(db.clone())).await?;
//! let technologies = db.count("technologies").await?;
pub use futures::future::BoxFuture;
use log::{debug, info};
use sha2::{Digest, Sha256};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Executor, Row, Sqlite, SqlitePool, Transaction};
use std::fs;
use std::str::FromStr;
use std::sync::Arc;
use walkdir::WalkDir;

/// An async database pool wrapper.
#[derive(Clone)]
pub struct Db {
    pool: SqlitePool,
}

/// Migration function pointer for a model.
/// Each model registers a `fn(Arc<Db>) -> BoxFuture<'static, Result<(), sqlx::Error>>` for migration.
pub type MigrationFn = fn(Arc<Db>) -> BoxFuture<'static, Result<(), sqlx::Error>>;

pub struct Migration(pub MigrationFn);

impl std::ops::Deref for Migration {
    type Target = MigrationFn;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

const MIGRATIONS_TABLE: &str = "__resourcehub_migrations";

#[async_trait::async_trait]
pub trait Model: Send + Sync {
    fn table_name() -> &'static str;
    fn create_table_sql() -> String;
    fn columns() -> Vec<(String, String)>;

    /// Create the table on first run, then add any column missing from the live schema.
    async fn migrate(db: Arc<Db>) -> Result<(), sqlx::Error> {
        let table_name = Self::table_name();
        let create_sql = Self::create_table_sql();
        let schema_hash = hash(&create_sql);

        ensure_migrations_table(&db).await?;

        let applied: Vec<(String,)> = sqlx::query_as(&format!(
            "SELECT hash FROM {} WHERE table_name = ?",
            MIGRATIONS_TABLE
        ))
        .bind(table_name)
        .fetch_all(db.pool())
        .await?;

        if applied.is_empty() {
            db.execute(&create_sql).await?;
            sqlx::query(&format!(
                "INSERT INTO {} (table_name, schema_sql, hash) VALUES (?, ?, ?)",
                MIGRATIONS_TABLE
            ))
            .bind(table_name)
            .bind(&create_sql)
            .bind(&schema_hash)
            .execute(db.pool())
            .await?;
            info!(
                "Migrated `{}` (table created, initial schema applied).",
                table_name
            );
            return Ok(());
        }

        if applied[0].0 == schema_hash {
            debug!("Schema for `{}` is up to date.", table_name);
            return Ok(());
        }

        let pragma_sql = format!("PRAGMA table_info({})", table_name);
        let cols: Vec<String> = sqlx::query(&pragma_sql)
            .fetch_all(db.pool())
            .await?
            .into_iter()
            .map(|row: SqliteRow| row.get::<String, _>("name"))
            .collect();

        let mut added = Vec::new();
        for (name, sqltype) in Self::columns() {
            if !cols.contains(&name) {
                let statement = format!(
                    "ALTER TABLE {} ADD COLUMN {} {};",
                    table_name, name, sqltype
                );
                db.execute(&statement).await?;
                added.push((name, sqltype));
            }
        }

        if added.is_empty() {
            info!("No column changes detected for `{}`.", table_name);
        } else {
            info!(
                "Schema changes detected for `{}`, the following columns were added:",
                table_name
            );
            for (name, sqltype) in &added {
                info!("  - {} {}", name, sqltype);
            }
        }
        sqlx::query(&format!(
            "UPDATE {} SET schema_sql = ?, hash = ?, applied_at = CURRENT_TIMESTAMP \
             WHERE table_name = ?",
            MIGRATIONS_TABLE
        ))
        .bind(&create_sql)
        .bind(&schema_hash)
        .bind(table_name)
        .execute(db.pool())
        .await?;
        Ok(())
    }
}

async fn ensure_migrations_table(db: &Db) -> Result<(), sqlx::Error> {
    db.execute(&format!(
        "CREATE TABLE IF NOT EXISTS {} (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            filename TEXT UNIQUE,
            table_name TEXT UNIQUE,
            schema_sql TEXT,
            hash TEXT,
            applied_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        MIGRATIONS_TABLE
    ))
    .await
}

// Helper function to hash a SQL string
fn hash(s: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(s.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn is_memory_uri(uri: &str) -> bool {
    uri.contains(":memory:") || uri.contains("mode=memory")
}

impl Db {
    /// Connect (or create) a SQLite database at the given URI.
    ///
    /// Foreign keys are always enforced. In-memory databases are held on a single
    /// connection, since every new SQLite connection would otherwise see an empty database.
    pub async fn connect(uri: &str) -> Result<Self, sqlx::Error> {
        info!("Connecting to SQLite database at URI: {}", uri);
        let options = SqliteConnectOptions::from_str(uri)?
            .create_if_missing(true)
            .foreign_keys(true);
        let mut pool_options = SqlitePoolOptions::new();
        if is_memory_uri(uri) {
            pool_options = pool_options
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        }
        let pool = pool_options.connect_with(options).await?;
        info!("Connected to SQLite database: {}", uri);
        Ok(Db { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>, sqlx::Error> {
        self.pool.begin().await
    }

    /// Execute an arbitrary SQL statement, e.g. DDL.
    pub async fn execute(&self, sql: &str) -> Result<(), sqlx::Error> {
        debug!("Executing SQL: {}", sql);
        let result = self.pool.execute(sql).await;
        match &result {
            Ok(_) => debug!("SQL executed successfully"),
            Err(e) => log::error!("SQL execution failed: {}", e),
        }
        result.map(|_| ())
    }

    /// `SELECT COUNT(*)` over a whole table.
    pub async fn count(&self, table: &str) -> Result<i64, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

/// Migrate all registered models using the inventory pattern.
pub async fn auto_migrate(db: Arc<Db>) -> Result<(), sqlx::Error> {
    info!("Starting auto migration of all registered models...");
    let mut total = 0;
    for m in inventory::iter::<Migration> {
        total += 1;
        if let Err(e) = m(db.clone()).await {
            log::error!("Auto-migration failed for a model: {}", e);
            return Err(e);
        }
    }
    info!("Auto migration completed for {} models.", total);
    Ok(())
}

/// Applies file-based migrations located in the `migrations_dir` directory.
/// Each migration file should be a *.sql file.
/// Already-applied migrations are skipped based on filename tracking.
pub async fn apply_migration_files(db: Arc<Db>, migrations_dir: &str) -> Result<usize, sqlx::Error> {
    ensure_migrations_table(&db).await?;

    // List .sql files in migrations directory, sorted by filename
    let mut files: Vec<_> = WalkDir::new(migrations_dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|f| f.file_type().is_file())
        .filter(|f| f.path().extension().map(|e| e == "sql").unwrap_or(false))
        .collect();
    files.sort_by_key(|f| f.file_name().to_os_string());

    let mut applied_now = 0;
    for entry in files {
        let filename = entry.file_name().to_string_lossy().to_string();
        let applied: Vec<(String,)> = sqlx::query_as(&format!(
            "SELECT filename FROM {} WHERE filename = ?",
            MIGRATIONS_TABLE
        ))
        .bind(&filename)
        .fetch_all(db.pool())
        .await?;
        if !applied.is_empty() {
            debug!("Migration `{}` already applied.", filename);
            continue;
        }

        let sql = fs::read_to_string(entry.path())?;
        info!("Applying migration file: {}", filename);
        let mut tx = db.begin().await?;
        (&mut *tx).execute(sql.as_str()).await?;
        sqlx::query(&format!(
            "INSERT INTO {} (filename) VALUES (?)",
            MIGRATIONS_TABLE
        ))
        .bind(&filename)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        info!("Migration `{}` applied.", filename);
        applied_now += 1;
    }

    Ok(applied_now)
}
