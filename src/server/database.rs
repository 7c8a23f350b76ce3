use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{query, query_as, FromRow};
use tracing::{error, info};

#[cfg(feature = "sqlite")]
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

#[cfg(feature = "postgres")]
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::config::DatabaseConfig;
use crate::errors::{LicenseError, LicenseResult};
use crate::license::License;
use crate::store::{settle_bind, BindOutcome, LicenseStore};

/// Row shape of the `licenses` table.
#[derive(Debug, Clone, FromRow)]
struct LicenseRow {
    license_key: String,
    machine_id: Option<String>,
    expires_at: DateTime<Utc>,
}

impl From<LicenseRow> for License {
    fn from(row: LicenseRow) -> Self {
        License {
            key: row.license_key,
            machine_id: row.machine_id,
            expires_at: row.expires_at,
        }
    }
}

/// Unified database abstraction over SQLite and Postgres.
///
/// Each variant owns a connection pool; every store call checks a
/// connection out for the duration of one statement.
///
/// Available variants depend on enabled features:
/// - `sqlite` feature enables `Database::SQLite`
/// - `postgres` feature enables `Database::Postgres`
#[derive(Debug, Clone)]
pub enum Database {
    #[cfg(feature = "sqlite")]
    SQLite(SqlitePool),
    #[cfg(feature = "postgres")]
    Postgres(PgPool),
}

fn storage_error(op: &'static str) -> impl FnOnce(sqlx::Error) -> LicenseError {
    move |e| {
        error!("{op} failed: {e}");
        LicenseError::StorageError(format!("database error: {e}"))
    }
}

impl Database {
    /// Open a pool for the configured backend.
    pub async fn connect(config: &DatabaseConfig) -> LicenseResult<Arc<Self>> {
        match config.db_type.as_str() {
            #[cfg(feature = "sqlite")]
            "sqlite" => {
                let pool = SqlitePoolOptions::new()
                    .max_connections(config.max_connections)
                    .connect(&config.sqlite_url)
                    .await
                    .map_err(|e| {
                        error!("Failed to connect to SQLite: {e}");
                        LicenseError::StorageError(format!("failed to connect to SQLite: {e}"))
                    })?;

                Ok(Arc::new(Database::SQLite(pool)))
            }
            #[cfg(not(feature = "sqlite"))]
            "sqlite" => Err(LicenseError::ConfigError(
                "SQLite support not compiled in. Enable the 'sqlite' feature.".to_string(),
            )),
            #[cfg(feature = "postgres")]
            "postgres" => {
                let pool = PgPoolOptions::new()
                    .max_connections(config.max_connections)
                    .connect(&config.postgres_url)
                    .await
                    .map_err(|e| {
                        error!("Failed to connect to PostgreSQL: {e}");
                        LicenseError::StorageError(format!(
                            "failed to connect to PostgreSQL: {e}"
                        ))
                    })?;

                Ok(Arc::new(Database::Postgres(pool)))
            }
            #[cfg(not(feature = "postgres"))]
            "postgres" => Err(LicenseError::ConfigError(
                "PostgreSQL support not compiled in. Enable the 'postgres' feature.".to_string(),
            )),
            other => Err(LicenseError::ConfigError(format!(
                "unsupported database type: {other}"
            ))),
        }
    }

    /// Create the `licenses` table and its expiry index if missing.
    pub async fn migrate(&self) -> LicenseResult<()> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                query(
                    r#"
                    CREATE TABLE IF NOT EXISTS licenses (
                        license_key TEXT PRIMARY KEY,
                        machine_id  TEXT,
                        expires_at  TEXT NOT NULL
                    )
                    "#,
                )
                .execute(pool)
                .await
                .map_err(storage_error("SQLite migrate"))?;

                query("CREATE INDEX IF NOT EXISTS idx_licenses_expires_at ON licenses (expires_at)")
                    .execute(pool)
                    .await
                    .map_err(storage_error("SQLite migrate"))?;
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                query(
                    r#"
                    CREATE TABLE IF NOT EXISTS licenses (
                        license_key TEXT PRIMARY KEY,
                        machine_id  TEXT,
                        expires_at  TIMESTAMPTZ NOT NULL
                    )
                    "#,
                )
                .execute(pool)
                .await
                .map_err(storage_error("Postgres migrate"))?;

                query("CREATE INDEX IF NOT EXISTS idx_licenses_expires_at ON licenses (expires_at)")
                    .execute(pool)
                    .await
                    .map_err(storage_error("Postgres migrate"))?;
            }
        }

        info!("Database schema ready ({})", self.backend());
        Ok(())
    }

    /// Conditional write: set `machine_id` only where it is still NULL.
    ///
    /// Returns the updated record when this call performed the bind.
    async fn bind_if_unbound(&self, key: &str, machine_id: &str) -> LicenseResult<Option<License>> {
        let row = match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query_as::<_, LicenseRow>(
                "UPDATE licenses \
                     SET machine_id = ? \
                     WHERE license_key = ? AND machine_id IS NULL \
                     RETURNING license_key, machine_id, expires_at",
            )
            .bind(machine_id)
            .bind(key)
            .fetch_optional(pool)
            .await
            .map_err(storage_error("SQLite bind_machine"))?,
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => query_as::<_, LicenseRow>(
                "UPDATE licenses \
                     SET machine_id = $1 \
                     WHERE license_key = $2 AND machine_id IS NULL \
                     RETURNING license_key, machine_id, expires_at",
            )
            .bind(machine_id)
            .bind(key)
            .fetch_optional(pool)
            .await
            .map_err(storage_error("Postgres bind_machine"))?,
        };

        Ok(row.map(License::from))
    }
}

#[async_trait]
impl LicenseStore for Database {
    async fn get(&self, key: &str) -> LicenseResult<Option<License>> {
        let row = match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query_as::<_, LicenseRow>(
                "SELECT license_key, machine_id, expires_at FROM licenses WHERE license_key = ?",
            )
            .bind(key)
            .fetch_optional(pool)
            .await
            .map_err(storage_error("SQLite get"))?,
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => query_as::<_, LicenseRow>(
                "SELECT license_key, machine_id, expires_at FROM licenses WHERE license_key = $1",
            )
            .bind(key)
            .fetch_optional(pool)
            .await
            .map_err(storage_error("Postgres get"))?,
        };

        Ok(row.map(License::from))
    }

    /// Insert a license or replace it in one statement, keyed on `license_key`.
    async fn upsert(
        &self,
        key: &str,
        machine_id: Option<&str>,
        expires_at: DateTime<Utc>,
    ) -> LicenseResult<License> {
        let row = match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query_as::<_, LicenseRow>(
                r#"
                INSERT INTO licenses (license_key, machine_id, expires_at)
                VALUES (?, ?, ?)
                ON CONFLICT(license_key) DO UPDATE SET
                    machine_id = excluded.machine_id,
                    expires_at = excluded.expires_at
                RETURNING license_key, machine_id, expires_at
                "#,
            )
            .bind(key)
            .bind(machine_id)
            .bind(expires_at)
            .fetch_one(pool)
            .await
            .map_err(storage_error("SQLite upsert"))?,
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => query_as::<_, LicenseRow>(
                r#"
                INSERT INTO licenses (license_key, machine_id, expires_at)
                VALUES ($1, $2, $3)
                ON CONFLICT (license_key) DO UPDATE SET
                    machine_id = EXCLUDED.machine_id,
                    expires_at = EXCLUDED.expires_at
                RETURNING license_key, machine_id, expires_at
                "#,
            )
            .bind(key)
            .bind(machine_id)
            .bind(expires_at)
            .fetch_one(pool)
            .await
            .map_err(storage_error("Postgres upsert"))?,
        };

        Ok(row.into())
    }

    async fn bind_machine(&self, key: &str, machine_id: &str) -> LicenseResult<BindOutcome> {
        settle_bind(
            key,
            || self.bind_if_unbound(key, machine_id),
            || self.get(key),
        )
        .await
    }

    async fn delete(&self, key: &str) -> LicenseResult<bool> {
        let rows_affected = match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query("DELETE FROM licenses WHERE license_key = ?")
                .bind(key)
                .execute(pool)
                .await
                .map_err(storage_error("SQLite delete"))?
                .rows_affected(),
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => query("DELETE FROM licenses WHERE license_key = $1")
                .bind(key)
                .execute(pool)
                .await
                .map_err(storage_error("Postgres delete"))?
                .rows_affected(),
        };

        Ok(rows_affected > 0)
    }

    async fn list(&self) -> LicenseResult<Vec<License>> {
        const LIST_SQL: &str = "SELECT license_key, machine_id, expires_at FROM licenses \
                                ORDER BY expires_at DESC, license_key ASC";

        let rows = match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => query_as::<_, LicenseRow>(LIST_SQL)
                .fetch_all(pool)
                .await
                .map_err(storage_error("SQLite list"))?,
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => query_as::<_, LicenseRow>(LIST_SQL)
                .fetch_all(pool)
                .await
                .map_err(storage_error("Postgres list"))?,
        };

        Ok(rows.into_iter().map(License::from).collect())
    }

    async fn ping(&self) -> LicenseResult<()> {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(pool) => {
                query("SELECT 1")
                    .execute(pool)
                    .await
                    .map_err(storage_error("SQLite ping"))?;
            }
            #[cfg(feature = "postgres")]
            Database::Postgres(pool) => {
                query("SELECT 1")
                    .execute(pool)
                    .await
                    .map_err(storage_error("Postgres ping"))?;
            }
        }
        Ok(())
    }

    fn backend(&self) -> &'static str {
        match self {
            #[cfg(feature = "sqlite")]
            Database::SQLite(_) => "sqlite",
            #[cfg(feature = "postgres")]
            Database::Postgres(_) => "postgres",
        }
    }
}
