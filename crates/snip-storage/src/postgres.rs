use async_trait::async_trait;
use snip_core::store::{ensure_unique_urls, Result};
use snip_core::{
    LinkRecord, LinkStore, NewLink, OwnerId, ReadStore, ShortCode, StorageError, StoreStats,
};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, trace};
use uuid::Uuid;

/// Idempotent schema for the `urls` table.
pub const SCHEMA: &str = include_str!("../ddl/postgres/urls.sql");

const SAVE_QUERY: &str = r#"
    INSERT INTO urls (short_url, original_url, user_id)
    VALUES ($1, $2, $3)
    RETURNING short_url
"#;

const EXISTING_CODE_QUERY: &str = r#"
    SELECT short_url
    FROM urls
    WHERE original_url = $1
"#;

const GET_QUERY: &str = r#"
    SELECT short_url, original_url, deleted_flag
    FROM urls
    WHERE short_url = $1 OR original_url = $1
    LIMIT 1
"#;

const DELETE_BATCH_QUERY: &str = r#"
    UPDATE urls
    SET deleted_flag = true
    WHERE user_id = $1
      AND short_url = ANY($2)
      AND deleted_flag IS NOT TRUE
"#;

const BY_OWNER_QUERY: &str = r#"
    SELECT short_url, original_url, user_id, deleted_flag
    FROM urls
    WHERE user_id = $1
      AND length(short_url) > 0
    ORDER BY id
"#;

const STATS_QUERY: &str = r#"
    SELECT COUNT(*) AS urls, COUNT(DISTINCT user_id) AS users
    FROM urls
    WHERE deleted_flag IS NOT TRUE
"#;

/// PostgreSQL implementation of the store contract.
///
/// Uniqueness of `original_url` is enforced by a unique index; a violation
/// on insert is reported as a conflict carrying the stored code. Deletes
/// only set `deleted_flag`, rows are never removed.
///
/// Mutating calls from this process go through a single writer lock on top
/// of the transaction isolation of the database: the pool hands out several
/// connections and batches are assumed not to interleave.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
    write_lock: Arc<Mutex<()>>,
}

impl PostgresStore {
    /// Creates a store from an existing connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Creates a store by opening a new connection pool.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPool::connect(database_url)
            .await
            .map_err(map_sqlx_error)?;
        Ok(Self::new(pool))
    }

    /// Creates the `urls` table and its indexes if they are missing.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::raw_sql(SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        debug!("urls schema is up to date");
        Ok(())
    }

    async fn existing_code(&self, original_url: &str) -> Result<Option<String>> {
        sqlx::query_scalar::<_, String>(EXISTING_CODE_QUERY)
            .bind(original_url)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)
    }
}

fn owner_uuid(owner: Option<&OwnerId>) -> Result<Uuid> {
    owner
        .map(|owner| *owner.as_uuid())
        .ok_or(StorageError::MissingOwner)
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(sqlx::error::DatabaseError::is_unique_violation)
}

fn map_sqlx_error(err: sqlx::Error) -> StorageError {
    let message = err.to_string();

    match err {
        sqlx::Error::PoolTimedOut => StorageError::Timeout(message),
        sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed
        | sqlx::Error::Io(_)
        | sqlx::Error::Tls(_) => StorageError::Unavailable(message),
        sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::TypeNotFound { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::RowNotFound => StorageError::InvalidData(message),
        _ => StorageError::Query(message),
    }
}

fn count(row: &PgRow, column: &str) -> Result<u64> {
    let value: i64 = row.try_get(column).map_err(map_sqlx_error)?;
    u64::try_from(value)
        .map_err(|e| StorageError::InvalidData(format!("negative {column} count {value}: {e}")))
}

#[async_trait]
impl ReadStore for PostgresStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        trace!(key, "looking up url");

        let row = sqlx::query(GET_QUERY)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let short_url: String = row.try_get("short_url").map_err(map_sqlx_error)?;
        let original_url: String = row.try_get("original_url").map_err(map_sqlx_error)?;
        let deleted: Option<bool> = row.try_get("deleted_flag").map_err(map_sqlx_error)?;

        if deleted.unwrap_or(false) {
            return Err(StorageError::AlreadyDeleted(key.to_owned()));
        }

        if key == short_url {
            Ok(Some(original_url))
        } else if key == original_url {
            Ok(Some(short_url))
        } else {
            Ok(None)
        }
    }

    async fn get_all_by_owner(&self, owner: &OwnerId) -> Result<Vec<LinkRecord>> {
        let rows = sqlx::query(BY_OWNER_QUERY)
            .bind(*owner.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        rows.iter()
            .map(|row| {
                let short_url: String = row.try_get("short_url").map_err(map_sqlx_error)?;
                let user_id: Uuid = row.try_get("user_id").map_err(map_sqlx_error)?;
                let deleted: Option<bool> = row.try_get("deleted_flag").map_err(map_sqlx_error)?;
                Ok(LinkRecord {
                    short_code: ShortCode::new_unchecked(short_url),
                    original_url: row.try_get("original_url").map_err(map_sqlx_error)?,
                    owner: Some(OwnerId::new(user_id)),
                    deleted: deleted.unwrap_or(false),
                })
            })
            .collect()
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn stats(&self) -> Result<StoreStats> {
        let row = sqlx::query(STATS_QUERY)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        Ok(StoreStats {
            urls: count(&row, "urls")?,
            users: count(&row, "users")?,
        })
    }
}

#[async_trait]
impl LinkStore for PostgresStore {
    async fn save(
        &self,
        original_url: &str,
        code: &ShortCode,
        owner: Option<&OwnerId>,
    ) -> Result<ShortCode> {
        let user_id = owner_uuid(owner)?;
        let _guard = self.write_lock.lock().await;

        let result = sqlx::query_scalar::<_, String>(SAVE_QUERY)
            .bind(code.as_str())
            .bind(original_url)
            .bind(user_id)
            .fetch_one(&self.pool)
            .await;

        match result {
            Ok(inserted) => Ok(ShortCode::new_unchecked(inserted)),
            Err(err) if is_unique_violation(&err) => {
                let existing = self
                    .existing_code(original_url)
                    .await?
                    .unwrap_or_else(|| code.to_string());
                debug!(code = %existing, "original url already stored");
                Err(StorageError::Conflict { code: existing })
            }
            Err(err) => Err(map_sqlx_error(err)),
        }
    }

    async fn save_batch(
        &self,
        links: &[NewLink],
        owner: Option<&OwnerId>,
    ) -> Result<Vec<ShortCode>> {
        let user_id = owner_uuid(owner)?;
        ensure_unique_urls(links)?;
        if links.is_empty() {
            return Ok(Vec::new());
        }

        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("INSERT INTO urls (short_url, original_url, user_id) ");
        builder.push_values(links, |mut row, link| {
            row.push_bind(link.short_code.as_str())
                .push_bind(link.original_url.as_str())
                .push_bind(user_id);
        });
        builder.push(
            " ON CONFLICT (original_url) DO UPDATE SET original_url = EXCLUDED.original_url \
             RETURNING short_url, original_url",
        );

        let rows = builder
            .build()
            .fetch_all(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        if rows.len() != links.len() {
            // dropping `tx` rolls the insert back
            return Err(StorageError::BatchMismatch {
                expected: links.len(),
                actual: rows.len(),
            });
        }

        let mut stored = HashMap::with_capacity(rows.len());
        for row in &rows {
            let short_url: String = row.try_get("short_url").map_err(map_sqlx_error)?;
            let original_url: String = row.try_get("original_url").map_err(map_sqlx_error)?;
            stored.insert(original_url, short_url);
        }

        let codes = links
            .iter()
            .map(|link| {
                stored
                    .remove(&link.original_url)
                    .map(ShortCode::new_unchecked)
                    .ok_or_else(|| StorageError::BatchMismatch {
                        expected: links.len(),
                        actual: rows.len(),
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        tx.commit().await.map_err(map_sqlx_error)?;
        debug!(batch = links.len(), "saved batch to postgres");
        Ok(codes)
    }

    async fn delete_batch(&self, owner: &OwnerId, codes: &[ShortCode]) -> Result<u64> {
        if codes.is_empty() {
            return Ok(0);
        }

        let codes: Vec<String> = codes.iter().map(ShortCode::to_string).collect();

        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let result = sqlx::query(DELETE_BATCH_QUERY)
            .bind(*owner.as_uuid())
            .bind(codes)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }
}
