//! Postgres-backed implementation of the document store.
//!
//! # What this module is
//! Implements [`DocumentStore`] on top of a single `documents` table (via
//! `sqlx`). Each row holds one document: its key columns
//! (`namespace`, `kind`, `name`, `id`) and a JSONB `properties` object.
//!
//! # Key invariants
//! - Name keys are stored with `id = 0`; allocated keys with `name = ''`.
//! - Ids for incomplete keys come from the `document_ids` sequence, so they are
//!   unique per database but may have gaps (sequences are not transactional).
//!   A sequence value already taken by an explicit id is skipped, never
//!   overwritten.
//! - Empty names are rejected; `name = ''` marks an allocated id.
//! - Filters compare `properties->>field` as text; missing fields compare as `''`.
//!
//! # Consistency / atomicity
//! [`DocumentStore::commit`] runs every mutation in one `SERIALIZABLE`
//! transaction. Serialization failures and deadlocks are retried up to
//! `MAX_COMMIT_ATTEMPTS` times, after which the commit fails with
//! [`StoreError::Conflict`]. Single-document `put`/`delete` run outside a
//! transaction.
//!
//! # Operational notes
//! - Migrations run in [`PostgresStore::connect`] before the handle is returned.
//! - Database URLs may contain credentials; avoid logging them.
//! - Dynamic SQL is limited to placeholder numbering; field names and values are
//!   always bound as parameters.
use crate::config::PostgresConfig;
use crate::{
    DocumentStore, Entity, Key, KeyId, Mutation, Properties, Query, StoreError, StoreResult,
    Transaction,
};
use anyhow::anyhow;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{FromRow, PgConnection, PgPool};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

const MAX_COMMIT_ATTEMPTS: u32 = 3;

/// Durable document store backed by Postgres.
///
/// # Example
/// ```rust,no_run
/// use docstore::{DocumentStore, PostgresConfig};
/// use docstore::postgres::PostgresStore;
///
/// async fn open(url: &str) -> docstore::StoreResult<()> {
///     let store = PostgresStore::connect(&PostgresConfig::new(url)).await?;
///     store.close().await
/// }
/// ```
pub struct PostgresStore {
    pool: PgPool,
    closed: AtomicBool,
}

/// Row shape for the `documents` table.
#[derive(Debug, Clone, FromRow)]
struct DbDocument {
    namespace: String,
    kind: String,
    name: String,
    id: i64,
    properties: Value,
}

impl PostgresStore {
    /// Connect to Postgres and apply the embedded migrations.
    ///
    /// # Errors
    /// - Invalid URL, connection timeout, pool setup or migration failures.
    pub async fn connect(pg: &PostgresConfig) -> StoreResult<Self> {
        Self::connect_internal(pg, true).await
    }

    /// Connect without running migrations, for callers that manage the schema.
    pub async fn connect_without_migrations(pg: &PostgresConfig) -> StoreResult<Self> {
        Self::connect_internal(pg, false).await
    }

    async fn connect_internal(pg: &PostgresConfig, run_migrations: bool) -> StoreResult<Self> {
        let connect_options = PgConnectOptions::from_str(&pg.url)?;
        let connect = PgPoolOptions::new()
            .max_connections(pg.max_connections)
            .acquire_timeout(Duration::from_millis(pg.acquire_timeout_ms))
            .connect_with(connect_options);
        let pool = tokio::time::timeout(Duration::from_millis(pg.connect_timeout_ms), connect)
            .await
            .map_err(|_| StoreError::Unexpected(anyhow!("timed out connecting to postgres")))??;

        if run_migrations {
            sqlx::migrate!("./migrations").run(&pool).await?;
        }
        tracing::debug!(max_connections = pg.max_connections, "postgres document store ready");
        Ok(Self::from_pool(pool))
    }

    /// Wrap an existing pool. The schema must already exist.
    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            pool,
            closed: AtomicBool::new(false),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn ensure_open(&self) -> StoreResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }

    async fn try_commit(&self, mutations: &[Mutation]) -> Result<Vec<Key>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await?;
        let mut written = Vec::new();
        for mutation in mutations {
            match mutation {
                Mutation::Put { key, properties } => {
                    written.push(write_document(&mut tx, key.clone(), properties).await?);
                }
                Mutation::Delete(key) => delete_row(&mut tx, key).await?,
            }
        }
        tx.commit().await?;
        Ok(written)
    }
}

#[async_trait]
impl DocumentStore for PostgresStore {
    async fn get(&self, key: &Key) -> StoreResult<Entity> {
        self.ensure_open()?;
        key.require_complete()?;
        let (name, id) = key.columns();
        let row: Option<(Value,)> = sqlx::query_as(
            "SELECT properties FROM documents \
             WHERE namespace = $1 AND kind = $2 AND name = $3 AND id = $4",
        )
        .bind(&key.namespace)
        .bind(&key.kind)
        .bind(name)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some((Value::Object(properties),)) => Ok(Entity::new(key.clone(), properties)),
            Some((other,)) => Err(StoreError::Unexpected(anyhow!(
                "document {key} has non-object properties: {other}"
            ))),
            None => Err(StoreError::NotFound(key.to_string())),
        }
    }

    async fn put(&self, key: Key, properties: Properties) -> StoreResult<Key> {
        self.ensure_open()?;
        key.validate()?;
        let mut conn = self.pool.acquire().await?;
        Ok(write_document(&mut conn, key, &properties).await?)
    }

    async fn delete(&self, key: &Key) -> StoreResult<()> {
        self.ensure_open()?;
        key.require_complete()?;
        let mut conn = self.pool.acquire().await?;
        delete_row(&mut conn, key).await?;
        Ok(())
    }

    async fn query(&self, query: &Query) -> StoreResult<Vec<Entity>> {
        self.ensure_open()?;
        let sql = select_sql(query.filters.len());
        let mut statement = sqlx::query_as::<_, DbDocument>(&sql)
            .bind(&query.namespace)
            .bind(&query.kind);
        for (field, value) in &query.filters {
            statement = statement.bind(field).bind(value);
        }
        let rows = statement.fetch_all(&self.pool).await?;
        rows.into_iter().map(entity_from_db).collect()
    }

    async fn commit(&self, tx: Transaction) -> StoreResult<Vec<Key>> {
        self.ensure_open()?;
        let mutations = tx.into_mutations();
        for mutation in &mutations {
            match mutation {
                Mutation::Put { key, .. } => key.validate()?,
                Mutation::Delete(key) => key.require_complete()?,
            }
        }

        let mut attempt = 1;
        loop {
            match self.try_commit(&mutations).await {
                Ok(written) => {
                    metrics::counter!("docstore_commits_total", "backend" => "postgres")
                        .increment(1);
                    return Ok(written);
                }
                Err(err) if is_retryable(&err) && attempt < MAX_COMMIT_ATTEMPTS => {
                    tracing::warn!(attempt, error = %err, "retrying document commit");
                    attempt += 1;
                }
                Err(err) if is_retryable(&err) => {
                    metrics::counter!("docstore_commit_conflicts_total", "backend" => "postgres")
                        .increment(1);
                    return Err(StoreError::Conflict(format!(
                        "commit failed after {attempt} attempts: {err}"
                    )));
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    async fn close(&self) -> StoreResult<()> {
        self.closed.store(true, Ordering::Release);
        self.pool.close().await;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}

/// Write one document and return its resolved key.
///
/// Complete keys are upserted. Incomplete keys take the next sequence value
/// whose slot is free, skipping ids already written through explicit keys.
async fn write_document(
    conn: &mut PgConnection,
    key: Key,
    properties: &Properties,
) -> Result<Key, sqlx::Error> {
    if key.is_complete() {
        upsert(&mut *conn, &key, properties).await?;
        return Ok(key);
    }
    loop {
        let id: i64 = sqlx::query_scalar("SELECT nextval('document_ids')")
            .fetch_one(&mut *conn)
            .await?;
        let candidate = key.clone().resolve(|| id);
        if insert_new(&mut *conn, &candidate, properties).await? {
            return Ok(candidate);
        }
        tracing::debug!(id, "allocated document id already in use");
    }
}

/// Insert without touching an existing row. Returns false if the slot is taken.
async fn insert_new(
    conn: &mut PgConnection,
    key: &Key,
    properties: &Properties,
) -> Result<bool, sqlx::Error> {
    let (name, id) = key.columns();
    let result = sqlx::query(
        "INSERT INTO documents (namespace, kind, name, id, properties) \
         VALUES ($1, $2, $3, $4, $5) \
         ON CONFLICT (namespace, kind, name, id) DO NOTHING",
    )
    .bind(&key.namespace)
    .bind(&key.kind)
    .bind(name)
    .bind(id)
    .bind(Value::Object(properties.clone()))
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

async fn upsert(
    conn: &mut PgConnection,
    key: &Key,
    properties: &Properties,
) -> Result<(), sqlx::Error> {
    let (name, id) = key.columns();
    sqlx::query(
        "INSERT INTO documents (namespace, kind, name, id, properties) \
         VALUES ($1, $2, $3, $4, $5) \
         ON CONFLICT (namespace, kind, name, id) DO UPDATE SET properties = EXCLUDED.properties",
    )
    .bind(&key.namespace)
    .bind(&key.kind)
    .bind(name)
    .bind(id)
    .bind(Value::Object(properties.clone()))
    .execute(&mut *conn)
    .await?;
    Ok(())
}

async fn delete_row(conn: &mut PgConnection, key: &Key) -> Result<(), sqlx::Error> {
    let (name, id) = key.columns();
    sqlx::query(
        "DELETE FROM documents WHERE namespace = $1 AND kind = $2 AND name = $3 AND id = $4",
    )
    .bind(&key.namespace)
    .bind(&key.kind)
    .bind(name)
    .bind(id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Build the select statement for a query with `filters` equality filters.
///
/// Parameters: `$1` namespace, `$2` kind, then one `(field, value)` pair per filter.
fn select_sql(filters: usize) -> String {
    let mut sql = String::from(
        "SELECT namespace, kind, name, id, properties FROM documents \
         WHERE namespace = $1 AND kind = $2",
    );
    for index in 0..filters {
        let field = 3 + index * 2;
        let value = field + 1;
        sql.push_str(&format!(
            " AND COALESCE(properties->>(${field}::text), '') = ${value}"
        ));
    }
    sql.push_str(" ORDER BY id, name");
    sql
}

fn entity_from_db(row: DbDocument) -> StoreResult<Entity> {
    let id = if row.name.is_empty() {
        KeyId::Id(row.id)
    } else {
        KeyId::Name(row.name)
    };
    let key = Key {
        namespace: row.namespace,
        kind: row.kind,
        id,
    };
    match row.properties {
        Value::Object(properties) => Ok(Entity::new(key, properties)),
        other => Err(StoreError::Unexpected(anyhow!(
            "document {key} has non-object properties: {other}"
        ))),
    }
}

/// Serialization failures (`40001`) and deadlocks (`40P01`) are safe to retry.
fn is_retryable(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err {
        return db_err
            .code()
            .map(|code| code == "40001" || code == "40P01")
            .unwrap_or(false);
    }
    false
}
