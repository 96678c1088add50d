//! Postgres-backed stores.
//!
//! Each unit of work runs in a transaction that first pins
//! `app.current_tenant`, which the row-level security policies in the
//! migrations filter on. Every statement also names the tenant explicitly.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use insights::FieldRoles;
use serde_json::Value as JsonValue;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use tabular::{Row, Table};
use tracing::info;
use uuid::Uuid;

use crate::schema::{
    Classification, ConversationTurn, Dataset, DatasetId, DatasetMetadata, DatasetPatch, NewDataset, NewTurn,
    TenantId, TurnId,
};
use crate::store::{pick_active, DatasetStore, HistoryStore, Result, StoreError};

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => StoreError::Serialization(e.to_string()),
            other => StoreError::Storage(other.to_string()),
        }
    }
}

async fn begin_for(pool: &PgPool, tenant: TenantId) -> Result<Transaction<'static, Postgres>> {
    let mut tx = pool.begin().await?;
    sqlx::query("SELECT set_config('app.current_tenant', $1, true)")
        .bind(tenant.to_string())
        .execute(&mut *tx)
        .await?;
    Ok(tx)
}

fn to_i64(v: usize, what: &str) -> Result<i64> {
    i64::try_from(v).map_err(|_| StoreError::Serialization(format!("{what} out of range")))
}

const META_COLUMNS: &str = "id, tenant_id, name, description, file_name, file_path, file_size, content_type, \
     content_hash, row_count, columns, field_roles, is_favorite, active, activated_at, created_at, updated_at";

#[derive(FromRow)]
struct MetaRow {
    id: Uuid,
    tenant_id: Uuid,
    name: String,
    description: Option<String>,
    file_name: String,
    file_path: Option<String>,
    file_size: i64,
    content_type: Option<String>,
    content_hash: String,
    row_count: i64,
    columns: Json<Vec<String>>,
    field_roles: Json<FieldRoles>,
    is_favorite: bool,
    active: bool,
    activated_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<MetaRow> for DatasetMetadata {
    fn from(r: MetaRow) -> Self {
        DatasetMetadata {
            id: r.id,
            tenant_id: r.tenant_id,
            name: r.name,
            description: r.description,
            file_name: r.file_name,
            file_path: r.file_path,
            file_size: r.file_size.max(0) as u64,
            content_type: r.content_type,
            content_hash: r.content_hash,
            row_count: r.row_count.max(0) as usize,
            columns: r.columns.0,
            field_roles: r.field_roles.0,
            is_favorite: r.is_favorite,
            active: r.active,
            activated_at: r.activated_at,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(FromRow)]
struct FullRow {
    #[sqlx(flatten)]
    meta: MetaRow,
    data_snapshot: Json<Vec<Row>>,
}

impl From<FullRow> for Dataset {
    fn from(r: FullRow) -> Self {
        let metadata = DatasetMetadata::from(r.meta);
        let table = Table::from_parts(metadata.columns.clone(), r.data_snapshot.0);
        Dataset { metadata, table }
    }
}

#[derive(Clone)]
pub struct PgDatasetStore {
    pool: PgPool,
}

impl PgDatasetStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DatasetStore for PgDatasetStore {
    async fn save(&self, tenant: TenantId, new: NewDataset) -> Result<Dataset> {
        let file_size = i64::try_from(new.file_size)
            .map_err(|_| StoreError::Serialization("file size out of range".into()))?;
        let row_count = to_i64(new.table.row_count(), "row count")?;

        let mut tx = begin_for(&self.pool, tenant).await?;
        let meta: MetaRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO user_datasets (
                id, tenant_id, name, description, file_name, file_path, file_size,
                content_type, content_hash, row_count, columns, field_roles, data_snapshot
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING {META_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(tenant)
        .bind(&new.name)
        .bind(&new.description)
        .bind(&new.file_name)
        .bind(&new.file_path)
        .bind(file_size)
        .bind(&new.content_type)
        .bind(&new.content_hash)
        .bind(row_count)
        .bind(Json(new.table.columns()))
        .bind(Json(&new.field_roles))
        .bind(Json(new.table.rows()))
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(Dataset {
            metadata: meta.into(),
            table: new.table,
        })
    }

    async fn activate(&self, tenant: TenantId, id: DatasetId) -> Result<Dataset> {
        let mut tx = begin_for(&self.pool, tenant).await?;

        // Row locks on every dataset of the tenant serialize concurrent
        // activations; a fixed lock order keeps them from deadlocking.
        let owned: Vec<Uuid> = sqlx::query_scalar(
            r#"SELECT id FROM user_datasets WHERE tenant_id = $1 ORDER BY id FOR UPDATE"#,
        )
        .bind(tenant)
        .fetch_all(&mut *tx)
        .await?;
        if !owned.contains(&id) {
            return Err(StoreError::NotFound);
        }

        // Deactivate first: the partial unique index is checked per statement.
        sqlx::query(
            r#"
            UPDATE user_datasets
            SET active = FALSE, updated_at = NOW()
            WHERE tenant_id = $1 AND active AND id <> $2
            "#,
        )
        .bind(tenant)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let row: FullRow = sqlx::query_as(&format!(
            r#"
            UPDATE user_datasets
            SET active = TRUE, activated_at = clock_timestamp(), updated_at = NOW()
            WHERE tenant_id = $1 AND id = $2
            RETURNING {META_COLUMNS}, data_snapshot
            "#
        ))
        .bind(tenant)
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;

        info!(%tenant, dataset = %id, "dataset activated");
        Ok(row.into())
    }

    async fn get_active(&self, tenant: TenantId) -> Result<Option<Dataset>> {
        let mut tx = begin_for(&self.pool, tenant).await?;
        let rows: Vec<FullRow> = sqlx::query_as(&format!(
            r#"SELECT {META_COLUMNS}, data_snapshot FROM user_datasets WHERE tenant_id = $1 AND active"#
        ))
        .bind(tenant)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(pick_active(rows.into_iter().map(Dataset::from).collect()))
    }

    async fn list(&self, tenant: TenantId) -> Result<Vec<DatasetMetadata>> {
        let mut tx = begin_for(&self.pool, tenant).await?;
        let rows: Vec<MetaRow> = sqlx::query_as(&format!(
            r#"SELECT {META_COLUMNS} FROM user_datasets WHERE tenant_id = $1 ORDER BY created_at DESC"#
        ))
        .bind(tenant)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;

        Ok(rows.into_iter().map(DatasetMetadata::from).collect())
    }

    async fn get(&self, tenant: TenantId, id: DatasetId) -> Result<Dataset> {
        let mut tx = begin_for(&self.pool, tenant).await?;
        let row: Option<FullRow> = sqlx::query_as(&format!(
            r#"SELECT {META_COLUMNS}, data_snapshot FROM user_datasets WHERE tenant_id = $1 AND id = $2"#
        ))
        .bind(tenant)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
        tx.commit().await?;

        row.map(Dataset::from).ok_or(StoreError::NotFound)
    }

    async fn update(&self, tenant: TenantId, id: DatasetId, patch: DatasetPatch) -> Result<DatasetMetadata> {
        let mut tx = begin_for(&self.pool, tenant).await?;
        let row: Option<MetaRow> = sqlx::query_as(&format!(
            r#"
            UPDATE user_datasets
            SET name = COALESCE($3, name),
                description = COALESCE($4, description),
                updated_at = NOW()
            WHERE tenant_id = $1 AND id = $2
            RETURNING {META_COLUMNS}
            "#
        ))
        .bind(tenant)
        .bind(id)
        .bind(patch.name)
        .bind(patch.description)
        .fetch_optional(&mut *tx)
        .await?;
        tx.commit().await?;

        row.map(DatasetMetadata::from).ok_or(StoreError::NotFound)
    }

    async fn toggle_favorite(&self, tenant: TenantId, id: DatasetId) -> Result<DatasetMetadata> {
        let mut tx = begin_for(&self.pool, tenant).await?;
        let row: Option<MetaRow> = sqlx::query_as(&format!(
            r#"
            UPDATE user_datasets
            SET is_favorite = NOT is_favorite, updated_at = NOW()
            WHERE tenant_id = $1 AND id = $2
            RETURNING {META_COLUMNS}
            "#
        ))
        .bind(tenant)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
        tx.commit().await?;

        row.map(DatasetMetadata::from).ok_or(StoreError::NotFound)
    }

    async fn delete(&self, tenant: TenantId, id: DatasetId) -> Result<DatasetMetadata> {
        let mut tx = begin_for(&self.pool, tenant).await?;
        let row: Option<MetaRow> = sqlx::query_as(&format!(
            r#"DELETE FROM user_datasets WHERE tenant_id = $1 AND id = $2 RETURNING {META_COLUMNS}"#
        ))
        .bind(tenant)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
        tx.commit().await?;

        row.map(DatasetMetadata::from).ok_or(StoreError::NotFound)
    }
}

#[derive(FromRow)]
struct TurnRow {
    id: i64,
    tenant_id: Uuid,
    message: String,
    response: String,
    classification: String,
    payload: Option<Json<JsonValue>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<TurnRow> for ConversationTurn {
    type Error = StoreError;

    fn try_from(r: TurnRow) -> Result<Self> {
        Ok(ConversationTurn {
            id: r.id,
            tenant_id: r.tenant_id,
            message: r.message,
            response: r.response,
            classification: r
                .classification
                .parse::<Classification>()
                .map_err(StoreError::Serialization)?,
            payload: r.payload.map(|p| p.0),
            created_at: r.created_at,
        })
    }
}

fn into_turns(rows: Vec<TurnRow>) -> Result<Vec<ConversationTurn>> {
    rows.into_iter().map(ConversationTurn::try_from).collect()
}

/// `ILIKE` pattern matching `term` literally anywhere.
fn contains_pattern(term: &str) -> String {
    let mut p = String::with_capacity(term.len() + 2);
    p.push('%');
    for c in term.chars() {
        if matches!(c, '\\' | '%' | '_') {
            p.push('\\');
        }
        p.push(c);
    }
    p.push('%');
    p
}

const TURN_COLUMNS: &str = "id, tenant_id, message, response, classification, payload, created_at";

#[derive(Clone)]
pub struct PgHistoryStore {
    pool: PgPool,
}

impl PgHistoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HistoryStore for PgHistoryStore {
    async fn append(&self, tenant: TenantId, turn: NewTurn) -> Result<TurnId> {
        let mut tx = begin_for(&self.pool, tenant).await?;
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO chat_history (tenant_id, message, response, classification, payload)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(tenant)
        .bind(&turn.message)
        .bind(&turn.response)
        .bind(turn.classification.as_str())
        .bind(turn.payload.map(Json))
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(id)
    }

    async fn recent(&self, tenant: TenantId, n: usize) -> Result<Vec<ConversationTurn>> {
        let mut tx = begin_for(&self.pool, tenant).await?;
        let rows: Vec<TurnRow> = sqlx::query_as(&format!(
            r#"
            SELECT {TURN_COLUMNS} FROM (
                SELECT {TURN_COLUMNS} FROM chat_history
                WHERE tenant_id = $1
                ORDER BY created_at DESC, id DESC
                LIMIT $2
            ) latest
            ORDER BY created_at ASC, id ASC
            "#
        ))
        .bind(tenant)
        .bind(to_i64(n, "limit")?)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;
        into_turns(rows)
    }

    async fn list(&self, tenant: TenantId, limit: usize) -> Result<Vec<ConversationTurn>> {
        let mut tx = begin_for(&self.pool, tenant).await?;
        let rows: Vec<TurnRow> = sqlx::query_as(&format!(
            r#"
            SELECT {TURN_COLUMNS} FROM chat_history
            WHERE tenant_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#
        ))
        .bind(tenant)
        .bind(to_i64(limit, "limit")?)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;
        into_turns(rows)
    }

    async fn search(&self, tenant: TenantId, term: &str, limit: usize) -> Result<Vec<ConversationTurn>> {
        let mut tx = begin_for(&self.pool, tenant).await?;
        let rows: Vec<TurnRow> = sqlx::query_as(&format!(
            r#"
            SELECT {TURN_COLUMNS} FROM chat_history
            WHERE tenant_id = $1
              AND (message ILIKE $2 ESCAPE '\' OR response ILIKE $2 ESCAPE '\')
            ORDER BY created_at DESC, id DESC
            LIMIT $3
            "#
        ))
        .bind(tenant)
        .bind(contains_pattern(term))
        .bind(to_i64(limit, "limit")?)
        .fetch_all(&mut *tx)
        .await?;
        tx.commit().await?;
        into_turns(rows)
    }

    async fn clear(&self, tenant: TenantId) -> Result<u64> {
        let mut tx = begin_for(&self.pool, tenant).await?;
        let done = sqlx::query(r#"DELETE FROM chat_history WHERE tenant_id = $1"#)
            .bind(tenant)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(done.rows_affected())
    }
}
