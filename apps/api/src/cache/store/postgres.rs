use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use super::{CacheEntry, CacheStore, NewCacheEntry, RawCacheEntry};
use crate::cache::error::StoreError;
use crate::cache::fingerprint::Fingerprint;
use crate::models::resume::ResumeCacheRow;

const COLUMNS: &str =
    "fingerprint, owner_id, result, hit_count, created_at, updated_at, last_used_at";

/// Durable store backed by the `resume_parse_cache` table (see `db::ensure_schema`).
#[derive(Clone)]
pub struct PgCacheStore {
    pool: PgPool,
}

impl PgCacheStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn parse_key(raw: &str) -> Result<Fingerprint, StoreError> {
    Fingerprint::parse(raw).ok_or_else(|| StoreError::Corrupt(format!("bad fingerprint '{raw}'")))
}

impl TryFrom<ResumeCacheRow> for CacheEntry {
    type Error = StoreError;

    fn try_from(row: ResumeCacheRow) -> Result<Self, Self::Error> {
        Ok(CacheEntry {
            fingerprint: parse_key(&row.fingerprint)?,
            owner_id: row.owner_id,
            result: serde_json::from_value(row.result)?,
            hit_count: row.hit_count,
            created_at: row.created_at,
            updated_at: row.updated_at,
            last_used_at: row.last_used_at,
        })
    }
}

#[async_trait]
impl CacheStore for PgCacheStore {
    async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<CacheEntry>, StoreError> {
        let row: Option<ResumeCacheRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM resume_parse_cache WHERE fingerprint = $1"
        ))
        .bind(fingerprint.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(CacheEntry::try_from).transpose()
    }

    async fn put(&self, entry: NewCacheEntry) -> Result<CacheEntry, StoreError> {
        let result = serde_json::to_value(&entry.result)?;

        // Whole-row upsert: the result is replaced, never merged.
        let row: ResumeCacheRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO resume_parse_cache (fingerprint, owner_id, result)
            VALUES ($1, $2, $3)
            ON CONFLICT (fingerprint) DO UPDATE
                SET result = EXCLUDED.result,
                    updated_at = NOW()
            RETURNING {COLUMNS}
            "#
        ))
        .bind(entry.fingerprint.as_str())
        .bind(entry.owner_id)
        .bind(&result)
        .fetch_one(&self.pool)
        .await?;

        debug!(fingerprint = %entry.fingerprint, "Upserted resume parse cache row");
        CacheEntry::try_from(row)
    }

    async fn delete(&self, fingerprint: &Fingerprint) -> Result<bool, StoreError> {
        let done = sqlx::query("DELETE FROM resume_parse_cache WHERE fingerprint = $1")
            .bind(fingerprint.as_str())
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected() > 0)
    }

    async fn delete_by_owner(&self, owner_id: Uuid) -> Result<Vec<Fingerprint>, StoreError> {
        let keys: Vec<String> = sqlx::query_scalar(
            "DELETE FROM resume_parse_cache WHERE owner_id = $1 RETURNING fingerprint",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        keys.iter().map(|k| parse_key(k)).collect()
    }

    async fn fingerprints_for_owner(&self, owner_id: Uuid) -> Result<Vec<Fingerprint>, StoreError> {
        let keys: Vec<String> = sqlx::query_scalar(
            "SELECT fingerprint FROM resume_parse_cache WHERE owner_id = $1 ORDER BY fingerprint",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;

        keys.iter().map(|k| parse_key(k)).collect()
    }

    async fn scan(
        &self,
        after: Option<&Fingerprint>,
        limit: usize,
    ) -> Result<Vec<RawCacheEntry>, StoreError> {
        let rows: Vec<(String, Uuid, serde_json::Value)> = sqlx::query_as(
            r#"
            SELECT fingerprint, owner_id, result
            FROM resume_parse_cache
            WHERE ($1::TEXT IS NULL OR fingerprint > $1)
            ORDER BY fingerprint
            LIMIT $2
            "#,
        )
        .bind(after.map(Fingerprint::as_str))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(fingerprint, owner_id, result)| {
                Ok(RawCacheEntry {
                    fingerprint: parse_key(&fingerprint)?,
                    owner_id,
                    result,
                })
            })
            .collect()
    }

    async fn record_hit(&self, fingerprint: &Fingerprint) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE resume_parse_cache SET hit_count = hit_count + 1, last_used_at = NOW() WHERE fingerprint = $1",
        )
        .bind(fingerprint.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
