//! PostgreSQL-backed `PatientStore` implementation

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use sqlx::{PgPool, Row};

use crate::{
    db::traits::{PatientStore, UpsertOutcome},
    models::{PatientFilter, PatientRecord, RecordType},
    Error, Result,
};

/// PostgreSQL-backed PatientStore implementation.
///
/// Each record is stored as a JSONB document keyed by `(record_type, id)`. The upsert is a
/// single `INSERT .. ON CONFLICT DO UPDATE`, so concurrent writers of one key are
/// serialized by the row lock.
#[derive(Clone)]
pub struct PostgresPatientStore {
    pub(crate) pool: PgPool,
}

impl PostgresPatientStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn decode(document: JsonValue) -> Result<PatientRecord> {
        serde_json::from_value(document).map_err(Error::Serialization)
    }
}

#[async_trait]
impl PatientStore for PostgresPatientStore {
    async fn create_or_update(&self, record: &PatientRecord) -> Result<UpsertOutcome> {
        let document = serde_json::to_value(record)?;

        let row = sqlx::query(
            r#"
            INSERT INTO patients (record_type, id, risk_score, risk_level, document, last_updated)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (record_type, id) DO UPDATE
            SET risk_score = EXCLUDED.risk_score,
                risk_level = EXCLUDED.risk_level,
                document = EXCLUDED.document,
                last_updated = EXCLUDED.last_updated
            RETURNING (xmax = 0) AS inserted
            "#,
        )
        .bind(record.record_type().as_str())
        .bind(record.id())
        .bind(record.risk_score() as i16)
        .bind(record.risk_level().as_str())
        .bind(document)
        .bind(record.last_updated())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| Error::StoreWrite {
            id: record.id().to_string(),
            message: e.to_string(),
        })?;

        let inserted: bool = row.try_get("inserted").unwrap_or(false);
        Ok(if inserted {
            UpsertOutcome::Created
        } else {
            UpsertOutcome::Updated
        })
    }

    async fn get_by_id(&self, record_type: RecordType, id: &str) -> Result<Option<PatientRecord>> {
        let document: Option<JsonValue> = sqlx::query_scalar(
            "SELECT document FROM patients WHERE record_type = $1 AND id = $2",
        )
        .bind(record_type.as_str())
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        document.map(Self::decode).transpose()
    }

    async fn list(&self, filter: &PatientFilter) -> Result<Vec<PatientRecord>> {
        let documents: Vec<JsonValue> = sqlx::query_scalar(
            r#"
            SELECT document
            FROM patients
            WHERE ($1::TEXT IS NULL OR record_type = $1)
              AND ($2::TEXT IS NULL OR risk_level = $2)
            ORDER BY record_type ASC, id ASC
            LIMIT $3 OFFSET $4
            "#,
        )
        .bind(filter.record_type.map(|t| t.as_str()))
        .bind(filter.risk_level.map(|l| l.as_str()))
        .bind(filter.limit.map(|l| l as i64))
        .bind(filter.offset as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        documents.into_iter().map(Self::decode).collect()
    }

    async fn count(&self, filter: &PatientFilter) -> Result<usize> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM patients
            WHERE ($1::TEXT IS NULL OR record_type = $1)
              AND ($2::TEXT IS NULL OR risk_level = $2)
            "#,
        )
        .bind(filter.record_type.map(|t| t.as_str()))
        .bind(filter.risk_level.map(|l| l.as_str()))
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(count.max(0) as usize)
    }

    async fn delete(&self, record_type: RecordType, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM patients WHERE record_type = $1 AND id = $2")
            .bind(record_type.as_str())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        Ok(result.rows_affected() > 0)
    }

    fn backend_name(&self) -> &'static str {
        "postgres"
    }
}
