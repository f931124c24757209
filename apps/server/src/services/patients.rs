//! Singleton patient reads and writes, and cached list pages

use crate::{
    cache::{keys, CacheHandle, CacheInvalidator},
    db::{PatientStore, UpsertOutcome},
    models::{Demographics, PatientDraft, PatientFilter, PatientRecord, RecordType, RiskLevel},
    services::{parser::split_risk_factors, scorer::ScorerAdapter},
    Error, Result,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use validator::Validate;

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const MAX_PAGE_SIZE: usize = 100;

/// Body of `PUT /api/patients/:record_type/:id`.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PatientInput {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub age: Option<u32>,
    pub birth_weight: Option<f64>,
    pub gestation_weeks: Option<u32>,
    #[validate(length(min = 1))]
    pub risk_factors: Vec<String>,
    #[validate(range(max = 100))]
    pub risk_score: Option<u8>,
    pub risk_level: Option<RiskLevel>,
}

impl PatientInput {
    /// Convert into a draft for `id`, requiring the demographics of `record_type`.
    pub fn into_draft(self, record_type: RecordType, id: &str) -> Result<PatientDraft> {
        self.validate()
            .map_err(|e| Error::Validation(e.to_string()))?;

        let id = id.trim();
        if id.is_empty() {
            return Err(Error::Validation(format!(
                "{} must not be empty",
                record_type.identity_column()
            )));
        }

        let demographics = match record_type {
            RecordType::Maternal => Demographics::Maternal {
                age: self
                    .age
                    .ok_or_else(|| Error::Validation("age is required".to_string()))?,
            },
            RecordType::Pediatric => match (self.birth_weight, self.gestation_weeks) {
                (Some(birth_weight), Some(gestation_weeks)) => Demographics::Pediatric {
                    birth_weight,
                    gestation_weeks,
                },
                _ => {
                    return Err(Error::Validation(
                        "birthWeight and gestationWeeks are required".to_string(),
                    ))
                }
            },
        };
        demographics.check_ranges().map_err(Error::Validation)?;

        let risk_factors: Vec<String> = self
            .risk_factors
            .iter()
            .flat_map(|f| split_risk_factors(f))
            .collect();
        if risk_factors.is_empty() {
            return Err(Error::Validation(
                "riskFactors must contain at least one entry".to_string(),
            ));
        }

        Ok(PatientDraft {
            id: id.to_string(),
            name: self.name.trim().to_string(),
            demographics,
            risk_factors,
            risk_score: self.risk_score,
            risk_level: self.risk_level,
        })
    }
}

/// Query of a paginated list read.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub page: Option<usize>,
    pub limit: Option<usize>,
    #[serde(alias = "risk_level")]
    pub risk_level: Option<RiskLevel>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: usize,
    pub limit: usize,
    pub total: usize,
    pub total_pages: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientPage {
    pub data: Vec<PatientRecord>,
    pub pagination: Pagination,
}

pub struct PatientService {
    store: Arc<dyn PatientStore>,
    scorer: Arc<ScorerAdapter>,
    cache: CacheHandle,
    invalidator: CacheInvalidator,
    list_ttl: Duration,
}

impl PatientService {
    pub fn new(
        store: Arc<dyn PatientStore>,
        scorer: Arc<ScorerAdapter>,
        cache: CacheHandle,
        list_ttl: Duration,
    ) -> Self {
        Self {
            store,
            scorer,
            invalidator: CacheInvalidator::new(cache.clone()),
            cache,
            list_ttl,
        }
    }

    pub async fn list(&self, record_type: RecordType, query: ListQuery) -> Result<PatientPage> {
        let page = query.page.unwrap_or(1).max(1);
        let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let key = keys::list_page(record_type, page, limit, query.risk_level);

        if let Some(cached) = self.cache.get::<PatientPage>(&key).await {
            tracing::debug!(key = %key, "List page served from cache");
            return Ok(cached);
        }

        let filter = PatientFilter {
            record_type: Some(record_type),
            risk_level: query.risk_level,
            offset: (page - 1).saturating_mul(limit),
            limit: Some(limit),
        };
        let data = self.store.list(&filter).await?;
        let total = self.store.count(&filter).await?;

        let result = PatientPage {
            data,
            pagination: Pagination {
                page,
                limit,
                total,
                total_pages: total.div_ceil(limit),
            },
        };
        self.cache.set(&key, &result, self.list_ttl).await;
        Ok(result)
    }

    pub async fn get(&self, record_type: RecordType, id: &str) -> Result<PatientRecord> {
        self.store
            .get_by_id(record_type, id)
            .await?
            .ok_or_else(|| not_found(record_type, id))
    }

    /// Create or fully replace a record, resolving its risk like a batch row would.
    pub async fn upsert(
        &self,
        record_type: RecordType,
        id: &str,
        input: PatientInput,
    ) -> Result<(PatientRecord, UpsertOutcome)> {
        let draft = input.into_draft(record_type, id)?;
        let resolution = self.scorer.resolve(&draft).await;
        let record = draft.into_record(resolution.score, resolution.level, Utc::now());

        let outcome = self.store.create_or_update(&record).await?;
        self.invalidator.invalidate_record_type(record_type).await;

        tracing::info!(
            record_type = %record_type,
            id = %record.id(),
            outcome = ?outcome,
            score_source = resolution.source.as_str(),
            "Patient record written"
        );
        Ok((record, outcome))
    }

    pub async fn delete(&self, record_type: RecordType, id: &str) -> Result<()> {
        if !self.store.delete(record_type, id).await? {
            return Err(not_found(record_type, id));
        }
        self.invalidator.invalidate_record_type(record_type).await;
        tracing::info!(record_type = %record_type, id, "Patient record deleted");
        Ok(())
    }
}

fn not_found(record_type: RecordType, id: &str) -> Error {
    Error::NotFound {
        entity: format!("{} record", record_type),
        id: id.to_string(),
    }
}
