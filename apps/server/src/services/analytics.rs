//! Dashboard and analytics aggregates
//!
//! Aggregates span both record types and are cached under fixed global keys, which every
//! mutating batch or singleton write invalidates.

use crate::{
    cache::{keys, CacheHandle},
    db::PatientStore,
    models::{PatientFilter, PatientRecord, RecordType, RiskLevel},
    Result,
};
use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
    time::Duration,
};

const TOP_FACTORS: usize = 10;
const PRIORITY_PATIENTS: usize = 10;
const TREND_DAYS: i64 = 30;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeStats {
    pub total: usize,
    pub by_level: BTreeMap<RiskLevel, usize>,
    pub average_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_patients: usize,
    /// High and critical records across both types.
    pub high_risk_patients: usize,
    pub maternal: TypeStats,
    pub pediatric: TypeStats,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FactorCount {
    pub factor: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriorityPatient {
    pub record_type: RecordType,
    pub id: String,
    pub name: String,
    pub risk_score: u8,
    pub risk_level: RiskLevel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Insights {
    pub top_risk_factors: BTreeMap<RecordType, Vec<FactorCount>>,
    pub priority_patients: Vec<PriorityPatient>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyTrend {
    pub date: NaiveDate,
    pub maternal: usize,
    pub pediatric: usize,
    pub high_risk: usize,
    pub average_score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trends {
    pub days: Vec<DailyTrend>,
    pub generated_at: DateTime<Utc>,
}

pub struct AnalyticsService {
    store: Arc<dyn PatientStore>,
    cache: CacheHandle,
    ttl: Duration,
}

impl AnalyticsService {
    pub fn new(store: Arc<dyn PatientStore>, cache: CacheHandle, ttl: Duration) -> Self {
        Self { store, cache, ttl }
    }

    pub async fn dashboard_stats(&self) -> Result<DashboardStats> {
        if let Some(cached) = self.cache.get(keys::DASHBOARD_STATS).await {
            return Ok(cached);
        }
        let stats = dashboard_stats(&self.all_records().await?, Utc::now());
        self.cache.set(keys::DASHBOARD_STATS, &stats, self.ttl).await;
        Ok(stats)
    }

    pub async fn insights(&self) -> Result<Insights> {
        if let Some(cached) = self.cache.get(keys::ANALYTICS_INSIGHTS).await {
            return Ok(cached);
        }
        let insights = insights(&self.all_records().await?, Utc::now());
        self.cache.set(keys::ANALYTICS_INSIGHTS, &insights, self.ttl).await;
        Ok(insights)
    }

    pub async fn trends(&self) -> Result<Trends> {
        if let Some(cached) = self.cache.get(keys::ANALYTICS_TRENDS).await {
            return Ok(cached);
        }
        let trends = trends(&self.all_records().await?, Utc::now());
        self.cache.set(keys::ANALYTICS_TRENDS, &trends, self.ttl).await;
        Ok(trends)
    }

    async fn all_records(&self) -> Result<Vec<PatientRecord>> {
        self.store.list(&PatientFilter::default()).await
    }
}

fn type_stats<'a>(records: impl Iterator<Item = &'a PatientRecord>) -> TypeStats {
    let mut stats = TypeStats::default();
    let mut score_sum = 0u64;
    for record in records {
        stats.total += 1;
        score_sum += u64::from(record.risk_score());
        *stats.by_level.entry(record.risk_level()).or_default() += 1;
    }
    if stats.total > 0 {
        stats.average_score = round1(score_sum as f64 / stats.total as f64);
    }
    stats
}

fn is_high_risk(record: &PatientRecord) -> bool {
    record.risk_level() >= RiskLevel::High
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

pub fn dashboard_stats(records: &[PatientRecord], now: DateTime<Utc>) -> DashboardStats {
    let of_type = |t: RecordType| records.iter().filter(move |r| r.record_type() == t);
    DashboardStats {
        total_patients: records.len(),
        high_risk_patients: records.iter().filter(|r| is_high_risk(r)).count(),
        maternal: type_stats(of_type(RecordType::Maternal)),
        pediatric: type_stats(of_type(RecordType::Pediatric)),
        generated_at: now,
    }
}

pub fn insights(records: &[PatientRecord], now: DateTime<Utc>) -> Insights {
    let mut top_risk_factors = BTreeMap::new();
    for record_type in RecordType::all() {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for record in records.iter().filter(|r| r.record_type() == record_type) {
            for factor in record.risk_factors() {
                *counts.entry(factor.to_lowercase()).or_default() += 1;
            }
        }
        let mut ranked: Vec<FactorCount> = counts
            .into_iter()
            .map(|(factor, count)| FactorCount { factor, count })
            .collect();
        ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.factor.cmp(&b.factor)));
        ranked.truncate(TOP_FACTORS);
        top_risk_factors.insert(record_type, ranked);
    }

    let mut priority: Vec<&PatientRecord> = records.iter().filter(|r| is_high_risk(r)).collect();
    priority.sort_by(|a, b| {
        b.risk_score()
            .cmp(&a.risk_score())
            .then_with(|| a.record_type().cmp(&b.record_type()))
            .then_with(|| a.id().cmp(b.id()))
    });
    let priority_patients = priority
        .into_iter()
        .take(PRIORITY_PATIENTS)
        .map(|r| PriorityPatient {
            record_type: r.record_type(),
            id: r.id().to_string(),
            name: r.name().to_string(),
            risk_score: r.risk_score(),
            risk_level: r.risk_level(),
        })
        .collect();

    Insights {
        top_risk_factors,
        priority_patients,
        generated_at: now,
    }
}

/// Daily counts of records last updated in the trailing window, oldest day first.
pub fn trends(records: &[PatientRecord], now: DateTime<Utc>) -> Trends {
    let today = now.date_naive();
    let first_day = today - ChronoDuration::days(TREND_DAYS - 1);

    let mut by_day: BTreeMap<NaiveDate, (DailyTrend, u64)> = BTreeMap::new();
    for offset in 0..TREND_DAYS {
        let date = first_day + ChronoDuration::days(offset);
        by_day.insert(
            date,
            (
                DailyTrend {
                    date,
                    ..Default::default()
                },
                0,
            ),
        );
    }

    for record in records {
        let Some((day, score_sum)) = by_day.get_mut(&record.last_updated().date_naive()) else {
            continue;
        };
        match record.record_type() {
            RecordType::Maternal => day.maternal += 1,
            RecordType::Pediatric => day.pediatric += 1,
        }
        if is_high_risk(record) {
            day.high_risk += 1;
        }
        *score_sum += u64::from(record.risk_score());
    }

    let days = by_day
        .into_values()
        .map(|(mut day, score_sum)| {
            let count = day.maternal + day.pediatric;
            if count > 0 {
                day.average_score = round1(score_sum as f64 / count as f64);
            }
            day
        })
        .collect();

    Trends {
        days,
        generated_at: now,
    }
}
