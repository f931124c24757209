//! Risk scorer adapter
//!
//! Resolves the risk score and level of a [`PatientDraft`]:
//! - explicit score and level from the input are passed through untouched;
//! - otherwise the external inference service is asked for a prediction;
//! - if that call fails, times out, or no service is configured, a deterministic
//!   heuristic is used instead.
//!
//! Every resolution is tagged with its [`ScoreSource`] so fallback scores can be told
//! apart from model scores in logs.

use crate::{
    config::ScorerConfig,
    models::{Demographics, PatientDraft, RecordType, RiskLevel},
    Error, Result,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc, time::Duration};

/// Minimal features sent to the inference service.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum RiskFeatures {
    Maternal(MaternalFeatures),
    Pediatric(PediatricFeatures),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MaternalFeatures {
    pub age: u32,
    pub risk_factors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PediatricFeatures {
    pub birth_weight: f64,
    pub gestation_weeks: u32,
    pub risk_factors: Vec<String>,
}

impl RiskFeatures {
    pub fn from_draft(draft: &PatientDraft) -> Self {
        match draft.demographics {
            Demographics::Maternal { age } => RiskFeatures::Maternal(MaternalFeatures {
                age,
                risk_factors: draft.risk_factors.clone(),
            }),
            Demographics::Pediatric {
                birth_weight,
                gestation_weeks,
            } => RiskFeatures::Pediatric(PediatricFeatures {
                birth_weight,
                gestation_weeks,
                risk_factors: draft.risk_factors.clone(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prediction {
    pub risk_score: u8,
    pub risk_level: RiskLevel,
}

/// External risk inference service.
#[async_trait]
pub trait RiskScorer: Send + Sync {
    async fn predict(&self, record_type: RecordType, features: &RiskFeatures)
        -> Result<Prediction>;
}

/// HTTP client for the inference service (`POST {base_url}/predict`).
pub struct HttpRiskScorer {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpRiskScorer {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to build scorer client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: format!("{}/predict", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl RiskScorer for HttpRiskScorer {
    async fn predict(
        &self,
        record_type: RecordType,
        features: &RiskFeatures,
    ) -> Result<Prediction> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({
                "type": record_type,
                "features": features,
            }))
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::ScorerUnavailable(e.to_string()))?;

        response
            .json::<Prediction>()
            .await
            .map_err(|e| Error::ScorerUnavailable(format!("Invalid prediction payload: {}", e)))
    }
}

/// Where a resolved score came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreSource {
    Provided,
    Model,
    Fallback,
}

impl ScoreSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScoreSource::Provided => "provided",
            ScoreSource::Model => "model",
            ScoreSource::Fallback => "fallback",
        }
    }
}

impl fmt::Display for ScoreSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub score: u8,
    pub level: RiskLevel,
    pub source: ScoreSource,
}

pub struct ScorerAdapter {
    scorer: Option<Arc<dyn RiskScorer>>,
    timeout: Duration,
}

impl ScorerAdapter {
    pub fn new(scorer: Option<Arc<dyn RiskScorer>>, timeout: Duration) -> Self {
        Self { scorer, timeout }
    }

    /// Adapter that always uses the fallback heuristic.
    pub fn fallback_only() -> Self {
        Self::new(None, Duration::from_secs(1))
    }

    /// Adapter over the HTTP inference service named in `config`, if any.
    pub fn from_config(config: &ScorerConfig) -> Result<Self> {
        let scorer: Option<Arc<dyn RiskScorer>> = match config.url.as_deref() {
            Some(url) => Some(Arc::new(HttpRiskScorer::new(url, config.timeout())?)),
            None => {
                tracing::info!("No risk scorer configured; using fallback heuristic only");
                None
            }
        };
        Ok(Self::new(scorer, config.timeout()))
    }

    pub fn has_scorer(&self) -> bool {
        self.scorer.is_some()
    }

    pub async fn resolve(&self, draft: &PatientDraft) -> Resolution {
        if let Some((score, level)) = draft.provided_risk() {
            return Resolution {
                score,
                level,
                source: ScoreSource::Provided,
            };
        }

        let Some(scorer) = &self.scorer else {
            return self.fallback(draft, "no scorer configured");
        };

        let features = RiskFeatures::from_draft(draft);
        let outcome = tokio::time::timeout(
            self.timeout,
            scorer.predict(draft.record_type(), &features),
        )
        .await;

        match outcome {
            Ok(Ok(prediction)) if prediction.risk_score <= 100 => {
                tracing::debug!(
                    record_type = %draft.record_type(),
                    id = %draft.id,
                    score = prediction.risk_score,
                    level = %prediction.risk_level,
                    score_source = ScoreSource::Model.as_str(),
                    "Risk resolved by model"
                );
                Resolution {
                    score: prediction.risk_score,
                    level: prediction.risk_level,
                    source: ScoreSource::Model,
                }
            }
            Ok(Ok(prediction)) => self.fallback(
                draft,
                &format!("score {} out of range", prediction.risk_score),
            ),
            Ok(Err(e)) => self.fallback(draft, &e.to_string()),
            Err(_) => self.fallback(
                draft,
                &format!("timed out after {}ms", self.timeout.as_millis()),
            ),
        }
    }

    fn fallback(&self, draft: &PatientDraft, reason: &str) -> Resolution {
        let (score, level) = fallback_risk(draft);
        tracing::warn!(
            record_type = %draft.record_type(),
            id = %draft.id,
            score,
            level = %level,
            score_source = ScoreSource::Fallback.as_str(),
            reason,
            "Risk resolved by fallback heuristic"
        );
        Resolution {
            score,
            level,
            source: ScoreSource::Fallback,
        }
    }
}

/// Deterministic risk heuristic used when inference is unavailable.
pub fn fallback_risk(draft: &PatientDraft) -> (u8, RiskLevel) {
    let factor_points = (draft.risk_factors.len() as u32 * 12).min(60);

    let demographic_points = match draft.demographics {
        Demographics::Maternal { age } => {
            let mut points = 0;
            if age < 18 {
                points += 15;
            }
            if age >= 35 {
                points += 15;
            }
            if age >= 40 {
                points += 10;
            }
            points
        }
        Demographics::Pediatric {
            birth_weight,
            gestation_weeks,
        } => {
            let mut points = 0;
            if birth_weight < 2.5 {
                points += 20;
            }
            if birth_weight < 1.5 {
                points += 15;
            }
            if gestation_weeks < 37 {
                points += 15;
            }
            if gestation_weeks < 32 {
                points += 15;
            }
            points
        }
    };

    let score = (10 + factor_points + demographic_points).min(100) as u8;
    (score, RiskLevel::from_score(score))
}
