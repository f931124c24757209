//! Patient risk records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, ops::RangeInclusive, str::FromStr};

/// Declared record type of a batch or a singleton write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordType {
    Maternal,
    Pediatric,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::Maternal => "maternal",
            RecordType::Pediatric => "pediatric",
        }
    }

    /// Normalized column holding the identity key.
    pub fn identity_column(&self) -> &'static str {
        match self {
            RecordType::Maternal => "patient_id",
            RecordType::Pediatric => "child_id",
        }
    }

    /// Noun used in per-row diagnostics.
    pub fn subject(&self) -> &'static str {
        match self {
            RecordType::Maternal => "patient",
            RecordType::Pediatric => "child",
        }
    }

    pub fn all() -> [RecordType; 2] {
        [RecordType::Maternal, RecordType::Pediatric]
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "maternal" => Ok(RecordType::Maternal),
            "pediatric" | "paediatric" => Ok(RecordType::Pediatric),
            other => Err(crate::Error::Validation(format!(
                "Unknown record type '{}'. Expected 'maternal' or 'pediatric'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "low",
            RiskLevel::Medium => "medium",
            RiskLevel::High => "high",
            RiskLevel::Critical => "critical",
        }
    }

    /// Level band for a 0-100 score.
    pub fn from_score(score: u8) -> Self {
        match score {
            0..=24 => RiskLevel::Low,
            25..=49 => RiskLevel::Medium,
            50..=74 => RiskLevel::High,
            _ => RiskLevel::Critical,
        }
    }

    pub fn all() -> [RiskLevel; 4] {
        [
            RiskLevel::Low,
            RiskLevel::Medium,
            RiskLevel::High,
            RiskLevel::Critical,
        ]
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskLevel {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(RiskLevel::Low),
            "medium" => Ok(RiskLevel::Medium),
            "high" => Ok(RiskLevel::High),
            "critical" => Ok(RiskLevel::Critical),
            other => Err(crate::Error::Validation(format!(
                "Unknown risk level '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MaternalRecord {
    pub patient_id: String,
    pub name: String,
    pub age: u32,
    pub risk_score: u8,
    pub risk_level: RiskLevel,
    pub risk_factors: Vec<String>,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PediatricRecord {
    pub child_id: String,
    pub name: String,
    /// Birth weight in kilograms.
    pub birth_weight: f64,
    pub gestation_weeks: u32,
    pub risk_score: u8,
    pub risk_level: RiskLevel,
    pub risk_factors: Vec<String>,
    pub last_updated: DateTime<Utc>,
}

/// A fully resolved patient record, as persisted by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "recordType", rename_all = "lowercase")]
pub enum PatientRecord {
    Maternal(MaternalRecord),
    Pediatric(PediatricRecord),
}

impl PatientRecord {
    pub fn record_type(&self) -> RecordType {
        match self {
            PatientRecord::Maternal(_) => RecordType::Maternal,
            PatientRecord::Pediatric(_) => RecordType::Pediatric,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            PatientRecord::Maternal(r) => &r.patient_id,
            PatientRecord::Pediatric(r) => &r.child_id,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            PatientRecord::Maternal(r) => &r.name,
            PatientRecord::Pediatric(r) => &r.name,
        }
    }

    pub fn risk_score(&self) -> u8 {
        match self {
            PatientRecord::Maternal(r) => r.risk_score,
            PatientRecord::Pediatric(r) => r.risk_score,
        }
    }

    pub fn risk_level(&self) -> RiskLevel {
        match self {
            PatientRecord::Maternal(r) => r.risk_level,
            PatientRecord::Pediatric(r) => r.risk_level,
        }
    }

    pub fn risk_factors(&self) -> &[String] {
        match self {
            PatientRecord::Maternal(r) => &r.risk_factors,
            PatientRecord::Pediatric(r) => &r.risk_factors,
        }
    }

    pub fn last_updated(&self) -> DateTime<Utc> {
        match self {
            PatientRecord::Maternal(r) => r.last_updated,
            PatientRecord::Pediatric(r) => r.last_updated,
        }
    }
}

pub const MATERNAL_AGE_YEARS: RangeInclusive<u32> = 10..=65;
pub const BIRTH_WEIGHT_KG: RangeInclusive<f64> = 0.2..=8.0;
pub const GESTATION_WEEKS: RangeInclusive<u32> = 20..=45;

/// Record-type specific fields.
#[derive(Debug, Clone, PartialEq)]
pub enum Demographics {
    Maternal { age: u32 },
    Pediatric { birth_weight: f64, gestation_weeks: u32 },
}

impl Demographics {
    pub fn record_type(&self) -> RecordType {
        match self {
            Demographics::Maternal { .. } => RecordType::Maternal,
            Demographics::Pediatric { .. } => RecordType::Pediatric,
        }
    }

    /// Plausibility bounds applied to batch rows and singleton writes alike.
    pub fn check_ranges(&self) -> Result<(), String> {
        match *self {
            Demographics::Maternal { age } => check("age", age, &MATERNAL_AGE_YEARS),
            Demographics::Pediatric {
                birth_weight,
                gestation_weeks,
            } => {
                check("birth_weight", birth_weight, &BIRTH_WEIGHT_KG)?;
                check("gestation_weeks", gestation_weeks, &GESTATION_WEEKS)
            }
        }
    }
}

fn check<T: PartialOrd + fmt::Display>(
    field: &str,
    value: T,
    range: &RangeInclusive<T>,
) -> Result<(), String> {
    if range.contains(&value) {
        Ok(())
    } else {
        Err(format!(
            "{} {} is outside {}-{}",
            field,
            value,
            range.start(),
            range.end()
        ))
    }
}

/// A validated record whose risk score and level may still be missing.
///
/// Drafts are produced from parsed rows and singleton writes, and become a
/// [`PatientRecord`] once the scorer adapter has resolved their risk.
#[derive(Debug, Clone, PartialEq)]
pub struct PatientDraft {
    pub id: String,
    pub name: String,
    pub demographics: Demographics,
    pub risk_factors: Vec<String>,
    pub risk_score: Option<u8>,
    pub risk_level: Option<RiskLevel>,
}

impl PatientDraft {
    pub fn record_type(&self) -> RecordType {
        self.demographics.record_type()
    }

    /// Explicit score and level, when the input supplied both.
    pub fn provided_risk(&self) -> Option<(u8, RiskLevel)> {
        match (self.risk_score, self.risk_level) {
            (Some(score), Some(level)) => Some((score, level)),
            _ => None,
        }
    }

    pub fn into_record(self, score: u8, level: RiskLevel, now: DateTime<Utc>) -> PatientRecord {
        match self.demographics {
            Demographics::Maternal { age } => PatientRecord::Maternal(MaternalRecord {
                patient_id: self.id,
                name: self.name,
                age,
                risk_score: score,
                risk_level: level,
                risk_factors: self.risk_factors,
                last_updated: now,
            }),
            Demographics::Pediatric {
                birth_weight,
                gestation_weeks,
            } => PatientRecord::Pediatric(PediatricRecord {
                child_id: self.id,
                name: self.name,
                birth_weight,
                gestation_weeks,
                risk_score: score,
                risk_level: level,
                risk_factors: self.risk_factors,
                last_updated: now,
            }),
        }
    }
}

/// Filter accepted by [`crate::db::PatientStore::list`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatientFilter {
    pub record_type: Option<RecordType>,
    pub risk_level: Option<RiskLevel>,
    pub offset: usize,
    pub limit: Option<usize>,
}

impl PatientFilter {
    pub fn for_type(record_type: RecordType) -> Self {
        Self {
            record_type: Some(record_type),
            ..Default::default()
        }
    }

    pub fn matches(&self, record: &PatientRecord) -> bool {
        self.record_type
            .map_or(true, |t| t == record.record_type())
            && self.risk_level.map_or(true, |l| l == record.risk_level())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_serializes_with_type_tag_and_camel_case_keys() {
        let draft = PatientDraft {
            id: "M-001".to_string(),
            name: "Ada".to_string(),
            demographics: Demographics::Maternal { age: 31 },
            risk_factors: vec!["anemia".to_string()],
            risk_score: None,
            risk_level: None,
        };
        let record = draft.into_record(40, RiskLevel::Medium, Utc::now());
        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(value["recordType"], "maternal");
        assert_eq!(value["patientId"], "M-001");
        assert_eq!(value["riskLevel"], "medium");

        let back: PatientRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn level_bands_cover_the_score_range() {
        assert_eq!(RiskLevel::from_score(0), RiskLevel::Low);
        assert_eq!(RiskLevel::from_score(25), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(74), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(100), RiskLevel::Critical);
    }

    #[test]
    fn demographics_outside_bounds_are_rejected() {
        assert!(Demographics::Maternal { age: 30 }.check_ranges().is_ok());
        assert_eq!(
            Demographics::Maternal { age: 999 }.check_ranges().unwrap_err(),
            "age 999 is outside 10-65"
        );
        let premature = Demographics::Pediatric {
            birth_weight: 1.1,
            gestation_weeks: 0,
        };
        assert!(premature.check_ranges().is_err());
        let nan = Demographics::Pediatric {
            birth_weight: f64::NAN,
            gestation_weeks: 30,
        };
        assert!(nan.check_ranges().is_err());
    }

    #[test]
    fn record_type_parsing_is_case_insensitive() {
        assert_eq!(" Maternal ".parse::<RecordType>().unwrap(), RecordType::Maternal);
        assert!("neonatal".parse::<RecordType>().is_err());
    }
}
