//! Record parser
//!
//! Turns raw CSV input into [`RawRow`]s and validates each row into a typed
//! [`PatientDraft`]. Header names are normalized (trimmed, lowercased, spaces become
//! underscores), so `"Risk Score"` and `"risk_score"` address the same column. Only the
//! columns known for the declared record type are kept.
//!
//! Tokenization failures are fatal for the whole batch ([`Error::Parse`]); validation
//! failures are per row ([`Error::RowValidation`]).

use crate::{
    models::{Demographics, PatientDraft, RecordType, RiskLevel},
    Error, Result,
};
use std::{collections::HashMap, io::Read};

const MATERNAL_COLUMNS: &[&str] = &[
    "patient_id",
    "name",
    "age",
    "risk_score",
    "risk_level",
    "risk_factors",
];

const PEDIATRIC_COLUMNS: &[&str] = &[
    "child_id",
    "name",
    "birth_weight",
    "gestation_weeks",
    "risk_score",
    "risk_level",
    "risk_factors",
];

pub fn known_columns(record_type: RecordType) -> &'static [&'static str] {
    match record_type {
        RecordType::Maternal => MATERNAL_COLUMNS,
        RecordType::Pediatric => PEDIATRIC_COLUMNS,
    }
}

/// Normalize a header cell: trim, lowercase, inner whitespace runs to `_`.
pub fn normalize_header(raw: &str) -> String {
    raw.trim()
        .trim_start_matches('\u{feff}')
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .to_lowercase()
}

/// One data row keyed by normalized column name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    line: u64,
    values: HashMap<&'static str, String>,
}

impl RawRow {
    /// 1-based line number of the row in the source file.
    pub fn line(&self) -> u64 {
        self.line
    }

    /// Non-empty, trimmed value of a column.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.values
            .get(column)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

/// Lazy iterator over the data rows of a batch.
pub struct RowIter<R: Read> {
    records: csv::StringRecordsIntoIter<R>,
    columns: Vec<Option<&'static str>>,
}

impl<R: Read> Iterator for RowIter<R> {
    type Item = Result<RawRow>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let record = match self.records.next()? {
                Ok(record) => record,
                Err(e) => return Some(Err(csv_error(&e))),
            };

            if record.iter().all(|field| field.trim().is_empty()) {
                continue;
            }

            let line = record.position().map(|p| p.line()).unwrap_or_default();
            if record.len() != self.columns.len() {
                return Some(Err(Error::parse(
                    Some(line),
                    format!(
                        "expected {} fields, found {}",
                        self.columns.len(),
                        record.len()
                    ),
                )));
            }

            let values = self
                .columns
                .iter()
                .zip(record.iter())
                .filter_map(|(column, value)| column.map(|c| (c, value.to_string())))
                .collect();

            return Some(Ok(RawRow { line, values }));
        }
    }
}

/// Read the header row and return an iterator over the data rows.
pub fn parse_rows<R: Read>(input: R, record_type: RecordType) -> Result<RowIter<R>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        // Whitespace-only lines tokenize as one field; width is checked per row instead.
        .flexible(true)
        .from_reader(input);

    let headers = reader.headers().map_err(|e| csv_error(&e))?.clone();
    if headers.iter().all(|h| h.trim().is_empty()) {
        return Err(Error::parse(Some(1), "missing header row"));
    }

    let known = known_columns(record_type);
    let mut columns = Vec::with_capacity(headers.len());
    for header in headers.iter() {
        let normalized = normalize_header(header);
        let column = known.iter().copied().find(|k| *k == normalized);
        if let Some(c) = column {
            if columns.contains(&Some(c)) {
                return Err(Error::parse(
                    Some(1),
                    format!("duplicate column '{}'", c),
                ));
            }
        }
        columns.push(column);
    }

    if columns.iter().all(Option::is_none) {
        return Err(Error::parse(
            Some(1),
            format!("header row has no recognised {} columns", record_type),
        ));
    }

    Ok(RowIter {
        records: reader.into_records(),
        columns,
    })
}

/// Parse the whole batch. Any tokenization failure aborts with no rows returned.
pub fn parse_all<R: Read>(input: R, record_type: RecordType) -> Result<Vec<RawRow>> {
    parse_rows(input, record_type)?.collect()
}

fn csv_error(e: &csv::Error) -> Error {
    let line = e.position().map(|p| p.line());
    let message = match e.kind() {
        csv::ErrorKind::UnequalLengths {
            expected_len, len, ..
        } => format!("expected {} fields, found {}", expected_len, len),
        csv::ErrorKind::Utf8 { .. } => "input is not valid UTF-8".to_string(),
        _ => e.to_string(),
    };
    Error::parse(line, message)
}

/// Split a risk factor cell on `;`, `|` or `,`, dropping blanks.
pub fn split_risk_factors(raw: &str) -> Vec<String> {
    raw.split(|c| matches!(c, ';' | '|' | ','))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Validate a parsed row into a typed draft.
pub fn to_draft(row: &RawRow, record_type: RecordType) -> Result<PatientDraft> {
    let subject = record_type.subject();
    let id = row.get(record_type.identity_column());
    let name = row.get("name");
    let risk_factors = row.get("risk_factors").map(split_risk_factors);

    let missing = || {
        Error::RowValidation(format!(
            "Missing required fields for {} {}",
            subject,
            id.unwrap_or("unknown")
        ))
    };

    let (Some(id), Some(name)) = (id, name) else {
        return Err(missing());
    };
    let risk_factors = match risk_factors {
        Some(factors) if !factors.is_empty() => factors,
        _ => return Err(missing()),
    };

    let demographics = match record_type {
        RecordType::Maternal => {
            let age = row.get("age").ok_or_else(missing)?;
            Demographics::Maternal {
                age: parse_number(age, "age", subject, id)?,
            }
        }
        RecordType::Pediatric => {
            let (Some(weight), Some(weeks)) = (row.get("birth_weight"), row.get("gestation_weeks"))
            else {
                return Err(missing());
            };
            Demographics::Pediatric {
                birth_weight: parse_number(weight, "birth_weight", subject, id)?,
                gestation_weeks: parse_number(weeks, "gestation_weeks", subject, id)?,
            }
        }
    };
    demographics.check_ranges().map_err(|reason| {
        Error::RowValidation(format!("Out of range value for {} {}: {}", subject, id, reason))
    })?;

    let risk_score = row
        .get("risk_score")
        .map(|raw| parse_score(raw, subject, id))
        .transpose()?;
    let risk_level = row
        .get("risk_level")
        .map(|raw| {
            raw.parse::<RiskLevel>()
                .map_err(|_| invalid("risk_level", raw, subject, id))
        })
        .transpose()?;

    Ok(PatientDraft {
        id: id.to_string(),
        name: name.to_string(),
        demographics,
        risk_factors,
        risk_score,
        risk_level,
    })
}

fn parse_number<T: std::str::FromStr>(
    raw: &str,
    field: &str,
    subject: &str,
    id: &str,
) -> Result<T> {
    raw.parse::<T>().map_err(|_| invalid(field, raw, subject, id))
}

fn parse_score(raw: &str, subject: &str, id: &str) -> Result<u8> {
    let value: f64 = parse_number(raw, "risk_score", subject, id)?;
    if !value.is_finite() || !(0.0..=100.0).contains(&value) {
        return Err(Error::RowValidation(format!(
            "Invalid risk_score '{}' for {} {} (expected 0-100)",
            raw, subject, id
        )));
    }
    Ok(value.round() as u8)
}

fn invalid(field: &str, raw: &str, subject: &str, id: &str) -> Error {
    Error::RowValidation(format!(
        "Invalid {} '{}' for {} {}",
        field, raw, subject, id
    ))
}
