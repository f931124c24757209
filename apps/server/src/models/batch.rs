//! Batch accounting

use serde::{Deserialize, Serialize};

/// Maximum number of diagnostic messages carried in a [`BatchSummary`].
pub const MAX_REPORTED_ERRORS: usize = 10;

/// Outcome of one batch. Produced once by [`BatchAccountant::finish`] and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    records_processed: usize,
    records_success: usize,
    records_failed: usize,
    errors: Vec<String>,
}

impl BatchSummary {
    pub fn records_processed(&self) -> usize {
        self.records_processed
    }

    pub fn records_success(&self) -> usize {
        self.records_success
    }

    pub fn records_failed(&self) -> usize {
        self.records_failed
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }
}

/// Accumulates per-row outcomes for a batch.
#[derive(Debug, Default)]
pub struct BatchAccountant {
    success: usize,
    failed: usize,
    errors: Vec<String>,
}

impl BatchAccountant {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&mut self) {
        self.success += 1;
    }

    /// Counts a failed row. Messages beyond the cap are dropped, the count is not.
    pub fn record_failure(&mut self, message: impl Into<String>) {
        self.failed += 1;
        if self.errors.len() < MAX_REPORTED_ERRORS {
            self.errors.push(message.into());
        }
    }

    pub fn success_count(&self) -> usize {
        self.success
    }

    pub fn processed_count(&self) -> usize {
        self.success + self.failed
    }

    pub fn finish(self) -> BatchSummary {
        BatchSummary {
            records_processed: self.success + self.failed,
            records_success: self.success,
            records_failed: self.failed,
            errors: self.errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_are_conserved() {
        let mut acc = BatchAccountant::new();
        acc.record_success();
        acc.record_failure("Missing required fields for patient unknown");
        acc.record_success();
        let summary = acc.finish();

        assert_eq!(summary.records_processed(), 3);
        assert_eq!(summary.records_success(), 2);
        assert_eq!(summary.records_failed(), 1);
        assert_eq!(
            summary.errors(),
            ["Missing required fields for patient unknown"]
        );
    }

    #[test]
    fn error_list_is_capped_but_counts_are_not() {
        let mut acc = BatchAccountant::new();
        for i in 0..25 {
            acc.record_failure(format!("row {i} failed"));
        }
        let summary = acc.finish();

        assert_eq!(summary.records_failed(), 25);
        assert_eq!(summary.records_processed(), 25);
        assert_eq!(summary.errors().len(), MAX_REPORTED_ERRORS);
        assert_eq!(summary.errors()[0], "row 0 failed");
    }

    #[test]
    fn summary_serializes_camel_case() {
        let mut acc = BatchAccountant::new();
        acc.record_success();
        let value = serde_json::to_value(acc.finish()).unwrap();
        assert_eq!(value["recordsProcessed"], 1);
        assert_eq!(value["recordsSuccess"], 1);
        assert_eq!(value["recordsFailed"], 0);
        assert!(value["errors"].as_array().unwrap().is_empty());
    }
}
