//! Cache key layout
//!
//! List pages live under `<record type>:list:` so a batch can drop every page and filter
//! of one record type with a single prefix delete. Aggregates span both record types and
//! use fixed global keys.

use crate::models::{RecordType, RiskLevel};

pub const DASHBOARD_STATS: &str = "dashboard:stats";
pub const ANALYTICS_INSIGHTS: &str = "analytics:insights";
pub const ANALYTICS_TRENDS: &str = "analytics:trends";

/// Aggregate keys affected by any patient mutation.
pub const GLOBAL_AGGREGATES: [&str; 3] = [DASHBOARD_STATS, ANALYTICS_INSIGHTS, ANALYTICS_TRENDS];

pub fn list_page(
    record_type: RecordType,
    page: usize,
    limit: usize,
    risk_level: Option<RiskLevel>,
) -> String {
    format!(
        "{}:list:page={}:limit={}:level={}",
        record_type,
        page,
        limit,
        risk_level.map_or("all", |l| l.as_str())
    )
}

/// Pattern matching every list page of `record_type`.
pub fn list_pattern(record_type: RecordType) -> String {
    format!("{}:list:*", record_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_pages_fall_under_their_type_pattern() {
        let key = list_page(RecordType::Maternal, 2, 20, Some(RiskLevel::High));
        assert_eq!(key, "maternal:list:page=2:limit=20:level=high");

        let pattern = list_pattern(RecordType::Maternal);
        assert!(key.starts_with(pattern.trim_end_matches('*')));
        assert!(!list_page(RecordType::Pediatric, 1, 20, None)
            .starts_with(pattern.trim_end_matches('*')));
    }
}
