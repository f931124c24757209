//! Business logic layer
//!
//! Services coordinate the store, the scorer adapter, the job queue and the read-side
//! cache. Handlers and workers only talk to services.

pub mod analytics;
pub mod ingest;
pub mod parser;
pub mod patients;
pub mod scorer;

pub use analytics::AnalyticsService;
pub use ingest::{BatchProcessor, IngestService, ProgressSink, SubmitOutcome, Upload};
pub use patients::PatientService;
pub use scorer::{HttpRiskScorer, RiskScorer, ScorerAdapter};
