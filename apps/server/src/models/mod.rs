//! Domain models

pub mod batch;
pub mod patient;

pub use batch::{BatchAccountant, BatchSummary, MAX_REPORTED_ERRORS};
pub use patient::{
    Demographics, MaternalRecord, PatientDraft, PatientFilter, PatientRecord, PediatricRecord,
    RecordType, RiskLevel,
};
