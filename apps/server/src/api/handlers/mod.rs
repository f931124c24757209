pub mod analytics;
pub mod health;
pub mod ingest;
pub mod jobs;
pub mod patients;
