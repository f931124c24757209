//! Persistence layer

pub mod memory;
pub mod pool;
pub mod store;
pub mod traits;

pub use memory::InMemoryPatientStore;
pub use pool::{create_pool, run_migrations, PoolRole};
pub use store::PostgresPatientStore;
pub use traits::{PatientStore, UpsertOutcome};
