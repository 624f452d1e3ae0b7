//! Data-access layer for the animal shelter outcomes collection.
//! Validation, canned rescue queries and statistics live here; persistence is
//! delegated to a document store.

pub mod config;
pub mod logging;
pub mod model;
pub mod query;
pub mod repo;
pub mod store;

pub use config::{ConfigError, ShelterConfig};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::record::{validate_record, AnimalRecord, ValidationError, REQUIRED_FIELDS};
pub use model::update::{normalize_update, NormalizedUpdate};
pub use model::{Document, RecordId};
pub use query::rescue::{RescueProfile, RescueType};
pub use repo::shelter_repo::{
    AnimalShelter, AnimalStatistics, CreateOutcome, DeleteOutcome, ShelterError, UpdateOutcome,
};
pub use store::{
    open_store, open_store_in_memory, DocumentStore, MongoStore, Projection, SqliteDocumentStore,
    StoreError, StoreResult,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
