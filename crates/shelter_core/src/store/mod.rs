//! Document-store collaborator contract and adapters.
//!
//! # Responsibility
//! - Define the primitive operations the repository needs from a document
//!   database.
//! - Keep driver details (MongoDB, SQLite) behind one trait.
//!
//! # Invariants
//! - Adapters never normalize or validate; they execute what they are given.
//! - Update calls only accept operator-wrapped payloads (`NormalizedUpdate`).

use crate::model::update::NormalizedUpdate;
use crate::model::{Document, RecordId};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod matcher;
pub mod mongo;
pub mod sqlite;

pub use mongo::MongoStore;
pub use sqlite::{open_store, open_store_in_memory, SqliteDocumentStore};

/// Name of the collection holding shelter records.
pub const ANIMALS_COLLECTION: &str = "animals";

pub type StoreResult<T> = Result<T, StoreError>;

/// Collaborator-level fault: connectivity, driver, constraint or bad query.
#[derive(Debug)]
pub enum StoreError {
    Mongo(mongodb::error::Error),
    Sqlite(rusqlite::Error),
    /// Document could not be converted to or from the driver encoding.
    Encoding(String),
    /// Filter, update or projection uses an unsupported construct.
    InvalidQuery(String),
    /// Persisted data does not decode to a document.
    InvalidData(String),
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
    /// The store handle can no longer be used.
    Unavailable(String),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mongo(err) => write!(f, "{err}"),
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::Encoding(message) => write!(f, "document encoding failed: {message}"),
            Self::InvalidQuery(message) => write!(f, "invalid query: {message}"),
            Self::InvalidData(message) => write!(f, "invalid stored document: {message}"),
            Self::UnsupportedSchemaVersion {
                db_version,
                latest_supported,
            } => write!(
                f,
                "store schema version {db_version} is newer than supported {latest_supported}"
            ),
            Self::Unavailable(message) => write!(f, "store unavailable: {message}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Mongo(err) => Some(err),
            Self::Sqlite(err) => Some(err),
            _ => None,
        }
    }
}

impl From<mongodb::error::Error> for StoreError {
    fn from(value: mongodb::error::Error) -> Self {
        Self::Mongo(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(value: serde_json::Error) -> Self {
        Self::Encoding(value.to_string())
    }
}

/// Field inclusion/exclusion map applied to `find` results.
///
/// Truthy values include a field, falsy values exclude it. Mixing inclusion
/// and exclusion is only allowed for `_id`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Projection(Document);

impl Projection {
    pub fn new(fields: Document) -> Self {
        Self(fields)
    }

    /// Projection that hides the store-assigned identity.
    pub fn exclude_id() -> Self {
        let mut fields = Document::new();
        fields.insert(crate::model::ID_FIELD.to_string(), false.into());
        Self(fields)
    }

    pub fn as_document(&self) -> &Document {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Counts reported by a multi-document update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UpdateCounts {
    pub matched: u64,
    pub modified: u64,
}

/// Accumulator applied across every document in a group stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Accumulator {
    /// `$sum: 1`.
    Count,
    /// `$avg` over numeric values of a field; non-numeric values are skipped.
    Average(String),
    /// `$addToSet` of a field's distinct values; missing values are skipped.
    DistinctValues(String),
}

/// Single-group aggregation (`_id: null`) with named accumulators.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GroupStage {
    pub outputs: Vec<(String, Accumulator)>,
}

impl GroupStage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, accumulator: Accumulator) -> Self {
        self.outputs.push((name.into(), accumulator));
        self
    }
}

/// Primitive operations offered by a document database collection.
///
/// Implementations must be safe to share between threads; isolation of
/// individual calls is the store's own responsibility.
pub trait DocumentStore: Send + Sync {
    /// Verifies the store is reachable.
    fn ping(&self) -> StoreResult<()>;

    /// Inserts one document, returning the identity assigned to it.
    fn insert_one(&self, document: &Document) -> StoreResult<Option<RecordId>>;

    /// Returns every document matching `filter`, in store order.
    fn find(&self, filter: &Document, projection: &Projection) -> StoreResult<Vec<Document>>;

    /// Applies `update` to every document matching `filter`.
    fn update_many(&self, filter: &Document, update: &NormalizedUpdate)
        -> StoreResult<UpdateCounts>;

    /// Deletes every document matching `filter`, returning the deleted count.
    fn delete_many(&self, filter: &Document) -> StoreResult<u64>;

    /// Runs a single-group aggregation over the whole collection.
    ///
    /// Returns `None` when the collection is empty and no group row exists.
    fn aggregate_group(&self, stage: &GroupStage) -> StoreResult<Option<Document>>;
}

impl<S: DocumentStore + ?Sized> DocumentStore for &S {
    fn ping(&self) -> StoreResult<()> {
        (**self).ping()
    }

    fn insert_one(&self, document: &Document) -> StoreResult<Option<RecordId>> {
        (**self).insert_one(document)
    }

    fn find(&self, filter: &Document, projection: &Projection) -> StoreResult<Vec<Document>> {
        (**self).find(filter, projection)
    }

    fn update_many(
        &self,
        filter: &Document,
        update: &NormalizedUpdate,
    ) -> StoreResult<UpdateCounts> {
        (**self).update_many(filter, update)
    }

    fn delete_many(&self, filter: &Document) -> StoreResult<u64> {
        (**self).delete_many(filter)
    }

    fn aggregate_group(&self, stage: &GroupStage) -> StoreResult<Option<Document>> {
        (**self).aggregate_group(stage)
    }
}
