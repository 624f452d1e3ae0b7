//! MongoDB adapter over the driver's blocking API.
//!
//! # Responsibility
//! - Translate JSON documents to BSON and back at the driver boundary.
//!   Both directions use relaxed extended JSON, so an `_id` read back as
//!   `{"$oid": ...}` filters as an ObjectId again.
//! - Map group stages onto a `$group` aggregation pipeline.
//!
//! # Invariants
//! - One client per store; the driver pools connections internally.
//! - Driver faults surface as `StoreError::Mongo`, never as panics.

use super::{
    Accumulator, DocumentStore, GroupStage, Projection, StoreError, StoreResult, UpdateCounts,
    ANIMALS_COLLECTION,
};
use crate::config::ShelterConfig;
use crate::model::update::NormalizedUpdate;
use crate::model::{Document, RecordId, ID_FIELD};
use bson::{doc, Bson, Document as BsonDocument};
use mongodb::options::FindOptions;
use mongodb::sync::{Client, Collection, Database};
use serde_json::Value;

/// Document store backed by a MongoDB database.
pub struct MongoStore {
    database: Database,
    collection: Collection<BsonDocument>,
}

impl MongoStore {
    /// Builds a client from `config`; no round-trip happens until first use.
    ///
    /// # Errors
    /// Returns an error when the connection string cannot be parsed.
    pub fn connect(config: &ShelterConfig) -> StoreResult<Self> {
        let client = Client::with_uri_str(config.connection_uri())?;
        Ok(Self::from_client(&client, &config.db))
    }

    /// Targets the `animals` collection of `db` on an existing client.
    pub fn from_client(client: &Client, db: &str) -> Self {
        let database = client.database(db);
        let collection = database.collection::<BsonDocument>(ANIMALS_COLLECTION);
        Self {
            database,
            collection,
        }
    }
}

impl DocumentStore for MongoStore {
    fn ping(&self) -> StoreResult<()> {
        self.database.run_command(doc! { "ping": 1 }, None)?;
        Ok(())
    }

    fn insert_one(&self, document: &Document) -> StoreResult<Option<RecordId>> {
        let result = self.collection.insert_one(to_bson(document)?, None)?;
        Ok(record_id(result.inserted_id))
    }

    fn find(&self, filter: &Document, projection: &Projection) -> StoreResult<Vec<Document>> {
        let projection = if projection.is_empty() {
            None
        } else {
            Some(to_bson(projection.as_document())?)
        };
        let options = FindOptions::builder().projection(projection).build();

        let cursor = self.collection.find(to_bson(filter)?, options)?;
        let mut documents = Vec::new();
        for item in cursor {
            documents.push(from_bson(item?)?);
        }
        Ok(documents)
    }

    fn update_many(
        &self,
        filter: &Document,
        update: &NormalizedUpdate,
    ) -> StoreResult<UpdateCounts> {
        let result =
            self.collection
                .update_many(to_bson(filter)?, to_bson(update.as_document())?, None)?;
        Ok(UpdateCounts {
            matched: result.matched_count,
            modified: result.modified_count,
        })
    }

    fn delete_many(&self, filter: &Document) -> StoreResult<u64> {
        let result = self.collection.delete_many(to_bson(filter)?, None)?;
        Ok(result.deleted_count)
    }

    fn aggregate_group(&self, stage: &GroupStage) -> StoreResult<Option<Document>> {
        let mut cursor = self.collection.aggregate(group_pipeline(stage), None)?;
        let Some(row) = cursor.next() else {
            return Ok(None);
        };

        let mut row = row?;
        row.remove(ID_FIELD);
        from_bson(row).map(Some)
    }
}

/// Builds a single `$group` stage keyed on `null`.
pub(crate) fn group_pipeline(stage: &GroupStage) -> Vec<BsonDocument> {
    let mut group = doc! { "_id": Bson::Null };
    for (name, accumulator) in &stage.outputs {
        let expression = match accumulator {
            Accumulator::Count => doc! { "$sum": 1 },
            Accumulator::Average(field) => doc! { "$avg": format!("${field}") },
            Accumulator::DistinctValues(field) => doc! { "$addToSet": format!("${field}") },
        };
        group.insert(name.clone(), expression);
    }
    vec![doc! { "$group": group }]
}

fn to_bson(document: &Document) -> StoreResult<BsonDocument> {
    let converted = Bson::try_from(Value::Object(document.clone()))
        .map_err(|err| StoreError::Encoding(err.to_string()))?;
    match converted {
        Bson::Document(document) => Ok(document),
        other => Err(StoreError::Encoding(format!(
            "expected a document for the driver, got {:?}",
            other.element_type()
        ))),
    }
}

fn from_bson(document: BsonDocument) -> StoreResult<Document> {
    match Bson::Document(document).into_relaxed_extjson() {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Encoding(format!(
            "expected a document from the driver, got `{other}`"
        ))),
    }
}

fn record_id(inserted_id: Bson) -> Option<RecordId> {
    match inserted_id {
        Bson::ObjectId(oid) => Some(oid.to_hex()),
        Bson::String(text) => Some(text),
        Bson::Null | Bson::Undefined => None,
        other => Some(other.to_string()),
    }
}
