//! SQLite-backed document store.
//!
//! # Responsibility
//! - Persist JSON documents per collection in a single SQLite table.
//! - Evaluate filters, updates, projections and group stages in-process.
//!
//! # Invariants
//! - Results come back in insertion order.
//! - `update_many` and `delete_many` run inside one transaction each.
//! - Every stored body carries its `_id`.
//! - `doc_id` holds the JSON text of `_id`, so `1` and `"1"` stay distinct.

use super::matcher::{apply_projection, apply_update, ensure_field_names, group, matches};
use super::{
    DocumentStore, GroupStage, Projection, StoreError, StoreResult, UpdateCounts,
    ANIMALS_COLLECTION,
};
use crate::model::update::NormalizedUpdate;
use crate::model::{Document, RecordId, ID_FIELD};
use rusqlite::{params, Connection};
use serde_json::Value;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

pub mod migrations;
mod open;

pub use open::{open_store, open_store_in_memory};

/// Embedded document store for local development and tests.
pub struct SqliteDocumentStore {
    conn: Mutex<Connection>,
}

struct StoredDocument {
    seq: i64,
    body: Document,
}

impl SqliteDocumentStore {
    /// Wraps a migrated connection, targeting the `animals` collection.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("sqlite connection lock poisoned".to_string()))
    }
}

impl DocumentStore for SqliteDocumentStore {
    fn ping(&self) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.query_row("SELECT 1;", [], |row| row.get::<_, i64>(0))?;
        Ok(())
    }

    fn insert_one(&self, document: &Document) -> StoreResult<Option<RecordId>> {
        ensure_field_names(document)?;
        let mut body = document.clone();
        let id = body
            .entry(ID_FIELD)
            .or_insert_with(|| Value::String(Uuid::new_v4().to_string()))
            .clone();
        let inserted_id = id_text(&id)?;

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO documents (collection, doc_id, body) VALUES (?1, ?2, ?3);",
            params![
                ANIMALS_COLLECTION,
                serde_json::to_string(&id)?,
                serde_json::to_string(&body)?
            ],
        )?;
        Ok(Some(inserted_id))
    }

    fn find(&self, filter: &Document, projection: &Projection) -> StoreResult<Vec<Document>> {
        let conn = self.lock()?;
        let mut found = Vec::new();
        for stored in load_documents(&conn, ANIMALS_COLLECTION)? {
            if matches(&stored.body, filter)? {
                found.push(apply_projection(stored.body, projection)?);
            }
        }
        Ok(found)
    }

    fn update_many(
        &self,
        filter: &Document,
        update: &NormalizedUpdate,
    ) -> StoreResult<UpdateCounts> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut counts = UpdateCounts::default();

        for stored in load_documents(&tx, ANIMALS_COLLECTION)? {
            if !matches(&stored.body, filter)? {
                continue;
            }
            counts.matched += 1;

            let mut next = stored.body.clone();
            apply_update(&mut next, update.as_document())?;
            if next == stored.body {
                continue;
            }

            tx.execute(
                "UPDATE documents
                 SET body = ?1, updated_at = (strftime('%s', 'now') * 1000)
                 WHERE seq = ?2;",
                params![serde_json::to_string(&next)?, stored.seq],
            )?;
            counts.modified += 1;
        }

        tx.commit()?;
        Ok(counts)
    }

    fn delete_many(&self, filter: &Document) -> StoreResult<u64> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut deleted = 0;

        for stored in load_documents(&tx, ANIMALS_COLLECTION)? {
            if matches(&stored.body, filter)? {
                deleted += tx.execute("DELETE FROM documents WHERE seq = ?1;", [stored.seq])? as u64;
            }
        }

        tx.commit()?;
        Ok(deleted)
    }

    fn aggregate_group(&self, stage: &GroupStage) -> StoreResult<Option<Document>> {
        let conn = self.lock()?;
        let documents: Vec<Document> = load_documents(&conn, ANIMALS_COLLECTION)?
            .into_iter()
            .map(|stored| stored.body)
            .collect();
        Ok(group(&documents, stage))
    }
}

fn load_documents(conn: &Connection, collection: &str) -> StoreResult<Vec<StoredDocument>> {
    let mut stmt = conn.prepare(
        "SELECT seq, body
         FROM documents
         WHERE collection = ?1
         ORDER BY seq ASC;",
    )?;
    let mut rows = stmt.query([collection])?;
    let mut documents = Vec::new();

    while let Some(row) = rows.next()? {
        let seq: i64 = row.get("seq")?;
        let text: String = row.get("body")?;
        let body = match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(body)) => body,
            Ok(_) => {
                return Err(StoreError::InvalidData(format!(
                    "document #{seq} is not a JSON object"
                )));
            }
            Err(err) => {
                return Err(StoreError::InvalidData(format!(
                    "document #{seq} is not valid JSON: {err}"
                )));
            }
        };
        documents.push(StoredDocument { seq, body });
    }

    Ok(documents)
}

/// Caller-facing rendering of an identity value.
fn id_text(id: &Value) -> StoreResult<String> {
    match id {
        Value::String(text) => Ok(text.clone()),
        Value::Number(number) => Ok(number.to_string()),
        other => Err(StoreError::InvalidQuery(format!(
            "unsupported `{ID_FIELD}` value `{other}`; expected a string or number"
        ))),
    }
}
