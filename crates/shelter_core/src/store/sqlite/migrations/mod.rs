//! Schema migrations for the embedded document store.
//!
//! # Invariants
//! - Versions are contiguous and start at 1.
//! - A database is either current, behind by a suffix of `MIGRATIONS`, or
//!   newer than this build; the last case never opens.
//! - `PRAGMA user_version` only moves forward, inside the same transaction
//!   as the migration it records.

use crate::store::{StoreError, StoreResult};
use log::info;
use rusqlite::{Connection, Transaction};

#[derive(Debug, Clone, Copy)]
struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "documents",
        sql: include_str!("0001_documents.sql"),
    },
    Migration {
        version: 2,
        name: "typed_doc_ids",
        sql: include_str!("0002_typed_doc_ids.sql"),
    },
];

enum SchemaState {
    Current,
    Behind(&'static [Migration]),
    Newer(u32),
}

/// Returns the latest schema version this build understands.
pub fn latest_version() -> u32 {
    MIGRATIONS.len() as u32
}

/// Brings `conn` up to [`latest_version`] inside one transaction.
///
/// # Errors
/// `UnsupportedSchemaVersion` when the database was written by a newer
/// build, or the SQLite error of the first failing migration.
pub fn apply_migrations(conn: &mut Connection) -> StoreResult<()> {
    let pending = match schema_state(user_version(conn)?) {
        SchemaState::Current => return Ok(()),
        SchemaState::Behind(pending) => pending,
        SchemaState::Newer(db_version) => {
            return Err(StoreError::UnsupportedSchemaVersion {
                db_version,
                latest_supported: latest_version(),
            });
        }
    };

    let tx = conn.transaction()?;
    for migration in pending {
        run(&tx, migration)?;
    }
    tx.commit()?;
    Ok(())
}

fn schema_state(db_version: u32) -> SchemaState {
    let applied = db_version as usize;
    match applied.cmp(&MIGRATIONS.len()) {
        std::cmp::Ordering::Equal => SchemaState::Current,
        std::cmp::Ordering::Less => SchemaState::Behind(&MIGRATIONS[applied..]),
        std::cmp::Ordering::Greater => SchemaState::Newer(db_version),
    }
}

fn run(tx: &Transaction<'_>, migration: &Migration) -> StoreResult<()> {
    tx.execute_batch(migration.sql)?;
    tx.pragma_update(None, "user_version", migration.version)?;
    info!(
        "event=store_migrate module=store status=ok version={} name={}",
        migration.version, migration.name
    );
    Ok(())
}

fn user_version(conn: &Connection) -> StoreResult<u32> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    Ok(version)
}
