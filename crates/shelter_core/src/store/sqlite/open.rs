//! Connection bootstrap for the embedded document store.
//!
//! # Invariants
//! - Returned stores have migrations fully applied.
//! - Every open attempt emits one `store_open` start event and one outcome
//!   event carrying the elapsed time.

use super::migrations::apply_migrations;
use super::SqliteDocumentStore;
use crate::store::StoreResult;
use log::{error, info};
use rusqlite::Connection;
use std::path::Path;
use std::time::{Duration, Instant};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Opens (or creates) a file-backed document store.
pub fn open_store(path: impl AsRef<Path>) -> StoreResult<SqliteDocumentStore> {
    open_with("file", || Connection::open(path))
}

/// Opens a throwaway in-memory document store.
pub fn open_store_in_memory() -> StoreResult<SqliteDocumentStore> {
    open_with("memory", Connection::open_in_memory)
}

fn open_with(
    mode: &str,
    connect: impl FnOnce() -> rusqlite::Result<Connection>,
) -> StoreResult<SqliteDocumentStore> {
    let started_at = Instant::now();
    info!("event=store_open module=store status=start backend=sqlite mode={mode}");

    let mut conn = connect().map_err(|err| {
        error!(
            "event=store_open module=store status=error backend=sqlite mode={mode} duration_ms={} error_code=store_open_failed error={}",
            started_at.elapsed().as_millis(),
            err
        );
        err
    })?;

    match bootstrap_connection(&mut conn) {
        Ok(()) => {
            info!(
                "event=store_open module=store status=ok backend=sqlite mode={mode} duration_ms={}",
                started_at.elapsed().as_millis()
            );
            Ok(SqliteDocumentStore::new(conn))
        }
        Err(err) => {
            error!(
                "event=store_open module=store status=error backend=sqlite mode={mode} duration_ms={} error_code=store_bootstrap_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            Err(err)
        }
    }
}

fn bootstrap_connection(conn: &mut Connection) -> StoreResult<()> {
    conn.busy_timeout(BUSY_TIMEOUT)?;
    apply_migrations(conn)?;
    Ok(())
}
