// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded relational database backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! Every table maps a row id to the row serialized as JSON bytes:
//!
//! - `users`: user id → StoredUser
//! - `organizations`: organization id → Organization
//! - `memberships`: membership id → Membership
//! - `stores`: store id → Store
//! - `store_staff`: staff id → StoreStaff
//! - `custom_roles`: custom role id → CustomRole
//! - `role_requests`: request id → CustomRoleRequest
//! - `notifications`: notification id → Notification
//!
//! Multi-row writes go through [`PlatformDb::write`], which runs a closure
//! inside one redb write transaction and commits only when it returns `Ok`.
//! redb serializes write transactions, so check-then-insert sequences inside
//! one closure cannot interleave with another writer.

use std::path::Path;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction};
use serde::{de::DeserializeOwned, Serialize};

// =============================================================================
// Table Definitions
// =============================================================================

pub const USERS: TableDefinition<&str, &[u8]> = TableDefinition::new("users");
pub const ORGANIZATIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("organizations");
pub const MEMBERSHIPS: TableDefinition<&str, &[u8]> = TableDefinition::new("memberships");
pub const STORES: TableDefinition<&str, &[u8]> = TableDefinition::new("stores");
pub const STORE_STAFF: TableDefinition<&str, &[u8]> = TableDefinition::new("store_staff");
pub const CUSTOM_ROLES: TableDefinition<&str, &[u8]> = TableDefinition::new("custom_roles");
pub const ROLE_REQUESTS: TableDefinition<&str, &[u8]> = TableDefinition::new("role_requests");
pub const NOTIFICATIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("notifications");

const ALL_TABLES: [TableDefinition<&str, &[u8]>; 8] = [
    USERS,
    ORGANIZATIONS,
    MEMBERSHIPS,
    STORES,
    STORE_STAFF,
    CUSTOM_ROLES,
    ROLE_REQUESTS,
    NOTIFICATIONS,
];

// =============================================================================
// Error Type
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("redb error: {0}")]
    Redb(#[from] redb::Error),

    #[error("redb database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("redb transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("redb table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("redb storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("redb commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// A uniqueness or cardinality rule between rows would be broken.
    #[error("constraint violated: {0}")]
    Constraint(String),
}

pub type DbResult<T> = Result<T, DbError>;

// =============================================================================
// Record
// =============================================================================

/// A row type stored in one table, keyed by its id.
pub trait Record: Serialize + DeserializeOwned {
    const TABLE: TableDefinition<'static, &'static str, &'static [u8]>;

    /// Human-readable row kind for error messages.
    const KIND: &'static str;

    fn key(&self) -> &str;
}

fn decode_one<T, R>(table: &R, key: &str) -> DbResult<Option<T>>
where
    T: Record,
    R: ReadableTable<&'static str, &'static [u8]>,
{
    match table.get(key)? {
        Some(value) => Ok(Some(serde_json::from_slice(value.value())?)),
        None => Ok(None),
    }
}

fn decode_matching<T, R, F>(table: &R, mut keep: F) -> DbResult<Vec<T>>
where
    T: Record,
    R: ReadableTable<&'static str, &'static [u8]>,
    F: FnMut(&T) -> bool,
{
    let mut rows = Vec::new();
    for entry in table.iter()? {
        let (_, value) = entry?;
        let row: T = serde_json::from_slice(value.value())?;
        if keep(&row) {
            rows.push(row);
        }
    }
    Ok(rows)
}

fn not_found<T: Record>(key: &str) -> DbError {
    DbError::NotFound(format!("{} {key}", T::KIND))
}

// =============================================================================
// PlatformDb
// =============================================================================

/// Embedded ACID database holding all relational rows.
pub struct PlatformDb {
    db: Database,
}

impl PlatformDb {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> DbResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            for table in ALL_TABLES {
                let _ = write_txn.open_table(table)?;
            }
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    /// Look up a row by id.
    pub fn get<T: Record>(&self, key: &str) -> DbResult<Option<T>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(T::TABLE)?;
        decode_one(&table, key)
    }

    /// Look up a row by id, failing with `NotFound` when absent.
    pub fn require<T: Record>(&self, key: &str) -> DbResult<T> {
        self.get(key)?.ok_or_else(|| not_found::<T>(key))
    }

    /// All rows of a table that satisfy `keep`.
    pub fn scan<T: Record>(&self, keep: impl FnMut(&T) -> bool) -> DbResult<Vec<T>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(T::TABLE)?;
        decode_matching(&table, keep)
    }

    pub fn list<T: Record>(&self) -> DbResult<Vec<T>> {
        self.scan(|_: &T| true)
    }

    /// Insert or replace a single row in its own transaction.
    pub fn put<T: Record>(&self, record: &T) -> DbResult<()> {
        self.write(|tx| tx.put(record))
    }

    /// Run `f` inside one write transaction.
    ///
    /// The transaction commits when `f` returns `Ok` and is aborted otherwise,
    /// so either every row written by `f` becomes visible or none does.
    pub fn write<R, E, F>(&self, f: F) -> Result<R, E>
    where
        E: From<DbError>,
        F: FnOnce(&WriteTx<'_>) -> Result<R, E>,
    {
        let write_txn = self.db.begin_write().map_err(DbError::from)?;
        let result = f(&WriteTx { txn: &write_txn });
        match result {
            Ok(value) => {
                write_txn.commit().map_err(DbError::from)?;
                Ok(value)
            }
            Err(err) => {
                if let Err(abort_err) = write_txn.abort() {
                    tracing::warn!(error = %abort_err, "Failed to abort write transaction");
                }
                Err(err)
            }
        }
    }
}

/// Handle to an open write transaction.
pub struct WriteTx<'a> {
    txn: &'a WriteTransaction,
}

impl WriteTx<'_> {
    pub fn get<T: Record>(&self, key: &str) -> DbResult<Option<T>> {
        let table = self.txn.open_table(T::TABLE)?;
        decode_one(&table, key)
    }

    pub fn require<T: Record>(&self, key: &str) -> DbResult<T> {
        self.get(key)?.ok_or_else(|| not_found::<T>(key))
    }

    pub fn scan<T: Record>(&self, keep: impl FnMut(&T) -> bool) -> DbResult<Vec<T>> {
        let table = self.txn.open_table(T::TABLE)?;
        decode_matching(&table, keep)
    }

    /// Insert or replace a row.
    pub fn put<T: Record>(&self, record: &T) -> DbResult<()> {
        let json = serde_json::to_vec(record)?;
        let mut table = self.txn.open_table(T::TABLE)?;
        table.insert(record.key(), json.as_slice())?;
        Ok(())
    }

    /// Insert a row whose id must not exist yet.
    pub fn insert<T: Record>(&self, record: &T) -> DbResult<()> {
        if self.get::<T>(record.key())?.is_some() {
            return Err(DbError::AlreadyExists(format!(
                "{} {}",
                T::KIND,
                record.key()
            )));
        }
        self.put(record)
    }

    /// Remove a row. Returns whether it existed.
    pub fn remove<T: Record>(&self, key: &str) -> DbResult<bool> {
        let mut table = self.txn.open_table(T::TABLE)?;
        let existed = table.remove(key)?.is_some();
        Ok(existed)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    const WIDGETS: TableDefinition<&str, &[u8]> = TableDefinition::new("widgets");

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Widget {
        id: String,
        size: u32,
    }

    impl Record for Widget {
        const TABLE: TableDefinition<'static, &'static str, &'static [u8]> = WIDGETS;
        const KIND: &'static str = "Widget";

        fn key(&self) -> &str {
            &self.id
        }
    }

    fn widget(id: &str, size: u32) -> Widget {
        Widget {
            id: id.to_string(),
            size,
        }
    }

    fn temp_db() -> (PlatformDb, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db = PlatformDb::open(&dir.path().join("test.redb")).unwrap();
        // Test-only table is not in ALL_TABLES
        db.write(|tx| tx.scan::<Widget>(|_| false).map(|_| ()))
            .unwrap();
        (db, dir)
    }

    #[test]
    fn put_and_get() {
        let (db, _dir) = temp_db();
        db.put(&widget("w1", 3)).unwrap();

        assert_eq!(db.get::<Widget>("w1").unwrap(), Some(widget("w1", 3)));
        assert_eq!(db.get::<Widget>("missing").unwrap(), None);
        assert!(matches!(
            db.require::<Widget>("missing"),
            Err(DbError::NotFound(msg)) if msg == "Widget missing"
        ));
    }

    #[test]
    fn scan_filters_rows() {
        let (db, _dir) = temp_db();
        for i in 0..5 {
            db.put(&widget(&format!("w{i}"), i)).unwrap();
        }
        let big = db.scan(|w: &Widget| w.size >= 3).unwrap();
        assert_eq!(big.len(), 2);
        assert_eq!(db.list::<Widget>().unwrap().len(), 5);
    }

    #[test]
    fn insert_rejects_duplicates() {
        let (db, _dir) = temp_db();
        db.write(|tx| tx.insert(&widget("w1", 1))).unwrap();
        let result = db.write(|tx| tx.insert(&widget("w1", 2)));
        assert!(matches!(result, Err(DbError::AlreadyExists(_))));
        assert_eq!(db.require::<Widget>("w1").unwrap().size, 1);
    }

    #[test]
    fn failed_closure_rolls_back_every_write() {
        let (db, _dir) = temp_db();
        let result: DbResult<()> = db.write(|tx| {
            tx.put(&widget("a", 1))?;
            tx.put(&widget("b", 2))?;
            Err(DbError::NotFound("forced".to_string()))
        });
        assert!(result.is_err());
        assert!(db.list::<Widget>().unwrap().is_empty());
    }

    #[test]
    fn writes_see_their_own_rows() {
        let (db, _dir) = temp_db();
        let seen = db
            .write(|tx| {
                tx.put(&widget("a", 1))?;
                tx.get::<Widget>("a")
            })
            .unwrap();
        assert_eq!(seen, Some(widget("a", 1)));
    }

    #[test]
    fn remove_reports_existence() {
        let (db, _dir) = temp_db();
        db.put(&widget("a", 1)).unwrap();
        assert!(db.write(|tx| tx.remove::<Widget>("a")).unwrap());
        assert!(!db.write(|tx| tx.remove::<Widget>("a")).unwrap());
    }

    #[test]
    fn reopen_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("persist.redb");
        {
            let db = PlatformDb::open(&path).unwrap();
            db.write(|tx| tx.scan::<Widget>(|_| false).map(|_| ()))
                .unwrap();
            db.put(&widget("kept", 7)).unwrap();
        }
        let db = PlatformDb::open(&path).unwrap();
        assert_eq!(db.require::<Widget>("kept").unwrap().size, 7);
    }
}
