//! The RBDB session: one connection, three surfaces.
//!
//! A [`Database`] wires the rule store to the SQL surface. Clients declare
//! predicates with ordinary `CREATE TABLE` statements through [`Database::sql`],
//! then mix three modes of interaction freely:
//! * `INSERT` rows into a predicate (the view's trigger turns them into facts),
//! * [`Database::assert`] facts or Horn-clause rules,
//! * read back with `SELECT` over the predicate name or with
//!   [`Database::query`] and a formula pattern.
//!
//! All operations serialize on the single connection; cursors borrow the
//! session and release their prepared statements when dropped.

use std::collections::HashMap;
use std::hash::BuildHasherDefault;
use std::path::Path;
use std::sync::Mutex;

use rusqlite::{ffi, params, Connection};
use seahash::SeaHasher;
use tracing::{debug, info};

use crate::codec;
use crate::compile;
use crate::cursor::Cursor;
use crate::error::{RbdbError, Result};
use crate::symbol::{self, Formula};
use crate::view;
use crate::SqlValue;

type CatalogHasher = BuildHasherDefault<SeaHasher>;

/// An open RBDB session.
pub struct Database {
    connection: Connection,
    // Declared column lists by predicate name. Predicates are never
    // redefined, so positive entries stay valid for the session.
    catalog: Mutex<HashMap<String, Vec<String>, CatalogHasher>>,
}

impl Database {
    /// Opens (creating if needed) a file-backed database.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Database> {
        Self::wrap(Connection::open(path)?)
    }
    /// Opens a fresh in-memory database.
    pub fn open_in_memory() -> Result<Database> {
        Self::wrap(Connection::open_in_memory()?)
    }
    fn wrap(connection: Connection) -> Result<Database> {
        crate::persist::install(&connection)?;
        info!("session open");
        Ok(Database {
            connection,
            catalog: Mutex::new(HashMap::default()),
        })
    }

    fn columns(&self, name: &str) -> Result<Vec<String>> {
        if let Some(columns) = self.catalog.lock().unwrap().get(name) {
            return Ok(columns.clone());
        }
        let columns = view::columns_of(&self.connection, name)?
            .ok_or_else(|| RbdbError::UnknownPredicate(name.to_string()))?;
        self.catalog
            .lock()
            .unwrap()
            .insert(name.to_string(), columns.clone());
        Ok(columns)
    }

    /// Asserts a fact or rule: canonicalize, validate, encode, store.
    pub fn assert(&self, formula: &Formula) -> Result<()> {
        let canonical = formula.canonicalize()?;
        symbol::validate(&canonical)?;
        let encoded = codec::encode(&canonical)?;
        let transaction = self.connection.unchecked_transaction()?;
        transaction.execute("INSERT INTO _entity DEFAULT VALUES", [])?;
        let id = transaction.last_insert_rowid();
        transaction
            .execute(
                "INSERT INTO _rule (id, formula) VALUES (?, jsonb(?))",
                params![id, encoded],
            )
            .map_err(|error| translate_rule_error(error, canonical.head().name()))?;
        transaction.commit()?;
        debug!(
            head = canonical.head().name(),
            fact = canonical.is_fact(),
            "assertion stored"
        );
        Ok(())
    }

    /// Runs a formula query: an empty-body pattern over a declared
    /// predicate. Variables come back as columns named after their display
    /// names; a ground pattern yields one `sat = 1` row or none.
    pub fn query(&self, formula: &Formula) -> Result<Cursor<'_>> {
        if !formula.body().is_empty() {
            return Err(RbdbError::UnsupportedQuery);
        }
        let canonical = formula.canonicalize()?;
        let sql = compile::compile_query(&canonical, |name| self.columns(name))?;
        Cursor::new(&self.connection, &sql, Vec::new())
    }

    /// Runs a possibly multi-statement SQL text with positional arguments.
    pub fn sql(&self, sql: &str, arguments: Vec<SqlValue>) -> Result<Cursor<'_>> {
        Cursor::new(&self.connection, sql, arguments)
    }
}

fn translate_rule_error(error: rusqlite::Error, head: &str) -> RbdbError {
    if let rusqlite::Error::SqliteFailure(failure, _) = &error {
        match failure.extended_code {
            ffi::SQLITE_CONSTRAINT_UNIQUE => return RbdbError::DuplicateAssertion,
            // The rule store's referential head check.
            ffi::SQLITE_CONSTRAINT_TRIGGER => {
                return RbdbError::UnknownPredicate(head.to_string())
            }
            _ => {}
        }
    }
    RbdbError::Sql(error)
}
