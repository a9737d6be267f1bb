//! RBDB – an embedded deductive database layered on SQLite.
//!
//! RBDB lets a client treat logical predicates as ordinary tables. A
//! predicate is declared with `CREATE TABLE`; from then on three modes of
//! interaction mix freely:
//! * ground facts arrive via SQL `INSERT` or via [`Database::assert`],
//! * Horn-clause rules arrive via [`Database::assert`],
//! * derived knowledge is read back with `SELECT` over the predicate name
//!   (every inferred tuple shows up as a row) or with a formula query
//!   returning variable bindings.
//!
//! Nothing but the rule store is ever physically created: a declared
//! predicate exists as a row in the catalog plus a session-scoped view and
//! INSTEAD-OF-INSERT trigger, rebuilt on demand whenever a statement trips
//! over their absence (the *rescue* protocol).
//!
//! ## Modules
//! * [`symbol`] – terms, predicates, Horn-clause formulas; equality,
//!   ordering, canonicalization, safety validation.
//! * [`codec`] – deterministic serialization of formulas into the rule store.
//! * [`compile`] – translation of rules and query patterns into `SELECT`s.
//! * [`ddl`] – interception of `CREATE TABLE` as predicate declaration.
//! * [`view`] – session view / trigger materialization and rescue.
//! * [`cursor`] – multi-statement SQL execution with rescue-and-retry.
//! * [`persist`] – rule store schema and the engine-side functions.
//! * [`database`] – the session tying the surfaces together.
//!
//! ## Quick Start
//! ```
//! use rbdb::{Database, Formula, Predicate, SqlValue, Term};
//!
//! let db = Database::open_in_memory().unwrap();
//! db.sql("CREATE TABLE human(name)", Vec::new()).unwrap();
//! db.assert(&Formula::fact(Predicate::new(
//!     "human",
//!     vec![Term::from("Socrates")],
//! )))
//! .unwrap();
//! let mut rows = db.sql("SELECT * FROM human", Vec::new()).unwrap();
//! let row = rows.next().unwrap();
//! assert_eq!(
//!     row.get("name"),
//!     Some(&SqlValue::from("Socrates".to_string()))
//! );
//! ```
//!
//! ## Status
//! Negation, disjunction and aggregation in rules are out of scope, as is
//! any recursion optimization beyond what SQLite's recursive common table
//! expressions provide.

pub mod codec;
pub mod compile;
pub mod cursor;
pub mod database;
pub mod ddl;
pub mod error;
pub mod persist;
pub mod symbol;
pub mod view;

pub use cursor::{Cursor, Row};
pub use database::Database;
pub use error::{RbdbError, Result};
pub use persist::EntityId;
pub use symbol::{Formula, Predicate, Term, Variable};

/// The tagged value type rows are made of, straight from the engine.
pub use rusqlite::types::Value as SqlValue;
