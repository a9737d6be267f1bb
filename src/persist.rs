//! Rule store: schema management and engine-side functions.
//!
//! Everything RBDB knows lives in three tables installed at session open:
//! * `_entity(id, external_id)` – canonical identity table. `external_id`
//!   is a time-ordered 128-bit identifier minted by the `new_entity_id()`
//!   function (see [`EntityId`]).
//! * `_predicate(id, name, column_names)` – the catalog of declared
//!   predicates; `column_names` holds the ordered column list as binary JSON.
//! * `_rule(id, formula)` – encoded Horn clauses, facts and rules alike,
//!   unique by encoding. Virtual generated columns project the head name
//!   (`output_type`), the first two head constants (`arg1_constant`,
//!   `arg2_constant`) and a body marker (`negative_literal_count`, NULL for
//!   facts) out of the formula so the compiled lookups are indexable.
//!
//! # Engine-side functions
//! * `new_entity_id()` – v7 UUID blob, used as the `external_id` default.
//! * `encode_predicate(name, v0, …)` – canonical fact encoding, used by the
//!   INSTEAD-OF-INSERT triggers so row inserts and formula assertions store
//!   identical bytes.
//! * `sql_exec(sql)` – executes SQL on the same connection. Trigger bodies
//!   cannot contain DDL, so the rule store's stale-view trigger routes its
//!   `DROP VIEW` through this function.

use chrono::Utc;
use rusqlite::functions::{Context, FunctionFlags};
use rusqlite::types::ValueRef;
use rusqlite::Connection;
use std::fmt;
use tracing::debug;
use uuid::{NoContext, Timestamp, Uuid};

use crate::codec;
use crate::error::{RbdbError, Result};
use crate::symbol::{Formula, Predicate, Term};

// ------------- EntityId -------------
/// Externally visible identity of an entity: a v7 UUID, so ids sort by
/// creation time. The first 48 bits are big-endian milliseconds since the
/// epoch, the version nibble is 7 and the variant bits are `10`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct EntityId(Uuid);

impl EntityId {
    pub fn generate() -> Self {
        let now = Utc::now();
        let timestamp = Timestamp::from_unix(
            NoContext,
            now.timestamp() as u64,
            now.timestamp_subsec_nanos(),
        );
        Self(Uuid::new_v7(timestamp))
    }
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
    /// Milliseconds since the epoch, straight from the leading 48 bits.
    pub fn timestamp_millis(&self) -> u64 {
        let bytes = self.0.as_bytes();
        bytes[..6]
            .iter()
            .fold(0u64, |millis, byte| (millis << 8) | *byte as u64)
    }
    /// Parses the canonical hyphenated form or the 32-hex-digit form.
    pub fn parse(text: &str) -> Result<Self> {
        match text.len() {
            32 | 36 => Uuid::try_parse(text)
                .map(Self)
                .map_err(|_| RbdbError::Encoding(format!("malformed entity id: {}", text))),
            _ => Err(RbdbError::Encoding(format!(
                "malformed entity id: {}",
                text
            ))),
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

// ------------- Schema -------------
const SCHEMA: &str = "
    create table if not exists _entity (
        id INTEGER not null,
        external_id BLOB not null default (new_entity_id()),
        constraint referenceable_entity primary key (id)
    ) STRICT;
    create table if not exists _predicate (
        id INTEGER not null,
        name TEXT not null,
        column_names BLOB,
        constraint predicate_is_entity foreign key (id) references _entity (id),
        constraint referenceable_predicate primary key (id),
        constraint unique_predicate_name unique (name)
    ) STRICT;
    create table if not exists _rule (
        id INTEGER not null,
        formula BLOB not null,
        output_type TEXT generated always as (formula ->> '$[0]') virtual,
        arg1_constant ANY generated always as (formula ->> '$[1].\"\"') virtual,
        arg2_constant ANY generated always as (formula ->> '$[2].\"\"') virtual,
        negative_literal_count INTEGER generated always as (
            case when json_type(formula, '$[#-1]') = 'array'
                 then json_array_length(formula) - 2
            end
        ) virtual,
        constraint rule_is_entity foreign key (id) references _entity (id),
        constraint referenceable_rule primary key (id),
        constraint unique_formula unique (formula)
    ) STRICT;
    create index if not exists _rule_head_constants on _rule (
        output_type, negative_literal_count, arg1_constant, arg2_constant
    );
    create index if not exists _rule_head_constants_flipped on _rule (
        output_type, negative_literal_count, arg2_constant, arg1_constant
    );
    create trigger if not exists _rule_head_must_exist
    before insert on _rule
    when not exists (
        select 1 from _predicate where name = substr(NEW.formula ->> '$[0]', 2)
    )
    begin
        select raise(ABORT, 'unknown predicate in rule head');
    end;
";

// Session-scoped: a freshly asserted rule makes the head's view stale, so
// the next read rebuilds it with the rule included.
const SESSION_SCHEMA: &str = "
    create temp trigger if not exists _rule_drops_stale_view
    after insert on _rule
    when NEW.negative_literal_count > 0
    begin
        select sql_exec(
            'DROP VIEW IF EXISTS \"'
            || replace(substr(NEW.output_type, 2), '\"', '\"\"')
            || '\"'
        );
    end;
";

/// Registers the engine-side functions and installs the rule store schema.
/// Safe to call on a database that already carries it.
pub fn install(conn: &Connection) -> Result<()> {
    register_functions(conn)?;
    let _ = conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;");
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.execute_batch(SCHEMA)?;
    conn.execute_batch(SESSION_SCHEMA)?;
    debug!("rule store schema installed");
    Ok(())
}

// ------------- Functions -------------
fn register_functions(conn: &Connection) -> Result<()> {
    conn.create_scalar_function(
        "new_entity_id",
        0,
        FunctionFlags::SQLITE_UTF8,
        |_context| Ok(EntityId::generate().as_bytes().to_vec()),
    )?;
    conn.create_scalar_function(
        "encode_predicate",
        -1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |context| {
            encode_predicate(context)
                .map_err(|error| rusqlite::Error::UserFunctionError(Box::new(error)))
        },
    )?;
    conn.create_scalar_function("sql_exec", 1, FunctionFlags::SQLITE_UTF8, |context| {
        let sql: String = context.get(0)?;
        // The trigger that calls this runs on our connection; the statement
        // must too, or it could not see the session's views.
        let conn = unsafe { context.get_connection()? };
        conn.execute_batch(&sql)?;
        Ok(1i64)
    })?;
    Ok(())
}

// Builds the canonical fact encoding out of SQL values. Integers promote to
// numbers; NULL and BLOB have no term representation.
fn encode_predicate(context: &Context) -> Result<String> {
    if context.len() < 2 {
        return Err(RbdbError::Invariant(
            "encode_predicate needs a name and at least one value".to_string(),
        ));
    }
    let name: String = context.get(0)?;
    let mut terms = Vec::with_capacity(context.len() - 1);
    for position in 1..context.len() {
        let term = match context.get_raw(position) {
            ValueRef::Text(text) => Term::String(String::from_utf8_lossy(text).into_owned()),
            ValueRef::Integer(integer) => Term::Number(integer as f64),
            ValueRef::Real(real) if real.is_finite() => Term::Number(real),
            ValueRef::Real(_) => {
                return Err(RbdbError::UnsupportedTermType(
                    "non-finite number".to_string(),
                ))
            }
            ValueRef::Null => return Err(RbdbError::UnsupportedTermType("NULL".to_string())),
            ValueRef::Blob(_) => return Err(RbdbError::UnsupportedTermType("BLOB".to_string())),
        };
        terms.push(term);
    }
    codec::encode(&Formula::fact(Predicate::new(&name, terms)))
}
