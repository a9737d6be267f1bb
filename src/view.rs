//! Session-scoped predicate views, insert triggers and rescue.
//!
//! A declared predicate has no physical table. What a `SELECT` sees is a
//! `TEMP` view projecting every derivable tuple out of the rule store:
//! stored facts directly, plus one compiled leg per stored rule whose head
//! is this predicate. The view body is wrapped in a `WITH RECURSIVE` common
//! table expression of the same name, so rules that mention their own head
//! evaluate under the engine's recursive-CTE semantics and the `UNION` set
//! semantics bound the fixpoint.
//!
//! An `INSTEAD OF INSERT` trigger on the view turns row inserts into fact
//! assertions against `_rule`, so `INSERT INTO p VALUES (…)` and
//! `assert(p(…))` store byte-identical encodings.
//!
//! Views do not survive the session and are dropped by the rule store's
//! trigger whenever a non-fact rule with that head arrives. Their absence is
//! an expected state: *rescue* rebuilds the view/trigger pair when a failing
//! statement names a predicate the catalog knows about.

use std::collections::HashSet;

use rusqlite::{Connection, OptionalExtension};
use tracing::debug;

use crate::codec;
use crate::compile::{self, quote, quote_text};
use crate::error::{RbdbError, Result};
use crate::symbol::Formula;

/// Looks up the declared column names of a predicate, or `None` when the
/// catalog has no such predicate.
pub fn columns_of(conn: &Connection, name: &str) -> Result<Option<Vec<String>>> {
    let row = conn
        .prepare("SELECT json(column_names) FROM _predicate WHERE name = ?")?
        .query_row([name], |row| row.get::<_, String>(0))
        .optional()?;
    match row {
        Some(text) => serde_json::from_str(&text)
            .map(Some)
            .map_err(|error| RbdbError::Encoding(error.to_string())),
        None => Ok(None),
    }
}

fn view_exists(conn: &Connection, name: &str) -> Result<bool> {
    let found = conn
        .prepare("SELECT 1 FROM sqlite_temp_master WHERE type = 'view' AND name = ?")?
        .query_row([name], |_| Ok(()))
        .optional()?;
    Ok(found.is_some())
}

fn load_rules(conn: &Connection, name: &str) -> Result<Vec<Formula>> {
    let mut statement = conn.prepare(
        "SELECT json(formula) FROM _rule \
         WHERE output_type = ? AND negative_literal_count > 0 ORDER BY id",
    )?;
    let rows = statement.query_map([codec::output_type(name)], |row| row.get::<_, String>(0))?;
    let mut rules = Vec::new();
    for text in rows {
        rules.push(codec::decode(&text?)?);
    }
    Ok(rules)
}

/// Materializes the session view and INSTEAD-OF-INSERT trigger for a
/// predicate, idempotently. The views of every predicate reachable through
/// the head's rules are ensured first (cycle-safe), so one rescue repairs an
/// arbitrarily deep dependency chain.
pub fn materialize(conn: &Connection, name: &str) -> Result<()> {
    let mut visited = HashSet::new();
    materialize_closure(conn, name, &mut visited)
}

fn materialize_closure(conn: &Connection, name: &str, visited: &mut HashSet<String>) -> Result<()> {
    if !visited.insert(name.to_string()) {
        return Ok(());
    }
    let columns = columns_of(conn, name)?
        .ok_or_else(|| RbdbError::UnknownPredicate(name.to_string()))?;
    let rules = load_rules(conn, name)?;
    for rule in &rules {
        for predicate in rule.body() {
            if predicate.name() != name
                && !visited.contains(predicate.name())
                && !view_exists(conn, predicate.name())?
                && columns_of(conn, predicate.name())?.is_some()
            {
                materialize_closure(conn, predicate.name(), visited)?;
            }
        }
    }
    create_view(conn, name, &columns, &rules)?;
    create_insert_trigger(conn, name, &columns)?;
    debug!(predicate = name, rules = rules.len(), "view materialized");
    Ok(())
}

fn create_view(conn: &Connection, name: &str, columns: &[String], rules: &[Formula]) -> Result<()> {
    let column_list = columns
        .iter()
        .map(|column| quote(column))
        .collect::<Vec<_>>()
        .join(", ");
    let mut legs = Vec::with_capacity(1 + rules.len());
    // The fact leg: ground head arguments always extract through the
    // constant key.
    let projections = columns
        .iter()
        .enumerate()
        .map(|(position, column)| {
            format!(
                "formula ->> '$[{}].\"\"' AS {}",
                position + 1,
                quote(column)
            )
        })
        .collect::<Vec<_>>()
        .join(", ");
    legs.push(format!(
        "SELECT {} FROM _rule WHERE output_type = {} AND negative_literal_count IS NULL",
        projections,
        quote_text(&codec::output_type(name)),
    ));
    // The engine wants every non-recursive leg ahead of the recursive ones.
    let (plain, recursive): (Vec<_>, Vec<_>) = rules.iter().partition(|rule| {
        rule.body()
            .iter()
            .all(|predicate| predicate.name() != name)
    });
    for rule in plain.into_iter().chain(recursive) {
        legs.push(compile::compile_rule(rule, |relation| {
            columns_of(conn, relation)?
                .ok_or_else(|| RbdbError::UnknownPredicate(relation.to_string()))
        })?);
    }
    // The CTE shadows the view name inside the body, which is what lets a
    // rule reference its own head.
    let sql = format!(
        "CREATE TEMP VIEW IF NOT EXISTS {view}({columns}) AS \
         WITH RECURSIVE {view}({columns}) AS ({legs}) SELECT {columns} FROM {view}",
        view = quote(name),
        columns = column_list,
        legs = legs.join(" UNION "),
    );
    conn.execute_batch(&sql)?;
    Ok(())
}

fn create_insert_trigger(conn: &Connection, name: &str, columns: &[String]) -> Result<()> {
    let arguments = columns
        .iter()
        .map(|column| format!("NEW.{}", quote(column)))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "CREATE TEMP TRIGGER IF NOT EXISTS {trigger} INSTEAD OF INSERT ON {view} \
         BEGIN \
           INSERT INTO _entity (id) VALUES (NULL); \
           INSERT INTO _rule (id, formula) \
             VALUES (last_insert_rowid(), jsonb(encode_predicate({name}, {arguments}))); \
         END",
        trigger = quote(&format!("{}_insert", name)),
        view = quote(name),
        name = quote_text(name),
        arguments = arguments,
    );
    conn.execute_batch(&sql)?;
    Ok(())
}

/// Attempts to repair a missing relation. Returns whether the relation was a
/// catalogued predicate whose view has now been rebuilt; the caller retries
/// the failing statement on success and surfaces the miss otherwise.
pub fn rescue(conn: &Connection, name: &str) -> Result<bool> {
    if columns_of(conn, name)?.is_none() {
        return Ok(false);
    }
    debug!(predicate = name, "rescuing missing relation");
    materialize(conn, name)?;
    Ok(true)
}
