//! Compilation of Horn clauses into SQL.
//!
//! Two entry points share the binding bookkeeping:
//! * [`compile_rule`] turns a validated, canonical rule into the `SELECT`
//!   that computes its head relation from the body relations. It becomes one
//!   leg of the head predicate's session view.
//! * [`compile_query`] turns an empty-body question pattern into a `SELECT`
//!   over the head predicate's view: variables project under their display
//!   names, constants filter, and a fully ground pattern degenerates to a
//!   one-column satisfiability probe.
//!
//! The compiler only needs a way to look up the declared column names of a
//! relation; the caller supplies it, typically backed by `_predicate`.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use crate::error::{RbdbError, Result};
use crate::symbol::{Formula, Term, Variable};

/// Double-quotes an identifier for SQL.
pub(crate) fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// Single-quotes a string for SQL.
pub(crate) fn quote_text(text: &str) -> String {
    format!("'{}'", text.replace('\'', "''"))
}

// Renders a constant term as a SQL literal. Booleans become the engine's
// 0/1, matching how they come back out of the rule store's extractions.
fn literal(term: &Term) -> Result<String> {
    match term {
        Term::String(string) => Ok(quote_text(string)),
        Term::Number(number) if number.is_finite() => Ok(number.to_string()),
        Term::Number(_) => Err(RbdbError::Encoding("non-finite number".to_string())),
        Term::Boolean(boolean) => Ok(if *boolean { "1" } else { "0" }.to_string()),
        Term::Variable(_) => Err(RbdbError::Invariant(
            "variable rendered as literal".to_string(),
        )),
    }
}

// One FROM source per body predicate. Conditions on the first source end up
// in WHERE, conditions on later sources in that source's ON clause; the two
// locations conjoin identically.
struct Source {
    relation: String,
    alias: String,
    conditions: Vec<String>,
}

/// Compiles a canonical rule into the SELECT computing its head relation.
pub fn compile_rule<F>(formula: &Formula, columns: F) -> Result<String>
where
    F: Fn(&str) -> Result<Vec<String>>,
{
    if formula.body().is_empty() {
        return Err(RbdbError::Invariant(
            "a rule needs at least one body predicate".to_string(),
        ));
    }
    let head = formula.head();
    let head_columns = checked_columns(head.name(), head.arity(), &columns)?;

    let mut occurrences: HashMap<String, usize> = HashMap::new();
    let mut sources: Vec<Source> = Vec::new();
    // First binding site of each variable: (source index, column name).
    let mut bindings: HashMap<Variable, (usize, String)> = HashMap::new();

    for predicate in formula.body() {
        let occurrence = occurrences
            .entry(predicate.name().to_string())
            .and_modify(|count| *count += 1)
            .or_insert(1);
        let alias = if *occurrence == 1 {
            predicate.name().to_string()
        } else {
            format!("{}{}", predicate.name(), occurrence)
        };
        let source_columns = checked_columns(predicate.name(), predicate.arity(), &columns)?;
        let index = sources.len();
        let mut conditions = Vec::new();
        for (position, term) in predicate.terms().iter().enumerate() {
            let column = &source_columns[position];
            match term {
                Term::Variable(variable) => match bindings.entry(*variable) {
                    Entry::Vacant(entry) => {
                        entry.insert((index, column.clone()));
                    }
                    Entry::Occupied(entry) => {
                        let (first_index, first_column) = entry.get();
                        conditions.push(format!(
                            "{}.{} = {}.{}",
                            quote(&alias),
                            quote(column),
                            quote(&sources[*first_index].alias),
                            quote(first_column),
                        ));
                    }
                },
                constant => conditions.push(format!(
                    "{}.{} = {}",
                    quote(&alias),
                    quote(column),
                    literal(constant)?,
                )),
            }
        }
        sources.push(Source {
            relation: predicate.name().to_string(),
            alias,
            conditions,
        });
    }

    let mut projections = Vec::with_capacity(head.arity());
    for (position, term) in head.terms().iter().enumerate() {
        let expression = match term {
            Term::Variable(variable) => {
                let (source, column) = bindings.get(variable).ok_or_else(|| {
                    RbdbError::Invariant("unvalidated rule reached the compiler".to_string())
                })?;
                format!("{}.{}", quote(&sources[*source].alias), quote(column))
            }
            constant => literal(constant)?,
        };
        projections.push(format!("{} AS {}", expression, quote(&head_columns[position])));
    }

    let mut sql = format!("SELECT {} FROM {}", projections.join(", "), quote(&sources[0].relation));
    for source in &sources[1..] {
        sql += &format!(" JOIN {}", quote(&source.relation));
        if source.alias != source.relation {
            sql += &format!(" AS {}", quote(&source.alias));
        }
        if !source.conditions.is_empty() {
            sql += &format!(" ON {}", source.conditions.join(" AND "));
        }
    }
    if !sources[0].conditions.is_empty() {
        sql += &format!(" WHERE {}", sources[0].conditions.join(" AND "));
    }
    Ok(sql)
}

/// Compiles a canonical question pattern into a SELECT over the head
/// predicate's view.
pub fn compile_query<F>(formula: &Formula, columns: F) -> Result<String>
where
    F: Fn(&str) -> Result<Vec<String>>,
{
    if !formula.body().is_empty() {
        return Err(RbdbError::UnsupportedQuery);
    }
    let head = formula.head();
    let source_columns = checked_columns(head.name(), head.arity(), &columns)?;

    let mut projections = Vec::new();
    let mut conditions = Vec::new();
    let mut first_occurrence: HashMap<Variable, String> = HashMap::new();
    for (position, term) in head.terms().iter().enumerate() {
        let column = &source_columns[position];
        match term {
            Term::Variable(variable) => match first_occurrence.entry(*variable) {
                Entry::Vacant(entry) => {
                    projections.push(format!("{} AS {}", quote(column), quote(&variable.name())));
                    entry.insert(column.clone());
                }
                Entry::Occupied(entry) => {
                    conditions.push(format!("{} = {}", quote(column), quote(entry.get())));
                }
            },
            constant => conditions.push(format!("{} = {}", quote(column), literal(constant)?)),
        }
    }
    if projections.is_empty() {
        // A ground pattern asks whether the tuple exists at all.
        projections.push("1 AS sat".to_string());
    }

    let mut sql = format!(
        "SELECT {} FROM {}",
        projections.join(", "),
        quote(head.name())
    );
    if !conditions.is_empty() {
        sql += &format!(" WHERE {}", conditions.join(" AND "));
    }
    Ok(sql)
}

fn checked_columns<F>(name: &str, arity: usize, columns: &F) -> Result<Vec<String>>
where
    F: Fn(&str) -> Result<Vec<String>>,
{
    let found = columns(name)?;
    if found.len() != arity {
        return Err(RbdbError::Invariant(format!(
            "predicate {} has {} columns but is used with {} arguments",
            name,
            found.len(),
            arity
        )));
    }
    Ok(found)
}
