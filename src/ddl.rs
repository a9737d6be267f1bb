//! Interception of `CREATE TABLE` as predicate declaration.
//!
//! RBDB has no physical user tables. When a statement beginning with
//! `CREATE TABLE` shows up on the SQL surface, it is diverted here: the
//! predicate is recorded in the catalog (`_entity` + `_predicate`) inside a
//! single transaction and the original statement never reaches the engine's
//! execution path. The session view and INSTEAD-OF-INSERT trigger that make
//! the predicate behave like a table are built right after a successful
//! declaration (and rebuilt on demand by rescue, see [`crate::view`]).
//!
//! Statements are matched on a normalized rendering (comments stripped,
//! whitespace collapsed) so aliasing and layout do not defeat recognition.

use lazy_static::lazy_static;
use regex::Regex;
use rusqlite::{params, Connection};
use tracing::debug;

use crate::error::{RbdbError, Result};

/// A parsed `CREATE TABLE` head: what declaration needs to know.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateTable {
    pub name: String,
    pub columns: Vec<String>,
    pub if_not_exists: bool,
}

lazy_static! {
    static ref RE_CREATE_TABLE: Regex = Regex::new(
        r#"(?i)^create\s+table\s+(?P<ine>if\s+not\s+exists\s+)?(?P<name>"[^"]+"|\[[^\]]+\]|`[^`]+`|[A-Za-z_][A-Za-z0-9_]*)\s*\((?P<body>.*)\)\s*;?\s*$"#
    )
    .unwrap();
    static ref RE_CREATE_HEAD: Regex = Regex::new(r"(?i)^create\s+table\b").unwrap();
}

/// Strips SQL comments (outside string literals and quoted identifiers) and
/// collapses whitespace runs, approximating the engine's normalized SQL.
fn normalize(sql: &str) -> String {
    let bytes = sql.as_bytes();
    let mut normalized = String::with_capacity(sql.len());
    let mut index = 0;
    let mut pending_space = false;
    while index < bytes.len() {
        let rest = &sql[index..];
        if rest.starts_with("--") {
            index += rest.find('\n').map(|at| at + 1).unwrap_or(rest.len());
            pending_space = true;
            continue;
        }
        if rest.starts_with("/*") {
            index += rest.find("*/").map(|at| at + 2).unwrap_or(rest.len());
            pending_space = true;
            continue;
        }
        let character = rest.chars().next().unwrap();
        if character.is_whitespace() {
            index += character.len_utf8();
            pending_space = true;
            continue;
        }
        if pending_space && !normalized.is_empty() {
            normalized.push(' ');
        }
        pending_space = false;
        if matches!(character, '\'' | '"' | '`') {
            let closed = rest[1..]
                .find(character)
                .map(|at| index + 1 + at + 1)
                .unwrap_or(bytes.len());
            normalized.push_str(&sql[index..closed.min(bytes.len())]);
            index = closed;
            continue;
        }
        normalized.push(character);
        index += character.len_utf8();
    }
    normalized
}

/// Recognizes and parses a `CREATE TABLE` statement. Returns `None` for
/// anything else; statements that begin with `CREATE TABLE` but fail to
/// parse are an error, since they must not fall through to the engine.
pub fn parse_create_table(sql: &str) -> Result<Option<CreateTable>> {
    let normalized = normalize(sql);
    if !RE_CREATE_HEAD.is_match(&normalized) {
        return Ok(None);
    }
    let captures = RE_CREATE_TABLE.captures(&normalized).ok_or_else(|| {
        RbdbError::Parse(format!("unsupported CREATE TABLE form: {}", normalized))
    })?;
    let name = unwrap_name(captures.name("name").unwrap().as_str());
    let mut columns = Vec::new();
    for element in split_depth_zero(captures.name("body").unwrap().as_str()) {
        let element = element.trim();
        if element.is_empty() || is_table_constraint(element) {
            continue;
        }
        if element.starts_with('"') || element.starts_with('[') || element.starts_with('`') {
            return Err(RbdbError::QuotedColumnNotSupported);
        }
        let column = element
            .split(|character: char| character.is_whitespace() || character == '(')
            .next()
            .unwrap_or("")
            .to_string();
        if column.is_empty() {
            return Err(RbdbError::Parse(format!("bad column element: {}", element)));
        }
        columns.push(column);
    }
    if columns.is_empty() {
        return Err(RbdbError::Parse(format!(
            "no columns declared for {}",
            name
        )));
    }
    Ok(Some(CreateTable {
        name: name.to_lowercase(),
        columns,
        if_not_exists: captures.name("ine").is_some(),
    }))
}

fn unwrap_name(token: &str) -> String {
    let unwrapped = if (token.starts_with('"') && token.ends_with('"'))
        || (token.starts_with('`') && token.ends_with('`'))
    {
        &token[1..token.len() - 1]
    } else if token.starts_with('[') && token.ends_with(']') {
        &token[1..token.len() - 1]
    } else {
        token
    };
    unwrapped.to_string()
}

// Table-level constraint clauses carry no column of their own.
fn is_table_constraint(element: &str) -> bool {
    let first = element
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_uppercase();
    let first = first.split('(').next().unwrap_or("").to_string();
    matches!(
        first.as_str(),
        "CONSTRAINT" | "PRIMARY" | "UNIQUE" | "FOREIGN" | "CHECK"
    )
}

// Splits the column list at commas that sit outside parentheses and quotes.
fn split_depth_zero(body: &str) -> Vec<String> {
    let mut elements = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    let mut in_quote: Option<char> = None;
    for character in body.chars() {
        match in_quote {
            Some(quote) => {
                current.push(character);
                if character == quote {
                    in_quote = None;
                }
            }
            None => match character {
                '\'' | '"' | '`' => {
                    in_quote = Some(character);
                    current.push(character);
                }
                '(' => {
                    depth += 1;
                    current.push(character);
                }
                ')' => {
                    depth = depth.saturating_sub(1);
                    current.push(character);
                }
                ',' if depth == 0 => {
                    elements.push(std::mem::take(&mut current));
                }
                _ => current.push(character),
            },
        }
    }
    elements.push(current);
    elements
}

/// Declares a predicate: mints an entity and records the name and column
/// list, all in one transaction. Returns whether a new predicate was
/// actually recorded (an `IF NOT EXISTS` duplicate rolls back entirely, so
/// no entity leaks). A plain duplicate surfaces the unique-name violation.
pub fn declare(conn: &Connection, declaration: &CreateTable) -> Result<bool> {
    let transaction = conn.unchecked_transaction()?;
    transaction.execute("INSERT INTO _entity DEFAULT VALUES", [])?;
    let id = transaction.last_insert_rowid();
    let columns = serde_json::to_string(&declaration.columns)
        .map_err(|error| RbdbError::Encoding(error.to_string()))?;
    let insert = if declaration.if_not_exists {
        "INSERT OR IGNORE INTO _predicate (id, name, column_names) VALUES (?, ?, jsonb(?))"
    } else {
        "INSERT INTO _predicate (id, name, column_names) VALUES (?, ?, jsonb(?))"
    };
    let changed = transaction.execute(insert, params![id, declaration.name, columns])?;
    if changed == 0 {
        // Duplicate under IF NOT EXISTS: drop the transaction, rolling the
        // freshly minted entity back.
        return Ok(false);
    }
    transaction.commit()?;
    debug!(
        predicate = %declaration.name,
        columns = declaration.columns.len(),
        "predicate declared"
    );
    Ok(true)
}
