//! Multi-statement SQL execution with rescue and retry.
//!
//! A [`Cursor`] runs a possibly multi-statement SQL text against the
//! session's connection. Each statement is tracked with its byte offset in
//! the source text and the index of its first argument, so execution can
//! resume from exactly the failing statement after a rescue: earlier
//! statements, already executed, are never repeated.
//!
//! `CREATE TABLE` statements are diverted to the DDL interceptor before the
//! engine ever sees them. Everything else passes through: non-final
//! statements are stepped to completion in order (later statements may
//! depend on their side effects), and the final statement's rows are read
//! eagerly into the cursor's buffer so that engine errors surface
//! synchronously from the constructor.
//!
//! Placeholders (`?`) are filled left to right, distributed across
//! statements by each statement's engine-reported parameter count; counting
//! the placeholders ourselves would miscount ones inside string literals.

use std::collections::{HashSet, VecDeque};

use rusqlite::types::Value as SqlValue;
use rusqlite::Connection;
use tracing::debug;

use crate::ddl::{self, CreateTable};
use crate::error::{self, RbdbError, Result};
use crate::view;

/// A single result row: ordered column name / value pairs.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Vec<String>,
    values: Vec<SqlValue>,
}

impl Row {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }
    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .position(|name| name == column)
            .map(|position| &self.values[position])
    }
}

// One statement of the source text, with the bookkeeping retry needs.
#[derive(Debug)]
struct Part {
    text: String,
    /// Byte offset of the statement in the source text.
    offset: usize,
    /// Index of the statement's first argument in the argument list.
    argument_index: usize,
    /// Engine-reported placeholder count.
    parameters: usize,
    intercepted: Option<CreateTable>,
}

/// A streaming cursor over the final statement of a SQL text.
#[derive(Debug)]
pub struct Cursor<'db> {
    conn: &'db Connection,
    parts: Vec<Part>,
    expected: usize,
    arguments: Vec<SqlValue>,
    columns: Vec<String>,
    buffer: VecDeque<Row>,
}

impl<'db> Cursor<'db> {
    pub(crate) fn new(conn: &'db Connection, sql: &str, arguments: Vec<SqlValue>) -> Result<Self> {
        let mut parts = Vec::new();
        let mut total = 0;
        let mut batch_declared: HashSet<String> = HashSet::new();
        for (offset, text) in split_statements(sql) {
            let intercepted = ddl::parse_create_table(text)?;
            let parameters = match &intercepted {
                // Declarations take no placeholders; they never reach the engine.
                Some(declaration) => {
                    batch_declared.insert(declaration.name.clone());
                    0
                }
                None => match with_rescue(conn, |conn| Ok(conn.prepare(text)?.parameter_count())) {
                    Ok(parameters) => parameters,
                    // A statement over a relation declared earlier in this
                    // very text cannot be prepared yet; count its
                    // placeholders directly, outside string literals.
                    Err(RbdbError::UnknownPredicate(name))
                        if batch_declared.contains(&name) =>
                    {
                        count_placeholders(text)
                    }
                    Err(error) => return Err(error),
                },
            };
            parts.push(Part {
                text: text.to_string(),
                offset,
                argument_index: total,
                parameters,
                intercepted,
            });
            total += parameters;
        }
        if arguments.len() != total {
            return Err(RbdbError::WrongParameterCount {
                expected: total,
                got: arguments.len(),
            });
        }
        let mut cursor = Self {
            conn,
            parts,
            expected: total,
            arguments,
            columns: Vec::new(),
            buffer: VecDeque::new(),
        };
        cursor.execute()?;
        Ok(cursor)
    }

    /// The column names of the final statement.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Returns the next row, or `None` at the end of the result.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<Row> {
        self.buffer.pop_front()
    }

    /// 1 when a row is currently buffered, 0 otherwise.
    pub fn underestimated_count(&self) -> usize {
        usize::from(!self.buffer.is_empty())
    }

    /// Re-executes the whole text with the same arguments.
    pub fn rerun(&mut self) -> Result<()> {
        self.execute()
    }

    /// Re-executes the whole text with new arguments.
    pub fn rerun_with(&mut self, arguments: Vec<SqlValue>) -> Result<()> {
        if arguments.len() != self.expected {
            return Err(RbdbError::WrongParameterCount {
                expected: self.expected,
                got: arguments.len(),
            });
        }
        self.arguments = arguments;
        self.execute()
    }

    fn execute(&mut self) -> Result<()> {
        self.buffer.clear();
        self.columns.clear();
        let last = self.parts.len().saturating_sub(1);
        for index in 0..self.parts.len() {
            self.execute_part(index, index == last)?;
        }
        Ok(())
    }

    fn execute_part(&mut self, index: usize, is_final: bool) -> Result<()> {
        if let Some(declaration) = self.parts[index].intercepted.clone() {
            if ddl::declare(self.conn, &declaration)? {
                view::materialize(self.conn, &declaration.name)?;
            }
            return Ok(());
        }
        let text = self.parts[index].text.clone();
        let offset = self.parts[index].offset;
        let argument_index = self.parts[index].argument_index;
        let parameters = self.parts[index].parameters;
        let window = &self.arguments[argument_index..argument_index + parameters];
        let conn = self.conn;
        let result = with_rescue(conn, |conn| {
            let mut statement = conn.prepare(&text)?;
            for (position, value) in window.iter().enumerate() {
                statement.raw_bind_parameter(position + 1, value)?;
            }
            if !is_final {
                let mut rows = statement.raw_query();
                while rows.next()?.is_some() {}
                return Ok((Vec::new(), VecDeque::new()));
            }
            let columns: Vec<String> = statement
                .column_names()
                .iter()
                .map(|name| name.to_string())
                .collect();
            let count = statement.column_count();
            let mut buffer = VecDeque::new();
            let mut rows = statement.raw_query();
            while let Some(row) = rows.next()? {
                let mut values = Vec::with_capacity(count);
                for column in 0..count {
                    values.push(row.get_ref(column)?.into());
                }
                buffer.push_back(Row {
                    columns: columns.clone(),
                    values,
                });
            }
            Ok((columns, buffer))
        });
        match result {
            Ok((columns, buffer)) => {
                if is_final {
                    self.columns = columns;
                    self.buffer = buffer;
                }
                Ok(())
            }
            Err(error) => {
                debug!(offset, "statement failed: {}", error);
                Err(error)
            }
        }
    }
}

impl Iterator for Cursor<'_> {
    type Item = Row;
    fn next(&mut self) -> Option<Row> {
        self.buffer.pop_front()
    }
}

/// Runs an operation, rescuing missing relations as they surface. Each
/// relation name is rescued at most once per call, so chains of absent views
/// recover while genuine misses (and pathological loops) still propagate.
fn with_rescue<T>(
    conn: &Connection,
    mut operation: impl FnMut(&Connection) -> Result<T>,
) -> Result<T> {
    let mut rescued: HashSet<String> = HashSet::new();
    loop {
        match operation(conn) {
            Err(RbdbError::Sql(sql_error)) => match error::missing_relation(&sql_error) {
                Some(name) if !rescued.contains(&name) => {
                    rescued.insert(name.clone());
                    if view::rescue(conn, &name)? {
                        continue;
                    }
                    return Err(RbdbError::UnknownPredicate(name));
                }
                _ => return Err(RbdbError::Sql(sql_error)),
            },
            other => return other,
        }
    }
}

// Counts `?` placeholders outside string literals, quoted identifiers and
// comments. Only used for statements the engine cannot prepare yet because
// they depend on a declaration earlier in the same text.
fn count_placeholders(sql: &str) -> usize {
    let bytes = sql.as_bytes();
    let mut count = 0;
    let mut index = 0;
    while index < bytes.len() {
        let rest = &sql[index..];
        if rest.starts_with("--") {
            index += rest.find('\n').map(|at| at + 1).unwrap_or(rest.len());
            continue;
        }
        if rest.starts_with("/*") {
            index += rest.find("*/").map(|at| at + 2).unwrap_or(rest.len());
            continue;
        }
        match bytes[index] {
            b'\'' | b'"' | b'`' => {
                let quote = bytes[index] as char;
                index = rest[1..]
                    .find(quote)
                    .map(|at| index + 1 + at + 1)
                    .unwrap_or(bytes.len());
            }
            b'[' => {
                index = rest[1..]
                    .find(']')
                    .map(|at| index + 1 + at + 1)
                    .unwrap_or(bytes.len());
            }
            b'?' => {
                count += 1;
                index += 1;
            }
            _ => index += 1,
        }
    }
    count
}

/// Splits a SQL text into statements at semicolons outside string literals,
/// quoted identifiers and comments, keeping each statement's byte offset.
pub(crate) fn split_statements(sql: &str) -> Vec<(usize, &str)> {
    let mut statements = Vec::new();
    let mut start = 0;
    let mut index = 0;
    let bytes = sql.as_bytes();
    while index < bytes.len() {
        let rest = &sql[index..];
        if rest.starts_with("--") {
            index += rest.find('\n').map(|at| at + 1).unwrap_or(rest.len());
            continue;
        }
        if rest.starts_with("/*") {
            index += rest.find("*/").map(|at| at + 2).unwrap_or(rest.len());
            continue;
        }
        match bytes[index] {
            b'\'' | b'"' | b'`' => {
                let quote = bytes[index] as char;
                let closed = rest[1..]
                    .find(quote)
                    .map(|at| index + 1 + at + 1)
                    .unwrap_or(bytes.len());
                index = closed;
            }
            b'[' => {
                let closed = rest[1..]
                    .find(']')
                    .map(|at| index + 1 + at + 1)
                    .unwrap_or(bytes.len());
                index = closed;
            }
            b';' => {
                push_statement(sql, start, index, &mut statements);
                index += 1;
                start = index;
            }
            _ => index += 1,
        }
    }
    push_statement(sql, start, bytes.len(), &mut statements);
    statements
}

fn push_statement<'sql>(
    sql: &'sql str,
    start: usize,
    end: usize,
    statements: &mut Vec<(usize, &'sql str)>,
) {
    let text = &sql[start..end];
    let trimmed = text.trim_start();
    let offset = start + (text.len() - trimmed.len());
    let trimmed = trimmed.trim_end();
    if !trimmed.is_empty() {
        statements.push((offset, trimmed));
    }
}
