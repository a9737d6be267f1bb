
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RbdbError {
    #[error("Unsafe variables in rule head: {}", .0.join(", "))]
    UnsafeVariables(Vec<String>),
    #[error("A formula may hold at most 256 distinct variables")]
    TooManyVariables,
    #[error("Encoding error: {0}")]
    Encoding(String),
    #[error("Unknown predicate: {0}")]
    UnknownPredicate(String),
    #[error("Assertion already present in the rule store")]
    DuplicateAssertion,
    #[error("Formula queries may not contain body predicates")]
    UnsupportedQuery,
    #[error("Unsupported term type: {0}")]
    UnsupportedTermType(String),
    #[error("Quoted column names are not supported")]
    QuotedColumnNotSupported,
    #[error("Wrong parameter count: expected {expected}, got {got}")]
    WrongParameterCount { expected: usize, got: usize },
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("SQL error: {0}")]
    Sql(#[from] rusqlite::Error),
    #[error("Internal invariant violated: {0}")]
    Invariant(String),
}

pub type Result<T> = std::result::Result<T, RbdbError>;

/// Extracts the relation name from the engine's missing-relation message,
/// with any schema qualifier stripped. Rescue keys off this name.
pub(crate) fn missing_relation(error: &rusqlite::Error) -> Option<String> {
    let message = match error {
        rusqlite::Error::SqliteFailure(_, Some(message)) => message.as_str(),
        _ => return None,
    };
    for prefix in ["no such table: ", "no such view: "] {
        if let Some(name) = message.strip_prefix(prefix) {
            let name = name.trim().rsplit('.').next().unwrap_or(name);
            return Some(name.to_string());
        }
    }
    None
}
