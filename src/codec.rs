//! Deterministic serialization of Horn clauses.
//!
//! A formula is encoded as a self-describing JSON array
//!
//! ```text
//! [ "@head-name", head-arg-0, head-arg-1, …, body-predicate-0, … ]
//! ```
//!
//! where each term is a single-key map (`""` for constants, `"v"` for
//! canonical variable indices) and each body predicate is an array
//! `[name, arg-0, …]`. The leading `@` sentinel marks the element-0 tag as a
//! Horn-clause head; the rule store's generated columns and indexes key off
//! it. Only canonical formulas encode, so canonically equal formulas yield
//! byte-identical text and the rule store's uniqueness constraint holds.
//!
//! The decoder ignores unrecognized map keys and prefers later-defined
//! variants when several recognized keys are present, which leaves room to
//! grow the term encoding without breaking stored formulas.

use serde_json::{Map, Number, Value};

use crate::error::{RbdbError, Result};
use crate::symbol::{Formula, Predicate, Term, Variable};

/// Marks an element-0 type tag as a Horn-clause head.
pub const HEAD_SENTINEL: char = '@';

// Term variant keys, in definition order. Later wins on decode.
const CONSTANT_KEY: &str = "";
const VARIABLE_KEY: &str = "v";

/// Encodes a canonical formula as its canonical JSON text.
pub fn encode(formula: &Formula) -> Result<String> {
    if formula.canonicalize()? != *formula {
        return Err(RbdbError::Encoding(
            "only canonical formulas can be encoded".to_string(),
        ));
    }
    let head = formula.head();
    let mut elements = Vec::with_capacity(1 + head.arity() + formula.body().len());
    elements.push(Value::String(format!("{}{}", HEAD_SENTINEL, head.name())));
    for term in head.terms() {
        elements.push(encode_term(term)?);
    }
    for predicate in formula.body() {
        elements.push(encode_body_predicate(predicate)?);
    }
    Ok(Value::Array(elements).to_string())
}

/// The type tag of a formula with the given head name.
pub fn output_type(name: &str) -> String {
    format!("{}{}", HEAD_SENTINEL, name)
}

fn encode_term(term: &Term) -> Result<Value> {
    let (key, value) = match term {
        Term::Variable(Variable::Indexed(index)) => (VARIABLE_KEY, Value::from(*index)),
        Term::Variable(Variable::Fresh(_)) => {
            return Err(RbdbError::Encoding(
                "fresh variable escaped canonicalization".to_string(),
            ))
        }
        Term::String(string) => (CONSTANT_KEY, Value::from(string.clone())),
        Term::Number(number) => {
            let number = Number::from_f64(*number)
                .ok_or_else(|| RbdbError::Encoding("non-finite number".to_string()))?;
            (CONSTANT_KEY, Value::Number(number))
        }
        Term::Boolean(boolean) => (CONSTANT_KEY, Value::from(*boolean)),
    };
    let mut map = Map::new();
    map.insert(key.to_string(), value);
    Ok(Value::Object(map))
}

fn encode_body_predicate(predicate: &Predicate) -> Result<Value> {
    let mut elements = Vec::with_capacity(1 + predicate.arity());
    elements.push(Value::String(predicate.name().to_string()));
    for term in predicate.terms() {
        elements.push(encode_term(term)?);
    }
    Ok(Value::Array(elements))
}

/// Decodes encoded formula text (or the `json()` rendering of a stored
/// formula) back into a formula.
pub fn decode(text: &str) -> Result<Formula> {
    let value: Value =
        serde_json::from_str(text).map_err(|error| RbdbError::Encoding(error.to_string()))?;
    let elements = value
        .as_array()
        .ok_or_else(|| RbdbError::Encoding("formula encoding must be an array".to_string()))?;
    let tag = elements
        .first()
        .and_then(Value::as_str)
        .ok_or_else(|| RbdbError::Encoding("missing type tag".to_string()))?;
    let name = tag.strip_prefix(HEAD_SENTINEL).ok_or_else(|| {
        RbdbError::Encoding(format!("type tag {:?} lacks the head sentinel", tag))
    })?;
    let mut head_terms = Vec::new();
    let mut body = Vec::new();
    for element in &elements[1..] {
        match element {
            Value::Object(_) if body.is_empty() => head_terms.push(decode_term(element)?),
            Value::Object(_) => {
                return Err(RbdbError::Encoding(
                    "head argument after body predicate".to_string(),
                ))
            }
            Value::Array(_) => body.push(decode_body_predicate(element)?),
            other => {
                return Err(RbdbError::Encoding(format!(
                    "unexpected formula element {}",
                    other
                )))
            }
        }
    }
    Ok(Formula::rule(Predicate::new(name, head_terms), body))
}

fn decode_term(value: &Value) -> Result<Term> {
    let map = value
        .as_object()
        .ok_or_else(|| RbdbError::Encoding(format!("term must be a map, got {}", value)))?;
    // Later-defined variants win when several recognized keys are present;
    // unknown keys are skipped entirely.
    if let Some(index) = map.get(VARIABLE_KEY) {
        let index = index
            .as_u64()
            .filter(|index| *index <= u8::MAX as u64)
            .ok_or_else(|| RbdbError::Encoding(format!("bad variable index {}", index)))?;
        return Ok(Term::Variable(Variable::Indexed(index as u8)));
    }
    if let Some(constant) = map.get(CONSTANT_KEY) {
        return decode_constant(constant);
    }
    Err(RbdbError::Encoding(format!(
        "no recognized term variant in {}",
        value
    )))
}

fn decode_constant(value: &Value) -> Result<Term> {
    match value {
        Value::String(string) => Ok(Term::String(string.clone())),
        Value::Number(number) => number
            .as_f64()
            .map(Term::Number)
            .ok_or_else(|| RbdbError::Encoding(format!("unrepresentable number {}", number))),
        Value::Bool(boolean) => Ok(Term::Boolean(*boolean)),
        other => Err(RbdbError::Encoding(format!(
            "unsupported constant {}",
            other
        ))),
    }
}

fn decode_body_predicate(value: &Value) -> Result<Predicate> {
    let elements = value
        .as_array()
        .ok_or_else(|| RbdbError::Encoding("body predicate must be an array".to_string()))?;
    let name = elements
        .first()
        .and_then(Value::as_str)
        .ok_or_else(|| RbdbError::Encoding("body predicate lacks a name".to_string()))?;
    let mut terms = Vec::with_capacity(elements.len().saturating_sub(1));
    for element in &elements[1..] {
        terms.push(decode_term(element)?);
    }
    Ok(Predicate::new(name, terms))
}
