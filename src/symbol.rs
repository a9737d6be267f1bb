//! Symbol algebra: the logical values RBDB reasons about.
//!
//! Three value types build on each other:
//! * A [`Term`] is a variable or a constant (string, number, boolean).
//! * A [`Predicate`] applies a lowercased name to an ordered sequence of terms.
//! * A [`Formula`] is a Horn clause: one positive head predicate and a
//!   possibly empty sequence of negative body predicates. A *fact* is a
//!   formula with an empty body and a ground head.
//!
//! All three carry deep equality, a total order and `canonicalize()`.
//! Canonicalization replaces variable identities with indices 0, 1, … in
//! order of first occurrence (head first, then body) and sorts the body by
//! the predicate order, so that two rules equivalent up to variable renaming
//! and body reordering compare equal and encode to identical bytes.
//!
//! Traversals are written against the [`Rewriter`] and [`Reducer`] traits,
//! whose default methods recurse; concrete visitors override only the level
//! they change.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

use crate::error::{RbdbError, Result};

// ------------- Variable -------------
/// A logical variable. Fresh variables are distinguished by a process-wide
/// counter until canonicalization assigns them a stable index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Variable {
    Fresh(u64),
    Indexed(u8),
}

static FRESH_COUNTER: AtomicU64 = AtomicU64::new(0);

impl Variable {
    /// Mints a variable distinct from every other fresh variable in the process.
    pub fn fresh() -> Self {
        Variable::Fresh(FRESH_COUNTER.fetch_add(1, AtomicOrdering::Relaxed))
    }
    /// The display name of a canonical index: `A`–`Z`, then `AA`, `AB`, …
    pub fn display_name(index: u8) -> String {
        let mut remainder = index as u32;
        let mut name = String::new();
        loop {
            name.insert(0, char::from(b'A' + (remainder % 26) as u8));
            if remainder < 26 {
                break;
            }
            remainder = remainder / 26 - 1;
        }
        name
    }
    /// The name this variable shows up under in query results.
    pub fn name(&self) -> String {
        match self {
            Variable::Indexed(index) => Variable::display_name(*index),
            Variable::Fresh(identity) => format!("?{}", identity),
        }
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ------------- Term -------------
/// A term: a variable or one of the three constant kinds. Numbers are
/// IEEE-754 doubles; `total_cmp` and bit equality make them totally ordered
/// and hashable, with NaN rejected later at encode time.
#[derive(Clone, Debug)]
pub enum Term {
    Variable(Variable),
    String(String),
    Number(f64),
    Boolean(bool),
}

impl Term {
    pub fn is_variable(&self) -> bool {
        matches!(self, Term::Variable(_))
    }
    pub fn is_constant(&self) -> bool {
        !self.is_variable()
    }
    // Variant rank for ordering: variables sort before all constants.
    fn rank(&self) -> u8 {
        match self {
            Term::Variable(_) => 0,
            Term::String(_) => 1,
            Term::Number(_) => 2,
            Term::Boolean(_) => 3,
        }
    }
}

impl PartialEq for Term {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Term::Variable(a), Term::Variable(b)) => a == b,
            (Term::String(a), Term::String(b)) => a == b,
            (Term::Number(a), Term::Number(b)) => a.to_bits() == b.to_bits(),
            (Term::Boolean(a), Term::Boolean(b)) => a == b,
            _ => false,
        }
    }
}
impl Eq for Term {}
impl Ord for Term {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Term::Variable(a), Term::Variable(b)) => a.cmp(b),
            (Term::String(a), Term::String(b)) => a.cmp(b),
            (Term::Number(a), Term::Number(b)) => a.total_cmp(b),
            // false < true, matching the engine's ordering of 0 < 1
            (Term::Boolean(a), Term::Boolean(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}
impl PartialOrd for Term {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Hash for Term {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Term::Variable(variable) => variable.hash(state),
            Term::String(string) => string.hash(state),
            Term::Number(number) => number.to_bits().hash(state),
            Term::Boolean(boolean) => boolean.hash(state),
        }
    }
}
impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Term::Variable(variable) => write!(f, "{}", variable),
            Term::String(string) => write!(f, "\"{}\"", string),
            Term::Number(number) => write!(f, "{}", number),
            Term::Boolean(boolean) => write!(f, "{}", boolean),
        }
    }
}

impl From<Variable> for Term {
    fn from(variable: Variable) -> Self {
        Term::Variable(variable)
    }
}
impl From<&str> for Term {
    fn from(string: &str) -> Self {
        Term::String(string.to_owned())
    }
}
impl From<String> for Term {
    fn from(string: String) -> Self {
        Term::String(string)
    }
}
impl From<f64> for Term {
    fn from(number: f64) -> Self {
        Term::Number(number)
    }
}
impl From<i64> for Term {
    fn from(number: i64) -> Self {
        Term::Number(number as f64)
    }
}
impl From<bool> for Term {
    fn from(boolean: bool) -> Self {
        Term::Boolean(boolean)
    }
}

// ------------- Predicate -------------
/// A named relation applied to terms. The name is lowercased on
/// construction, which is the single place case policy is enforced.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Predicate {
    name: String,
    terms: Vec<Term>,
}

impl Predicate {
    pub fn new(name: &str, terms: Vec<Term>) -> Self {
        Self {
            name: name.to_lowercase(),
            terms,
        }
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn terms(&self) -> &[Term] {
        &self.terms
    }
    pub fn arity(&self) -> usize {
        self.terms.len()
    }
    pub fn is_ground(&self) -> bool {
        self.terms.iter().all(Term::is_constant)
    }
    /// Canonicalizes this predicate in isolation.
    pub fn canonicalize(&self) -> Result<Predicate> {
        Canonicalizer::default().rewrite_predicate(self)
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut arguments = String::new();
        for term in &self.terms {
            arguments += &(term.to_string() + ", ");
        }
        arguments.truncate(arguments.len().saturating_sub(2));
        write!(f, "{}({})", self.name, arguments)
    }
}

// ------------- Formula -------------
/// A Horn clause. The body length discriminates facts from rules.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Formula {
    head: Predicate,
    body: Vec<Predicate>,
}

impl Formula {
    pub fn fact(head: Predicate) -> Self {
        Self {
            head,
            body: Vec::new(),
        }
    }
    pub fn rule(head: Predicate, body: Vec<Predicate>) -> Self {
        Self { head, body }
    }
    pub fn head(&self) -> &Predicate {
        &self.head
    }
    pub fn body(&self) -> &[Predicate] {
        &self.body
    }
    pub fn is_fact(&self) -> bool {
        self.body.is_empty() && self.head.is_ground()
    }
    /// Rewrites variables to indices in first-occurrence order and sorts the
    /// body. Index assignment and body order feed each other (indices take
    /// part in the predicate order), so the pass repeats until it reaches a
    /// fixed point, which makes canonicalization idempotent.
    pub fn canonicalize(&self) -> Result<Formula> {
        let mut current = self.clone();
        for _ in 0..self.body.len() + 2 {
            let mut next = Canonicalizer::default().rewrite_formula(&current)?;
            next.body.sort();
            if next == current {
                return Ok(next);
            }
            current = next;
        }
        Err(RbdbError::Invariant(
            "canonicalization did not converge".to_string(),
        ))
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.head)?;
        for (position, predicate) in self.body.iter().enumerate() {
            write!(
                f,
                "{}{}",
                if position == 0 { " :- " } else { ", " },
                predicate
            )?;
        }
        Ok(())
    }
}

// ------------- Traversal -------------
/// Structure-preserving rewriting over the symbol algebra. Defaults recurse;
/// implementations override the level they transform.
pub trait Rewriter {
    fn rewrite_term(&mut self, term: &Term) -> Result<Term> {
        Ok(term.clone())
    }
    fn rewrite_predicate(&mut self, predicate: &Predicate) -> Result<Predicate> {
        let mut terms = Vec::with_capacity(predicate.arity());
        for term in predicate.terms() {
            terms.push(self.rewrite_term(term)?);
        }
        Ok(Predicate {
            name: predicate.name.clone(),
            terms,
        })
    }
    fn rewrite_formula(&mut self, formula: &Formula) -> Result<Formula> {
        let head = self.rewrite_predicate(&formula.head)?;
        let mut body = Vec::with_capacity(formula.body.len());
        for predicate in &formula.body {
            body.push(self.rewrite_predicate(predicate)?);
        }
        Ok(Formula { head, body })
    }
}

/// Accumulating traversal over the symbol algebra.
pub trait Reducer<R> {
    fn reduce_term(&mut self, _term: &Term, accumulator: R) -> R {
        accumulator
    }
    fn reduce_predicate(&mut self, predicate: &Predicate, accumulator: R) -> R {
        predicate
            .terms()
            .iter()
            .fold(accumulator, |accumulator, term| {
                self.reduce_term(term, accumulator)
            })
    }
    fn reduce_formula(&mut self, formula: &Formula, accumulator: R) -> R {
        let accumulator = self.reduce_predicate(&formula.head, accumulator);
        formula
            .body
            .iter()
            .fold(accumulator, |accumulator, predicate| {
                self.reduce_predicate(predicate, accumulator)
            })
    }
}

// ------------- Canonicalization -------------
#[derive(Default)]
struct Canonicalizer {
    assigned: HashMap<Variable, u8>,
    next: u16,
}

impl Rewriter for Canonicalizer {
    fn rewrite_term(&mut self, term: &Term) -> Result<Term> {
        let variable = match term {
            Term::Variable(variable) => variable,
            constant => return Ok(constant.clone()),
        };
        let index = match self.assigned.get(variable) {
            Some(index) => *index,
            None => {
                if self.next > u8::MAX as u16 {
                    return Err(RbdbError::TooManyVariables);
                }
                let index = self.next as u8;
                self.assigned.insert(*variable, index);
                self.next += 1;
                index
            }
        };
        Ok(Term::Variable(Variable::Indexed(index)))
    }
}

impl Term {
    /// Canonicalizes this term in isolation.
    pub fn canonicalize(&self) -> Result<Term> {
        Canonicalizer::default().rewrite_term(self)
    }
}

// ------------- Validation -------------
struct VariableCollector;

impl Reducer<BTreeSet<Variable>> for VariableCollector {
    fn reduce_term(&mut self, term: &Term, mut accumulator: BTreeSet<Variable>) -> BTreeSet<Variable> {
        if let Term::Variable(variable) = term {
            accumulator.insert(*variable);
        }
        accumulator
    }
}

/// Rejects unsafe rules: every variable in the head must also appear in at
/// least one body predicate. Runs on canonical formulas so the reported
/// names are deterministic.
pub fn validate(formula: &Formula) -> Result<()> {
    let mut collector = VariableCollector;
    let head = collector.reduce_predicate(formula.head(), BTreeSet::new());
    let body = formula
        .body()
        .iter()
        .fold(BTreeSet::new(), |accumulator, predicate| {
            collector.reduce_predicate(predicate, accumulator)
        });
    let unsafe_variables: Vec<String> = head
        .difference(&body)
        .map(|variable| variable.name())
        .collect();
    if unsafe_variables.is_empty() {
        Ok(())
    } else {
        Err(RbdbError::UnsafeVariables(unsafe_variables))
    }
}
