//! Error types for template parsing, store access and matching.

use crate::field::FieldErrors;
use std::fmt;
use thiserror::Error;

/// Malformed template text or an unexpected number of documents.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    /// The raw text is not valid YAML/JSON.
    #[error("invalid template document: {0}")]
    Syntax(String),

    /// A document is neither a mapping nor empty.
    #[error("template document must be a mapping, found a {found}")]
    NotAMapping { found: &'static str },

    /// A resource document lacks `apiVersion` and/or `kind`.
    #[error("template document is missing `{missing}`")]
    MissingIdentity { missing: &'static str },

    /// An identity field has the wrong shape.
    #[error("invalid `{field}`: {message}")]
    InvalidIdentity { field: String, message: String },

    /// The caller required a specific number of documents.
    #[error("expected exactly {}; found {found}", resource_count(.expected))]
    CountMismatch { expected: usize, found: usize },
}

fn resource_count(expected: &usize) -> String {
    match *expected {
        1 => "one resource".to_string(),
        n => format!("{} resources", n),
    }
}

/// Failure reported by an [`ObjectStore`](crate::store::ObjectStore).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// A point lookup found nothing.
    #[error("{kind} {key} not found")]
    NotFound { kind: String, key: String },

    /// The caller-supplied deadline passed before the store answered.
    #[error("store deadline exceeded")]
    DeadlineExceeded,

    /// Any other backend failure.
    #[error("store request failed: {0}")]
    Backend(String),
}

/// Errors produced by a check call.
///
/// Only [`MatchError::Mismatch`] aggregates several causes; every other
/// variant short-circuits the call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MatchError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// A placeholder or expression referenced a binding that does not exist.
    #[error("undefined variable `{name}`")]
    UndefinedVariable { name: String },

    /// A binding exists but cannot be used where it was referenced.
    #[error("binding `{name}`: {message}")]
    Binding { name: String, message: String },

    /// A computed-key expression is unusable (syntax, unknown function, arity).
    #[error("expression `{expression}`: {message}")]
    Expression { expression: String, message: String },

    /// Store failure other than "not found" on a point lookup.
    #[error(transparent)]
    Store(StoreError),

    /// A point lookup by name found nothing.
    #[error("actual resource not found")]
    NotFound { identity: String },

    /// A list lookup returned an empty candidate set.
    #[error("no actual resource found")]
    NoCandidates { identity: String },

    /// Every candidate failed to match.
    #[error("{0}")]
    Mismatch(MismatchReport),
}

impl MatchError {
    /// Whether this error is a legitimate "did not match" outcome rather than
    /// a usage, parse or store error.
    pub fn is_mismatch(&self) -> bool {
        matches!(
            self,
            MatchError::NotFound { .. } | MatchError::NoCandidates { .. } | MatchError::Mismatch(_)
        )
    }
}

/// Result type for check operations.
pub type MatchResult<T> = Result<T, MatchError>;

/// Field errors collected for one candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateMismatch {
    /// Candidate identity, `None` for field-only checks.
    pub candidate: Option<String>,
    pub errors: FieldErrors,
}

impl CandidateMismatch {
    pub fn new(candidate: Option<String>, errors: FieldErrors) -> Self {
        Self { candidate, errors }
    }
}

/// Aggregated diagnostics, one entry per non-matching candidate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MismatchReport {
    pub candidates: Vec<CandidateMismatch>,
}

impl MismatchReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(candidate: Option<String>, errors: FieldErrors) -> Self {
        Self {
            candidates: vec![CandidateMismatch::new(candidate, errors)],
        }
    }

    pub fn push(&mut self, mismatch: CandidateMismatch) {
        self.candidates.push(mismatch);
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Total number of field errors across all candidates.
    pub fn error_count(&self) -> usize {
        self.candidates.iter().map(|c| c.errors.len()).sum()
    }
}

impl fmt::Display for MismatchReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, mismatch) in self.candidates.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            match &mismatch.candidate {
                Some(candidate) => {
                    write!(f, "{}:", candidate)?;
                    for error in &mismatch.errors {
                        write!(f, "\n- {}", error)?;
                    }
                }
                None => write!(f, "{}", mismatch.errors)?,
            }
        }
        Ok(())
    }
}
