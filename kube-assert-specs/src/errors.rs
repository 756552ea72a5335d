//! Error types for the harness.
//!
//! Configuration and template loading failures, plus the ways a polled
//! check can end without success.

use kube_assert::MatchError;
use thiserror::Error;

/// Errors that can occur while running templates through the harness.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// The harness configuration file could not be read or parsed.
    #[error("invalid harness config: {path}: {message}")]
    Config { path: String, message: String },

    /// A template file could not be read.
    #[error("failed to load template: {path}: {message}")]
    Load { path: String, message: String },

    /// `eventually` ran out of time; carries the last check error.
    #[error("timed out after {attempts} attempt(s): {last}")]
    Timeout { attempts: usize, last: MatchError },

    /// `consistently` saw a failing poll.
    #[error("check failed on attempt {attempt}: {error}")]
    Inconsistent { attempt: usize, error: MatchError },

    /// A parse, binding, expression or store error; never retried.
    #[error(transparent)]
    Check(#[from] MatchError),
}

impl HarnessError {
    /// The check error behind a polling failure, if any.
    pub fn match_error(&self) -> Option<&MatchError> {
        match self {
            HarnessError::Timeout { last, .. } => Some(last),
            HarnessError::Inconsistent { error, .. } => Some(error),
            HarnessError::Check(error) => Some(error),
            HarnessError::Config { .. } | HarnessError::Load { .. } => None,
        }
    }
}

/// Result type for harness operations.
pub type HarnessResult<T> = Result<T, HarnessError>;
