//! Error taxonomy
//!
//! Parse failures stop analysis of a single file. Oracle failures degrade
//! one procedure to an `error` verdict. Knowledge-base failures are fatal
//! only when the store cannot be opened. `AnalysisIssue` values are
//! internal routing signals that send a subtree to the oracle.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Syntax error reported by the front end. No partial program is produced.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[error("{file}:{line}:{column}: {message}")]
pub struct ParseFailure {
    pub file: String,
    pub line: u32,
    pub column: u32,
    pub message: String,
}

impl ParseFailure {
    pub fn new(file: impl Into<String>, line: u32, column: u32, message: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line,
            column,
            message: message.into(),
        }
    }
}

/// Errors from the knowledge base
#[derive(Error, Debug)]
pub enum KnowledgeBaseError {
    #[error("Cannot open knowledge base at {path}: {reason}")]
    Open { path: PathBuf, reason: String },

    #[error("Knowledge base I/O failed: {0}")]
    Io(#[from] redb::Error),

    #[error("Corrupt record {key}: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to encode record: {0}")]
    Encode(serde_json::Error),
}

/// Errors from the external classifier
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OracleError {
    /// Unreachable, misconfigured or timed out.
    #[error("Oracle unavailable: {0}")]
    Unavailable(String),

    /// Reply could not be read as the growth vocabulary.
    #[error("Malformed oracle response: {0}")]
    MalformedResponse(String),

    #[error("Oracle rate limited: {0}")]
    RateLimited(String),
}

/// Reasons the formal rules hand a structure to the oracle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisIssue {
    UnresolvableStructure(String),
    RecurrenceAmbiguous(String),
}

impl fmt::Display for AnalysisIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalysisIssue::UnresolvableStructure(what) => write!(f, "unresolvable structure: {}", what),
            AnalysisIssue::RecurrenceAmbiguous(what) => write!(f, "ambiguous recurrence: {}", what),
        }
    }
}

/// Crate-level error
#[derive(Error, Debug)]
pub enum AsymptoteError {
    #[error(transparent)]
    Parse(#[from] ParseFailure),

    #[error(transparent)]
    KnowledgeBase(#[from] KnowledgeBaseError),

    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AsymptoteError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_failure_display() {
        let e = ParseFailure::new("sort.psc", 4, 12, "expected 'then'");
        assert_eq!(e.to_string(), "sort.psc:4:12: expected 'then'");
        let wrapped: AsymptoteError = e.into();
        assert!(wrapped.to_string().contains("expected 'then'"));
    }

    #[test]
    fn test_oracle_error_display() {
        assert_eq!(
            OracleError::RateLimited("429".into()).to_string(),
            "Oracle rate limited: 429"
        );
    }
}
