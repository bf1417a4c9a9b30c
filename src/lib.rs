//! asymptote - asymptotic complexity inference for pseudocode
//!
//! Procedures are parsed into an [`ast::Program`], resolved callees-first by
//! the [`engine`], memoized in the [`knowledge`] base by structural
//! [`fingerprint`], and handed to the [`oracle`] only when the formal rules
//! and the [`recurrence`] resolver cannot classify a structure.

pub mod ast;
pub mod cache;
pub mod cli;
pub mod complexity;
pub mod config;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod knowledge;
pub mod oracle;
pub mod parser;
pub mod recurrence;
pub mod reporters;

pub use complexity::{ComplexityVerdict, GrowthClass, Provenance, Theta};
pub use engine::{AnalysisEngine, FileOutcome, ProgramReport};
pub use error::{AsymptoteError, ParseFailure};
