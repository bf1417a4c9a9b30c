//! What the engine hands to the reporting layer

use crate::ast::Position;
use crate::complexity::ComplexityVerdict;
use crate::error::ParseFailure;
use crate::fingerprint::Fingerprint;
use serde::Serialize;
use std::fmt;

/// Name under which a program's main block is reported.
pub const MAIN_BLOCK: &str = "<main>";

/// Which rule produced a piece of the derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rule {
    ForLoop,
    WhileLoop,
    Conditional,
    EarlyExit,
    Call,
    Recurrence,
    KnowledgeBase,
    Oracle,
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Rule::ForLoop => "for-loop",
            Rule::WhileLoop => "while-loop",
            Rule::Conditional => "conditional",
            Rule::EarlyExit => "early-exit",
            Rule::Call => "call",
            Rule::Recurrence => "recurrence",
            Rule::KnowledgeBase => "knowledge-base",
            Rule::Oracle => "oracle",
        };
        f.write_str(s)
    }
}

/// One step of a derivation trace.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TraceStep {
    pub position: Position,
    pub rule: Rule,
    pub detail: String,
}

impl TraceStep {
    pub fn new(position: Position, rule: Rule, detail: impl Into<String>) -> Self {
        Self {
            position,
            rule,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcedureStatus {
    Analyzed,
    /// The batch was cancelled before this procedure's group was reached.
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcedureReport {
    pub name: String,
    pub position: Position,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<Fingerprint>,
    pub status: ProcedureStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict: Option<ComplexityVerdict>,
    /// Other members of a recursive call group.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub group: Vec<String>,
    pub trace: Vec<TraceStep>,
}

impl ProcedureReport {
    pub fn skipped(name: impl Into<String>, position: Position) -> Self {
        Self {
            name: name.into(),
            position,
            fingerprint: None,
            status: ProcedureStatus::Skipped,
            verdict: None,
            group: Vec::new(),
            trace: Vec::new(),
        }
    }
}

/// Verdicts for every procedure of one file, in resolution order.
#[derive(Debug, Clone, Serialize)]
pub struct ProgramReport {
    pub file: String,
    pub procedures: Vec<ProcedureReport>,
    pub cancelled: bool,
}

impl ProgramReport {
    pub fn procedure(&self, name: &str) -> Option<&ProcedureReport> {
        self.procedures.iter().find(|p| p.name == name)
    }

    pub fn verdict(&self, name: &str) -> Option<&ComplexityVerdict> {
        self.procedure(name).and_then(|p| p.verdict.as_ref())
    }
}

/// Per-file result of a batch.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FileOutcome {
    Analyzed(ProgramReport),
    ParseFailed(ParseFailure),
}

impl FileOutcome {
    pub fn file(&self) -> &str {
        match self {
            FileOutcome::Analyzed(r) => &r.file,
            FileOutcome::ParseFailed(f) => &f.file,
        }
    }
}
