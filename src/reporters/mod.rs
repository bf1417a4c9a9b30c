//! Output reporters for batch results
//!
//! Supports two output formats:
//! - `text` - Terminal output with colors
//! - `json` - Machine-readable JSON

mod json;
mod text;

use crate::engine::FileOutcome;
use anyhow::{anyhow, Result};
use std::str::FromStr;

/// Supported output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "txt" | "terminal" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(anyhow!("Unknown format '{}'. Valid formats: text, json", s)),
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Rendering switches that only the text format honours.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderOptions {
    /// Print each procedure's derivation trace under its verdict.
    pub trace: bool,
}

/// Render batch outcomes in the specified format
pub fn render(outcomes: &[FileOutcome], format: OutputFormat, options: RenderOptions) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(text::render(outcomes, options)),
        OutputFormat::Json => json::render(outcomes),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::ast::Position;
    use crate::complexity::{ComplexityVerdict, GrowthClass, Provenance, Theta, UnknownCause};
    use crate::engine::{ProcedureReport, ProcedureStatus, ProgramReport, Rule, TraceStep};
    use crate::error::ParseFailure;

    /// One analyzed file with a tight, a divergent and an unknown verdict,
    /// plus one file that failed to parse.
    pub(crate) fn test_outcomes() -> Vec<FileOutcome> {
        let search = ComplexityVerdict {
            big_o: GrowthClass::Linear,
            big_omega: GrowthClass::Constant,
            big_theta: Theta::None,
            provenance: Provenance::Formal,
            confidence: 1.0,
            cause: None,
            source: None,
        };
        let procedures = vec![
            ProcedureReport {
                name: "sort".into(),
                position: Position::new(1, 1),
                fingerprint: None,
                status: ProcedureStatus::Analyzed,
                verdict: Some(ComplexityVerdict::tight(GrowthClass::Quadratic, Provenance::Formal, 1.0)),
                group: Vec::new(),
                trace: vec![TraceStep::new(Position::new(3, 3), Rule::ForLoop, "n iterations")],
            },
            ProcedureReport {
                name: "search".into(),
                position: Position::new(9, 1),
                fingerprint: None,
                status: ProcedureStatus::Analyzed,
                verdict: Some(search),
                group: Vec::new(),
                trace: Vec::new(),
            },
            ProcedureReport {
                name: "mystery".into(),
                position: Position::new(20, 1),
                fingerprint: None,
                status: ProcedureStatus::Analyzed,
                verdict: Some(ComplexityVerdict::error(UnknownCause::OracleFailure("timed out".into()))),
                group: Vec::new(),
                trace: Vec::new(),
            },
            ProcedureReport::skipped("later", Position::new(30, 1)),
        ];
        vec![
            FileOutcome::Analyzed(ProgramReport {
                file: "algos.psc".into(),
                procedures,
                cancelled: true,
            }),
            FileOutcome::ParseFailed(ParseFailure::new("broken.psc", 4, 12, "expected 'then'")),
        ]
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!(OutputFormat::from_str("text").unwrap(), OutputFormat::Text);
        assert_eq!(OutputFormat::from_str("JSON").unwrap(), OutputFormat::Json);
        assert!(OutputFormat::from_str("sarif").is_err());
        assert_eq!(OutputFormat::default().to_string(), "text");
    }
}
