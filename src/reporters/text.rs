//! Text (terminal) reporter with colors and formatting

use crate::complexity::{ComplexityVerdict, Provenance};
use crate::engine::{FileOutcome, ProcedureReport, ProcedureStatus, ProgramReport};
use crate::error::ParseFailure;
use super::RenderOptions;
use console::style;

/// Render outcomes as formatted terminal output
pub fn render(outcomes: &[FileOutcome], options: RenderOptions) -> String {
    let mut out = String::new();
    let mut procedures = 0usize;
    let mut unknown = 0usize;
    let mut failed = 0usize;

    for outcome in outcomes {
        match outcome {
            FileOutcome::Analyzed(report) => {
                procedures += report.procedures.len();
                unknown += report
                    .procedures
                    .iter()
                    .filter(|p| p.verdict.as_ref().map(|v| v.is_unknown()).unwrap_or(true))
                    .count();
                render_program(&mut out, report, options);
            }
            FileOutcome::ParseFailed(failure) => {
                failed += 1;
                render_failure(&mut out, failure);
            }
        }
    }

    out.push_str(&format!(
        "{}\n",
        style(format!(
            "{} files, {} procedures, {} unresolved, {} parse failures",
            outcomes.len(),
            procedures,
            unknown,
            failed
        ))
        .dim()
    ));
    out
}

fn render_program(out: &mut String, report: &ProgramReport, options: RenderOptions) {
    out.push_str(&format!("\n{}\n", style(&report.file).bold()));
    out.push_str(&format!("{}\n", style("─".repeat(40)).dim()));

    let width = report.procedures.iter().map(|p| p.name.chars().count()).max().unwrap_or(0);
    for proc in &report.procedures {
        render_procedure(out, proc, width, options);
    }
    if report.cancelled {
        out.push_str(&format!("  {}\n", style("analysis cancelled; remaining procedures skipped").yellow()));
    }
}

fn render_procedure(out: &mut String, proc: &ProcedureReport, width: usize, options: RenderOptions) {
    let name = format!("{:<width$}", proc.name, width = width);
    let verdict = match (&proc.status, &proc.verdict) {
        (ProcedureStatus::Skipped, _) | (_, None) => {
            out.push_str(&format!("  {}  {}\n", style(name).dim(), style("skipped").dim()));
            return;
        }
        (ProcedureStatus::Analyzed, Some(v)) => v,
    };

    out.push_str(&format!(
        "  {}  {}  {}\n",
        style(name).cyan(),
        format_bounds(verdict),
        format_provenance(verdict)
    ));
    if !proc.group.is_empty() {
        out.push_str(&format!("    {} {}\n", style("mutually recursive with").dim(), proc.group.join(", ")));
    }
    if let Some(ref cause) = verdict.cause {
        out.push_str(&format!("    {} {}\n", style("why unknown:").yellow(), cause));
    }
    if options.trace {
        for step in &proc.trace {
            out.push_str(&format!(
                "    {} {:<14} {}\n",
                style(format!("{:>7}", step.position.to_string())).dim(),
                step.rule.to_string(),
                step.detail
            ));
        }
    }
}

fn format_bounds(v: &ComplexityVerdict) -> String {
    let text = format!("O: {:<11} Ω: {:<11} Θ: {:<11}", v.big_o.to_string(), v.big_omega.to_string(), v.big_theta.to_string());
    if v.is_unknown() {
        style(text).red().to_string()
    } else {
        style(text).green().to_string()
    }
}

fn format_provenance(v: &ComplexityVerdict) -> String {
    let label = match v.provenance {
        Provenance::Oracle => format!("[oracle {:.2}]", v.confidence),
        other => format!("[{}]", other),
    };
    match v.provenance {
        Provenance::Error => style(label).red().to_string(),
        _ => style(label).dim().to_string(),
    }
}

fn render_failure(out: &mut String, failure: &ParseFailure) {
    out.push_str(&format!("\n{}\n", style(&failure.file).bold()));
    out.push_str(&format!(
        "  {} line {}, column {}: {}\n",
        style("parse error").red().bold(),
        failure.line,
        failure.column,
        failure.message
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporters::tests::test_outcomes;

    fn plain(options: RenderOptions) -> String {
        console::strip_ansi_codes(&render(&test_outcomes(), options)).into_owned()
    }

    #[test]
    fn test_text_render_verdicts() {
        let out = plain(RenderOptions::default());
        assert!(out.contains("algos.psc"));
        assert!(out.contains("O: O(n²)"));
        assert!(out.contains("Θ: none"));
        assert!(out.contains("[formal]"));
        assert!(out.contains("why unknown: oracle failure: timed out"));
        assert!(out.contains("skipped"));
        assert!(out.contains("analysis cancelled"));
        assert!(!out.contains("n iterations"));
    }

    #[test]
    fn test_text_render_parse_failure_and_summary() {
        let out = plain(RenderOptions::default());
        assert!(out.contains("broken.psc"));
        assert!(out.contains("parse error line 4, column 12: expected 'then'"));
        assert!(out.contains("2 files, 4 procedures, 2 unresolved, 1 parse failures"));
    }

    #[test]
    fn test_text_render_trace() {
        let out = plain(RenderOptions { trace: true });
        assert!(out.contains("for-loop"));
        assert!(out.contains("n iterations"));
    }
}
