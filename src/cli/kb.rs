//! Knowledge base maintenance commands

use super::KbAction;
use crate::config::AsymptoteConfig;
use crate::knowledge::{KnowledgeBase, KnowledgeRecord, KnowledgeStats};
use crate::fingerprint::Fingerprint;
use anyhow::{Context, Result};
use console::style;
use std::path::PathBuf;

pub(super) fn run(action: KbAction, kb: Option<PathBuf>) -> Result<()> {
    let path = match kb {
        Some(path) => path,
        None => AsymptoteConfig::load()?.kb_path(),
    };
    let kb = KnowledgeBase::open(&path)
        .with_context(|| format!("Failed to open knowledge base at {}", path.display()))?;

    match action {
        KbAction::Stats => {
            let stats = kb.stats()?;
            print!("{}", format_stats(&kb, &stats));
        }
        KbAction::List { limit } => {
            let records = kb.list()?;
            if records.is_empty() {
                println!("Knowledge base is empty.");
                return Ok(());
            }
            let shown = limit.unwrap_or(records.len()).min(records.len());
            for (fp, record) in records.iter().take(shown) {
                println!("{}", format_record(fp, record));
            }
            if shown < records.len() {
                println!("{}", style(format!("...and {} more", records.len() - shown)).dim());
            }
        }
        KbAction::Clear => {
            let removed = kb.clear()?;
            println!(
                "{} Removed {} record{} from {}",
                style("✓").green(),
                removed,
                if removed == 1 { "" } else { "s" },
                style(kb.path().display()).cyan()
            );
        }
    }
    Ok(())
}

fn format_stats(kb: &KnowledgeBase, stats: &KnowledgeStats) -> String {
    format!(
        "\nKnowledge base: {}\n\n  Records: {}\n  Formal:  {}\n  Oracle:  {}\n  Stale:   {}\n\n",
        style(kb.path().display()).cyan(),
        style(stats.total).bold(),
        stats.formal,
        stats.oracle,
        stats.stale
    )
}

fn format_record(fp: &Fingerprint, record: &KnowledgeRecord) -> String {
    format!(
        "{}  O: {:<11} Ω: {:<11} Θ: {:<11} {:<6} {:.2}  {}",
        style(fp.short()).dim(),
        record.big_o.to_string(),
        record.big_omega.to_string(),
        record.big_theta.to_string(),
        record.provenance.to_string(),
        record.confidence,
        record.timestamp.format("%Y-%m-%d %H:%M")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::complexity::{ComplexityVerdict, GrowthClass, Provenance};
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    #[test]
    fn test_record_line() {
        let verdict = ComplexityVerdict::tight(GrowthClass::Linear, Provenance::Oracle, 0.8);
        let ts = Utc.with_ymd_and_hms(2026, 3, 1, 12, 30, 0).unwrap();
        let record = KnowledgeRecord::from_verdict(&verdict, ts).unwrap();
        let line = console::strip_ansi_codes(&format_record(&Fingerprint::of_canonical("x"), &record)).into_owned();
        assert!(line.contains("O: O(n)"));
        assert!(line.contains("oracle"));
        assert!(line.contains("0.80"));
        assert!(line.ends_with("2026-03-01 12:30"));
    }

    #[test]
    fn test_clear_through_command() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("kb.redb");
        {
            let kb = KnowledgeBase::open(&path).unwrap();
            let verdict = ComplexityVerdict::tight(GrowthClass::Constant, Provenance::Formal, 1.0);
            kb.store(&Fingerprint::of_canonical("a"), &verdict).unwrap();
        }
        run(KbAction::Stats, Some(path.clone())).unwrap();
        run(KbAction::Clear, Some(path.clone())).unwrap();
        assert!(KnowledgeBase::open(&path).unwrap().is_empty().unwrap());
    }
}
