//! Parallel analysis of many files

use super::{AnalysisEngine, FileOutcome};
use crate::error::{AsymptoteError, ParseFailure};
use crate::parser::parse_file;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info, warn};

impl AnalysisEngine {
    /// Analyze every file on the worker pool. Outcomes keep input order;
    /// a file that fails to parse does not stop the others.
    pub fn analyze_files(&self, paths: &[PathBuf]) -> Vec<FileOutcome> {
        let total = paths.len();
        info!("Analyzing {} files with {} workers", total, self.workers);
        let completed = AtomicUsize::new(0);

        let run_one = |path: &PathBuf| {
            let outcome = self.analyze_file(path);
            let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(ref callback) = self.progress_callback {
                callback(outcome.file(), done, total);
            }
            outcome
        };

        match rayon::ThreadPoolBuilder::new().num_threads(self.workers).build() {
            Ok(pool) => pool.install(|| paths.par_iter().map(&run_one).collect()),
            Err(e) => {
                warn!("Could not start {} workers ({}), analyzing sequentially", self.workers, e);
                paths.iter().map(&run_one).collect()
            }
        }
    }

    /// Read, parse and analyze one file.
    pub fn analyze_file(&self, path: &Path) -> FileOutcome {
        match parse_file(path) {
            Ok(mut program) => {
                debug!("Parsed {}: {} procedures", program.name, program.procedures.len());
                let report = self.analyze_program(&mut program);
                FileOutcome::Analyzed(report)
            }
            Err(AsymptoteError::Parse(failure)) => {
                warn!("{}", failure);
                FileOutcome::ParseFailed(failure)
            }
            Err(e) => {
                let file = path.display().to_string();
                warn!("Cannot read {}: {}", file, e);
                FileOutcome::ParseFailed(ParseFailure::new(file, 0, 0, format!("cannot read file: {}", e)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::KnowledgeBase;
    use crate::oracle::{DisabledOracle, OracleGateway};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    #[test]
    fn test_batch_keeps_order_and_survives_parse_failures() {
        let tmp = TempDir::new().unwrap();
        let kb = Arc::new(KnowledgeBase::open(&tmp.path().join("kb.redb")).unwrap());
        let gateway = Arc::new(OracleGateway::new(Arc::new(DisabledOracle::new("tests"))));

        let mut paths = Vec::new();
        for (i, src) in [
            "a(n)\nbegin\n  for i <- 1 to n do\n    x <- i\nend",
            "broken(n)\nbegin\n  for i <- 1 to n\nend",
            "c(n)\nbegin\n  x <- n\nend",
        ]
        .iter()
        .enumerate()
        {
            let path = tmp.path().join(format!("f{}.psc", i));
            std::fs::write(&path, src).unwrap();
            paths.push(path);
        }

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let engine = AnalysisEngine::new(2, kb, gateway).with_progress_callback(Box::new(move |_: &str, done: usize, total: usize| {
            sink.lock().unwrap().push((done, total));
        }));
        let outcomes = engine.analyze_files(&paths);

        assert_eq!(outcomes.len(), 3);
        assert!(matches!(outcomes[0], FileOutcome::Analyzed(_)));
        assert!(matches!(outcomes[1], FileOutcome::ParseFailed(_)));
        assert!(matches!(outcomes[2], FileOutcome::Analyzed(_)));
        assert!(outcomes[2].file().ends_with("f2.psc"));

        let mut seen = seen.lock().unwrap().clone();
        seen.sort_unstable();
        assert_eq!(seen, vec![(1, 3), (2, 3), (3, 3)]);
    }

    #[test]
    fn test_missing_file_is_reported() {
        let tmp = TempDir::new().unwrap();
        let kb = Arc::new(KnowledgeBase::open(&tmp.path().join("kb.redb")).unwrap());
        let gateway = Arc::new(OracleGateway::new(Arc::new(DisabledOracle::new("tests"))));
        let engine = AnalysisEngine::new(1, kb, gateway);
        let outcome = engine.analyze_file(&tmp.path().join("nope.psc"));
        match outcome {
            FileOutcome::ParseFailed(f) => assert!(f.message.contains("cannot read")),
            other => panic!("unexpected {:?}", other),
        }
    }
}
