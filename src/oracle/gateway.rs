//! Knowledge-base-backed front door to the oracle

use super::{Oracle, OracleRequest};
use crate::complexity::ComplexityVerdict;
use crate::error::OracleError;
use crate::fingerprint::Fingerprint;
use crate::knowledge::{KnowledgeBase, StoreOutcome};
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Routes ambiguous structures to the oracle at most once per fingerprint.
///
/// For one fingerprint the sequence lookup → classify → store runs under a
/// per-key mutex, so concurrent workers asking about the same structure
/// wait for the first answer instead of issuing a second request.
pub struct OracleGateway {
    oracle: Arc<dyn Oracle>,
    locks: DashMap<Fingerprint, Arc<Mutex<()>>>,
    calls: AtomicUsize,
}

impl OracleGateway {
    pub fn new(oracle: Arc<dyn Oracle>) -> Self {
        Self {
            oracle,
            locks: DashMap::new(),
            calls: AtomicUsize::new(0),
        }
    }

    /// External round-trips made through this gateway.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn lock_for(&self, fp: &Fingerprint) -> Arc<Mutex<()>> {
        self.locks
            .entry(fp.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Classify `request`. A stored record is served as `memoized`; otherwise
    /// the oracle is asked and a known answer persisted before returning.
    /// An unknown answer is returned but not stored, so the next run asks again.
    pub fn classify(&self, kb: &KnowledgeBase, request: &OracleRequest) -> Result<ComplexityVerdict, OracleError> {
        let fp = &request.fingerprint;
        let lock = self.lock_for(fp);
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        match kb.lookup_verdict(fp) {
            Ok(Some(verdict)) => {
                debug!("Oracle cache hit for {} {}", request.kind.label(), fp.short());
                return Ok(verdict);
            }
            Ok(None) => {}
            Err(e) => warn!("Knowledge base lookup for {} failed, treating as miss: {}", fp.short(), e),
        }

        self.calls.fetch_add(1, Ordering::SeqCst);
        info!(
            "Consulting oracle {} for {} {} ({})",
            self.oracle.name(),
            request.kind.label(),
            fp.short(),
            request.reason
        );
        let verdict = match self.oracle.classify(request) {
            Ok(reply) => reply.into_verdict(),
            Err(e) => {
                warn!("Oracle failed for {}: {}", fp.short(), e);
                return Err(e);
            }
        };

        if verdict.is_unknown() {
            debug!("Oracle could not classify {}; not storing", fp.short());
            return Ok(verdict);
        }
        match kb.store(fp, &verdict) {
            Ok(StoreOutcome::Rejected) => debug!("Stored record for {} outranks the oracle answer", fp.short()),
            Ok(_) => {}
            Err(e) => warn!("Could not persist oracle verdict for {}: {}", fp.short(), e),
        }
        Ok(verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::complexity::{GrowthClass, Provenance, Theta};
    use crate::oracle::{parse_reply, OracleReply, RequestKind};
    use tempfile::TempDir;

    struct Scripted {
        reply: &'static str,
        calls: AtomicUsize,
    }

    impl Oracle for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }

        fn classify(&self, _request: &OracleRequest) -> Result<OracleReply, OracleError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            parse_reply(self.reply)
        }
    }

    fn request(tag: &str) -> OracleRequest {
        OracleRequest::new(
            Fingerprint::of_canonical(tag),
            RequestKind::Subtree,
            "while (i < n) do\nbegin\n    i <- i * i\nend\n".into(),
            "irregular update",
        )
    }

    #[test]
    fn test_second_request_is_served_from_store() {
        let tmp = TempDir::new().unwrap();
        let kb = KnowledgeBase::open(&tmp.path().join("kb.redb")).unwrap();
        let oracle = Arc::new(Scripted {
            reply: r#"{"O": "log n", "Omega": "log n", "Theta": "log n", "confidence": 0.7}"#,
            calls: AtomicUsize::new(0),
        });
        let gateway = OracleGateway::new(oracle.clone());

        let first = gateway.classify(&kb, &request("loop")).unwrap();
        assert_eq!(first.provenance, Provenance::Oracle);
        assert_eq!(first.big_theta, Theta::Tight(GrowthClass::Logarithmic));

        let second = gateway.classify(&kb, &request("loop")).unwrap();
        assert_eq!(second.provenance, Provenance::Memoized);
        assert_eq!(second.big_o, GrowthClass::Logarithmic);
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 1);
        assert_eq!(gateway.calls(), 1);
    }

    #[test]
    fn test_failures_are_not_cached() {
        let tmp = TempDir::new().unwrap();
        let kb = KnowledgeBase::open(&tmp.path().join("kb.redb")).unwrap();
        let oracle = Arc::new(Scripted {
            reply: "I think it is probably quadratic",
            calls: AtomicUsize::new(0),
        });
        let gateway = OracleGateway::new(oracle.clone());
        assert!(matches!(
            gateway.classify(&kb, &request("bad")),
            Err(OracleError::MalformedResponse(_))
        ));
        assert!(gateway.classify(&kb, &request("bad")).is_err());
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 2);
        assert!(kb.is_empty().unwrap());
    }

    #[test]
    fn test_unknown_answers_are_not_cached() {
        let tmp = TempDir::new().unwrap();
        let kb = KnowledgeBase::open(&tmp.path().join("kb.redb")).unwrap();
        let oracle = Arc::new(Scripted {
            reply: r#"{"O": "n^1.5", "Omega": "sqrt(n)", "confidence": 0.9}"#,
            calls: AtomicUsize::new(0),
        });
        let gateway = OracleGateway::new(oracle.clone());

        let first = gateway.classify(&kb, &request("odd")).unwrap();
        assert_eq!(first.provenance, Provenance::Oracle);
        assert_eq!(first.big_o, GrowthClass::Unknown);
        assert!(first.cause.is_some());
        assert!(kb.is_empty().unwrap());

        let second = gateway.classify(&kb, &request("odd")).unwrap();
        assert_eq!(second.provenance, Provenance::Oracle);
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_memoized_answer_keeps_oracle_source() {
        let tmp = TempDir::new().unwrap();
        let kb = KnowledgeBase::open(&tmp.path().join("kb.redb")).unwrap();
        let oracle = Arc::new(Scripted {
            reply: r#"{"O": "log n", "Omega": "log n", "Theta": "log n", "confidence": 1.0}"#,
            calls: AtomicUsize::new(0),
        });
        let gateway = OracleGateway::new(oracle);
        gateway.classify(&kb, &request("certain")).unwrap();
        let again = gateway.classify(&kb, &request("certain")).unwrap();
        assert_eq!(again.provenance, Provenance::Memoized);
        assert_eq!(again.confidence, 1.0);
        assert_eq!(again.origin(), Provenance::Oracle);
    }

    #[test]
    fn test_concurrent_requests_share_one_call() {
        let tmp = TempDir::new().unwrap();
        let kb = KnowledgeBase::open(&tmp.path().join("kb.redb")).unwrap();
        let oracle = Arc::new(Scripted {
            reply: r#"{"O": "n", "Omega": "n", "Theta": "n", "confidence": 0.9}"#,
            calls: AtomicUsize::new(0),
        });
        let gateway = OracleGateway::new(oracle.clone());
        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| gateway.classify(&kb, &request("same")).unwrap());
            }
        });
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 1);
    }
}
