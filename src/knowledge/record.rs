//! Persisted verdict record and the confidence ordering between records

use crate::complexity::{ComplexityVerdict, GrowthClass, Provenance, Theta};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Record format version - bump when the schema changes.
pub const RECORD_VERSION: u32 = 1;

/// Value stored per fingerprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeRecord {
    #[serde(rename = "O")]
    pub big_o: GrowthClass,
    #[serde(rename = "Omega")]
    pub big_omega: GrowthClass,
    #[serde(rename = "Theta")]
    pub big_theta: Theta,
    pub provenance: Provenance,
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub version: u32,
}

impl KnowledgeRecord {
    /// Build a record for `verdict`. Only known formal and oracle verdicts
    /// are storable; memoized verdicts already live in the store, while
    /// error and unknown verdicts must be retried on the next run.
    pub fn from_verdict(verdict: &ComplexityVerdict, timestamp: DateTime<Utc>) -> Option<Self> {
        if verdict.is_unknown() {
            return None;
        }
        match verdict.provenance {
            Provenance::Formal | Provenance::Oracle => Some(Self {
                big_o: verdict.big_o,
                big_omega: verdict.big_omega,
                big_theta: verdict.big_theta,
                provenance: verdict.provenance,
                confidence: verdict.confidence,
                timestamp,
                version: RECORD_VERSION,
            }),
            Provenance::Memoized | Provenance::Error => None,
        }
    }

    /// The stored bounds as a verdict, labelled `memoized` and carrying the
    /// record's own provenance as its source.
    pub fn to_verdict(&self) -> ComplexityVerdict {
        ComplexityVerdict {
            big_o: self.big_o,
            big_omega: self.big_omega,
            big_theta: self.big_theta,
            provenance: Provenance::Memoized,
            confidence: self.confidence,
            cause: None,
            source: Some(self.provenance),
        }
    }

    fn provenance_rank(&self) -> u8 {
        match self.provenance {
            Provenance::Formal => 2,
            Provenance::Oracle => 1,
            Provenance::Memoized | Provenance::Error => 0,
        }
    }

    /// Whether `self` may replace `existing`.
    ///
    /// formal > oracle; among equals the higher confidence wins and equal
    /// confidence lets the most recent record win.
    pub fn supersedes(&self, existing: &KnowledgeRecord) -> bool {
        match self.provenance_rank().cmp(&existing.provenance_rank()) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => match self.confidence.partial_cmp(&existing.confidence) {
                Some(Ordering::Greater) => true,
                Some(Ordering::Equal) => self.timestamp >= existing.timestamp,
                Some(Ordering::Less) | None => false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn oracle(confidence: f64, at: DateTime<Utc>) -> KnowledgeRecord {
        let v = ComplexityVerdict::tight(GrowthClass::Linear, Provenance::Oracle, confidence);
        KnowledgeRecord::from_verdict(&v, at).unwrap()
    }

    fn formal(at: DateTime<Utc>) -> KnowledgeRecord {
        let v = ComplexityVerdict::tight(GrowthClass::Quadratic, Provenance::Formal, 1.0);
        KnowledgeRecord::from_verdict(&v, at).unwrap()
    }

    #[test]
    fn test_formal_beats_oracle() {
        let now = Utc::now();
        assert!(formal(now).supersedes(&oracle(0.99, now)));
        assert!(!oracle(1.0, now + Duration::seconds(5)).supersedes(&formal(now)));
    }

    #[test]
    fn test_oracle_confidence_ordering() {
        let now = Utc::now();
        let later = now + Duration::seconds(1);
        assert!(oracle(0.9, now).supersedes(&oracle(0.5, later)));
        assert!(!oracle(0.4, later).supersedes(&oracle(0.5, now)));
        assert!(oracle(0.5, later).supersedes(&oracle(0.5, now)));
        assert!(!oracle(0.5, now).supersedes(&oracle(0.5, later)));
    }

    #[test]
    fn test_non_storable_provenance() {
        let v = ComplexityVerdict::tight(GrowthClass::Linear, Provenance::Memoized, 1.0);
        assert!(KnowledgeRecord::from_verdict(&v, Utc::now()).is_none());
        let e = ComplexityVerdict::error(crate::complexity::UnknownCause::OracleFailure("x".into()));
        assert!(KnowledgeRecord::from_verdict(&e, Utc::now()).is_none());
        let unknown = ComplexityVerdict {
            big_o: GrowthClass::Unknown,
            ..ComplexityVerdict::tight(GrowthClass::Linear, Provenance::Oracle, 0.6)
        };
        assert!(KnowledgeRecord::from_verdict(&unknown, Utc::now()).is_none());
    }

    #[test]
    fn test_served_verdict_remembers_origin() {
        let r = oracle(1.0, Utc::now());
        let v = r.to_verdict();
        assert_eq!(v.provenance, Provenance::Memoized);
        assert_eq!(v.source, Some(Provenance::Oracle));
        assert_eq!(v.origin(), Provenance::Oracle);
        assert_eq!(formal(Utc::now()).to_verdict().origin(), Provenance::Formal);
    }

    #[test]
    fn test_record_json_layout() {
        let r = formal(Utc::now());
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["O"], "O(n²)");
        assert_eq!(json["Omega"], "O(n²)");
        assert_eq!(json["Theta"], "O(n²)");
        assert_eq!(json["provenance"], "formal");
        assert_eq!(json["version"], RECORD_VERSION);
        assert!(json["timestamp"].is_string());
    }
}
