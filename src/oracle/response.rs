//! Strict parsing of oracle replies
//!
//! The reply must contain a JSON object with `O`, `Omega` and optionally
//! `Theta` and `confidence`. Bounds outside the growth vocabulary are
//! clamped to `unknown`; a reply that is not such an object at all is
//! `MalformedResponse`.

use crate::complexity::{ComplexityVerdict, GrowthClass, Provenance, Theta, UnknownCause};
use crate::error::OracleError;
use serde::Deserialize;
use tracing::warn;

/// Confidence assumed when the oracle does not state one.
pub const DEFAULT_CONFIDENCE: f64 = 0.5;

/// Lowest confidence an oracle verdict can carry.
pub const MIN_CONFIDENCE: f64 = 0.01;

/// A validated oracle answer.
#[derive(Debug, Clone, PartialEq)]
pub struct OracleReply {
    pub big_o: GrowthClass,
    pub big_omega: GrowthClass,
    pub big_theta: Theta,
    pub confidence: f64,
    /// Raw tokens that fell outside the vocabulary.
    pub clamped: Vec<String>,
}

impl OracleReply {
    pub fn into_verdict(self) -> ComplexityVerdict {
        let cause = if self.big_o.is_known() && self.big_omega.is_known() {
            None
        } else if self.clamped.is_empty() {
            Some(UnknownCause::Unclassifiable("oracle answered unknown".to_string()))
        } else {
            Some(UnknownCause::Unclassifiable(format!(
                "oracle answered outside the vocabulary: {}",
                self.clamped.join(", ")
            )))
        };
        ComplexityVerdict {
            big_o: self.big_o,
            big_omega: self.big_omega,
            big_theta: self.big_theta,
            provenance: Provenance::Oracle,
            confidence: self.confidence,
            cause,
            source: None,
        }
    }
}

#[derive(Deserialize)]
struct RawReply {
    #[serde(rename = "O", alias = "o", alias = "big_o")]
    big_o: Option<serde_json::Value>,
    #[serde(rename = "Omega", alias = "omega", alias = "big_omega")]
    big_omega: Option<serde_json::Value>,
    #[serde(rename = "Theta", alias = "theta", alias = "big_theta")]
    big_theta: Option<serde_json::Value>,
    confidence: Option<serde_json::Value>,
}

/// Drop markdown fences and surrounding prose, keeping the outermost `{...}`.
fn extract_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

fn token(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn bound(value: Option<&serde_json::Value>, key: &str, clamped: &mut Vec<String>) -> Result<GrowthClass, OracleError> {
    let value = value.ok_or_else(|| OracleError::MalformedResponse(format!("missing \"{}\"", key)))?;
    let raw = token(value);
    let class = GrowthClass::parse(&raw);
    if class == GrowthClass::Unknown && raw.trim().to_lowercase() != "unknown" {
        clamped.push(format!("{}={}", key, raw));
    }
    Ok(class)
}

fn confidence(value: Option<&serde_json::Value>) -> f64 {
    let raw = match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().trim_end_matches('%').parse::<f64>().ok().map(|v| {
            if s.trim().ends_with('%') {
                v / 100.0
            } else {
                v
            }
        }),
        _ => None,
    };
    match raw {
        Some(v) if v.is_finite() => v.clamp(MIN_CONFIDENCE, 1.0),
        _ => DEFAULT_CONFIDENCE,
    }
}

/// Validate a raw reply against the vocabulary.
pub fn parse_reply(text: &str) -> Result<OracleReply, OracleError> {
    let object = extract_object(text)
        .ok_or_else(|| OracleError::MalformedResponse(format!("no JSON object in reply: {}", preview(text))))?;
    let raw: RawReply = serde_json::from_str(object)
        .map_err(|e| OracleError::MalformedResponse(format!("{} in reply: {}", e, preview(text))))?;

    let mut clamped = Vec::new();
    let big_o = bound(raw.big_o.as_ref(), "O", &mut clamped)?;
    let big_omega = bound(raw.big_omega.as_ref(), "Omega", &mut clamped)?;

    // Θ must agree with the bounds it claims to tighten.
    let derived = Theta::from_bounds(big_o, big_omega);
    let big_theta = match raw.big_theta.as_ref().map(token) {
        None => derived,
        Some(raw_theta) => match Theta::parse(&raw_theta) {
            Theta::Tight(c) if c.is_known() && derived == Theta::Tight(c) => Theta::Tight(c),
            Theta::None if derived == Theta::None => Theta::None,
            _ => {
                if derived != Theta::Tight(GrowthClass::Unknown) {
                    warn!("Oracle Theta '{}' contradicts its bounds, using {}", raw_theta, derived);
                }
                derived
            }
        },
    };

    if !clamped.is_empty() {
        warn!("Clamped out-of-vocabulary oracle bounds to unknown: {}", clamped.join(", "));
    }

    Ok(OracleReply {
        big_o,
        big_omega,
        big_theta,
        confidence: confidence(raw.confidence.as_ref()),
        clamped,
    })
}

fn preview(text: &str) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(80) {
        Some((idx, _)) => format!("{}…", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_plain_json() {
        let r = parse_reply(r#"{"O": "n^2", "Omega": "n", "Theta": "none", "confidence": 0.8}"#).unwrap();
        assert_eq!(r.big_o, GrowthClass::Quadratic);
        assert_eq!(r.big_omega, GrowthClass::Linear);
        assert_eq!(r.big_theta, Theta::None);
        assert!((r.confidence - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_strips_code_fences() {
        let text = "```json\n{\"O\": \"n log n\", \"Omega\": \"n log n\", \"Theta\": \"n log n\"}\n```";
        let r = parse_reply(text).unwrap();
        assert_eq!(r.big_theta, Theta::Tight(GrowthClass::Linearithmic));
        assert_eq!(r.confidence, DEFAULT_CONFIDENCE);
    }

    #[test]
    fn test_out_of_vocabulary_is_clamped() {
        let r = parse_reply(r#"{"O": "n^4", "Omega": "sqrt(n)", "Theta": "n^4", "confidence": 0.9}"#).unwrap();
        assert_eq!(r.big_o, GrowthClass::Unknown);
        assert_eq!(r.big_omega, GrowthClass::Unknown);
        assert_eq!(r.big_theta, Theta::Tight(GrowthClass::Unknown));
        assert_eq!(r.clamped.len(), 2);
        let v = r.into_verdict();
        assert!(v.is_unknown());
        assert_eq!(v.provenance, Provenance::Oracle);
        assert!(matches!(v.cause, Some(UnknownCause::Unclassifiable(_))));
    }

    #[test]
    fn test_contradictory_theta_is_recomputed() {
        let r = parse_reply(r#"{"O": "n", "Omega": "1", "Theta": "n"}"#).unwrap();
        assert_eq!(r.big_theta, Theta::None);
    }

    #[test]
    fn test_confidence_clamped_into_range() {
        let high = parse_reply(r#"{"O": "n", "Omega": "n", "confidence": 7}"#).unwrap();
        assert_eq!(high.confidence, 1.0);
        let zero = parse_reply(r#"{"O": "n", "Omega": "n", "confidence": 0}"#).unwrap();
        assert_eq!(zero.confidence, MIN_CONFIDENCE);
        let pct = parse_reply(r#"{"O": "n", "Omega": "n", "confidence": "90%"}"#).unwrap();
        assert!((pct.confidence - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_malformed_replies() {
        assert!(matches!(
            parse_reply("It is quadratic."),
            Err(OracleError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_reply(r#"{"Omega": "n"}"#),
            Err(OracleError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_reply("{not json}"),
            Err(OracleError::MalformedResponse(_))
        ));
    }
}
