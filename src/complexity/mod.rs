//! Growth-class vocabulary, verdicts and the symbolic cost algebra
//!
//! Every bound the crate reports is a member of the fixed vocabulary
//! [`GrowthClass`]. Anything that cannot be expressed in it (including
//! free-form oracle text) is clamped to [`GrowthClass::Unknown`].

mod expr;

pub use expr::{CostExpr, Growth};

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Fixed, ordered growth vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum GrowthClass {
    Constant,
    Logarithmic,
    Linear,
    Linearithmic,
    Quadratic,
    Cubic,
    Exponential,
    Factorial,
    Unknown,
}

impl GrowthClass {
    /// Known classes in ascending order of growth.
    pub const ORDERED: [GrowthClass; 8] = [
        GrowthClass::Constant,
        GrowthClass::Logarithmic,
        GrowthClass::Linear,
        GrowthClass::Linearithmic,
        GrowthClass::Quadratic,
        GrowthClass::Cubic,
        GrowthClass::Exponential,
        GrowthClass::Factorial,
    ];

    /// Position in [`Self::ORDERED`]; `None` for `Unknown`.
    pub fn rank(self) -> Option<usize> {
        Self::ORDERED.iter().position(|c| *c == self)
    }

    pub fn is_known(self) -> bool {
        self != GrowthClass::Unknown
    }

    pub fn notation(self) -> &'static str {
        match self {
            GrowthClass::Constant => "O(1)",
            GrowthClass::Logarithmic => "O(log n)",
            GrowthClass::Linear => "O(n)",
            GrowthClass::Linearithmic => "O(n log n)",
            GrowthClass::Quadratic => "O(n²)",
            GrowthClass::Cubic => "O(n³)",
            GrowthClass::Exponential => "O(2ⁿ)",
            GrowthClass::Factorial => "O(n!)",
            GrowthClass::Unknown => "unknown",
        }
    }

    /// Token used in oracle prompts (ASCII only).
    pub fn token(self) -> &'static str {
        match self {
            GrowthClass::Constant => "1",
            GrowthClass::Logarithmic => "log n",
            GrowthClass::Linear => "n",
            GrowthClass::Linearithmic => "n log n",
            GrowthClass::Quadratic => "n^2",
            GrowthClass::Cubic => "n^3",
            GrowthClass::Exponential => "2^n",
            GrowthClass::Factorial => "n!",
            GrowthClass::Unknown => "unknown",
        }
    }

    /// Lenient parse of a growth token. Anything outside the vocabulary
    /// (including `n^4`, prose or empty strings) becomes `Unknown`.
    pub fn parse(text: &str) -> GrowthClass {
        Self::parse_known(text).unwrap_or(GrowthClass::Unknown)
    }

    /// Strict variant of [`Self::parse`]: `None` when the token is not in the vocabulary.
    pub fn parse_known(text: &str) -> Option<GrowthClass> {
        let mut s: String = text
            .trim()
            .to_lowercase()
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '*' && *c != '·')
            .collect();
        for prefix in ["θ", "ω", "o", "theta", "omega", "big-o"] {
            if let Some(inner) = s
                .strip_prefix(prefix)
                .and_then(|rest| rest.strip_prefix('('))
                .and_then(|rest| rest.strip_suffix(')'))
            {
                s = inner.to_string();
                break;
            }
        }
        let class = match s.as_str() {
            "1" | "c" | "const" | "constant" => GrowthClass::Constant,
            "logn" | "log(n)" | "lgn" | "log2n" | "log_2n" | "logarithmic" => {
                GrowthClass::Logarithmic
            }
            "n" | "linear" => GrowthClass::Linear,
            "nlogn" | "nlog(n)" | "nlgn" | "nlog2n" | "linearithmic" => GrowthClass::Linearithmic,
            "n^2" | "n²" | "n2" | "quadratic" => GrowthClass::Quadratic,
            "n^3" | "n³" | "n3" | "cubic" => GrowthClass::Cubic,
            "2^n" | "2ⁿ" | "exponential" => GrowthClass::Exponential,
            "n!" | "factorial" => GrowthClass::Factorial,
            _ => return None,
        };
        Some(class)
    }

    /// Compare growth; `None` if either side is `Unknown`.
    pub fn compare(self, other: GrowthClass) -> Option<Ordering> {
        Some(self.rank()?.cmp(&other.rank()?))
    }

    /// The faster-growing class. `Unknown` absorbs.
    pub fn max(self, other: GrowthClass) -> GrowthClass {
        match self.compare(other) {
            Some(Ordering::Less) => other,
            Some(_) => self,
            None => GrowthClass::Unknown,
        }
    }

    /// The slower-growing class. `Unknown` absorbs.
    pub fn min(self, other: GrowthClass) -> GrowthClass {
        match self.compare(other) {
            Some(Ordering::Greater) => other,
            Some(_) => self,
            None => GrowthClass::Unknown,
        }
    }

    /// Normal form of this class, `None` for `Unknown`.
    pub fn growth(self) -> Option<Growth> {
        let g = match self {
            GrowthClass::Constant => Growth::CONSTANT,
            GrowthClass::Logarithmic => Growth::poly_log(0.0, 1),
            GrowthClass::Linear => Growth::poly_log(1.0, 0),
            GrowthClass::Linearithmic => Growth::poly_log(1.0, 1),
            GrowthClass::Quadratic => Growth::poly_log(2.0, 0),
            GrowthClass::Cubic => Growth::poly_log(3.0, 0),
            GrowthClass::Exponential => Growth::EXPONENTIAL,
            GrowthClass::Factorial => Growth::FACTORIAL,
            GrowthClass::Unknown => return None,
        };
        Some(g)
    }
}

impl fmt::Display for GrowthClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.notation())
    }
}

impl From<GrowthClass> for String {
    fn from(c: GrowthClass) -> Self {
        c.notation().to_string()
    }
}

impl From<String> for GrowthClass {
    fn from(s: String) -> Self {
        GrowthClass::parse(&s)
    }
}

/// Tight bound: a class when O and Ω agree, or the explicit `none`
/// when best and worst case diverge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum Theta {
    Tight(GrowthClass),
    None,
}

impl Theta {
    pub fn from_bounds(upper: GrowthClass, lower: GrowthClass) -> Theta {
        if !upper.is_known() || !lower.is_known() {
            Theta::Tight(GrowthClass::Unknown)
        } else if upper == lower {
            Theta::Tight(upper)
        } else {
            Theta::None
        }
    }

    pub fn class(self) -> Option<GrowthClass> {
        match self {
            Theta::Tight(c) => Some(c),
            Theta::None => None,
        }
    }

    /// Parse an oracle token; `none`/`n/a` map to [`Theta::None`].
    pub fn parse(text: &str) -> Theta {
        match text.trim().to_lowercase().as_str() {
            "none" | "n/a" | "-" | "divergent" => Theta::None,
            other => Theta::Tight(GrowthClass::parse(other)),
        }
    }
}

impl fmt::Display for Theta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Theta::Tight(c) => write!(f, "{}", c),
            Theta::None => f.write_str("none"),
        }
    }
}

impl From<Theta> for String {
    fn from(t: Theta) -> Self {
        t.to_string()
    }
}

impl From<String> for Theta {
    fn from(s: String) -> Self {
        Theta::parse(&s)
    }
}

/// How a verdict was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    Formal,
    Memoized,
    Oracle,
    Error,
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provenance::Formal => write!(f, "formal"),
            Provenance::Memoized => write!(f, "memoized"),
            Provenance::Oracle => write!(f, "oracle"),
            Provenance::Error => write!(f, "error"),
        }
    }
}

/// Why a verdict contains `unknown`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum UnknownCause {
    /// The oracle was unreachable, throttled or answered garbage.
    OracleFailure(String),
    /// The shape is outside the vocabulary or the oracle itself said unknown.
    Unclassifiable(String),
    /// A callee's verdict was already unknown.
    CalleeUnresolved(String),
}

impl fmt::Display for UnknownCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnknownCause::OracleFailure(msg) => write!(f, "oracle failure: {}", msg),
            UnknownCause::Unclassifiable(msg) => write!(f, "unclassifiable: {}", msg),
            UnknownCause::CalleeUnresolved(name) => write!(f, "callee '{}' is unresolved", name),
        }
    }
}

/// Confidence attached to formally derived verdicts.
pub const FORMAL_CONFIDENCE: f64 = 1.0;

/// (O, Ω, Θ) plus where it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplexityVerdict {
    #[serde(rename = "O")]
    pub big_o: GrowthClass,
    #[serde(rename = "Omega")]
    pub big_omega: GrowthClass,
    #[serde(rename = "Theta")]
    pub big_theta: Theta,
    pub provenance: Provenance,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<UnknownCause>,
    /// For a memoized verdict, the provenance of the stored record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Provenance>,
}

impl ComplexityVerdict {
    /// Verdict from upper and lower cost expressions, Θ derived from their agreement.
    pub fn from_costs(upper: &CostExpr, lower: &CostExpr, provenance: Provenance, confidence: f64) -> Self {
        let big_o = upper.upper_class();
        let big_omega = lower.lower_class();
        let exact = upper.exact_class().is_some() && lower.exact_class().is_some();
        let big_theta = match Theta::from_bounds(big_o, big_omega) {
            Theta::Tight(c) if c.is_known() && !exact => Theta::None,
            other => other,
        };
        let cause = if big_o.is_known() && big_omega.is_known() {
            None
        } else {
            Some(UnknownCause::Unclassifiable(format!(
                "cost {} / {} is outside the growth vocabulary",
                upper, lower
            )))
        };
        Self {
            big_o,
            big_omega,
            big_theta,
            provenance,
            confidence,
            cause,
            source: None,
        }
    }

    /// Formal verdict with all three bounds equal.
    pub fn tight(class: GrowthClass, provenance: Provenance, confidence: f64) -> Self {
        Self {
            big_o: class,
            big_omega: class,
            big_theta: Theta::Tight(class),
            provenance,
            confidence,
            cause: None,
            source: None,
        }
    }

    /// (unknown, unknown, unknown) with provenance `error`.
    pub fn error(cause: UnknownCause) -> Self {
        Self {
            big_o: GrowthClass::Unknown,
            big_omega: GrowthClass::Unknown,
            big_theta: Theta::Tight(GrowthClass::Unknown),
            provenance: Provenance::Error,
            confidence: 0.0,
            cause: Some(cause),
            source: None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        !self.big_o.is_known() || !self.big_omega.is_known()
    }

    /// Cost expressions for composing this verdict into a caller.
    pub fn upper_cost(&self) -> CostExpr {
        CostExpr::from_class(self.big_o)
    }

    pub fn lower_cost(&self) -> CostExpr {
        CostExpr::from_class(self.big_omega)
    }

    /// How the bounds were originally obtained: the stored record's
    /// provenance for a memoized verdict, otherwise its own.
    pub fn origin(&self) -> Provenance {
        match (self.provenance, self.source) {
            (Provenance::Memoized, Some(source)) => source,
            (provenance, _) => provenance,
        }
    }
}

impl fmt::Display for ComplexityVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "O: {}, Ω: {}, Θ: {}",
            self.big_o, self.big_omega, self.big_theta
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vocabulary_order() {
        assert!(GrowthClass::Linear.compare(GrowthClass::Quadratic) == Some(Ordering::Less));
        assert_eq!(GrowthClass::Cubic.max(GrowthClass::Linear), GrowthClass::Cubic);
        assert_eq!(GrowthClass::Cubic.min(GrowthClass::Linear), GrowthClass::Linear);
        assert_eq!(GrowthClass::Unknown.max(GrowthClass::Linear), GrowthClass::Unknown);
        assert_eq!(GrowthClass::Linear.max(GrowthClass::Linear), GrowthClass::Linear);
    }

    #[test]
    fn test_parse_accepts_common_spellings() {
        assert_eq!(GrowthClass::parse("O(n log n)"), GrowthClass::Linearithmic);
        assert_eq!(GrowthClass::parse("n^2"), GrowthClass::Quadratic);
        assert_eq!(GrowthClass::parse("Θ(n²)"), GrowthClass::Quadratic);
        assert_eq!(GrowthClass::parse("log n"), GrowthClass::Logarithmic);
        assert_eq!(GrowthClass::parse("1"), GrowthClass::Constant);
        assert_eq!(GrowthClass::parse("O(2^n)"), GrowthClass::Exponential);
        assert_eq!(GrowthClass::parse("n!"), GrowthClass::Factorial);
    }

    #[test]
    fn test_parse_clamps_out_of_vocabulary() {
        assert_eq!(GrowthClass::parse("n^4"), GrowthClass::Unknown);
        assert_eq!(GrowthClass::parse("sqrt(n)"), GrowthClass::Unknown);
        assert_eq!(GrowthClass::parse("it depends"), GrowthClass::Unknown);
        assert_eq!(GrowthClass::parse(""), GrowthClass::Unknown);
        assert!(GrowthClass::parse_known("n^5").is_none());
    }

    #[test]
    fn test_serde_uses_notation() {
        let json = serde_json::to_string(&GrowthClass::Quadratic).unwrap();
        assert_eq!(json, "\"O(n²)\"");
        let back: GrowthClass = serde_json::from_str(&json).unwrap();
        assert_eq!(back, GrowthClass::Quadratic);
        let bogus: GrowthClass = serde_json::from_str("\"O(n^7)\"").unwrap();
        assert_eq!(bogus, GrowthClass::Unknown);
    }

    #[test]
    fn test_theta_from_bounds() {
        assert_eq!(
            Theta::from_bounds(GrowthClass::Linear, GrowthClass::Linear),
            Theta::Tight(GrowthClass::Linear)
        );
        assert_eq!(
            Theta::from_bounds(GrowthClass::Linear, GrowthClass::Constant),
            Theta::None
        );
        assert_eq!(Theta::parse("none"), Theta::None);
        assert_eq!(Theta::None.to_string(), "none");
    }

    #[test]
    fn test_error_verdict_is_unknown() {
        let v = ComplexityVerdict::error(UnknownCause::OracleFailure("timeout".into()));
        assert!(v.is_unknown());
        assert_eq!(v.provenance, Provenance::Error);
        assert_eq!(v.big_theta, Theta::Tight(GrowthClass::Unknown));
    }

    #[test]
    fn test_verdict_from_costs_divergent() {
        let v = ComplexityVerdict::from_costs(
            &CostExpr::Poly(1.0),
            &CostExpr::Constant,
            Provenance::Formal,
            FORMAL_CONFIDENCE,
        );
        assert_eq!(v.big_o, GrowthClass::Linear);
        assert_eq!(v.big_omega, GrowthClass::Constant);
        assert_eq!(v.big_theta, Theta::None);
        assert!(v.cause.is_none());
    }
}
