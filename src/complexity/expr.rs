//! Symbolic cost expressions and their canonical normal form

use super::GrowthClass;
use std::cmp::Ordering;
use std::fmt;

const EPS: f64 = 1e-9;

/// Canonical growth term `n^poly · log^log n`, optionally times `2^n` or `n!`.
///
/// Two expressions with the same asymptotic growth normalise to equal
/// `Growth` values, which is what class comparison relies on. The
/// polynomial part is kept next to an exponential or factorial factor, so
/// `n · 2^n` stays distinct from `2^n`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Growth {
    pub poly: f64,
    pub log: u32,
    pub exponential: bool,
    pub factorial: bool,
}

impl Growth {
    pub const CONSTANT: Growth = Growth {
        poly: 0.0,
        log: 0,
        exponential: false,
        factorial: false,
    };

    pub const EXPONENTIAL: Growth = Growth {
        poly: 0.0,
        log: 0,
        exponential: true,
        factorial: false,
    };

    pub const FACTORIAL: Growth = Growth {
        poly: 0.0,
        log: 0,
        exponential: false,
        factorial: true,
    };

    pub fn poly_log(poly: f64, log: u32) -> Growth {
        Growth {
            poly,
            log,
            exponential: false,
            factorial: false,
        }
    }

    /// Asymptotic comparison.
    pub fn compare(&self, other: &Growth) -> Ordering {
        self.factorial
            .cmp(&other.factorial)
            .then(self.exponential.cmp(&other.exponential))
            .then_with(|| {
                if (self.poly - other.poly).abs() < EPS {
                    Ordering::Equal
                } else if self.poly < other.poly {
                    Ordering::Less
                } else {
                    Ordering::Greater
                }
            })
            .then(self.log.cmp(&other.log))
    }

    pub fn product(&self, other: &Growth) -> Growth {
        let factorial = self.factorial || other.factorial;
        Growth {
            poly: self.poly + other.poly,
            log: self.log + other.log,
            exponential: !factorial && (self.exponential || other.exponential),
            factorial,
        }
    }

    /// Exponential or factorial growth with an extra polynomial or log factor.
    fn is_scaled_superpolynomial(&self) -> bool {
        (self.exponential || self.factorial) && (self.poly.abs() >= EPS || self.log > 0)
    }

    /// The vocabulary class equal to this growth, if any.
    pub fn exact_class(&self) -> Option<GrowthClass> {
        GrowthClass::ORDERED
            .into_iter()
            .find(|c| c.growth().is_some_and(|g| g.compare(self) == Ordering::Equal))
    }

    /// Smallest vocabulary class bounding this growth from above.
    ///
    /// Polynomial growth beyond n³, and exponential or factorial growth
    /// scaled by a polynomial factor, have no useful upper class and map
    /// to `Unknown`.
    pub fn ceil_class(&self) -> GrowthClass {
        if let Some(c) = self.exact_class() {
            return c;
        }
        if self.is_scaled_superpolynomial() {
            return GrowthClass::Unknown;
        }
        if !self.exponential && !self.factorial && self.poly > 3.0 + EPS {
            return GrowthClass::Unknown;
        }
        GrowthClass::ORDERED
            .into_iter()
            .find(|c| c.growth().is_some_and(|g| g.compare(self) != Ordering::Less))
            .unwrap_or(GrowthClass::Unknown)
    }

    /// Largest vocabulary class bounding this growth from below.
    pub fn floor_class(&self) -> GrowthClass {
        if let Some(c) = self.exact_class() {
            return c;
        }
        GrowthClass::ORDERED
            .into_iter()
            .rev()
            .find(|c| c.growth().is_some_and(|g| g.compare(self) != Ordering::Greater))
            .unwrap_or(GrowthClass::Constant)
    }
}

impl fmt::Display for Growth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if (self.poly - 1.0).abs() < EPS {
            parts.push("n".to_string());
        } else if self.poly.abs() >= EPS {
            if (self.poly - self.poly.round()).abs() < EPS {
                parts.push(format!("n^{}", self.poly.round() as i64));
            } else {
                parts.push(format!("n^{:.3}", self.poly));
            }
        }
        match self.log {
            0 => {}
            1 => parts.push("log n".to_string()),
            k => parts.push(format!("log^{} n", k)),
        }
        if self.factorial {
            parts.push("n!".to_string());
        } else if self.exponential {
            parts.push("2^n".to_string());
        }
        if parts.is_empty() {
            f.write_str("1")
        } else {
            f.write_str(&parts.join(" "))
        }
    }
}

/// Small symbolic cost algebra.
///
/// `Unresolved` is a placeholder for a cost nobody could determine yet
/// (a pending recursive call, a failed oracle request). It poisons every
/// expression that contains it.
#[derive(Debug, Clone, PartialEq)]
pub enum CostExpr {
    Constant,
    /// n^k (k may be fractional, e.g. n^log₂3).
    Poly(f64),
    Log,
    Exponential,
    Factorial,
    Sum(Vec<CostExpr>),
    Product(Vec<CostExpr>),
    Unresolved(String),
}

impl CostExpr {
    pub fn linear() -> CostExpr {
        CostExpr::Poly(1.0)
    }

    pub fn from_class(class: GrowthClass) -> CostExpr {
        match class {
            GrowthClass::Constant => CostExpr::Constant,
            GrowthClass::Logarithmic => CostExpr::Log,
            GrowthClass::Linear => CostExpr::Poly(1.0),
            GrowthClass::Linearithmic => CostExpr::product(CostExpr::Poly(1.0), CostExpr::Log),
            GrowthClass::Quadratic => CostExpr::Poly(2.0),
            GrowthClass::Cubic => CostExpr::Poly(3.0),
            GrowthClass::Exponential => CostExpr::Exponential,
            GrowthClass::Factorial => CostExpr::Factorial,
            GrowthClass::Unknown => CostExpr::Unresolved("unknown".to_string()),
        }
    }

    pub fn from_growth(g: &Growth) -> CostExpr {
        let mut factors = Vec::new();
        if g.poly.abs() >= EPS {
            factors.push(CostExpr::Poly(g.poly));
        }
        for _ in 0..g.log {
            factors.push(CostExpr::Log);
        }
        if g.factorial {
            factors.push(CostExpr::Factorial);
        } else if g.exponential {
            factors.push(CostExpr::Exponential);
        }
        match factors.len() {
            0 => CostExpr::Constant,
            1 => factors.remove(0),
            _ => CostExpr::Product(factors),
        }
    }

    /// `a + b`, flattening nested sums and dropping constants next to other terms.
    pub fn sum(a: CostExpr, b: CostExpr) -> CostExpr {
        let mut terms = Vec::new();
        for e in [a, b] {
            match e {
                CostExpr::Sum(inner) => terms.extend(inner),
                other => terms.push(other),
            }
        }
        if terms.len() > 1 {
            terms.retain(|t| *t != CostExpr::Constant);
        }
        match terms.len() {
            0 => CostExpr::Constant,
            1 => terms.remove(0),
            _ => CostExpr::Sum(terms),
        }
    }

    /// `a · b`, flattening nested products and dropping constant factors.
    pub fn product(a: CostExpr, b: CostExpr) -> CostExpr {
        let mut factors = Vec::new();
        for e in [a, b] {
            match e {
                CostExpr::Product(inner) => factors.extend(inner),
                CostExpr::Constant => {}
                other => factors.push(other),
            }
        }
        match factors.len() {
            0 => CostExpr::Constant,
            1 => factors.remove(0),
            _ => CostExpr::Product(factors),
        }
    }

    /// The slower-growing of two costs; unresolved if either is.
    pub fn min(a: CostExpr, b: CostExpr) -> CostExpr {
        match (a.growth(), b.growth()) {
            (Some(ga), Some(gb)) => {
                if ga.compare(&gb) == Ordering::Greater {
                    b
                } else {
                    a
                }
            }
            _ => match a.unresolved_symbols().into_iter().next() {
                Some(sym) => CostExpr::Unresolved(sym),
                None => b,
            },
        }
    }

    /// The faster-growing of two costs, kept symbolic as a sum.
    pub fn max(a: CostExpr, b: CostExpr) -> CostExpr {
        CostExpr::sum(a, b)
    }

    /// Canonical normal form; `None` if an unresolved symbol is present.
    pub fn growth(&self) -> Option<Growth> {
        match self {
            CostExpr::Constant => Some(Growth::CONSTANT),
            CostExpr::Poly(k) => Some(Growth::poly_log(*k, 0)),
            CostExpr::Log => Some(Growth::poly_log(0.0, 1)),
            CostExpr::Exponential => Some(Growth::EXPONENTIAL),
            CostExpr::Factorial => Some(Growth::FACTORIAL),
            CostExpr::Sum(terms) => {
                let mut best = Growth::CONSTANT;
                for t in terms {
                    let g = t.growth()?;
                    if g.compare(&best) == Ordering::Greater {
                        best = g;
                    }
                }
                Some(best)
            }
            CostExpr::Product(factors) => {
                let mut acc = Growth::CONSTANT;
                for f in factors {
                    acc = acc.product(&f.growth()?);
                }
                Some(acc)
            }
            CostExpr::Unresolved(_) => None,
        }
    }

    /// Collapse to the simplest equivalent expression.
    pub fn normalize(&self) -> CostExpr {
        match self.growth() {
            Some(g) => CostExpr::from_growth(&g),
            None => self.clone(),
        }
    }

    pub fn exact_class(&self) -> Option<GrowthClass> {
        self.growth()?.exact_class()
    }

    /// Class usable as an O bound.
    pub fn upper_class(&self) -> GrowthClass {
        self.growth()
            .map(|g| g.ceil_class())
            .unwrap_or(GrowthClass::Unknown)
    }

    /// Class usable as an Ω bound.
    pub fn lower_class(&self) -> GrowthClass {
        self.growth()
            .map(|g| g.floor_class())
            .unwrap_or(GrowthClass::Unknown)
    }

    pub fn is_resolved(&self) -> bool {
        self.growth().is_some()
    }

    pub fn unresolved_symbols(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_unresolved(&mut out);
        out
    }

    fn collect_unresolved(&self, out: &mut Vec<String>) {
        match self {
            CostExpr::Unresolved(sym) => {
                if !out.contains(sym) {
                    out.push(sym.clone());
                }
            }
            CostExpr::Sum(items) | CostExpr::Product(items) => {
                for item in items {
                    item.collect_unresolved(out);
                }
            }
            _ => {}
        }
    }

    /// Replace every unresolved `symbol` with `with`.
    pub fn substitute(&self, symbol: &str, with: &CostExpr) -> CostExpr {
        match self {
            CostExpr::Unresolved(sym) if sym == symbol => with.clone(),
            CostExpr::Sum(items) => items
                .iter()
                .map(|i| i.substitute(symbol, with))
                .fold(CostExpr::Constant, CostExpr::sum),
            CostExpr::Product(items) => items
                .iter()
                .map(|i| i.substitute(symbol, with))
                .fold(CostExpr::Constant, CostExpr::product),
            other => other.clone(),
        }
    }
}

impl fmt::Display for CostExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CostExpr::Sum(items) => {
                let parts: Vec<String> = items.iter().map(|i| i.to_string()).collect();
                write!(f, "max({})", parts.join(", "))
            }
            CostExpr::Product(items) => {
                let parts: Vec<String> = items.iter().map(|i| i.to_string()).collect();
                f.write_str(&parts.join(" · "))
            }
            CostExpr::Unresolved(sym) => write!(f, "?{}", sym),
            other => match other.growth() {
                Some(g) => write!(f, "{}", g),
                None => f.write_str("?"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_loops_multiply() {
        let two = CostExpr::product(CostExpr::linear(), CostExpr::linear());
        let three = CostExpr::product(two.clone(), CostExpr::linear());
        assert_eq!(two.exact_class(), Some(GrowthClass::Quadratic));
        assert_eq!(three.exact_class(), Some(GrowthClass::Cubic));
    }

    #[test]
    fn test_sum_takes_dominant_term() {
        let e = CostExpr::sum(CostExpr::Poly(2.0), CostExpr::linear());
        assert_eq!(e.exact_class(), Some(GrowthClass::Quadratic));
        let tie = CostExpr::sum(CostExpr::linear(), CostExpr::linear());
        assert_eq!(tie.exact_class(), Some(GrowthClass::Linear));
    }

    #[test]
    fn test_distinct_shapes_normalize_equal() {
        let a = CostExpr::product(CostExpr::Log, CostExpr::linear());
        let b = CostExpr::sum(
            CostExpr::Constant,
            CostExpr::product(CostExpr::linear(), CostExpr::Log),
        );
        assert_eq!(a.normalize(), b.normalize());
        assert_eq!(a.exact_class(), Some(GrowthClass::Linearithmic));
    }

    #[test]
    fn test_unresolved_poisons() {
        let e = CostExpr::product(CostExpr::linear(), CostExpr::Unresolved("f".into()));
        assert!(!e.is_resolved());
        assert_eq!(e.upper_class(), GrowthClass::Unknown);
        let fixed = e.substitute("f", &CostExpr::Constant);
        assert_eq!(fixed.exact_class(), Some(GrowthClass::Linear));
    }

    #[test]
    fn test_fractional_power_rounds_outward() {
        let karatsuba = CostExpr::Poly(3f64.log2());
        assert_eq!(karatsuba.exact_class(), None);
        assert_eq!(karatsuba.upper_class(), GrowthClass::Quadratic);
        assert_eq!(karatsuba.lower_class(), GrowthClass::Linearithmic);
    }

    #[test]
    fn test_high_polynomial_has_no_upper_class() {
        let e = CostExpr::Poly(4.0);
        assert_eq!(e.upper_class(), GrowthClass::Unknown);
        assert_eq!(e.lower_class(), GrowthClass::Cubic);
    }

    #[test]
    fn test_polynomial_times_exponential_is_not_exponential() {
        let e = CostExpr::product(CostExpr::linear(), CostExpr::Exponential);
        let g = e.growth().unwrap();
        assert_eq!(g.compare(&Growth::EXPONENTIAL), Ordering::Greater);
        assert_eq!(g.compare(&Growth::FACTORIAL), Ordering::Less);
        assert_eq!(e.exact_class(), None);
        assert_eq!(e.upper_class(), GrowthClass::Unknown);
        assert_eq!(e.lower_class(), GrowthClass::Exponential);
        assert_eq!(e.normalize().to_string(), "n · 2^n");

        let plain = CostExpr::product(CostExpr::Constant, CostExpr::Exponential);
        assert_eq!(plain.exact_class(), Some(GrowthClass::Exponential));
        let dominated = CostExpr::sum(CostExpr::Poly(3.0), CostExpr::Exponential);
        assert_eq!(dominated.exact_class(), Some(GrowthClass::Exponential));
    }

    #[test]
    fn test_min_picks_smaller() {
        let m = CostExpr::min(CostExpr::linear(), CostExpr::Constant);
        assert_eq!(m, CostExpr::Constant);
    }
}
