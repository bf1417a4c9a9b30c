//! Affine forms over program variables
//!
//! `Affine` represents `c0 + Σ ci·vi`. It is what loop spans and recursive
//! call arguments are reduced to before anything asymptotic is decided.

use crate::ast::{BinOp, Block, Expr, Stmt, UnOp};
use std::collections::{BTreeMap, HashMap};

const EPS: f64 = 1e-9;

/// Substitution depth for chains of single-assignment locals.
const MAX_SUBSTITUTION_DEPTH: usize = 16;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Affine {
    pub terms: BTreeMap<String, f64>,
    pub constant: f64,
}

impl Affine {
    pub fn constant(c: f64) -> Self {
        Self {
            terms: BTreeMap::new(),
            constant: c,
        }
    }

    pub fn var(name: impl Into<String>) -> Self {
        let mut terms = BTreeMap::new();
        terms.insert(name.into(), 1.0);
        Self { terms, constant: 0.0 }
    }

    pub fn coef(&self, name: &str) -> f64 {
        self.terms.get(name).copied().unwrap_or(0.0)
    }

    pub fn add(&self, other: &Affine) -> Affine {
        let mut out = self.clone();
        for (v, c) in &other.terms {
            *out.terms.entry(v.clone()).or_insert(0.0) += c;
        }
        out.constant += other.constant;
        out.prune()
    }

    pub fn sub(&self, other: &Affine) -> Affine {
        self.add(&other.scale(-1.0))
    }

    pub fn scale(&self, k: f64) -> Affine {
        Affine {
            terms: self.terms.iter().map(|(v, c)| (v.clone(), c * k)).collect(),
            constant: self.constant * k,
        }
        .prune()
    }

    fn prune(mut self) -> Affine {
        self.terms.retain(|_, c| c.abs() > EPS);
        self
    }

    pub fn is_constant(&self) -> bool {
        self.terms.is_empty()
    }

    /// Variables with a non-zero coefficient.
    pub fn vars(&self) -> impl Iterator<Item = (&str, f64)> {
        self.terms.iter().map(|(v, c)| (v.as_str(), *c))
    }

    /// `(k, c)` such that `self == k·other + c`, if one exists.
    pub fn ratio_to(&self, other: &Affine) -> Option<(f64, f64)> {
        let (pivot, pivot_coef) = other.terms.iter().next()?;
        let k = self.coef(pivot) / pivot_coef;
        let consistent = self
            .terms
            .keys()
            .chain(other.terms.keys())
            .all(|v| (self.coef(v) - k * other.coef(v)).abs() < EPS);
        consistent.then(|| (k, self.constant - k * other.constant))
    }

    /// Affine form of `expr`; `lookup` may expand variables (e.g. locals).
    pub fn from_expr(expr: &Expr, lookup: &dyn Fn(&str) -> Option<Affine>) -> Option<Affine> {
        match expr {
            Expr::Number(v) => Some(Affine::constant(*v)),
            Expr::Var(name) => Some(lookup(name).unwrap_or_else(|| Affine::var(name.clone()))),
            Expr::Length(inner) => inner.root_variable().map(|v| Affine::var(length_var(v))),
            Expr::Unary { op, operand } => {
                let inner = Affine::from_expr(operand, lookup)?;
                match op {
                    UnOp::Neg => Some(inner.scale(-1.0)),
                    UnOp::Ceil | UnOp::Floor => Some(inner),
                    UnOp::Not => None,
                }
            }
            Expr::Binary { op, lhs, rhs } => {
                let l = Affine::from_expr(lhs, lookup)?;
                let r = Affine::from_expr(rhs, lookup)?;
                match op {
                    BinOp::Add => Some(l.add(&r)),
                    BinOp::Sub => Some(l.sub(&r)),
                    BinOp::Mul if l.is_constant() => Some(r.scale(l.constant)),
                    BinOp::Mul if r.is_constant() => Some(l.scale(r.constant)),
                    BinOp::Div | BinOp::IntDiv if r.is_constant() && r.constant.abs() > EPS => {
                        Some(l.scale(1.0 / r.constant))
                    }
                    _ => None,
                }
            }
            _ => None,
        }
    }
}

/// Pseudo-variable naming the length of an array.
pub fn length_var(array: &str) -> String {
    format!("length({})", array)
}

/// Locals assigned exactly once in a procedure body, with their values.
///
/// These can be substituted symbolically (`mid <- (lo + hi) div 2`).
#[derive(Debug, Default)]
pub struct SizeEnv<'a> {
    locals: HashMap<&'a str, &'a Expr>,
}

impl<'a> SizeEnv<'a> {
    pub fn for_block(body: &'a Block) -> Self {
        let mut counts: HashMap<&'a str, usize> = HashMap::new();
        let mut values: HashMap<&'a str, &'a Expr> = HashMap::new();
        collect_assignments(body, &mut counts, &mut values);
        let locals = values
            .into_iter()
            .filter(|(name, value)| counts.get(name) == Some(&1) && !value.variables().contains(name))
            .collect();
        Self { locals }
    }

    pub fn local(&self, name: &str) -> Option<&'a Expr> {
        self.locals.get(name).copied()
    }

    pub fn is_local(&self, name: &str) -> bool {
        self.locals.contains_key(name)
    }

    /// Affine form of `expr` with single-assignment locals expanded.
    pub fn affine(&self, expr: &Expr) -> Option<Affine> {
        self.affine_at(expr, 0)
    }

    fn affine_at(&self, expr: &Expr, depth: usize) -> Option<Affine> {
        if depth > MAX_SUBSTITUTION_DEPTH {
            return None;
        }
        let lookup = |name: &str| -> Option<Affine> {
            let value = self.local(name)?;
            self.affine_at(value, depth + 1)
        };
        Affine::from_expr(expr, &lookup)
    }
}

fn collect_assignments<'a>(
    block: &'a Block,
    counts: &mut HashMap<&'a str, usize>,
    values: &mut HashMap<&'a str, &'a Expr>,
) {
    for stmt in &block.stmts {
        match stmt {
            Stmt::Assign(a) => {
                if let Expr::Var(name) = &a.target {
                    *counts.entry(name.as_str()).or_insert(0) += 1;
                    values.insert(name.as_str(), &a.value);
                }
            }
            Stmt::For(l) => {
                *counts.entry(l.var.as_str()).or_insert(0) += 2;
                collect_assignments(&l.body, counts, values);
            }
            Stmt::While(l) => collect_assignments(&l.body, counts, values),
            Stmt::If(s) => {
                collect_assignments(&s.then_block, counts, values);
                if let Some(b) = &s.else_block {
                    collect_assignments(b, counts, values);
                }
            }
            Stmt::Call(_) | Stmt::Primitive(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Assignment, Position};

    fn none(_: &str) -> Option<Affine> {
        None
    }

    #[test]
    fn test_span_of_triangular_bounds() {
        let span = Affine::from_expr(
            &Expr::binary(BinOp::Sub, Expr::var("n"), Expr::var("i")),
            &none,
        )
        .unwrap();
        assert_eq!(span.coef("n"), 1.0);
        assert_eq!(span.coef("i"), -1.0);
    }

    #[test]
    fn test_halving_ratio() {
        let n = Affine::var("n");
        let half = Affine::from_expr(
            &Expr::binary(BinOp::IntDiv, Expr::var("n"), Expr::num(2.0)),
            &none,
        )
        .unwrap();
        assert_eq!(half.ratio_to(&n), Some((0.5, 0.0)));
        let minus_one = Affine::from_expr(
            &Expr::binary(BinOp::Sub, Expr::var("n"), Expr::num(1.0)),
            &none,
        )
        .unwrap();
        assert_eq!(minus_one.ratio_to(&n), Some((1.0, -1.0)));
    }

    #[test]
    fn test_non_affine() {
        let sq = Expr::binary(BinOp::Mul, Expr::var("n"), Expr::var("n"));
        assert!(Affine::from_expr(&sq, &none).is_none());
    }

    #[test]
    fn test_midpoint_substitution() {
        let mid = Expr::binary(
            BinOp::IntDiv,
            Expr::binary(BinOp::Add, Expr::var("lo"), Expr::var("hi")),
            Expr::num(2.0),
        );
        let body = Block::new(
            vec![Stmt::Assign(Assignment {
                target: Expr::var("mid"),
                value: mid,
                position: Position::default(),
            })],
            Position::default(),
        );
        let env = SizeEnv::for_block(&body);
        assert!(env.is_local("mid"));
        let measure = Affine::var("hi").sub(&Affine::var("lo"));
        let left = env
            .affine(&Expr::binary(BinOp::Sub, Expr::var("mid"), Expr::var("lo")))
            .unwrap();
        let (k, c) = left.ratio_to(&measure).unwrap();
        assert!((k - 0.5).abs() < 1e-9);
        assert!(c.abs() < 1e-9);
    }
}
