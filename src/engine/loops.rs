//! Trip counts for `for` and `while` loops
//!
//! A loop is regular when its trip count can be read off its header as a
//! function of the input size. Everything else is irregular and goes to the
//! oracle.

use super::rules::Walker;
use crate::ast::{BinOp, Block, Expr, ForLoop, LoopTest, Stmt, UnOp, WhileLoop};
use crate::complexity::CostExpr;
use crate::error::AnalysisIssue;
use crate::oracle::{expr as render_expr, for_header};
use crate::recurrence::Affine;
use std::collections::HashMap;

const EPS: f64 = 1e-9;

fn irregular(reason: impl Into<String>) -> AnalysisIssue {
    AnalysisIssue::UnresolvableStructure(reason.into())
}

/// How deep known values are expanded before giving up.
const MAX_EXPANSION: usize = 16;

pub(super) struct Trips {
    pub count: CostExpr,
    /// Size degree of the values the loop variable takes.
    pub var_degree: Option<u32>,
}

pub(super) struct WhileTrips {
    pub count: CostExpr,
    /// The condition has conjuncts besides the one bounding the loop.
    pub guarded: bool,
    pub detail: String,
}

/// What a variable stands for at the current point of the walk.
enum VarKind<'a> {
    /// Variable of an enclosing `for`, with the degree of its values.
    Loop(Option<u32>),
    Known(&'a Expr),
    /// Assigned somewhere already walked, value no longer known.
    Unknown,
    /// Input size: scalar or array parameter, or a free variable.
    Size,
    /// Local never assigned before this point.
    Local,
}

#[derive(Debug, Clone, Copy)]
enum Update {
    /// `v <- v + c`
    Step(f64),
    /// `v <- v * c`, c > 1
    Scale(f64),
    /// `v <- v div c`, c > 1
    Shrink(f64),
}

impl Update {
    fn advances_towards(self, op: BinOp) -> bool {
        match (self, op) {
            (Update::Step(c), BinOp::Lt | BinOp::Le) => c > 0.0,
            (Update::Step(c), BinOp::Gt | BinOp::Ge) => c < 0.0,
            (Update::Step(_), BinOp::Ne) => true,
            (Update::Scale(_), BinOp::Lt | BinOp::Le) => true,
            (Update::Shrink(_), BinOp::Gt | BinOp::Ge) => true,
            _ => false,
        }
    }

    fn describe(self, var: &str) -> String {
        match self {
            Update::Step(c) if c < 0.0 => format!("{} <- {} - {}", var, var, -c),
            Update::Step(c) => format!("{} <- {} + {}", var, var, c),
            Update::Scale(c) => format!("{} <- {} * {}", var, var, c),
            Update::Shrink(c) => format!("{} <- {} div {}", var, var, c),
        }
    }
}

enum Conjunct<'e> {
    Compare(&'e Expr, BinOp, &'e Expr),
    Opaque,
}

impl<'a> Walker<'a> {
    fn classify(&self, name: &str) -> VarKind<'a> {
        if let Some(frame) = self.loops.iter().rev().find(|f| f.header.var == name) {
            return VarKind::Loop(frame.degree);
        }
        if let Some((_, value)) = self.values.iter().rev().find(|(n, _)| *n == name) {
            return match *value {
                Some(e) => VarKind::Known(e),
                None => VarKind::Unknown,
            };
        }
        if self.is_size_param(name) {
            VarKind::Size
        } else {
            VarKind::Local
        }
    }

    fn var_degree(&self, name: &str, depth: usize) -> Option<u32> {
        if name.starts_with("length(") {
            return Some(1);
        }
        match self.classify(name) {
            VarKind::Loop(d) => d,
            VarKind::Known(e) if depth < MAX_EXPANSION => self.degree(e, depth + 1),
            VarKind::Size => Some(1),
            VarKind::Known(_) | VarKind::Unknown | VarKind::Local => None,
        }
    }

    /// Polynomial degree of `e` in the input size.
    pub(super) fn degree(&self, e: &Expr, depth: usize) -> Option<u32> {
        match e {
            Expr::Number(_) | Expr::Bool(_) | Expr::Null | Expr::Str(_) => Some(0),
            Expr::Var(name) => self.var_degree(name, depth),
            Expr::Length(_) => Some(1),
            Expr::Binary { op, lhs, rhs } => {
                let l = self.degree(lhs, depth)?;
                let r = self.degree(rhs, depth)?;
                match op {
                    BinOp::Add | BinOp::Sub => Some(l.max(r)),
                    BinOp::Mul => Some(l + r),
                    BinOp::Div | BinOp::IntDiv => (r == 0).then_some(l),
                    BinOp::Mod => Some(r),
                    _ => None,
                }
            }
            Expr::Unary {
                op: UnOp::Neg | UnOp::Ceil | UnOp::Floor,
                operand,
            } => self.degree(operand, depth),
            Expr::Unary { op: UnOp::Not, .. } | Expr::Index { .. } | Expr::Field { .. } | Expr::Call { .. } => None,
        }
    }

    /// Affine form with known values substituted and everything else kept symbolic.
    fn affine(&self, e: &Expr, depth: usize) -> Option<Affine> {
        let lookup = |name: &str| match self.classify(name) {
            VarKind::Known(value) if depth < MAX_EXPANSION => self.affine(value, depth + 1),
            _ => None,
        };
        Affine::from_expr(e, &lookup)
    }

    fn constant_value(&self, e: &Expr) -> Option<f64> {
        e.as_number().or_else(|| match e {
            Expr::Var(name) => match self.classify(name) {
                VarKind::Known(value) => value.as_number(),
                _ => None,
            },
            _ => None,
        })
    }

    /// True when `e` depends on input sizes and constants only.
    pub(super) fn size_only(&self, e: &Expr, depth: usize) -> bool {
        if depth > MAX_EXPANSION {
            return false;
        }
        match e {
            Expr::Number(_) | Expr::Bool(_) | Expr::Null | Expr::Length(_) => true,
            Expr::Var(name) => match self.classify(name) {
                VarKind::Size => true,
                VarKind::Known(value) => self.size_only(value, depth + 1),
                VarKind::Loop(_) | VarKind::Unknown | VarKind::Local => false,
            },
            Expr::Binary { lhs, rhs, .. } => self.size_only(lhs, depth) && self.size_only(rhs, depth),
            Expr::Unary { operand, .. } => self.size_only(operand, depth),
            Expr::Str(_) | Expr::Index { .. } | Expr::Field { .. } | Expr::Call { .. } => false,
        }
    }

    pub(super) fn for_trips(&self, l: &ForLoop) -> Result<Trips, AnalysisIssue> {
        if let Some(step) = &l.step {
            match self.constant_value(step) {
                Some(s) if s.abs() > EPS => {}
                Some(_) => return Err(irregular("step of zero never advances")),
                None => return Err(irregular(format!("step {} is not a constant", render_expr(step)))),
            }
        }
        let assigned = l.body.assigned_variables();
        if assigned.contains(&l.var.as_str()) {
            return Err(irregular(format!("the body modifies loop variable {}", l.var)));
        }
        if let Some(v) = l
            .start
            .variables()
            .into_iter()
            .chain(l.end.variables())
            .find(|v| assigned.contains(v))
        {
            return Err(irregular(format!("bound variable {} changes inside the body", v)));
        }
        if l.start.contains_call() || l.end.contains_call() {
            return Err(irregular("a bound calls a procedure"));
        }

        let var_degree = self
            .degree(&l.start, 0)
            .zip(self.degree(&l.end, 0))
            .map(|(a, b)| a.max(b));
        let (lo, hi) = if l.descending {
            (&l.end, &l.start)
        } else {
            (&l.start, &l.end)
        };
        let span_degree = match (self.affine(hi, 0), self.affine(lo, 0)) {
            (Some(h), Some(low)) => self.span_degree(&h.sub(&low)).map_err(irregular)?,
            _ => var_degree.ok_or_else(|| irregular(format!("cannot bound the range of {}", for_header(l))))?,
        };
        let count = if span_degree == 0 {
            CostExpr::Constant
        } else {
            CostExpr::Poly(span_degree as f64)
        };
        Ok(Trips { count, var_degree })
    }

    fn span_degree(&self, span: &Affine) -> Result<u32, String> {
        let mut degree = 0;
        for (var, coef) in span.vars() {
            let d = self
                .var_degree(var, 0)
                .ok_or_else(|| format!("range depends on {}, whose size is unknown", var))?;
            if coef > EPS {
                degree = degree.max(d);
            }
        }
        Ok(degree)
    }

    pub(super) fn while_trips(&self, l: &WhileLoop) -> Result<WhileTrips, AnalysisIssue> {
        let mut conjuncts = Vec::new();
        continuation(&l.cond, l.test == LoopTest::PostTest, &mut conjuncts);
        let assigned = l.body.assigned_variables();
        let updates = updates(&l.body, &assigned);
        if updates.is_empty() {
            return Err(irregular("no variable is updated by a constant step on every pass"));
        }

        for conjunct in &conjuncts {
            let Conjunct::Compare(lhs, op, rhs) = conjunct else {
                continue;
            };
            for (side, op, bound) in [(*lhs, *op, *rhs), (*rhs, flipped(*op), *lhs)] {
                let Expr::Var(var) = side else {
                    continue;
                };
                let Some(update) = updates.get(var.as_str()).copied() else {
                    continue;
                };
                if bound.contains_call() || bound.variables().iter().any(|b| assigned.contains(b)) {
                    continue;
                }
                if !update.advances_towards(op) {
                    continue;
                }
                let (Some(init), Some(limit)) = (self.initial_degree(var, update), self.degree(bound, 0)) else {
                    continue;
                };
                let d = init.max(limit);
                let count = match (update, d) {
                    (_, 0) => CostExpr::Constant,
                    (Update::Step(_), d) => CostExpr::Poly(d as f64),
                    (Update::Scale(_) | Update::Shrink(_), _) => CostExpr::Log,
                };
                return Ok(WhileTrips {
                    count,
                    guarded: conjuncts.len() > 1,
                    detail: format!("{} {} {} with {}", var, op.symbol(), render_expr(bound), update.describe(var)),
                });
            }
        }
        Err(irregular("the condition has no variable moving monotonically towards a fixed bound"))
    }

    fn initial_degree(&self, var: &str, update: Update) -> Option<u32> {
        match self.classify(var) {
            VarKind::Known(value) => {
                if matches!(update, Update::Scale(_)) && value.as_number().is_some_and(|v| v <= 0.0) {
                    return None;
                }
                self.degree(value, 1)
            }
            VarKind::Loop(d) => d,
            VarKind::Size => Some(1),
            VarKind::Unknown | VarKind::Local => None,
        }
    }
}

/// Conditions under which the loop keeps going, split at `and`.
fn continuation<'e>(e: &'e Expr, negate: bool, out: &mut Vec<Conjunct<'e>>) {
    match e {
        Expr::Binary {
            op: BinOp::And,
            lhs,
            rhs,
        } if !negate => {
            continuation(lhs, negate, out);
            continuation(rhs, negate, out);
        }
        Expr::Binary {
            op: BinOp::Or,
            lhs,
            rhs,
        } if negate => {
            continuation(lhs, negate, out);
            continuation(rhs, negate, out);
        }
        Expr::Unary { op: UnOp::Not, operand } => continuation(operand, !negate, out),
        Expr::Binary { op, lhs, rhs } if op.is_comparison() => {
            let op = if negate { negated(*op) } else { *op };
            out.push(Conjunct::Compare(lhs, op, rhs));
        }
        _ => out.push(Conjunct::Opaque),
    }
}

fn negated(op: BinOp) -> BinOp {
    match op {
        BinOp::Lt => BinOp::Ge,
        BinOp::Le => BinOp::Gt,
        BinOp::Gt => BinOp::Le,
        BinOp::Ge => BinOp::Lt,
        BinOp::Eq => BinOp::Ne,
        BinOp::Ne => BinOp::Eq,
        other => other,
    }
}

/// `a op b` rewritten as `b op' a`.
fn flipped(op: BinOp) -> BinOp {
    match op {
        BinOp::Lt => BinOp::Gt,
        BinOp::Le => BinOp::Ge,
        BinOp::Gt => BinOp::Lt,
        BinOp::Ge => BinOp::Le,
        other => other,
    }
}

/// Unconditional top-level updates of variables assigned exactly once in the body.
fn updates<'b>(body: &'b Block, assigned: &[&str]) -> HashMap<&'b str, Update> {
    let mut out = HashMap::new();
    for stmt in &body.stmts {
        let Stmt::Assign(a) = stmt else {
            continue;
        };
        let Expr::Var(var) = &a.target else {
            continue;
        };
        if assigned.iter().filter(|v| **v == var.as_str()).count() != 1 {
            continue;
        }
        if let Some(update) = update_of(var, &a.value) {
            out.insert(var.as_str(), update);
        }
    }
    out
}

fn update_of(var: &str, value: &Expr) -> Option<Update> {
    let Expr::Binary { op, lhs, rhs } = value else {
        return match value {
            Expr::Unary {
                op: UnOp::Floor | UnOp::Ceil,
                operand,
            } => update_of(var, operand),
            _ => None,
        };
    };
    let is_var = |e: &Expr| matches!(e, Expr::Var(n) if n == var);
    let (c, var_left) = if is_var(lhs) {
        (rhs.as_number()?, true)
    } else if is_var(rhs) {
        (lhs.as_number()?, false)
    } else {
        return None;
    };
    match op {
        BinOp::Add if c.abs() > EPS => Some(Update::Step(c)),
        BinOp::Sub if var_left && c.abs() > EPS => Some(Update::Step(-c)),
        BinOp::Mul if c > 1.0 => Some(Update::Scale(c)),
        BinOp::Div | BinOp::IntDiv if var_left && c > 1.0 => Some(Update::Shrink(c)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_program;

    fn cond(src: &str) -> Expr {
        let program = parse_program(&format!("p(a, b)\nbegin\n  x <- {}\nend", src), "c.psc").unwrap();
        match &program.procedures[0].body.stmts[0] {
            Stmt::Assign(a) => a.value.clone(),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_repeat_condition_is_negated() {
        let e = cond("i >= n or found");
        let mut out = Vec::new();
        continuation(&e, true, &mut out);
        assert_eq!(out.len(), 2);
        assert!(matches!(out[0], Conjunct::Compare(_, BinOp::Lt, _)));
        assert!(matches!(out[1], Conjunct::Opaque));
    }

    #[test]
    fn test_not_flips_comparison() {
        let e = cond("not (i > n)");
        let mut out = Vec::new();
        continuation(&e, false, &mut out);
        assert!(matches!(out[0], Conjunct::Compare(_, BinOp::Le, _)));
    }

    #[test]
    fn test_update_shapes() {
        assert!(matches!(update_of("i", &cond("i + 1")), Some(Update::Step(c)) if c == 1.0));
        assert!(matches!(update_of("i", &cond("i - 2")), Some(Update::Step(c)) if c == -2.0));
        assert!(matches!(update_of("i", &cond("2 * i")), Some(Update::Scale(_))));
        assert!(matches!(update_of("i", &cond("i div 2")), Some(Update::Shrink(_))));
        assert!(matches!(update_of("i", &cond("└i / 2┘")), Some(Update::Shrink(_))));
        assert!(update_of("i", &cond("i * i")).is_none());
        assert!(update_of("i", &cond("1 - i")).is_none());
        assert!(update_of("i", &cond("i * 1")).is_none());
    }

    #[test]
    fn test_direction_must_match_comparison() {
        assert!(Update::Step(1.0).advances_towards(BinOp::Lt));
        assert!(!Update::Step(1.0).advances_towards(BinOp::Gt));
        assert!(Update::Shrink(2.0).advances_towards(BinOp::Ge));
        assert!(!Update::Scale(2.0).advances_towards(BinOp::Ne));
        assert!(!Update::Step(1.0).advances_towards(BinOp::Eq));
    }
}
