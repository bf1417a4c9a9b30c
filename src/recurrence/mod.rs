//! Recurrence Resolver
//!
//! Classifies a strongly-connected group of procedures into a closed-form
//! cost. Per recursive call site it extracts the branching factor (number
//! of recursive calls on one execution path) and the size reduction
//! `S' = k·S + c` relative to a size measure `S` inferred from the
//! parameters. The catalog:
//!
//! | shape | result |
//! |---|---|
//! | `T(n) = T(n-c) + f(n)` | `n·f(n)` |
//! | `T(n) = a·T(n-c) + f(n)`, `a ≥ 2` | `2ⁿ` (unless memoized) |
//! | `T(n) = a·T(n/b) + f(n)` | divide-and-conquer comparison of `n^log_b a` with `f(n)` |
//!
//! Anything else is `RecurrenceAmbiguous` and goes to the oracle.

mod affine;

pub use affine::{length_var, Affine, SizeEnv};

use crate::ast::{Block, Expr, ForLoop, ParamKind, PrimitiveKind, Procedure, Stmt};
use crate::complexity::{CostExpr, Growth};
use crate::error::AnalysisIssue;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::debug;

const EPS: f64 = 1e-9;

/// Upper limit on enumerated execution paths per procedure.
const MAX_PATHS: usize = 512;

/// Largest constant trip count unrolled into repeated call sites.
const MAX_UNROLLED_TRIPS: u32 = 64;

/// Upper limit on size-measure combinations tried for one group.
const MAX_MEASURE_COMBINATIONS: usize = 4096;

/// One procedure of a call group plus its non-recursive work.
#[derive(Debug, Clone)]
pub struct GroupMember<'a> {
    pub procedure: &'a Procedure,
    /// Worst-case cost of one invocation with recursive calls counted as constant.
    pub work_upper: CostExpr,
    /// Best-case cost of one invocation, same convention.
    pub work_lower: CostExpr,
}

/// How a recursive call changes the size measure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reduction {
    /// `S' = S - c`
    Subtract(f64),
    /// `S' = S / b`
    Divide(f64),
    /// `S' = S`; only allowed on acyclic hand-offs inside a group.
    NoChange,
}

impl fmt::Display for Reduction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reduction::Subtract(c) => write!(f, "n-{}", trim_float(*c)),
            Reduction::Divide(b) => write!(f, "n/{}", trim_float(*b)),
            Reduction::NoChange => write!(f, "n"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MasterRegime {
    /// `n^log_b a` grows faster than `f(n)`.
    RecursionDominates,
    /// Equal growth: one extra log factor.
    Balanced,
    /// `f(n)` grows faster.
    WorkDominates,
}

/// Which catalog entry produced the bound.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "case", rename_all = "snake_case")]
pub enum RecurrenceCase {
    /// `T(n) = T(n-c) + O(1)`
    LinearUnwinding,
    /// `T(n) = T(n-c) + f(n)` with non-constant `f`
    SubtractAndConquer,
    /// `T(n) = a·T(n-c) + f(n)` with `a ≥ 2`
    TreeRecursion { branching: u32 },
    /// Tree recursion short-circuited through a lookup table.
    MemoizedRecursion,
    DivideAndConquer {
        a: u32,
        b: f64,
        regime: MasterRegime,
    },
    /// Best case leaves before recursing.
    EarlyExit,
}

impl fmt::Display for RecurrenceCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecurrenceCase::LinearUnwinding => write!(f, "linear unwinding"),
            RecurrenceCase::SubtractAndConquer => write!(f, "subtract-and-conquer"),
            RecurrenceCase::TreeRecursion { branching } => write!(f, "tree recursion ({} branches)", branching),
            RecurrenceCase::MemoizedRecursion => write!(f, "memoized recursion"),
            RecurrenceCase::DivideAndConquer { a, b, regime } => {
                let regime = match regime {
                    MasterRegime::RecursionDominates => "recursive term dominates",
                    MasterRegime::Balanced => "balanced",
                    MasterRegime::WorkDominates => "extra work dominates",
                };
                write!(f, "divide and conquer a={}, b={} ({})", a, trim_float(*b), regime)
            }
            RecurrenceCase::EarlyExit => write!(f, "early exit before recursing"),
        }
    }
}

/// Closed form for a whole group, applied to every member.
#[derive(Debug, Clone, PartialEq)]
pub struct RecurrenceSolution {
    pub upper: CostExpr,
    pub lower: CostExpr,
    pub upper_case: RecurrenceCase,
    pub lower_case: RecurrenceCase,
    /// e.g. `T(n) = 2·T(n/2) + n`
    pub recurrence: String,
}

/// Resolve a strongly-connected group of procedures.
pub fn resolve(members: &[GroupMember<'_>]) -> Result<RecurrenceSolution, AnalysisIssue> {
    let names: HashMap<&str, usize> = members
        .iter()
        .enumerate()
        .map(|(i, m)| (m.procedure.name.as_str(), i))
        .collect();

    let mut shapes = Vec::with_capacity(members.len());
    for (index, member) in members.iter().enumerate() {
        let shape = PathAnalysis::new(index, member.procedure, &names)
            .run()
            .map_err(|why| ambiguous(member.procedure, why))?;
        shapes.push(shape);
    }

    if shapes.iter().all(|s| s.sites.is_empty()) {
        return Err(AnalysisIssue::RecurrenceAmbiguous(
            "group has no recursive call sites".to_string(),
        ));
    }

    let reductions = choose_measures(members, &shapes)?;
    let memoized = members
        .iter()
        .zip(&shapes)
        .all(|(m, s)| s.max_calls <= 1 || is_memoized(m.procedure));

    let kind = uniform_reduction(&reductions)?;
    let nochange_edges: Vec<(usize, usize)> = reductions
        .iter()
        .filter(|r| r.reduction == Reduction::NoChange)
        .map(|r| (r.caller, r.callee))
        .collect();
    let max_a = shapes.iter().map(|s| s.max_calls).max().unwrap_or(0);
    if !nochange_edges.is_empty() && (max_a > 1 || has_cycle(members.len(), &nochange_edges)) {
        return Err(AnalysisIssue::RecurrenceAmbiguous(
            "a call keeps the input size unchanged".to_string(),
        ));
    }

    let f_upper = members
        .iter()
        .map(|m| m.work_upper.clone())
        .fold(CostExpr::Constant, CostExpr::max);
    let f_lower = members
        .iter()
        .map(|m| m.work_lower.clone())
        .reduce(CostExpr::min)
        .unwrap_or(CostExpr::Constant);

    let a_upper = group_branching(&shapes, |s| s.max_calls, members.len())?;
    let (upper, upper_case) = solve(a_upper, kind, &f_upper, memoized)?;

    let early_exit = shapes.iter().any(|s| s.early_exit);
    let (lower, lower_case) = if early_exit {
        (f_lower.clone(), RecurrenceCase::EarlyExit)
    } else {
        let a_lower = group_branching(&shapes, |s| s.min_calls, members.len())?;
        solve(a_lower, kind, &f_lower, memoized)?
    };

    let recurrence = format!(
        "T(n) = {}T({}) + {}",
        if a_upper > 1 { format!("{}·", a_upper) } else { String::new() },
        kind,
        f_upper.normalize()
    );
    debug!(
        "Resolved group [{}]: {} -> {}",
        members
            .iter()
            .map(|m| m.procedure.name.as_str())
            .collect::<Vec<_>>()
            .join(", "),
        recurrence,
        upper_case
    );

    Ok(RecurrenceSolution {
        upper,
        lower,
        upper_case,
        lower_case,
        recurrence,
    })
}

fn ambiguous(proc: &Procedure, why: String) -> AnalysisIssue {
    AnalysisIssue::RecurrenceAmbiguous(format!("{}: {}", proc.name, why))
}

fn trim_float(v: f64) -> String {
    if (v - v.round()).abs() < EPS {
        format!("{}", v.round() as i64)
    } else {
        format!("{:.3}", v)
    }
}

/// Branching factor of the group. Multi-member groups must agree.
fn group_branching(
    shapes: &[ProcShape<'_>],
    pick: impl Fn(&ProcShape<'_>) -> u32,
    size: usize,
) -> Result<u32, AnalysisIssue> {
    let values: Vec<u32> = shapes.iter().map(&pick).collect();
    let max = values.iter().copied().max().unwrap_or(0);
    if size == 1 || values.iter().all(|v| *v == max) {
        return Ok(max.max(1));
    }
    if max <= 1 {
        return Ok(1);
    }
    Err(AnalysisIssue::RecurrenceAmbiguous(format!(
        "members branch differently ({:?})",
        values
    )))
}

/// Closed form of `a·T(reduce(n)) + f(n)`.
fn solve(
    a: u32,
    reduction: Reduction,
    f: &CostExpr,
    memoized: bool,
) -> Result<(CostExpr, RecurrenceCase), AnalysisIssue> {
    let growth = f.growth().ok_or_else(|| {
        AnalysisIssue::RecurrenceAmbiguous("non-recursive work is unresolved".to_string())
    })?;
    match reduction {
        Reduction::Subtract(_) | Reduction::NoChange => {
            let unwinds = a <= 1 || memoized;
            if !unwinds {
                return Ok((CostExpr::Exponential, RecurrenceCase::TreeRecursion { branching: a }));
            }
            if growth.exponential || growth.factorial {
                return Err(AnalysisIssue::RecurrenceAmbiguous(
                    "subtract-and-conquer with exponential work".to_string(),
                ));
            }
            let cost = CostExpr::product(CostExpr::linear(), f.clone()).normalize();
            let case = if a > 1 {
                RecurrenceCase::MemoizedRecursion
            } else if growth.compare(&Growth::CONSTANT).is_eq() {
                RecurrenceCase::LinearUnwinding
            } else {
                RecurrenceCase::SubtractAndConquer
            };
            Ok((cost, case))
        }
        Reduction::Divide(b) => {
            if growth.exponential || growth.factorial {
                return Err(AnalysisIssue::RecurrenceAmbiguous(
                    "divide-and-conquer with exponential work".to_string(),
                ));
            }
            let critical = (a as f64).ln() / b.ln();
            let (cost, regime) = if (critical - growth.poly).abs() < 1e-6 {
                (
                    CostExpr::from_growth(&Growth::poly_log(growth.poly, growth.log + 1)),
                    MasterRegime::Balanced,
                )
            } else if critical > growth.poly {
                (CostExpr::Poly(critical), MasterRegime::RecursionDominates)
            } else {
                (f.normalize(), MasterRegime::WorkDominates)
            };
            Ok((cost, RecurrenceCase::DivideAndConquer { a, b, regime }))
        }
    }
}

/// A recursive call found on some execution path.
#[derive(Debug, Clone)]
struct CallSite<'a> {
    callee: usize,
    args: &'a [Expr],
}

#[derive(Debug, Clone, Default)]
struct ExecPath<'a> {
    calls: Vec<CallSite<'a>>,
    guards: Vec<&'a Expr>,
    ended: bool,
}

impl<'a> ExecPath<'a> {
    fn then(&self, next: &ExecPath<'a>) -> ExecPath<'a> {
        let mut out = self.clone();
        out.calls.extend(next.calls.iter().cloned());
        out.guards.extend(next.guards.iter().copied());
        out.ended = next.ended;
        out
    }
}

/// Branching summary of one member.
#[derive(Debug)]
struct ProcShape<'a> {
    index: usize,
    sites: Vec<CallSite<'a>>,
    max_calls: u32,
    min_calls: u32,
    early_exit: bool,
}

struct PathAnalysis<'a, 'n> {
    index: usize,
    proc: &'a Procedure,
    names: &'n HashMap<&'n str, usize>,
    env: SizeEnv<'a>,
}

impl<'a, 'n> PathAnalysis<'a, 'n> {
    fn new(index: usize, proc: &'a Procedure, names: &'n HashMap<&'n str, usize>) -> Self {
        Self {
            index,
            proc,
            names,
            env: SizeEnv::for_block(&proc.body),
        }
    }

    fn run(self) -> Result<ProcShape<'a>, String> {
        let paths = self.block(&self.proc.body)?;
        let mut sites = Vec::new();
        let mut max_calls = 0u32;
        let mut min_calls: Option<u32> = None;
        let mut early_exit = false;
        for path in &paths {
            let n = path.calls.len() as u32;
            max_calls = max_calls.max(n);
            if n == 0 {
                if !path.guards.iter().all(|g| self.is_size_guard(g)) {
                    early_exit = true;
                }
            } else {
                min_calls = Some(min_calls.map_or(n, |m| m.min(n)));
            }
            sites.extend(path.calls.iter().cloned());
        }
        Ok(ProcShape {
            index: self.index,
            sites,
            max_calls,
            min_calls: min_calls.unwrap_or(0),
            early_exit,
        })
    }

    fn is_group_call(&self, name: &str) -> Option<usize> {
        self.names.get(name).copied()
    }

    /// A guard that only inspects the size of the input, i.e. a base case.
    fn is_size_guard(&self, guard: &Expr) -> bool {
        self.size_only(guard, 0)
    }

    fn size_only(&self, expr: &Expr, depth: usize) -> bool {
        if depth > 16 {
            return false;
        }
        match expr {
            Expr::Number(_) | Expr::Bool(_) | Expr::Null => true,
            Expr::Var(name) => {
                if let Some(value) = self.env.local(name) {
                    return self.size_only(value, depth + 1);
                }
                self.proc
                    .params
                    .iter()
                    .any(|p| &p.name == name && p.kind == ParamKind::Scalar)
            }
            Expr::Length(_) => true,
            Expr::Binary { lhs, rhs, .. } => self.size_only(lhs, depth) && self.size_only(rhs, depth),
            Expr::Unary { operand, .. } => self.size_only(operand, depth),
            Expr::Str(_) | Expr::Index { .. } | Expr::Field { .. } | Expr::Call { .. } => false,
        }
    }

    fn block(&self, block: &'a Block) -> Result<Vec<ExecPath<'a>>, String> {
        let mut acc = vec![ExecPath::default()];
        for stmt in &block.stmts {
            let options = self.stmt(stmt)?;
            let mut next = Vec::with_capacity(acc.len() * options.len());
            for path in &acc {
                if path.ended {
                    next.push(path.clone());
                    continue;
                }
                for option in &options {
                    next.push(path.then(option));
                }
            }
            if next.len() > MAX_PATHS {
                return Err("too many execution paths".to_string());
            }
            acc = next;
        }
        Ok(acc)
    }

    fn stmt(&self, stmt: &'a Stmt) -> Result<Vec<ExecPath<'a>>, String> {
        match stmt {
            Stmt::Assign(a) => {
                let mut calls = self.expr_calls(&a.target)?;
                calls.extend(self.expr_calls(&a.value)?);
                Ok(vec![ExecPath {
                    calls,
                    ..Default::default()
                }])
            }
            Stmt::Call(c) => {
                let mut calls = Vec::new();
                let recursive = self.is_group_call(&c.callee).is_some();
                for arg in &c.args {
                    if recursive && self.contains_group_call(arg) {
                        return Err(format!("nested recursive call in arguments of {}", c.callee));
                    }
                    calls.extend(self.expr_calls(arg)?);
                }
                if let Some(callee) = self.is_group_call(&c.callee) {
                    calls.push(CallSite { callee, args: &c.args });
                }
                Ok(vec![ExecPath {
                    calls,
                    ..Default::default()
                }])
            }
            Stmt::Primitive(p) => match &p.kind {
                PrimitiveKind::Return(value) => {
                    let calls = match value {
                        Some(v) => self.expr_calls(v)?,
                        None => Vec::new(),
                    };
                    Ok(vec![ExecPath {
                        calls,
                        guards: Vec::new(),
                        ended: true,
                    }])
                }
                PrimitiveKind::Break => Ok(vec![ExecPath::default()]),
            },
            Stmt::If(s) => {
                let prefix = ExecPath {
                    calls: self.expr_calls(&s.cond)?,
                    ..Default::default()
                };
                let guarded = ExecPath {
                    guards: vec![&s.cond],
                    ..Default::default()
                };
                let mut out = Vec::new();
                for p in self.block(&s.then_block)? {
                    out.push(prefix.then(&guarded).then(&p));
                }
                match &s.else_block {
                    Some(b) => {
                        for p in self.block(b)? {
                            out.push(prefix.then(&guarded).then(&p));
                        }
                    }
                    None => out.push(prefix.then(&guarded)),
                }
                Ok(out)
            }
            Stmt::For(l) => {
                if !self.block_has_group_call(&l.body)
                    && ![&l.start, &l.end].iter().any(|e| self.contains_group_call(e))
                {
                    return Ok(vec![ExecPath::default()]);
                }
                let trips = constant_trips(l)
                    .ok_or_else(|| "recursive call inside a loop with non-constant trip count".to_string())?;
                if trips > MAX_UNROLLED_TRIPS {
                    return Err(format!(
                        "recursive call repeated {} times by a loop (at most {} are unrolled)",
                        trips, MAX_UNROLLED_TRIPS
                    ));
                }
                let body = self.block(&l.body)?;
                body.into_iter()
                    .map(|p| -> Result<ExecPath<'a>, String> {
                        let total = p
                            .calls
                            .len()
                            .checked_mul(trips as usize)
                            .filter(|n| *n <= MAX_PATHS)
                            .ok_or_else(|| "too many recursive call sites after unrolling a loop".to_string())?;
                        let mut calls = Vec::with_capacity(total);
                        for _ in 0..trips {
                            calls.extend(p.calls.iter().cloned());
                        }
                        Ok(ExecPath {
                            calls,
                            guards: p.guards,
                            ended: p.ended,
                        })
                    })
                    .collect()
            }
            Stmt::While(l) => {
                if self.block_has_group_call(&l.body) || self.contains_group_call(&l.cond) {
                    Err("recursive call inside a conditional loop".to_string())
                } else {
                    Ok(vec![ExecPath::default()])
                }
            }
        }
    }

    fn expr_calls(&self, expr: &'a Expr) -> Result<Vec<CallSite<'a>>, String> {
        let mut out = Vec::new();
        self.collect_expr_calls(expr, &mut out)?;
        Ok(out)
    }

    fn collect_expr_calls(&self, expr: &'a Expr, out: &mut Vec<CallSite<'a>>) -> Result<(), String> {
        match expr {
            Expr::Call { callee, args, .. } => {
                let recursive = self.is_group_call(callee).is_some();
                for arg in args {
                    if recursive && self.contains_group_call(arg) {
                        return Err(format!("nested recursive call in arguments of {}", callee));
                    }
                    self.collect_expr_calls(arg, out)?;
                }
                if let Some(index) = self.is_group_call(callee) {
                    out.push(CallSite { callee: index, args });
                }
                Ok(())
            }
            Expr::Binary { lhs, rhs, .. } => {
                self.collect_expr_calls(lhs, out)?;
                self.collect_expr_calls(rhs, out)
            }
            Expr::Unary { operand, .. } | Expr::Length(operand) => self.collect_expr_calls(operand, out),
            Expr::Index { base, index } => {
                self.collect_expr_calls(base, out)?;
                self.collect_expr_calls(index, out)
            }
            Expr::Field { base, .. } => self.collect_expr_calls(base, out),
            Expr::Number(_) | Expr::Str(_) | Expr::Bool(_) | Expr::Null | Expr::Var(_) => Ok(()),
        }
    }

    fn contains_group_call(&self, expr: &Expr) -> bool {
        match expr {
            Expr::Call { callee, args, .. } => {
                self.is_group_call(callee).is_some() || args.iter().any(|a| self.contains_group_call(a))
            }
            Expr::Binary { lhs, rhs, .. } => self.contains_group_call(lhs) || self.contains_group_call(rhs),
            Expr::Unary { operand, .. } | Expr::Length(operand) => self.contains_group_call(operand),
            Expr::Index { base, index } => self.contains_group_call(base) || self.contains_group_call(index),
            Expr::Field { base, .. } => self.contains_group_call(base),
            Expr::Number(_) | Expr::Str(_) | Expr::Bool(_) | Expr::Null | Expr::Var(_) => false,
        }
    }

    fn block_has_group_call(&self, block: &Block) -> bool {
        block.stmts.iter().any(|stmt| match stmt {
            Stmt::Call(c) => {
                self.is_group_call(&c.callee).is_some() || c.args.iter().any(|a| self.contains_group_call(a))
            }
            Stmt::Assign(a) => self.contains_group_call(&a.target) || self.contains_group_call(&a.value),
            Stmt::Primitive(p) => match &p.kind {
                PrimitiveKind::Return(Some(v)) => self.contains_group_call(v),
                _ => false,
            },
            Stmt::If(s) => {
                self.contains_group_call(&s.cond)
                    || self.block_has_group_call(&s.then_block)
                    || s.else_block.as_ref().is_some_and(|b| self.block_has_group_call(b))
            }
            Stmt::For(l) => {
                self.contains_group_call(&l.start)
                    || self.contains_group_call(&l.end)
                    || self.block_has_group_call(&l.body)
            }
            Stmt::While(l) => self.contains_group_call(&l.cond) || self.block_has_group_call(&l.body),
        })
    }
}

/// Trip count of a `for` loop with literal bounds.
pub fn constant_trips(l: &ForLoop) -> Option<u32> {
    let start = l.start.as_number()?;
    let end = l.end.as_number()?;
    let step = match &l.step {
        Some(s) => s.as_number()?.abs(),
        None => 1.0,
    };
    if step < EPS {
        return None;
    }
    let span = if l.descending { start - end } else { end - start };
    if span < 0.0 {
        return Some(0);
    }
    let whole = (span / step).floor();
    if !whole.is_finite() || whole >= f64::from(u32::MAX) {
        return None;
    }
    (whole as u32).checked_add(1)
}

/// Reduction observed at one call site once measures are fixed.
#[derive(Debug, Clone)]
struct SiteReduction {
    caller: usize,
    callee: usize,
    reduction: Reduction,
}

/// Candidate size measures of a member: single scalar parameters, then
/// differences of two scalar parameters (`hi - lo`).
fn measure_candidates(proc: &Procedure) -> Vec<Affine> {
    let scalars: Vec<&str> = proc
        .params
        .iter()
        .filter(|p| p.kind == ParamKind::Scalar)
        .map(|p| p.name.as_str())
        .collect();
    let mut out: Vec<Affine> = scalars.iter().map(|p| Affine::var(*p)).collect();
    for hi in &scalars {
        for lo in &scalars {
            if hi != lo {
                out.push(Affine::var(*hi).sub(&Affine::var(*lo)));
            }
        }
    }
    out
}

/// Express the callee's measure in the caller's variables.
fn callee_measure(
    measure: &Affine,
    callee: &Procedure,
    args: &[Expr],
    env: &SizeEnv<'_>,
) -> Option<Affine> {
    if args.len() != callee.params.len() {
        return None;
    }
    let mut out = Affine::constant(measure.constant);
    for (var, coef) in measure.vars() {
        let position = callee.param_index(var)?;
        let arg = env.affine(&args[position])?;
        out = out.add(&arg.scale(coef));
    }
    Some(out)
}

fn classify_reduction(after: &Affine, before: &Affine) -> Option<Reduction> {
    let (k, c) = after.ratio_to(before)?;
    if (k - 1.0).abs() < EPS {
        if c < -EPS {
            Some(Reduction::Subtract(-c))
        } else if c.abs() <= EPS {
            Some(Reduction::NoChange)
        } else {
            None
        }
    } else if k > EPS && k < 1.0 - EPS {
        Some(Reduction::Divide(1.0 / k))
    } else {
        None
    }
}

/// Pick one measure per member so that every call site shrinks or keeps the size.
fn choose_measures(
    members: &[GroupMember<'_>],
    shapes: &[ProcShape<'_>],
) -> Result<Vec<SiteReduction>, AnalysisIssue> {
    let candidates: Vec<Vec<Affine>> = members.iter().map(|m| measure_candidates(m.procedure)).collect();
    if candidates.iter().any(Vec::is_empty) {
        return Err(AnalysisIssue::RecurrenceAmbiguous(
            "a member has no numeric parameter to measure input size".to_string(),
        ));
    }
    let envs: Vec<SizeEnv<'_>> = members.iter().map(|m| SizeEnv::for_block(&m.procedure.body)).collect();

    let total: usize = candidates
        .iter()
        .map(Vec::len)
        .try_fold(1usize, |acc, n| acc.checked_mul(n))
        .unwrap_or(usize::MAX);
    let tries = total.min(MAX_MEASURE_COMBINATIONS);

    for attempt in 0..tries {
        let mut rest = attempt;
        let choice: Vec<&Affine> = candidates
            .iter()
            .map(|c| {
                let pick = &c[rest % c.len()];
                rest /= c.len();
                pick
            })
            .collect();
        if let Some(reductions) = evaluate_choice(members, shapes, &envs, &choice) {
            return Ok(reductions);
        }
    }
    Err(AnalysisIssue::RecurrenceAmbiguous(
        "no size measure decreases on every recursive call".to_string(),
    ))
}

fn evaluate_choice(
    members: &[GroupMember<'_>],
    shapes: &[ProcShape<'_>],
    envs: &[SizeEnv<'_>],
    choice: &[&Affine],
) -> Option<Vec<SiteReduction>> {
    let mut out = Vec::new();
    let mut decreasing = false;
    for shape in shapes {
        for site in &shape.sites {
            let callee = members[site.callee].procedure;
            let after = callee_measure(choice[site.callee], callee, site.args, &envs[shape.index])?;
            let reduction = classify_reduction(&after, choice[shape.index])?;
            decreasing |= reduction != Reduction::NoChange;
            out.push(SiteReduction {
                caller: shape.index,
                callee: site.callee,
                reduction,
            });
        }
    }
    decreasing.then_some(out)
}

/// All shrinking sites must use the same kind of reduction (and the same divisor).
fn uniform_reduction(sites: &[SiteReduction]) -> Result<Reduction, AnalysisIssue> {
    let mut kind: Option<Reduction> = None;
    for site in sites {
        match (kind, site.reduction) {
            (_, Reduction::NoChange) => {}
            (None, r) => kind = Some(r),
            (Some(Reduction::Subtract(_)), Reduction::Subtract(_)) => {}
            (Some(Reduction::Divide(b1)), Reduction::Divide(b2)) if (b1 - b2).abs() < 1e-6 => {}
            (Some(a), b) => {
                return Err(AnalysisIssue::RecurrenceAmbiguous(format!(
                    "non-uniform size reduction ({} vs {})",
                    a, b
                )))
            }
        }
    }
    kind.ok_or_else(|| AnalysisIssue::RecurrenceAmbiguous("input size never shrinks".to_string()))
}

fn has_cycle(nodes: usize, edges: &[(usize, usize)]) -> bool {
    let mut graph = petgraph::graph::DiGraph::<(), ()>::new();
    let ids: Vec<_> = (0..nodes).map(|_| graph.add_node(())).collect();
    for (from, to) in edges {
        graph.add_edge(ids[*from], ids[*to], ());
    }
    petgraph::algo::is_cyclic_directed(&graph)
}

/// `if (M[n] ...) then return ...` guarding a table that the body also fills.
fn is_memoized(proc: &Procedure) -> bool {
    let mut reads: HashSet<(String, String)> = HashSet::new();
    let mut writes: HashSet<(String, String)> = HashSet::new();
    scan_memo(&proc.body, &mut reads, &mut writes);
    reads.intersection(&writes).next().is_some()
}

fn table_key(expr: &Expr) -> Option<(String, String)> {
    if let Expr::Index { base, index } = expr {
        let table = base.root_variable()?;
        return Some((table.to_string(), crate::oracle::expr(index)));
    }
    None
}

fn table_reads(expr: &Expr, out: &mut HashSet<(String, String)>) {
    if let Some(key) = table_key(expr) {
        out.insert(key);
    }
    match expr {
        Expr::Binary { lhs, rhs, .. } => {
            table_reads(lhs, out);
            table_reads(rhs, out);
        }
        Expr::Unary { operand, .. } => table_reads(operand, out),
        _ => {}
    }
}

fn scan_memo(block: &Block, reads: &mut HashSet<(String, String)>, writes: &mut HashSet<(String, String)>) {
    for stmt in &block.stmts {
        match stmt {
            Stmt::If(s) => {
                if s.then_block.contains_return() {
                    table_reads(&s.cond, reads);
                }
                scan_memo(&s.then_block, reads, writes);
                if let Some(b) = &s.else_block {
                    scan_memo(b, reads, writes);
                }
            }
            Stmt::Assign(a) => {
                if let Some(key) = table_key(&a.target) {
                    writes.insert(key);
                }
            }
            Stmt::For(l) => scan_memo(&l.body, reads, writes),
            Stmt::While(l) => scan_memo(&l.body, reads, writes),
            Stmt::Call(_) | Stmt::Primitive(_) => {}
        }
    }
}
