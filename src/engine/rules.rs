//! Cost composition over the statement tree
//!
//! A [`Walker`] folds one body into a pair of cost expressions: the worst
//! case (`upper`) and the best case (`lower`). Loops multiply their body by
//! a trip count. Branches take the larger side for the worst case and the
//! smaller side for the best case. Once a statement may return or break,
//! nothing after it contributes to the best case.

use super::report::{Rule, TraceStep};
use crate::ast::{
    Block, Expr, ForLoop, IfStmt, LoopTest, Param, ParamKind, Position, PrimitiveKind, Program, Stmt, VisitState, WhileLoop,
};
use crate::complexity::{ComplexityVerdict, CostExpr, Provenance, UnknownCause, FORMAL_CONFIDENCE};
use crate::error::AnalysisIssue;
use crate::fingerprint::{subtree_fingerprint, CalleeRef, Fingerprint};
use crate::knowledge::KnowledgeBase;
use crate::oracle::{expr as render_expr, for_header, render_stmt, OracleGateway, OracleRequest, RequestKind};
use crate::recurrence::length_var;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

/// What is already known while one program is being resolved.
#[derive(Clone, Copy)]
pub(super) struct Scope<'a> {
    pub kb: &'a KnowledgeBase,
    pub gateway: &'a OracleGateway,
    pub program: &'a Program,
    pub verdicts: &'a HashMap<String, ComplexityVerdict>,
    pub fingerprints: &'a HashMap<String, Fingerprint>,
}

impl Scope<'_> {
    /// How a call to `name` appears in the fingerprint of `current`.
    pub fn callee_ref(&self, name: &str, current: &str, group: &HashSet<String>) -> CalleeRef {
        if name == current {
            CalleeRef::Recursive
        } else if group.contains(name) {
            CalleeRef::Mutual
        } else if let Some(fp) = self.fingerprints.get(name) {
            CalleeRef::Resolved(fp.clone())
        } else {
            CalleeRef::External
        }
    }
}

/// Best and worst case cost of a statement or block.
#[derive(Debug, Clone)]
pub(super) struct Cost {
    pub upper: CostExpr,
    pub lower: CostExpr,
    /// Some path through it returns.
    pub returns: bool,
    /// Some path through it breaks out of the enclosing loop.
    pub breaks: bool,
}

impl Cost {
    pub fn constant() -> Self {
        Self::of(CostExpr::Constant, CostExpr::Constant)
    }

    pub fn of(upper: CostExpr, lower: CostExpr) -> Self {
        Self {
            upper,
            lower,
            returns: false,
            breaks: false,
        }
    }

    fn unresolved(symbol: &str) -> Self {
        Self::of(CostExpr::Unresolved(symbol.to_string()), CostExpr::Unresolved(symbol.to_string()))
    }

    pub fn exits(&self) -> bool {
        self.returns || self.breaks
    }

    /// Sequential composition.
    fn then(mut self, next: Cost) -> Cost {
        let exited = self.exits();
        self.upper = CostExpr::sum(self.upper, next.upper);
        if !exited {
            self.lower = CostExpr::sum(self.lower, next.lower);
        }
        self.returns |= next.returns;
        self.breaks |= next.breaks;
        self
    }

    /// Work that always runs alongside this cost (conditions, arguments).
    pub fn plus(mut self, extra: &Cost) -> Cost {
        self.upper = CostExpr::sum(self.upper, extra.upper.clone());
        self.lower = CostExpr::sum(self.lower, extra.lower.clone());
        self
    }
}

/// The verdict a failed derivation ends in.
pub(super) fn failed_verdict(cause: &UnknownCause, confidence: f64) -> ComplexityVerdict {
    match cause {
        UnknownCause::Unclassifiable(_) => ComplexityVerdict {
            provenance: Provenance::Oracle,
            confidence,
            ..ComplexityVerdict::error(cause.clone())
        },
        _ => ComplexityVerdict::error(cause.clone()),
    }
}

/// An enclosing `for` loop and the size degree of its variable.
pub(super) struct LoopFrame<'a> {
    pub header: &'a ForLoop,
    pub degree: Option<u32>,
}

/// Folds one procedure body (or the main block) into a [`Cost`].
pub(super) struct Walker<'a> {
    pub(super) scope: Scope<'a>,
    name: &'a str,
    pub(super) params: &'a [Param],
    group: &'a HashSet<String>,
    /// Variables read but never assigned: input sizes of the main block.
    pub(super) free: HashSet<&'a str>,
    pub(super) loops: Vec<LoopFrame<'a>>,
    /// Last known value of each variable; `None` once it is no longer known.
    pub(super) values: Vec<(&'a str, Option<&'a Expr>)>,
    pub trace: Vec<TraceStep>,
    pub failure: Option<UnknownCause>,
    confidence: f64,
    oracle_derived: bool,
}

impl<'a> Walker<'a> {
    pub fn new(
        scope: Scope<'a>,
        name: &'a str,
        params: &'a [Param],
        body: &'a Block,
        group: &'a HashSet<String>,
    ) -> Self {
        Self {
            scope,
            name,
            params,
            group,
            free: free_variables(params, body),
            loops: Vec::new(),
            values: Vec::new(),
            trace: Vec::new(),
            failure: None,
            confidence: FORMAL_CONFIDENCE,
            oracle_derived: false,
        }
    }

    /// Provenance and confidence of everything walked so far.
    pub fn provenance(&self) -> (Provenance, f64) {
        if self.oracle_derived {
            (Provenance::Oracle, self.confidence)
        } else {
            (Provenance::Formal, FORMAL_CONFIDENCE)
        }
    }

    pub fn verdict(&self, cost: &Cost) -> ComplexityVerdict {
        match &self.failure {
            Some(cause) => failed_verdict(cause, self.confidence),
            None => {
                let (provenance, confidence) = self.provenance();
                ComplexityVerdict::from_costs(&cost.upper, &cost.lower, provenance, confidence)
            }
        }
    }

    pub(super) fn note(&mut self, position: Position, rule: Rule, detail: impl Into<String>) {
        self.trace.push(TraceStep::new(position, rule, detail));
    }

    fn fail(&mut self, cause: UnknownCause) {
        if self.failure.is_none() {
            self.failure = Some(cause);
        }
    }

    fn absorb(&mut self, verdict: &ComplexityVerdict) {
        if verdict.origin() != Provenance::Formal {
            self.oracle_derived = true;
        }
        self.confidence = self.confidence.min(verdict.confidence);
    }

    pub(super) fn is_size_param(&self, name: &str) -> bool {
        self.params
            .iter()
            .any(|p| p.name == name && !matches!(p.kind, ParamKind::Object { .. }))
            || self.free.contains(name)
    }

    /// Input-size variables, as they are shown to the oracle.
    fn size_variables(&self) -> Vec<String> {
        let mut out = Vec::new();
        for p in self.params {
            match &p.kind {
                ParamKind::Scalar => out.push(p.name.clone()),
                ParamKind::Array { .. } => out.push(length_var(&p.name)),
                ParamKind::Object { .. } => {}
            }
        }
        let mut free: Vec<&str> = self.free.iter().copied().collect();
        free.sort_unstable();
        out.extend(free.into_iter().map(str::to_string));
        out
    }

    fn with_size_context(&self, request: OracleRequest) -> OracleRequest {
        let sizes = self.size_variables();
        if sizes.is_empty() {
            request.with_context("input size: none (constant-size input)")
        } else {
            request.with_context(format!("input size: {}", sizes.join(", ")))
        }
    }

    fn forget_assigned(&mut self, block: &'a Block) {
        for name in block.assigned_variables() {
            self.values.push((name, None));
        }
    }

    pub fn block(&mut self, block: &'a Block) -> Cost {
        let mut acc = Cost::constant();
        for stmt in &block.stmts {
            let cost = self.stmt(stmt);
            acc = acc.then(cost);
        }
        acc
    }

    fn stmt(&mut self, stmt: &'a Stmt) -> Cost {
        match stmt {
            Stmt::Assign(a) => {
                let target = self.expr_cost(&a.target);
                let cost = self.expr_cost(&a.value).plus(&target);
                if let Expr::Var(name) = &a.target {
                    let self_referential = a.value.variables().contains(&name.as_str());
                    let known = (!self_referential && !a.value.contains_call()).then_some(&a.value);
                    self.values.push((name.as_str(), known));
                }
                cost
            }
            Stmt::Call(c) => self.call_cost(&c.callee, &c.args, c.position),
            Stmt::Primitive(p) => match &p.kind {
                PrimitiveKind::Return(value) => {
                    let mut cost = match value {
                        Some(v) => self.expr_cost(v),
                        None => Cost::constant(),
                    };
                    cost.returns = true;
                    cost
                }
                PrimitiveKind::Break => Cost {
                    breaks: true,
                    ..Cost::constant()
                },
            },
            Stmt::If(s) => self.if_cost(s),
            Stmt::For(l) => self.for_cost(l, stmt),
            Stmt::While(l) => self.while_cost(l, stmt),
        }
    }

    fn if_cost(&mut self, s: &'a IfStmt) -> Cost {
        let cond = self.expr_cost(&s.cond);
        let saved = self.values.len();
        let then = self.block(&s.then_block);
        self.values.truncate(saved);
        let other = match &s.else_block {
            Some(b) => {
                let cost = self.block(b);
                self.values.truncate(saved);
                cost
            }
            None => Cost::constant(),
        };
        self.forget_assigned(&s.then_block);
        if let Some(b) = &s.else_block {
            self.forget_assigned(b);
        }

        let upper = CostExpr::max(then.upper.clone(), other.upper.clone());
        let cost = if self.size_only(&s.cond, 0) {
            // Guards on input size are settled once n is large: the best
            // case follows whichever branch large inputs take.
            let ord = match (then.lower.growth(), other.lower.growth()) {
                (Some(a), Some(b)) => a.compare(&b),
                _ => Ordering::Equal,
            };
            let take_then = match ord {
                Ordering::Greater => true,
                Ordering::Less => false,
                Ordering::Equal => !(then.exits() && !other.exits()),
            };
            let chosen = if take_then { then } else { other };
            self.note(
                s.position,
                Rule::Conditional,
                format!(
                    "size guard ({}): best case follows the {} branch",
                    render_expr(&s.cond),
                    if take_then { "then" } else { "else" }
                ),
            );
            Cost {
                upper,
                lower: chosen.lower,
                returns: chosen.returns,
                breaks: chosen.breaks,
            }
        } else {
            if then.upper.upper_class() != other.upper.upper_class()
                || then.lower.lower_class() != other.lower.lower_class()
            {
                self.note(
                    s.position,
                    Rule::Conditional,
                    format!(
                        "branches differ: then {} / {}, else {} / {}",
                        then.upper, then.lower, other.upper, other.lower
                    ),
                );
            }
            Cost {
                upper,
                lower: CostExpr::min(then.lower, other.lower),
                returns: then.returns || other.returns,
                breaks: then.breaks || other.breaks,
            }
        };
        cost.plus(&cond)
    }

    fn for_cost(&mut self, l: &'a ForLoop, stmt: &'a Stmt) -> Cost {
        let mut header = self.expr_cost(&l.start);
        header = header.plus(&self.expr_cost(&l.end));
        let trips = match self.for_trips(l) {
            Ok(trips) => trips,
            Err(issue) => {
                self.note(l.position, Rule::ForLoop, format!("{}: {}", for_header(l), issue));
                let cost = self.irregular(stmt, &l.body, &issue);
                self.forget_assigned(&l.body);
                self.values.push((l.var.as_str(), None));
                return cost.plus(&header);
            }
        };

        let saved = self.values.len();
        self.forget_assigned(&l.body);
        self.loops.push(LoopFrame {
            header: l,
            degree: trips.var_degree,
        });
        let body = self.block(&l.body);
        self.loops.pop();
        self.values.truncate(saved);
        self.forget_assigned(&l.body);
        self.values.push((l.var.as_str(), None));

        self.note(
            l.position,
            Rule::ForLoop,
            format!("{}: {} iterations", for_header(l), trips.count),
        );
        let exits = body.exits();
        let upper = CostExpr::product(trips.count.clone(), body.upper);
        let lower = if exits {
            self.note(l.position, Rule::EarlyExit, "body may leave the loop on its first pass");
            body.lower
        } else {
            CostExpr::product(trips.count, body.lower)
        };
        Cost {
            upper,
            lower,
            returns: body.returns,
            breaks: false,
        }
        .plus(&header)
    }

    fn while_cost(&mut self, l: &'a WhileLoop, stmt: &'a Stmt) -> Cost {
        let cond = self.expr_cost(&l.cond);
        let trips = match self.while_trips(l) {
            Ok(trips) => trips,
            Err(issue) => {
                self.note(l.position, Rule::WhileLoop, format!("({}): {}", render_expr(&l.cond), issue));
                let cost = self.irregular(stmt, &l.body, &issue);
                self.forget_assigned(&l.body);
                return cost.plus(&cond);
            }
        };

        let saved = self.values.len();
        self.forget_assigned(&l.body);
        let body = self.block(&l.body);
        self.values.truncate(saved);
        self.forget_assigned(&l.body);

        self.note(
            l.position,
            Rule::WhileLoop,
            format!("{}: {} iterations", trips.detail, trips.count),
        );
        let pass = body.clone().plus(&cond);
        let upper = CostExpr::sum(CostExpr::product(trips.count.clone(), pass.upper.clone()), cond.upper.clone());
        let lower = if trips.guarded && l.test == LoopTest::PreTest {
            self.note(l.position, Rule::EarlyExit, "another conjunct may end the loop before the first pass");
            cond.lower.clone()
        } else if body.exits() || trips.guarded {
            self.note(l.position, Rule::EarlyExit, "loop may end after its first pass");
            pass.lower
        } else {
            CostExpr::product(trips.count, pass.lower)
        };
        Cost {
            upper,
            lower,
            returns: body.returns,
            breaks: false,
        }
    }

    /// Cost of the calls inside an expression.
    fn expr_cost(&mut self, e: &'a Expr) -> Cost {
        match e {
            Expr::Call { callee, args, position } => self.call_cost(callee, args, *position),
            Expr::Binary { lhs, rhs, .. } | Expr::Index { base: lhs, index: rhs } => {
                let left = self.expr_cost(lhs);
                left.plus(&self.expr_cost(rhs))
            }
            Expr::Unary { operand, .. } | Expr::Length(operand) | Expr::Field { base: operand, .. } => {
                self.expr_cost(operand)
            }
            Expr::Number(_) | Expr::Str(_) | Expr::Bool(_) | Expr::Null | Expr::Var(_) => Cost::constant(),
        }
    }

    fn call_cost(&mut self, callee: &str, args: &'a [Expr], position: Position) -> Cost {
        let mut cost = Cost::constant();
        for arg in args {
            let arg_cost = self.expr_cost(arg);
            cost = cost.plus(&arg_cost);
        }

        let own = if self.group.contains(callee) {
            self.note(position, Rule::Call, format!("call {}: recursive, counted by the recurrence", callee));
            Cost::constant()
        } else if let Some(verdict) = self.scope.verdicts.get(callee) {
            if verdict.is_unknown() {
                self.note(position, Rule::Call, format!("call {}: callee is unresolved", callee));
                self.fail(UnknownCause::CalleeUnresolved(callee.to_string()));
                Cost::unresolved(callee)
            } else {
                self.note(position, Rule::Call, format!("call {}: {}", callee, verdict));
                self.absorb(verdict);
                Cost::of(verdict.upper_cost(), verdict.lower_cost())
            }
        } else if let Some(target) = self.scope.program.procedure(callee) {
            let detail = match target.state {
                VisitState::Visiting => "callee is still being resolved",
                VisitState::Unvisited => "callee has not been resolved yet",
                VisitState::Resolved => "callee has no verdict",
            };
            self.note(position, Rule::Call, format!("call {}: {}", callee, detail));
            self.fail(UnknownCause::CalleeUnresolved(callee.to_string()));
            Cost::unresolved(callee)
        } else {
            self.external_call(callee, args, position)
        };
        cost.plus(&own)
    }

    fn external_call(&mut self, callee: &str, args: &[Expr], position: Position) -> Cost {
        let fp = Fingerprint::of_canonical(&format!("EXTERNAL {} {}", callee, args.len()));
        let rendered: Vec<String> = args.iter().map(render_expr).collect();
        let request = OracleRequest::new(
            fp,
            RequestKind::ExternalCall,
            format!("call {}({})", callee, rendered.join(", ")),
            format!("{} is not defined in the program", callee),
        );
        let request = self.with_size_context(request);
        match self.consult(&request, position) {
            Some(v) => Cost::of(v.upper_cost(), v.lower_cost()),
            None => Cost::unresolved(callee),
        }
    }

    /// Hand a loop the formal rules cannot bound to the oracle.
    fn irregular(&mut self, stmt: &'a Stmt, body: &'a Block, issue: &AnalysisIssue) -> Cost {
        let returns = body.contains_return();
        let calls = stmt.callees();
        if calls.iter().any(|c| self.group.contains(*c)) {
            // The whole call group goes to the oracle instead.
            let mut cost = Cost::unresolved(self.name);
            cost.returns = returns;
            return cost;
        }

        let enclosing: Vec<&ForLoop> = self.loops.iter().map(|f| f.header).collect();
        let fp = {
            let scope = self.scope;
            let name = self.name;
            let group = self.group;
            subtree_fingerprint(self.params, &enclosing, stmt, &|n| scope.callee_ref(n, name, group))
        };
        let mut request = self.with_size_context(OracleRequest::new(
            fp,
            RequestKind::Subtree,
            render_stmt(stmt),
            issue.to_string(),
        ));
        for l in &enclosing {
            request = request.with_context(format!("enclosing loop: {}", for_header(l)));
        }
        for callee in calls {
            if let Some(v) = self.scope.verdicts.get(callee) {
                request = request.with_context(format!("{} is {}", callee, v));
            }
        }

        let mut cost = match self.consult(&request, stmt.position()) {
            Some(v) => Cost::of(v.upper_cost(), v.lower_cost()),
            None => Cost::unresolved("loop"),
        };
        cost.returns = returns;
        cost
    }

    fn consult(&mut self, request: &OracleRequest, position: Position) -> Option<ComplexityVerdict> {
        match self.scope.gateway.classify(self.scope.kb, request) {
            Ok(verdict) => {
                let rule = if verdict.provenance == Provenance::Memoized {
                    Rule::KnowledgeBase
                } else {
                    Rule::Oracle
                };
                self.note(
                    position,
                    rule,
                    format!("{} {}: {}", request.kind.label(), request.fingerprint.short(), verdict),
                );
                self.absorb(&verdict);
                if verdict.is_unknown() {
                    let cause = verdict.cause.clone().unwrap_or_else(|| {
                        UnknownCause::Unclassifiable(format!("oracle could not classify {}", request.kind.label()))
                    });
                    self.fail(cause);
                    return None;
                }
                Some(verdict)
            }
            Err(e) => {
                self.note(
                    position,
                    Rule::Oracle,
                    format!("{} {}: {}", request.kind.label(), request.fingerprint.short(), e),
                );
                self.fail(UnknownCause::OracleFailure(e.to_string()));
                None
            }
        }
    }
}

fn free_variables<'b>(params: &[Param], body: &'b Block) -> HashSet<&'b str> {
    let mut read = Vec::new();
    collect_reads(body, &mut read);
    let assigned: HashSet<&str> = body.assigned_variables().into_iter().collect();
    read.into_iter()
        .filter(|v| !assigned.contains(v) && !params.iter().any(|p| p.name == *v))
        .collect()
}

fn collect_reads<'b>(block: &'b Block, out: &mut Vec<&'b str>) {
    for stmt in &block.stmts {
        match stmt {
            Stmt::For(l) => {
                out.extend(l.start.variables());
                out.extend(l.end.variables());
                if let Some(step) = &l.step {
                    out.extend(step.variables());
                }
                collect_reads(&l.body, out);
            }
            Stmt::While(l) => {
                out.extend(l.cond.variables());
                collect_reads(&l.body, out);
            }
            Stmt::If(s) => {
                out.extend(s.cond.variables());
                collect_reads(&s.then_block, out);
                if let Some(b) = &s.else_block {
                    collect_reads(b, out);
                }
            }
            Stmt::Assign(a) => {
                out.extend(a.target.variables());
                out.extend(a.value.variables());
            }
            Stmt::Call(c) => {
                for arg in &c.args {
                    out.extend(arg.variables());
                }
            }
            Stmt::Primitive(p) => {
                if let PrimitiveKind::Return(Some(e)) = &p.kind {
                    out.extend(e.variables());
                }
            }
        }
    }
}
