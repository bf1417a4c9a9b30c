//! Structural fingerprints
//!
//! A fingerprint is the SHA-256 of a canonical token stream for a piece of
//! AST. Identifiers are replaced by `VAR_N` in order of first appearance,
//! string literals collapse to `STR_LIT`, while keywords, operators and
//! numeric literals are kept. Two procedures that differ only by
//! renaming therefore share a fingerprint.
//!
//! Calls are encoded by what the callee *is*, not by its name:
//! a resolved callee contributes its own fingerprint, a member of the
//! same call group contributes a `SELF`/`MUTUAL` marker and an
//! undefined callee contributes `EXTERN` with its name and arity, since
//! nothing but the name tells two undefined routines apart.

use crate::ast::{Block, Expr, ForLoop, LoopTest, Param, ParamKind, PrimitiveKind, Procedure, Stmt};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;

/// Hex-encoded SHA-256 of a canonical serialization.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn of_canonical(canonical: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        Fingerprint(format!("{:x}", hasher.finalize()))
    }

    /// Wrap a key read back from storage.
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Fingerprint(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex digits, for logs and reports.
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }

    /// Fingerprint of a call group: hash of its sorted member fingerprints.
    pub fn of_group(members: &[Fingerprint]) -> Self {
        let mut sorted: Vec<&str> = members.iter().map(Fingerprint::as_str).collect();
        sorted.sort_unstable();
        Fingerprint::of_canonical(&format!("GROUP {}", sorted.join(" ")))
    }

    /// Key of one member inside a multi-procedure call group.
    pub fn in_group(&self, group: &Fingerprint) -> Self {
        Fingerprint::of_canonical(&format!("MEMBER {} OF {}", self.0, group.0))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a call target is encoded in a canonical stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalleeRef {
    /// Direct recursion.
    Recursive,
    /// Another member of the caller's call group.
    Mutual,
    /// Already-resolved procedure.
    Resolved(Fingerprint),
    /// Not defined in the program.
    External,
}

/// Builds canonical token streams. One instance numbers identifiers
/// consistently across everything written into it.
pub struct Canonicalizer<'r> {
    names: HashMap<String, usize>,
    fields: HashMap<String, usize>,
    tokens: Vec<String>,
    resolve: &'r dyn Fn(&str) -> CalleeRef,
}

impl<'r> Canonicalizer<'r> {
    pub fn new(resolve: &'r dyn Fn(&str) -> CalleeRef) -> Self {
        Self {
            names: HashMap::new(),
            fields: HashMap::new(),
            tokens: Vec::new(),
            resolve,
        }
    }

    pub fn finish(self) -> String {
        self.tokens.join(" ")
    }

    pub fn fingerprint(self) -> Fingerprint {
        Fingerprint::of_canonical(&self.finish())
    }

    fn push(&mut self, token: impl Into<String>) {
        self.tokens.push(token.into());
    }

    fn ident(&mut self, name: &str) {
        let next = self.names.len();
        let id = *self.names.entry(name.to_string()).or_insert(next);
        self.tokens.push(format!("VAR_{}", id));
    }

    fn field(&mut self, name: &str) {
        let next = self.fields.len();
        let id = *self.fields.entry(name.to_string()).or_insert(next);
        self.tokens.push(format!("FIELD_{}", id));
    }

    fn callee(&mut self, name: &str, arity: usize) {
        match (self.resolve)(name) {
            CalleeRef::Recursive => self.push("SELF"),
            CalleeRef::Mutual => self.push("MUTUAL"),
            CalleeRef::Resolved(fp) => self.push(format!("CALL<{}>", fp)),
            CalleeRef::External => self.push(format!("EXTERN<{}>/{}", name, arity)),
        }
    }

    pub fn params(&mut self, params: &[Param]) {
        self.push("PARAMS");
        for p in params {
            match &p.kind {
                ParamKind::Scalar => self.push("SCALAR"),
                ParamKind::Array { dims } => {
                    self.push(format!("ARRAY/{}", dims.len()));
                }
                ParamKind::Object { .. } => self.push("OBJECT"),
            }
            self.ident(&p.name);
        }
        self.push(";");
    }

    /// Loop header only, used to give subtree fingerprints their context.
    pub fn for_header(&mut self, l: &ForLoop) {
        self.push(if l.descending { "FOR_DOWN" } else { "FOR" });
        self.ident(&l.var);
        self.expr(&l.start);
        self.expr(&l.end);
        if let Some(step) = &l.step {
            self.push("STEP");
            self.expr(step);
        }
    }

    pub fn block(&mut self, block: &Block) {
        self.push("{");
        for stmt in &block.stmts {
            self.stmt(stmt);
        }
        self.push("}");
    }

    pub fn stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::For(l) => {
                self.for_header(l);
                self.block(&l.body);
            }
            Stmt::While(l) => {
                match l.test {
                    LoopTest::PreTest => self.push("WHILE"),
                    LoopTest::PostTest => self.push("REPEAT"),
                }
                self.expr(&l.cond);
                self.block(&l.body);
            }
            Stmt::If(s) => {
                self.push("IF");
                self.expr(&s.cond);
                self.block(&s.then_block);
                if let Some(b) = &s.else_block {
                    self.push("ELSE");
                    self.block(b);
                }
            }
            Stmt::Assign(a) => {
                self.push("SET");
                self.expr(&a.target);
                self.expr(&a.value);
            }
            Stmt::Call(c) => {
                self.push("CALL");
                self.callee(&c.callee, c.args.len());
                for arg in &c.args {
                    self.expr(arg);
                }
                self.push(";");
            }
            Stmt::Primitive(p) => match &p.kind {
                PrimitiveKind::Return(value) => {
                    self.push("RETURN");
                    if let Some(v) = value {
                        self.expr(v);
                    }
                    self.push(";");
                }
                PrimitiveKind::Break => self.push("BREAK"),
            },
        }
    }

    pub fn expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Number(v) => self.push(format!("{}", v)),
            Expr::Str(_) => self.push("STR_LIT"),
            Expr::Bool(b) => self.push(if *b { "TRUE" } else { "FALSE" }),
            Expr::Null => self.push("NULL"),
            Expr::Var(name) => self.ident(name),
            Expr::Binary { op, lhs, rhs } => {
                self.push("(");
                self.push(op.symbol());
                self.expr(lhs);
                self.expr(rhs);
                self.push(")");
            }
            Expr::Unary { op, operand } => {
                self.push("(");
                self.push(op.symbol());
                self.expr(operand);
                self.push(")");
            }
            Expr::Index { base, index } => {
                self.push("[");
                self.expr(base);
                self.expr(index);
                self.push("]");
            }
            Expr::Field { base, field } => {
                self.push(".");
                self.expr(base);
                self.field(field);
            }
            Expr::Length(inner) => {
                self.push("LENGTH");
                self.expr(inner);
            }
            Expr::Call { callee, args, .. } => {
                self.push("FCALL");
                self.callee(callee, args.len());
                for arg in args {
                    self.expr(arg);
                }
                self.push(";");
            }
        }
    }
}

/// Canonical text of a whole procedure (its name is never part of it).
pub fn canonical_procedure(proc: &Procedure, resolve: &dyn Fn(&str) -> CalleeRef) -> String {
    let mut c = Canonicalizer::new(resolve);
    c.push("PROC");
    c.params(&proc.params);
    c.block(&proc.body);
    c.finish()
}

pub fn procedure_fingerprint(proc: &Procedure, resolve: &dyn Fn(&str) -> CalleeRef) -> Fingerprint {
    Fingerprint::of_canonical(&canonical_procedure(proc, resolve))
}

/// Fingerprint of a top-level block analysed without parameters.
pub fn block_fingerprint(block: &Block, resolve: &dyn Fn(&str) -> CalleeRef) -> Fingerprint {
    let mut c = Canonicalizer::new(resolve);
    c.push("MAIN");
    c.block(block);
    c.fingerprint()
}

/// Fingerprint of a statement in context: the procedure's parameters and
/// the headers of the `for` loops enclosing it.
pub fn subtree_fingerprint(
    params: &[Param],
    enclosing: &[&ForLoop],
    stmt: &Stmt,
    resolve: &dyn Fn(&str) -> CalleeRef,
) -> Fingerprint {
    let mut c = Canonicalizer::new(resolve);
    c.push("SUBTREE");
    c.params(params);
    for l in enclosing {
        c.for_header(l);
    }
    c.push("AT");
    c.stmt(stmt);
    c.fingerprint()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Assignment, BinOp, Position};

    fn no_calls(_: &str) -> CalleeRef {
        CalleeRef::External
    }

    fn linear_sum(arr: &str, n: &str, i: &str, acc: &str) -> Procedure {
        let body = Block::new(
            vec![Stmt::For(ForLoop {
                var: i.into(),
                start: Expr::num(1.0),
                end: Expr::var(n),
                step: None,
                descending: false,
                body: Block::new(
                    vec![Stmt::Assign(Assignment {
                        target: Expr::var(acc),
                        value: Expr::binary(
                            BinOp::Add,
                            Expr::var(acc),
                            Expr::Index {
                                base: Box::new(Expr::var(arr)),
                                index: Box::new(Expr::var(i)),
                            },
                        ),
                        position: Position::default(),
                    })],
                    Position::default(),
                ),
                position: Position::default(),
            })],
            Position::default(),
        );
        Procedure::new(
            "sum",
            vec![Param::scalar(arr), Param::scalar(n)],
            body,
            Position::default(),
        )
    }

    #[test]
    fn test_renaming_preserves_fingerprint() {
        let a = linear_sum("A", "n", "i", "s");
        let mut b = linear_sum("xs", "len", "k", "total");
        b.name = "totally_different".into();
        assert_eq!(
            procedure_fingerprint(&a, &no_calls),
            procedure_fingerprint(&b, &no_calls)
        );
    }

    #[test]
    fn test_structure_changes_fingerprint() {
        let a = linear_sum("A", "n", "i", "s");
        let mut b = a.clone();
        if let Stmt::For(l) = &mut b.body.stmts[0] {
            l.start = Expr::num(2.0);
        }
        assert_ne!(
            procedure_fingerprint(&a, &no_calls),
            procedure_fingerprint(&b, &no_calls)
        );
    }

    #[test]
    fn test_variable_roles_matter() {
        // `s + A[i]` vs `s + A[s]` must not collide even though the name sets match.
        let a = linear_sum("A", "n", "i", "s");
        let mut b = a.clone();
        if let Stmt::For(l) = &mut b.body.stmts[0] {
            if let Stmt::Assign(asg) = &mut l.body.stmts[0] {
                asg.value = Expr::binary(
                    BinOp::Add,
                    Expr::var("s"),
                    Expr::Index {
                        base: Box::new(Expr::var("A")),
                        index: Box::new(Expr::var("s")),
                    },
                );
            }
        }
        assert_ne!(
            canonical_procedure(&a, &no_calls),
            canonical_procedure(&b, &no_calls)
        );
    }

    #[test]
    fn test_callee_identity_is_structural() {
        let call = |callee: &str| {
            Procedure::new(
                "p",
                vec![Param::scalar("n")],
                Block::new(
                    vec![Stmt::Call(crate::ast::Call {
                        callee: callee.into(),
                        args: vec![Expr::var("n")],
                        position: Position::default(),
                    })],
                    Position::default(),
                ),
                Position::default(),
            )
        };
        let fp = Fingerprint::of_canonical("callee");
        let resolved = move |_: &str| CalleeRef::Resolved(fp.clone());
        assert_eq!(
            procedure_fingerprint(&call("helper"), &resolved),
            procedure_fingerprint(&call("other_name"), &resolved)
        );
        assert_ne!(
            procedure_fingerprint(&call("helper"), &resolved),
            procedure_fingerprint(&call("helper"), &|_: &str| CalleeRef::Recursive)
        );
    }

    #[test]
    fn test_undefined_callees_are_told_apart_by_name() {
        let wrap = |callee: &str| {
            Procedure::new(
                "wrap",
                vec![Param::scalar("n")],
                Block::new(
                    vec![Stmt::Call(crate::ast::Call {
                        callee: callee.into(),
                        args: vec![Expr::var("n")],
                        position: Position::default(),
                    })],
                    Position::default(),
                ),
                Position::default(),
            )
        };
        assert_ne!(
            procedure_fingerprint(&wrap("shuffle"), &no_calls),
            procedure_fingerprint(&wrap("bubblesort"), &no_calls)
        );
        assert!(canonical_procedure(&wrap("shuffle"), &no_calls).contains("EXTERN<shuffle>/1"));
    }

    #[test]
    fn test_group_fingerprint_is_order_independent() {
        let a = Fingerprint::of_canonical("a");
        let b = Fingerprint::of_canonical("b");
        assert_eq!(
            Fingerprint::of_group(&[a.clone(), b.clone()]),
            Fingerprint::of_group(&[b.clone(), a.clone()])
        );
        let g = Fingerprint::of_group(&[a.clone(), b]);
        assert_ne!(a.in_group(&g), a);
        assert_eq!(a.short().len(), 12);
        assert_eq!(a.as_str().len(), 64);
    }
}
