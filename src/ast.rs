//! Program representation for the pseudocode language
//!
//! The [`Program`] root owns every procedure and statement. Calls never own
//! their target: they carry the callee's name, resolved through the
//! program's [`ProgramTable`]. The call graph may therefore be cyclic
//! (direct or mutual recursion) while ownership stays a tree.

use crate::complexity::ComplexityVerdict;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Index of a procedure inside its program's arena.
pub type ProcId = usize;

/// 1-based source position, kept for diagnostics and traces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Name → procedure lookup for one program.
#[derive(Debug, Clone, Default)]
pub struct ProgramTable {
    index: HashMap<String, ProcId>,
}

impl ProgramTable {
    /// Build the table. Returns the first duplicated name on conflict.
    pub fn build(procedures: &[Procedure]) -> Result<Self, String> {
        let mut index = HashMap::with_capacity(procedures.len());
        for (id, proc) in procedures.iter().enumerate() {
            if index.insert(proc.name.clone(), id).is_some() {
                return Err(proc.name.clone());
            }
        }
        Ok(Self { index })
    }

    pub fn get(&self, name: &str) -> Option<ProcId> {
        self.index.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

/// A parsed pseudocode program.
#[derive(Debug, Clone)]
pub struct Program {
    pub name: String,
    pub procedures: Vec<Procedure>,
    /// Optional top-level `begin ... end` block.
    pub main: Option<Block>,
    table: ProgramTable,
}

impl Program {
    /// Assemble a program, rejecting duplicated procedure names.
    pub fn new(
        name: impl Into<String>,
        procedures: Vec<Procedure>,
        main: Option<Block>,
    ) -> Result<Self, String> {
        let table = ProgramTable::build(&procedures)?;
        Ok(Self {
            name: name.into(),
            procedures,
            main,
            table,
        })
    }

    pub fn table(&self) -> &ProgramTable {
        &self.table
    }

    pub fn procedure(&self, name: &str) -> Option<&Procedure> {
        self.table.get(name).map(|id| &self.procedures[id])
    }
}

/// Resolution status of a procedure during one engine run: `Visiting`
/// while its call group is being resolved, `Resolved` once its verdict is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VisitState {
    #[default]
    Unvisited,
    Visiting,
    Resolved,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParamKind {
    Scalar,
    /// `A[1]..[n]`; the dimension expressions are kept verbatim.
    Array { dims: Vec<Expr> },
    /// `Clase T obj`
    Object { class: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub kind: ParamKind,
}

impl Param {
    pub fn scalar(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ParamKind::Scalar,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Procedure {
    pub name: String,
    pub params: Vec<Param>,
    pub body: Block,
    pub position: Position,
    /// Filled once the engine resolves this procedure.
    pub verdict: Option<ComplexityVerdict>,
    pub state: VisitState,
}

impl Procedure {
    pub fn new(name: impl Into<String>, params: Vec<Param>, body: Block, position: Position) -> Self {
        Self {
            name: name.into(),
            params,
            body,
            position,
            verdict: None,
            state: VisitState::Unvisited,
        }
    }

    /// Names of every procedure called from the body, in source order.
    pub fn callees(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.body.collect_calls(&mut out);
        out
    }

    pub fn param_index(&self, name: &str) -> Option<usize> {
        self.params.iter().position(|p| p.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub position: Position,
}

impl Block {
    pub fn new(stmts: Vec<Stmt>, position: Position) -> Self {
        Self { stmts, position }
    }

    pub fn is_empty(&self) -> bool {
        self.stmts.is_empty()
    }

    fn collect_calls<'a>(&'a self, out: &mut Vec<&'a str>) {
        for stmt in &self.stmts {
            stmt.collect_calls(out);
        }
    }

    /// Variables assigned anywhere inside this block (nested blocks included).
    pub fn assigned_variables(&self) -> Vec<&str> {
        let mut out = Vec::new();
        for stmt in &self.stmts {
            stmt.collect_assigned(&mut out);
        }
        out
    }

    /// True if a `return` appears anywhere inside.
    pub fn contains_return(&self) -> bool {
        self.stmts.iter().any(Stmt::contains_return)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    For(ForLoop),
    While(WhileLoop),
    If(IfStmt),
    Assign(Assignment),
    Call(Call),
    Primitive(Primitive),
}

impl Stmt {
    pub fn position(&self) -> Position {
        match self {
            Stmt::For(s) => s.position,
            Stmt::While(s) => s.position,
            Stmt::If(s) => s.position,
            Stmt::Assign(s) => s.position,
            Stmt::Call(s) => s.position,
            Stmt::Primitive(s) => s.position,
        }
    }

    /// Names of every procedure called inside this statement.
    pub fn callees(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_calls(&mut out);
        out
    }

    fn collect_calls<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Stmt::For(l) => {
                l.start.collect_calls(out);
                l.end.collect_calls(out);
                if let Some(step) = &l.step {
                    step.collect_calls(out);
                }
                l.body.collect_calls(out);
            }
            Stmt::While(l) => {
                l.cond.collect_calls(out);
                l.body.collect_calls(out);
            }
            Stmt::If(s) => {
                s.cond.collect_calls(out);
                s.then_block.collect_calls(out);
                if let Some(b) = &s.else_block {
                    b.collect_calls(out);
                }
            }
            Stmt::Assign(a) => {
                a.target.collect_calls(out);
                a.value.collect_calls(out);
            }
            Stmt::Call(c) => {
                out.push(c.callee.as_str());
                for arg in &c.args {
                    arg.collect_calls(out);
                }
            }
            Stmt::Primitive(p) => {
                if let PrimitiveKind::Return(Some(e)) = &p.kind {
                    e.collect_calls(out);
                }
            }
        }
    }

    fn collect_assigned<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Stmt::For(l) => {
                out.push(l.var.as_str());
                for s in &l.body.stmts {
                    s.collect_assigned(out);
                }
            }
            Stmt::While(l) => {
                for s in &l.body.stmts {
                    s.collect_assigned(out);
                }
            }
            Stmt::If(s) => {
                for st in &s.then_block.stmts {
                    st.collect_assigned(out);
                }
                if let Some(b) = &s.else_block {
                    for st in &b.stmts {
                        st.collect_assigned(out);
                    }
                }
            }
            Stmt::Assign(a) => {
                if let Some(name) = a.target.root_variable() {
                    out.push(name);
                }
            }
            Stmt::Call(_) | Stmt::Primitive(_) => {}
        }
    }

    fn contains_return(&self) -> bool {
        match self {
            Stmt::For(l) => l.body.contains_return(),
            Stmt::While(l) => l.body.contains_return(),
            Stmt::If(s) => {
                s.then_block.contains_return()
                    || s.else_block.as_ref().is_some_and(Block::contains_return)
            }
            Stmt::Primitive(p) => matches!(p.kind, PrimitiveKind::Return(_)),
            Stmt::Assign(_) | Stmt::Call(_) => false,
        }
    }
}

/// `for v 🡨 start to|downto end [step s] do begin ... end`
#[derive(Debug, Clone, PartialEq)]
pub struct ForLoop {
    pub var: String,
    pub start: Expr,
    pub end: Expr,
    pub step: Option<Expr>,
    pub descending: bool,
    pub body: Block,
    pub position: Position,
}

/// Whether the condition is checked before (`while`) or after (`repeat ... until`) the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopTest {
    PreTest,
    PostTest,
}

/// `while (cond) do begin ... end` and `repeat ... until (cond)`.
///
/// For `PostTest` loops `cond` is the *exit* condition.
#[derive(Debug, Clone, PartialEq)]
pub struct WhileLoop {
    pub cond: Expr,
    pub body: Block,
    pub test: LoopTest,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfStmt {
    pub cond: Expr,
    pub then_block: Block,
    pub else_block: Option<Block>,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub target: Expr,
    pub value: Expr,
    pub position: Position,
}

/// `call name(args)`
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub callee: String,
    pub args: Vec<Expr>,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PrimitiveKind {
    Return(Option<Expr>),
    /// Leaves the innermost loop.
    Break,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Primitive {
    pub kind: PrimitiveKind,
    pub position: Position,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    IntDiv,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::IntDiv => "div",
            BinOp::Mod => "mod",
            BinOp::Eq => "=",
            BinOp::Ne => "<>",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::And => "and",
            BinOp::Or => "or",
        }
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnOp {
    Neg,
    Not,
    Ceil,
    Floor,
}

impl UnOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnOp::Neg => "-",
            UnOp::Not => "not",
            UnOp::Ceil => "ceil",
            UnOp::Floor => "floor",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Str(String),
    Bool(bool),
    Null,
    Var(String),
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary {
        op: UnOp,
        operand: Box<Expr>,
    },
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
    },
    Field {
        base: Box<Expr>,
        field: String,
    },
    Length(Box<Expr>),
    /// Function-style call inside an expression, e.g. `fib(n - 1)`.
    Call {
        callee: String,
        args: Vec<Expr>,
        position: Position,
    },
}

impl Expr {
    pub fn var(name: impl Into<String>) -> Self {
        Expr::Var(name.into())
    }

    pub fn num(value: f64) -> Self {
        Expr::Number(value)
    }

    pub fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    /// Constant numeric value, when the expression is a literal.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Expr::Number(v) => Some(*v),
            Expr::Unary {
                op: UnOp::Neg,
                operand,
            } => operand.as_number().map(|v| -v),
            _ => None,
        }
    }

    /// The variable an lvalue ultimately writes to (`A[i].f` → `A`).
    pub fn root_variable(&self) -> Option<&str> {
        match self {
            Expr::Var(name) => Some(name),
            Expr::Index { base, .. } | Expr::Field { base, .. } => base.root_variable(),
            _ => None,
        }
    }

    /// Every variable name read by this expression.
    pub fn variables(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_variables(&mut out);
        out
    }

    fn collect_variables<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Var(name) => out.push(name),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect_variables(out);
                rhs.collect_variables(out);
            }
            Expr::Unary { operand, .. } | Expr::Length(operand) => operand.collect_variables(out),
            Expr::Index { base, index } => {
                base.collect_variables(out);
                index.collect_variables(out);
            }
            Expr::Field { base, .. } => base.collect_variables(out),
            Expr::Call { args, .. } => {
                for arg in args {
                    arg.collect_variables(out);
                }
            }
            Expr::Number(_) | Expr::Str(_) | Expr::Bool(_) | Expr::Null => {}
        }
    }

    fn collect_calls<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expr::Call { callee, args, .. } => {
                out.push(callee.as_str());
                for arg in args {
                    arg.collect_calls(out);
                }
            }
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect_calls(out);
                rhs.collect_calls(out);
            }
            Expr::Unary { operand, .. } | Expr::Length(operand) => operand.collect_calls(out),
            Expr::Index { base, index } => {
                base.collect_calls(out);
                index.collect_calls(out);
            }
            Expr::Field { base, .. } => base.collect_calls(out),
            Expr::Number(_) | Expr::Str(_) | Expr::Bool(_) | Expr::Null | Expr::Var(_) => {}
        }
    }

    pub fn contains_call(&self) -> bool {
        let mut out = Vec::new();
        self.collect_calls(&mut out);
        !out.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call_stmt(callee: &str) -> Stmt {
        Stmt::Call(Call {
            callee: callee.to_string(),
            args: vec![Expr::var("n")],
            position: Position::default(),
        })
    }

    #[test]
    fn test_program_table_lookup() {
        let procs = vec![
            Procedure::new("a", vec![], Block::default(), Position::new(1, 1)),
            Procedure::new("b", vec![], Block::default(), Position::new(5, 1)),
        ];
        let program = Program::new("p", procs, None).unwrap();
        assert_eq!(program.table().get("b"), Some(1));
        assert!(program.procedure("missing").is_none());
        assert_eq!(program.table().len(), 2);
    }

    #[test]
    fn test_duplicate_procedure_rejected() {
        let procs = vec![
            Procedure::new("a", vec![], Block::default(), Position::new(1, 1)),
            Procedure::new("a", vec![], Block::default(), Position::new(5, 1)),
        ];
        assert_eq!(Program::new("p", procs, None).unwrap_err(), "a");
    }

    #[test]
    fn test_callees_include_expression_calls() {
        let body = Block::new(
            vec![
                call_stmt("helper"),
                Stmt::Primitive(Primitive {
                    kind: PrimitiveKind::Return(Some(Expr::Call {
                        callee: "fib".into(),
                        args: vec![],
                        position: Position::default(),
                    })),
                    position: Position::default(),
                }),
            ],
            Position::default(),
        );
        let proc = Procedure::new("fib", vec![Param::scalar("n")], body, Position::default());
        assert_eq!(proc.callees(), vec!["helper", "fib"]);
        assert!(proc.body.contains_return());
        assert_eq!(proc.state, VisitState::Unvisited);
    }

    #[test]
    fn test_root_variable_and_variables() {
        let target = Expr::Index {
            base: Box::new(Expr::var("A")),
            index: Box::new(Expr::binary(BinOp::Add, Expr::var("i"), Expr::num(1.0))),
        };
        assert_eq!(target.root_variable(), Some("A"));
        assert_eq!(target.variables(), vec!["A", "i"]);
        assert_eq!(Expr::Unary { op: UnOp::Neg, operand: Box::new(Expr::num(3.0)) }.as_number(), Some(-3.0));
    }
}
