//! Outbound oracle requests: canonical plain-text descriptions and the prompt

use crate::ast::{Block, Expr, ForLoop, LoopTest, Param, ParamKind, PrimitiveKind, Procedure, Stmt, UnOp};
use crate::complexity::GrowthClass;
use crate::fingerprint::Fingerprint;
use std::fmt::Write;

/// What kind of structure the oracle is asked about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// A loop whose trip count the formal rules could not determine.
    Subtree,
    /// A whole recursive call group.
    CallGroup,
    /// A call to a procedure that is not defined in the program.
    ExternalCall,
}

impl RequestKind {
    pub fn label(self) -> &'static str {
        match self {
            RequestKind::Subtree => "subtree",
            RequestKind::CallGroup => "call group",
            RequestKind::ExternalCall => "external call",
        }
    }
}

/// A structurally ambiguous piece of a program, ready to send.
#[derive(Debug, Clone)]
pub struct OracleRequest {
    pub fingerprint: Fingerprint,
    pub kind: RequestKind,
    /// Pseudocode of the ambiguous structure.
    pub description: String,
    /// Input-size variables, enclosing loops and known callee bounds.
    pub context: Vec<String>,
    /// Why the formal rules gave up.
    pub reason: String,
}

impl OracleRequest {
    pub fn new(fingerprint: Fingerprint, kind: RequestKind, description: String, reason: impl Into<String>) -> Self {
        Self {
            fingerprint,
            kind,
            description,
            context: Vec::new(),
            reason: reason.into(),
        }
    }

    pub fn with_context(mut self, line: impl Into<String>) -> Self {
        self.context.push(line.into());
        self
    }

    pub fn system_prompt() -> &'static str {
        "You are an expert in algorithmic complexity analysis. You classify the \
         asymptotic running time of pseudocode fragments as a function of the input \
         size n. You answer with a single JSON object and nothing else."
    }

    /// User prompt: description, context and the strict response schema.
    pub fn prompt(&self) -> String {
        let vocabulary: Vec<&str> = GrowthClass::ORDERED
            .iter()
            .map(|c| c.token())
            .chain(std::iter::once(GrowthClass::Unknown.token()))
            .collect();
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Classify the time complexity of this {} ({}).",
            self.kind.label(),
            self.reason
        );
        if !self.context.is_empty() {
            out.push_str("\nCONTEXT:\n");
            for line in &self.context {
                let _ = writeln!(out, "- {}", line);
            }
        }
        out.push_str("\nPSEUDOCODE:\n```\n");
        out.push_str(&self.description);
        if !self.description.ends_with('\n') {
            out.push('\n');
        }
        out.push_str("```\n\n");
        let _ = writeln!(
            out,
            "Reply with exactly one JSON object with keys \"O\" (worst case), \"Omega\" (best case), \
             \"Theta\" (tight bound, or \"none\" when best and worst case differ) and \"confidence\" \
             (a number in (0, 1]). Each bound must be one of: {}.",
            vocabulary
                .iter()
                .map(|t| format!("\"{}\"", t))
                .collect::<Vec<_>>()
                .join(", ")
        );
        out.push_str("Example: {\"O\": \"n^2\", \"Omega\": \"n\", \"Theta\": \"none\", \"confidence\": 0.8}\n");
        out
    }
}

/// Pseudocode rendering in the input language's own surface syntax.
pub struct Renderer {
    out: String,
    indent: usize,
}

impl Renderer {
    pub fn new() -> Self {
        Self {
            out: String::new(),
            indent: 0,
        }
    }

    pub fn finish(self) -> String {
        self.out
    }

    fn line(&mut self, text: &str) {
        for _ in 0..self.indent {
            self.out.push_str("    ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    pub fn procedure(&mut self, proc: &Procedure) {
        let params: Vec<String> = proc.params.iter().map(param).collect();
        self.line(&format!("{}({})", proc.name, params.join(", ")));
        self.block(&proc.body);
    }

    pub fn block(&mut self, block: &Block) {
        self.line("begin");
        self.indent += 1;
        for stmt in &block.stmts {
            self.stmt(stmt);
        }
        self.indent -= 1;
        self.line("end");
    }

    pub fn stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::For(l) => {
                self.line(&for_header(l));
                self.block(&l.body);
            }
            Stmt::While(l) => match l.test {
                LoopTest::PreTest => {
                    self.line(&format!("while ({}) do", expr(&l.cond)));
                    self.block(&l.body);
                }
                LoopTest::PostTest => {
                    self.line("repeat");
                    self.indent += 1;
                    for s in &l.body.stmts {
                        self.stmt(s);
                    }
                    self.indent -= 1;
                    self.line(&format!("until ({})", expr(&l.cond)));
                }
            },
            Stmt::If(s) => {
                self.line(&format!("if ({}) then", expr(&s.cond)));
                self.block(&s.then_block);
                if let Some(b) = &s.else_block {
                    self.line("else");
                    self.block(b);
                }
            }
            Stmt::Assign(a) => self.line(&format!("{} <- {}", expr(&a.target), expr(&a.value))),
            Stmt::Call(c) => {
                let args: Vec<String> = c.args.iter().map(expr).collect();
                self.line(&format!("call {}({})", c.callee, args.join(", ")));
            }
            Stmt::Primitive(p) => match &p.kind {
                PrimitiveKind::Return(Some(v)) => self.line(&format!("return {}", expr(v))),
                PrimitiveKind::Return(None) => self.line("return"),
                PrimitiveKind::Break => self.line("break"),
            },
        }
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

pub fn render_procedure(proc: &Procedure) -> String {
    let mut r = Renderer::new();
    r.procedure(proc);
    r.finish()
}

pub fn render_stmt(stmt: &Stmt) -> String {
    let mut r = Renderer::new();
    r.stmt(stmt);
    r.finish()
}

pub fn render_block(block: &Block) -> String {
    let mut r = Renderer::new();
    r.block(block);
    r.finish()
}

pub fn param(p: &Param) -> String {
    match &p.kind {
        ParamKind::Scalar => p.name.clone(),
        ParamKind::Array { dims } => {
            let dims: Vec<String> = dims.iter().map(|d| format!("[{}]", expr(d))).collect();
            format!("{}[1]..{}", p.name, dims.join(""))
        }
        ParamKind::Object { class } => format!("Clase {} {}", class, p.name),
    }
}

pub fn for_header(l: &ForLoop) -> String {
    let dir = if l.descending { "downto" } else { "to" };
    match &l.step {
        Some(step) => format!(
            "for {} <- {} {} {} step {} do",
            l.var,
            expr(&l.start),
            dir,
            expr(&l.end),
            expr(step)
        ),
        None => format!("for {} <- {} {} {} do", l.var, expr(&l.start), dir, expr(&l.end)),
    }
}

pub fn expr(e: &Expr) -> String {
    match e {
        Expr::Number(v) => {
            if v.fract() == 0.0 && v.abs() < 1e15 {
                format!("{}", *v as i64)
            } else {
                format!("{}", v)
            }
        }
        Expr::Str(s) => format!("\"{}\"", s),
        Expr::Bool(b) => b.to_string(),
        Expr::Null => "null".to_string(),
        Expr::Var(name) => name.clone(),
        Expr::Binary { op, lhs, rhs } => format!("({} {} {})", expr(lhs), op.symbol(), expr(rhs)),
        Expr::Unary { op: UnOp::Ceil, operand } => format!("┌{}┐", expr(operand)),
        Expr::Unary { op: UnOp::Floor, operand } => format!("└{}┘", expr(operand)),
        Expr::Unary { op: UnOp::Not, operand } => format!("not {}", expr(operand)),
        Expr::Unary { op: UnOp::Neg, operand } => format!("-{}", expr(operand)),
        Expr::Index { base, index } => format!("{}[{}]", expr(base), expr(index)),
        Expr::Field { base, field } => format!("{}.{}", expr(base), field),
        Expr::Length(inner) => format!("length({})", expr(inner)),
        Expr::Call { callee, args, .. } => {
            let args: Vec<String> = args.iter().map(expr).collect();
            format!("{}({})", callee, args.join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{BinOp, Position, WhileLoop};

    fn halving_loop() -> Stmt {
        Stmt::While(WhileLoop {
            cond: Expr::binary(BinOp::Gt, Expr::var("i"), Expr::num(1.0)),
            body: Block::new(
                vec![Stmt::Assign(crate::ast::Assignment {
                    target: Expr::var("i"),
                    value: Expr::binary(BinOp::IntDiv, Expr::var("i"), Expr::num(3.0)),
                    position: Position::default(),
                })],
                Position::default(),
            ),
            test: LoopTest::PreTest,
            position: Position::default(),
        })
    }

    #[test]
    fn test_render_while() {
        let text = render_stmt(&halving_loop());
        assert!(text.starts_with("while ((i > 1)) do\nbegin\n"));
        assert!(text.contains("    i <- (i div 3)\n"));
        assert!(text.ends_with("end\n"));
    }

    #[test]
    fn test_prompt_lists_vocabulary_and_schema() {
        let req = OracleRequest::new(
            Fingerprint::of_canonical("x"),
            RequestKind::Subtree,
            render_stmt(&halving_loop()),
            "loop update is not a recognised pattern",
        )
        .with_context("size variables: n");
        let prompt = req.prompt();
        assert!(prompt.contains("\"n log n\""));
        assert!(prompt.contains("\"unknown\""));
        assert!(prompt.contains("\"Omega\""));
        assert!(prompt.contains("- size variables: n"));
        assert!(prompt.contains("while ((i > 1)) do"));
    }

    #[test]
    fn test_render_params() {
        let p = Param {
            name: "A".into(),
            kind: ParamKind::Array {
                dims: vec![Expr::var("n")],
            },
        };
        assert_eq!(param(&p), "A[1]..[n]");
        assert_eq!(expr(&Expr::num(2.0)), "2");
        assert_eq!(expr(&Expr::num(0.5)), "0.5");
    }
}
