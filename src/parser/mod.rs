//! Pseudocode front end
//!
//! Recursive-descent parser over the [`lexer`] token stream. Either the
//! whole file becomes a [`Program`] or parsing fails with a
//! [`ParseFailure`]; no partial tree is ever returned.
//!
//! ```text
//! Clase Node { value next }
//!
//! busqueda(A[1]..[n], x)
//! begin
//!     for i 🡨 1 to n do
//!     begin
//!         if (A[i] = x) then
//!         begin
//!             return i
//!         end
//!     end
//!     return 0
//! end
//! ```

pub mod lexer;

use crate::ast::{
    Assignment, BinOp, Block, Call, Expr, ForLoop, IfStmt, LoopTest, Param, ParamKind, Position, Primitive,
    PrimitiveKind, Procedure, Program, Stmt, UnOp, WhileLoop,
};
use crate::error::{AsymptoteError, ParseFailure};
use lexer::{tokenize, Token, TokenKind};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// Deepest statement/expression nesting accepted.
const MAX_NESTING: usize = 200;

/// Parse pseudocode text. `file` is used for diagnostics and as the program name.
pub fn parse_program(source: &str, file: &str) -> Result<Program, ParseFailure> {
    let tokens = tokenize(source, file)?;
    let program = Parser::new(&tokens, file).program()?;
    debug!(
        "Parsed {}: {} procedures{}",
        file,
        program.procedures.len(),
        if program.main.is_some() { " + main block" } else { "" }
    );
    Ok(program)
}

/// Read and parse one file.
pub fn parse_file(path: &Path) -> Result<Program, AsymptoteError> {
    let source = std::fs::read_to_string(path)?;
    Ok(parse_program(&source, &path.display().to_string())?)
}

struct Parser<'t, 's> {
    tokens: &'t [Token<'s>],
    pos: usize,
    file: &'t str,
    depth: usize,
}

type PResult<T> = Result<T, ParseFailure>;

impl<'t, 's> Parser<'t, 's> {
    fn new(tokens: &'t [Token<'s>], file: &'t str) -> Self {
        Self {
            tokens,
            pos: 0,
            file,
            depth: 0,
        }
    }

    // ---- token plumbing ----------------------------------------------------

    fn peek(&self) -> Option<&Token<'s>> {
        self.tokens.get(self.pos)
    }

    fn peek_kind(&self) -> Option<TokenKind> {
        self.peek().map(|t| t.kind)
    }

    fn peek_kind_at(&self, offset: usize) -> Option<TokenKind> {
        self.tokens.get(self.pos + offset).map(|t| t.kind)
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek_kind() == Some(kind)
    }

    fn position(&self) -> Position {
        match self.peek() {
            Some(t) => t.position,
            None => self.tokens.last().map(|t| t.position).unwrap_or_default(),
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseFailure {
        let pos = self.position();
        ParseFailure::new(self.file, pos.line, pos.column, message)
    }

    fn unexpected(&self, expected: &str) -> ParseFailure {
        match self.peek() {
            Some(t) => self.error(format!("expected {}, found {} '{}'", expected, t.kind, t.text)),
            None => self.error(format!("expected {}, found end of input", expected)),
        }
    }

    fn advance(&mut self) -> Option<(TokenKind, &'s str)> {
        let tokens = self.tokens;
        let token = tokens.get(self.pos)?;
        self.pos += 1;
        Some((token.kind, token.text))
    }

    fn eat(&mut self, kind: TokenKind) -> bool {
        if self.at(kind) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> PResult<Position> {
        if self.at(kind) {
            let pos = self.position();
            self.pos += 1;
            Ok(pos)
        } else {
            Err(self.unexpected(&kind.to_string()))
        }
    }

    fn ident(&mut self) -> PResult<String> {
        if self.at(TokenKind::Ident) {
            let text = self.tokens[self.pos].text.to_string();
            self.pos += 1;
            Ok(text)
        } else {
            Err(self.unexpected("identifier"))
        }
    }

    fn enter(&mut self) -> PResult<()> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(self.error("nesting too deep"));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    // ---- top level ---------------------------------------------------------

    fn program(mut self) -> PResult<Program> {
        let mut procedures: Vec<Procedure> = Vec::new();
        let mut seen: HashMap<String, Position> = HashMap::new();
        let mut main: Option<Block> = None;

        while let Some(kind) = self.peek_kind() {
            match kind {
                TokenKind::Class => self.class_declaration()?,
                TokenKind::Ident if self.peek_kind_at(1) == Some(TokenKind::LParen) => {
                    let start = self.position();
                    let proc = self.procedure()?;
                    if let Some(first) = seen.get(&proc.name) {
                        return Err(ParseFailure::new(
                            self.file,
                            start.line,
                            start.column,
                            format!("procedure '{}' is already defined at {}", proc.name, first),
                        ));
                    }
                    seen.insert(proc.name.clone(), start);
                    procedures.push(proc);
                }
                TokenKind::Begin => {
                    if main.is_some() {
                        return Err(self.error("a program has at most one main block"));
                    }
                    main = Some(self.begin_end()?);
                }
                TokenKind::Semicolon => {
                    self.pos += 1;
                }
                _ => return Err(self.unexpected("procedure definition, class declaration or main block")),
            }
        }

        let name = Path::new(self.file)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.file.to_string());
        Program::new(name, procedures, main).map_err(|dup| {
            ParseFailure::new(self.file, 1, 1, format!("procedure '{}' is defined twice", dup))
        })
    }

    /// `Clase Name { attr attr ... }`; attributes carry no cost and are dropped.
    fn class_declaration(&mut self) -> PResult<()> {
        self.expect(TokenKind::Class)?;
        self.ident()?;
        self.expect(TokenKind::LBrace)?;
        loop {
            match self.peek_kind() {
                Some(TokenKind::RBrace) => {
                    self.pos += 1;
                    return Ok(());
                }
                Some(TokenKind::Ident) | Some(TokenKind::Comma) | Some(TokenKind::Semicolon) => self.pos += 1,
                _ => return Err(self.unexpected("attribute name or '}'")),
            }
        }
    }

    fn procedure(&mut self) -> PResult<Procedure> {
        let position = self.position();
        let name = self.ident()?;
        self.expect(TokenKind::LParen)?;
        let mut params = Vec::new();
        if !self.at(TokenKind::RParen) {
            loop {
                params.push(self.param()?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen)?;
        let body = self.begin_end()?;
        Ok(Procedure::new(name, params, body, position))
    }

    fn param(&mut self) -> PResult<Param> {
        if self.eat(TokenKind::Class) {
            let class = self.ident()?;
            let name = self.ident()?;
            return Ok(Param {
                name,
                kind: ParamKind::Object { class },
            });
        }
        let name = self.ident()?;
        let mut dims = Vec::new();
        while self.eat(TokenKind::LBracket) {
            let mut upper = self.expr()?;
            self.expect(TokenKind::RBracket)?;
            if self.eat(TokenKind::DotDot) {
                self.expect(TokenKind::LBracket)?;
                upper = self.expr()?;
                self.expect(TokenKind::RBracket)?;
            }
            dims.push(upper);
        }
        let kind = if dims.is_empty() {
            ParamKind::Scalar
        } else {
            ParamKind::Array { dims }
        };
        Ok(Param { name, kind })
    }

    // ---- statements --------------------------------------------------------

    fn begin_end(&mut self) -> PResult<Block> {
        let position = self.expect(TokenKind::Begin)?;
        let stmts = self.statements()?;
        self.expect(TokenKind::End)?;
        Ok(Block::new(stmts, position))
    }

    /// A `begin ... end` block, or a single statement standing in for one.
    fn body(&mut self) -> PResult<Block> {
        if self.at(TokenKind::Begin) {
            return self.begin_end();
        }
        let position = self.position();
        let stmt = self.statement()?;
        Ok(Block::new(vec![stmt], position))
    }

    fn statements(&mut self) -> PResult<Vec<Stmt>> {
        let mut stmts = Vec::new();
        loop {
            match self.peek_kind() {
                None | Some(TokenKind::End) | Some(TokenKind::Until) | Some(TokenKind::Else) => return Ok(stmts),
                Some(TokenKind::Semicolon) => self.pos += 1,
                Some(_) => stmts.push(self.statement()?),
            }
        }
    }

    fn statement(&mut self) -> PResult<Stmt> {
        self.enter()?;
        let stmt = self.statement_inner();
        self.leave();
        stmt
    }

    fn statement_inner(&mut self) -> PResult<Stmt> {
        let position = self.position();
        match self.peek_kind() {
            Some(TokenKind::If) => self.if_stmt().map(Stmt::If),
            Some(TokenKind::For) => self.for_loop().map(Stmt::For),
            Some(TokenKind::While) => {
                self.pos += 1;
                let cond = self.expr()?;
                self.expect(TokenKind::Do)?;
                let body = self.body()?;
                Ok(Stmt::While(WhileLoop {
                    cond,
                    body,
                    test: LoopTest::PreTest,
                    position,
                }))
            }
            Some(TokenKind::Repeat) => {
                self.pos += 1;
                let body_pos = self.position();
                let stmts = self.statements()?;
                self.expect(TokenKind::Until)?;
                let cond = self.expr()?;
                Ok(Stmt::While(WhileLoop {
                    cond,
                    body: Block::new(stmts, body_pos),
                    test: LoopTest::PostTest,
                    position,
                }))
            }
            Some(TokenKind::Call) => {
                self.pos += 1;
                let callee = self.ident()?;
                let args = self.call_args()?;
                Ok(Stmt::Call(Call { callee, args, position }))
            }
            Some(TokenKind::Return) => {
                self.pos += 1;
                let value = if self.return_has_value(position.line) {
                    Some(self.expr()?)
                } else {
                    None
                };
                Ok(Stmt::Primitive(Primitive {
                    kind: PrimitiveKind::Return(value),
                    position,
                }))
            }
            Some(TokenKind::Break) => {
                self.pos += 1;
                Ok(Stmt::Primitive(Primitive {
                    kind: PrimitiveKind::Break,
                    position,
                }))
            }
            Some(_) => {
                let target = self.postfix()?;
                if self.eat(TokenKind::Assign) {
                    let value = self.expr()?;
                    if !matches!(target, Expr::Var(_) | Expr::Index { .. } | Expr::Field { .. }) {
                        return Err(ParseFailure::new(
                            self.file,
                            position.line,
                            position.column,
                            "left side of an assignment must be a variable, element or field",
                        ));
                    }
                    return Ok(Stmt::Assign(Assignment { target, value, position }));
                }
                match target {
                    Expr::Call { callee, args, .. } => Ok(Stmt::Call(Call { callee, args, position })),
                    _ => Err(self.unexpected("'🡨'")),
                }
            }
            None => Err(self.unexpected("statement")),
        }
    }

    /// `return` takes a value only when one follows on the same line.
    fn return_has_value(&self, line: u32) -> bool {
        match self.peek() {
            Some(t) if t.position.line == line => !matches!(
                t.kind,
                TokenKind::End | TokenKind::Else | TokenKind::Until | TokenKind::Semicolon
            ),
            _ => false,
        }
    }

    fn if_stmt(&mut self) -> PResult<IfStmt> {
        let position = self.expect(TokenKind::If)?;
        let cond = self.expr()?;
        self.expect(TokenKind::Then)?;
        let then_block = self.body()?;
        let else_block = if self.eat(TokenKind::Else) {
            if self.at(TokenKind::If) {
                let nested_pos = self.position();
                let nested = self.if_stmt()?;
                Some(Block::new(vec![Stmt::If(nested)], nested_pos))
            } else {
                Some(self.body()?)
            }
        } else {
            None
        };
        Ok(IfStmt {
            cond,
            then_block,
            else_block,
            position,
        })
    }

    fn for_loop(&mut self) -> PResult<ForLoop> {
        let position = self.expect(TokenKind::For)?;
        let var = self.ident()?;
        self.expect(TokenKind::Assign)?;
        let start = self.expr()?;
        let descending = match self.peek_kind() {
            Some(TokenKind::To) => false,
            Some(TokenKind::Downto) => true,
            _ => return Err(self.unexpected("'to' or 'downto'")),
        };
        self.pos += 1;
        let end = self.expr()?;
        let step = if self.eat(TokenKind::Step) { Some(self.expr()?) } else { None };
        self.expect(TokenKind::Do)?;
        let body = self.body()?;
        Ok(ForLoop {
            var,
            start,
            end,
            step,
            descending,
            body,
            position,
        })
    }

    fn call_args(&mut self) -> PResult<Vec<Expr>> {
        self.expect(TokenKind::LParen)?;
        let mut args = Vec::new();
        if !self.at(TokenKind::RParen) {
            loop {
                args.push(self.expr()?);
                if !self.eat(TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(args)
    }

    // ---- expressions -------------------------------------------------------

    fn expr(&mut self) -> PResult<Expr> {
        self.enter()?;
        let e = self.or_expr();
        self.leave();
        e
    }

    fn or_expr(&mut self) -> PResult<Expr> {
        let mut lhs = self.and_expr()?;
        while self.eat(TokenKind::Or) {
            let rhs = self.and_expr()?;
            lhs = Expr::binary(BinOp::Or, lhs, rhs);
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> PResult<Expr> {
        let mut lhs = self.not_expr()?;
        while self.eat(TokenKind::And) {
            let rhs = self.not_expr()?;
            lhs = Expr::binary(BinOp::And, lhs, rhs);
        }
        Ok(lhs)
    }

    fn not_expr(&mut self) -> PResult<Expr> {
        if self.eat(TokenKind::Not) {
            let operand = self.not_expr()?;
            return Ok(Expr::Unary {
                op: UnOp::Not,
                operand: Box::new(operand),
            });
        }
        self.comparison()
    }

    fn comparison(&mut self) -> PResult<Expr> {
        let mut lhs = self.additive()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Eq) => BinOp::Eq,
                Some(TokenKind::Ne) => BinOp::Ne,
                Some(TokenKind::Lt) => BinOp::Lt,
                Some(TokenKind::Le) => BinOp::Le,
                Some(TokenKind::Gt) => BinOp::Gt,
                Some(TokenKind::Ge) => BinOp::Ge,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.additive()?;
            lhs = Expr::binary(op, lhs, rhs);
        }
    }

    fn additive(&mut self) -> PResult<Expr> {
        let mut lhs = self.multiplicative()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Plus) => BinOp::Add,
                Some(TokenKind::Minus) => BinOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.multiplicative()?;
            lhs = Expr::binary(op, lhs, rhs);
        }
    }

    fn multiplicative(&mut self) -> PResult<Expr> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek_kind() {
                Some(TokenKind::Star) => BinOp::Mul,
                Some(TokenKind::Slash) => BinOp::Div,
                Some(TokenKind::Div) => BinOp::IntDiv,
                Some(TokenKind::Mod) => BinOp::Mod,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Expr::binary(op, lhs, rhs);
        }
    }

    fn unary(&mut self) -> PResult<Expr> {
        if self.eat(TokenKind::Minus) {
            let operand = self.unary()?;
            return Ok(Expr::Unary {
                op: UnOp::Neg,
                operand: Box::new(operand),
            });
        }
        if self.eat(TokenKind::Plus) {
            return self.unary();
        }
        self.postfix()
    }

    fn postfix(&mut self) -> PResult<Expr> {
        let mut e = self.primary()?;
        loop {
            if self.eat(TokenKind::LBracket) {
                let index = self.expr()?;
                self.expect(TokenKind::RBracket)?;
                e = Expr::Index {
                    base: Box::new(e),
                    index: Box::new(index),
                };
            } else if self.eat(TokenKind::Dot) {
                let field = self.ident()?;
                e = Expr::Field {
                    base: Box::new(e),
                    field,
                };
            } else {
                return Ok(e);
            }
        }
    }

    fn wrapped(&mut self, op: UnOp, close: TokenKind) -> PResult<Expr> {
        let operand = self.expr()?;
        self.expect(close)?;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn primary(&mut self) -> PResult<Expr> {
        let position = self.position();
        let Some((kind, text)) = self.advance() else {
            return Err(self.unexpected("expression"));
        };
        match kind {
            TokenKind::Number => text
                .parse::<f64>()
                .map(Expr::Number)
                .map_err(|_| ParseFailure::new(self.file, position.line, position.column, "invalid number")),
            TokenKind::Str => Ok(Expr::Str(text.trim_matches('"').to_string())),
            TokenKind::True => Ok(Expr::Bool(true)),
            TokenKind::False => Ok(Expr::Bool(false)),
            TokenKind::Null => Ok(Expr::Null),
            TokenKind::LParen => {
                let e = self.expr()?;
                self.expect(TokenKind::RParen)?;
                Ok(e)
            }
            TokenKind::Length => {
                self.expect(TokenKind::LParen)?;
                let inner = self.expr()?;
                self.expect(TokenKind::RParen)?;
                Ok(Expr::Length(Box::new(inner)))
            }
            TokenKind::Ceil => {
                self.expect(TokenKind::LParen)?;
                self.wrapped(UnOp::Ceil, TokenKind::RParen)
            }
            TokenKind::Floor => {
                self.expect(TokenKind::LParen)?;
                self.wrapped(UnOp::Floor, TokenKind::RParen)
            }
            TokenKind::CeilOpen => self.wrapped(UnOp::Ceil, TokenKind::CeilClose),
            TokenKind::FloorOpen => self.wrapped(UnOp::Floor, TokenKind::FloorClose),
            TokenKind::Ident => {
                let name = text.to_string();
                if self.at(TokenKind::LParen) {
                    let args = self.call_args()?;
                    return Ok(Expr::Call {
                        callee: name,
                        args,
                        position,
                    });
                }
                Ok(Expr::Var(name))
            }
            _ => {
                self.pos -= 1;
                Err(self.unexpected("expression"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Program {
        parse_program(src, "test.psc").unwrap()
    }

    #[test]
    fn test_linear_search() {
        let program = parse(
            "busqueda(A[1]..[n], x)
             begin
                 for i 🡨 1 to n do
                 begin
                     if (A[i] = x) then
                     begin
                         return i
                     end
                 end
                 return 0
             end",
        );
        assert_eq!(program.name, "test");
        let proc = program.procedure("busqueda").unwrap();
        assert_eq!(proc.params.len(), 2);
        assert_eq!(
            proc.params[0].kind,
            ParamKind::Array {
                dims: vec![Expr::var("n")]
            }
        );
        let Stmt::For(l) = &proc.body.stmts[0] else {
            panic!("expected for loop");
        };
        assert_eq!(l.var, "i");
        assert!(!l.descending);
        assert!(matches!(&l.body.stmts[0], Stmt::If(_)));
        assert!(matches!(
            &proc.body.stmts[1],
            Stmt::Primitive(Primitive {
                kind: PrimitiveKind::Return(Some(Expr::Number(_))),
                ..
            })
        ));
    }

    #[test]
    fn test_bare_return_before_end() {
        let program = parse("f(n)\nbegin\n  if (n = 0) then\n  begin\n    return\n  end\n  call f(n - 1)\nend");
        let proc = program.procedure("f").unwrap();
        let Stmt::If(s) = &proc.body.stmts[0] else { panic!() };
        assert!(matches!(
            &s.then_block.stmts[0],
            Stmt::Primitive(Primitive {
                kind: PrimitiveKind::Return(None),
                ..
            })
        ));
        assert!(matches!(&proc.body.stmts[1], Stmt::Call(c) if c.callee == "f"));
    }

    #[test]
    fn test_precedence() {
        let program = parse("begin\n x <- a + b * c div 2\n ok <- not x < 3 and y = 1 or z\nend");
        let main = program.main.unwrap();
        let Stmt::Assign(a) = &main.stmts[0] else { panic!() };
        let Expr::Binary { op: BinOp::Add, rhs, .. } = &a.value else { panic!("{:?}", a.value) };
        assert!(matches!(**rhs, Expr::Binary { op: BinOp::IntDiv, .. }));
        let Stmt::Assign(b) = &main.stmts[1] else { panic!() };
        assert!(matches!(b.value, Expr::Binary { op: BinOp::Or, .. }));
    }

    #[test]
    fn test_repeat_downto_step_and_else_if() {
        let program = parse(
            "p(n)
             begin
                 repeat
                     n <- n div 2
                 until (n <= 1)
                 for i <- n downto 1 step 2 do
                 begin
                     x <- ┌i / 2┐
                 end
                 if (n > 1) then begin x <- 1 end
                 else if (n = 1) then begin x <- 2 end
                 else begin x <- 3 end
             end",
        );
        let proc = program.procedure("p").unwrap();
        assert!(matches!(&proc.body.stmts[0], Stmt::While(w) if w.test == LoopTest::PostTest));
        let Stmt::For(l) = &proc.body.stmts[1] else { panic!() };
        assert!(l.descending);
        assert_eq!(l.step, Some(Expr::num(2.0)));
        let Stmt::If(s) = &proc.body.stmts[2] else { panic!() };
        let nested = s.else_block.as_ref().unwrap();
        assert!(matches!(&nested.stmts[0], Stmt::If(inner) if inner.else_block.is_some()));
    }

    #[test]
    fn test_classes_and_object_params() {
        let program = parse(
            "Clase Nodo { valor siguiente }
             recorrer(Clase Nodo cabeza)
             begin
                 p <- cabeza
                 while (p <> null) do
                 begin
                     p <- p.siguiente
                 end
             end",
        );
        let proc = program.procedure("recorrer").unwrap();
        assert_eq!(
            proc.params[0].kind,
            ParamKind::Object {
                class: "Nodo".to_string()
            }
        );
    }

    #[test]
    fn test_expression_calls() {
        let program = parse("fib(n)\nbegin\n  return fib(n - 1) + fib(n - 2)\nend");
        assert_eq!(program.procedure("fib").unwrap().callees(), vec!["fib", "fib"]);
    }

    #[test]
    fn test_duplicate_procedure_is_failure() {
        let err = parse_program("f(n)\nbegin\nend\nf(m)\nbegin\nend", "dup.psc").unwrap_err();
        assert_eq!(err.line, 4);
        assert!(err.message.contains("already defined"));
    }

    #[test]
    fn test_missing_end_is_failure() {
        let err = parse_program("f(n)\nbegin\n  x <- 1\n", "trunc.psc").unwrap_err();
        assert!(err.message.contains("'end'"), "{}", err.message);
    }

    #[test]
    fn test_statement_without_assignment_is_failure() {
        let err = parse_program("begin\n  x + 1\nend", "bad.psc").unwrap_err();
        assert_eq!(err.line, 2);
    }
}
