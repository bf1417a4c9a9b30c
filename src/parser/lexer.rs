//! Tokenizer for the pseudocode language

use crate::ast::Position;
use crate::error::ParseFailure;
use logos::Logos;
use std::fmt;

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    // Keywords
    #[token("begin", ignore(case))]
    Begin,
    #[token("end", ignore(case))]
    End,
    #[token("if", ignore(case))]
    If,
    #[token("then", ignore(case))]
    Then,
    #[token("else", ignore(case))]
    Else,
    #[token("for", ignore(case))]
    For,
    #[token("to", ignore(case))]
    To,
    #[token("downto", ignore(case))]
    Downto,
    #[token("step", ignore(case))]
    Step,
    #[token("do", ignore(case))]
    Do,
    #[token("while", ignore(case))]
    While,
    #[token("repeat", ignore(case))]
    Repeat,
    #[token("until", ignore(case))]
    Until,
    #[token("call", ignore(case))]
    Call,
    #[token("return", ignore(case))]
    Return,
    #[token("break", ignore(case))]
    Break,
    #[token("and", ignore(case))]
    And,
    #[token("or", ignore(case))]
    Or,
    #[token("not", ignore(case))]
    Not,
    #[token("mod", ignore(case))]
    Mod,
    #[token("div", ignore(case))]
    Div,
    #[token("length", ignore(case))]
    Length,
    #[token("ceil", ignore(case))]
    Ceil,
    #[token("floor", ignore(case))]
    Floor,
    #[token("true", ignore(case))]
    True,
    #[token("false", ignore(case))]
    False,
    #[token("null", ignore(case))]
    Null,
    #[token("clase", ignore(case))]
    #[token("class", ignore(case))]
    Class,

    // Operators
    #[token("🡨")]
    #[token("<-")]
    Assign,
    #[token("=")]
    Eq,
    #[token("<>")]
    #[token("≠")]
    Ne,
    #[token("<")]
    Lt,
    #[token("<=")]
    #[token("≤")]
    Le,
    #[token(">")]
    Gt,
    #[token(">=")]
    #[token("≥")]
    Ge,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,

    // Delimiters
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("┌")]
    CeilOpen,
    #[token("┐")]
    CeilClose,
    #[token("└")]
    FloorOpen,
    #[token("┘")]
    FloorClose,
    #[token("..")]
    DotDot,
    #[token(".")]
    Dot,
    #[token(",")]
    Comma,
    #[token(";")]
    Semicolon,

    // Literals
    #[regex(r#""[^"]*""#)]
    Str,
    #[regex(r"[0-9]+(\.[0-9]+)?")]
    Number,
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", priority = 1)]
    Ident,

    #[regex(r"(►|//)[^\n]*", logos::skip)]
    Comment,
    #[regex(r"[ \t\r\f]+", logos::skip)]
    Whitespace,
    #[token("\n")]
    Newline,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TokenKind::Begin => "'begin'",
            TokenKind::End => "'end'",
            TokenKind::If => "'if'",
            TokenKind::Then => "'then'",
            TokenKind::Else => "'else'",
            TokenKind::For => "'for'",
            TokenKind::To => "'to'",
            TokenKind::Downto => "'downto'",
            TokenKind::Step => "'step'",
            TokenKind::Do => "'do'",
            TokenKind::While => "'while'",
            TokenKind::Repeat => "'repeat'",
            TokenKind::Until => "'until'",
            TokenKind::Call => "'call'",
            TokenKind::Return => "'return'",
            TokenKind::Break => "'break'",
            TokenKind::And => "'and'",
            TokenKind::Or => "'or'",
            TokenKind::Not => "'not'",
            TokenKind::Mod => "'mod'",
            TokenKind::Div => "'div'",
            TokenKind::Length => "'length'",
            TokenKind::Ceil => "'ceil'",
            TokenKind::Floor => "'floor'",
            TokenKind::True => "'true'",
            TokenKind::False => "'false'",
            TokenKind::Null => "'null'",
            TokenKind::Class => "'Clase'",
            TokenKind::Assign => "'🡨'",
            TokenKind::Eq => "'='",
            TokenKind::Ne => "'<>'",
            TokenKind::Lt => "'<'",
            TokenKind::Le => "'<='",
            TokenKind::Gt => "'>'",
            TokenKind::Ge => "'>='",
            TokenKind::Plus => "'+'",
            TokenKind::Minus => "'-'",
            TokenKind::Star => "'*'",
            TokenKind::Slash => "'/'",
            TokenKind::LParen => "'('",
            TokenKind::RParen => "')'",
            TokenKind::LBracket => "'['",
            TokenKind::RBracket => "']'",
            TokenKind::LBrace => "'{'",
            TokenKind::RBrace => "'}'",
            TokenKind::CeilOpen => "'┌'",
            TokenKind::CeilClose => "'┐'",
            TokenKind::FloorOpen => "'└'",
            TokenKind::FloorClose => "'┘'",
            TokenKind::DotDot => "'..'",
            TokenKind::Dot => "'.'",
            TokenKind::Comma => "','",
            TokenKind::Semicolon => "';'",
            TokenKind::Str => "string",
            TokenKind::Number => "number",
            TokenKind::Ident => "identifier",
            TokenKind::Comment => "comment",
            TokenKind::Whitespace => "whitespace",
            TokenKind::Newline => "newline",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token<'s> {
    pub kind: TokenKind,
    pub text: &'s str,
    pub position: Position,
}

/// Split `source` into tokens, dropping comments, whitespace and newlines.
pub fn tokenize<'s>(source: &'s str, file: &str) -> Result<Vec<Token<'s>>, ParseFailure> {
    let source = source.strip_prefix('\u{FEFF}').unwrap_or(source);
    let mut lexer = TokenKind::lexer(source);
    let mut tokens = Vec::new();
    let mut line = 1u32;
    let mut line_start = 0usize;

    while let Some(result) = lexer.next() {
        let span = lexer.span();
        let column = source[line_start..span.start].chars().count() as u32 + 1;
        match result {
            Ok(TokenKind::Newline) => {
                line += 1;
                line_start = span.end;
            }
            Ok(kind) => tokens.push(Token {
                kind,
                text: lexer.slice(),
                position: Position::new(line, column),
            }),
            Err(()) => {
                return Err(ParseFailure::new(
                    file,
                    line,
                    column,
                    format!("unexpected character '{}'", lexer.slice()),
                ))
            }
        }
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src, "t.psc").unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_keywords_are_case_insensitive() {
        assert_eq!(
            kinds("BEGIN End while Div"),
            vec![TokenKind::Begin, TokenKind::End, TokenKind::While, TokenKind::Div]
        );
    }

    #[test]
    fn test_both_assignment_spellings() {
        assert_eq!(kinds("x 🡨 1"), vec![TokenKind::Ident, TokenKind::Assign, TokenKind::Number]);
        assert_eq!(kinds("x <- 1"), vec![TokenKind::Ident, TokenKind::Assign, TokenKind::Number]);
    }

    #[test]
    fn test_keyword_prefix_is_identifier() {
        assert_eq!(kinds("ending divide"), vec![TokenKind::Ident, TokenKind::Ident]);
    }

    #[test]
    fn test_comments_and_positions() {
        let tokens = tokenize("► header\n  x <- y // trailing\n", "t.psc").unwrap();
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0].position, Position::new(2, 3));
        assert_eq!(tokens[2].text, "y");
    }

    #[test]
    fn test_unicode_comparisons() {
        assert_eq!(
            kinds("a ≤ b ≠ c ≥ d"),
            vec![
                TokenKind::Ident,
                TokenKind::Le,
                TokenKind::Ident,
                TokenKind::Ne,
                TokenKind::Ident,
                TokenKind::Ge,
                TokenKind::Ident
            ]
        );
    }

    #[test]
    fn test_unexpected_character() {
        let err = tokenize("x <- 1\ny <- @", "bad.psc").unwrap_err();
        assert_eq!(err.line, 2);
        assert_eq!(err.column, 6);
        assert_eq!(err.file, "bad.psc");
    }
}
