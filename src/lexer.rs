use logos::Logos;
use std::fmt;

use crate::Span;

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"\s+")] // Skip whitespace
pub enum TokenKind {
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    // Everything between whitespace and parentheses is an atom. The parser
    // decides whether it is a number, a boolean or a symbol.
    #[regex(r"[^\s()]+", |lex| lex.slice().to_string())]
    Atom(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::LParen => write!(f, "("),
            TokenKind::RParen => write!(f, ")"),
            TokenKind::Atom(s) => write!(f, "{}", s),
        }
    }
}

/// Splits `input` into parenthesis and atom tokens.
///
/// Tokenizing never fails; unbalanced or otherwise malformed input is
/// reported by the parser.
pub fn tokenize(input: &str) -> Vec<Token> {
    TokenKind::lexer(input)
        .spanned()
        .map(|(result, range)| Token {
            // The patterns above cover every non-whitespace character, so an
            // error slice can only ever be read as an atom.
            kind: result.unwrap_or_else(|_| TokenKind::Atom(input[range.clone()].to_string())),
            span: range.into(),
        })
        .collect()
}
