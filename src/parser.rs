use crate::Span;
use crate::lexer::{Token, TokenKind};
use crate::number::Number;
use crate::types::Node;
use std::iter::Peekable;
use std::vec::IntoIter; // To iterate over Vec<Token>
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("unexpected end of input")]
    UnexpectedEof,
    #[error("unexpected )")]
    UnexpectedCloseParen(Span),
    #[error("unexpected '{found}' after a complete expression")]
    TrailingInput { found: TokenKind, span: Span },
}

// Result type alias for convenience
type ParseResult<T> = Result<T, ParseError>;

pub struct Parser {
    // We iterate over owned Tokens, consuming them.
    tokens: Peekable<IntoIter<Token>>,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Parser {
            tokens: tokens.into_iter().peekable(),
        }
    }

    // Consumes the next token if available.
    fn next_token(&mut self) -> Option<Token> {
        self.tokens.next()
    }

    fn peek_token(&mut self) -> Option<&Token> {
        self.tokens.peek()
    }

    pub fn is_at_end(&mut self) -> bool {
        self.peek_token().is_none()
    }

    /// Parses a single S-expression from the front of the token stream.
    pub fn parse_expr(&mut self) -> ParseResult<Node> {
        match self.next_token() {
            Some(Token {
                kind: TokenKind::LParen,
                span,
            }) => self.parse_list(span),
            Some(Token {
                kind: TokenKind::RParen,
                span,
            }) => Err(ParseError::UnexpectedCloseParen(span)),
            Some(Token {
                kind: TokenKind::Atom(text),
                span,
            }) => Ok(Self::parse_atom(text, span)),
            None => Err(ParseError::UnexpectedEof),
        }
    }

    /// Parses the elements of a list after its `(` has been consumed.
    fn parse_list(&mut self, lparen_span: Span) -> ParseResult<Node> {
        let mut elements = Vec::new();
        loop {
            match self.peek_token() {
                Some(Token {
                    kind: TokenKind::RParen,
                    span,
                }) => {
                    let span = lparen_span.merge(*span);
                    self.next_token();
                    return Ok(Node::new_list(elements, span));
                }
                // A missing `)` surfaces as end of input from the inner read
                _ => elements.push(self.parse_expr()?),
            }
        }
    }

    /// Parses an atom: integer, then float, then boolean, else symbol.
    fn parse_atom(text: String, span: Span) -> Node {
        if let Some(number) = Number::parse(&text) {
            return Node::new_number(number, span);
        }
        match text.as_str() {
            "#t" => Node::new_bool(true, span),
            "#f" => Node::new_bool(false, span),
            _ => Node::new_symbol(text, span),
        }
    }

    /// Parses exactly one expression; any tokens left over are an error.
    pub fn parse(mut self) -> ParseResult<Node> {
        let expr = self.parse_expr()?;

        if let Some(found) = self.next_token() {
            Err(ParseError::TrailingInput {
                found: found.kind,
                span: found.span,
            })
        } else {
            Ok(expr)
        }
    }

    /// Parses every top-level expression until the tokens run out.
    pub fn parse_all(mut self) -> ParseResult<Vec<Node>> {
        let mut expressions = Vec::new();
        while !self.is_at_end() {
            expressions.push(self.parse_expr()?);
        }
        Ok(expressions)
    }
}

// Helper function to lex and parse a string directly (useful for tests and REPL)
pub fn parse_str(input: &str) -> ParseResult<Node> {
    Parser::new(crate::lexer::tokenize(input)).parse()
}

/// Lexes and parses a whole program: zero or more top-level expressions.
pub fn parse_program(input: &str) -> ParseResult<Vec<Node>> {
    Parser::new(crate::lexer::tokenize(input)).parse_all()
}
