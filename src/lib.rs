// Declare modules publicly so they are part of the library interface
pub mod environment;
pub mod evaluator;
pub mod lexer;
pub mod number;
pub mod parser;
pub mod pretty_print;
pub mod primitives;
pub mod source;
pub mod types;

use std::cell::RefCell;
use std::rc::Rc;
use thiserror::Error;

pub use environment::{EnvError, Environment};
pub use evaluator::{EvalError, EvalResult, evaluate};
pub use lexer::{Token, TokenKind, tokenize};
pub use number::Number;
pub use parser::{ParseError, Parser, parse_program, parse_str};
pub use source::Span;
pub use types::{Node, Procedure, Sexpr};

/// Anything that can go wrong between reading text and producing a value.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("Syntax error: {0}")]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Eval(#[from] EvalError),
}

/// Parses exactly one expression from `input` and evaluates it in `env`.
pub fn eval_str(input: &str, env: Rc<RefCell<Environment>>) -> Result<Node, Error> {
    let node = parse_str(input)?;
    Ok(evaluate(node, env)?)
}

/// Parses every top-level expression in `input`, then evaluates them in
/// order, stopping at the first error. Nothing is evaluated if the text does
/// not parse.
pub fn run_program(input: &str, env: Rc<RefCell<Environment>>) -> Result<Vec<Node>, Error> {
    let program = parse_program(input)?;
    let mut results = Vec::with_capacity(program.len());
    for node in program {
        results.push(evaluate(node, env.clone())?);
    }
    Ok(results)
}
