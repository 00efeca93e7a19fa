use crate::environment::Environment;
use crate::evaluator::EvalResult;
use crate::number::Number;
use crate::source::Span;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: Sexpr, // The actual S-expression data
    pub span: Span,  // The source span it covers
}

// Spans are diagnostics only; two nodes are equal when their data is.
impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

impl Node {
    pub fn new(kind: Sexpr, span: Span) -> Self {
        Node { kind, span }
    }

    pub fn new_symbol(name: String, span: Span) -> Self {
        Node::new(Sexpr::Symbol(name), span)
    }

    pub fn new_number(n: impl Into<Number>, span: Span) -> Self {
        Node::new(Sexpr::Number(n.into()), span)
    }

    pub fn new_bool(b: bool, span: Span) -> Self {
        Node::new(Sexpr::Boolean(b), span)
    }

    pub fn new_list(elements: Vec<Node>, span: Span) -> Self {
        Node::new(Sexpr::List(elements.into()), span)
    }

    pub fn new_nil(span: Span) -> Self {
        Node::new_list(Vec::new(), span)
    }

    pub fn new_void(span: Span) -> Self {
        Node::new(Sexpr::Void, span)
    }

    pub fn new_primitive(func: PrimitiveFunc, name: &str, span: Span) -> Self {
        Node::new(
            Sexpr::Procedure(Procedure::Primitive(func, name.to_string())),
            span,
        )
    }

    pub fn new_lambda(
        params: Vec<String>,
        body: Node,
        env: Rc<RefCell<Environment>>,
        span: Span,
    ) -> Self {
        Node::new(
            Sexpr::Procedure(Procedure::Lambda(Rc::new(Lambda { params, body, env }))),
            span,
        )
    }
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Delegate to Sexpr's Display implementation
        write!(f, "{}", self.kind)
    }
}

/// A Lisp expression. The same type is used for parsed code and for runtime
/// data.
#[derive(Debug, Clone, PartialEq)]
pub enum Sexpr {
    Symbol(String),      // e.g., +, variable-name, quote
    Number(Number),      // 42, -4.5
    Boolean(bool),       // #t or #f
    List(Rc<[Node]>),    // e.g., (+ 1 2), (define x 10); '() is the empty list
    Procedure(Procedure),
    Void,                // Result of define and set!
}

impl Sexpr {
    pub fn type_name(&self) -> &'static str {
        match self {
            Sexpr::Number(_) => "number",
            Sexpr::Symbol(_) => "symbol",
            Sexpr::Boolean(_) => "boolean",
            Sexpr::List(elements) if elements.is_empty() => "nil",
            Sexpr::List(_) => "list",
            Sexpr::Procedure(_) => "procedure",
            Sexpr::Void => "void",
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Sexpr::List(elements) if elements.is_empty())
    }

    /// Only `#f` and the void value are false; `0` and `()` are true.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Sexpr::Boolean(false) | Sexpr::Void)
    }

    /// Identity comparison used by `eq?`. Atoms compare by value, lists and
    /// closures by allocation.
    pub fn is_identical(&self, other: &Sexpr) -> bool {
        match (self, other) {
            (Sexpr::List(a), Sexpr::List(b)) => {
                (a.is_empty() && b.is_empty()) || std::ptr::eq(a.as_ptr(), b.as_ptr())
            }
            (Sexpr::Procedure(Procedure::Lambda(a)), Sexpr::Procedure(Procedure::Lambda(b))) => {
                Rc::ptr_eq(a, b)
            }
            (Sexpr::Procedure(_), Sexpr::Procedure(_)) => self == other,
            (Sexpr::Symbol(_), Sexpr::Symbol(_))
            | (Sexpr::Number(_), Sexpr::Number(_))
            | (Sexpr::Boolean(_), Sexpr::Boolean(_))
            | (Sexpr::Void, Sexpr::Void) => self == other,
            _ => false,
        }
    }
}

impl fmt::Display for Sexpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sexpr::Symbol(s) => write!(f, "{}", s),
            Sexpr::Number(n) => write!(f, "{}", n),
            Sexpr::Boolean(b) => write!(f, "{}", if *b { "#t" } else { "#f" }),
            Sexpr::List(list) => {
                write!(f, "(")?;
                let mut first = true;
                for expr in list.iter() {
                    if !first {
                        write!(f, " ")?;
                    }
                    write!(f, "{}", expr)?;
                    first = false;
                }
                write!(f, ")")
            }
            Sexpr::Procedure(procedure) => write!(f, "{}", procedure),
            Sexpr::Void => write!(f, "#<void>"),
        }
    }
}

pub type PrimitiveFunc = fn(Vec<Node>, Span) -> EvalResult;

/// A user-defined procedure: parameter names, an unevaluated body and the
/// environment the `lambda` form was evaluated in.
pub struct Lambda {
    pub params: Vec<String>,
    pub body: Node,
    pub env: Rc<RefCell<Environment>>,
}

#[derive(Clone)] // Need Clone for Sexpr::Procedure
pub enum Procedure {
    Primitive(PrimitiveFunc, String), // The function pointer and its name (for display/debug)
    Lambda(Rc<Lambda>),
}

impl fmt::Display for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Procedure::Primitive(_, name) => write!(f, "#<primitive:{}>", name),
            Procedure::Lambda(lambda) => write!(f, "#<lambda ({})>", lambda.params.join(" ")),
        }
    }
}

// The captured environment is left out: it usually holds the closure itself.
impl fmt::Debug for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Procedure::Primitive(_, name) => write!(f, "Primitive({})", name),
            Procedure::Lambda(lambda) => f
                .debug_struct("Lambda")
                .field("params", &lambda.params)
                .field("body", &lambda.body)
                .finish_non_exhaustive(),
        }
    }
}

// Function pointers don't compare reliably, so primitives compare by name and
// closures by identity.
impl PartialEq for Procedure {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Procedure::Primitive(_, n1), Procedure::Primitive(_, n2)) => n1 == n2,
            (Procedure::Lambda(l1), Procedure::Lambda(l2)) => Rc::ptr_eq(l1, l2),
            _ => false,
        }
    }
}
