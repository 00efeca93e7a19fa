use crate::evaluator::apply_procedure;
use crate::number::Number;
use crate::types::{PrimitiveFunc, Procedure};
use crate::{EvalError, EvalResult, Node, Sexpr, Span};
use std::rc::Rc;

/// Every builtin installed into the standard root environment.
pub const STANDARD_PRIMITIVES: &[(&str, PrimitiveFunc)] = &[
    // Arithmetic
    ("+", prim_add),
    ("-", prim_sub),
    ("*", prim_mul),
    ("/", prim_div),
    ("abs", prim_abs),
    ("max", prim_max),
    ("min", prim_min),
    ("round", prim_round),
    ("floor", prim_floor),
    ("ceiling", prim_ceiling),
    ("expt", prim_expt),
    ("pow", prim_expt),
    ("sqrt", prim_sqrt),
    ("exp", prim_exp),
    ("log", prim_log),
    ("sin", prim_sin),
    ("cos", prim_cos),
    ("tan", prim_tan),
    // Comparisons
    ("=", prim_equals),
    ("<", prim_less_than),
    ("<=", prim_less_than_or_equals),
    (">", prim_greater_than),
    (">=", prim_greater_than_or_equals),
    // Lists
    ("car", prim_car),
    ("cdr", prim_cdr),
    ("cons", prim_cons),
    ("list", prim_list),
    ("length", prim_length),
    ("append", prim_append),
    // Equality and predicates
    ("equal?", prim_is_equal),
    ("eq?", prim_is_eq),
    ("null?", prim_is_null),
    ("list?", prim_is_list),
    ("number?", prim_is_number),
    ("symbol?", prim_is_symbol),
    ("boolean?", prim_is_boolean),
    ("procedure?", prim_is_procedure),
    ("not", prim_not),
    // Control
    ("begin", prim_begin),
    ("apply", prim_apply),
    ("map", prim_map),
];

// Checks the number of arguments
macro_rules! check_arity {
    ($args:expr, $expected:expr, $span:expr, $name:expr) => {
        if $args.len() != $expected {
            return Err(EvalError::InvalidArguments(
                format!(
                    "Primitive '{}' expects exactly {} arguments, got {}",
                    $name,
                    $expected,
                    $args.len()
                ),
                $span,
            ));
        }
    };
    // Variant for minimum number of args
    ($args:expr, min $expected:expr, $span:expr, $name:expr) => {
        if $args.len() < $expected {
            return Err(EvalError::InvalidArguments(
                format!(
                    "Primitive '{}' expects at least {} arguments, got {}",
                    $name,
                    $expected,
                    $args.len()
                ),
                $span,
            ));
        }
    };
}

// Extracts a number from a Node or returns a TypeMismatch error
macro_rules! expect_number {
    ($node:expr, $span:expr) => {
        match $node.kind {
            Sexpr::Number(n) => n,
            ref other => {
                return Err(EvalError::TypeMismatch {
                    expected: "number",
                    found: other.clone(),
                    span: $span, // Use call span for arg type errors
                });
            }
        }
    };
}

// Extracts the elements of a list argument or returns a TypeMismatch error
macro_rules! expect_list {
    ($node:expr, $span:expr) => {
        match &$node.kind {
            Sexpr::List(elements) => elements,
            other => {
                return Err(EvalError::TypeMismatch {
                    expected: "list",
                    found: other.clone(),
                    span: $span,
                });
            }
        }
    };
}

fn expect_procedure(node: &Node, span: Span) -> EvalResult<&Procedure> {
    match &node.kind {
        Sexpr::Procedure(procedure) => Ok(procedure),
        other => Err(EvalError::TypeMismatch {
            expected: "procedure",
            found: other.clone(),
            span,
        }),
    }
}

fn number(n: Number, span: Span) -> EvalResult {
    Ok(Node::new_number(n, span))
}

fn boolean(b: bool, span: Span) -> EvalResult {
    Ok(Node::new_bool(b, span))
}

// --- Arithmetic ---

fn prim_fold_numbers(
    args: Vec<Node>,
    span: Span,
    start: Number,
    func: fn(Number, Number) -> Number,
) -> EvalResult {
    let mut acc = start;
    for node in &args {
        acc = func(acc, expect_number!(node, span));
    }
    number(acc, span)
}

pub fn prim_add(args: Vec<Node>, span: Span) -> EvalResult {
    // (+) -> 0
    // (+ 1 2 3) -> 6
    prim_fold_numbers(args, span, Number::Integer(0), Number::add)
}

pub fn prim_mul(args: Vec<Node>, span: Span) -> EvalResult {
    // (*) -> 1
    // (* 1 2 3) -> 6
    prim_fold_numbers(args, span, Number::Integer(1), Number::mul)
}

pub fn prim_sub(args: Vec<Node>, span: Span) -> EvalResult {
    // (- x) -> -x
    // (- x y z) -> x - y - z
    check_arity!(args, min 1, span, "-");
    let first_num = expect_number!(&args[0], span);
    if args.len() == 1 {
        return number(first_num.neg(), span);
    }
    let mut result = first_num;
    for node in &args[1..] {
        result = result.sub(expect_number!(node, span));
    }
    number(result, span)
}

pub fn prim_div(args: Vec<Node>, span: Span) -> EvalResult {
    // (/ x) -> 1/x
    // (/ x y z) -> x / y / z
    check_arity!(args, min 1, span, "/");
    let first_num = expect_number!(&args[0], span);
    let (mut result, divisors) = if args.len() == 1 {
        (Number::Integer(1), &args[..])
    } else {
        (first_num, &args[1..])
    };
    for node in divisors {
        let divisor = expect_number!(node, span);
        result = result.div(divisor).ok_or_else(|| {
            EvalError::InvalidArguments(format!("Division by zero: {} / 0", result), span)
        })?;
    }
    number(result, span)
}

pub fn prim_abs(args: Vec<Node>, span: Span) -> EvalResult {
    check_arity!(args, 1, span, "abs");
    number(expect_number!(&args[0], span).abs(), span)
}

fn prim_extreme(args: Vec<Node>, span: Span, name: &str, keep_new: fn(Number, Number) -> bool) -> EvalResult {
    check_arity!(args, min 1, span, name);
    let mut best = expect_number!(&args[0], span);
    for node in &args[1..] {
        let candidate = expect_number!(node, span);
        if keep_new(candidate, best) {
            best = candidate;
        }
    }
    number(best, span)
}

pub fn prim_max(args: Vec<Node>, span: Span) -> EvalResult {
    prim_extreme(args, span, "max", |candidate, best| candidate > best)
}

pub fn prim_min(args: Vec<Node>, span: Span) -> EvalResult {
    prim_extreme(args, span, "min", |candidate, best| candidate < best)
}

pub fn prim_round(args: Vec<Node>, span: Span) -> EvalResult {
    check_arity!(args, 1, span, "round");
    number(expect_number!(&args[0], span).round(), span)
}

pub fn prim_floor(args: Vec<Node>, span: Span) -> EvalResult {
    check_arity!(args, 1, span, "floor");
    number(expect_number!(&args[0], span).floor(), span)
}

pub fn prim_ceiling(args: Vec<Node>, span: Span) -> EvalResult {
    check_arity!(args, 1, span, "ceiling");
    number(expect_number!(&args[0], span).ceil(), span)
}

pub fn prim_expt(args: Vec<Node>, span: Span) -> EvalResult {
    check_arity!(args, 2, span, "expt");
    let base = expect_number!(&args[0], span);
    let exponent = expect_number!(&args[1], span);
    number(base.pow(exponent), span)
}

// Unary float functions (sqrt, exp, ...) share one shape
fn prim_float_fn(args: Vec<Node>, span: Span, name: &str, func: fn(f64) -> f64) -> EvalResult {
    check_arity!(args, 1, span, name);
    let x = expect_number!(&args[0], span).as_f64();
    number(Number::Float(func(x)), span)
}

pub fn prim_sqrt(args: Vec<Node>, span: Span) -> EvalResult {
    prim_float_fn(args, span, "sqrt", f64::sqrt)
}

pub fn prim_exp(args: Vec<Node>, span: Span) -> EvalResult {
    prim_float_fn(args, span, "exp", f64::exp)
}

pub fn prim_log(args: Vec<Node>, span: Span) -> EvalResult {
    prim_float_fn(args, span, "log", f64::ln)
}

pub fn prim_sin(args: Vec<Node>, span: Span) -> EvalResult {
    prim_float_fn(args, span, "sin", f64::sin)
}

pub fn prim_cos(args: Vec<Node>, span: Span) -> EvalResult {
    prim_float_fn(args, span, "cos", f64::cos)
}

pub fn prim_tan(args: Vec<Node>, span: Span) -> EvalResult {
    prim_float_fn(args, span, "tan", f64::tan)
}

// --- Comparisons ---

fn prim_all_numbers(
    args: Vec<Node>,
    span: Span,
    compare: fn(&Number, &Number) -> bool,
    operator: &str,
) -> EvalResult {
    // (= n1 n2 ...) -> boolean
    check_arity!(args, min 2, span, operator);
    let mut last_val = expect_number!(&args[0], span);
    let mut result = true;
    for arg in &args[1..] {
        let val = expect_number!(arg, span);
        result = result && compare(&last_val, &val);
        last_val = val;
    }
    boolean(result, span)
}

pub fn prim_equals(args: Vec<Node>, span: Span) -> EvalResult {
    prim_all_numbers(args, span, Number::eq, "=")
}

pub fn prim_less_than(args: Vec<Node>, span: Span) -> EvalResult {
    prim_all_numbers(args, span, Number::lt, "<")
}

pub fn prim_less_than_or_equals(args: Vec<Node>, span: Span) -> EvalResult {
    prim_all_numbers(args, span, Number::le, "<=")
}

pub fn prim_greater_than(args: Vec<Node>, span: Span) -> EvalResult {
    prim_all_numbers(args, span, Number::gt, ">")
}

pub fn prim_greater_than_or_equals(args: Vec<Node>, span: Span) -> EvalResult {
    prim_all_numbers(args, span, Number::ge, ">=")
}

// --- List Primitives ---

pub fn prim_car(args: Vec<Node>, span: Span) -> EvalResult {
    // (car list) -> first item
    check_arity!(args, 1, span, "car");
    match expect_list!(&args[0], span).first() {
        Some(first) => Ok(first.clone()),
        None => Err(EvalError::InvalidArguments(
            "car: Cannot take car of empty list".to_string(),
            span,
        )),
    }
}

pub fn prim_cdr(args: Vec<Node>, span: Span) -> EvalResult {
    // (cdr list) -> rest of list; the rest of () is ()
    check_arity!(args, 1, span, "cdr");
    let elements = expect_list!(&args[0], span);
    let rest: Rc<[Node]> = elements.get(1..).unwrap_or(&[]).into();
    Ok(Node::new(Sexpr::List(rest), span))
}

pub fn prim_cons(args: Vec<Node>, span: Span) -> EvalResult {
    // (cons item list) -> (item . list) as a fresh list
    check_arity!(args, 2, span, "cons");
    let tail = expect_list!(&args[1], span);
    let mut elements = Vec::with_capacity(tail.len() + 1);
    elements.push(args[0].clone());
    elements.extend(tail.iter().cloned());
    Ok(Node::new_list(elements, span))
}

pub fn prim_list(args: Vec<Node>, span: Span) -> EvalResult {
    // (list item1 item2 ...) -> new list containing items
    Ok(Node::new_list(args, span))
}

pub fn prim_length(args: Vec<Node>, span: Span) -> EvalResult {
    check_arity!(args, 1, span, "length");
    let len = expect_list!(&args[0], span).len();
    // A list can never outgrow i64
    number(Number::Integer(len as i64), span)
}

pub fn prim_append(args: Vec<Node>, span: Span) -> EvalResult {
    // (append list...) -> fresh concatenation
    let mut elements = Vec::new();
    for arg in &args {
        elements.extend(expect_list!(arg, span).iter().cloned());
    }
    Ok(Node::new_list(elements, span))
}

// --- Equality and Type Predicates ---

pub fn prim_is_equal(args: Vec<Node>, span: Span) -> EvalResult {
    check_arity!(args, 2, span, "equal?");
    boolean(args[0] == args[1], span)
}

pub fn prim_is_eq(args: Vec<Node>, span: Span) -> EvalResult {
    check_arity!(args, 2, span, "eq?");
    boolean(args[0].kind.is_identical(&args[1].kind), span)
}

macro_rules! is_type {
    ($args:expr, $type:pat, $name:expr, $span:expr) => {{
        check_arity!($args, 1, $span, $name);
        boolean(matches!($args[0].kind, $type), $span)
    }};
}

pub fn prim_is_null(args: Vec<Node>, span: Span) -> EvalResult {
    check_arity!(args, 1, span, "null?");
    boolean(args[0].kind.is_nil(), span)
}

pub fn prim_is_list(args: Vec<Node>, span: Span) -> EvalResult {
    is_type!(args, Sexpr::List(_), "list?", span)
}

pub fn prim_is_number(args: Vec<Node>, span: Span) -> EvalResult {
    is_type!(args, Sexpr::Number(_), "number?", span)
}

pub fn prim_is_symbol(args: Vec<Node>, span: Span) -> EvalResult {
    is_type!(args, Sexpr::Symbol(_), "symbol?", span)
}

pub fn prim_is_boolean(args: Vec<Node>, span: Span) -> EvalResult {
    is_type!(args, Sexpr::Boolean(_), "boolean?", span)
}

pub fn prim_is_procedure(args: Vec<Node>, span: Span) -> EvalResult {
    is_type!(args, Sexpr::Procedure(_), "procedure?", span)
}

pub fn prim_not(args: Vec<Node>, span: Span) -> EvalResult {
    check_arity!(args, 1, span, "not");
    boolean(!args[0].kind.is_truthy(), span)
}

// --- Control ---

pub fn prim_begin(mut args: Vec<Node>, span: Span) -> EvalResult {
    // Arguments are already evaluated in order; the last one is the result
    match args.pop() {
        Some(last) => Ok(last),
        None => Err(EvalError::InvalidArguments(
            "Primitive 'begin' expects at least 1 arguments, got 0".to_string(),
            span,
        )),
    }
}

pub fn prim_apply(args: Vec<Node>, span: Span) -> EvalResult {
    // (apply f (a b c)) -> (f a b c)
    check_arity!(args, 2, span, "apply");
    let procedure = expect_procedure(&args[0], span)?;
    let call_args = expect_list!(&args[1], span).to_vec();
    apply_procedure(procedure, call_args, span)
}

pub fn prim_map(args: Vec<Node>, span: Span) -> EvalResult {
    // (map f (1 2) (3 4)) -> ((f 1 3) (f 2 4)); stops at the shortest list
    check_arity!(args, min 2, span, "map");
    let procedure = expect_procedure(&args[0], span)?;
    let mut lists = Vec::with_capacity(args.len() - 1);
    for arg in &args[1..] {
        lists.push(expect_list!(arg, span));
    }
    let shortest = lists.iter().map(|list| list.len()).min().unwrap_or(0);

    let mut results = Vec::with_capacity(shortest);
    for index in 0..shortest {
        let call_args = lists.iter().map(|list| list[index].clone()).collect();
        results.push(apply_procedure(procedure, call_args, span)?);
    }
    Ok(Node::new_list(results, span))
}
