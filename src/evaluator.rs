use crate::environment::{EnvError, Environment};
use crate::source::Span;
use crate::types::{Node, Procedure, Sexpr};
use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;
use thiserror::Error;
use tracing::{debug, trace};

// --- Evaluation Error ---
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error(transparent)]
    EnvError(#[from] EnvError), // Errors from environment lookup
    #[error("Expected a procedure, but got: {0}")]
    NotAProcedure(Sexpr, Span), // Tried to call something that isn't a procedure
    #[error("Invalid arguments - {0}")]
    InvalidArguments(String, Span), // Wrong argument count or kind for a primitive
    #[error("Expected a symbol, but got: {0}")]
    NotASymbol(Sexpr, Span), // Expected a symbol (e.g., for define/set!)
    #[error("Invalid special form - {0}")]
    InvalidSpecialForm(String, Span), // Malformed special form (e.g., (if cond))
    #[error("Procedure expects {expected} arguments, got {found}")]
    ArityMismatch {
        expected: usize,
        found: usize,
        span: Span,
    },
    #[error("Type mismatch: expected {expected}, found {}", found.type_name())]
    TypeMismatch {
        expected: &'static str,
        found: Sexpr,
        span: Span,
    },
}

impl EvalError {
    pub fn span(&self) -> Span {
        match self {
            EvalError::EnvError(EnvError::UnboundVariable(_, span))
            | EvalError::NotAProcedure(_, span)
            | EvalError::InvalidArguments(_, span)
            | EvalError::NotASymbol(_, span)
            | EvalError::InvalidSpecialForm(_, span)
            | EvalError::ArityMismatch { span, .. }
            | EvalError::TypeMismatch { span, .. } => *span,
        }
    }
}

// Result type alias for convenience
pub type EvalResult<T = Node> = Result<T, EvalError>;

const SPECIAL_FORMS: [&str; 5] = ["quote", "if", "define", "set!", "lambda"];

/// The keywords handled by the evaluator rather than by procedure calls.
pub fn special_form_identifiers() -> HashSet<String> {
    SPECIAL_FORMS.iter().map(|s| s.to_string()).collect()
}

// --- Evaluate Function ---

/// Evaluates a given AST Node within the specified environment.
///
/// Evaluation is a plain recursive walk: every nested form, including calls
/// in tail position, uses a new Rust stack frame.
pub fn evaluate(node: Node, env: Rc<RefCell<Environment>>) -> EvalResult {
    match node.kind {
        // 1. Symbols: Look up in the environment
        Sexpr::Symbol(ref name) => {
            let value = env.borrow().get(name, node.span)?;
            Ok(value)
        }

        // 2. Lists: special forms or procedure calls
        Sexpr::List(ref elements) => match &elements[..] {
            // The empty list is the nil value and evaluates to itself
            [] => Ok(node.clone()),
            [first, rest @ ..] => match &first.kind {
                Sexpr::Symbol(sym_name) if sym_name == "quote" => evaluate_quote(rest, node.span),
                Sexpr::Symbol(sym_name) if sym_name == "if" => evaluate_if(rest, env, node.span),
                Sexpr::Symbol(sym_name) if sym_name == "define" => {
                    evaluate_define(rest, env, node.span)
                }
                Sexpr::Symbol(sym_name) if sym_name == "set!" => evaluate_set(rest, env, node.span),
                Sexpr::Symbol(sym_name) if sym_name == "lambda" => {
                    evaluate_lambda(rest, env, node.span)
                }
                _ => evaluate_procedure(first, rest, env, node.span),
            },
        },

        // 3. Self-evaluating atoms: Numbers, Booleans, Void, Procedures
        Sexpr::Number(_) | Sexpr::Boolean(_) | Sexpr::Void | Sexpr::Procedure(_) => Ok(node),
    }
}

fn evaluate_procedure(
    operator: &Node,
    operands: &[Node],
    env: Rc<RefCell<Environment>>,
    span: Span,
) -> EvalResult {
    // 1. Evaluate the operator
    let operator_result_node = evaluate(operator.clone(), env.clone())?;

    // 2. Evaluate the operands, left to right
    let mut evaluated_args: Vec<Node> = Vec::with_capacity(operands.len());
    for operand_node in operands {
        evaluated_args.push(evaluate(operand_node.clone(), env.clone())?);
    }

    // 3. Apply it, if it is a procedure
    match operator_result_node.kind {
        Sexpr::Procedure(ref procedure) => apply_procedure(procedure, evaluated_args, span),
        other => Err(EvalError::NotAProcedure(other, operator.span)),
    }
}

/// Applies a procedure to already evaluated arguments.
///
/// Primitives receive the arguments directly. A lambda gets a fresh
/// environment for this call only, enclosed by the environment it captured,
/// and its body is evaluated there.
pub fn apply_procedure(procedure: &Procedure, args: Vec<Node>, span: Span) -> EvalResult {
    match procedure {
        Procedure::Primitive(func, name) => {
            trace!(primitive = %name, args = args.len(), "apply");
            func(args, span)
        }
        Procedure::Lambda(lambda) => {
            if args.len() != lambda.params.len() {
                return Err(EvalError::ArityMismatch {
                    expected: lambda.params.len(),
                    found: args.len(),
                    span,
                });
            }
            trace!(params = ?lambda.params, "apply lambda");
            let call_env = Environment::new_with_bindings(&lambda.params, args, lambda.env.clone());
            evaluate(lambda.body.clone(), call_env)
        }
    }
}

fn evaluate_quote(operands: &[Node], span: Span) -> EvalResult {
    if let [node] = operands {
        // Quote returns the operand unevaluated.
        Ok(node.clone())
    } else {
        Err(EvalError::InvalidSpecialForm(
            "quote expects exactly one argument".to_string(),
            span, // Use the span of the whole (quote ...) form
        ))
    }
}

fn evaluate_if(operands: &[Node], env: Rc<RefCell<Environment>>, span: Span) -> EvalResult {
    if let [condition, consequent, alternate] = operands {
        let condition_result = evaluate(condition.clone(), env.clone())?;

        // Only the selected branch is evaluated
        if condition_result.kind.is_truthy() {
            evaluate(consequent.clone(), env)
        } else {
            evaluate(alternate.clone(), env)
        }
    } else {
        Err(EvalError::InvalidSpecialForm(
            "if expects a condition, a consequent and an alternate".to_string(),
            span, // Span of the whole (if ...) form
        ))
    }
}

// Reads the target of a define or set! form.
fn expect_symbol(node: &Node) -> EvalResult<&str> {
    match &node.kind {
        Sexpr::Symbol(name) => Ok(name),
        other => Err(EvalError::NotASymbol(other.clone(), node.span)),
    }
}

fn evaluate_define(operands: &[Node], env: Rc<RefCell<Environment>>, span: Span) -> EvalResult {
    if let [target, value_expr] = operands {
        let name = expect_symbol(target)?;
        let value = evaluate(value_expr.clone(), env.clone())?;
        debug!(name, value = %value, "define");
        env.borrow_mut().define(name.to_string(), value);
        Ok(Node::new_void(span))
    } else {
        Err(EvalError::InvalidSpecialForm(
            "define expects a name and a value".to_string(),
            span,
        ))
    }
}

fn evaluate_set(operands: &[Node], env: Rc<RefCell<Environment>>, span: Span) -> EvalResult {
    if let [target, value_expr] = operands {
        let name = expect_symbol(target)?;
        let value = evaluate(value_expr.clone(), env.clone())?;
        debug!(name, value = %value, "set!");
        env.borrow_mut().set(name, value, target.span)?;
        Ok(Node::new_void(span))
    } else {
        Err(EvalError::InvalidSpecialForm(
            "set! expects a name and a value".to_string(),
            span,
        ))
    }
}

fn evaluate_lambda(operands: &[Node], env: Rc<RefCell<Environment>>, span: Span) -> EvalResult {
    let [params_node, body] = operands else {
        return Err(EvalError::InvalidSpecialForm(
            "lambda expects a parameter list and a single body expression".to_string(),
            span,
        ));
    };
    let Sexpr::List(param_nodes) = &params_node.kind else {
        return Err(EvalError::InvalidSpecialForm(
            format!("lambda parameters must be a list, got {}", params_node.kind.type_name()),
            params_node.span,
        ));
    };

    let mut params: Vec<String> = Vec::with_capacity(param_nodes.len());
    for param in param_nodes.iter() {
        let name = expect_symbol(param)?;
        if params.iter().any(|p| p == name) {
            return Err(EvalError::InvalidSpecialForm(
                format!("duplicate lambda parameter '{}'", name),
                param.span,
            ));
        }
        params.push(name.to_string());
    }

    trace!(params = ?params, "lambda");
    // Capture the live environment, not a copy, so later set! calls are seen
    Ok(Node::new_lambda(params, body.clone(), env, span))
}

// --- Unit Tests ---
#[cfg(test)]
mod tests {
    use super::*;
    use crate::number::Number;
    use crate::parser::parse_str; // Use parser to create AST nodes easily

    fn int(n: i64) -> Sexpr {
        Sexpr::Number(Number::Integer(n))
    }

    fn eval_in(input: &str, env: &Rc<RefCell<Environment>>) -> EvalResult {
        match parse_str(input) {
            Ok(node) => evaluate(node, env.clone()),
            Err(e) => panic!("Parsing failed for input '{}': {}", input, e),
        }
    }

    // Helper to evaluate input string and check result kind (ignores span)
    fn assert_eval_kind(input: &str, expected_kind: Sexpr, env: Option<Rc<RefCell<Environment>>>) {
        let env = env.unwrap_or_else(Environment::new_global_populated); // Use provided env or create new global one
        match eval_in(input, &env) {
            Ok(result_node) => assert_eq!(result_node.kind, expected_kind, "Input: '{}'", input),
            Err(e) => panic!("Evaluation failed for input '{}': {}", input, e),
        }
    }

    // Helper to assert evaluation errors
    fn assert_eval_error(
        input: &str,
        expected_error_variant: &EvalError,
        env: Option<Rc<RefCell<Environment>>>,
    ) {
        let env = env.unwrap_or_else(Environment::new_global_populated);
        match eval_in(input, &env) {
            Ok(result) => panic!(
                "Expected evaluation to fail for input '{}', but got: {:?}",
                input, result
            ),
            Err(e) => assert_eq!(
                std::mem::discriminant(&e),
                std::mem::discriminant(expected_error_variant),
                "Input: '{}', Expected error variant like {:?}, got: {:?}",
                input,
                expected_error_variant,
                e
            ),
        }
    }

    fn unbound() -> EvalError {
        EvalError::EnvError(EnvError::UnboundVariable("".into(), Span::default()))
    }

    fn invalid_form() -> EvalError {
        EvalError::InvalidSpecialForm("".into(), Span::default())
    }

    #[test]
    fn test_eval_self_evaluating() {
        assert_eval_kind("123", int(123), None);
        assert_eval_kind("-4.5", Sexpr::Number(Number::Float(-4.5)), None);
        assert_eval_kind("#t", Sexpr::Boolean(true), None);
        assert_eval_kind("#f", Sexpr::Boolean(false), None);
        assert_eval_kind("()", Node::new_nil(Span::default()).kind, None);
    }

    #[test]
    fn test_eval_symbol_lookup_ok() {
        let env = Environment::new();
        env.borrow_mut()
            .define("x".to_string(), Node::new_number(100i64, Span::default()));
        assert_eval_kind("x", int(100), Some(env));
    }

    #[test]
    fn test_eval_symbol_lookup_unbound() {
        let env = Environment::new(); // Empty env
        assert_eval_error("y", &unbound(), Some(env));
    }

    #[test]
    fn test_unbound_error_points_at_symbol() {
        let env = Environment::new_global_populated();
        let err = eval_in("(+ 1 missing)", &env).unwrap_err();
        assert_eq!(
            err,
            EvalError::EnvError(EnvError::UnboundVariable(
                "missing".to_string(),
                Span::new(5, 12)
            ))
        );
        assert_eq!(err.span(), Span::new(5, 12));
    }

    #[test]
    fn test_eval_quote() {
        assert_eval_kind("(quote 1)", int(1), None);
        assert_eval_kind("(quote a)", Sexpr::Symbol("a".to_string()), None);
        assert_eval_kind("(quote #t)", Sexpr::Boolean(true), None);

        let env = Environment::new();
        let quoted = eval_in("(quote (+ 1 undefined))", &env).expect("quote never evaluates");
        assert_eq!(quoted, parse_str("(+ 1 undefined)").expect("should parse"));

        assert_eval_error("(quote a b)", &invalid_form(), None);
        assert_eval_error("(quote)", &invalid_form(), None);
    }

    #[test]
    fn test_eval_if() {
        assert_eval_kind("(if #t 1 2)", int(1), None);
        assert_eval_kind("(if #f 1 2)", int(2), None);
        assert_eval_kind("(if 0 1 2)", int(1), None); // 0 is true
        assert_eval_kind("(if () 1 2)", int(1), None); // () is true
        assert_eval_kind("(if (quote x) 1 2)", int(1), None);
        assert_eval_kind("(if (< 1 2) (quote yes) (quote no))", Sexpr::Symbol("yes".into()), None);
    }

    #[test]
    fn test_eval_if_nested() {
        let env = Environment::new();
        env.borrow_mut()
            .define("x".to_string(), Node::new_bool(true, Span::default()));
        env.borrow_mut()
            .define("y".to_string(), Node::new_bool(false, Span::default()));

        assert_eval_kind("(if x 1 (if y 2 3))", int(1), Some(env.clone()));
        assert_eval_kind("(if y 1 (if x 2 3))", int(2), Some(env));
    }

    #[test]
    fn test_eval_if_does_not_evaluate_unused_branch() {
        // An unbound variable in the unused branch must not raise
        let env = Environment::new();
        assert_eval_kind(
            "(if #t (quote good) unbound-variable)",
            Sexpr::Symbol("good".to_string()),
            Some(env.clone()),
        );
        assert_eval_kind(
            "(if #f unbound-variable (quote good))",
            Sexpr::Symbol("good".to_string()),
            Some(env),
        );
    }

    #[test]
    fn test_eval_if_error_arity() {
        assert_eval_error("(if)", &invalid_form(), None);
        assert_eval_error("(if #t)", &invalid_form(), None);
        assert_eval_error("(if #t 1)", &invalid_form(), None); // No implicit else
        assert_eval_error("(if #t 1 2 3)", &invalid_form(), None);
    }

    #[test]
    fn test_eval_if_error_in_condition() {
        assert_eval_error("(if unbound 1 2)", &unbound(), None);
    }

    #[test]
    fn test_eval_define() {
        let env = Environment::new_global_populated();
        let result = eval_in("(define x (+ 1 2))", &env).expect("define should succeed");
        assert_eq!(result.kind, Sexpr::Void);
        assert_eval_kind("x", int(3), Some(env.clone()));

        // Redefinition overwrites
        eval_in("(define x 10)", &env).expect("define should succeed");
        assert_eval_kind("x", int(10), Some(env));
    }

    #[test]
    fn test_eval_define_errors() {
        let not_a_symbol = EvalError::NotASymbol(Sexpr::Void, Span::default());
        assert_eval_error("(define 1 2)", &not_a_symbol, None);
        assert_eval_error("(define x)", &invalid_form(), None);
        assert_eval_error("(define x 1 2)", &invalid_form(), None);
        assert_eval_error("(define x missing)", &unbound(), None);
    }

    #[test]
    fn test_eval_set() {
        let env = Environment::new_global_populated();
        eval_in("(define x 1)", &env).expect("define should succeed");
        let result = eval_in("(set! x (+ x 1))", &env).expect("set! should succeed");
        assert_eq!(result.kind, Sexpr::Void);
        assert_eval_kind("x", int(2), Some(env.clone()));

        assert_eval_error("(set! never-defined 1)", &unbound(), Some(env.clone()));
        // The failed set! did not create a binding
        assert_eval_error("never-defined", &unbound(), Some(env));
    }

    #[test]
    fn test_eval_lambda_creates_closure() {
        let env = Environment::new_global_populated();
        let result = eval_in("(lambda (x y) (+ x y))", &env).expect("lambda should succeed");
        match result.kind {
            Sexpr::Procedure(Procedure::Lambda(lambda)) => {
                assert_eq!(lambda.params, vec!["x".to_string(), "y".to_string()]);
                assert_eq!(lambda.body.to_string(), "(+ x y)");
                assert!(Rc::ptr_eq(&lambda.env, &env));
            }
            other => panic!("Expected a lambda, got {:?}", other),
        }
    }

    #[test]
    fn test_eval_lambda_errors() {
        assert_eval_error("(lambda (x))", &invalid_form(), None);
        assert_eval_error("(lambda (x) x x)", &invalid_form(), None);
        assert_eval_error("(lambda x x)", &invalid_form(), None);
        assert_eval_error("(lambda (x x) x)", &invalid_form(), None);
        assert_eval_error(
            "(lambda (x 1) x)",
            &EvalError::NotASymbol(Sexpr::Void, Span::default()),
            None,
        );
    }

    #[test]
    fn test_eval_lambda_application() {
        assert_eval_kind("((lambda (x) (* x x)) 7)", int(49), None);
        assert_eval_kind("((lambda () 42))", int(42), None);
        assert_eval_kind("((lambda (a b) (- a b)) 10 3)", int(7), None);
    }

    #[test]
    fn test_eval_lambda_arity_mismatch() {
        let arity = EvalError::ArityMismatch {
            expected: 0,
            found: 0,
            span: Span::default(),
        };
        assert_eval_error("((lambda (x) x))", &arity, None);
        assert_eval_error("((lambda (x) x) 1 2)", &arity, None);
    }

    #[test]
    fn test_closure_captures_defining_environment() {
        let env = Environment::new_global_populated();
        eval_in("(define add (lambda (x) (lambda (y) (+ x y))))", &env).expect("define");
        eval_in("(define add3 (add 3))", &env).expect("define");
        // The outer call has returned, the inner closure still sees x
        assert_eval_kind("(add3 4)", int(7), Some(env.clone()));
        assert_eval_kind("((add 10) 5)", int(15), Some(env));
    }

    #[test]
    fn test_shadowing_does_not_leak() {
        let env = Environment::new_global_populated();
        eval_in("(define x 1)", &env).expect("define");
        assert_eval_kind("((lambda (x) x) 2)", int(2), Some(env.clone()));
        assert_eval_kind("x", int(1), Some(env.clone()));
        // define inside a call binds in the call's own scope
        assert_eval_kind("((lambda (y) (begin (define x y) x)) 5)", int(5), Some(env.clone()));
        assert_eval_kind("x", int(1), Some(env));
    }

    #[test]
    fn test_set_in_closure_is_visible_outside() {
        let env = Environment::new_global_populated();
        eval_in("(define x 1)", &env).expect("define");
        eval_in("(define bump (lambda () (set! x (+ x 1))))", &env).expect("define");
        eval_in("(bump)", &env).expect("call");
        assert_eval_kind("x", int(2), Some(env.clone()));
        eval_in("(bump)", &env).expect("call");
        assert_eval_kind("x", int(3), Some(env));
    }

    #[test]
    fn test_sibling_closures_share_captured_environment() {
        let env = Environment::new_global_populated();
        eval_in(
            "(define make-counter (lambda (n) (list (lambda () (begin (set! n (+ n 1)) n)) (lambda () n))))",
            &env,
        )
        .expect("define");
        eval_in("(define counter (make-counter 0))", &env).expect("define");
        eval_in("(define inc (car counter))", &env).expect("define");
        eval_in("(define peek (car (cdr counter)))", &env).expect("define");

        assert_eval_kind("(inc)", int(1), Some(env.clone()));
        assert_eval_kind("(inc)", int(2), Some(env.clone()));
        assert_eval_kind("(peek)", int(2), Some(env.clone()));

        // A second counter gets its own captured scope
        eval_in("(define other (make-counter 100))", &env).expect("define");
        assert_eval_kind("((car other))", int(101), Some(env.clone()));
        assert_eval_kind("(peek)", int(2), Some(env));
    }

    #[test]
    fn test_recursive_calls_are_isolated() {
        let env = Environment::new_global_populated();
        eval_in(
            "(define fact (lambda (n) (if (<= n 1) 1 (* n (fact (- n 1))))))",
            &env,
        )
        .expect("define");
        assert_eval_kind("(fact 5)", int(120), Some(env.clone()));
        assert_eval_kind("(fact 20)", int(2432902008176640000), Some(env.clone()));

        // Each call sees its own n after the nested call returns
        eval_in(
            "(define sum-to (lambda (n) (if (= n 0) 0 (+ (sum-to (- n 1)) n))))",
            &env,
        )
        .expect("define");
        assert_eval_kind("(sum-to 10)", int(55), Some(env));
    }

    #[test]
    fn test_operands_evaluated_before_callable_check() {
        // The unbound operand is reported, not the non-procedure operator
        assert_eval_error("(1 missing)", &unbound(), None);
    }

    #[test]
    fn test_eval_not_procedure_error() {
        let not_proc_error = EvalError::NotAProcedure(Sexpr::Void, Span::default());
        assert_eval_error("(1 2 3)", &not_proc_error, None);
        assert_eval_error("(#t)", &not_proc_error, None);
        assert_eval_error("((list 1 2) 3)", &not_proc_error, None);
        assert_eval_error("((quote f) 3)", &not_proc_error, None);

        let env = Environment::new_global_populated();
        let err = eval_in("(1 2)", &env).unwrap_err();
        assert_eq!(err, EvalError::NotAProcedure(int(1), Span::new(1, 2)));
    }

    #[test]
    fn test_errors_propagate_from_nested_calls() {
        let env = Environment::new_global_populated();
        eval_in("(define f (lambda (x) (+ x missing)))", &env).expect("define");
        assert_eval_error("(f 1)", &unbound(), Some(env.clone()));
        assert_eval_error(
            "(f (car ()))",
            &EvalError::InvalidArguments("".into(), Span::default()),
            Some(env),
        );
    }

    #[test]
    fn test_special_form_identifiers() {
        let ids = special_form_identifiers();
        assert_eq!(ids.len(), 5);
        assert!(ids.contains("set!"));
        assert!(ids.contains("lambda"));
    }

    #[test]
    fn test_error_display() {
        let env = Environment::new_global_populated();
        assert_eq!(
            eval_in("nope", &env).unwrap_err().to_string(),
            "Unbound variable: 'nope'"
        );
        assert_eq!(
            eval_in("(5)", &env).unwrap_err().to_string(),
            "Expected a procedure, but got: 5"
        );
        assert_eq!(
            eval_in("((lambda (x) x))", &env).unwrap_err().to_string(),
            "Procedure expects 1 arguments, got 0"
        );
    }
}
