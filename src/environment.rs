use crate::source::Span;
use crate::types::{Node, PrimitiveFunc};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::f64::consts;
use std::rc::Rc;
use thiserror::Error;

// --- Environment Error ---
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EnvError {
    #[error("Unbound variable: '{0}'")]
    UnboundVariable(String, Span), // Symbol name, span where lookup happened
}

// --- Environment Definition ---

/// One scope in the chain. The root has no `outer`; every other scope points
/// at exactly one enclosing scope.
#[derive(Debug, Default)]
pub struct Environment {
    // Use Rc<RefCell<...>> to allow shared ownership and interior mutability.
    // Needed for closures capturing environments and for 'set!'.
    outer: Option<Rc<RefCell<Environment>>>,
    bindings: HashMap<String, Node>, // Maps variable names to Nodes
}

impl Environment {
    /// Creates a new, top-level (global) environment.
    pub fn new() -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Environment::default()))
    }

    /// Creates a root environment holding the given primitive table.
    pub fn with_primitives(table: &[(&str, PrimitiveFunc)]) -> Rc<RefCell<Environment>> {
        let env_ptr = Environment::new();
        {
            // Borrow mutably only inside this scope
            let mut env = env_ptr.borrow_mut();
            for (name, func) in table {
                env.add_primitive(name, *func);
            }
        }
        env_ptr
    }

    /// Creates the standard root environment: every builtin primitive plus
    /// the `pi` and `e` constants.
    pub fn new_global_populated() -> Rc<RefCell<Environment>> {
        let env_ptr = Environment::with_primitives(crate::primitives::STANDARD_PRIMITIVES);
        {
            let mut env = env_ptr.borrow_mut();
            env.define("pi".to_string(), Node::new_number(consts::PI, Span::default()));
            env.define("e".to_string(), Node::new_number(consts::E, Span::default()));
        }
        env_ptr
    }

    /// Creates a new environment enclosed within an outer one.
    pub fn new_enclosed(outer_env: Rc<RefCell<Environment>>) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Environment {
            outer: Some(outer_env),
            bindings: HashMap::new(),
        }))
    }

    /// Creates an enclosed environment binding `params` to `args` by position.
    ///
    /// The lists are zipped: surplus arguments are dropped and parameters
    /// without an argument stay unbound. Callers that need an exact match
    /// check the counts first.
    pub fn new_with_bindings(
        params: &[String],
        args: Vec<Node>,
        outer_env: Rc<RefCell<Environment>>,
    ) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Environment {
            outer: Some(outer_env),
            bindings: params.iter().cloned().zip(args).collect(),
        }))
    }

    pub fn is_root(&self) -> bool {
        self.outer.is_none()
    }

    /// Defines a variable in the *current* environment frame.
    /// Replaces the value if the variable already exists in this frame.
    pub fn define(&mut self, name: String, value_node: Node) {
        self.bindings.insert(name, value_node);
    }

    /// Looks up a variable's value.
    /// Checks the current environment first, then walks up the outer environment chain.
    /// `lookup_span` is the location where the variable was referenced, used for error reporting.
    pub fn get(&self, name: &str, lookup_span: Span) -> Result<Node, EnvError> {
        if let Some(value_node) = self.bindings.get(name) {
            Ok(value_node.clone())
        } else {
            match &self.outer {
                Some(outer_env_ptr) => outer_env_ptr.borrow().get(name, lookup_span),
                // Reached the top-level environment without finding it
                None => Err(EnvError::UnboundVariable(name.to_string(), lookup_span)),
            }
        }
    }

    /// Sets the value of an *existing* variable in the environment chain.
    /// Searches outward from the current environment and updates the first frame
    /// where the variable is found. Errors if the variable is not defined.
    /// `set_span` is the location of the `set!` expression.
    pub fn set(&mut self, name: &str, value_node: Node, set_span: Span) -> Result<(), EnvError> {
        if let Some(value_mut) = self.bindings.get_mut(name) {
            *value_mut = value_node;
            Ok(())
        } else {
            match &self.outer {
                Some(outer_env_ptr) => outer_env_ptr.borrow_mut().set(name, value_node, set_span),
                None => Err(EnvError::UnboundVariable(name.to_string(), set_span)),
            }
        }
    }

    /// Helper to add a primitive procedure to the environment.
    fn add_primitive(&mut self, name: &str, func: PrimitiveFunc) {
        let node = Node::new_primitive(func, name, Span::default());
        self.define(name.to_string(), node);
    }

    fn add_identifiers(&self, identifiers: &mut HashSet<String>) {
        identifiers.extend(self.bindings.keys().cloned());
        if let Some(outer_env_ptr) = &self.outer {
            outer_env_ptr.borrow().add_identifiers(identifiers);
        }
    }

    /// Gets every identifier visible from this environment
    pub fn get_identifiers(&self) -> HashSet<String> {
        let mut identifiers = HashSet::new();
        self.add_identifiers(&mut identifiers);
        identifiers
    }
}
