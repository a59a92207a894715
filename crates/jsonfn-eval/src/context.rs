//! Caller-supplied execution context.

use jsonfn_types::{EvalResult, NativeFn, Value};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;

/// Invoked with `(function name, argument values)` before a body runs.
pub type CallHook = Rc<dyn Fn(&str, &[Value])>;
/// Invoked with `(function name, result)` after a body runs.
pub type ReturnHook = Rc<dyn Fn(&str, &Value)>;

/// Extra variables, functions, builtins and observability hooks injected
/// by the host.
///
/// A context is bound when a function is compiled, not when it is called.
/// The evaluator only reads it; hooks are the one thing it invokes.
#[derive(Clone, Default)]
pub struct Context {
    /// Seed the scope of every invocation; parameters shadow them.
    pub variables: BTreeMap<String, Value>,
    /// Reachable only from call nodes, after every other tier.
    pub functions: HashMap<String, NativeFn>,
    /// Take priority over the registry's builtin table.
    pub builtins: HashMap<String, NativeFn>,
    pub on_call: Option<CallHook>,
    pub on_return: Option<ReturnHook>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    pub fn with_function(
        mut self,
        name: impl Into<String>,
        f: impl Fn(&[Value]) -> EvalResult<Value> + 'static,
    ) -> Self {
        self.functions.insert(name.into(), NativeFn::new(f));
        self
    }

    pub fn with_native_function(mut self, name: impl Into<String>, f: NativeFn) -> Self {
        self.functions.insert(name.into(), f);
        self
    }

    pub fn with_builtin(
        mut self,
        name: impl Into<String>,
        f: impl Fn(&[Value]) -> EvalResult<Value> + 'static,
    ) -> Self {
        self.builtins.insert(name.into(), NativeFn::new(f));
        self
    }

    pub fn on_call(mut self, hook: impl Fn(&str, &[Value]) + 'static) -> Self {
        self.on_call = Some(Rc::new(hook));
        self
    }

    pub fn on_return(mut self, hook: impl Fn(&str, &Value) + 'static) -> Self {
        self.on_return = Some(Rc::new(hook));
        self
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut functions: Vec<_> = self.functions.keys().collect();
        functions.sort();
        let mut builtins: Vec<_> = self.builtins.keys().collect();
        builtins.sort();
        f.debug_struct("Context")
            .field("variables", &self.variables)
            .field("functions", &functions)
            .field("builtins", &builtins)
            .field("on_call", &self.on_call.is_some())
            .field("on_return", &self.on_return.is_some())
            .finish()
    }
}
