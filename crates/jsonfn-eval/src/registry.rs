//! Registry — loaded definitions, the builtin table and compiled functions.
//!
//! Definitions are validated once at load time and never change afterwards.
//! Compiling a definition binds it to a [`Context`] and caches the result
//! under the function's name; a later compile of the same name replaces the
//! cached entry, so closures are specialized per compile, never per call.

use crate::builtins::Builtins;
use crate::config::RegistryConfig;
use crate::context::Context;
use crate::evaluator::{Evaluator, Flow};
use crate::scope::Scope;
use jsonfn_types::ast::{self, Expr, FunctionDef, Param, Stmt, FUNCTION_MARKER};
use jsonfn_types::{EvalError, EvalResult, NativeFn, Value};
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;

/// Name used in errors about the document as a whole.
const DOCUMENT: &str = "(document)";

/// A definition bound to the context it was compiled with.
pub(crate) struct Compiled {
    def: Rc<FunctionDef>,
    context: Rc<Context>,
}

/// State shared between a [`Registry`] and every [`Function`] it hands out.
pub(crate) struct RegistryState {
    pub(crate) config: RegistryConfig,
    /// Insertion order; re-loading a name replaces it in place.
    definitions: RefCell<Vec<Rc<FunctionDef>>>,
    builtins: RefCell<Builtins>,
    compiled: RefCell<HashMap<String, Rc<Compiled>>>,
    /// Invocations currently on the stack, across every entry point.
    depth: Cell<usize>,
}

impl RegistryState {
    pub(crate) fn builtin(&self, name: &str) -> Option<NativeFn> {
        self.builtins.borrow().get(name).cloned()
    }

    pub(crate) fn cached(&self, name: &str) -> Option<Rc<Compiled>> {
        self.compiled.borrow().get(name).cloned()
    }

    fn definition(&self, name: &str) -> Option<Rc<FunctionDef>> {
        self.definitions
            .borrow()
            .iter()
            .find(|def| def.name == name)
            .cloned()
    }

    /// Bind a loaded definition to `context` and cache it.
    fn bind(&self, def: Rc<FunctionDef>, context: Rc<Context>) -> Rc<Compiled> {
        let compiled = Rc::new(Compiled { def, context });
        self.compiled
            .borrow_mut()
            .insert(compiled.def.name.clone(), Rc::clone(&compiled));
        compiled
    }

    /// Compile `name` against the caller's context, if it was ever loaded.
    pub(crate) fn compile_lazily(&self, name: &str, context: &Context) -> Option<Rc<Compiled>> {
        let def = self.definition(name)?;
        Some(self.bind(def, Rc::new(context.clone())))
    }
}

// ══════════════════════════════════════════════════════════════════════════════
// Registry
// ══════════════════════════════════════════════════════════════════════════════

/// Loads function definitions and compiles them into callable [`Function`]s.
///
/// Single-threaded: functions share the registry's state through `Rc`, so
/// neither the registry nor its functions are `Send`. Load everything first,
/// then run; `load` and `add_builtin` take `&mut self` for that reason.
pub struct Registry {
    state: Rc<RegistryState>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// A registry with the standard builtins and default limits.
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            state: Rc::new(RegistryState {
                config,
                definitions: RefCell::new(Vec::new()),
                builtins: RefCell::new(Builtins::standard()),
                compiled: RefCell::new(HashMap::new()),
                depth: Cell::new(0),
            }),
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.state.config
    }

    // ══════════════════════════════════════════════════════════════════════
    // Loading
    // ══════════════════════════════════════════════════════════════════════

    /// Validate and store every definition in `document`, a JSON object
    /// mapping function names to definitions.
    ///
    /// Either every entry loads or none does. Re-loading a name replaces
    /// its definition and drops its compiled closure.
    pub fn load(&mut self, document: &serde_json::Value) -> EvalResult<()> {
        let entries = document.as_object().ok_or_else(|| {
            invalid(DOCUMENT, "expected an object mapping names to definitions")
        })?;

        let mut parsed = Vec::with_capacity(entries.len());
        for (name, entry) in entries {
            parsed.push(parse_definition(name, entry)?);
        }

        let mut definitions = self.state.definitions.borrow_mut();
        let mut compiled = self.state.compiled.borrow_mut();
        for def in parsed {
            tracing::debug!(
                function = %def.name,
                params = ?def.params,
                statements = def.body.len(),
                "loaded definition"
            );
            compiled.remove(&def.name);
            let def = Rc::new(def);
            match definitions.iter_mut().find(|d| d.name == def.name) {
                Some(slot) => *slot = def,
                None => definitions.push(def),
            }
        }
        Ok(())
    }

    /// Parse `text` as JSON and [`load`](Self::load) it.
    pub fn load_str(&mut self, text: &str) -> EvalResult<()> {
        let document: serde_json::Value =
            serde_json::from_str(text).map_err(|e| invalid(DOCUMENT, e.to_string()))?;
        self.load(&document)
    }

    // ══════════════════════════════════════════════════════════════════════
    // Compilation
    // ══════════════════════════════════════════════════════════════════════

    /// Bind `name` to `context` (or an empty one) and cache the result,
    /// replacing any function previously compiled under that name.
    pub fn compile(&self, name: &str, context: Option<Context>) -> EvalResult<Function> {
        let def = self
            .state
            .definition(name)
            .ok_or_else(|| EvalError::FunctionNotFound(name.to_string()))?;
        let compiled = self.state.bind(def, Rc::new(context.unwrap_or_default()));
        Ok(Function::bind(compiled, &self.state))
    }

    /// Compile every loaded definition against one shared context.
    pub fn compile_all(&self, context: Option<Context>) -> EvalResult<BTreeMap<String, Function>> {
        let context = Rc::new(context.unwrap_or_default());
        let definitions = self.state.definitions.borrow().clone();
        Ok(definitions
            .into_iter()
            .map(|def| {
                let name = def.name.clone();
                let compiled = self.state.bind(def, Rc::clone(&context));
                (name, Function::bind(compiled, &self.state))
            })
            .collect())
    }

    /// A previously compiled function. Never compiles.
    pub fn get(&self, name: &str) -> Option<Function> {
        self.state
            .cached(name)
            .map(|compiled| Function::bind(compiled, &self.state))
    }

    /// Name, description and parameter names of every loaded definition,
    /// in load order.
    pub fn list_functions(&self) -> Vec<FunctionInfo> {
        self.state
            .definitions
            .borrow()
            .iter()
            .map(|def| FunctionInfo {
                name: def.name.clone(),
                description: def.description.clone(),
                params: def.params.clone(),
            })
            .collect()
    }

    /// Add or replace an entry in the registry's builtin table. Visible to
    /// every function immediately, including ones already compiled.
    pub fn add_builtin(
        &mut self,
        name: impl Into<String>,
        f: impl Fn(&[Value]) -> EvalResult<Value> + 'static,
    ) {
        self.state.builtins.borrow_mut().insert(name, NativeFn::new(f));
    }

    pub fn builtin_names(&self) -> Vec<String> {
        self.state
            .builtins
            .borrow()
            .names()
            .into_iter()
            .map(String::from)
            .collect()
    }

    // ══════════════════════════════════════════════════════════════════════
    // Direct evaluation (host / testing)
    // ══════════════════════════════════════════════════════════════════════

    /// Evaluate one expression against a host-owned scope.
    pub fn evaluate(&self, expr: &Expr, scope: &Scope, context: &Context) -> EvalResult<Value> {
        Evaluator::new(&self.state, context).eval_expr(expr, scope)
    }

    /// Execute a statement list against a host-owned scope.
    pub fn execute(&self, stmts: &[Stmt], scope: &mut Scope, context: &Context) -> EvalResult<Flow> {
        Evaluator::new(&self.state, context).exec_block(stmts, scope)
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let definitions: Vec<String> = self
            .state
            .definitions
            .borrow()
            .iter()
            .map(|def| def.name.clone())
            .collect();
        let mut compiled: Vec<String> = self.state.compiled.borrow().keys().cloned().collect();
        compiled.sort();
        f.debug_struct("Registry")
            .field("config", &self.state.config)
            .field("definitions", &definitions)
            .field("compiled", &compiled)
            .finish()
    }
}

/// Summary of a loaded definition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionInfo {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub params: Vec<String>,
}

// ══════════════════════════════════════════════════════════════════════════════
// Definition validation
// ══════════════════════════════════════════════════════════════════════════════

fn invalid(name: &str, reason: impl Into<String>) -> EvalError {
    EvalError::InvalidDefinition {
        name: name.to_string(),
        reason: reason.into(),
    }
}

/// Shape errors in the envelope are `InvalidDefinition`; malformed
/// statement or expression nodes are `UnknownNodeShape`.
fn parse_definition(name: &str, entry: &serde_json::Value) -> EvalResult<FunctionDef> {
    let entry = entry
        .as_object()
        .ok_or_else(|| invalid(name, "definition must be an object"))?;

    match entry.get("type").and_then(serde_json::Value::as_str) {
        Some(FUNCTION_MARKER) => {}
        Some(other) => {
            return Err(invalid(
                name,
                format!("expected type \"{FUNCTION_MARKER}\", got \"{other}\""),
            ))
        }
        None => return Err(invalid(name, format!("missing type \"{FUNCTION_MARKER}\""))),
    }

    let config = entry
        .get("config")
        .and_then(serde_json::Value::as_object)
        .ok_or_else(|| invalid(name, "missing config object"))?;
    let params = config
        .get("params")
        .and_then(serde_json::Value::as_array)
        .ok_or_else(|| invalid(name, "config.params must be an array"))?;
    let body = config
        .get("body")
        .filter(|body| body.is_array())
        .ok_or_else(|| invalid(name, "config.body must be an array"))?;

    let params = params
        .iter()
        .map(|param| {
            Param::deserialize(param)
                .map(|p| p.name().to_string())
                .map_err(|e| invalid(name, format!("bad parameter {param}: {e}")))
        })
        .collect::<EvalResult<Vec<_>>>()?;

    let body = ast::parse_block(body).map_err(|e| node_shape(name, "body", e))?;
    let ret = match config.get("return") {
        None | Some(serde_json::Value::Null) => None,
        Some(node) => Some(ast::parse_expr(node).map_err(|e| node_shape(name, "return", e))?),
    };

    Ok(FunctionDef {
        name: name.to_string(),
        description: config
            .get("description")
            .and_then(serde_json::Value::as_str)
            .map(String::from),
        params,
        body,
        ret,
        debug: config
            .get("debug")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false),
    })
}

fn node_shape(name: &str, slot: &str, err: serde_json::Error) -> EvalError {
    EvalError::UnknownNodeShape(format!("{name}.{slot}: {err}"))
}

// ══════════════════════════════════════════════════════════════════════════════
// Compiled functions
// ══════════════════════════════════════════════════════════════════════════════

/// A compiled, reusable function.
///
/// Every call gets a fresh [`Scope`] seeded from the bound context's
/// variables, then overwritten by the positional arguments. Extra arguments
/// are ignored and missing ones are `undefined`.
#[derive(Clone)]
pub struct Function {
    compiled: Rc<Compiled>,
    state: Rc<RegistryState>,
}

impl Function {
    pub(crate) fn bind(compiled: Rc<Compiled>, state: &Rc<RegistryState>) -> Self {
        Self {
            compiled,
            state: Rc::clone(state),
        }
    }

    pub fn name(&self) -> &str {
        &self.compiled.def.name
    }

    pub fn params(&self) -> &[String] {
        &self.compiled.def.params
    }

    pub fn description(&self) -> Option<&str> {
        self.compiled.def.description.as_deref()
    }

    pub fn context(&self) -> &Context {
        &self.compiled.context
    }

    pub fn call(&self, args: &[Value]) -> EvalResult<Value> {
        self.invoke(args)
    }

    /// Run the body one level deeper on the registry's shared call stack.
    ///
    /// Host calls, DSL calls and calls through an injected [`NativeFn`] all
    /// count against the same `max_call_depth`.
    #[tracing::instrument(
        level = "trace",
        skip_all,
        fields(function = %self.compiled.def.name, depth = tracing::field::Empty)
    )]
    pub(crate) fn invoke(&self, args: &[Value]) -> EvalResult<Value> {
        let frame = CallFrame::enter(&self.state.depth, self.state.config.max_call_depth)?;
        tracing::Span::current().record("depth", frame.depth());
        let Compiled { def, context } = &*self.compiled;

        let mut scope: Scope = context
            .variables
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        for (i, param) in def.params.iter().enumerate() {
            scope.define(param, args.get(i).cloned().unwrap_or_default());
        }

        if def.debug {
            tracing::debug!(function = %def.name, ?args, "call");
        }
        if let Some(hook) = &context.on_call {
            hook(def.name.as_str(), args);
        }

        let evaluator = Evaluator::new(&self.state, context);
        let result = match evaluator.exec_block(&def.body, &mut scope)? {
            Flow::Return(value) => value,
            Flow::Continue => match &def.ret {
                Some(expr) => evaluator.eval_expr(expr, &scope)?,
                None => Value::Undefined,
            },
        };

        if def.debug {
            tracing::debug!(function = %def.name, result = %result, "return");
        }
        if let Some(hook) = &context.on_return {
            hook(def.name.as_str(), &result);
        }
        Ok(result)
    }
}

/// One level on the shared call stack; leaving it on drop covers every
/// early return and error path.
struct CallFrame<'a> {
    depth: &'a Cell<usize>,
}

impl<'a> CallFrame<'a> {
    fn enter(depth: &'a Cell<usize>, limit: usize) -> EvalResult<Self> {
        let next = depth.get() + 1;
        if next > limit {
            return Err(EvalError::CallDepthExceeded { limit });
        }
        depth.set(next);
        Ok(Self { depth })
    }

    fn depth(&self) -> usize {
        self.depth.get()
    }
}

impl Drop for CallFrame<'_> {
    fn drop(&mut self) {
        self.depth.set(self.depth.get() - 1);
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.name())
            .field("params", &self.params())
            .finish()
    }
}

/// Lets a compiled function be injected as another context's function or
/// builtin.
impl From<Function> for NativeFn {
    fn from(function: Function) -> Self {
        NativeFn::new(move |args| function.call(args))
    }
}

impl From<Function> for Value {
    fn from(function: Function) -> Self {
        Value::Function(function.into())
    }
}
