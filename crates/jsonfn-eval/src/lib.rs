//! jsonfn tree-walking evaluator.
//!
//! Turns JSON function definitions into reusable, context-bound closures.
//! A host loads a document into a [`Registry`], compiles functions by name
//! (optionally with a [`Context`] of extra variables, functions, builtins
//! and hooks), and calls the resulting [`Function`]s with positional
//! arguments.
//!
//! ```
//! # use jsonfn_eval::{Registry, Value};
//! # fn main() -> Result<(), jsonfn_eval::EvalError> {
//! let mut registry = Registry::new();
//! registry.load(&serde_json::json!({
//!     "add": {
//!         "type": "function",
//!         "config": {
//!             "params": ["left", "right"],
//!             "body": [],
//!             "return": { "binary": { "op": "+", "left": "left", "right": "right" } }
//!         }
//!     }
//! }))?;
//! let add = registry.compile("add", None)?;
//! assert_eq!(add.call(&[Value::from(2), Value::from(3)])?, Value::from(5));
//! # Ok(())
//! # }
//! ```
//!
//! Programs can only reach the host through builtins, context functions and
//! the method whitelist in [`ALLOWED_METHODS`].

mod builtins;
mod config;
mod context;
mod evaluator;
mod methods;
mod registry;
mod scope;

pub use builtins::Builtins;
pub use config::{RegistryConfig, DEFAULT_MAX_CALL_DEPTH, DEFAULT_MAX_LOOP_ITERATIONS};
pub use context::{CallHook, Context, ReturnHook};
pub use evaluator::Flow;
pub use methods::ALLOWED_METHODS;
pub use registry::{Function, FunctionInfo, Registry};
pub use scope::Scope;

pub use jsonfn_types::{ast, EvalError, EvalResult, NativeFn, Value};
