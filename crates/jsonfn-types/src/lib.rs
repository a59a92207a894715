//! Shared types for jsonfn.
//!
//! This crate defines the AST node types (deserialized straight from the
//! JSON document that *is* the program), the runtime [`Value`] model with
//! its coercion rules, and the [`EvalError`] taxonomy used by the evaluator
//! and by host-injected functions.

pub mod ast;
mod error;
mod value;

pub use error::{EvalError, EvalResult};
pub use value::{format_number, Array, NativeFn, Object, Value};
