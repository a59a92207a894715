//! Error types shared by the loader, the evaluator and host functions.

use thiserror::Error;

/// Every failure surfaced by jsonfn.
///
/// All errors propagate immediately to the caller; nothing inside the
/// evaluator recovers or retries. Division by zero and member/index access
/// on `null` are defined values, not errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    /// Load-time shape violation in a function definition.
    #[error("invalid definition '{name}': {reason}")]
    InvalidDefinition { name: String, reason: String },

    /// `compile` was asked for a name that was never loaded.
    #[error("function not found: {0}")]
    FunctionNotFound(String),

    /// A call node named something no resolution tier knows.
    #[error("unknown function: {0}")]
    UnknownFunction(String),

    /// A reference resolved in neither the scope nor any builtin table.
    #[error("undefined variable: {0}")]
    UndefinedVariable(String),

    /// `set` on a name that was never declared.
    #[error("cannot assign to undeclared variable '{0}'")]
    UnboundAssignment(String),

    /// The source of a `for` loop cannot be iterated.
    #[error("cannot iterate over {0}")]
    NotIterable(String),

    /// Method name outside the capability whitelist.
    #[error("method not allowed: {0}")]
    MethodNotAllowed(String),

    /// Method call on `null` or `undefined`.
    #[error("cannot call method '{0}' on null or undefined")]
    NullReceiver(String),

    /// A `while` loop ran past its iteration cap.
    #[error("loop exceeded {limit} iterations")]
    LoopLimitExceeded { limit: usize },

    /// Nested function invocations ran past the configured depth.
    #[error("call depth exceeded {limit}")]
    CallDepthExceeded { limit: usize },

    /// A JSON node matches none of the recognized statement/expression shapes.
    #[error("unknown node shape: {0}")]
    UnknownNodeShape(String),

    /// A method or builtin received an argument of the wrong kind.
    #[error("type error: {0}")]
    TypeError(String),

    /// Failure reported by a host-injected function, builtin or hook.
    #[error("host error: {0}")]
    Host(String),
}

/// Result alias for evaluator operations.
pub type EvalResult<T> = Result<T, EvalError>;
