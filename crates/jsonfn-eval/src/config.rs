//! Registry limits.

use serde::Deserialize;

/// Iteration cap applied to every `while` loop.
pub const DEFAULT_MAX_LOOP_ITERATIONS: usize = 100_000;
/// Maximum nesting of function invocations.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 128;

/// Safety limits for a [`Registry`](crate::Registry).
///
/// Deserializable so hosts can embed it in their own configuration;
/// missing fields take the defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub max_loop_iterations: usize,
    pub max_call_depth: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_loop_iterations: DEFAULT_MAX_LOOP_ITERATIONS,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}
