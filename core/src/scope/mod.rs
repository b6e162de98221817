//! Scopes: running instances of a program and their tick cycle.
//!
//! ```text
//! execute: validate -> run (active pair) -> swap -> compact (into new active)
//!          -> reclaim (old active) -> publish
//! ```

mod context;
mod options;
#[allow(clippy::module_inception)]
mod scope;
mod state;

pub use context::{ExecutionContext, UserData};
pub use options::ScopeOptions;
pub use scope::{ExecuteInfo, Scope, ScopeError};
pub use state::State;

#[cfg(test)]
mod scope_test;
