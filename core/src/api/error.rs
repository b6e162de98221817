//! Public error type of the crate.
//!
//! Every module reports its own error enum; [`Error`] wraps all of them so a
//! host can use a single type at its boundary.

use thiserror::Error;

use crate::gc::CollectError;
use crate::memory::{ArenaError, HandleError};
use crate::program::{DecodeError, LoadError};
use crate::scope::ScopeError;
use crate::types::TypeError;
use crate::vm::RunError;

#[derive(Debug, Clone, Error)]
pub enum Error {
    /// The program could not be loaded.
    #[error("load error: {0}")]
    Load(#[from] LoadError),

    /// A scope operation failed.
    #[error("scope error: {0}")]
    Scope(#[from] ScopeError),

    #[error("run error: {0}")]
    Run(#[from] RunError),

    #[error("collection error: {0}")]
    Collect(#[from] CollectError),

    #[error("memory error: {0}")]
    Memory(#[from] ArenaError),

    #[error("handle error: {0}")]
    Handles(#[from] HandleError),

    #[error("type error: {0}")]
    Type(#[from] TypeError),
}

impl From<DecodeError> for Error {
    fn from(err: DecodeError) -> Self {
        Error::Load(LoadError::Decode(err))
    }
}

impl Error {
    /// Whether the scope that produced this error can keep running without
    /// being cleared first.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Scope(
                ScopeError::ReturnSizeMismatch { .. }
                    | ScopeError::ParameterSizeMismatch { .. }
                    | ScopeError::ArgumentLengthMismatch { .. }
                    | ScopeError::UnknownFunction { .. }
                    | ScopeError::StaleState
                    | ScopeError::EmptyState
                    | ScopeError::Collect(_)
            )
        )
    }
}
