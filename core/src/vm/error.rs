use thiserror::Error;

use crate::String;
use crate::memory::{ArenaError, HandleError};
use crate::types::TypeError;

/// Why an interpreter stopped before finishing a function.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunError {
    #[error("out of memory while running: {0}")]
    Memory(#[from] ArenaError),

    #[error(transparent)]
    Handles(#[from] HandleError),

    #[error(transparent)]
    Type(#[from] TypeError),

    #[error("no external function with index {index}")]
    UnknownExternal { index: usize },

    #[error("no function named `{name}`")]
    UnknownFunction { name: String },

    /// An interpreter-defined failure, such as a bad opcode or a failed
    /// assertion in the program.
    #[error("trap: {message}")]
    Trap { message: String },
}

impl RunError {
    pub fn trap(message: impl Into<String>) -> Self {
        RunError::Trap {
            message: message.into(),
        }
    }
}
