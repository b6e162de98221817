//! The boundary between a scope and the interpreter that runs its code.
//!
//! The opcode set lives outside this crate. An embedder implements
//! [`Interpreter`] and gets a [`Machine`] for every call: the memory it may
//! allocate from, the program's read-only parts and the return slot.

mod error;
mod machine;

pub use error::RunError;
pub use machine::{Machine, MachineFlags, Parameters};

use crate::program::Function;

/// Runs program functions.
pub trait Interpreter {
    /// Runs `function` to completion, leaving its result in the return slot
    /// at [`Machine::bp`].
    fn run(
        &mut self,
        machine: &mut Machine<'_>,
        function: &Function,
        parameters: Parameters<'_>,
    ) -> Result<(), RunError>;
}

impl<I: Interpreter + ?Sized> Interpreter for &mut I {
    fn run(
        &mut self,
        machine: &mut Machine<'_>,
        function: &Function,
        parameters: Parameters<'_>,
    ) -> Result<(), RunError> {
        (**self).run(machine, function, parameters)
    }
}
