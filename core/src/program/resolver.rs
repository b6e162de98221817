//! Binding of a program's host function names to host code.

use alloc::sync::Arc;
use core::fmt;

use hashbrown::HashMap;

use crate::String;
use crate::vm::{Machine, RunError};

type HostFn = dyn Fn(&mut Machine<'_>, &mut [u8]) -> Result<(), RunError> + Send + Sync;

/// A host function a program can call.
///
/// It receives the running machine and the call frame: the return slot
/// followed by the arguments, exactly as the interpreter laid them out.
#[derive(Clone)]
pub struct ExternalFunction {
    name: String,
    call: Arc<HostFn>,
}

impl ExternalFunction {
    pub fn new<F>(name: impl Into<String>, call: F) -> Self
    where
        F: Fn(&mut Machine<'_>, &mut [u8]) -> Result<(), RunError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            call: Arc::new(call),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn call(&self, machine: &mut Machine<'_>, frame: &mut [u8]) -> Result<(), RunError> {
        (self.call)(machine, frame)
    }
}

impl fmt::Debug for ExternalFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExternalFunction")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Looks up host functions by the name a program uses for them.
pub trait ResolveExternal {
    fn resolve(&self, name: &str) -> Option<ExternalFunction>;
}

impl<F> ResolveExternal for F
where
    F: Fn(&str) -> Option<ExternalFunction>,
{
    fn resolve(&self, name: &str) -> Option<ExternalFunction> {
        self(name)
    }
}

/// A resolver backed by a name table.
#[derive(Debug, Clone, Default)]
pub struct ExternalRegistry {
    functions: HashMap<String, ExternalFunction>,
}

impl ExternalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `function` under its own name, replacing any previous binding.
    pub fn insert(&mut self, function: ExternalFunction) -> &mut Self {
        self.functions.insert(function.name.clone(), function);
        self
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl ResolveExternal for ExternalRegistry {
    fn resolve(&self, name: &str) -> Option<ExternalFunction> {
        self.functions.get(name).cloned()
    }
}
