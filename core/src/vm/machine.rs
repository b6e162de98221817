use core::any::Any;
use core::ptr::NonNull;

use super::RunError;
use crate::memory::{Arena, Handle, HandleTable, Resource, StaticMemory};
use crate::program::{DebugInfoFiles, ExternalFunction, Function, LoadedProgram};
use crate::types::{TypeRef, TypeTable};
use crate::values::BlockData;

/// Per-call switches copied from the execution context.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MachineFlags {
    pub verbose: bool,
    /// Set while the host runs speculative ticks whose results may be
    /// thrown away.
    pub predicting: bool,
}

/// Parameter octets of a call, laid out as the function's parameter tuple.
#[derive(Debug, Clone, Copy)]
pub struct Parameters<'a> {
    octets: &'a [u8],
    count: usize,
}

impl<'a> Parameters<'a> {
    pub fn new(octets: &'a [u8], count: usize) -> Self {
        Self { octets, count }
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.octets
    }

    /// Number of declared parameters.
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn len(&self) -> usize {
        self.octets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.octets.is_empty()
    }

    pub fn read_i32(&self, offset: usize) -> Option<i32> {
        let octets = self.octets.get(offset..offset.checked_add(4)?)?;
        Some(i32::from_ne_bytes(octets.try_into().ok()?))
    }
}

/// What an interpreter sees while it runs one call: the active arena and
/// handle table, the program's read-only parts and the call's return slot.
///
/// Everything allocated through the machine lives until the arena it
/// belongs to is reclaimed after the next swap.
pub struct Machine<'a> {
    arena: &'a Arena,
    handles: &'a mut HandleTable,
    program: &'a LoadedProgram,
    user_data: Option<&'a (dyn Any + Send + Sync)>,
    bp: NonNull<u8>,
    flags: MachineFlags,
    debug_name: &'a str,
}

impl<'a> Machine<'a> {
    pub fn new(
        arena: &'a Arena,
        handles: &'a mut HandleTable,
        program: &'a LoadedProgram,
        user_data: Option<&'a (dyn Any + Send + Sync)>,
        bp: NonNull<u8>,
        flags: MachineFlags,
        debug_name: &'a str,
    ) -> Self {
        Self {
            arena,
            handles,
            program,
            user_data,
            bp,
            flags,
            debug_name,
        }
    }

    pub fn arena(&self) -> &'a Arena {
        self.arena
    }

    pub fn handles(&self) -> &HandleTable {
        &*self.handles
    }

    pub fn handles_mut(&mut self) -> &mut HandleTable {
        &mut *self.handles
    }

    pub fn program(&self) -> &'a LoadedProgram {
        self.program
    }

    pub fn constants(&self) -> &'a StaticMemory {
        self.program.constants()
    }

    pub fn types(&self) -> &'a TypeTable {
        self.program.types()
    }

    pub fn debug_info(&self) -> &'a DebugInfoFiles {
        self.program.debug_info()
    }

    pub fn externals(&self) -> &'a [ExternalFunction] {
        self.program.externals()
    }

    pub fn user_data(&self) -> Option<&'a (dyn Any + Send + Sync)> {
        self.user_data
    }

    /// The user data, if it is a `T`.
    pub fn user_data_as<T: Any>(&self) -> Option<&'a T> {
        self.user_data?.downcast_ref::<T>()
    }

    /// Base pointer: the return slot of the call being run.
    pub fn bp(&self) -> NonNull<u8> {
        self.bp
    }

    pub fn flags(&self) -> MachineFlags {
        self.flags
    }

    pub fn debug_name(&self) -> &'a str {
        self.debug_name
    }

    pub fn find_function(&self, name: &str) -> Option<&'a Function> {
        self.program.find_function(name)
    }

    /// Allocates zeroed memory for a value of `ty`.
    pub fn alloc_value(&self, ty: TypeRef) -> Result<NonNull<u8>, RunError> {
        let layout = self.types().layout(ty)?;
        Ok(self.arena.alloc_zeroed(layout.size, layout.align)?)
    }

    /// Allocates a string or blob block holding `octets`.
    pub fn alloc_bytes(&self, octets: &[u8]) -> Result<BlockData<'a>, RunError> {
        Ok(BlockData::new_bytes(self.arena, octets)?)
    }

    /// Allocates a zeroed list block of `len` elements of type `elem`.
    pub fn alloc_list(&self, elem: TypeRef, len: usize) -> Result<BlockData<'a>, RunError> {
        let block = self.types().list_block(elem)?;
        Ok(BlockData::new_list(self.arena, block, len)?)
    }

    /// Registers a host resource in the active handle table.
    pub fn register(&mut self, resource: Resource) -> Result<Handle, RunError> {
        Ok(self.handles.register(resource)?)
    }

    /// Calls the external function bound at `index`.
    pub fn call_external(&mut self, index: usize, frame: &mut [u8]) -> Result<(), RunError> {
        let program = self.program;
        let function = program
            .externals()
            .get(index)
            .ok_or(RunError::UnknownExternal { index })?;
        tracing::trace!(name = function.name(), "Calling external function");
        function.call(self, frame)
    }
}

impl core::fmt::Debug for Machine<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Machine")
            .field("debug_name", &self.debug_name)
            .field("arena", &self.arena)
            .field("handles", &self.handles)
            .field("bp", &self.bp)
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}
