use core::fmt;
use core::ptr::NonNull;

use thiserror::Error;
use tracing::{debug, error, info, trace, warn};

use super::{ExecutionContext, ScopeOptions, State, UserData};
use crate::gc::{self, CollectError, CollectorOptions};
use crate::memory::{Arena, ArenaError, HandleTable};
use crate::program::{Function, LoadedProgram, ProgramImage, ResourceNames};
use crate::types::{Layout, TypeError};
use crate::vm::{Interpreter, Machine, MachineFlags, Parameters, RunError};
use crate::{String, ToString};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScopeError {
    #[error("program image is not ready")]
    NotReady,

    #[error("could not allocate scope memory: {0}")]
    Allocation(#[from] ArenaError),

    #[error("wrong return size: caller expects {expected} octets, the entry point returns {actual}")]
    ReturnSizeMismatch { expected: usize, actual: usize },

    #[error("wrong parameter size: caller declares {expected} octets, `{function}` takes {actual}")]
    ParameterSizeMismatch {
        function: String,
        expected: usize,
        actual: usize,
    },

    #[error("parameter octets do not match the declared size: {declared} declared, {actual} passed")]
    ArgumentLengthMismatch { declared: usize, actual: usize },

    #[error("no function named `{name}`")]
    UnknownFunction { name: String },

    #[error(transparent)]
    Type(#[from] TypeError),

    #[error("run failed: {0}")]
    Run(#[from] RunError),

    #[error("collection failed: {0}")]
    Collect(#[from] CollectError),

    #[error("state refers to memory that has been reclaimed")]
    StaleState,

    #[error("there is no state")]
    EmptyState,
}

/// Call shape of a tick, as the caller understands it.
#[derive(Debug, Clone, Copy)]
pub struct ExecuteInfo<'a> {
    pub parameter_octet_count: usize,
    pub parameter_count: usize,
    pub expected_return_octet_size: usize,
    /// Parameter octets, laid out as the entry point's parameter tuple.
    pub parameters: &'a [u8],
}

/// One running instance of a program.
///
/// A scope owns two arenas and two handle tables. Every call runs in the
/// active pair; after a tick the result is copied into the other pair, which
/// becomes active, and the pair that was active is reclaimed whole.
pub struct Scope<'img> {
    image: &'img ProgramImage,
    program: &'img LoadedProgram,
    arenas: [Arena; 2],
    handles: [HandleTable; 2],
    context: ExecutionContext,
    last_state: State,
    ram_memory_size: usize,
    compact: bool,
    collector: CollectorOptions,
}

impl<'img> Scope<'img> {
    pub fn init(
        image: &'img ProgramImage,
        user_data: Option<UserData>,
        ram_memory_size: usize,
    ) -> Result<Self, ScopeError> {
        Self::with_options(
            image,
            ScopeOptions {
                ram_memory_size,
                user_data,
                ..ScopeOptions::default()
            },
        )
    }

    pub fn with_options(image: &'img ProgramImage, options: ScopeOptions) -> Result<Self, ScopeError> {
        let Some(program) = image.program() else {
            error!(name = image.debug_name(), "Program image must be loaded and ready");
            return Err(ScopeError::NotReady);
        };
        let arenas = [
            Self::alloc_arena(options.ram_memory_size)?,
            Self::alloc_arena(options.ram_memory_size)?,
        ];
        let flags = MachineFlags {
            verbose: options.verbose,
            predicting: options.predicting,
        };
        debug!(
            name = image.debug_name(),
            ram_memory_size = options.ram_memory_size,
            "Scope initialized"
        );
        Ok(Scope {
            image,
            program,
            arenas,
            handles: [HandleTable::new(), HandleTable::new()],
            context: ExecutionContext::new(options.user_data, image.debug_name().to_string(), flags),
            last_state: State::EMPTY,
            ram_memory_size: options.ram_memory_size,
            compact: options.compact,
            collector: options.collector,
        })
    }

    fn alloc_arena(capacity: usize) -> Result<Arena, ScopeError> {
        Arena::with_capacity(capacity).map_err(|err| {
            error!(error = %err, "Could not allocate scope arena");
            ScopeError::Allocation(err)
        })
    }

    /// Forgets every value and resource of both pairs and starts over at
    /// slot 0. No memory is returned to the system.
    pub fn clear(&mut self) {
        for arena in &mut self.arenas {
            arena.reset();
        }
        for handles in &mut self.handles {
            handles.reset();
        }
        self.context.wire(0);
        self.last_state = State::EMPTY;
        debug!(name = self.context.debug_name(), "Scope cleared");
    }

    /// Runs one tick of the entry point.
    ///
    /// On success the result has been compacted into the other pair, the
    /// pair that was active has been reclaimed, and the published state is
    /// returned. A call-shape error leaves the scope untouched. After a run
    /// error the active pair holds whatever the interpreter left in it, and
    /// the scope should be [cleared](Self::clear) before it is used again.
    pub fn execute<I>(&mut self, interpreter: &mut I, info: &ExecuteInfo<'_>) -> Result<&State, ScopeError>
    where
        I: Interpreter + ?Sized,
    {
        let program = self.program;
        let entry = program.entry();
        self.validate(entry, info)?;

        let retiring = self.context.active_slot();
        let bp = self.run(interpreter, entry, info.parameters, info.parameter_count)?;
        let ty = program.state_type();
        let layout = Layout::new(info.expected_return_octet_size, program.return_layout().align);

        let incoming = 1 - retiring;
        let state = if self.compact {
            let (dest_handles, src_handles) = split_pair(&mut self.handles, incoming);
            let result = unsafe {
                gc::compact(
                    bp.as_ptr(),
                    ty,
                    program.types(),
                    &self.arenas[incoming],
                    dest_handles,
                    src_handles,
                    self.collector,
                )
            };
            match result {
                Ok((root, stats)) => {
                    trace!(
                        blocks = stats.blocks,
                        handles = stats.handles,
                        octets = stats.octets,
                        "Compacted state"
                    );
                    State::new(root, layout, ty, incoming, &self.arenas[incoming])
                }
                Err(err) => {
                    error!(name = self.context.debug_name(), error = %err, "Could not compact state");
                    self.arenas[incoming].reset();
                    self.handles[incoming].reset();
                    return Err(ScopeError::Collect(err));
                }
            }
        } else {
            State::new(bp, layout, ty, retiring, &self.arenas[retiring])
        };

        self.arenas[retiring].reset();
        self.handles[retiring].reset();
        self.context.wire(incoming);
        self.last_state = state;
        trace!(slot = incoming, "Swapped arena pair");

        if self.context.flags().verbose {
            self.debug_output(&self.last_state, "published");
        }
        Ok(&self.last_state)
    }

    fn validate(&self, entry: &Function, info: &ExecuteInfo<'_>) -> Result<(), ScopeError> {
        if info.expected_return_octet_size != entry.return_octet_size {
            error!(
                expected = info.expected_return_octet_size,
                actual = entry.return_octet_size,
                "Wrong return octet size"
            );
            return Err(ScopeError::ReturnSizeMismatch {
                expected: info.expected_return_octet_size,
                actual: entry.return_octet_size,
            });
        }
        if info.parameter_octet_count != entry.parameters_octet_size {
            error!(
                name = self.context.debug_name(),
                function = %entry.name,
                expected = info.parameter_octet_count,
                actual = entry.parameters_octet_size,
                "Wrong parameter octet size"
            );
            return Err(ScopeError::ParameterSizeMismatch {
                function: entry.name.clone(),
                expected: info.parameter_octet_count,
                actual: entry.parameters_octet_size,
            });
        }
        if info.parameters.len() != info.parameter_octet_count {
            error!(
                declared = info.parameter_octet_count,
                actual = info.parameters.len(),
                "Parameter octets do not match their declared size"
            );
            return Err(ScopeError::ArgumentLengthMismatch {
                declared: info.parameter_octet_count,
                actual: info.parameters.len(),
            });
        }
        Ok(())
    }

    /// Runs `function` in the active pair and returns its return slot.
    fn run<I>(
        &mut self,
        interpreter: &mut I,
        function: &Function,
        parameters: &[u8],
        parameter_count: usize,
    ) -> Result<NonNull<u8>, ScopeError>
    where
        I: Interpreter + ?Sized,
    {
        let slot = self.context.active_slot();
        let (_, layout) = self.program.return_slot(function)?;
        let bp = self.arenas[slot]
            .alloc_zeroed(layout.size, layout.align)
            .map_err(|err| {
                error!(error = %err, "Could not allocate return slot");
                ScopeError::Run(err.into())
            })?;
        let mut machine = Machine::new(
            &self.arenas[slot],
            &mut self.handles[slot],
            self.program,
            self.context.user_data(),
            bp,
            self.context.flags(),
            self.context.debug_name(),
        );
        trace!(function = %function.name, slot, "Running");
        interpreter
            .run(&mut machine, function, Parameters::new(parameters, parameter_count))
            .map_err(|err| {
                error!(function = %function.name, error = %err, "Run error");
                ScopeError::Run(err)
            })?;
        Ok(bp)
    }

    /// Runs the function called `name` in the active pair, outside of the
    /// tick cycle: nothing is swapped or compacted.
    ///
    /// The returned state stays readable until the active pair is reclaimed
    /// by the next tick.
    pub fn invoke<I>(
        &mut self,
        interpreter: &mut I,
        name: &str,
        parameters: &[u8],
        parameter_count: usize,
    ) -> Result<State, ScopeError>
    where
        I: Interpreter + ?Sized,
    {
        let program = self.program;
        let Some(function) = program.find_function(name) else {
            return Err(ScopeError::UnknownFunction {
                name: name.to_string(),
            });
        };
        if parameters.len() != function.parameters_octet_size {
            error!(function = name, "Wrong parameter octet size");
            return Err(ScopeError::ParameterSizeMismatch {
                function: function.name.clone(),
                expected: parameters.len(),
                actual: function.parameters_octet_size,
            });
        }
        let (ty, layout) = program.return_slot(function)?;
        let bp = self.run(interpreter, function, parameters, parameter_count)?;
        let slot = self.context.active_slot();
        Ok(State::new(bp, layout, ty, slot, &self.arenas[slot]))
    }

    /// Replaces `self` with a scope running the same image as `source`, with
    /// the same settings, holding a deep copy of the source's last state.
    ///
    /// On failure `self` is left freshly initialized and empty.
    pub fn copy_state_from(&mut self, source: &Scope<'img>) -> Result<(), ScopeError> {
        *self = Scope::with_options(source.image, source.options())?;
        self.copy_last_state(source)
    }

    /// A new scope with a deep copy of this scope's last state.
    pub fn fork(&self) -> Result<Scope<'img>, ScopeError> {
        let mut fork = Scope::with_options(self.image, self.options())?;
        fork.copy_last_state(self)?;
        Ok(fork)
    }

    /// Compacts `source`'s last state into the active pair of this freshly
    /// initialized scope.
    fn copy_last_state(&mut self, source: &Scope<'img>) -> Result<(), ScopeError> {
        let root = source.live_state(&source.last_state)?;
        source.debug_output(&source.last_state, "cloning from");

        let ty = source.program.state_type();
        let slot = self.context.active_slot();
        let result = unsafe {
            gc::compact(
                root.as_ptr(),
                ty,
                source.program.types(),
                &self.arenas[slot],
                &mut self.handles[slot],
                // The handles the state refers to are registered in the
                // source table it was published with; a scratch table would
                // be empty.
                &source.handles[source.last_state.slot()],
                self.collector,
            )
        };
        let (copy, _) = match result {
            Ok(copied) => copied,
            Err(err) => {
                error!(error = %err, "Could not clone state");
                self.clear();
                return Err(ScopeError::Collect(err));
            }
        };
        let layout = source.program.state_layout();
        self.last_state = State::new(copy, layout, ty, slot, &self.arenas[slot]);
        self.debug_output(&self.last_state, "cloned result");
        Ok(())
    }

    fn options(&self) -> ScopeOptions {
        let flags = self.context.flags();
        ScopeOptions {
            ram_memory_size: self.ram_memory_size,
            user_data: self.context.shared_user_data(),
            compact: self.compact,
            verbose: flags.verbose,
            predicting: flags.predicting,
            collector: self.collector,
        }
    }

    /// Address of a state that is still backed by its arena.
    fn live_state(&self, state: &State) -> Result<NonNull<u8>, ScopeError> {
        let ptr = state.as_ptr().ok_or(ScopeError::EmptyState)?;
        match self.arenas.get(state.slot()) {
            Some(arena) if arena.id() == state.arena_id() && arena.epoch() == state.epoch() => {
                Ok(ptr)
            }
            _ => Err(ScopeError::StaleState),
        }
    }

    /// The octets of `state`, if its arena has not been reclaimed since it
    /// was produced.
    pub fn state_octets(&self, state: &State) -> Result<&[u8], ScopeError> {
        let ptr = self.live_state(state)?;
        Ok(unsafe { core::slice::from_raw_parts(ptr.as_ptr(), state.octet_count()) })
    }

    /// The octets of `state` without checking that they are still backed.
    ///
    /// # Safety
    ///
    /// `state` must come from this scope, and the memory it points at must
    /// not have been overwritten since its arena was reclaimed.
    pub unsafe fn state_octets_unchecked(&self, state: &State) -> &[u8] {
        match state.as_ptr() {
            Some(ptr) => unsafe { core::slice::from_raw_parts(ptr.as_ptr(), state.octet_count()) },
            None => &[],
        }
    }

    /// Writes a readable rendering of `state` to `out`.
    pub fn write_state(&self, state: &State, out: &mut dyn fmt::Write) -> Result<(), ScopeError> {
        let ptr = self.live_state(state)?;
        let ty = state.ty().ok_or(ScopeError::EmptyState)?;
        let handles = &self.handles[state.slot()];
        // A formatting error can only come from `out` itself.
        let _ = unsafe { crate::values::write_value(out, ptr.as_ptr(), ty, self.program.types(), handles) };
        Ok(())
    }

    /// Logs a rendering of `state` with a description.
    pub fn debug_output(&self, state: &State, description: &str) {
        let mut rendered = String::new();
        match self.write_state(state, &mut rendered) {
            Ok(()) => info!("state '{}': {}", description, rendered),
            Err(err) => warn!("state '{}': {}", description, err),
        }
    }

    pub fn image(&self) -> &'img ProgramImage {
        self.image
    }

    pub fn last_state(&self) -> &State {
        &self.last_state
    }

    pub fn active_slot(&self) -> usize {
        self.context.active_slot()
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.context
    }

    /// The active arena.
    pub fn used_memory(&self) -> &Arena {
        &self.arenas[self.context.active_slot()]
    }

    /// The active handle table.
    pub fn used_handles(&self) -> &HandleTable {
        &self.handles[self.context.active_slot()]
    }

    /// The handle table the next tick compacts into.
    pub fn next_handles(&self) -> &HandleTable {
        &self.handles[1 - self.context.active_slot()]
    }

    pub fn ram_memory_size(&self) -> usize {
        self.ram_memory_size
    }

    pub fn resource_names(&self) -> &'img ResourceNames {
        self.program.resource_names()
    }

    pub fn find_function(&self, name: &str) -> Option<&'img Function> {
        self.program.find_function(name)
    }

    pub fn is_compacting(&self) -> bool {
        self.compact
    }

    pub fn set_compaction(&mut self, compact: bool) {
        self.compact = compact;
    }

    pub fn set_verbose(&mut self, verbose: bool) {
        self.context.flags_mut().verbose = verbose;
    }

    pub fn set_predicting(&mut self, predicting: bool) {
        self.context.flags_mut().predicting = predicting;
    }
}

impl Drop for Scope<'_> {
    fn drop(&mut self) {
        for handles in &mut self.handles {
            handles.destroy();
        }
    }
}

impl fmt::Debug for Scope<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("image", &self.image.debug_name())
            .field("context", &self.context)
            .field("arenas", &self.arenas)
            .field("handles", &self.handles)
            .field("last_state", &self.last_state)
            .field("compact", &self.compact)
            .finish_non_exhaustive()
    }
}

/// Splits the handle tables into the one at `dest` and the other one.
fn split_pair(handles: &mut [HandleTable; 2], dest: usize) -> (&mut HandleTable, &HandleTable) {
    let [first, second] = handles;
    if dest == 0 {
        (first, &*second)
    } else {
        (second, &*first)
    }
}
