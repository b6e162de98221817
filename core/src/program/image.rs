use alloc::boxed::Box;

use thiserror::Error;
use tracing::{debug, error, warn};

use super::archive::{DecodeError, Decoder, PostcardDecoder, ProgramArchive};
use super::function::{DebugInfoFiles, Function, ResourceNames};
use super::resolver::{ExternalFunction, ResolveExternal};
use crate::memory::StaticMemory;
use crate::types::{Layout, TypeError, TypeRef, TypeTable};
use crate::{String, ToString, Vec};

/// Name of the function every tick starts from.
pub const ENTRY_POINT: &str = "main";

static NO_RESOURCE_NAMES: ResourceNames = ResourceNames::EMPTY;

#[derive(Debug, Clone, Error)]
pub enum LoadError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("entry point `main` not found")]
    MissingEntryPoint,

    #[error("entry point `main` has a {found} type, expected a function type")]
    EntryNotFunction { found: &'static str },

    #[error("entry point `main` takes no parameters, so the program has no state type")]
    NoStateParameter,

    #[error("function `{function}` declares a {declared}-octet return slot, its return type takes {actual}")]
    ReturnSizeMismatch {
        function: String,
        declared: usize,
        actual: usize,
    },

    #[error("entry point `main` returns type {returned}, but its state parameter has type {state}")]
    StateTypeMismatch { returned: TypeRef, state: TypeRef },

    #[error("external function `{name}` could not be resolved")]
    UnresolvedExternal { name: String },

    #[error("invalid type table: {0}")]
    Type(#[from] TypeError),

    #[error("no program has been loaded")]
    NothingToReload,
}

/// A decoded, validated program with its host functions bound.
#[derive(Debug)]
pub struct LoadedProgram {
    functions: Vec<Function>,
    entry: usize,
    state_type: TypeRef,
    state_layout: Layout,
    return_layout: Layout,
    constants: StaticMemory,
    types: TypeTable,
    debug_info: DebugInfoFiles,
    resource_names: ResourceNames,
    externals: Vec<ExternalFunction>,
}

impl LoadedProgram {
    fn bind(archive: ProgramArchive, resolver: &dyn ResolveExternal) -> Result<Self, LoadError> {
        let ProgramArchive {
            functions,
            externals,
            constants,
            constant_capacity,
            types,
            debug_files,
            resource_names,
            ..
        } = archive;

        let externals = externals
            .iter()
            .map(|name| {
                resolver
                    .resolve(name)
                    .ok_or_else(|| LoadError::UnresolvedExternal { name: name.clone() })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let entry = functions
            .iter()
            .position(|function| function.name == ENTRY_POINT)
            .ok_or(LoadError::MissingEntryPoint)?;
        let main = &functions[entry];
        let Some((params, ret)) = types.function_signature(main.ty)? else {
            return Err(LoadError::EntryNotFunction {
                found: types.get(main.ty)?.kind(),
            });
        };
        // The state is threaded through the last parameter.
        let state_type = *params.last().ok_or(LoadError::NoStateParameter)?;
        // The collector walks the returned value as a state.
        let (returned, _) = types.resolve(ret)?;
        let (state, _) = types.resolve(state_type)?;
        if returned != state {
            return Err(LoadError::StateTypeMismatch { returned, state });
        }
        let state_layout = types.layout(state_type)?;
        let return_layout = Layout::new(main.return_octet_size, state_layout.align);
        for function in &functions {
            check_return_size(&types, function)?;
        }

        let debug_info = match debug_files {
            Some(files) => DebugInfoFiles::new(files),
            None => {
                warn!("Program has no debug info");
                DebugInfoFiles::default()
            }
        };

        Ok(LoadedProgram {
            entry,
            state_type,
            state_layout,
            return_layout,
            constants: StaticMemory::new(constants, constant_capacity),
            debug_info,
            resource_names: resource_names.map(ResourceNames::new).unwrap_or_default(),
            externals,
            functions,
            types,
        })
    }

    pub fn functions(&self) -> &[Function] {
        &self.functions
    }

    pub fn entry(&self) -> &Function {
        &self.functions[self.entry]
    }

    /// Type of the entry point's last parameter, the value carried from one
    /// tick to the next.
    pub fn state_type(&self) -> TypeRef {
        self.state_type
    }

    pub fn state_layout(&self) -> Layout {
        self.state_layout
    }

    /// Size and alignment of the entry point's return slot.
    pub fn return_layout(&self) -> Layout {
        self.return_layout
    }

    pub fn constants(&self) -> &StaticMemory {
        &self.constants
    }

    pub fn types(&self) -> &TypeTable {
        &self.types
    }

    pub fn debug_info(&self) -> &DebugInfoFiles {
        &self.debug_info
    }

    pub fn resource_names(&self) -> &ResourceNames {
        &self.resource_names
    }

    pub fn externals(&self) -> &[ExternalFunction] {
        &self.externals
    }

    pub fn find_function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|function| function.name == name)
    }

    /// Return type of `function` and the layout of its return slot.
    pub fn return_slot(&self, function: &Function) -> Result<(TypeRef, Layout), TypeError> {
        let (_, ret) = self
            .types
            .function_signature(function.ty)?
            .ok_or(TypeError::NotAFunction(function.ty))?;
        let align = self.types.layout(ret)?.align;
        Ok((ret, Layout::new(function.return_octet_size, align)))
    }
}

/// Return slots are allocated at the declared size and read at the return
/// type's size, so the two must agree.
fn check_return_size(types: &TypeTable, function: &Function) -> Result<(), LoadError> {
    let Some((_, ret)) = types.function_signature(function.ty)? else {
        return Ok(());
    };
    let actual = types.layout(ret)?.size;
    if function.return_octet_size != actual {
        return Err(LoadError::ReturnSizeMismatch {
            function: function.name.clone(),
            declared: function.return_octet_size,
            actual,
        });
    }
    Ok(())
}

/// A program as the host sees it: loaded from bytecode, reloadable, and
/// shared read-only by every scope that runs it.
pub struct ProgramImage {
    decoder: Box<dyn Decoder>,
    resolver: Box<dyn ResolveExternal + Send + Sync>,
    source: Option<Vec<u8>>,
    program: Option<LoadedProgram>,
    debug_name: String,
}

impl ProgramImage {
    /// An image that is not ready until [`set_code`](Self::set_code) succeeds.
    pub fn new(resolver: impl ResolveExternal + Send + Sync + 'static) -> Self {
        Self::with_decoder(resolver, PostcardDecoder)
    }

    pub fn with_decoder(
        resolver: impl ResolveExternal + Send + Sync + 'static,
        decoder: impl Decoder + 'static,
    ) -> Self {
        Self {
            decoder: Box::new(decoder),
            resolver: Box::new(resolver),
            source: None,
            program: None,
            debug_name: String::new(),
        }
    }

    /// Decodes `octets` and binds the program's external functions.
    ///
    /// On failure the image is left not ready.
    pub fn set_code(&mut self, octets: &[u8], debug_name: &str) -> Result<(), LoadError> {
        self.program = None;
        self.debug_name = debug_name.to_string();
        let program = self.load(octets)?;
        self.source = Some(octets.to_vec());
        self.program = Some(program);
        Ok(())
    }

    /// Decodes the octets of the last successful [`set_code`](Self::set_code)
    /// again, replacing everything that was loaded.
    pub fn reload(&mut self) -> Result<(), LoadError> {
        let Some(source) = self.source.take() else {
            error!(name = %self.debug_name, "Nothing to reload");
            return Err(LoadError::NothingToReload);
        };
        self.program = None;
        let loaded = self.load(&source);
        self.source = Some(source);
        self.program = Some(loaded?);
        Ok(())
    }

    fn load(&self, octets: &[u8]) -> Result<LoadedProgram, LoadError> {
        let result = self
            .decoder
            .decode(octets)
            .map_err(LoadError::from)
            .and_then(|archive| LoadedProgram::bind(archive, self.resolver.as_ref()));
        match &result {
            Ok(program) => debug!(
                name = %self.debug_name,
                functions = program.functions.len(),
                types = program.types.len(),
                "Loaded program"
            ),
            Err(err) => error!(name = %self.debug_name, error = %err, "Failed to load program"),
        }
        result
    }

    pub fn is_ready(&self) -> bool {
        self.program.is_some()
    }

    /// The loaded program, if any.
    pub fn program(&self) -> Option<&LoadedProgram> {
        self.program.as_ref()
    }

    pub fn debug_name(&self) -> &str {
        &self.debug_name
    }

    /// Looks up a function by name. Not finding one is not an error.
    pub fn find_function(&self, name: &str) -> Option<&Function> {
        self.program.as_ref()?.find_function(name)
    }

    /// Resource names of the loaded program; empty when there are none.
    pub fn resource_names(&self) -> &ResourceNames {
        self.program
            .as_ref()
            .map_or(&NO_RESOURCE_NAMES, LoadedProgram::resource_names)
    }

    pub fn type_info(&self) -> Option<&TypeTable> {
        self.program.as_ref().map(LoadedProgram::types)
    }

    pub fn entry(&self) -> Option<&Function> {
        self.program.as_ref().map(LoadedProgram::entry)
    }

    pub fn state_type(&self) -> Option<TypeRef> {
        self.program.as_ref().map(LoadedProgram::state_type)
    }

    pub fn state_layout(&self) -> Option<Layout> {
        self.program.as_ref().map(LoadedProgram::state_layout)
    }

    pub fn constants(&self) -> Option<&StaticMemory> {
        self.program.as_ref().map(LoadedProgram::constants)
    }

    pub fn debug_info(&self) -> Option<&DebugInfoFiles> {
        self.program.as_ref().map(LoadedProgram::debug_info)
    }

    pub fn externals(&self) -> &[ExternalFunction] {
        self.program
            .as_ref()
            .map(LoadedProgram::externals)
            .unwrap_or_default()
    }
}

impl core::fmt::Debug for ProgramImage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ProgramImage")
            .field("debug_name", &self.debug_name)
            .field("program", &self.program)
            .finish_non_exhaustive()
    }
}
