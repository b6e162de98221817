//! Loaded programs: their functions, constants, types and host bindings.

pub mod archive;
mod function;
mod image;
mod resolver;

pub use archive::{DecodeError, Decoder, PostcardDecoder, ProgramArchive};
pub use function::{DebugInfoFiles, DebugLine, Function, ResourceNames};
pub use image::{ENTRY_POINT, LoadError, LoadedProgram, ProgramImage};
pub use resolver::{ExternalFunction, ExternalRegistry, ResolveExternal};
