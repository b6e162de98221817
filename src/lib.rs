//! flipspace - semispace arenas for running bytecode programs tick by tick
//!
//! # Overview
//!
//! A host loads a compiled program into a [`ProgramImage`], creates one or
//! more [`Scope`]s from it and calls [`Scope::execute`] once per tick. Every
//! tick:
//!
//! 1. checks the call shape against the program's entry point,
//! 2. runs the entry point through the host's [`Interpreter`] in the active
//!    arena,
//! 3. copies the reachable part of the result into the other arena,
//! 4. reclaims the arena that was active, whatever it held, in constant time,
//! 5. publishes the copied result as the scope's [`State`].
//!
//! # Quick Start
//!
//! ```ignore
//! use flipspace::{ExecuteInfo, ProgramImage, Scope};
//!
//! let mut image = ProgramImage::new(|_: &str| None);
//! image.set_code(&octets, "game")?;
//!
//! let mut scope = Scope::init(&image, None, 64 * 1024)?;
//! let state = scope.execute(&mut interpreter, &ExecuteInfo {
//!     parameter_octet_count: 8,
//!     parameter_count: 2,
//!     expected_return_octet_size: 4,
//!     parameters: &params,
//! })?;
//!
//! // Run a speculative branch on a copy.
//! let mut prediction = scope.fork()?;
//! ```
//!
//! # Host resources
//!
//! Values that cannot live in an arena (textures, sockets, ...) are registered
//! with the scope's handle table and referenced by [`Handle`]. Handles are
//! re-registered as the result is copied, so a resource stays alive exactly as
//! long as some published state still refers to it.

// Re-export public API from flipspace_core
pub use flipspace_core::api::{
    CollectorOptions, Error, ExecuteInfo, ExternalFunction, ExternalRegistry, Interpreter, Machine,
    Parameters, ProgramImage, ResolveExternal, RunError, Scope, ScopeOptions, State, UserData,
};

// Re-export the building blocks
pub use flipspace_core::memory::{Arena, Handle, HandleTable, Resource};
pub use flipspace_core::program::{self, Function, LoadError, ProgramArchive};
pub use flipspace_core::scope::ScopeError;
pub use flipspace_core::types::{self, TypeDesc, TypeRef, TypeTable};
pub use flipspace_core::values::{self, BlockData};
