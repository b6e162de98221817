//! Public API of the crate.
//!
//! ```ignore
//! use flipspace_core::api::*;
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
//! ```

pub mod error;

pub use error::Error;

pub use crate::gc::CollectorOptions;
pub use crate::program::{ExternalFunction, ExternalRegistry, ProgramImage, ResolveExternal};
pub use crate::scope::{ExecuteInfo, Scope, ScopeOptions, State, UserData};
pub use crate::vm::{Interpreter, Machine, Parameters, RunError};

#[cfg(test)]
mod error_test;
