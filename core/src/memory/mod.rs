//! Memory owned by a running program: the two arena spaces, their paired
//! handle tables, and the program's read-only constants.

mod arena;
mod constants;
mod handles;

pub use arena::{Arena, ArenaError};
pub use constants::StaticMemory;
pub use handles::{Handle, HandleError, HandleTable, Resource};
