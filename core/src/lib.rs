//! Execution-lifetime management for compiled bytecode programs.
//!
//! A [`ProgramImage`](program::ProgramImage) holds a loaded program. A
//! [`Scope`](scope::Scope) runs it one tick at a time against a pair of
//! fixed-size arenas: each tick allocates freely in the active arena, its
//! result is copied into the other arena, and the whole active arena is
//! reclaimed at once. Host resources that cannot live in an arena are
//! referenced through a pair of handle tables that follow the same cycle.

#![cfg_attr(all(not(feature = "std"), not(test)), no_std)]

extern crate alloc;

// Re-export for convenience so other modules don't need alloc:: prefix
#[allow(unused_imports)]
pub(crate) use alloc::{boxed::Box, format, string::String, string::ToString, vec, vec::Vec};

pub mod api;
pub mod gc;
pub mod memory;
pub mod program;
pub mod scope;
pub mod types;
pub mod values;
pub mod vm;

#[cfg(test)]
pub mod test_utils;
