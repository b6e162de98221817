//! Type descriptors of a loaded program and the arena layout they imply.
//!
//! The collector, the diagnostic dump and the scope's call-shape checks
//! only need to know how big a value is, how it is aligned and where its
//! pointer and handle slots are. Everything here answers those questions.

mod desc;
mod table;

pub use desc::{Field, TypeDesc, TypeRef, Variant};
pub use table::{
    BLOCK_HEADER_SIZE, CustomLayout, FieldsLayout, Layout, ListBlock, MAX_TYPE_DEPTH,
    POINTER_SIZE, TypeDisplay, TypeError, TypeTable,
};
