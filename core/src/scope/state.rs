use core::ptr::NonNull;

use crate::memory::Arena;
use crate::types::{Layout, TypeRef};

/// The published result of a tick.
///
/// A `State` does not keep the memory it points at alive. It records the
/// slot, id and epoch of the arena it was produced in, and a
/// [`Scope`](super::Scope) only hands out its octets while that very arena
/// sits in that slot and has not been reset since. States of other scopes,
/// including dropped ones, never match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct State {
    ptr: Option<NonNull<u8>>,
    octet_count: usize,
    align: usize,
    ty: Option<TypeRef>,
    slot: usize,
    arena: u64,
    epoch: u64,
}

// The pointer is only dereferenced through the scope that owns its arena.
unsafe impl Send for State {}
unsafe impl Sync for State {}

impl State {
    /// No state: before the first tick, and after a clear.
    pub const EMPTY: State = State {
        ptr: None,
        octet_count: 0,
        align: 1,
        ty: None,
        slot: 0,
        arena: 0,
        epoch: 0,
    };

    /// A state for the value at `ptr`, allocated in `arena` at `slot`.
    pub(crate) fn new(ptr: NonNull<u8>, layout: Layout, ty: TypeRef, slot: usize, arena: &Arena) -> Self {
        State {
            ptr: Some(ptr),
            octet_count: layout.size,
            align: layout.align,
            ty: Some(ty),
            slot,
            arena: arena.id(),
            epoch: arena.epoch(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ptr.is_none()
    }

    pub fn octet_count(&self) -> usize {
        self.octet_count
    }

    pub fn align(&self) -> usize {
        self.align
    }

    /// Type of the value; `None` for [`State::EMPTY`].
    pub fn ty(&self) -> Option<TypeRef> {
        self.ty
    }

    /// Arena slot the value lives in.
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// [`Arena::id`] of the arena the value lives in; 0 for [`State::EMPTY`].
    pub fn arena_id(&self) -> u64 {
        self.arena
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn as_ptr(&self) -> Option<NonNull<u8>> {
        self.ptr
    }
}

impl Default for State {
    fn default() -> Self {
        State::EMPTY
    }
}
