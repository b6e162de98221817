//! Handle tables for resources that cannot live inside an arena.
//!
//! Values of an `Unmanaged` type store a small integer [`Handle`] in the
//! arena; the resource itself lives in the [`HandleTable`] paired with that
//! arena. The table is reclaimed together with its arena, so `reset` must be
//! O(1) as well: it only moves the live mark back to zero. Slots past the
//! mark keep their resource until the slot is reused or the table is
//! destroyed.

use alloc::sync::Arc;
use core::any::Any;

use thiserror::Error;

use crate::Vec;

/// An externally owned resource registered in a [`HandleTable`].
pub type Resource = Arc<dyn Any + Send + Sync>;

/// Index of a resource in a [`HandleTable`]. Handles are 1-based so that a
/// zeroed slot reads as [`Handle::NULL`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Handle(u32);

static_assertions::assert_eq_size!(Handle, u32);

impl Handle {
    pub const NULL: Handle = Handle(0);

    /// Octets a handle occupies inside an arena value.
    pub const OCTET_SIZE: usize = core::mem::size_of::<u32>();

    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Handle(raw)
    }

    #[inline]
    pub const fn to_raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    fn slot(self) -> Option<usize> {
        (self.0 as usize).checked_sub(1)
    }
}

impl core::fmt::Display for Handle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandleError {
    #[error("handle table is full ({live} live handles)")]
    Full { live: usize },
}

/// Registry of the resources referenced from one arena.
#[derive(Default)]
pub struct HandleTable {
    slots: Vec<Option<Resource>>,
    live: usize,
    generation: u64,
}

impl HandleTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `resource` and returns the handle that refers to it.
    pub fn register(&mut self, resource: Resource) -> Result<Handle, HandleError> {
        let raw = u32::try_from(self.live + 1).map_err(|_| HandleError::Full { live: self.live })?;
        match self.slots.get_mut(self.live) {
            Some(slot) => *slot = Some(resource),
            None => self.slots.push(Some(resource)),
        }
        self.live += 1;
        Ok(Handle(raw))
    }

    /// Returns the resource behind a live handle.
    pub fn get(&self, handle: Handle) -> Option<&Resource> {
        let slot = handle.slot()?;
        if slot >= self.live {
            return None;
        }
        self.slots[slot].as_ref()
    }

    /// Returns the resource behind `handle` if it is a `T`.
    pub fn get_as<T: Any>(&self, handle: Handle) -> Option<&T> {
        self.get(handle).and_then(|resource| (**resource).downcast_ref::<T>())
    }

    /// Number of live handles.
    #[inline]
    pub fn len(&self) -> usize {
        self.live
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Number of resets this table has gone through.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Live handles in registration order.
    pub fn handles(&self) -> impl Iterator<Item = Handle> + '_ {
        (1..=self.live as u32).map(Handle)
    }

    /// Invalidates every handle without touching the resources.
    pub fn reset(&mut self) {
        self.live = 0;
        self.generation = self.generation.wrapping_add(1);
    }

    /// Invalidates every handle and drops every resource still held.
    pub fn destroy(&mut self) {
        self.slots.clear();
        self.reset();
    }
}

impl core::fmt::Debug for HandleTable {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HandleTable")
            .field("live", &self.live)
            .field("slots", &self.slots.len())
            .field("generation", &self.generation)
            .finish()
    }
}
