//! Fixed-capacity bump arenas.
//!
//! An [`Arena`] is one space of a scope's semispace pair. It is backed by a
//! `bumpalo::Bump` that reserves its whole capacity up front and is capped at
//! that capacity, so allocation never grows the arena: once the capacity is
//! used up every further request fails with [`ArenaError::Exhausted`].
//!
//! [`Arena::reset`] rewinds the bump pointer and bumps the arena's epoch. It
//! never visits the values that were allocated, which is what makes
//! reclaiming a retired space independent of how much was written into it.
//!
//! Every arena also carries a process-unique [`Arena::id`]. Together with the
//! epoch it names one generation of one arena, so a reference recorded
//! against some other arena, or against one that no longer exists, never
//! matches.

use core::alloc::Layout;
use core::cell::Cell;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicU64, Ordering};

use bumpalo::Bump;
use thiserror::Error;

/// Errors produced by [`Arena`] allocation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArenaError {
    /// The backing memory for the arena could not be reserved.
    #[error("could not reserve {capacity} octets for an arena")]
    Allocation { capacity: usize },

    /// The request does not fit in what is left of the arena.
    #[error("arena exhausted: requested {requested} octets with {remaining} of {capacity} left")]
    Exhausted {
        requested: usize,
        remaining: usize,
        capacity: usize,
    },

    /// The requested size/alignment pair is not a valid layout.
    #[error("invalid layout of {size} octets aligned to {align}")]
    InvalidLayout { size: usize, align: usize },
}

/// Source of [`Arena::id`]. Zero is never handed out.
static NEXT_ARENA_ID: AtomicU64 = AtomicU64::new(1);

/// A bump region with a capacity fixed at construction.
pub struct Arena {
    bump: Bump,
    id: u64,
    capacity: usize,
    used: Cell<usize>,
    epoch: u64,
}

impl Arena {
    /// Reserves an arena able to hold `capacity` octets of payload.
    pub fn with_capacity(capacity: usize) -> Result<Self, ArenaError> {
        let bump =
            Bump::try_with_capacity(capacity).map_err(|_| ArenaError::Allocation { capacity })?;
        bump.set_allocation_limit(Some(capacity));
        Ok(Self {
            bump,
            id: NEXT_ARENA_ID.fetch_add(1, Ordering::Relaxed),
            capacity,
            used: Cell::new(0),
            epoch: 0,
        })
    }

    /// Allocates uninitialized memory for `layout`.
    pub fn alloc_layout(&self, layout: Layout) -> Result<NonNull<u8>, ArenaError> {
        let remaining = self.remaining();
        let exhausted = ArenaError::Exhausted {
            requested: layout.size(),
            remaining,
            capacity: self.capacity,
        };
        if layout.size() > remaining {
            return Err(exhausted);
        }
        let ptr = self.bump.try_alloc_layout(layout).map_err(|_| exhausted)?;
        self.used.set(self.used.get() + layout.size());
        Ok(ptr)
    }

    /// Allocates `size` zeroed octets aligned to `align`.
    pub fn alloc_zeroed(&self, size: usize, align: usize) -> Result<NonNull<u8>, ArenaError> {
        let layout = Layout::from_size_align(size, align.max(1))
            .map_err(|_| ArenaError::InvalidLayout { size, align })?;
        let ptr = self.alloc_layout(layout)?;
        // SAFETY: `ptr` was just allocated with room for `size` octets.
        unsafe { core::ptr::write_bytes(ptr.as_ptr(), 0, size) };
        Ok(ptr)
    }

    /// Copies `octets` into the arena at the given alignment.
    pub fn alloc_bytes(&self, octets: &[u8], align: usize) -> Result<NonNull<u8>, ArenaError> {
        let layout = Layout::from_size_align(octets.len(), align.max(1)).map_err(|_| {
            ArenaError::InvalidLayout {
                size: octets.len(),
                align,
            }
        })?;
        let ptr = self.alloc_layout(layout)?;
        // SAFETY: the destination is fresh, so it cannot overlap `octets`.
        unsafe {
            core::ptr::copy_nonoverlapping(octets.as_ptr(), ptr.as_ptr(), octets.len());
        }
        Ok(ptr)
    }

    /// Reclaims everything allocated so far.
    ///
    /// Every pointer handed out before the reset is invalid afterwards; the
    /// epoch change is how checked references detect that.
    pub fn reset(&mut self) {
        self.bump.reset();
        self.used.set(0);
        self.epoch = self.epoch.wrapping_add(1);
    }

    /// Identifies this arena among every arena created by the process.
    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Number of resets this arena has gone through.
    #[inline]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Payload octets allocated since the last reset.
    #[inline]
    pub fn used(&self) -> usize {
        self.used.get()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.capacity - self.used.get()
    }
}

impl core::fmt::Debug for Arena {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Arena")
            .field("id", &self.id)
            .field("capacity", &self.capacity)
            .field("used", &self.used.get())
            .field("epoch", &self.epoch)
            .finish()
    }
}
