//! Untyped access to values stored in an arena.
//!
//! A value is a run of octets laid out by its [`TypeDesc`](crate::types::TypeDesc).
//! Strings, blobs and lists live out of line in heap blocks: the value holds
//! a pointer slot, the block starts with a `usize` length header followed by
//! the payload. These helpers are what interpreters, the collector and the
//! dump use to read and write slots; all of them trust their pointers, which
//! is why most are `unsafe`.

use core::marker::PhantomData;
use core::ptr::NonNull;

use crate::memory::{Arena, ArenaError, Handle};
use crate::types::{BLOCK_HEADER_SIZE, ListBlock};

/// Fixed-point values are stored as thousandths.
pub const FIXED_SCALE: i32 = 1000;

/// Reads the pointer stored in a pointer slot.
///
/// # Safety
///
/// `slot` must be valid for reading `usize` octets.
#[inline]
pub unsafe fn read_pointer(slot: *const u8) -> *const u8 {
    unsafe { (slot as *const usize).read_unaligned() as *const u8 }
}

/// # Safety
///
/// `slot` must be valid for writing `usize` octets.
#[inline]
pub unsafe fn write_pointer(slot: *mut u8, target: *const u8) {
    unsafe { (slot as *mut usize).write_unaligned(target as usize) }
}

/// # Safety
///
/// `slot` must be valid for reading four octets.
#[inline]
pub unsafe fn read_handle(slot: *const u8) -> Handle {
    Handle::from_raw(unsafe { (slot as *const u32).read_unaligned() })
}

/// # Safety
///
/// `slot` must be valid for writing four octets.
#[inline]
pub unsafe fn write_handle(slot: *mut u8, handle: Handle) {
    unsafe { (slot as *mut u32).write_unaligned(handle.to_raw()) }
}

/// # Safety
///
/// `slot` must be valid for reading four octets.
#[inline]
pub unsafe fn read_i32(slot: *const u8) -> i32 {
    unsafe { (slot as *const i32).read_unaligned() }
}

/// # Safety
///
/// `slot` must be valid for writing four octets.
#[inline]
pub unsafe fn write_i32(slot: *mut u8, value: i32) {
    unsafe { (slot as *mut i32).write_unaligned(value) }
}

/// # Safety
///
/// `slot` must be valid for reading four octets.
#[inline]
pub unsafe fn read_u32(slot: *const u8) -> u32 {
    unsafe { (slot as *const u32).read_unaligned() }
}

/// # Safety
///
/// `slot` must be valid for writing four octets.
#[inline]
pub unsafe fn write_u32(slot: *mut u8, value: u32) {
    unsafe { (slot as *mut u32).write_unaligned(value) }
}

/// # Safety
///
/// `slot` must be valid for reading one octet.
#[inline]
pub unsafe fn read_bool(slot: *const u8) -> bool {
    unsafe { *slot != 0 }
}

/// # Safety
///
/// `slot` must be valid for writing one octet.
#[inline]
pub unsafe fn write_bool(slot: *mut u8, value: bool) {
    unsafe { *slot = value as u8 }
}

/// A heap block in an arena: a length header followed by its payload.
#[derive(Clone, Copy)]
pub struct BlockData<'a> {
    ptr: NonNull<u8>,
    _marker: PhantomData<&'a ()>,
}

impl<'a> BlockData<'a> {
    /// Allocates a block holding a copy of `octets` (a string or blob).
    pub fn new_bytes(arena: &'a Arena, octets: &[u8]) -> Result<Self, ArenaError> {
        let ptr = arena.alloc_layout(Self::layout(BLOCK_HEADER_SIZE + octets.len(), 1)?)?;
        unsafe {
            (ptr.as_ptr() as *mut usize).write(octets.len());
            core::ptr::copy_nonoverlapping(
                octets.as_ptr(),
                ptr.as_ptr().add(BLOCK_HEADER_SIZE),
                octets.len(),
            );
        }
        Ok(BlockData {
            ptr,
            _marker: PhantomData,
        })
    }

    /// Allocates a list block of `len` zeroed elements.
    pub fn new_list(arena: &'a Arena, block: ListBlock, len: usize) -> Result<Self, ArenaError> {
        let size = block.size(len);
        let ptr = arena.alloc_zeroed(size, block.align)?;
        unsafe { (ptr.as_ptr() as *mut usize).write(len) };
        Ok(BlockData {
            ptr,
            _marker: PhantomData,
        })
    }

    fn layout(size: usize, align: usize) -> Result<core::alloc::Layout, ArenaError> {
        let align = align.max(core::mem::align_of::<usize>());
        core::alloc::Layout::from_size_align(size, align)
            .map_err(|_| ArenaError::InvalidLayout { size, align })
    }

    /// Reads the block a pointer slot refers to. A null slot is the empty
    /// value and yields `None`.
    ///
    /// # Safety
    ///
    /// `slot` must be a readable pointer slot that is either null or points
    /// at a block that outlives `'a`.
    pub unsafe fn from_slot(slot: *const u8) -> Option<Self> {
        let ptr = NonNull::new(unsafe { read_pointer(slot) } as *mut u8)?;
        Some(BlockData {
            ptr,
            _marker: PhantomData,
        })
    }

    /// Wraps a block pointer.
    ///
    /// # Safety
    ///
    /// `ptr` must point at a block header that outlives `'a`.
    pub unsafe fn from_ptr(ptr: NonNull<u8>) -> Self {
        BlockData {
            ptr,
            _marker: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        unsafe { (self.ptr.as_ptr() as *const usize).read_unaligned() }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// The payload of a string or blob block.
    pub fn as_bytes(&self) -> &'a [u8] {
        unsafe {
            core::slice::from_raw_parts(self.ptr.as_ptr().add(BLOCK_HEADER_SIZE), self.len())
        }
    }

    /// Address of element `index` of a list block.
    pub fn element(&self, block: ListBlock, index: usize) -> *mut u8 {
        debug_assert!(index < self.len(), "Index out of bounds");
        unsafe {
            self.ptr
                .as_ptr()
                .add(block.payload_offset + index * block.stride)
        }
    }

    /// Stores this block's address in a pointer slot.
    ///
    /// # Safety
    ///
    /// `slot` must be valid for writing `usize` octets.
    pub unsafe fn store(&self, slot: *mut u8) {
        unsafe { write_pointer(slot, self.ptr.as_ptr()) }
    }
}
