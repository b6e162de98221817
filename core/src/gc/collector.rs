//! Copies the value graph reachable from one root into a fresh arena.
//!
//! The root is copied octet for octet, then every pointer slot and handle
//! slot it holds is relocated: heap blocks are copied into the destination
//! arena and handles are re-registered in the destination table. Both are
//! forwarded, so a block or handle reachable through several paths is copied
//! once and stays shared. Nothing unreachable from the root is ever read.

use core::ptr::NonNull;

use hashbrown::HashMap;
use thiserror::Error;

use crate::memory::{Arena, ArenaError, Handle, HandleError, HandleTable};
use crate::types::{BLOCK_HEADER_SIZE, TypeDesc, TypeError, TypeRef, TypeTable};
use crate::values::raw;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollectError {
    #[error("destination arena exhausted: {0}")]
    Exhausted(#[from] ArenaError),

    #[error(transparent)]
    Type(#[from] TypeError),

    #[error("custom type {ty} has no variant with tag {tag}")]
    InvalidTag { ty: TypeRef, tag: u8 },

    #[error("handle {handle} is not registered in the source table")]
    UnknownHandle { handle: Handle },

    #[error(transparent)]
    Handles(#[from] HandleError),

    #[error("value nests deeper than {limit} levels")]
    DepthExceeded { limit: usize },
}

/// Limits of a single collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectorOptions {
    /// Deepest nesting of values the collector follows.
    ///
    /// Default: 256
    pub max_depth: usize,
}

impl Default for CollectorOptions {
    fn default() -> Self {
        Self { max_depth: 256 }
    }
}

/// Counters of one finished collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectStats {
    pub blocks: usize,
    pub handles: usize,
    pub octets: usize,
}

pub struct Collector<'a> {
    types: &'a TypeTable,
    dest: &'a Arena,
    dest_handles: &'a mut HandleTable,
    src_handles: &'a HandleTable,
    options: CollectorOptions,
    blocks: HashMap<usize, NonNull<u8>>,
    handles: HashMap<Handle, Handle>,
    walk: HashMap<TypeRef, bool>,
    stats: CollectStats,
}

impl<'a> Collector<'a> {
    pub fn new(
        types: &'a TypeTable,
        dest: &'a Arena,
        dest_handles: &'a mut HandleTable,
        src_handles: &'a HandleTable,
        options: CollectorOptions,
    ) -> Self {
        Self {
            types,
            dest,
            dest_handles,
            src_handles,
            options,
            blocks: HashMap::new(),
            handles: HashMap::new(),
            walk: HashMap::new(),
            stats: CollectStats::default(),
        }
    }

    pub fn stats(&self) -> CollectStats {
        self.stats
    }

    /// Copies the value of type `ty` at `root` and everything it reaches.
    ///
    /// # Safety
    ///
    /// `root` must point at a live value of type `ty` whose blocks are live,
    /// and whose handles belong to the source table.
    pub unsafe fn copy_root(&mut self, root: *const u8, ty: TypeRef) -> Result<NonNull<u8>, CollectError> {
        let layout = self.types.layout(ty)?;
        let octets = unsafe { core::slice::from_raw_parts(root, layout.size) };
        let copy = self.dest.alloc_bytes(octets, layout.align)?;
        self.stats.octets += layout.size;
        unsafe { self.relocate(copy.as_ptr(), ty, 0)? };
        Ok(copy)
    }

    fn needs_walk(&mut self, ty: TypeRef) -> Result<bool, CollectError> {
        if let Some(walk) = self.walk.get(&ty) {
            return Ok(*walk);
        }
        let walk = self.types.contains_references(ty)?;
        self.walk.insert(ty, walk);
        Ok(walk)
    }

    /// Rewrites the references held by the already copied value at `slot`.
    unsafe fn relocate(&mut self, slot: *mut u8, ty: TypeRef, depth: usize) -> Result<(), CollectError> {
        if depth > self.options.max_depth {
            return Err(CollectError::DepthExceeded {
                limit: self.options.max_depth,
            });
        }
        if !self.needs_walk(ty)? {
            return Ok(());
        }
        let types = self.types;
        let (resolved, desc) = types.resolve(ty)?;
        match desc {
            TypeDesc::Unit
            | TypeDesc::Bool
            | TypeDesc::Int
            | TypeDesc::Fixed
            | TypeDesc::Char
            | TypeDesc::Function { .. } => {}
            TypeDesc::Str | TypeDesc::Blob => unsafe {
                if let Some(old) = NonNull::new(raw::read_pointer(slot) as *mut u8) {
                    let new = self.copy_bytes_block(old)?;
                    raw::write_pointer(slot, new.as_ptr());
                }
            },
            TypeDesc::List(elem) => unsafe {
                if let Some(old) = NonNull::new(raw::read_pointer(slot) as *mut u8) {
                    let new = self.copy_list_block(old, *elem, depth)?;
                    raw::write_pointer(slot, new.as_ptr());
                }
            },
            TypeDesc::Tuple(fields) => unsafe { self.relocate_fields(slot, fields, depth)? },
            TypeDesc::Record(fields) => {
                let refs: crate::Vec<TypeRef> = fields.iter().map(|field| field.ty).collect();
                unsafe { self.relocate_fields(slot, &refs, depth)? }
            }
            TypeDesc::Custom { variants, .. } => {
                let tag = unsafe { *slot };
                let variant = variants
                    .get(tag as usize)
                    .ok_or(CollectError::InvalidTag { ty: resolved, tag })?;
                let custom = types.custom_layout(resolved)?;
                unsafe {
                    self.relocate_fields(slot.add(custom.payload_offset), &variant.fields, depth)?
                };
            }
            TypeDesc::Alias { .. } => unreachable!("aliases are resolved above"),
            TypeDesc::Unmanaged { .. } => unsafe {
                let handle = raw::read_handle(slot);
                if !handle.is_null() {
                    raw::write_handle(slot, self.forward_handle(handle)?);
                }
            },
        }
        Ok(())
    }

    unsafe fn relocate_fields(
        &mut self,
        base: *mut u8,
        fields: &[TypeRef],
        depth: usize,
    ) -> Result<(), CollectError> {
        let layout = self.types.fields_layout(fields)?;
        for (field, offset) in fields.iter().zip(layout.offsets) {
            unsafe { self.relocate(base.add(offset), *field, depth + 1)? };
        }
        Ok(())
    }

    unsafe fn copy_bytes_block(&mut self, old: NonNull<u8>) -> Result<NonNull<u8>, CollectError> {
        if let Some(new) = self.blocks.get(&(old.as_ptr() as usize)) {
            return Ok(*new);
        }
        let len = unsafe { (old.as_ptr() as *const usize).read_unaligned() };
        let size = BLOCK_HEADER_SIZE + len;
        let new = unsafe { self.copy_block(old, size, core::mem::align_of::<usize>())? };
        Ok(new)
    }

    unsafe fn copy_list_block(
        &mut self,
        old: NonNull<u8>,
        elem: TypeRef,
        depth: usize,
    ) -> Result<NonNull<u8>, CollectError> {
        if let Some(new) = self.blocks.get(&(old.as_ptr() as usize)) {
            return Ok(*new);
        }
        let block = self.types.list_block(elem)?;
        let len = unsafe { (old.as_ptr() as *const usize).read_unaligned() };
        let new = unsafe { self.copy_block(old, block.size(len), block.align)? };
        if self.needs_walk(elem)? {
            for index in 0..len {
                let element = unsafe { new.as_ptr().add(block.payload_offset + index * block.stride) };
                unsafe { self.relocate(element, elem, depth + 1)? };
            }
        }
        Ok(new)
    }

    /// Copies `size` octets of a block and records where it went.
    unsafe fn copy_block(
        &mut self,
        old: NonNull<u8>,
        size: usize,
        align: usize,
    ) -> Result<NonNull<u8>, CollectError> {
        let octets = unsafe { core::slice::from_raw_parts(old.as_ptr(), size) };
        let new = self.dest.alloc_bytes(octets, align)?;
        self.blocks.insert(old.as_ptr() as usize, new);
        self.stats.blocks += 1;
        self.stats.octets += size;
        Ok(new)
    }

    fn forward_handle(&mut self, handle: Handle) -> Result<Handle, CollectError> {
        if let Some(new) = self.handles.get(&handle) {
            return Ok(*new);
        }
        let resource = self
            .src_handles
            .get(handle)
            .ok_or(CollectError::UnknownHandle { handle })?
            .clone();
        let new = self.dest_handles.register(resource)?;
        self.handles.insert(handle, new);
        self.stats.handles += 1;
        Ok(new)
    }
}

/// Copies the value graph rooted at `root` into `dest`, re-registering its
/// handles from `src_handles` into `dest_handles`. Returns the new root.
///
/// # Safety
///
/// See [`Collector::copy_root`].
pub unsafe fn compact(
    root: *const u8,
    ty: TypeRef,
    types: &TypeTable,
    dest: &Arena,
    dest_handles: &mut HandleTable,
    src_handles: &HandleTable,
    options: CollectorOptions,
) -> Result<(NonNull<u8>, CollectStats), CollectError> {
    let mut collector = Collector::new(types, dest, dest_handles, src_handles, options);
    let root = unsafe { collector.copy_root(root, ty)? };
    Ok((root, collector.stats()))
}
