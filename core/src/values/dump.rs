//! Human-readable rendering of arena values for diagnostics.
//!
//! The output is written into a caller-provided [`fmt::Write`], so callers
//! decide where the text lives and for how long.

use core::fmt;

use super::raw::{self, BlockData, FIXED_SCALE};
use crate::memory::HandleTable;
use crate::types::{TypeDesc, TypeRef, TypeTable};

/// Recursion limit of the dump; deeper values are elided.
const MAX_DUMP_DEPTH: usize = 128;

/// Writes the value at `value` of type `ty`.
///
/// Malformed types and unknown handles are rendered inline rather than
/// failing the whole dump.
///
/// # Safety
///
/// `value` must point at a live value laid out as `ty` describes, and every
/// block it references must be live as well.
pub unsafe fn write_value(
    out: &mut dyn fmt::Write,
    value: *const u8,
    ty: TypeRef,
    types: &TypeTable,
    handles: &HandleTable,
) -> fmt::Result {
    let dumper = Dumper { types, handles };
    unsafe { dumper.write(out, value, ty, 0) }
}

struct Dumper<'a> {
    types: &'a TypeTable,
    handles: &'a HandleTable,
}

impl Dumper<'_> {
    unsafe fn write(
        &self,
        out: &mut dyn fmt::Write,
        value: *const u8,
        ty: TypeRef,
        depth: usize,
    ) -> fmt::Result {
        if depth > MAX_DUMP_DEPTH {
            return write!(out, "…");
        }
        let desc = match self.types.resolve(ty) {
            Ok((_, desc)) => desc,
            Err(err) => return write!(out, "<{}>", err),
        };
        match desc {
            TypeDesc::Unit => write!(out, "()"),
            TypeDesc::Bool => write!(out, "{}", unsafe { raw::read_bool(value) }),
            TypeDesc::Int => write!(out, "{}", unsafe { raw::read_i32(value) }),
            TypeDesc::Fixed => write_fixed(out, unsafe { raw::read_i32(value) }),
            TypeDesc::Char => match char::from_u32(unsafe { raw::read_u32(value) }) {
                Some(c) => write!(out, "{:?}", c),
                None => write!(out, "<invalid char>"),
            },
            TypeDesc::Str => match unsafe { BlockData::from_slot(value) } {
                None => write!(out, "\"\""),
                Some(block) => match core::str::from_utf8(block.as_bytes()) {
                    Ok(s) => write!(out, "{:?}", s),
                    Err(_) => write!(out, "<invalid utf-8, {} octets>", block.len()),
                },
            },
            TypeDesc::Blob => {
                let len = unsafe { BlockData::from_slot(value) }.map_or(0, |block| block.len());
                write!(out, "<blob {} octets>", len)
            }
            TypeDesc::List(elem) => {
                write!(out, "[")?;
                if let Some(block) = unsafe { BlockData::from_slot(value) } {
                    let layout = match self.types.list_block(*elem) {
                        Ok(layout) => layout,
                        Err(err) => return write!(out, "<{}>]", err),
                    };
                    for i in 0..block.len() {
                        if i > 0 {
                            write!(out, ", ")?;
                        }
                        unsafe { self.write(out, block.element(layout, i), *elem, depth + 1)? };
                    }
                }
                write!(out, "]")
            }
            TypeDesc::Tuple(fields) => {
                let layout = match self.types.fields_layout(fields) {
                    Ok(layout) => layout,
                    Err(err) => return write!(out, "<{}>", err),
                };
                write!(out, "(")?;
                for (i, (field, offset)) in fields.iter().zip(&layout.offsets).enumerate() {
                    if i > 0 {
                        write!(out, ", ")?;
                    }
                    unsafe { self.write(out, value.add(*offset), *field, depth + 1)? };
                }
                write!(out, ")")
            }
            TypeDesc::Record(fields) => {
                let refs: crate::Vec<TypeRef> = fields.iter().map(|field| field.ty).collect();
                let layout = match self.types.fields_layout(&refs) {
                    Ok(layout) => layout,
                    Err(err) => return write!(out, "<{}>", err),
                };
                write!(out, "{{")?;
                for (i, (field, offset)) in fields.iter().zip(&layout.offsets).enumerate() {
                    if i > 0 {
                        write!(out, ", ")?;
                    }
                    write!(out, "{}: ", field.name)?;
                    unsafe { self.write(out, value.add(*offset), field.ty, depth + 1)? };
                }
                write!(out, "}}")
            }
            TypeDesc::Custom { variants, .. } => {
                let tag = unsafe { *value } as usize;
                let Some(variant) = variants.get(tag) else {
                    return write!(out, "<invalid tag {}>", tag);
                };
                write!(out, "{}", variant.name)?;
                if variant.fields.is_empty() {
                    return Ok(());
                }
                let (custom, payload) = match (
                    self.types.custom_layout(ty),
                    self.types.fields_layout(&variant.fields),
                ) {
                    (Ok(custom), Ok(payload)) => (custom, payload),
                    (Err(err), _) | (_, Err(err)) => return write!(out, "<{}>", err),
                };
                write!(out, "(")?;
                for (i, (field, offset)) in variant.fields.iter().zip(&payload.offsets).enumerate() {
                    if i > 0 {
                        write!(out, ", ")?;
                    }
                    let slot = unsafe { value.add(custom.payload_offset + offset) };
                    unsafe { self.write(out, slot, *field, depth + 1)? };
                }
                write!(out, ")")
            }
            TypeDesc::Alias { .. } => unreachable!("aliases are resolved above"),
            TypeDesc::Function { .. } => {
                write!(out, "<function {}>", unsafe { raw::read_u32(value) })
            }
            TypeDesc::Unmanaged { name } => {
                let handle = unsafe { raw::read_handle(value) };
                if handle.is_null() {
                    write!(out, "<{} null>", name)
                } else if self.handles.get(handle).is_some() {
                    write!(out, "<{} {}>", name, handle)
                } else {
                    write!(out, "<{} {} dangling>", name, handle)
                }
            }
        }
    }
}

fn write_fixed(out: &mut dyn fmt::Write, value: i32) -> fmt::Result {
    let scaled = value as i64;
    let sign = if scaled < 0 { "-" } else { "" };
    let magnitude = scaled.abs();
    let scale = FIXED_SCALE as i64;
    write!(out, "{}{}.{:03}", sign, magnitude / scale, magnitude % scale)
}
