use core::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::desc::{TypeDesc, TypeRef, Variant};
use crate::Vec;

/// Nesting limit for inline aggregates. Heap blocks break the nesting, so
/// only a type that contains itself by value can reach it.
pub const MAX_TYPE_DEPTH: usize = 64;

/// Octets of the length header at the start of every heap block.
pub const BLOCK_HEADER_SIZE: usize = core::mem::size_of::<usize>();

/// Octets of a pointer slot.
pub const POINTER_SIZE: usize = core::mem::size_of::<usize>();

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeError {
    #[error("type index {0} is out of range")]
    UnknownType(TypeRef),

    #[error("alias chain starting at type {0} never resolves")]
    AliasCycle(TypeRef),

    #[error("type {0} nests too deeply")]
    TooDeep(TypeRef),

    #[error("custom type {ty} has {count} variants, at most 256 fit in a tag")]
    TooManyVariants { ty: TypeRef, count: usize },

    #[error("type table is full ({count} types)")]
    TooManyTypes { count: usize },

    #[error("type {0} is not a function type")]
    NotAFunction(TypeRef),
}

/// Size and alignment of a value in an arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub size: usize,
    pub align: usize,
}

impl Layout {
    pub const fn new(size: usize, align: usize) -> Self {
        Layout { size, align }
    }

    pub const POINTER: Layout = Layout::new(POINTER_SIZE, core::mem::align_of::<usize>());

    pub fn to_alloc(self) -> Option<core::alloc::Layout> {
        core::alloc::Layout::from_size_align(self.size, self.align.max(1)).ok()
    }
}

#[inline]
pub(crate) fn align_up(offset: usize, align: usize) -> usize {
    let align = align.max(1);
    (offset + align - 1) & !(align - 1)
}

/// Field placement of a tuple, record or variant payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldsLayout {
    pub offsets: Vec<usize>,
    pub layout: Layout,
}

/// Placement of the tag and payload of a custom type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CustomLayout {
    pub payload_offset: usize,
    pub layout: Layout,
}

/// The decoded type-descriptor table of a program.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(transparent)]
pub struct TypeTable {
    types: Vec<TypeDesc>,
}

impl TypeTable {
    pub fn new(types: Vec<TypeDesc>) -> Self {
        TypeTable { types }
    }

    /// Appends a descriptor and returns its reference.
    pub fn push(&mut self, desc: TypeDesc) -> Result<TypeRef, TypeError> {
        let index = u16::try_from(self.types.len()).map_err(|_| TypeError::TooManyTypes {
            count: self.types.len(),
        })?;
        self.types.push(desc);
        Ok(TypeRef(index))
    }

    pub fn get(&self, ty: TypeRef) -> Result<&TypeDesc, TypeError> {
        self.types.get(ty.index()).ok_or(TypeError::UnknownType(ty))
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (TypeRef, &TypeDesc)> {
        self.types
            .iter()
            .enumerate()
            .map(|(i, desc)| (TypeRef(i as u16), desc))
    }

    /// Follows aliases until a non-alias descriptor is found.
    pub fn resolve(&self, ty: TypeRef) -> Result<(TypeRef, &TypeDesc), TypeError> {
        let mut current = ty;
        for _ in 0..=self.types.len() {
            match self.get(current)? {
                TypeDesc::Alias { target, .. } => current = *target,
                desc => return Ok((current, desc)),
            }
        }
        Err(TypeError::AliasCycle(ty))
    }

    /// Parameter and return types if `ty` resolves to a function type.
    pub fn function_signature(&self, ty: TypeRef) -> Result<Option<(&[TypeRef], TypeRef)>, TypeError> {
        match self.resolve(ty)?.1 {
            TypeDesc::Function { params, ret } => Ok(Some((params, *ret))),
            _ => Ok(None),
        }
    }

    pub fn layout(&self, ty: TypeRef) -> Result<Layout, TypeError> {
        self.layout_at(ty, 0)
    }

    fn layout_at(&self, ty: TypeRef, depth: usize) -> Result<Layout, TypeError> {
        if depth > MAX_TYPE_DEPTH {
            return Err(TypeError::TooDeep(ty));
        }
        let (resolved, desc) = self.resolve(ty)?;
        let layout = match desc {
            TypeDesc::Unit => Layout::new(0, 1),
            TypeDesc::Bool => Layout::new(1, 1),
            TypeDesc::Int | TypeDesc::Fixed | TypeDesc::Char => Layout::new(4, 4),
            TypeDesc::Function { .. } | TypeDesc::Unmanaged { .. } => Layout::new(4, 4),
            TypeDesc::Str | TypeDesc::Blob | TypeDesc::List(_) => Layout::POINTER,
            TypeDesc::Tuple(fields) => self.fields_layout_at(fields, depth + 1)?.layout,
            TypeDesc::Record(fields) => {
                let refs: Vec<TypeRef> = fields.iter().map(|field| field.ty).collect();
                self.fields_layout_at(&refs, depth + 1)?.layout
            }
            TypeDesc::Custom { variants, .. } => {
                self.custom_layout_at(resolved, variants, depth + 1)?.layout
            }
            TypeDesc::Alias { .. } => unreachable!("aliases are resolved above"),
        };
        Ok(layout)
    }

    /// Lays out `fields` in declaration order.
    pub fn fields_layout(&self, fields: &[TypeRef]) -> Result<FieldsLayout, TypeError> {
        self.fields_layout_at(fields, 0)
    }

    fn fields_layout_at(&self, fields: &[TypeRef], depth: usize) -> Result<FieldsLayout, TypeError> {
        let mut offsets = Vec::with_capacity(fields.len());
        let mut offset = 0;
        let mut align = 1;
        for &field in fields {
            let field_layout = self.layout_at(field, depth)?;
            offset = align_up(offset, field_layout.align);
            offsets.push(offset);
            offset += field_layout.size;
            align = align.max(field_layout.align);
        }
        Ok(FieldsLayout {
            offsets,
            layout: Layout::new(align_up(offset, align), align),
        })
    }

    /// Layout of a custom type: a one-octet tag, then the payload of the
    /// widest variant at the strictest variant alignment.
    pub fn custom_layout(&self, ty: TypeRef) -> Result<CustomLayout, TypeError> {
        let (resolved, desc) = self.resolve(ty)?;
        match desc {
            TypeDesc::Custom { variants, .. } => self.custom_layout_at(resolved, variants, 1),
            _ => Err(TypeError::UnknownType(ty)),
        }
    }

    fn custom_layout_at(
        &self,
        ty: TypeRef,
        variants: &[Variant],
        depth: usize,
    ) -> Result<CustomLayout, TypeError> {
        if variants.len() > 256 {
            return Err(TypeError::TooManyVariants {
                ty,
                count: variants.len(),
            });
        }
        let mut payload_size = 0;
        let mut payload_align = 1;
        for variant in variants {
            let payload = self.fields_layout_at(&variant.fields, depth)?.layout;
            payload_size = payload_size.max(payload.size);
            payload_align = payload_align.max(payload.align);
        }
        let payload_offset = align_up(1, payload_align);
        let align = payload_align.max(1);
        Ok(CustomLayout {
            payload_offset,
            layout: Layout::new(align_up(payload_offset + payload_size, align), align),
        })
    }

    /// Layout of the heap block a `List` of `elem` points to: the length
    /// header, then the elements at `payload_offset` with `stride` spacing.
    pub fn list_block(&self, elem: TypeRef) -> Result<ListBlock, TypeError> {
        let elem_layout = self.layout(elem)?;
        let stride = align_up(elem_layout.size, elem_layout.align);
        let align = elem_layout.align.max(core::mem::align_of::<usize>());
        Ok(ListBlock {
            payload_offset: align_up(BLOCK_HEADER_SIZE, elem_layout.align),
            stride,
            align,
        })
    }

    /// Whether a value of `ty` holds any pointer slot or handle. Values that
    /// don't can be copied without walking them.
    pub fn contains_references(&self, ty: TypeRef) -> Result<bool, TypeError> {
        self.contains_references_at(ty, 0)
    }

    fn contains_references_at(&self, ty: TypeRef, depth: usize) -> Result<bool, TypeError> {
        if depth > MAX_TYPE_DEPTH {
            return Err(TypeError::TooDeep(ty));
        }
        let found = match self.resolve(ty)?.1 {
            TypeDesc::Unit
            | TypeDesc::Bool
            | TypeDesc::Int
            | TypeDesc::Fixed
            | TypeDesc::Char
            | TypeDesc::Function { .. } => false,
            TypeDesc::Str | TypeDesc::Blob | TypeDesc::List(_) | TypeDesc::Unmanaged { .. } => true,
            TypeDesc::Tuple(fields) => self.any_references(fields.iter().copied(), depth)?,
            TypeDesc::Record(fields) => {
                self.any_references(fields.iter().map(|field| field.ty), depth)?
            }
            TypeDesc::Custom { variants, .. } => self.any_references(
                variants.iter().flat_map(|variant| variant.fields.iter().copied()),
                depth,
            )?,
            TypeDesc::Alias { .. } => unreachable!("aliases are resolved above"),
        };
        Ok(found)
    }

    fn any_references(
        &self,
        mut fields: impl Iterator<Item = TypeRef>,
        depth: usize,
    ) -> Result<bool, TypeError> {
        fields.try_fold(false, |found, field| {
            Ok(found || self.contains_references_at(field, depth + 1)?)
        })
    }

    /// Displays `ty` with its references resolved, e.g. `List[Int]`.
    pub fn display(&self, ty: TypeRef) -> TypeDisplay<'_> {
        TypeDisplay { table: self, ty }
    }
}

/// Placement of elements inside a list block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListBlock {
    pub payload_offset: usize,
    pub stride: usize,
    pub align: usize,
}

impl ListBlock {
    pub fn size(&self, len: usize) -> usize {
        self.payload_offset + self.stride * len
    }
}

pub struct TypeDisplay<'a> {
    table: &'a TypeTable,
    ty: TypeRef,
}

impl fmt::Display for TypeDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Ok(desc) = self.table.get(self.ty) else {
            return write!(f, "?{}", self.ty.0);
        };
        let sub = |ty| self.table.display(ty);
        match desc {
            TypeDesc::Alias { name, .. }
            | TypeDesc::Custom { name, .. }
            | TypeDesc::Unmanaged { name } => write!(f, "{}", name),
            TypeDesc::List(elem) => write!(f, "List[{}]", sub(*elem)),
            TypeDesc::Tuple(fields) => {
                write!(f, "(")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", sub(*field))?;
                }
                write!(f, ")")
            }
            TypeDesc::Record(fields) => {
                write!(f, "{{")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", field.name, sub(field.ty))?;
                }
                write!(f, "}}")
            }
            TypeDesc::Function { params, ret } => {
                write!(f, "(")?;
                for (i, param) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", sub(*param))?;
                }
                write!(f, ") -> {}", sub(*ret))
            }
            scalar => write!(f, "{}", scalar.kind()),
        }
    }
}
