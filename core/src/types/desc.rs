use serde::{Deserialize, Serialize};

use crate::{String, Vec};

/// Index of a type descriptor in a [`TypeTable`](super::TypeTable).
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct TypeRef(pub u16);

impl TypeRef {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl core::fmt::Display for TypeRef {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A named field of a record.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub ty: TypeRef,
}

/// One alternative of a custom (tagged) type.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    pub name: String,
    pub fields: Vec<TypeRef>,
}

/// Shape of a value as stored in an arena.
///
/// Only the information needed to size, align and walk values is kept.
/// Scalars are stored inline; `Str`, `Blob` and `List` are a pointer slot to
/// a heap block in the same arena; `Unmanaged` is a handle into the arena's
/// paired handle table.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum TypeDesc {
    // Scalars.
    Unit,
    Bool,
    Int,
    Fixed,
    Char,

    // Heap blocks.
    Str,
    Blob,
    List(TypeRef),

    // Inline aggregates.
    Tuple(Vec<TypeRef>),
    Record(Vec<Field>),
    Custom {
        name: String,
        variants: Vec<Variant>,
    },

    Alias {
        name: String,
        target: TypeRef,
    },

    /// A function signature. Values are a 4-octet function index.
    Function {
        params: Vec<TypeRef>,
        ret: TypeRef,
    },

    /// A resource owned outside the arena, referenced through a handle.
    Unmanaged {
        name: String,
    },
}

impl TypeDesc {
    /// Short kind name used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            TypeDesc::Unit => "Unit",
            TypeDesc::Bool => "Bool",
            TypeDesc::Int => "Int",
            TypeDesc::Fixed => "Fixed",
            TypeDesc::Char => "Char",
            TypeDesc::Str => "String",
            TypeDesc::Blob => "Blob",
            TypeDesc::List(_) => "List",
            TypeDesc::Tuple(_) => "Tuple",
            TypeDesc::Record(_) => "Record",
            TypeDesc::Custom { .. } => "Custom",
            TypeDesc::Alias { .. } => "Alias",
            TypeDesc::Function { .. } => "Function",
            TypeDesc::Unmanaged { .. } => "Unmanaged",
        }
    }

    pub fn is_function(&self) -> bool {
        matches!(self, TypeDesc::Function { .. })
    }
}
