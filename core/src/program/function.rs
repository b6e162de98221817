use serde::{Deserialize, Serialize};

use crate::types::TypeRef;
use crate::{String, Vec};

/// Maps an octet offset in a function's code back to a source line.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebugLine {
    pub code_offset: u32,
    /// Index into the program's [`DebugInfoFiles`].
    pub file: u16,
    pub line: u32,
}

/// A function of a loaded program.
///
/// The code octets are opaque here; only the interpreter gives them meaning.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Function {
    pub name: String,
    /// The function's type descriptor. Must be a `Function` type.
    pub ty: TypeRef,
    pub parameters_octet_size: usize,
    pub parameter_count: usize,
    pub return_octet_size: usize,
    pub code: Vec<u8>,
    #[serde(default)]
    pub debug_lines: Vec<DebugLine>,
}

impl Function {
    /// Source line of the instruction at `code_offset`, if known.
    pub fn line_at(&self, code_offset: u32) -> Option<&DebugLine> {
        self.debug_lines
            .iter()
            .take_while(|line| line.code_offset <= code_offset)
            .last()
    }
}

/// Source files referenced by [`DebugLine::file`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DebugInfoFiles {
    files: Vec<String>,
}

impl DebugInfoFiles {
    pub fn new(files: Vec<String>) -> Self {
        Self { files }
    }

    pub fn get(&self, index: u16) -> Option<&str> {
        self.files.get(index as usize).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(String::as_str)
    }
}

/// Names of the resources a program refers to by index.
///
/// Always a valid list; a program without resources has an empty one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceNames {
    names: Vec<String>,
}

impl ResourceNames {
    pub(crate) const EMPTY: ResourceNames = ResourceNames { names: Vec::new() };

    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    /// Index of the resource called `name`.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|candidate| candidate == name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }
}
