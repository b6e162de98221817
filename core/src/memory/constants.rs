use crate::Vec;

/// Read-only constant memory of a loaded program.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticMemory {
    octets: Vec<u8>,
    max_size: usize,
}

impl StaticMemory {
    /// Wraps the decoded constant octets. `max_size` is the capacity the
    /// program declared for its constant segment and is never smaller than
    /// the octets themselves.
    pub fn new(octets: Vec<u8>, max_size: usize) -> Self {
        let max_size = max_size.max(octets.len());
        Self { octets, max_size }
    }

    pub fn octets(&self) -> &[u8] {
        &self.octets
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Returns `len` octets starting at `offset`, if they are in bounds.
    pub fn get(&self, offset: usize, len: usize) -> Option<&[u8]> {
        let end = offset.checked_add(len)?;
        self.octets.get(offset..end)
    }
}
