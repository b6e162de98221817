//! The serialized form of a program.
//!
//! A [`Decoder`] turns bytecode octets into a [`ProgramArchive`]; the image
//! then validates and binds it. [`PostcardDecoder`] reads the format written
//! by [`ProgramArchive::to_octets`].

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::Function;
use crate::types::TypeTable;
use crate::{String, Vec};

/// First octets of every archive.
pub const MAGIC: [u8; 4] = *b"FLIP";

/// Archive format understood by [`PostcardDecoder`].
pub const FORMAT_VERSION: u16 = 1;

#[derive(Debug, Clone, Error)]
pub enum DecodeError {
    #[error("malformed program archive: {0}")]
    Malformed(postcard::Error),

    #[error("not a program archive (magic {found:?})")]
    BadMagic { found: [u8; 4] },

    #[error("unsupported archive version {found}, expected {expected}")]
    UnsupportedVersion { found: u16, expected: u16 },

    #[error("could not encode program archive: {0}")]
    Encode(postcard::Error),
}

/// Everything a decoder produces for one program.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ProgramArchive {
    pub magic: [u8; 4],
    pub version: u16,
    pub functions: Vec<Function>,
    /// Names of the host functions the program calls, in call-index order.
    pub externals: Vec<String>,
    pub constants: Vec<u8>,
    /// Declared capacity of the constant segment.
    pub constant_capacity: usize,
    pub types: TypeTable,
    pub debug_files: Option<Vec<String>>,
    pub resource_names: Option<Vec<String>>,
}

impl ProgramArchive {
    /// An archive with the given types and functions and nothing else.
    pub fn new(types: TypeTable, functions: Vec<Function>) -> Self {
        Self {
            magic: MAGIC,
            version: FORMAT_VERSION,
            functions,
            externals: Vec::new(),
            constants: Vec::new(),
            constant_capacity: 0,
            types,
            debug_files: None,
            resource_names: None,
        }
    }

    pub fn to_octets(&self) -> Result<Vec<u8>, DecodeError> {
        postcard::to_allocvec(self).map_err(DecodeError::Encode)
    }
}

/// Turns bytecode octets into an archive.
pub trait Decoder: Send + Sync {
    fn decode(&self, octets: &[u8]) -> Result<ProgramArchive, DecodeError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PostcardDecoder;

impl Decoder for PostcardDecoder {
    fn decode(&self, octets: &[u8]) -> Result<ProgramArchive, DecodeError> {
        let archive: ProgramArchive = postcard::from_bytes(octets).map_err(DecodeError::Malformed)?;
        if archive.magic != MAGIC {
            return Err(DecodeError::BadMagic {
                found: archive.magic,
            });
        }
        if archive.version != FORMAT_VERSION {
            return Err(DecodeError::UnsupportedVersion {
                found: archive.version,
                expected: FORMAT_VERSION,
            });
        }
        Ok(archive)
    }
}
