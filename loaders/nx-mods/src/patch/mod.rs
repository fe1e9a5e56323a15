//! In-memory executable patching
//!
//! A [`MemPatch`] is an ordered set of (offset, replacement bytes) records.
//! Patch files compile into `MemPatch` sets which are then applied onto a
//! flat executable image. Two on-disk formats are recognized, dispatched as
//! a closed variant: binary IPS/IPS32 files and IPSwitch `pchtxt` text
//! files. Both compile to the same (build id, records) shape.

use crate::Result;
use std::collections::BTreeMap;
use std::path::Path;

pub mod ips;
pub mod pchtxt;

/// Recognized patch file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchFormat {
    /// Binary IPS or IPS32 patch (`.ips`)
    Ips,
    /// IPSwitch text patch (`.pchtxt`)
    Pchtxt,
}

impl PatchFormat {
    /// Detect the format from a file's extension
    ///
    /// Returns `None` for unrecognized extensions; such files are not
    /// patches and are skipped by the compiler.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("ips") => Some(PatchFormat::Ips),
            Some("pchtxt") => Some(PatchFormat::Pchtxt),
            _ => None,
        }
    }

    /// Read and parse a patch file into its uniform compiled form
    pub fn parse_file(self, path: &Path) -> Result<ParsedPatch> {
        match self {
            PatchFormat::Ips => {
                let data = std::fs::read(path)?;
                Ok(ParsedPatch {
                    build_id: ips::build_id_from_file_name(path),
                    patch: ips::parse(&data)?,
                })
            }
            PatchFormat::Pchtxt => {
                let text = std::fs::read_to_string(path)?;
                pchtxt::parse(&text)
            }
        }
    }
}

/// A patch file compiled to its target build id and record set
#[derive(Debug)]
pub struct ParsedPatch {
    /// Trimmed build id of the executable this patch targets
    pub build_id: String,
    /// The compiled records
    pub patch: MemPatch,
}

/// Ordered set of memory patch records, keyed by offset
///
/// Offsets are unique; inserting at an existing offset replaces the earlier
/// record. Application always iterates in ascending offset order so that
/// overlapping records resolve the same way no matter what order they were
/// compiled in.
#[derive(Debug, Default, Clone)]
pub struct MemPatch {
    patches: BTreeMap<u32, Vec<u8>>,
}

impl MemPatch {
    /// Create an empty record set
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record at the given offset, replacing any existing record there
    pub fn add(&mut self, offset: u32, patch: Vec<u8>) {
        self.patches.insert(offset, patch);
    }

    /// Add an RLE record: `length` copies of `filler` at `offset`
    pub fn add_fill(&mut self, offset: u32, length: usize, filler: u8) {
        self.patches.insert(offset, vec![filler; length]);
    }

    /// Merge all records from another set, overwriting shared offsets
    pub fn extend(&mut self, other: MemPatch) {
        for (offset, patch) in other.patches {
            self.patches.insert(offset, patch);
        }
    }

    /// Number of records in the set
    pub fn len(&self) -> usize {
        self.patches.len()
    }

    /// Whether the set holds no records
    pub fn is_empty(&self) -> bool {
        self.patches.is_empty()
    }

    /// Apply all records onto `memory` in ascending offset order
    ///
    /// Records below `protected_offset` are dropped; the remaining offsets
    /// are rebased by subtracting it. A payload running past the end of
    /// `memory` is truncated to fit. Returns the number of records written.
    pub fn apply(&self, memory: &mut [u8], protected_offset: usize) -> usize {
        let mut applied = 0;

        for (&offset, patch) in &self.patches {
            let offset = offset as usize;
            if offset < protected_offset {
                log::warn!(
                    "Dropping patch at 0x{offset:x}: inside protected region (0x{protected_offset:x})"
                );
                continue;
            }

            let patch_offset = offset - protected_offset;
            if patch_offset >= memory.len() {
                log::warn!("Dropping patch at 0x{offset:x}: past end of image");
                continue;
            }

            let mut patch_size = patch.len();
            if patch_offset + patch_size > memory.len() {
                patch_size = memory.len() - patch_offset;
            }

            log::info!(
                "Patching address .text+0x{patch_offset:x} <= {} len={patch_size}",
                hex::encode_upper(&patch[..patch_size])
            );

            memory[patch_offset..patch_offset + patch_size].copy_from_slice(&patch[..patch_size]);
            applied += 1;
        }

        applied
    }
}
