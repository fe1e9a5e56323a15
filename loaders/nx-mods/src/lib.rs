//! # nx_mods - Switch Title Mod Loading
//!
//! Discovery, layered content resolution, and executable patching for
//! community mods applied to Switch titles, without ever altering a
//! title's original packaged data.
//!
//! ## Features
//!
//! - Title-keyed mod catalog scanned from one or more root directories
//! - Deterministic layered romfs merging (directory and prebuilt-archive
//!   overrides, first-in-priority-order wins)
//! - IPS/IPS32 and IPSwitch (`pchtxt`) patch compilation, matched to
//!   executables by trimmed build id
//! - In-place patch application with protected-region and truncation rules
//!
//! ## Examples
//!
//! ```no_run
//! use nx_mods::{ModLoader, RomfsStorage};
//!
//! # fn main() -> Result<(), nx_mods::Error> {
//! let loader = ModLoader::new(["/path/to/mods"]);
//!
//! let base = RomfsStorage::open("base.storage")?;
//! let resolved = loader.apply_romfs_mods(0x0100_0000_0001_0000, &base)?;
//!
//! for entry in resolved.entries() {
//!     println!("{} ({} bytes)", entry.path, entry.size);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Directory layout
//!
//! ```text
//! <root>/<16-hex-titleid>/<modName>/exefs/...        executable patches
//! <root>/<16-hex-titleid>/<modName>/romfs/...        content override dir
//! <root>/<16-hex-titleid>/<modName>/romfs.storage    prebuilt override
//! <root>/exefs_patches/<modName>/*.ips|*.pchtxt      unconditional patches
//! <root>/nro_patches/<modName>/*.ips|*.pchtxt        unconditional patches
//! ```

#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

pub mod catalog;
pub mod error;
pub mod exe;
pub mod loader;
pub mod patch;
pub mod resolver;
pub mod storage;

// Re-export commonly used types
pub use catalog::{ModCatalog, ModEntry};
pub use error::{Error, Result};
pub use exe::{NxExecutable, ProgramImage, Segment, trimmed_build_id};
pub use loader::ModLoader;
pub use patch::{MemPatch, ParsedPatch, PatchFormat};
pub use storage::{RomfsBuilder, RomfsStorage, StorageEntry};
