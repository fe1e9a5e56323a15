//! Mod discovery and cataloging
//!
//! A catalog is built wholesale by scanning one or more mod root
//! directories. Each root holds title directories named by a 16-hex-digit
//! title id, whose children are mods for that title, plus the reserved
//! `exefs_patches`/`nro_patches` directories whose children are
//! unconditional mods applied to every title. Discovery order across all
//! roots is priority order: an earlier mod wins conflicts during romfs
//! merging. A finished catalog is never mutated; rescanning builds a new
//! one.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

/// Content override directory inside a mod
pub const ROMFS_DIR: &str = "romfs";

/// Prebuilt content override archive inside a mod
pub const ROMFS_STORAGE_FILE: &str = "romfs.storage";

/// Executable patch directory inside a mod
pub const EXEFS_DIR: &str = "exefs";

/// Reserved root subdirectories whose children are unconditional mods
pub const UNCONDITIONAL_DIRS: [&str; 2] = ["exefs_patches", "nro_patches"];

/// One discovered mod directory and its capabilities
#[derive(Debug, Clone)]
pub struct ModEntry {
    /// Mod name, taken from the directory name
    pub name: String,
    /// The mod directory itself
    pub path: PathBuf,
    /// `exefs/` patch directory, if present
    pub exefs: Option<PathBuf>,
    /// `romfs/` override directory, if present
    pub romfs: Option<PathBuf>,
    /// `romfs.storage` prebuilt override archive, if present
    pub romfs_storage: Option<PathBuf>,
    /// Whether the mod participates in resolution and patching
    pub enabled: bool,
}

impl ModEntry {
    fn from_dir(path: PathBuf) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let exefs = path.join(EXEFS_DIR);
        let romfs = path.join(ROMFS_DIR);
        let romfs_storage = path.join(ROMFS_STORAGE_FILE);

        Self {
            name,
            exefs: exefs.is_dir().then_some(exefs),
            romfs: romfs.is_dir().then_some(romfs),
            romfs_storage: romfs_storage.is_file().then_some(romfs_storage),
            path,
            enabled: true,
        }
    }

    /// Whether the mod provides no patches and no content overrides
    pub fn is_empty(&self) -> bool {
        self.exefs.is_none() && self.romfs.is_none() && self.romfs_storage.is_none()
    }
}

impl fmt::Display for ModEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}{}{}] '{}'",
            if self.exefs.is_some() { "E" } else { "" },
            if self.romfs_storage.is_some() { "r" } else { "" },
            if self.romfs.is_some() { "R" } else { "" },
            self.name
        )
    }
}

/// An immutable snapshot of every discovered mod
///
/// Built once per scan; readers hold the snapshot and never observe a
/// half-built catalog.
#[derive(Debug, Default)]
pub struct ModCatalog {
    mods: HashMap<u64, Vec<ModEntry>>,
    unconditional: Vec<PathBuf>,
}

impl ModCatalog {
    /// Scan the given roots and build a catalog
    ///
    /// Missing roots are skipped. An unreadable root logs a warning and the
    /// remaining roots still scan; nothing here ever aborts a load. Within
    /// each directory, children are visited in name order so repeated scans
    /// of unchanged trees produce identical catalogs.
    pub fn scan<P: AsRef<Path>>(roots: &[P]) -> Self {
        let mut catalog = Self::default();
        let mut seen_names = HashSet::new();

        for root in roots {
            let root = root.as_ref();
            if !root.is_dir() {
                continue;
            }

            log::debug!("Loading mods from `{}`", root.display());

            for title_dir in sorted_subdirs(root) {
                let title_name = title_dir
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();

                if UNCONDITIONAL_DIRS.contains(&title_name.as_str()) {
                    for mod_dir in sorted_subdirs(&title_dir) {
                        let name = mod_dir
                            .file_name()
                            .map(|n| n.to_string_lossy().into_owned())
                            .unwrap_or_default();
                        log::info!("Found unconditional mod '{name}'");
                        if !seen_names.insert(name.clone()) {
                            log::warn!("Duplicate mod name '{name}'");
                        }
                        catalog.unconditional.push(mod_dir);
                    }
                } else if let Some(title_id) = parse_title_id(&title_name) {
                    for mod_dir in sorted_subdirs(&title_dir) {
                        let entry = ModEntry::from_dir(mod_dir);

                        log::info!("Found mod [{title_id:016X}] {entry}");
                        if entry.is_empty() {
                            log::warn!("Mod '{}' is empty", entry.name);
                        }
                        if !seen_names.insert(entry.name.clone()) {
                            log::warn!("Duplicate mod name '{}'", entry.name);
                        }

                        catalog.mods.entry(title_id).or_default().push(entry);
                    }
                }
                // Anything else is not a title directory; ignore it.
            }
        }

        catalog
    }

    /// Mods registered for a title, in priority order
    pub fn mods_for(&self, title_id: u64) -> &[ModEntry] {
        self.mods.get(&title_id).map_or(&[], Vec::as_slice)
    }

    /// Unconditional mod directories, applied to every title
    pub fn unconditional_mods(&self) -> &[PathBuf] {
        &self.unconditional
    }

    /// Title ids that have at least one mod
    pub fn title_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.mods.keys().copied()
    }

    /// Total number of title-keyed mods in the catalog
    pub fn mod_count(&self) -> usize {
        self.mods.values().map(Vec::len).sum()
    }

    /// Enable or disable a mod by name
    ///
    /// Returns whether a matching mod was found. Disabled mods stay in the
    /// catalog but contribute neither content overrides nor patches.
    pub fn set_mod_enabled(&mut self, title_id: u64, name: &str, enabled: bool) -> bool {
        let mut found = false;
        if let Some(entries) = self.mods.get_mut(&title_id) {
            for entry in entries.iter_mut().filter(|e| e.name == name) {
                entry.enabled = enabled;
                found = true;
            }
        }
        found
    }
}

/// Recognize a title directory name: exactly 16 hex digits
fn parse_title_id(name: &str) -> Option<u64> {
    if name.len() != 16 {
        return None;
    }
    u64::from_str_radix(name, 16).ok()
}

/// Immediate subdirectories of `dir`, sorted by name
fn sorted_subdirs(dir: &Path) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            log::warn!("Cannot read directory `{}`: {e}", dir.display());
            return Vec::new();
        }
    };

    let mut dirs: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_dir())
        .collect();
    dirs.sort();
    dirs
}
