//! Mod loader facade
//!
//! Owns the current [`ModCatalog`] snapshot and drives the two per-title
//! operations: layered romfs resolution and executable patching. Rescanning
//! builds a whole new catalog and swaps the snapshot atomically, so callers
//! holding the previous snapshot are never exposed to a half-built one.

use crate::catalog::{EXEFS_DIR, ModCatalog};
use crate::exe::{NxExecutable, trimmed_build_id};
use crate::patch::{MemPatch, PatchFormat};
use crate::storage::RomfsStorage;
use crate::{Result, resolver};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Entry point for mod discovery, romfs layering, and executable patching
#[derive(Debug)]
pub struct ModLoader {
    roots: Vec<PathBuf>,
    catalog: Arc<ModCatalog>,
}

impl ModLoader {
    /// Scan the given mod roots and build the initial catalog
    pub fn new<P: Into<PathBuf>>(roots: impl IntoIterator<Item = P>) -> Self {
        let roots: Vec<PathBuf> = roots.into_iter().map(Into::into).collect();
        let catalog = Arc::new(ModCatalog::scan(&roots));
        Self { roots, catalog }
    }

    /// The current catalog snapshot
    ///
    /// The snapshot stays valid (and unchanged) even if the loader rescans.
    pub fn catalog(&self) -> Arc<ModCatalog> {
        Arc::clone(&self.catalog)
    }

    /// Rebuild the catalog from the configured roots
    pub fn rescan(&mut self) {
        self.catalog = Arc::new(ModCatalog::scan(&self.roots));
    }

    /// Replace the catalog snapshot wholesale
    ///
    /// Useful after toggling mods on a copy of the current catalog.
    pub fn set_catalog(&mut self, catalog: ModCatalog) {
        self.catalog = Arc::new(catalog);
    }

    /// Merge a title's enabled content overrides with its base romfs
    ///
    /// Returns the base storage itself when no enabled mod contributes any
    /// file; see [`resolver::apply_romfs_mods`].
    pub fn apply_romfs_mods(&self, title_id: u64, base: &RomfsStorage) -> Result<RomfsStorage> {
        resolver::apply_romfs_mods(&self.catalog, title_id, base)
    }

    /// Compile and apply all matching executable patches for a title
    ///
    /// Patch containers are every enabled mod's `exefs/` directory for the
    /// title plus all unconditional mod directories. Each patch file is
    /// matched to an executable by trimmed build id; files for other builds
    /// are skipped, and malformed files log a warning and are skipped too.
    /// Matching records are merged per executable (later files overwrite
    /// earlier records at the same offset) and applied in ascending offset
    /// order. Returns the total number of records written.
    pub fn apply_program_patches(
        &self,
        title_id: u64,
        protected_offset: usize,
        programs: &mut [&mut dyn NxExecutable],
    ) -> usize {
        let patch_dirs: Vec<PathBuf> = self
            .catalog
            .mods_for(title_id)
            .iter()
            .filter(|entry| entry.enabled)
            .filter_map(|entry| entry.exefs.clone())
            .chain(self.catalog.unconditional_mods().iter().cloned())
            .collect();

        let build_ids: Vec<String> = programs
            .iter()
            .map(|program| trimmed_build_id(program.build_id()))
            .collect();

        let patches = compile_patches(&patch_dirs, &build_ids);

        let mut applied = 0;
        for (program, patch) in programs.iter_mut().zip(&patches) {
            applied += patch.apply(program.program_mut(), protected_offset);
        }
        applied
    }
}

/// Compile every recognized patch file in `dirs` into one record set per
/// target build id
fn compile_patches(dirs: &[PathBuf], build_ids: &[String]) -> Vec<MemPatch> {
    let mut patches = vec![MemPatch::new(); build_ids.len()];

    for dir in dirs {
        for file in sorted_files(dir) {
            let Some(format) = PatchFormat::from_path(&file) else {
                continue;
            };

            match format {
                PatchFormat::Ips => {
                    // The target id is in the file name; skip early so
                    // patches for other builds are never even read.
                    let candidate = crate::patch::ips::build_id_from_file_name(&file);
                    let Some(index) = build_ids.iter().position(|id| *id == candidate) else {
                        continue;
                    };
                    match format.parse_file(&file) {
                        Ok(parsed) => {
                            log::info!(
                                "Found IPS patch '{}'/'{}' bid={candidate}",
                                mod_name(dir),
                                file_name(&file)
                            );
                            patches[index].extend(parsed.patch);
                        }
                        Err(e) => log::warn!("Skipping bad patch `{}`: {e}", file.display()),
                    }
                }
                PatchFormat::Pchtxt => match format.parse_file(&file) {
                    Ok(parsed) => {
                        let Some(index) =
                            build_ids.iter().position(|id| *id == parsed.build_id)
                        else {
                            continue;
                        };
                        log::info!(
                            "Found IPSwitch patch '{}'/'{}' bid={}",
                            mod_name(dir),
                            file_name(&file),
                            parsed.build_id
                        );
                        patches[index].extend(parsed.patch);
                    }
                    Err(e) => log::warn!("Skipping bad patch `{}`: {e}", file.display()),
                },
            }
        }
    }

    patches
}

/// Mod name for diagnostics: the parent directory when the container is a
/// title-scoped `exefs/` dir, the directory itself for unconditional mods
fn mod_name(dir: &Path) -> String {
    let named = if dir.file_name().is_some_and(|n| n == EXEFS_DIR) {
        dir.parent().and_then(Path::file_name)
    } else {
        dir.file_name()
    };
    named.map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Files directly inside `dir`, sorted by name
fn sorted_files(dir: &Path) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            log::warn!("Cannot read patch directory `{}`: {e}", dir.display());
            return Vec::new();
        }
    };

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file())
        .collect();
    files.sort();
    files
}
