//! Layered romfs content resolution
//!
//! Merges every enabled mod's content overrides for a title on top of the
//! base romfs storage, producing one new storage blob. Claims are
//! first-writer-wins in mod priority order; the base archive fills whatever
//! remains unclaimed. The output is serialized in ascending byte-wise path
//! order, so an unchanged catalog always produces byte-identical results.

use crate::catalog::{ModCatalog, ModEntry};
use crate::storage::{RomfsBuilder, RomfsStorage};
use crate::Result;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Where a planned file's bytes come from
#[derive(Debug)]
enum FileSource {
    /// A file inside a mod's prebuilt storage archive
    Storage { storage: RomfsStorage, path: String },
    /// A file in a mod's romfs directory on disk
    Local(PathBuf),
    /// A file in the base storage
    Base(String),
}

/// Merge a title's enabled content overrides with the base storage
///
/// Returns the base storage itself (same underlying blob, observable via
/// [`RomfsStorage::ptr_eq`]) when no enabled mod contributes any file.
/// Otherwise returns a freshly serialized storage that is a drop-in
/// replacement for the base.
pub fn apply_romfs_mods(
    catalog: &ModCatalog,
    title_id: u64,
    base: &RomfsStorage,
) -> Result<RomfsStorage> {
    let mut plan: BTreeMap<String, FileSource> = BTreeMap::new();
    let mut applied_mods = 0;

    for entry in catalog.mods_for(title_id).iter().filter(|m| m.enabled) {
        // A prebuilt archive takes precedence over a bare romfs directory
        // shipped by the same mod.
        if let Some(storage_path) = &entry.romfs_storage {
            let storage = match RomfsStorage::open(storage_path) {
                Ok(storage) => storage,
                Err(e) => {
                    log::warn!(
                        "Skipping unreadable storage `{}`: {e}",
                        storage_path.display()
                    );
                    continue;
                }
            };

            for file in storage.entries() {
                claim(
                    &mut plan,
                    file.path.clone(),
                    FileSource::Storage {
                        storage: storage.clone(),
                        path: file.path.clone(),
                    },
                    entry,
                );
            }
            applied_mods += 1;
        } else if let Some(romfs_dir) = &entry.romfs {
            for (rel_path, abs_path) in collect_files(romfs_dir) {
                claim(&mut plan, rel_path, FileSource::Local(abs_path), entry);
            }
            applied_mods += 1;
        }
    }

    if applied_mods == 0 || plan.is_empty() {
        log::info!("Using base romfs for [{title_id:016X}]");
        return Ok(base.clone());
    }

    log::info!(
        "Found {} modded files over {applied_mods} mods for [{title_id:016X}]",
        plan.len()
    );

    for file in base.entries() {
        if !plan.contains_key(&file.path) {
            plan.insert(file.path.clone(), FileSource::Base(file.path.clone()));
        }
    }

    let mut builder = RomfsBuilder::new();
    for (path, source) in plan {
        match source {
            FileSource::Storage { storage, path: src } => match storage.read_file(&src) {
                Ok(data) => builder.add_file(path, data),
                Err(e) => log::warn!("Skipping unreadable modded file '{path}': {e}"),
            },
            FileSource::Local(abs_path) => match std::fs::read(&abs_path) {
                Ok(data) => builder.add_file(path, data),
                Err(e) => log::warn!("Skipping unreadable modded file '{path}': {e}"),
            },
            FileSource::Base(src) => {
                // The base storage was just enumerated; a read failure here
                // means the blob itself is bad, which is not a mod problem.
                builder.add_file(path, base.read_file(&src)?)
            }
        }
    }

    log::info!("Building new romfs ({} files)", builder.file_count());
    builder.build()
}

/// Register a path in the plan unless an earlier mod already claimed it
fn claim(plan: &mut BTreeMap<String, FileSource>, path: String, source: FileSource, entry: &ModEntry) {
    if plan.contains_key(&path) {
        log::warn!("Skipped duplicate file '{path}' from '{}'", entry.name);
    } else {
        plan.insert(path, source);
    }
}

/// Recursively list files under `dir` as (absolute romfs path, disk path)
///
/// Romfs paths are rooted at `/` with `/` separators regardless of host
/// platform. Results are sorted for deterministic shadow diagnostics.
fn collect_files(dir: &Path) -> Vec<(String, PathBuf)> {
    let mut files = Vec::new();
    walk(dir, String::new(), &mut files);
    files.sort();
    files
}

fn walk(dir: &Path, prefix: String, files: &mut Vec<(String, PathBuf)>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            log::warn!("Cannot read directory `{}`: {e}", dir.display());
            return;
        }
    };

    for entry in entries.filter_map(std::result::Result::ok) {
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        let rel = format!("{prefix}/{name}");
        if path.is_dir() {
            walk(&path, rel, files);
        } else {
            files.push((rel, path));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{ModCatalog, ROMFS_DIR, ROMFS_STORAGE_FILE};
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    const TITLE: &str = "0100000000010000";
    const TITLE_ID: u64 = 0x0100_0000_0001_0000;

    fn base_storage(files: &[(&str, &[u8])]) -> RomfsStorage {
        let mut builder = RomfsBuilder::new();
        for (path, data) in files {
            builder.add_file(*path, data.to_vec());
        }
        builder.build().unwrap()
    }

    fn write_mod_file(root: &Path, mod_name: &str, rel: &str, data: &[u8]) {
        let path = root
            .join(TITLE)
            .join(mod_name)
            .join(ROMFS_DIR)
            .join(rel.trim_start_matches('/'));
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, data).unwrap();
    }

    #[test]
    fn test_identity_when_no_mod_contributes() {
        let temp = TempDir::new().unwrap();
        let catalog = ModCatalog::scan(&[temp.path()]);
        let base = base_storage(&[("/a.bin", b"base")]);

        let resolved = apply_romfs_mods(&catalog, TITLE_ID, &base).unwrap();
        assert!(RomfsStorage::ptr_eq(&base, &resolved));
    }

    #[test]
    fn test_mod_file_overrides_base() {
        let temp = TempDir::new().unwrap();
        write_mod_file(temp.path(), "ModA", "/foo.txt", b"modded");

        let catalog = ModCatalog::scan(&[temp.path()]);
        let base = base_storage(&[("/foo.txt", b"original"), ("/bar.txt", b"untouched")]);

        let resolved = apply_romfs_mods(&catalog, TITLE_ID, &base).unwrap();
        assert!(!RomfsStorage::ptr_eq(&base, &resolved));
        assert_eq!(resolved.read_file("/foo.txt").unwrap(), b"modded");
        assert_eq!(resolved.read_file("/bar.txt").unwrap(), b"untouched");
    }

    #[test]
    fn test_first_mod_in_priority_order_wins() {
        let temp = TempDir::new().unwrap();
        write_mod_file(temp.path(), "AaFirst", "/a/b.bin", b"first");
        write_mod_file(temp.path(), "ZzSecond", "/a/b.bin", b"second");

        let catalog = ModCatalog::scan(&[temp.path()]);
        let base = base_storage(&[]);

        let resolved = apply_romfs_mods(&catalog, TITLE_ID, &base).unwrap();
        assert_eq!(resolved.read_file("/a/b.bin").unwrap(), b"first");
    }

    #[test]
    fn test_output_paths_in_ordinal_order() {
        let temp = TempDir::new().unwrap();
        write_mod_file(temp.path(), "ModA", "/z.bin", b"z");
        write_mod_file(temp.path(), "ModA", "/a.bin", b"a");

        let catalog = ModCatalog::scan(&[temp.path()]);
        let base = base_storage(&[("/m.bin", b"m")]);

        let resolved = apply_romfs_mods(&catalog, TITLE_ID, &base).unwrap();
        let paths: Vec<_> = resolved.entries().iter().map(|e| e.path.clone()).collect();
        assert_eq!(paths, ["/a.bin", "/m.bin", "/z.bin"]);
    }

    #[test]
    fn test_deterministic_output() {
        let temp = TempDir::new().unwrap();
        write_mod_file(temp.path(), "ModA", "/dir/x.bin", b"x");
        write_mod_file(temp.path(), "ModB", "/y.bin", b"y");

        let catalog = ModCatalog::scan(&[temp.path()]);
        let base = base_storage(&[("/y.bin", b"base y"), ("/z.bin", b"base z")]);

        let first = apply_romfs_mods(&catalog, TITLE_ID, &base).unwrap();
        let second = apply_romfs_mods(&catalog, TITLE_ID, &base).unwrap();
        assert_eq!(first.as_bytes(), second.as_bytes());
    }

    #[test]
    fn test_prebuilt_archive_beats_directory_within_one_mod() {
        let temp = TempDir::new().unwrap();
        write_mod_file(temp.path(), "ModA", "/from_dir.bin", b"dir");

        let mut builder = RomfsBuilder::new();
        builder.add_file("/from_storage.bin", b"storage".to_vec());
        let storage = builder.build().unwrap();
        fs::write(
            temp.path().join(TITLE).join("ModA").join(ROMFS_STORAGE_FILE),
            storage.as_bytes(),
        )
        .unwrap();

        let catalog = ModCatalog::scan(&[temp.path()]);
        let base = base_storage(&[]);

        let resolved = apply_romfs_mods(&catalog, TITLE_ID, &base).unwrap();
        assert_eq!(
            resolved.read_file("/from_storage.bin").unwrap(),
            b"storage"
        );
        assert!(resolved.read_file("/from_dir.bin").is_err());
    }

    #[test]
    fn test_disabled_mod_contributes_nothing() {
        let temp = TempDir::new().unwrap();
        write_mod_file(temp.path(), "ModA", "/foo.bin", b"modded");

        let mut catalog = ModCatalog::scan(&[temp.path()]);
        assert!(catalog.set_mod_enabled(TITLE_ID, "ModA", false));

        let base = base_storage(&[("/foo.bin", b"base")]);
        let resolved = apply_romfs_mods(&catalog, TITLE_ID, &base).unwrap();
        assert!(RomfsStorage::ptr_eq(&base, &resolved));
    }
}
