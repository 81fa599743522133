//! Backup-set resolution: expands include entries into concrete
//! (source, destination) file pairs, applying the exclusion rules.
//!
//! Resolution is a pure filesystem scan; nothing is copied here. Symlinks
//! are never followed (entries are classified via `symlink_metadata`), so
//! cyclic link structures cannot loop the walk.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::core::models::{BackupSet, ResolvedPair};

/// A problem with one include entry or subdirectory; resolution continues
/// past it and the error is surfaced in the run summary.
#[derive(Debug, Clone)]
pub struct IncludeError {
    pub path: PathBuf,
    pub reason: String,
}

/// Output of one resolution pass.
#[derive(Debug, Default)]
pub struct Resolution {
    /// Files to copy, in traversal order, no duplicate sources.
    pub pairs: Vec<ResolvedPair>,
    /// Entries removed by an exclusion rule. A pruned directory appears
    /// once, not per contained file.
    pub excluded: Vec<PathBuf>,
    /// Include entries and subdirectories that could not be read.
    pub errors: Vec<IncludeError>,
    /// Total size of all files in `pairs`.
    pub total_bytes: u64,
}

/// Resolve a backup set against a destination root.
///
/// A directory include `/src/docs` maps its contents under
/// `<root>/docs/...`; a file include `/src/a.txt` maps to `<root>/a.txt`.
/// Overlapping includes are deduplicated on the source path, first
/// traversal wins.
pub fn resolve(set: &BackupSet, destination_root: &Path) -> Resolution {
    let mut res = Resolution::default();
    let mut seen: HashSet<PathBuf> = HashSet::new();

    for include in &set.includes {
        let meta = match fs::symlink_metadata(include) {
            Ok(m) => m,
            Err(e) => {
                res.errors.push(IncludeError {
                    path: include.clone(),
                    reason: format!("include entry is missing or unreadable: {e}"),
                });
                continue;
            }
        };

        let Some(name) = include.file_name() else {
            res.errors.push(IncludeError {
                path: include.clone(),
                reason: "include entry has no file name (filesystem root?)".into(),
            });
            continue;
        };

        if meta.is_dir() {
            if set.excludes_directory(include) {
                res.excluded.push(include.clone());
                continue;
            }
            walk(include, &destination_root.join(name), set, &mut seen, &mut res);
        } else if meta.is_file() {
            if set.excludes_file(include) {
                res.excluded.push(include.clone());
                continue;
            }
            push_file(
                include.clone(),
                destination_root.join(name),
                meta.len(),
                &mut seen,
                &mut res,
            );
        } else {
            // Symlink or special file listed directly; links are not followed.
            res.errors.push(IncludeError {
                path: include.clone(),
                reason: "include entry is not a regular file or directory".into(),
            });
        }
    }

    res
}

fn walk(
    dir: &Path,
    dest_dir: &Path,
    set: &BackupSet,
    seen: &mut HashSet<PathBuf>,
    res: &mut Resolution,
) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(path = %dir.display(), error = %e, "skipping unreadable directory");
            res.errors.push(IncludeError {
                path: dir.to_path_buf(),
                reason: format!("failed to read directory: {e}"),
            });
            return;
        }
    };

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                res.errors.push(IncludeError {
                    path: dir.to_path_buf(),
                    reason: format!("failed to read directory entry: {e}"),
                });
                continue;
            }
        };

        let path = entry.path();
        let meta = match path.symlink_metadata() {
            Ok(m) => m,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping unreadable entry");
                res.errors.push(IncludeError {
                    path,
                    reason: format!("failed to read metadata: {e}"),
                });
                continue;
            }
        };

        if meta.is_dir() {
            if set.excludes_directory(&path) {
                res.excluded.push(path);
                continue;
            }
            walk(&path, &dest_dir.join(entry.file_name()), set, seen, res);
        } else if meta.is_file() {
            if set.excludes_file(&path) {
                res.excluded.push(path);
                continue;
            }
            let dest = dest_dir.join(entry.file_name());
            push_file(path, dest, meta.len(), seen, res);
        }
        // Symlinks and special files are skipped.
    }
}

fn push_file(
    source: PathBuf,
    destination: PathBuf,
    size: u64,
    seen: &mut HashSet<PathBuf>,
    res: &mut Resolution,
) {
    if !seen.insert(source.clone()) {
        return;
    }
    res.total_bytes += size;
    res.pairs.push(ResolvedPair {
        source,
        destination,
        size,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::ExcludeRule;
    use tempfile::tempdir;

    fn sources(res: &Resolution) -> Vec<&Path> {
        res.pairs.iter().map(|p| p.source.as_path()).collect()
    }

    #[test]
    fn expands_directories_and_maps_files() {
        let temp = tempdir().unwrap();
        let src = temp.path().join("src");
        fs::create_dir_all(src.join("docs")).unwrap();
        fs::write(src.join("a.txt"), b"a").unwrap();
        fs::write(src.join("docs/readme.md"), b"readme").unwrap();
        fs::write(src.join("docs/notes.tmp"), b"scratch").unwrap();
        let dest = temp.path().join("backup");

        let set = BackupSet {
            includes: vec![src.join("a.txt"), src.join("docs")],
            excludes: vec![ExcludeRule::Extension(".tmp".into())],
        };
        let res = resolve(&set, &dest);

        assert_eq!(res.pairs.len(), 2);
        assert!(res.pairs.iter().any(|p| {
            p.source == src.join("a.txt") && p.destination == dest.join("a.txt")
        }));
        assert!(res.pairs.iter().any(|p| {
            p.source == src.join("docs/readme.md")
                && p.destination == dest.join("docs/readme.md")
        }));
        assert_eq!(res.excluded, vec![src.join("docs/notes.tmp")]);
        assert_eq!(res.total_bytes, 1 + 6);
        assert!(res.errors.is_empty());
    }

    #[test]
    fn no_excludes_returns_every_reachable_file_once() {
        let temp = tempdir().unwrap();
        let src = temp.path().join("data");
        fs::create_dir_all(src.join("a/b")).unwrap();
        fs::write(src.join("one"), b"1").unwrap();
        fs::write(src.join("a/two"), b"22").unwrap();
        fs::write(src.join("a/b/three"), b"333").unwrap();

        let set = BackupSet {
            includes: vec![src.clone()],
            excludes: vec![],
        };
        let res = resolve(&set, Path::new("/backup"));

        assert_eq!(res.pairs.len(), 3);
        assert_eq!(res.total_bytes, 6);
        let mut srcs = sources(&res);
        srcs.sort();
        srcs.dedup();
        assert_eq!(srcs.len(), 3);
    }

    #[test]
    fn directory_rule_prunes_whole_subtree() {
        let temp = tempdir().unwrap();
        let src = temp.path().join("data");
        fs::create_dir_all(src.join("cache")).unwrap();
        fs::write(src.join("keep.txt"), b"keep").unwrap();
        fs::write(src.join("cache/drop.txt"), b"drop").unwrap();

        let set = BackupSet {
            includes: vec![src.clone()],
            excludes: vec![ExcludeRule::Directory(src.join("cache"))],
        };
        let res = resolve(&set, Path::new("/backup"));

        assert_eq!(sources(&res), vec![src.join("keep.txt").as_path()]);
        assert_eq!(res.excluded, vec![src.join("cache")]);
    }

    #[test]
    fn exact_path_rule_excludes_single_file() {
        let temp = tempdir().unwrap();
        let src = temp.path().join("data");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("keep.txt"), b"keep").unwrap();
        fs::write(src.join("drop.txt"), b"drop").unwrap();

        let set = BackupSet {
            includes: vec![src.clone()],
            excludes: vec![ExcludeRule::Path(src.join("drop.txt"))],
        };
        let res = resolve(&set, Path::new("/backup"));

        assert_eq!(sources(&res), vec![src.join("keep.txt").as_path()]);
        assert_eq!(res.excluded, vec![src.join("drop.txt")]);
    }

    #[test]
    fn overlapping_includes_are_deduplicated() {
        let temp = tempdir().unwrap();
        let src = temp.path().join("data");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("a.txt"), b"a").unwrap();

        let set = BackupSet {
            includes: vec![src.clone(), src.clone(), src.join("a.txt")],
            excludes: vec![],
        };
        let res = resolve(&set, Path::new("/backup"));

        assert_eq!(res.pairs.len(), 1);
        // First traversal wins, so the pair keeps the directory mapping.
        assert_eq!(res.pairs[0].destination, Path::new("/backup/data/a.txt"));
    }

    #[test]
    fn missing_include_is_recorded_and_resolution_continues() {
        let temp = tempdir().unwrap();
        let src = temp.path().join("data");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("a.txt"), b"a").unwrap();
        let missing = temp.path().join("nope");

        let set = BackupSet {
            includes: vec![missing.clone(), src.clone()],
            excludes: vec![],
        };
        let res = resolve(&set, Path::new("/backup"));

        assert_eq!(res.pairs.len(), 1);
        assert_eq!(res.errors.len(), 1);
        assert_eq!(res.errors[0].path, missing);
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_not_followed() {
        let temp = tempdir().unwrap();
        let src = temp.path().join("data");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("real.txt"), b"real").unwrap();
        std::os::unix::fs::symlink(&src, src.join("loop")).unwrap();
        std::os::unix::fs::symlink(src.join("real.txt"), src.join("link.txt")).unwrap();

        let set = BackupSet {
            includes: vec![src.clone()],
            excludes: vec![],
        };
        let res = resolve(&set, Path::new("/backup"));

        assert_eq!(sources(&res), vec![src.join("real.txt").as_path()]);
    }
}
