use crate::error::Error;
use crate::fs_ops::{is_ignorable_file_name, TEMP_SUFFIX};
use crate::storage::models::LibraryPath;
use crate::utils::path::{full_path_key, non_overlapping_roots, relative_parts};
use glob::Pattern;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::{debug, error, warn};
use walkdir::WalkDir;

/// A file found under a library root.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LibraryFile {
    pub library_path_id: i64,
    pub sub_path: String,
    pub file_name: String,
    /// Normalized full path, see [`full_path_key`].
    pub key: String,
}

/// One library's current on-disk file set.
#[derive(Debug, Clone, Default)]
pub struct FileListing {
    files: Vec<LibraryFile>,
    keys: HashSet<String>,
}

impl FileListing {
    pub fn new(files: Vec<LibraryFile>) -> Self {
        let keys = files.iter().map(|f| f.key.clone()).collect();
        Self { files, keys }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    pub fn files(&self) -> &[LibraryFile] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Glob patterns for paths the scan must not see.
#[derive(Debug, Clone, Default)]
pub struct IgnoreRules {
    patterns: Vec<Pattern>,
}

impl IgnoreRules {
    pub fn new(globs: &[String]) -> Self {
        let patterns = globs
            .iter()
            .filter_map(|glob| match Pattern::new(glob) {
                Ok(p) => Some(p),
                Err(e) => {
                    error!("Invalid glob pattern '{}': {}", glob, e);
                    None
                }
            })
            .collect();
        Self { patterns }
    }

    pub fn matches(&self, path: &Path) -> bool {
        self.patterns.iter().any(|pattern| pattern.matches_path(path))
    }
}

/// Walks every root of a library. An unreadable root fails the whole scan;
/// unreadable entries below it are logged and skipped.
pub fn list_library_files(
    library_paths: &[LibraryPath],
    ignore: &IgnoreRules,
) -> Result<FileListing, Error> {
    let kept_roots =
        non_overlapping_roots(library_paths.iter().map(|p| p.path.clone()).collect());
    let mut files = Vec::new();

    for library_path in library_paths {
        if !kept_roots.contains(&library_path.path) {
            warn!(
                "Library path {} is nested in another root of the same library, skipping",
                library_path.path
            );
            continue;
        }
        collect_root(library_path, ignore, &mut files)?;
    }

    debug!("Listed {} files", files.len());
    Ok(FileListing::new(files))
}

fn collect_root(
    library_path: &LibraryPath,
    ignore: &IgnoreRules,
    files: &mut Vec<LibraryFile>,
) -> Result<(), Error> {
    let root = Path::new(&library_path.path);
    fs::read_dir(root).map_err(|source| Error::LibraryUnreadable {
        path: root.to_path_buf(),
        source,
    })?;

    let walker = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !ignore.matches(entry.path()));

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry under {}: {}", root.display(), e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let name = entry.file_name().to_string_lossy();
        if name.ends_with(TEMP_SUFFIX) || is_ignorable_file_name(&name) {
            continue;
        }

        let Some((sub_path, file_name)) = relative_parts(root, entry.path()) else {
            continue;
        };
        let key = full_path_key(&library_path.path, &sub_path, &file_name);
        files.push(LibraryFile {
            library_path_id: library_path.id,
            sub_path,
            file_name,
            key,
        });
    }

    Ok(())
}
